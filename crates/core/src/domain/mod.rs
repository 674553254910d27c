pub mod conflict;
pub mod event;
pub mod intent;
pub mod snapshot;
pub mod trigger;
