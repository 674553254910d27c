//! Ordered, data-driven tension heuristics.
//!
//! Each rule is a predicate over rooms, wishes and the intent model. Rules are
//! evaluated in table order and a tension is appended at most once per label.

use crate::conflicts::{Room, Wish};
use crate::domain::intent::{ProjectIntentModel, Tension, TensionRisk};

const UTILITY_ROOMS: &[&str] =
    &["techniek", "technische ruimte", "installatie", "stookruimte", "bijkeuken", "wasruimte"];
const BEDROOMS: &[&str] = &["slaapkamer", "bedroom"];
const LIVING_ROOMS: &[&str] = &["woonkamer", "zitkamer", "living"];
const GLAZING_WISHES: &[&str] =
    &["glas", "glazen", "raampartij", "grote ramen", "glazing", "panorama"];
const SUSTAINABILITY: &[&str] =
    &["duurza", "energieneutraal", "nul-op-de-meter", "passiefhuis", "sustainab", "co2"];
const OPEN_KITCHEN_WISHES: &[&str] = &["open keuken", "open kitchen"];

pub struct TensionInputs<'a> {
    pub rooms: &'a [Room],
    pub wishes: &'a [Wish],
    pub pim: &'a ProjectIntentModel,
}

pub struct TensionRule {
    pub label: &'static str,
    pub cause: &'static str,
    pub risk: TensionRisk,
    pub applies: fn(&TensionInputs<'_>) -> bool,
}

impl TensionRule {
    pub fn tension(&self) -> Tension {
        Tension { label: self.label.to_string(), cause: self.cause.to_string(), risk: self.risk }
    }
}

pub const TENSION_RULES: &[TensionRule] = &[
    TensionRule {
        label: "Geluid techniekruimte bij slaapkamer",
        cause: "Een technische ruimte grenst aan of ligt op dezelfde verdieping als een slaapkamer.",
        risk: TensionRisk::Low,
        applies: utility_near_bedroom,
    },
    TensionRule {
        label: "Veel glas versus duurzaamheid",
        cause: "Grote glasvlakken verhogen warmteverlies en oververhitting bij een duurzame ambitie.",
        risk: TensionRisk::Medium,
        applies: glazing_with_sustainability,
    },
    TensionRule {
        label: "Open keuken bij woonkamer",
        cause: "Een open keuken naast de woonkamer brengt geluid en kookgeur in de leefruimte.",
        risk: TensionRisk::Low,
        applies: open_kitchen_with_living_room,
    },
];

/// Appends tensions for every matching rule not yet present in `pim`.
/// Returns the labels that were added.
pub fn apply_tension_rules(
    pim: &mut ProjectIntentModel,
    rooms: &[Room],
    wishes: &[Wish],
) -> Vec<&'static str> {
    let matched = {
        let inputs = TensionInputs { rooms, wishes, pim: &*pim };
        TENSION_RULES
            .iter()
            .filter(|rule| !pim.has_tension(rule.label) && (rule.applies)(&inputs))
            .collect::<Vec<_>>()
    };

    matched
        .into_iter()
        .map(|rule| {
            pim.tensions.push(rule.tension());
            rule.label
        })
        .collect()
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn room_is(room: &Room, keywords: &[&str]) -> bool {
    mentions(&room.room_type, keywords) || mentions(&room.name, keywords)
}

fn co_located(a: &Room, b: &Room) -> bool {
    let a_name = a.name.to_lowercase();
    let b_name = b.name.to_lowercase();
    let adjacent = (!b_name.is_empty() && a.adjacent_to.contains(&b_name))
        || (!a_name.is_empty() && b.adjacent_to.contains(&a_name));
    let same_floor = matches!((&a.floor, &b.floor), (Some(x), Some(y)) if x == y);
    adjacent || same_floor
}

fn utility_near_bedroom(inputs: &TensionInputs<'_>) -> bool {
    let utilities = inputs.rooms.iter().filter(|room| room_is(room, UTILITY_ROOMS));
    utilities
        .flat_map(|utility| inputs.rooms.iter().map(move |other| (utility, other)))
        .any(|(utility, other)| room_is(other, BEDROOMS) && co_located(utility, other))
}

fn glazing_with_sustainability(inputs: &TensionInputs<'_>) -> bool {
    let wants_glazing = inputs.wishes.iter().any(|wish| mentions(&wish.label, GLAZING_WISHES));
    let sustainable = mentions(&inputs.pim.north_star, SUSTAINABILITY)
        || inputs.pim.locked.top_priorities.iter().any(|p| mentions(p, SUSTAINABILITY));
    wants_glazing && sustainable
}

fn open_kitchen_with_living_room(inputs: &TensionInputs<'_>) -> bool {
    let wants_open_kitchen =
        inputs.wishes.iter().any(|wish| mentions(&wish.label, OPEN_KITCHEN_WISHES));
    wants_open_kitchen && inputs.rooms.iter().any(|room| room_is(room, LIVING_ROOMS))
}
