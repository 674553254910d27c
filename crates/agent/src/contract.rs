//! Structural contract for assistant-authored text.
//!
//! Every proactive message carries the sections `Context:`, `Inzicht:` and
//! `Actie:` in that order, asks at most one question, addresses the user
//! formally and contains no pictographic emoji. Model output is sanitized,
//! validated, retried once with a correction directive and finally replaced by
//! a deterministic template when it still does not comply.

use std::sync::{Arc, LazyLock};

use proactor_core::domain::event::{DomainEvent, DomainEventType, InteractionMode};
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{
    run_cancellable, OrchestratorError, Patch, TurnMetadata, TurnOrchestrator, TurnRequest,
    TurnResult,
};

pub const SECTION_MARKERS: [&str; 3] = ["Context:", "Inzicht:", "Actie:"];
pub const MAX_QUESTIONS: usize = 1;

/// Appended to every query so the model knows the expected shape.
pub const CONTRACT_INSTRUCTIONS: &str = "Antwoord in precies drie secties, in deze volgorde: \
     'Context:', 'Inzicht:' en 'Actie:'. Stel hoogstens een vraag. Spreek de gebruiker aan \
     met 'u' en 'uw'. Gebruik geen emoji.";

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{1F1E6}-\x{1F1FF}\x{200D}\x{FE0E}\x{FE0F}\x{20E3}]",
    )
    .expect("valid emoji regex")
});

static INFORMAL_PRONOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(jullie|jouw|jou|jij|je)\b").expect("valid pronoun regex"));

static NEXT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]+(\p{L}+)").expect("valid next word regex"));

/// Words after `je`/`jullie` that mark the pronoun as subject or object
/// rather than possessive: finite verbs and function words.
const NON_POSSESSIVE_FOLLOWERS: &[&str] = &[
    "ben", "bent", "heb", "hebt", "kan", "kunt", "wil", "wilt", "moet", "mag", "zal", "zult",
    "zou", "ga", "gaat", "weet", "ziet", "vindt", "krijgt", "kiest", "maakt", "wordt", "blijft",
    "doet", "denkt", "staat", "komt", "houdt", "had", "was", "kon", "wilde", "moest", "mocht",
    "ging", "zijn", "hebben", "kunnen", "willen", "moeten", "mogen", "zullen", "gaan", "weten",
    "zien", "vinden", "krijgen", "kiezen", "maken", "worden", "blijven", "doen", "denken",
    "staan", "komen", "hadden", "waren", "konden", "wilden", "moesten", "je", "jij", "jou",
    "jullie", "u", "zelf", "graag", "ook", "niet", "wel", "nog", "al", "dan", "even", "er", "dat",
    "die", "het", "een", "de", "dit", "deze", "te", "om", "aan", "op", "in", "bij", "met", "voor",
    "over", "van", "naar", "uit", "dus", "toch", "maar", "en", "of", "als", "meteen", "daarbij",
    "hierbij", "verder", "alvast", "misschien", "eerst",
];

static REPEATED_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace regex"));

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("sectie '{0}' ontbreekt")]
    MissingSection(&'static str),
    #[error("de secties staan niet in de volgorde Context, Inzicht, Actie")]
    SectionsOutOfOrder,
    #[error("er staan {0} vragen in het antwoord, maximaal een is toegestaan")]
    TooManyQuestions(usize),
    #[error("informele aanspreekvorm '{0}' gebruikt")]
    InformalAddress(String),
    #[error("het antwoord bevat emoji")]
    Emoji,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Pass,
    Repaired,
    Fallback,
}

impl GuardVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Repaired => "repaired",
            Self::Fallback => "fallback",
        }
    }
}

/// Text and patches that survived the contract.
#[derive(Clone, Debug, PartialEq)]
pub struct EnforcedTurn {
    pub text: String,
    pub patches: Vec<Patch>,
    pub metadata: TurnMetadata,
    pub verdict: GuardVerdict,
    pub attempts: u32,
}

impl EnforcedTurn {
    pub fn used_fallback(&self) -> bool {
        self.verdict == GuardVerdict::Fallback
    }
}

/// Removes emoji and rewrites informal pronouns to `u`/`uw`.
pub fn sanitize(text: &str) -> String {
    let without_emoji = EMOJI.replace_all(text, "");
    let formal = formalize(&without_emoji);
    let collapsed = REPEATED_SPACES.replace_all(&formal, " ");
    collapsed.lines().map(str::trim_end).collect::<Vec<_>>().join("\n").trim().to_string()
}

pub fn validate(text: &str) -> Vec<ContractViolation> {
    let mut violations = Vec::new();

    let positions = SECTION_MARKERS.map(|marker| text.find(marker));
    for (marker, position) in SECTION_MARKERS.iter().zip(positions) {
        if position.is_none() {
            violations.push(ContractViolation::MissingSection(*marker));
        }
    }
    if let [Some(context), Some(insight), Some(action)] = positions {
        if !(context < insight && insight < action) {
            violations.push(ContractViolation::SectionsOutOfOrder);
        }
    }

    let questions = text.matches('?').count();
    if questions > MAX_QUESTIONS {
        violations.push(ContractViolation::TooManyQuestions(questions));
    }

    if let Some(found) = INFORMAL_PRONOUN.find(text) {
        violations.push(ContractViolation::InformalAddress(found.as_str().to_string()));
    }

    if EMOJI.is_match(text) {
        violations.push(ContractViolation::Emoji);
    }

    violations
}

pub fn correction_directive(violations: &[ContractViolation]) -> String {
    let issues = violations.iter().map(|v| format!("- {v}")).collect::<Vec<_>>().join("\n");
    format!(
        "CORRECTIE: het vorige antwoord voldeed niet aan het formaat.\n{issues}\n\
         Herschrijf het antwoord. {CONTRACT_INSTRUCTIONS}"
    )
}

/// Deterministic replacement text for `event`. Always satisfies the contract.
pub fn fallback_response(event: &DomainEvent) -> String {
    let chapter = event.chapter.as_deref().map(template_value).filter(|c| !c.is_empty());
    let chapter = chapter.as_deref().unwrap_or("dit onderdeel");

    let (context, insight, action) = match event.event_type {
        DomainEventType::ChapterEntered => (
            format!("U bent aangekomen bij het hoofdstuk {chapter}."),
            "Dit is een goed moment om de gegevens in dit hoofdstuk te controleren.".to_string(),
            "Vul de ontbrekende velden aan en ga verder wanneer u klaar bent.".to_string(),
        ),
        DomainEventType::ChapterCompleted => (
            format!("U heeft het hoofdstuk {chapter} afgerond."),
            "De antwoorden in dit hoofdstuk zijn vastgelegd.".to_string(),
            "Loop de samenvatting na of ga door naar het volgende hoofdstuk.".to_string(),
        ),
        DomainEventType::FieldEdited => (
            format!("U heeft een wijziging aangebracht in {chapter}."),
            "Deze wijziging kan gevolgen hebben voor andere onderdelen van uw plan.".to_string(),
            "Controleer of budget, wensen en ruimtes nog met elkaar in balans zijn.".to_string(),
        ),
        DomainEventType::Idle => (
            format!("U werkt op dit moment aan {chapter}."),
            "Er is een tijd geen wijziging geweest.".to_string(),
            "Ga verder waar u gebleven was of bekijk het overzicht van uw plan.".to_string(),
        ),
    };

    format!(
        "{} {context}\n{} {insight}\n{} {action}",
        SECTION_MARKERS[0], SECTION_MARKERS[1], SECTION_MARKERS[2]
    )
}

/// Interpolated values lose question marks, emoji, line breaks and colons.
fn template_value(value: &str) -> String {
    sanitize(&value.replace(['?', ':', '\n', '\r'], " "))
}

fn formalize(text: &str) -> String {
    let mut formal = String::with_capacity(text.len());
    let mut copied = 0;
    for found in INFORMAL_PRONOUN.find_iter(text) {
        formal.push_str(&text[copied..found.start()]);
        let next = NEXT_WORD
            .captures(&text[found.end()..])
            .and_then(|caps| caps.get(1))
            .map(|word| word.as_str());
        let replacement = formal_pronoun(found.as_str(), next);
        if found.as_str().starts_with(|c: char| c.is_uppercase()) {
            formal.push_str(&capitalize(replacement));
        } else {
            formal.push_str(replacement);
        }
        copied = found.end();
    }
    formal.push_str(&text[copied..]);
    formal
}

/// `jouw` is always possessive; `je` and `jullie` are when a noun follows.
fn formal_pronoun(pronoun: &str, next: Option<&str>) -> &'static str {
    let pronoun = pronoun.to_lowercase();
    if pronoun == "jouw" {
        return "uw";
    }
    if pronoun == "jij" || pronoun == "jou" {
        return "u";
    }
    match next.map(str::to_lowercase) {
        Some(next) if !NON_POSSESSIVE_FOLLOWERS.contains(&next.as_str()) => "uw",
        _ => "u",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Runs a turn through call, sanitize, validate, retry-once and fallback.
#[derive(Clone)]
pub struct ContractEnforcer {
    orchestrator: Arc<dyn TurnOrchestrator>,
}

impl ContractEnforcer {
    pub fn new(orchestrator: Arc<dyn TurnOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// `Err` means no response: the first call failed or a call was cancelled.
    pub async fn enforce(
        &self,
        event: &DomainEvent,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<EnforcedTurn, OrchestratorError> {
        let first = run_cancellable(self.orchestrator.as_ref(), request, cancel).await?;
        let text = sanitize(&first.response);
        let violations = validate(&text);
        if violations.is_empty() {
            return Ok(accept(first, text, GuardVerdict::Pass, 1, request.interaction_mode));
        }

        tracing::info!(
            event_name = "contract.retry",
            project_id = %request.project_id,
            correlation_id = %request.trigger_id,
            violations = violations.len(),
            "response violated the turn contract, retrying once"
        );

        let retry_request = TurnRequest {
            query: format!("{}\n\n{}", request.query, correction_directive(&violations)),
            ..request.clone()
        };

        let last_result = match run_cancellable(self.orchestrator.as_ref(), &retry_request, cancel)
            .await
        {
            Ok(second) => {
                let text = sanitize(&second.response);
                let remaining = validate(&text);
                if remaining.is_empty() {
                    return Ok(accept(
                        second,
                        text,
                        GuardVerdict::Repaired,
                        2,
                        request.interaction_mode,
                    ));
                }
                tracing::warn!(
                    event_name = "contract.fallback",
                    project_id = %request.project_id,
                    correlation_id = %request.trigger_id,
                    violations = remaining.len(),
                    "retry still violated the turn contract"
                );
                second
            }
            Err(OrchestratorError::Cancelled) => return Err(OrchestratorError::Cancelled),
            Err(error) => {
                tracing::warn!(
                    event_name = "contract.fallback",
                    project_id = %request.project_id,
                    correlation_id = %request.trigger_id,
                    error = %error,
                    "retry call failed"
                );
                first
            }
        };

        Ok(fallback(event, last_result.metadata))
    }
}

fn accept(
    result: TurnResult,
    text: String,
    verdict: GuardVerdict,
    attempts: u32,
    interaction_mode: InteractionMode,
) -> EnforcedTurn {
    let TurnResult { patches, mut metadata, .. } = result;
    let patches = if interaction_mode == InteractionMode::User && metadata.turn_plan.allow_patches
    {
        patches
    } else {
        Vec::new()
    };
    metadata.attempts = attempts;
    metadata.used_fallback = false;
    metadata.guard_verdict = Some(verdict.as_str().to_string());
    EnforcedTurn { text, patches, metadata, verdict, attempts }
}

fn fallback(event: &DomainEvent, mut metadata: TurnMetadata) -> EnforcedTurn {
    metadata.attempts = 2;
    metadata.used_fallback = true;
    metadata.guard_verdict = Some(GuardVerdict::Fallback.as_str().to_string());
    metadata.turn_plan.allow_patches = false;
    metadata.turn_plan.deferred_topics.clear();
    EnforcedTurn {
        text: fallback_response(event),
        patches: Vec::new(),
        metadata,
        verdict: GuardVerdict::Fallback,
        attempts: 2,
    }
}
