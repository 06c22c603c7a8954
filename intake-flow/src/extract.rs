//! Structured-field extraction.
//!
//! The [`Extractor`] trait is the contract with the service that turns free text into
//! structured fields (usually an LLM). The functions in this module wrap it with the rules
//! the orchestrator relies on: context-gated negations, age bounds, and "failure means no
//! update". None of them return an error; a failed call is logged and ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::{
    entities::{PatientInfo, ProblemInfo},
    error::Result,
};

/// Which field an extraction call is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    Age,
    ChronicDiseases,
    Allergies,
    Symptoms,
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionKind::Age => "age",
            ExtractionKind::ChronicDiseases => "chronic_diseases",
            ExtractionKind::Allergies => "allergies",
            ExtractionKind::Symptoms => "symptoms",
        };
        f.write_str(name)
    }
}

/// Structured result of one extraction call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialUpdate {
    Age {
        age: Option<i64>,
    },
    ChronicDiseases {
        diseases: Vec<String>,
        has_diseases: bool,
    },
    Allergies {
        allergies: Vec<String>,
        has_allergies: bool,
    },
    Symptoms {
        symptoms: Vec<String>,
        complete: bool,
    },
}

impl PartialUpdate {
    pub fn kind(&self) -> ExtractionKind {
        match self {
            PartialUpdate::Age { .. } => ExtractionKind::Age,
            PartialUpdate::ChronicDiseases { .. } => ExtractionKind::ChronicDiseases,
            PartialUpdate::Allergies { .. } => ExtractionKind::Allergies,
            PartialUpdate::Symptoms { .. } => ExtractionKind::Symptoms,
        }
    }
}

/// Collaborator that converts free text into a structured partial update.
///
/// For [`ExtractionKind::Symptoms`] `message` carries the whole user transcript rather than
/// a single turn. Implementations own their latency and retry policy; a timeout must be
/// reported as [`IntakeError::ExtractionFailed`](crate::IntakeError::ExtractionFailed) like
/// any other failure.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        kind: ExtractionKind,
        message: &str,
        prior_assistant_message: Option<&str>,
    ) -> Result<PartialUpdate>;
}

/// Outcome of a list-valued field extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListUpdate {
    /// The patient explicitly has none
    Negated,
    /// Newly mentioned items, possibly empty
    Items(Vec<String>),
}

/// Outcome of a symptom extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymptomUpdate {
    pub symptoms: Vec<String>,
    pub complete: bool,
}

const CHRONIC_DISEASE_TRIGGERS: &[&str] = &[
    "хронические заболевания",
    "хронических заболеваний",
    "хроническими заболеваниями",
    "хронические болезни",
    "chronic disease",
];

const ALLERGY_TRIGGERS: &[&str] = &["аллерги", "allerg"];

const NEGATION_WORDS: &[&str] = &[
    "нет",
    "нету",
    "отсутствуют",
    "отсутствует",
    "никаких",
    "no",
    "none",
];

const NEGATION_PHRASES: &[[&str; 2]] = &[["не", "имею"], ["не", "было"]];

/// Words that may accompany a negation without carrying content of their own
const FILLER_WORDS: &[&str] = &[
    "у", "меня", "не", "имею", "ничего", "совсем", "вообще", "точно", "ну", "of", "course",
];

const CLAUSE_CONJUNCTIONS: &[&str] = &["но", "а", "but"];

/// A list-valued patient field the assistant can ask about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedField {
    ChronicDiseases,
    Allergies,
}

impl GatedField {
    fn triggers(self) -> &'static [&'static str] {
        match self {
            GatedField::ChronicDiseases => CHRONIC_DISEASE_TRIGGERS,
            GatedField::Allergies => ALLERGY_TRIGGERS,
        }
    }

    fn subject_stems(self) -> &'static [&'static str] {
        match self {
            GatedField::ChronicDiseases => &["хрон", "болез", "заболев", "chronic"],
            GatedField::Allergies => &["аллерг", "allerg"],
        }
    }

    fn other(self) -> GatedField {
        match self {
            GatedField::ChronicDiseases => GatedField::Allergies,
            GatedField::Allergies => GatedField::ChronicDiseases,
        }
    }

    fn kind(self) -> ExtractionKind {
        match self {
            GatedField::ChronicDiseases => ExtractionKind::ChronicDiseases,
            GatedField::Allergies => ExtractionKind::Allergies,
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_negation(words: &[String]) -> bool {
    words
        .iter()
        .any(|word| NEGATION_WORDS.contains(&word.as_str()))
        || words.windows(2).any(|pair| {
            NEGATION_PHRASES
                .iter()
                .any(|phrase| pair[0] == phrase[0] && pair[1] == phrase[1])
        })
}

/// Split a reply into clauses on punctuation and contrastive conjunctions
fn clauses(message: &str) -> Vec<Vec<String>> {
    let mut clauses = Vec::new();
    for piece in message.split([',', ';', '.', '!', '?', '\n']) {
        let mut current = Vec::new();
        for word in words(piece) {
            if CLAUSE_CONJUNCTIONS.contains(&word.as_str()) {
                clauses.push(std::mem::take(&mut current));
            } else {
                current.push(word);
            }
        }
        clauses.push(current);
    }
    clauses.retain(|clause| !clause.is_empty());
    clauses
}

/// Whether the assistant message asked about `field`
pub fn asked_about(field: GatedField, prior_assistant_message: Option<&str>) -> bool {
    prior_assistant_message
        .map(str::to_lowercase)
        .is_some_and(|prior| field.triggers().iter().any(|t| prior.contains(t)))
}

/// Whether the message contains a negative answer marker
pub fn contains_negation(message: &str) -> bool {
    has_negation(&words(message))
}

/// A reply like "нет" or "у меня ничего нет": a negation with no subject of its own
pub fn is_bare_negation(message: &str) -> bool {
    let words = words(message);
    has_negation(&words) && words.iter().all(|word| is_negation_or_filler(word))
}

fn names_subject(field: GatedField, word: &str) -> bool {
    field.subject_stems().iter().any(|stem| word.contains(stem))
}

fn is_negation_or_filler(word: &str) -> bool {
    NEGATION_WORDS.contains(&word) || FILLER_WORDS.contains(&word)
}

/// Whether some clause of the message names `field` and negates it
fn negates_subject(field: GatedField, message: &str) -> bool {
    clauses(message).iter().any(|clause| {
        has_negation(clause) && clause.iter().any(|word| names_subject(field, word))
    })
}

/// Whether some clause is nothing but a negation of `field`, like "хронических болезней нет"
fn plainly_negates_subject(field: GatedField, message: &str) -> bool {
    clauses(message).iter().any(|clause| {
        has_negation(clause)
            && clause.iter().any(|word| names_subject(field, word))
            && clause
                .iter()
                .all(|word| is_negation_or_filler(word) || names_subject(field, word))
    })
}

/// Decide whether `message` negates `field` without asking the extractor.
///
/// Only a direct answer counts: the prior assistant message must have asked about the field.
/// A clause made of nothing but a negation of the field by name counts, and so does a bare
/// "no". Anything carrying other content ("Гипертония, других нет") goes to the extractor.
pub fn gated_negation(
    field: GatedField,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> bool {
    if !asked_about(field, prior_assistant_message) || !contains_negation(message) {
        return false;
    }
    if plainly_negates_subject(field, message) {
        return true;
    }
    if negates_subject(field.other(), message) {
        return false;
    }
    is_bare_negation(message)
}

async fn call(
    extractor: &dyn Extractor,
    kind: ExtractionKind,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> Option<PartialUpdate> {
    match extractor.extract(kind, message, prior_assistant_message).await {
        Ok(update) if update.kind() == kind => Some(update),
        Ok(update) => {
            warn!(%kind, got = %update.kind(), "Extractor answered with the wrong kind, ignoring");
            None
        }
        Err(e) => {
            warn!(%kind, error = %e, "Extraction failed, treating as no update");
            None
        }
    }
}

/// Extract the patient's age. Out-of-range values count as "no age found".
pub async fn extract_age(
    extractor: &dyn Extractor,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> Option<i64> {
    let Some(PartialUpdate::Age { age }) =
        call(extractor, ExtractionKind::Age, message, prior_assistant_message).await
    else {
        return None;
    };
    match age {
        Some(age) if (0..=crate::entities::MAX_AGE).contains(&age) => Some(age),
        Some(age) => {
            warn!(age, "Extracted age out of range, ignoring");
            None
        }
        None => {
            debug!("No age in message");
            None
        }
    }
}

async fn extract_list(
    field: GatedField,
    extractor: &dyn Extractor,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> Option<ListUpdate> {
    if gated_negation(field, message, prior_assistant_message) {
        info!(kind = %field.kind(), "Negative answer to a direct question");
        return Some(ListUpdate::Negated);
    }

    let (items, present) =
        match call(extractor, field.kind(), message, prior_assistant_message).await? {
            PartialUpdate::ChronicDiseases {
                diseases,
                has_diseases,
            } => (diseases, has_diseases),
            PartialUpdate::Allergies {
                allergies,
                has_allergies,
            } => (allergies, has_allergies),
            _ => return None,
        };

    if !present {
        // a bare "no" answering some other question must not negate this field
        if is_bare_negation(message) && !asked_about(field, prior_assistant_message) {
            info!(kind = %field.kind(), "Ignoring negation that answers a different question");
            return Some(ListUpdate::Items(Vec::new()));
        }
        return Some(ListUpdate::Negated);
    }
    Some(ListUpdate::Items(items))
}

/// Extract chronic diseases from one user turn
pub async fn extract_chronic_diseases(
    extractor: &dyn Extractor,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> Option<ListUpdate> {
    extract_list(
        GatedField::ChronicDiseases,
        extractor,
        message,
        prior_assistant_message,
    )
    .await
}

/// Extract allergies from one user turn
pub async fn extract_allergies(
    extractor: &dyn Extractor,
    message: &str,
    prior_assistant_message: Option<&str>,
) -> Option<ListUpdate> {
    extract_list(
        GatedField::Allergies,
        extractor,
        message,
        prior_assistant_message,
    )
    .await
}

/// Extract symptoms from the whole user transcript
pub async fn extract_symptoms(extractor: &dyn Extractor, transcript: &str) -> Option<SymptomUpdate> {
    match call(extractor, ExtractionKind::Symptoms, transcript, None).await? {
        PartialUpdate::Symptoms { symptoms, complete } => {
            Some(SymptomUpdate { symptoms, complete })
        }
        _ => None,
    }
}

/// Run the symptom extractor and fold its result into `problem`
pub async fn update_problem_info(
    extractor: &dyn Extractor,
    problem: &mut ProblemInfo,
    transcript: &str,
) {
    if let Some(update) = extract_symptoms(extractor, transcript).await {
        let added = problem.apply_extraction(&update.symptoms, update.complete);
        info!(
            added,
            total = problem.symptoms().len(),
            complete = problem.symptoms_complete(),
            "Symptoms updated"
        );
    }
}

/// Run the age, chronic disease and allergy extractors and fold their results into `patient`
pub async fn update_patient_info(
    extractor: &dyn Extractor,
    patient: &mut PatientInfo,
    message: &str,
    prior_assistant_message: Option<&str>,
) {
    if let Some(age) = extract_age(extractor, message, prior_assistant_message).await {
        if let Err(e) = patient.set_age(age) {
            warn!(error = %e, "Rejected extracted age");
        }
    }

    match extract_chronic_diseases(extractor, message, prior_assistant_message).await {
        Some(ListUpdate::Negated) => patient.deny_chronic_diseases(),
        Some(ListUpdate::Items(diseases)) => {
            patient.add_chronic_diseases(&diseases);
        }
        None => {}
    }

    match extract_allergies(extractor, message, prior_assistant_message).await {
        Some(ListUpdate::Negated) => patient.deny_allergies(),
        Some(ListUpdate::Items(allergies)) => {
            patient.add_allergies(&allergies);
        }
        None => {}
    }

    info!(
        age = ?patient.age(),
        has_chronic_diseases = patient.has_chronic_diseases(),
        chronic_diseases = ?patient.chronic_diseases(),
        has_allergies = patient.has_allergies(),
        allergies = ?patient.allergies(),
        "Patient info updated"
    );
}
