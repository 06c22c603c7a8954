//! Scripted extraction collaborator for tests and offline demos.

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use crate::{
    error::{IntakeError, Result},
    extract::{ExtractionKind, Extractor, PartialUpdate},
};

#[derive(Default)]
struct Script {
    queued: HashMap<ExtractionKind, VecDeque<PartialUpdate>>,
    sticky: HashMap<ExtractionKind, PartialUpdate>,
    failing: HashSet<ExtractionKind>,
    calls: HashMap<ExtractionKind, Vec<String>>,
}

/// [`Extractor`] that answers from a script instead of a model.
///
/// Queued answers are consumed first, then the sticky answer for the kind is repeated.
/// Unscripted kinds answer with "nothing found".
#[derive(Default)]
pub struct ScriptedExtractor {
    script: Mutex<Script>,
}

fn nothing_found(kind: ExtractionKind) -> PartialUpdate {
    match kind {
        ExtractionKind::Age => PartialUpdate::Age { age: None },
        ExtractionKind::ChronicDiseases => PartialUpdate::ChronicDiseases {
            diseases: Vec::new(),
            has_diseases: true,
        },
        ExtractionKind::Allergies => PartialUpdate::Allergies {
            allergies: Vec::new(),
            has_allergies: true,
        },
        ExtractionKind::Symptoms => PartialUpdate::Symptoms {
            symptoms: Vec::new(),
            complete: false,
        },
    }
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `update` for its own kind
    pub fn with(self, update: PartialUpdate) -> Self {
        let kind = update.kind();
        self.answering(kind, update)
    }

    /// Always answer `update` when asked for `kind`, even if the kinds differ
    pub fn answering(self, kind: ExtractionKind, update: PartialUpdate) -> Self {
        self.lock().sticky.insert(kind, update);
        self
    }

    /// Fail every call for `kind`
    pub fn failing(self, kind: ExtractionKind) -> Self {
        self.lock().failing.insert(kind);
        self
    }

    /// Answer `update` once, before any sticky answer
    pub fn push(&self, update: PartialUpdate) {
        self.lock()
            .queued
            .entry(update.kind())
            .or_default()
            .push_back(update);
    }

    /// Number of calls made for `kind`
    pub fn calls(&self, kind: ExtractionKind) -> usize {
        self.lock().calls.get(&kind).map_or(0, Vec::len)
    }

    /// Message passed on the most recent call for `kind`
    pub fn last_message(&self, kind: ExtractionKind) -> Option<String> {
        self.lock()
            .calls
            .get(&kind)
            .and_then(|messages| messages.last().cloned())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // a panicking test must not poison the script for the others
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        kind: ExtractionKind,
        message: &str,
        _prior_assistant_message: Option<&str>,
    ) -> Result<PartialUpdate> {
        let mut script = self.lock();
        script
            .calls
            .entry(kind)
            .or_default()
            .push(message.to_string());

        if script.failing.contains(&kind) {
            return Err(IntakeError::extraction(kind, "scripted failure"));
        }
        if let Some(update) = script.queued.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Ok(update);
        }
        Ok(script
            .sticky
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| nothing_found(kind)))
    }
}
