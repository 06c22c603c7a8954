use thiserror::Error;

use crate::{catalog::MessageKey, extract::ExtractionKind, stage::Stage};

/// Errors produced by the intake orchestrator
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Extraction of {kind} failed: {reason}")]
    ExtractionFailed { kind: ExtractionKind, reason: String },

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No template registered for message key {0}")]
    MissingTemplate(MessageKey),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Age out of range: {0}")]
    AgeOutOfRange(i64),
}

impl IntakeError {
    pub fn extraction(kind: ExtractionKind, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IntakeError>;
