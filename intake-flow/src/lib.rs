//! Conversation state machine for a multi-turn medical intake dialogue.
//!
//! A [`Session`] walks a patient through a fixed order of [`Stage`]s, collecting symptoms and
//! basic patient information with an external [`Extractor`]. Each turn is two-phase: the
//! session *plans* the next stage and the canned messages to send, the caller answers the user,
//! and only then *commits* the stage change. [`IntakeRunner`] ties a [`SessionStore`] to the
//! collaborators for callers that serve many users at once.

pub mod catalog;
pub mod entities;
pub mod error;
pub mod extract;
pub mod message;
pub mod policy;
pub mod runner;
pub mod session;
pub mod stage;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use catalog::{CATALOG_VERSION, MessageCatalog, MessageKey, StaticCatalog};
pub use entities::{FactSet, MAX_AGE, PatientInfo, ProblemInfo, Requirement};
pub use error::{IntakeError, Result};
pub use extract::{ExtractionKind, Extractor, PartialUpdate};
pub use message::{ChatMessage, MessageRole};
pub use runner::{IntakeRunner, SymptomsAdded, TurnOutcome};
pub use session::{ConversationStateSnapshot, Session, StageChange, TransitionPlan};
pub use stage::Stage;
pub use storage::{InMemorySessionStore, SessionStore, SharedSession};
