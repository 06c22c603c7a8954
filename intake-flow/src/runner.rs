//! IntakeRunner – caller-facing wrapper that resolves a user's session, runs exactly **one**
//! conversation turn on it, and leaves the stage change for an explicit commit.
//!
//! ## The two-phase turn
//! A turn is split so the caller can answer the user *for the stage they are in* and only
//! afterwards move on:
//! ```rust,ignore
//! let outcome = runner.process(&user_id, &message, &history, false).await?;
//! if outcome.plan.has_error() {
//!     // apologise, do not commit; the next user turn retries extraction
//! }
//! let prompt = system_prompt_for(&outcome.plan.snapshot);   // current stage
//! let reply = generate(prompt, &history).await?;
//! runner.commit(&user_id).await?;                           // next stage for the next turn
//! ```
//!
//! ## Commit styles
//! * [`IntakeRunner::commit`] applies whatever stage the last `process` left pending. Calling it
//!   twice is harmless.
//! * [`IntakeRunner::apply`] takes the [`TransitionPlan`] itself and refuses it if the session
//!   has moved on since the plan was made.
//!
//! ## Concurrency
//! The store is shared by all users. The runner only touches the store to look a session up;
//! the (potentially slow) extraction runs under the session's own lock, so a slow turn for one
//! user never blocks another, and two turns for the same user run one after the other.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    catalog::{MessageCatalog, MessageKey},
    error::{IntakeError, Result},
    extract::Extractor,
    message::ChatMessage,
    session::{ConversationStateSnapshot, StageChange, TransitionPlan},
    storage::{SessionStore, SharedSession},
};

/// Result of merging externally detected symptoms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymptomsAdded {
    /// How many of the symptoms were new to the session
    pub added: usize,
    /// Greeting messages when the call started a new session, empty otherwise
    pub start_messages: Vec<String>,
}

/// Result of one processed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// What the turn decided; the stage is not changed yet
    pub plan: TransitionPlan,
    /// Greeting messages when the turn started a new session, empty otherwise
    pub start_messages: Vec<String>,
}

impl TurnOutcome {
    pub fn new_session(&self) -> bool {
        !self.start_messages.is_empty()
    }

    /// Everything the caller should send verbatim: greeting first, then outbound templates
    pub fn messages(&self) -> Vec<String> {
        self.start_messages
            .iter()
            .chain(self.plan.messages.iter())
            .cloned()
            .collect()
    }
}

/// High-level entry point over a [`SessionStore`] and the two collaborators.
#[derive(Clone)]
pub struct IntakeRunner {
    store: Arc<dyn SessionStore>,
    extractor: Arc<dyn Extractor>,
    catalog: Arc<dyn MessageCatalog>,
}

impl IntakeRunner {
    pub fn new(
        store: Arc<dyn SessionStore>,
        extractor: Arc<dyn Extractor>,
        catalog: Arc<dyn MessageCatalog>,
    ) -> Self {
        Self {
            store,
            extractor,
            catalog,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    async fn existing(&self, user_id: &str) -> Result<SharedSession> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| IntakeError::SessionNotFound(user_id.to_string()))
    }

    /// Process one user message. `history` is the conversation before `message`.
    #[instrument(skip(self, message, history), fields(history_len = history.len()))]
    pub async fn process(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
        is_new_session: bool,
    ) -> Result<TurnOutcome> {
        // rendered before the store can replace anything
        let greeting = self.catalog.render(MessageKey::Start)?;
        let (session, created) = self.store.get_or_create(user_id, is_new_session).await?;
        let start_messages = if created { greeting } else { Vec::new() };

        let plan = session
            .lock()
            .await
            .process(self.extractor.as_ref(), self.catalog.as_ref(), message, history)
            .await;

        Ok(TurnOutcome {
            plan,
            start_messages,
        })
    }

    /// Merge symptoms detected outside the conversation into the user's session.
    /// The session is created like in [`IntakeRunner::process`] when needed.
    pub async fn add_symptoms(
        &self,
        user_id: &str,
        symptoms: &[String],
        is_new_session: bool,
    ) -> Result<SymptomsAdded> {
        let greeting = self.catalog.render(MessageKey::Start)?;
        let (session, created) = self.store.get_or_create(user_id, is_new_session).await?;
        let added = session.lock().await.add_symptoms(symptoms);
        Ok(SymptomsAdded {
            added,
            start_messages: if created { greeting } else { Vec::new() },
        })
    }

    /// Apply the pending stage of the user's session
    pub async fn commit(&self, user_id: &str) -> Result<Option<StageChange>> {
        self.existing(user_id).await?.lock().await.commit()
    }

    /// Apply a specific plan to the user's session
    pub async fn apply(&self, user_id: &str, plan: TransitionPlan) -> Result<Option<StageChange>> {
        self.existing(user_id).await?.lock().await.apply(plan)
    }

    pub async fn get_snapshot(&self, user_id: &str) -> Result<ConversationStateSnapshot> {
        Ok(self.existing(user_id).await?.lock().await.snapshot())
    }

    /// Start the user over with a fresh session and return the greeting
    pub async fn reset(&self, user_id: &str) -> Result<Vec<String>> {
        let greeting = self.catalog.render(MessageKey::Start)?;
        self.store.reset(user_id).await?;
        info!(user_id = %user_id, "Session reset");
        Ok(greeting)
    }
}
