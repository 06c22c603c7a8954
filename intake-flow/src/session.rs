use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    catalog::{MessageCatalog, MessageKey, render_all},
    entities::{PatientInfo, ProblemInfo},
    error::{IntakeError, Result},
    extract::{self, Extractor},
    message::{ChatMessage, last_assistant_message, user_transcript},
    policy::{self, Decision},
    stage::Stage,
};

/// Read-only projection of a session exposed at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStateSnapshot {
    pub symptoms: Vec<String>,
    pub patient_info: PatientInfo,
    pub current_stage: Stage,
    pub next_stage: Option<Stage>,
    pub has_error: bool,
}

/// The result of [`Session::process`]: what the turn decided, not yet applied.
///
/// `snapshot` reflects the session *before* the stage changes, so the caller can answer the
/// present turn for the current stage and only then commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionPlan {
    pub from: Stage,
    pub to: Stage,
    pub keys: Vec<MessageKey>,
    pub messages: Vec<String>,
    pub snapshot: ConversationStateSnapshot,
}

impl TransitionPlan {
    pub fn is_transition(&self) -> bool {
        self.from != self.to
    }

    pub fn has_error(&self) -> bool {
        self.snapshot.has_error
    }
}

/// A committed stage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageChange {
    pub from: Stage,
    pub to: Stage,
}

/// Per-user conversation aggregate
#[derive(Debug, Clone)]
pub struct Session {
    user_id: String,
    stage: Stage,
    pending_stage: Option<Stage>,
    problem_info: ProblemInfo,
    patient_info: PatientInfo,
    error_state: bool,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        info!(user_id = %user_id, stage = %Stage::INITIAL, "New conversation session");
        Self {
            user_id,
            stage: Stage::INITIAL,
            pending_stage: None,
            problem_info: ProblemInfo::new(),
            patient_info: PatientInfo::new(),
            error_state: false,
        }
    }

    /// Rebuild a session from previously collected state
    pub fn restore(
        user_id: impl Into<String>,
        stage: Stage,
        problem_info: ProblemInfo,
        patient_info: PatientInfo,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            stage,
            pending_stage: None,
            problem_info,
            patient_info,
            error_state: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pending_stage(&self) -> Option<Stage> {
        self.pending_stage
    }

    pub fn problem_info(&self) -> &ProblemInfo {
        &self.problem_info
    }

    pub fn patient_info(&self) -> &PatientInfo {
        &self.patient_info
    }

    pub fn has_error(&self) -> bool {
        self.error_state
    }

    pub fn snapshot(&self) -> ConversationStateSnapshot {
        ConversationStateSnapshot {
            symptoms: self.problem_info.symptoms().to_vec(),
            patient_info: self.patient_info.clone(),
            current_stage: self.stage,
            next_stage: self.pending_stage,
            has_error: self.error_state,
        }
    }

    /// Merge symptoms found outside the conversation, such as in an attached image
    pub fn add_symptoms<S: AsRef<str>>(&mut self, symptoms: &[S]) -> usize {
        let added = self.problem_info.add_symptoms(symptoms);
        info!(
            user_id = %self.user_id,
            added,
            total = self.problem_info.symptoms().len(),
            "External symptoms merged"
        );
        added
    }

    /// Run the extractors for the current stage and plan the next stage.
    ///
    /// The committed stage is never changed here. On failure the error flag is raised and the
    /// returned plan stays in the current stage with no outbound messages.
    pub async fn process(
        &mut self,
        extractor: &dyn Extractor,
        catalog: &dyn MessageCatalog,
        message: &str,
        history: &[ChatMessage],
    ) -> TransitionPlan {
        self.error_state = false;
        self.pending_stage = None;

        self.extract(extractor, message, history).await;
        let decision = policy::decide(self.stage, &self.problem_info, &self.patient_info);

        match render_all(catalog, &decision.outbound) {
            Ok(messages) => self.plan(decision, messages),
            Err(e) => {
                error!(user_id = %self.user_id, error = %e, "Failed to plan conversation turn");
                self.error_state = true;
                TransitionPlan {
                    from: self.stage,
                    to: self.stage,
                    keys: Vec::new(),
                    messages: Vec::new(),
                    snapshot: self.snapshot(),
                }
            }
        }
    }

    async fn extract(&mut self, extractor: &dyn Extractor, message: &str, history: &[ChatMessage]) {
        match self.stage {
            Stage::Symptoms => {
                let transcript = user_transcript(history, message);
                extract::update_problem_info(extractor, &mut self.problem_info, &transcript).await;
            }
            Stage::PatientInfo => {
                let prior = last_assistant_message(history);
                extract::update_patient_info(extractor, &mut self.patient_info, message, prior)
                    .await;
            }
            Stage::Diagnosis => {}
        }
    }

    fn plan(&mut self, decision: Decision, messages: Vec<String>) -> TransitionPlan {
        self.pending_stage = Some(decision.pending);
        info!(
            user_id = %self.user_id,
            stage = %self.stage,
            next_stage = %decision.pending,
            outbound = decision.outbound.len(),
            "Planned conversation turn"
        );
        TransitionPlan {
            from: self.stage,
            to: decision.pending,
            keys: decision.outbound,
            messages,
            snapshot: self.snapshot(),
        }
    }

    /// Apply the pending stage, if any. Calling it again without a new `process` is a no-op.
    pub fn commit(&mut self) -> Result<Option<StageChange>> {
        let Some(pending) = self.pending_stage.take() else {
            return Ok(None);
        };
        self.advance(pending)
    }

    /// Apply a plan returned by [`Session::process`]. A plan made for a different stage
    /// than the current one is rejected.
    pub fn apply(&mut self, plan: TransitionPlan) -> Result<Option<StageChange>> {
        if plan.from != self.stage {
            return Err(IntakeError::InvalidTransition {
                from: self.stage,
                to: plan.to,
            });
        }
        self.pending_stage = None;
        self.advance(plan.to)
    }

    fn advance(&mut self, to: Stage) -> Result<Option<StageChange>> {
        let from = self.stage;
        if to == from {
            return Ok(None);
        }
        if !policy::is_allowed(from, to) {
            error!(user_id = %self.user_id, %from, %to, "Refusing stage transition outside the table");
            return Err(IntakeError::InvalidTransition { from, to });
        }
        self.stage = to;
        info!(user_id = %self.user_id, %from, %to, "Stage transition applied");
        Ok(Some(StageChange { from, to }))
    }
}
