//! Stage transition policy.
//!
//! Every legal stage change is a row of [`TRANSITIONS`]. [`decide`] is a pure function of the
//! committed stage and the entity state; it never changes anything itself.

use crate::{
    catalog::MessageKey,
    entities::{PatientInfo, ProblemInfo, Requirement},
    stage::Stage,
};

/// Readiness predicate over the entity state
pub type Predicate = fn(&ProblemInfo, &PatientInfo) -> bool;

/// One row of the transition table
#[derive(Clone, Copy)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
    pub ready: Predicate,
    pub outbound: MessageKey,
}

fn symptoms_collected(problem: &ProblemInfo, _patient: &PatientInfo) -> bool {
    problem.symptoms_complete()
}

fn patient_described(_problem: &ProblemInfo, patient: &PatientInfo) -> bool {
    patient.is_complete()
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Stage::Symptoms,
        to: Stage::PatientInfo,
        ready: symptoms_collected,
        outbound: MessageKey::Transition {
            from: Stage::Symptoms,
            to: Stage::PatientInfo,
        },
    },
    Transition {
        from: Stage::PatientInfo,
        to: Stage::Diagnosis,
        ready: patient_described,
        outbound: MessageKey::Transition {
            from: Stage::PatientInfo,
            to: Stage::Diagnosis,
        },
    },
];

/// The table row leaving `stage`, if any
pub fn transition_from(stage: Stage) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == stage)
}

/// Whether `from -> to` is a row of the table
pub fn is_allowed(from: Stage, to: Stage) -> bool {
    TRANSITIONS.iter().any(|t| t.from == from && t.to == to)
}

/// Outcome of the policy for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub pending: Stage,
    pub outbound: Vec<MessageKey>,
}

impl Decision {
    pub fn is_transition(&self, from: Stage) -> bool {
        self.pending != from
    }
}

fn missing_info_key(requirement: Requirement) -> MessageKey {
    match requirement {
        Requirement::Age => MessageKey::MissingAge,
        Requirement::ChronicDiseases => MessageKey::MissingChronicDiseases,
        Requirement::Allergies => MessageKey::MissingAllergies,
    }
}

/// Keys asking for information the current stage still lacks
fn incomplete_info(stage: Stage, patient: &PatientInfo) -> Vec<MessageKey> {
    match stage {
        Stage::PatientInfo => patient
            .first_missing()
            .map(missing_info_key)
            .into_iter()
            .collect(),
        Stage::Symptoms | Stage::Diagnosis => Vec::new(),
    }
}

/// When the stage changes only transition messages may go out
fn keep_transition_messages_only(mut decision: Decision, from: Stage) -> Decision {
    if decision.is_transition(from) {
        decision.outbound.retain(MessageKey::is_transition);
    }
    decision
}

/// Compute the pending stage and outbound message keys for a session in `stage`
pub fn decide(stage: Stage, problem: &ProblemInfo, patient: &PatientInfo) -> Decision {
    let mut decision = Decision {
        pending: stage,
        outbound: incomplete_info(stage, patient),
    };

    if let Some(transition) = transition_from(stage) {
        if (transition.ready)(problem, patient) {
            decision.pending = transition.to;
            decision.outbound.push(transition.outbound);
        }
    }

    keep_transition_messages_only(decision, stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_patient() -> PatientInfo {
        let mut patient = PatientInfo::new();
        patient.set_age(30).unwrap();
        patient.add_chronic_diseases(["Гипертония"]);
        patient.deny_allergies();
        patient
    }

    #[test]
    fn table_follows_canonical_order() {
        for transition in TRANSITIONS {
            assert_eq!(transition.from.next(), Some(transition.to));
            assert_eq!(
                transition.outbound,
                MessageKey::transition(transition.from, transition.to)
            );
        }
        assert!(transition_from(Stage::Diagnosis).is_none());
        assert!(!is_allowed(Stage::Symptoms, Stage::Diagnosis));
    }

    #[test]
    fn symptoms_stay_until_explicitly_complete() {
        let mut problem = ProblemInfo::new();
        problem.add_symptoms(["Кашель"]);
        let decision = decide(Stage::Symptoms, &problem, &PatientInfo::new());
        assert_eq!(decision.pending, Stage::Symptoms);
        assert!(decision.outbound.is_empty());

        problem.mark_complete();
        let decision = decide(Stage::Symptoms, &problem, &PatientInfo::new());
        assert_eq!(decision.pending, Stage::PatientInfo);
        assert_eq!(
            decision.outbound,
            vec![MessageKey::transition(Stage::Symptoms, Stage::PatientInfo)]
        );
    }

    #[test]
    fn patient_info_queues_only_the_first_missing_item() {
        let problem = ProblemInfo::new();
        let decision = decide(Stage::PatientInfo, &problem, &PatientInfo::new());
        assert_eq!(decision.pending, Stage::PatientInfo);
        assert_eq!(decision.outbound, vec![MessageKey::MissingAge]);

        let mut patient = PatientInfo::new();
        patient.set_age(30).unwrap();
        let decision = decide(Stage::PatientInfo, &problem, &patient);
        assert_eq!(decision.outbound, vec![MessageKey::MissingChronicDiseases]);
    }

    #[test]
    fn complete_patient_moves_to_diagnosis_with_transition_message_only() {
        let decision = decide(Stage::PatientInfo, &ProblemInfo::new(), &complete_patient());
        assert_eq!(decision.pending, Stage::Diagnosis);
        assert!(decision.outbound.iter().all(MessageKey::is_transition));
        assert_eq!(decision.outbound.len(), 1);
    }

    #[test]
    fn diagnosis_is_terminal() {
        let mut problem = ProblemInfo::new();
        problem.mark_complete();
        let decision = decide(Stage::Diagnosis, &problem, &complete_patient());
        assert_eq!(decision.pending, Stage::Diagnosis);
        assert!(decision.outbound.is_empty());
    }

    #[test]
    fn transition_filter_drops_missing_info_keys() {
        let decision = Decision {
            pending: Stage::Diagnosis,
            outbound: vec![
                MessageKey::MissingAllergies,
                MessageKey::transition(Stage::PatientInfo, Stage::Diagnosis),
            ],
        };
        let filtered = keep_transition_messages_only(decision, Stage::PatientInfo);
        assert_eq!(
            filtered.outbound,
            vec![MessageKey::transition(Stage::PatientInfo, Stage::Diagnosis)]
        );

        let staying = Decision {
            pending: Stage::PatientInfo,
            outbound: vec![MessageKey::MissingAllergies],
        };
        let kept = keep_transition_messages_only(staying.clone(), Stage::PatientInfo);
        assert_eq!(kept, staying);
    }
}
