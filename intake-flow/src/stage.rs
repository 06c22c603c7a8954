use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::IntakeError;

/// Dialogue phase of an intake conversation.
///
/// The canonical order is `Symptoms -> PatientInfo -> Diagnosis`. `Diagnosis` is terminal:
/// once a session is there it never leaves automatically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Symptoms,
    PatientInfo,
    Diagnosis,
}

impl Stage {
    /// All stages in canonical order
    pub const ALL: [Stage; 3] = [Stage::Symptoms, Stage::PatientInfo, Stage::Diagnosis];

    /// Stage every new session starts in
    pub const INITIAL: Stage = Stage::Symptoms;

    pub fn name(self) -> &'static str {
        match self {
            Stage::Symptoms => "SYMPTOMS",
            Stage::PatientInfo => "PATIENT_INFO",
            Stage::Diagnosis => "DIAGNOSIS",
        }
    }

    /// The stage that follows this one in canonical order
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Symptoms => Some(Stage::PatientInfo),
            Stage::PatientInfo => Some(Stage::Diagnosis),
            Stage::Diagnosis => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IntakeError::UnknownStage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_ends_in_diagnosis() {
        assert_eq!(Stage::INITIAL, Stage::Symptoms);
        assert_eq!(Stage::default(), Stage::INITIAL);
        assert_eq!(Stage::Symptoms.next(), Some(Stage::PatientInfo));
        assert_eq!(Stage::PatientInfo.next(), Some(Stage::Diagnosis));
        assert!(Stage::Diagnosis.is_terminal());
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
        assert!(matches!(
            "TRIAGE".parse::<Stage>(),
            Err(IntakeError::UnknownStage(_))
        ));
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_string(&Stage::PatientInfo).unwrap();
        assert_eq!(json, "\"PATIENT_INFO\"");
    }
}
