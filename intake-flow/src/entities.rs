//! Accumulated facts about the patient and their complaint.
//!
//! Both entities are owned by a [`Session`](crate::session::Session) and only change through
//! the mutators below, each of which keeps the entity's invariants.

use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};

/// Oldest age accepted from an extraction
pub const MAX_AGE: i64 = 120;

/// Deduplicated collection of short free-text facts (symptoms, diagnoses, allergens).
///
/// Entries are trimmed, empty entries are dropped and duplicates are detected
/// case-insensitively; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSet(Vec<String>);

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every new entry, returning how many were actually added
    pub fn merge<I, S>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.0.len();
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() || self.contains(item) {
                continue;
            }
            self.0.push(item.to_string());
        }
        self.0.len() - before
    }

    pub fn contains(&self, item: &str) -> bool {
        let needle = item.trim().to_lowercase();
        self.0.iter().any(|existing| existing.to_lowercase() == needle)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: AsRef<str>> FromIterator<S> for FactSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = FactSet::new();
        set.merge(iter);
        set
    }
}

/// What the patient is complaining about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInfo {
    symptoms: FactSet,
    symptoms_complete: bool,
}

impl ProblemInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symptoms(&self) -> &FactSet {
        &self.symptoms
    }

    pub fn symptoms_complete(&self) -> bool {
        self.symptoms_complete
    }

    /// Merge newly reported symptoms. Any growth of the set invalidates a previous
    /// completeness judgment.
    pub fn add_symptoms<I, S>(&mut self, symptoms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.symptoms.merge(symptoms);
        if added > 0 {
            self.symptoms_complete = false;
        }
        added
    }

    /// Record an explicit "that's everything" signal from the extractor
    pub fn mark_complete(&mut self) {
        self.symptoms_complete = true;
    }

    /// Apply one symptom extraction: merge first, then honour the completion signal
    /// computed from the same call.
    pub fn apply_extraction(&mut self, symptoms: &[String], complete: bool) -> usize {
        let added = self.add_symptoms(symptoms);
        if complete {
            self.mark_complete();
        }
        added
    }
}

/// A patient fact the intake still needs, in the order it is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Age,
    ChronicDiseases,
    Allergies,
}

/// Demographic and clinical background of the patient.
///
/// `has_chronic_diseases` and `has_allergies` start as `true`: until the patient explicitly
/// denies them they "may have" them, and the paired list has to be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    age: Option<u8>,
    has_chronic_diseases: bool,
    chronic_diseases: FactSet,
    has_allergies: bool,
    allergies: FactSet,
}

impl Default for PatientInfo {
    fn default() -> Self {
        Self {
            age: None,
            has_chronic_diseases: true,
            chronic_diseases: FactSet::new(),
            has_allergies: true,
            allergies: FactSet::new(),
        }
    }
}

impl PatientInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn age(&self) -> Option<u8> {
        self.age
    }

    pub fn has_chronic_diseases(&self) -> bool {
        self.has_chronic_diseases
    }

    pub fn chronic_diseases(&self) -> &FactSet {
        &self.chronic_diseases
    }

    pub fn has_allergies(&self) -> bool {
        self.has_allergies
    }

    pub fn allergies(&self) -> &FactSet {
        &self.allergies
    }

    /// Set or overwrite the age. Values outside `0..=120` are rejected and leave the
    /// current age untouched.
    pub fn set_age(&mut self, age: i64) -> Result<u8> {
        let age = u8::try_from(age)
            .ok()
            .filter(|age| i64::from(*age) <= MAX_AGE)
            .ok_or(IntakeError::AgeOutOfRange(age))?;
        self.age = Some(age);
        Ok(age)
    }

    /// Add reported chronic diseases. A non-empty report also confirms the patient has some.
    pub fn add_chronic_diseases<I, S>(&mut self, diseases: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.chronic_diseases.merge(diseases);
        if !self.chronic_diseases.is_empty() {
            self.has_chronic_diseases = true;
        }
        added
    }

    /// Explicit negation: the patient has no chronic diseases
    pub fn deny_chronic_diseases(&mut self) {
        self.has_chronic_diseases = false;
        self.chronic_diseases.clear();
    }

    /// Add reported allergens. A non-empty report also confirms the patient has allergies.
    pub fn add_allergies<I, S>(&mut self, allergies: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.allergies.merge(allergies);
        if !self.allergies.is_empty() {
            self.has_allergies = true;
        }
        added
    }

    /// Explicit negation: the patient has no allergies
    pub fn deny_allergies(&mut self) {
        self.has_allergies = false;
        self.allergies.clear();
    }

    /// First unmet requirement, checking age, then chronic diseases, then allergies
    pub fn first_missing(&self) -> Option<Requirement> {
        if self.age.is_none() {
            Some(Requirement::Age)
        } else if self.has_chronic_diseases && self.chronic_diseases.is_empty() {
            Some(Requirement::ChronicDiseases)
        } else if self.has_allergies && self.allergies.is_empty() {
            Some(Requirement::Allergies)
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.age.is_some()
            && (!self.has_chronic_diseases || !self.chronic_diseases.is_empty())
            && (!self.has_allergies || !self.allergies.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_set_ignores_duplicates_and_blank_entries() {
        let mut set = FactSet::new();
        assert_eq!(set.merge(["Кашель", "  кашель ", "", "Насморк"]), 2);
        assert_eq!(set.merge(["НАСМОРК"]), 0);
        assert_eq!(set.to_vec(), vec!["Кашель", "Насморк"]);
    }

    #[test]
    fn symptom_set_never_shrinks_and_duplicates_do_not_inflate_it() {
        let mut problem = ProblemInfo::new();
        let batches: [&[&str]; 4] = [
            &["Боль в горле"],
            &["Боль в горле", "Температура"],
            &[],
            &["температура", "Слабость"],
        ];
        let mut last_len = 0;
        for batch in batches {
            problem.add_symptoms(batch.iter().copied());
            assert!(problem.symptoms().len() >= last_len);
            last_len = problem.symptoms().len();
        }
        assert_eq!(last_len, 3);
    }

    #[test]
    fn new_symptoms_reset_completion() {
        let mut problem = ProblemInfo::new();
        problem.apply_extraction(&["Боль в горле".to_string()], true);
        assert!(problem.symptoms_complete());

        problem.add_symptoms(["Боль в горле"]);
        assert!(problem.symptoms_complete(), "duplicates are not new information");

        problem.add_symptoms(["Кашель"]);
        assert!(!problem.symptoms_complete());
    }

    #[test]
    fn completion_is_never_inferred_from_symptoms() {
        let mut problem = ProblemInfo::new();
        problem.apply_extraction(&["Кашель".to_string()], false);
        assert!(!problem.symptoms_complete());
    }

    #[test]
    fn age_is_bounded() {
        let mut patient = PatientInfo::new();
        assert_eq!(patient.set_age(30).unwrap(), 30);
        assert!(matches!(
            patient.set_age(121),
            Err(IntakeError::AgeOutOfRange(121))
        ));
        assert!(patient.set_age(-1).is_err());
        assert_eq!(patient.age(), Some(30));
        assert_eq!(patient.set_age(0).unwrap(), 0);
    }

    #[test]
    fn denial_clears_list_and_report_restores_flag() {
        let mut patient = PatientInfo::new();
        patient.add_allergies(["Пенициллин"]);
        patient.deny_allergies();
        assert!(!patient.has_allergies());
        assert!(patient.allergies().is_empty());

        patient.add_allergies(["Орехи"]);
        assert!(patient.has_allergies());
        assert_eq!(patient.allergies().to_vec(), vec!["Орехи"]);
    }

    #[test]
    fn completeness_holds_for_every_update_order() {
        #[derive(Clone, Copy)]
        enum Update {
            Age,
            Diseases,
            NoDiseases,
            Allergies,
            NoAllergies,
        }

        fn apply(patient: &mut PatientInfo, update: Update) {
            match update {
                Update::Age => {
                    patient.set_age(42).unwrap();
                }
                Update::Diseases => {
                    patient.add_chronic_diseases(["Гипертония"]);
                }
                Update::NoDiseases => patient.deny_chronic_diseases(),
                Update::Allergies => {
                    patient.add_allergies(["Пыльца"]);
                }
                Update::NoAllergies => patient.deny_allergies(),
            }
        }

        let updates = [
            Update::Age,
            Update::Diseases,
            Update::NoDiseases,
            Update::Allergies,
            Update::NoAllergies,
        ];

        // every ordered pair and triple of updates
        for a in updates {
            for b in updates {
                for c in updates {
                    let mut patient = PatientInfo::new();
                    for update in [a, b, c] {
                        apply(&mut patient, update);
                        let expected = patient.age().is_some()
                            && (!patient.has_chronic_diseases()
                                || !patient.chronic_diseases().is_empty())
                            && (!patient.has_allergies() || !patient.allergies().is_empty());
                        assert_eq!(patient.is_complete(), expected);
                        assert_eq!(patient.first_missing().is_none(), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn missing_requirements_are_reported_in_order() {
        let mut patient = PatientInfo::new();
        assert_eq!(patient.first_missing(), Some(Requirement::Age));
        patient.set_age(30).unwrap();
        assert_eq!(patient.first_missing(), Some(Requirement::ChronicDiseases));
        patient.deny_chronic_diseases();
        assert_eq!(patient.first_missing(), Some(Requirement::Allergies));
        patient.add_allergies(["Кошачья шерсть"]);
        assert_eq!(patient.first_missing(), None);
        assert!(patient.is_complete());
    }

    #[test]
    fn patient_info_serializes_with_snapshot_field_names() {
        let json = serde_json::to_value(PatientInfo::new()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "age": null,
                "has_chronic_diseases": true,
                "chronic_diseases": [],
                "has_allergies": true,
                "allergies": []
            })
        );
    }
}
