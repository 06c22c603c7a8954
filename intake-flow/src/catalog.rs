use serde::{Serialize, Serializer};
use std::{collections::HashMap, fmt};

use crate::{
    error::{IntakeError, Result},
    stage::Stage,
};

/// Version of the key set below. Bump when keys are added, removed or renamed.
pub const CATALOG_VERSION: u32 = 1;

/// Key of a canned message the orchestrator can ask the caller to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Start,
    Transition { from: Stage, to: Stage },
    MissingAge,
    MissingChronicDiseases,
    MissingAllergies,
}

impl MessageKey {
    pub fn transition(from: Stage, to: Stage) -> Self {
        MessageKey::Transition { from, to }
    }

    /// Whether this is a stage-transition message
    pub fn is_transition(&self) -> bool {
        matches!(self, MessageKey::Transition { .. })
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Start => f.write_str("START"),
            MessageKey::Transition { from, to } => write!(f, "TRANSITION_{from}_TO_{to}"),
            MessageKey::MissingAge => f.write_str("MISSING_AGE"),
            MessageKey::MissingChronicDiseases => f.write_str("MISSING_CHRONIC_DISEASES"),
            MessageKey::MissingAllergies => f.write_str("MISSING_ALLERGIES"),
        }
    }
}

impl Serialize for MessageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Collaborator that turns a message key into the ordered messages to send
pub trait MessageCatalog: Send + Sync {
    fn render(&self, key: MessageKey) -> Result<Vec<String>>;
}

/// In-memory catalog
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    entries: HashMap<MessageKey, Vec<String>>,
}

impl StaticCatalog {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The stock Russian-language catalog
    pub fn russian() -> Self {
        Self::empty()
            .with_entry(
                MessageKey::Start,
                [
                    "Здравствуйте! Я - медицинский ассистент, который поможет вам разобраться \
                     с вашими симптомами. Я соберу информацию о вашем состоянии, предложу \
                     предварительный диагноз и подскажу, к какому специалисту лучше обратиться.",
                    "Для начала опишите, пожалуйста, что вас беспокоит: какие симптомы, как \
                     давно они появились и насколько они выражены.",
                ],
            )
            .with_entry(
                MessageKey::transition(Stage::Symptoms, Stage::PatientInfo),
                [
                    "Спасибо, я записал ваши симптомы. Теперь несколько вопросов о вас:\n\
                     - Сколько вам лет?\n\
                     - Есть ли у вас хронические заболевания?\n\
                     - Есть ли у вас аллергии на что-либо?",
                ],
            )
            .with_entry(
                MessageKey::transition(Stage::PatientInfo, Stage::Diagnosis),
                [
                    "Спасибо за предоставленную информацию. На основе собранных данных я \
                     проанализирую вашу ситуацию, предложу предварительный диагноз и подскажу, \
                     к какому специалисту лучше обратиться.",
                ],
            )
            .with_entry(MessageKey::MissingAge, ["Пожалуйста, укажите ваш возраст."])
            .with_entry(
                MessageKey::MissingChronicDiseases,
                ["Расскажите, есть ли у вас хронические заболевания? Если нет, так и напишите."],
            )
            .with_entry(
                MessageKey::MissingAllergies,
                ["Есть ли у вас какие-либо аллергии? Если нет, так и напишите."],
            )
    }

    pub fn with_entry<I, S>(mut self, key: MessageKey, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(key, messages.into_iter().map(Into::into).collect());
        self
    }

    pub fn without(mut self, key: MessageKey) -> Self {
        self.entries.remove(&key);
        self
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::russian()
    }
}

impl MessageCatalog for StaticCatalog {
    fn render(&self, key: MessageKey) -> Result<Vec<String>> {
        self.entries
            .get(&key)
            .cloned()
            .ok_or(IntakeError::MissingTemplate(key))
    }
}

/// Render every key in order, concatenating the messages
pub fn render_all(catalog: &dyn MessageCatalog, keys: &[MessageKey]) -> Result<Vec<String>> {
    let mut messages = Vec::new();
    for key in keys {
        messages.extend(catalog.render(*key)?);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_canonical_names() {
        assert_eq!(MessageKey::Start.to_string(), "START");
        assert_eq!(
            MessageKey::transition(Stage::Symptoms, Stage::PatientInfo).to_string(),
            "TRANSITION_SYMPTOMS_TO_PATIENT_INFO"
        );
        assert_eq!(
            MessageKey::MissingChronicDiseases.to_string(),
            "MISSING_CHRONIC_DISEASES"
        );
        assert_eq!(
            serde_json::to_value(MessageKey::MissingAge).unwrap(),
            "MISSING_AGE"
        );
    }

    #[test]
    fn stock_catalog_covers_every_key() {
        let catalog = StaticCatalog::russian();
        let keys = [
            MessageKey::Start,
            MessageKey::transition(Stage::Symptoms, Stage::PatientInfo),
            MessageKey::transition(Stage::PatientInfo, Stage::Diagnosis),
            MessageKey::MissingAge,
            MessageKey::MissingChronicDiseases,
            MessageKey::MissingAllergies,
        ];
        for key in keys {
            assert!(!catalog.render(key).unwrap().is_empty(), "{key} is empty");
        }
        assert_eq!(catalog.render(MessageKey::Start).unwrap().len(), 2);
    }

    #[test]
    fn missing_key_is_an_error() {
        let catalog = StaticCatalog::russian().without(MessageKey::MissingAge);
        assert!(matches!(
            catalog.render(MessageKey::MissingAge),
            Err(IntakeError::MissingTemplate(MessageKey::MissingAge))
        ));
    }

    #[test]
    fn render_all_keeps_key_order() {
        let catalog = StaticCatalog::empty()
            .with_entry(MessageKey::MissingAge, ["age"])
            .with_entry(MessageKey::MissingAllergies, ["allergies"]);
        let messages =
            render_all(&catalog, &[MessageKey::MissingAllergies, MessageKey::MissingAge]).unwrap();
        assert_eq!(messages, vec!["allergies", "age"]);
    }
}
