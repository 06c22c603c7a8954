//! LLM-backed implementation of the extraction collaborator.
//!
//! Every kind has its own low-temperature prompt that asks for a single JSON object. The
//! answer is parsed with serde; anything else (timeout, provider error, prose instead of JSON)
//! becomes [`IntakeError::ExtractionFailed`], which the orchestrator treats as "no update".

use async_trait::async_trait;
use intake_flow::{ExtractionKind, Extractor, IntakeError, PartialUpdate, Result};
use rig::{
    completion::{Chat, Message},
    providers::openrouter,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::llm::get_llm_agent;

const EXTRACTION_TEMPERATURE: f64 = 0.1;

const AGE_PROMPT: &str = r#"Извлеките возраст пациента из сообщения. Правила:
- Верните первое упомянутое целое число от 0 до 120, которое относится к возрасту самого пациента
- Игнорируйте даты, годы рождения, диапазоны и слова вроде "молодой" или "пожилой"
- Если возраст не найден, верните null

Примеры:
"Мне 25 лет" -> {"age": 25}
"Родился в 1990" -> {"age": null}
"Младшему сыну 12, мне 40" -> {"age": 40}
"Возрастная группа 50-60 лет" -> {"age": null}

Ответьте ТОЛЬКО JSON: {"age": число или null}"#;

const CHRONIC_DISEASES_PROMPT: &str = r#"Извлеките хронические заболевания пациента. Правила:
- Учитывайте только текущие заболевания с длительным течением
- Перенесённые в прошлом болезни не учитывайте
- has_diseases=false ТОЛЬКО при явном отрицании хронических заболеваний
- Ответ на другой вопрос (например, про аллергии) не является отрицанием

Примеры:
"Хронических нет" -> {"diseases": [], "has_diseases": false}
"Гипертония и диабет 2 типа" -> {"diseases": ["Гипертония", "Диабет 2 типа"], "has_diseases": true}
"Раньше была астма" -> {"diseases": [], "has_diseases": true}
"Только аллергия на пыль" -> {"diseases": [], "has_diseases": true}

Ответьте ТОЛЬКО JSON: {"diseases": ["болезнь", ...], "has_diseases": true/false}"#;

const ALLERGIES_PROMPT: &str = r#"Извлеките аллергии пациента. Правила:
- Учитывайте только подтверждённые аллергии
- has_allergies=false ТОЛЬКО при прямом отрицании аллергий
- Отсутствие информации не является отрицанием

Примеры:
"Нет аллергии" -> {"allergies": [], "has_allergies": false}
"На пенициллин и орехи" -> {"allergies": ["Пенициллин", "Орехи"], "has_allergies": true}
"Не знаю, не проверялся" -> {"allergies": [], "has_allergies": true}
"Кошачья шерсть вызывает чихание" -> {"allergies": ["Кошачья шерсть"], "has_allergies": true}

Ответьте ТОЛЬКО JSON: {"allergies": ["аллерген", ...], "has_allergies": true/false}"#;

const SYMPTOMS_PROMPT: &str = r#"Вы - медицинский ассистент. Перед вами все сообщения пациента.
Выделите все упомянутые симптомы короткими формулировками (например, "Боль в горле").

Поле complete равно true ТОЛЬКО если пациент явно закончил описание
("больше ничего", "это всё", "других жалоб нет"), сообщил, что ничего не беспокоит,
или описание однозначно исчерпывающее. Упоминание одного симптома не делает описание полным.

Ответьте ТОЛЬКО JSON: {"symptoms": ["симптом", ...], "complete": true/false}"#;

fn prompt_for(kind: ExtractionKind) -> &'static str {
    match kind {
        ExtractionKind::Age => AGE_PROMPT,
        ExtractionKind::ChronicDiseases => CHRONIC_DISEASES_PROMPT,
        ExtractionKind::Allergies => ALLERGIES_PROMPT,
        ExtractionKind::Symptoms => SYMPTOMS_PROMPT,
    }
}

#[derive(Deserialize)]
struct AgeAnswer {
    age: Option<f64>,
}

#[derive(Deserialize)]
struct ChronicDiseasesAnswer {
    #[serde(default)]
    diseases: Vec<String>,
    has_diseases: bool,
}

#[derive(Deserialize)]
struct AllergiesAnswer {
    #[serde(default)]
    allergies: Vec<String>,
    has_allergies: bool,
}

#[derive(Deserialize)]
struct SymptomsAnswer {
    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default)]
    complete: bool,
}

/// The outermost JSON object in a model response, tolerating code fences and prose around it
fn json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Parse a model response for `kind` into a partial update
pub fn parse_update(kind: ExtractionKind, response: &str) -> Result<PartialUpdate> {
    let json = json_object(response)
        .ok_or_else(|| IntakeError::extraction(kind, "no JSON object in response"))?;
    let malformed = |e: serde_json::Error| IntakeError::extraction(kind, e.to_string());

    let update = match kind {
        ExtractionKind::Age => {
            let answer: AgeAnswer = serde_json::from_str(json).map_err(malformed)?;
            PartialUpdate::Age {
                age: answer.age.map(|age| age.trunc() as i64),
            }
        }
        ExtractionKind::ChronicDiseases => {
            let answer: ChronicDiseasesAnswer = serde_json::from_str(json).map_err(malformed)?;
            PartialUpdate::ChronicDiseases {
                diseases: answer.diseases,
                has_diseases: answer.has_diseases,
            }
        }
        ExtractionKind::Allergies => {
            let answer: AllergiesAnswer = serde_json::from_str(json).map_err(malformed)?;
            PartialUpdate::Allergies {
                allergies: answer.allergies,
                has_allergies: answer.has_allergies,
            }
        }
        ExtractionKind::Symptoms => {
            let answer: SymptomsAnswer = serde_json::from_str(json).map_err(malformed)?;
            PartialUpdate::Symptoms {
                symptoms: answer.symptoms,
                complete: answer.complete,
            }
        }
    };
    Ok(update)
}

/// [`Extractor`] that asks an OpenRouter model
#[derive(Clone)]
pub struct LlmExtractor {
    client: openrouter::Client,
    model: String,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(client: openrouter::Client, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    #[instrument(skip(self, message, prior_assistant_message), fields(model = %self.model))]
    async fn extract(
        &self,
        kind: ExtractionKind,
        message: &str,
        prior_assistant_message: Option<&str>,
    ) -> Result<PartialUpdate> {
        let agent = get_llm_agent(
            &self.client,
            &self.model,
            prompt_for(kind),
            EXTRACTION_TEMPERATURE,
        );
        let history: Vec<Message> = prior_assistant_message
            .map(|prior| Message::assistant(prior.to_string()))
            .into_iter()
            .collect();

        let response = tokio::time::timeout(self.timeout, agent.chat(message.to_string(), history))
            .await
            .map_err(|_| {
                IntakeError::extraction(kind, format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| IntakeError::extraction(kind, e.to_string()))?;

        debug!(%kind, response = %response, "Extraction response");
        parse_update(kind, &response)
    }
}
