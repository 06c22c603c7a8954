use intake_flow::{ConversationStateSnapshot, PatientInfo, Stage};

pub const LITERATURE_HEADER: &str = "Контекст из медицинской литературы:";

const SYMPTOMS_PROMPT: &str = r#"Вы - медицинский ассистент. Ваша задача - подробно расспросить пациента о симптомах.

Правила:
1. Задавайте по одному уточняющему вопросу за раз.
2. Уточняйте локализацию, характер, длительность и сопутствующие проявления (температура, тошнота).
3. Избегайте медицинского жаргона.
4. Не спрашивайте о возрасте, аллергиях и хронических заболеваниях: это следующий этап.

Особые случаи:
- При опасных симптомах (кровотечение, потеря сознания, боль в груди) рекомендуйте немедленно вызвать скорую помощь.
- Если описание неясно, попросите сравнить ощущение с чем-то знакомым."#;

const PATIENT_INFO_PROMPT: &str = r#"Вы - медицинский регистратор. Соберите строго по порядку:
1. Возраст (полных лет, только число).
2. Хронические заболевания (текущие, а не перенесённые).
3. Аллергии (лекарственные, пищевые и другие).

Правила:
- Задавайте вопросы по очереди в указанном порядке.
- Подтверждайте полученный ответ, прежде чем перейти к следующему пункту.
- При отрицании подтвердите его, например: "Записал, хронических заболеваний нет".
- Не обсуждайте возможные диагнозы на этом этапе."#;

const DIAGNOSIS_PROMPT: &str = r#"Вы - диагностический ассистент. Анализируйте ТОЛЬКО предоставленные данные о пациенте:

{patient}

Структура ответа:
1. **Возможные диагнозы** (не более трёх, по приоритету) с оценкой вероятности (низкая/средняя/высокая) и обоснованием.
2. **Рекомендации**: к какому специалисту и в какой срок обратиться, тревожные симптомы, за чем наблюдать самостоятельно.
3. **Ограничения**: "Это предварительная оценка. Точный диагноз требует очного осмотра. При ухудшении состояния немедленно обратитесь в скорую помощь.""#;

fn join_or(items: impl Iterator<Item = impl AsRef<str>>, empty: &str) -> String {
    let items: Vec<String> = items.map(|item| item.as_ref().to_string()).collect();
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn describe_list<'a>(present: bool, items: impl Iterator<Item = &'a str>) -> String {
    if present {
        join_or(items, "не указаны")
    } else {
        "нет".to_string()
    }
}

/// Human-readable summary of the collected facts
pub fn describe_patient(symptoms: &[String], patient: &PatientInfo) -> String {
    let age = patient
        .age()
        .map_or_else(|| "не указан".to_string(), |age| age.to_string());
    format!(
        "Симптомы: {}\nВозраст: {}\nХронические заболевания: {}\nАллергии: {}",
        join_or(symptoms.iter(), "не указаны"),
        age,
        describe_list(
            patient.has_chronic_diseases(),
            patient.chronic_diseases().iter()
        ),
        describe_list(patient.has_allergies(), patient.allergies().iter()),
    )
}

/// System prompt for the stage the conversation is in
pub fn system_prompt(snapshot: &ConversationStateSnapshot) -> String {
    match snapshot.current_stage {
        Stage::Symptoms => SYMPTOMS_PROMPT.to_string(),
        Stage::PatientInfo => PATIENT_INFO_PROMPT.to_string(),
        Stage::Diagnosis => DIAGNOSIS_PROMPT.replace(
            "{patient}",
            &describe_patient(&snapshot.symptoms, &snapshot.patient_info),
        ),
    }
}

/// Append retrieved literature to a prompt. Empty context leaves the prompt unchanged.
pub fn with_literature(prompt: String, context: &str) -> String {
    if context.trim().is_empty() {
        return prompt;
    }
    format!("{prompt}\n\n{LITERATURE_HEADER}\n{context}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_flow::Session;

    fn snapshot(stage: Stage) -> ConversationStateSnapshot {
        let mut snapshot = Session::new("u1").snapshot();
        snapshot.current_stage = stage;
        snapshot
    }

    #[test]
    fn each_stage_has_its_own_prompt() {
        let symptoms = system_prompt(&snapshot(Stage::Symptoms));
        let patient = system_prompt(&snapshot(Stage::PatientInfo));
        let diagnosis = system_prompt(&snapshot(Stage::Diagnosis));
        assert!(symptoms.contains("симптомах"));
        assert!(patient.contains("регистратор"));
        assert!(diagnosis.contains("диагностический"));
        assert_ne!(symptoms, patient);
    }

    #[test]
    fn diagnosis_prompt_lists_collected_facts() {
        let mut patient = PatientInfo::new();
        patient.set_age(42).unwrap();
        patient.add_chronic_diseases(["Гипертония", "Диабет 2 типа"]);
        patient.deny_allergies();

        let mut snapshot = snapshot(Stage::Diagnosis);
        snapshot.symptoms = vec!["Головная боль".into(), "Тошнота".into()];
        snapshot.patient_info = patient;

        let prompt = system_prompt(&snapshot);
        assert!(prompt.contains("Симптомы: Головная боль, Тошнота"));
        assert!(prompt.contains("Возраст: 42"));
        assert!(prompt.contains("Хронические заболевания: Гипертония, Диабет 2 типа"));
        assert!(prompt.contains("Аллергии: нет"));
        assert!(!prompt.contains("{patient}"));
    }

    #[test]
    fn literature_goes_under_its_header() {
        let prompt = with_literature("base".to_string(), "Мигрень - ...");
        assert_eq!(prompt, format!("base\n\n{LITERATURE_HEADER}\nМигрень - ..."));
        assert_eq!(with_literature("base".to_string(), "  "), "base");
    }
}
