use intake_flow::{ChatMessage, MessageRole};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Message,
    providers::openrouter,
};

pub fn llm_client(api_key: &str) -> openrouter::Client {
    openrouter::Client::new(api_key)
}

pub fn get_llm_agent(
    client: &openrouter::Client,
    model: &str,
    prompt: &str,
    temperature: f64,
) -> Agent<openrouter::CompletionModel> {
    client
        .agent(model)
        .preamble(prompt)
        .temperature(temperature)
        .build()
}

/// Convert stored history into rig messages.
///
/// rig has no system role inside the history, so system notes (e.g. image analysis results)
/// are returned separately for the caller to fold into the preamble.
pub fn to_rig_history(history: &[ChatMessage]) -> (Vec<Message>, Vec<String>) {
    let mut messages = Vec::with_capacity(history.len());
    let mut system_notes = Vec::new();
    for message in history {
        match message.role {
            MessageRole::User => messages.push(Message::user(message.content.clone())),
            MessageRole::Assistant => messages.push(Message::assistant(message.content.clone())),
            MessageRole::System => system_notes.push(message.content.clone()),
        }
    }
    (messages, system_notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_split_out() {
        let history = vec![
            ChatMessage::user("Болит спина"),
            ChatMessage::system("Анализ изображения выявил следующие проблемы: покраснение"),
            ChatMessage::assistant("Давно болит?"),
        ];
        let (messages, notes) = to_rig_history(&history);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            notes,
            vec!["Анализ изображения выявил следующие проблемы: покраснение"]
        );
    }
}
