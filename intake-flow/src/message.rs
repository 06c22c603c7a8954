use serde::{Deserialize, Serialize};

/// Author of a message in the conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A single entry of the conversation history as the caller keeps it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

/// Content of the most recent assistant message, if any
pub fn last_assistant_message(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|msg| msg.role == MessageRole::Assistant)
        .map(|msg| msg.content.as_str())
}

/// Everything the user has written so far, followed by `current`, one message per line
pub fn user_transcript(history: &[ChatMessage], current: &str) -> String {
    history
        .iter()
        .filter(|msg| msg.role == MessageRole::User)
        .map(|msg| msg.content.trim())
        .chain(std::iter::once(current.trim()))
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::assistant("Здравствуйте! Опишите симптомы."),
            ChatMessage::user("Болит голова"),
            ChatMessage::assistant("Как давно?"),
            ChatMessage::system("internal note"),
            ChatMessage::user("Третий день"),
        ]
    }

    #[test]
    fn finds_last_assistant_message() {
        let history = history();
        assert_eq!(last_assistant_message(&history), Some("Как давно?"));
        assert_eq!(last_assistant_message(&[]), None);
    }

    #[test]
    fn transcript_keeps_only_user_text() {
        let transcript = user_transcript(&history(), "И тошнит");
        assert_eq!(transcript, "Болит голова\nТретий день\nИ тошнит");
    }

    #[test]
    fn role_uses_lowercase_wire_name() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
    }
}
