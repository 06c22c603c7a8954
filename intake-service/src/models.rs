use intake_flow::{ChatMessage, ConversationStateSnapshot, Stage};
use serde::{Deserialize, Serialize};

/// One conversation turn. `prompt` is the whole history, ending with the new user message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub prompt: Vec<ChatMessage>,
    #[serde(default)]
    pub is_start_dialog: bool,
}

/// A turn that arrives with symptoms an image analyzer already found
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageFindingsRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub prompt: Vec<ChatMessage>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub is_start_dialog: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub response: String,
    pub messages: Vec<String>,
    pub conversation_state: ConversationStateSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub is_clear_command: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub messages: Vec<String>,
    pub conversation_state: ConversationStateSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub changed: bool,
    pub from: Option<Stage>,
    pub to: Option<Stage>,
    pub conversation_state: ConversationStateSnapshot,
}
