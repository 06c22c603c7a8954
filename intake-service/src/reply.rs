use async_trait::async_trait;
use intake_flow::ChatMessage;
use rig::{completion::Chat, providers::openrouter};
use tracing::{info, instrument};

use crate::llm::{get_llm_agent, to_rig_history};

const REPLY_TEMPERATURE: f64 = 0.7;

/// Generates the assistant's free-text answer for one turn
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> anyhow::Result<String>;
}

/// [`ReplyGenerator`] backed by an OpenRouter chat model
pub struct RigReplyGenerator {
    client: openrouter::Client,
    model: String,
}

impl RigReplyGenerator {
    pub fn new(client: openrouter::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReplyGenerator for RigReplyGenerator {
    #[instrument(skip_all, fields(model = %self.model, history_len = history.len()))]
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> anyhow::Result<String> {
        let (chat_history, system_notes) = to_rig_history(history);
        let preamble = if system_notes.is_empty() {
            system_prompt.to_string()
        } else {
            format!("{system_prompt}\n\n{}", system_notes.join("\n"))
        };

        let agent = get_llm_agent(&self.client, &self.model, &preamble, REPLY_TEMPERATURE);
        let response = agent
            .chat(message.to_string(), chat_history)
            .await
            .map_err(|e| anyhow::anyhow!("Reply generation failed: {}", e))?;

        info!(response_len = response.len(), "Reply generated");
        Ok(response)
    }
}
