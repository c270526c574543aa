pub mod clova;
pub mod openai;

pub use clova::ClovaClient;
pub use openai::OpenAiClient;

use crate::traits::LlmClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// `temperature` and `max_tokens` fall back to the client's configured values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_message),
            ],
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Clova,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Clova => "clova",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "clova" | "hyperclova" => Ok(LlmProvider::Clova),
            other => Err(format!("unknown llm provider: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct LlmClients {
    openai: Arc<dyn LlmClient>,
    clova: Arc<dyn LlmClient>,
}

impl LlmClients {
    pub fn new(openai: Arc<dyn LlmClient>, clova: Arc<dyn LlmClient>) -> Self {
        Self { openai, clova }
    }

    /// Clova only when it is requested and has credentials; OpenAI otherwise.
    pub fn select(&self, provider: LlmProvider) -> Arc<dyn LlmClient> {
        match provider {
            LlmProvider::Clova if self.clova.is_available() => Arc::clone(&self.clova),
            _ => Arc::clone(&self.openai),
        }
    }

    pub fn model_infos(&self) -> Vec<ModelInfo> {
        vec![self.openai.model_info(), self.clova.model_info()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    #[test]
    fn clova_is_selected_only_when_available() {
        let openai: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::named("openai", &["ok"]));
        let offline_clova: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::offline("clova"));
        let clients = LlmClients::new(Arc::clone(&openai), offline_clova);
        assert_eq!(clients.select(LlmProvider::Clova).model_info().provider, "openai");

        let online_clova: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::named("clova", &["ok"]));
        let clients = LlmClients::new(openai, online_clova);
        assert_eq!(clients.select(LlmProvider::Clova).model_info().provider, "clova");
        assert_eq!(clients.select(LlmProvider::OpenAi).model_info().provider, "openai");
    }

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse::<LlmProvider>(), Ok(LlmProvider::OpenAi));
        assert_eq!("clova".parse::<LlmProvider>(), Ok(LlmProvider::Clova));
        assert!("gemini".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn request_exposes_last_user_message() {
        let request = CompletionRequest::new("be precise", "what is a lien?");
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.user_text(), Some("what is a lien?"));
    }
}
