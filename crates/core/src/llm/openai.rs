use super::{CompletionRequest, ModelInfo};
use crate::config::LlmSettings;
use crate::traits::LlmClient;
use crate::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;
use url::Url;

const PROVIDER: &str = "OpenAI";

pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    completions_url: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let base = settings.openai_base_url.trim_end_matches('/');
        let completions_url = Url::parse(&format!("{base}/chat/completions"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let api_key = settings
            .openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty());
        info!(
            model = %settings.openai_model,
            available = api_key.is_some(),
            "openai client initialised"
        );

        Ok(Self {
            client,
            api_key,
            completions_url,
            model: settings.openai_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        })
    }
}

fn completion_text(body: &Value) -> Result<String, LlmError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::BackendResponse {
            provider: PROVIDER.to_string(),
            details: "response has no choices[0].message.content".to_string(),
        })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            available: self.is_available(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::Unavailable {
                provider: PROVIDER.to_string(),
            });
        };

        let response = self
            .client
            .post(self.completions_url.clone())
            .bearer_auth(api_key)
            .json(&self.request_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse {
                provider: PROVIDER.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let body: Value = response.json().await?;
        completion_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reports_unavailable() -> Result<(), LlmError> {
        let client = OpenAiClient::new(&LlmSettings::default())?;
        assert!(!client.is_available());
        assert!(!client.model_info().available);

        let error = client
            .complete(CompletionRequest::new("system", "hello"))
            .await
            .expect_err("no api key configured");
        assert!(matches!(error, LlmError::Unavailable { .. }));
        Ok(())
    }

    #[test]
    fn body_uses_configured_defaults() -> Result<(), LlmError> {
        let settings = LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            ..LlmSettings::default()
        };
        let client = OpenAiClient::new(&settings)?;
        assert_eq!(
            client.completions_url.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );

        let mut request = CompletionRequest::new("system", "hello");
        let body = client.request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");

        request.max_tokens = Some(256);
        assert_eq!(client.request_body(&request)["max_tokens"], 256);
        Ok(())
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "answer"}}]});
        assert_eq!(completion_text(&body).ok().as_deref(), Some("answer"));
        assert!(completion_text(&json!({"choices": []})).is_err());
    }
}
