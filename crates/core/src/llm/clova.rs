use super::{CompletionRequest, ModelInfo};
use crate::config::LlmSettings;
use crate::traits::LlmClient;
use crate::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const PROVIDER: &str = "NAVER HyperClova-X";
const MODEL: &str = "HCX-003";

struct Credentials {
    api_key: String,
    apigw_api_key: String,
}

/// HyperClova-X chat completions. Both the studio key and the gateway key are required.
pub struct ClovaClient {
    client: Client,
    endpoint: Url,
    credentials: Option<Credentials>,
    temperature: f32,
    max_tokens: u32,
}

impl ClovaClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let endpoint = Url::parse(&settings.clova_endpoint)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let credentials = match (&settings.clova_api_key, &settings.clova_apigw_api_key) {
            (Some(api_key), Some(apigw_api_key))
                if !api_key.trim().is_empty() && !apigw_api_key.trim().is_empty() =>
            {
                info!(model = MODEL, "hyperclova client initialised");
                Some(Credentials {
                    api_key: api_key.clone(),
                    apigw_api_key: apigw_api_key.clone(),
                })
            }
            _ => {
                warn!("hyperclova credentials not available");
                None
            }
        };

        Ok(Self {
            client,
            endpoint,
            credentials,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        json!({
            "messages": request.messages,
            "topP": 0.8,
            "topK": 0,
            "maxTokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature.unwrap_or(self.temperature),
            "repeatPenalty": 5.0,
            "stopBefore": [],
            "includeAiFilters": true,
        })
    }
}

fn completion_text(body: &Value) -> Result<String, LlmError> {
    body.pointer("/result/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::BackendResponse {
            provider: PROVIDER.to_string(),
            details: "response has no result.message.content".to_string(),
        })
}

#[async_trait]
impl LlmClient for ClovaClient {
    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: PROVIDER.to_string(),
            model: MODEL.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            available: self.is_available(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let Some(credentials) = &self.credentials else {
            return Err(LlmError::Unavailable {
                provider: PROVIDER.to_string(),
            });
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-NCP-CLOVASTUDIO-API-KEY", &credentials.api_key)
            .header("X-NCP-APIGW-API-KEY", &credentials.apigw_api_key)
            .json(&self.request_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::BackendResponse {
                provider: PROVIDER.to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        completion_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_keys_are_required() -> Result<(), LlmError> {
        let only_one = LlmSettings {
            clova_api_key: Some("studio".to_string()),
            ..LlmSettings::default()
        };
        assert!(!ClovaClient::new(&only_one)?.is_available());

        let both = LlmSettings {
            clova_api_key: Some("studio".to_string()),
            clova_apigw_api_key: Some("gateway".to_string()),
            ..LlmSettings::default()
        };
        let client = ClovaClient::new(&both)?;
        assert!(client.is_available());
        assert_eq!(client.model_info().model, "HCX-003");
        Ok(())
    }

    #[test]
    fn body_carries_sampling_parameters() -> Result<(), LlmError> {
        let client = ClovaClient::new(&LlmSettings::default())?;
        let body = client.request_body(&CompletionRequest::new("system", "question"));
        assert_eq!(body["maxTokens"], 4096);
        assert_eq!(body["topK"], 0);
        assert_eq!(body["messages"][1]["role"], "user");
        Ok(())
    }

    #[test]
    fn completion_text_reads_result_message() {
        let body = json!({
            "status": {"code": "20000"},
            "result": {"message": {"role": "assistant", "content": "답변"}}
        });
        assert_eq!(completion_text(&body).ok().as_deref(), Some("답변"));
        assert!(completion_text(&json!({"status": {"code": "40000"}})).is_err());
    }
}
