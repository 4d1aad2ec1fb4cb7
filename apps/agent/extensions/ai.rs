use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("response does not match the expected schema: {0}")]
    SchemaValidation(String),
    #[error("AI request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait AiClient: Send + Sync {
    fn model(&self) -> &str;

    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String, JudgeError>;

    /// Generates a JSON object constrained by `schema`.
    async fn generate_structured(&self, system_prompt: &str, user_prompt: &str, schema_name: &str, schema: &Value) -> Result<Value, JudgeError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenRouter or any OpenAI-compatible endpoint.
pub struct OpenRouterClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn complete(&self, body: Value) -> Result<String, JudgeError> {
        let payload = serde_json::to_string(&body).map_err(|e| JudgeError::Request(e.to_string()))?;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .body(payload)
            .send()
            .await
            .map_err(|e| JudgeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(JudgeError::Request(format!("status={status}, body={text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| JudgeError::Request(e.to_string()))?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| JudgeError::Request(format!("unreadable completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| JudgeError::Request("completion contained no content".to_string()))
    }
}

/// Models sometimes wrap JSON in a markdown fence even when asked not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl AiClient for OpenRouterClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "ai_generate_text", skip_all)]
    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String, JudgeError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });
        self.complete(body).await
    }

    #[instrument(name = "ai_generate_structured", skip_all, fields(schema = schema_name))]
    async fn generate_structured(&self, system_prompt: &str, user_prompt: &str, schema_name: &str, schema: &Value) -> Result<Value, JudgeError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": schema_name, "strict": true, "schema": schema },
            },
        });

        let content = self.complete(body).await?;
        debug!(length = content.len(), "Structured completion received");

        let value: Value = serde_json::from_str(strip_code_fence(&content)).map_err(|e| JudgeError::SchemaValidation(format!("not JSON: {e}")))?;
        if !value.is_object() {
            return Err(JudgeError::SchemaValidation("expected a JSON object".to_string()));
        }
        Ok(value)
    }
}
