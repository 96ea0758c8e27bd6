//! OpenAI implementation of the [`Classifier`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use rfi_scanner::ai::OpenAiClassifier;
//!
//! let classifier = OpenAiClassifier::new("sk-...").with_model("gpt-4o-mini");
//! let cascade = ClassificationCascade::new(Arc::new(classifier), CascadeConfig::default());
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::prompts::{
    format_detect_request_prompt, format_match_category_prompt, format_screen_prompt,
};
use crate::error::{ClassifierError, ClassifierResult};
use crate::traits::classifier::{CategoryAssessment, Classifier, RequestAssessment};
use crate::types::category::Category;

const SYSTEM_PROMPT: &str =
    "You classify planning documents. Respond with a single JSON object and nothing else.";

/// OpenAI-based classifier.
///
/// Uses structured outputs (`json_schema`) so every answer parses into a
/// typed assessment.
#[derive(Clone)]
pub struct OpenAiClassifier {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClassifier {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::from(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> ClassifierResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClassifierError::Config("OPENAI_API_KEY not set".into()))?;
        if api_key.trim().is_empty() {
            return Err(ClassifierError::Config("OPENAI_API_KEY is empty".into()));
        }
        Ok(Self::new(api_key))
    }

    /// Set the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout (default: 60s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion constrained to `schema`, parsed into `T`.
    async fn structured<T: DeserializeOwned>(
        &self,
        name: &str,
        user: String,
        schema: serde_json::Value,
    ) -> ClassifierResult<T> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::Malformed("no choices in response".into()))?;

        debug!(name, len = content.len(), "classifier responded");
        parse_json(&content)
    }
}

fn transport_error(e: reqwest::Error) -> ClassifierError {
    if e.is_timeout() {
        ClassifierError::Timeout
    } else if let Some(status) = e.status() {
        ClassifierError::Http {
            status: status.as_u16(),
            body: e.to_string(),
        }
    } else {
        ClassifierError::Transport(e.to_string())
    }
}

/// Parse a JSON answer, tolerating a markdown code fence around it.
pub(crate) fn parse_json<T: DeserializeOwned>(response: &str) -> ClassifierResult<T> {
    serde_json::from_str(response)
        .or_else(|_| {
            let json_str = response
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(json_str)
        })
        .map_err(|e| ClassifierError::Malformed(e.to_string()))
}

fn screen_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "plausible": { "type": "boolean" } },
        "required": ["plausible"],
        "additionalProperties": false
    })
}

fn request_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "is_request": { "type": "boolean" },
            "reason": { "type": "string" }
        },
        "required": ["is_request", "reason"],
        "additionalProperties": false
    })
}

fn category_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "matches": { "type": "boolean" },
            "quote": { "type": ["string", "null"] },
            "reason": { "type": "string" }
        },
        "required": ["matches", "quote", "reason"],
        "additionalProperties": false
    })
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn screen(&self, sample: &str) -> ClassifierResult<bool> {
        #[derive(Deserialize)]
        struct Screen {
            plausible: bool,
        }

        let answer: Screen = self
            .structured("screen", format_screen_prompt(sample), screen_schema())
            .await?;
        Ok(answer.plausible)
    }

    async fn detect_request(&self, text: &str) -> ClassifierResult<RequestAssessment> {
        self.structured(
            "request_detection",
            format_detect_request_prompt(text),
            request_schema(),
        )
        .await
    }

    async fn match_category(
        &self,
        text: &str,
        category: &Category,
    ) -> ClassifierResult<CategoryAssessment> {
        self.structured(
            "category_match",
            format_match_category_prompt(text, category),
            category_schema(),
        )
        .await
    }
}

// Request/Response types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_builder() {
        let classifier = OpenAiClassifier::new("sk-test")
            .with_model("gpt-4o")
            .with_base_url("https://custom.api.com/")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(classifier.model(), "gpt-4o");
        assert_eq!(classifier.base_url, "https://custom.api.com");
        assert_eq!(classifier.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = "```json\n{\"is_request\": true, \"reason\": \"asks for a survey\"}\n```";
        let parsed: RequestAssessment = parse_json(fenced).unwrap();
        assert!(parsed.is_request);
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let parsed: ClassifierResult<RequestAssessment> = parse_json("I think so, yes");
        assert!(matches!(parsed, Err(ClassifierError::Malformed(_))));
    }

    #[test]
    fn test_category_answer_with_null_quote() {
        let parsed: CategoryAssessment =
            parse_json(r#"{"matches": false, "quote": null, "reason": "about drainage"}"#).unwrap();
        assert!(!parsed.matches);
        assert_eq!(parsed.quote, None);
    }
}
