/// LLM Client — the single point of entry for generative-model calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Callers depend on the [`GenerativeModel`] trait, not on this client.
///
/// Schema-constrained output uses a forced tool call: the output schema becomes the
/// tool's `input_schema`, and the model answers with a `tool_use` block. Providers
/// treat the schema as advisory, so callers must still validate what comes back.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_timeout())
    }
}

/// What a model returned: either a value it produced against the schema,
/// or free text that may contain one.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Structured(Value),
    Text(String),
}

/// An output contract handed to the model alongside the prompt.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// A generative model capability: given a prompt and a schema, return a schema-conformant
/// value or free text containing one. Selection, credentials, and transport retries are the
/// implementor's concern.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system: &str,
        schema: &OutputSchema,
    ) -> Result<ModelOutput, LlmError>;

    /// Identifier recorded in analysis metadata.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    tools: Vec<AnthropicTool<'a>>,
    tool_choice: ToolChoice<'a>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolChoice<'a> {
    Tool { name: &'a str },
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// Extracts the input of the first `tool_use` block for the named tool.
    pub fn tool_input(&self, tool: &str) -> Option<&Value> {
        self.content
            .iter()
            .filter(|b| b.block_type == "tool_use")
            .find(|b| b.name.as_deref() == Some(tool))
            .and_then(|b| b.input.as_ref())
    }

    /// Prefers the structured tool input; falls back to free text.
    pub fn into_output(self, tool: &str) -> Result<ModelOutput, LlmError> {
        if let Some(input) = self.tool_input(tool) {
            return Ok(ModelOutput::Structured(input.clone()));
        }
        self.text()
            .map(|t| ModelOutput::Text(t.to_string()))
            .ok_or(LlmError::EmptyContent)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Anthropic Messages API client with retry logic and schema-constrained output.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Sends requests to `api_url` instead of the public Messages endpoint (e.g. a gateway).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    /// The model is forced to answer through a tool whose input is `schema`.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(
        &self,
        prompt: &str,
        system: &str,
        schema: &OutputSchema,
    ) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            tools: vec![AnthropicTool {
                name: &schema.name,
                description: &schema.description,
                input_schema: &schema.schema,
            }],
            tool_choice: ToolChoice::Tool { name: &schema.name },
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                // A timed-out request already used the caller's whole budget.
                Err(e) if e.is_timeout() => return Err(LlmError::Http(e)),
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl GenerativeModel for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        system: &str,
        schema: &OutputSchema,
    ) -> Result<ModelOutput, LlmError> {
        let response = self.call(prompt, system, schema).await?;
        response.into_output(&schema.name)
    }

    fn model_name(&self) -> &str {
        MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(content: Value) -> LlmResponse {
        serde_json::from_value(json!({
            "content": content,
            "usage": { "input_tokens": 10, "output_tokens": 20 }
        }))
        .unwrap()
    }

    fn schema() -> OutputSchema {
        OutputSchema {
            name: "resume_feedback".to_string(),
            description: "Structured resume feedback".to_string(),
            schema: json!({ "type": "object" }),
        }
    }

    #[test]
    fn test_tool_use_block_becomes_structured_output() {
        let resp = response(json!([
            { "type": "text", "text": "Here is the analysis." },
            { "type": "tool_use", "id": "toolu_1", "name": "resume_feedback",
              "input": { "overallScore": 85 } }
        ]));
        assert_eq!(
            resp.into_output("resume_feedback").unwrap(),
            ModelOutput::Structured(json!({ "overallScore": 85 }))
        );
    }

    #[test]
    fn test_text_block_becomes_text_output() {
        let resp = response(json!([{ "type": "text", "text": "```json\n{}\n```" }]));
        assert_eq!(
            resp.into_output("resume_feedback").unwrap(),
            ModelOutput::Text("```json\n{}\n```".to_string())
        );
    }

    #[test]
    fn test_other_tool_is_ignored() {
        let resp = response(json!([
            { "type": "tool_use", "id": "toolu_1", "name": "something_else", "input": {} },
            { "type": "text", "text": "fallback" }
        ]));
        assert_eq!(
            resp.into_output("resume_feedback").unwrap(),
            ModelOutput::Text("fallback".to_string())
        );
    }

    #[test]
    fn test_empty_content_is_an_error() {
        let resp = response(json!([]));
        assert!(matches!(
            resp.into_output("resume_feedback"),
            Err(LlmError::EmptyContent)
        ));
    }

    #[test]
    fn test_request_forces_the_schema_tool() {
        let schema = schema();
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: "sys",
            messages: vec![AnthropicMessage {
                role: "user",
                content: "prompt",
            }],
            tools: vec![AnthropicTool {
                name: &schema.name,
                description: &schema.description,
                input_schema: &schema.schema,
            }],
            tool_choice: ToolChoice::Tool { name: &schema.name },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value["tool_choice"],
            json!({ "type": "tool", "name": "resume_feedback" })
        );
        assert_eq!(value["tools"][0]["input_schema"], json!({ "type": "object" }));
    }

    #[tokio::test]
    async fn test_request_timeout_is_an_analysis_timeout_without_retries() {
        use crate::feedback::analyzer::AnalysisFailure;
        use std::time::Instant;

        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/messages", listener.local_addr().unwrap());
        let client = LlmClient::new("test-key".to_string(), Duration::from_millis(1))
            .unwrap()
            .with_api_url(url);

        let started = Instant::now();
        let err = client.generate("prompt", "sys", &schema()).await.unwrap_err();

        assert!(err.is_timeout(), "expected a timeout, got {err:?}");
        // The first retry backs off for a full second.
        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(matches!(AnalysisFailure::from(err), AnalysisFailure::Timeout));
        drop(listener);
    }

    #[test]
    fn test_api_errors_are_not_timeouts() {
        let err = LlmError::Api {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!err.is_timeout());
    }
}
