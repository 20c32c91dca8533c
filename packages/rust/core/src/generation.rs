//! Text generation backends for the drafting steps.
//!
//! [`OpenRouterGenerator`] talks to an OpenAI-compatible `/chat/completions`
//! endpoint. [`MockGenerator`] is used when no API key is configured and
//! echoes the prompts back so the pipeline still runs end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use professoragent_jobs::Generated;
use professoragent_shared::{
    AppConfig, OpenRouterConfig, ProfessorAgentError, Result, endpoint, resolve_api_key,
};

/// Appended to the system prompt by [`Generator::complete_json`].
pub const JSON_INSTRUCTIONS: &str = "Return ONLY valid JSON. Do not include markdown or comments. \
     Only return a JSON object that can be parsed by a strict JSON parser.";

/// Sampling temperature for every completion.
pub const TEMPERATURE: f32 = 0.3;

const USER_AGENT: &str = concat!("ProfessorAgent/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier reported in logs.
    fn model_name(&self) -> &str;

    /// One chat completion: system prompt plus user prompt, text back.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Ask for JSON and parse the reply.
    ///
    /// A reply that is not valid JSON is not an error: it becomes
    /// [`Generated::Unparsed`] carrying the raw text.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Generated> {
        let full_system = format!("{system}\n\n{JSON_INSTRUCTIONS}");
        let raw = self.complete(&full_system, user).await?;
        Ok(parse_generated(&raw))
    }
}

/// Parse a model reply as JSON, tolerating a surrounding markdown code fence.
pub fn parse_generated(raw: &str) -> Generated {
    match serde_json::from_str(strip_code_fence(raw)) {
        Ok(value) => Generated::Parsed(value),
        Err(e) => {
            debug!(error = %e, "generation reply is not JSON");
            Generated::unparsed(raw)
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Pick the generator for this config: OpenRouter when an API key is set,
/// otherwise the mock.
pub fn generator_from_config(config: &AppConfig) -> Result<Arc<dyn Generator>> {
    match resolve_api_key(config) {
        Some(key) => Ok(Arc::new(OpenRouterGenerator::new(&config.openrouter, key)?)),
        None => {
            info!(
                env = %config.openrouter.api_key_env,
                "no API key found, using mock generator"
            );
            Ok(Arc::new(MockGenerator))
        }
    }
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions over an OpenAI-compatible HTTP API.
pub struct OpenRouterGenerator {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(config: &OpenRouterConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProfessorAgentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: endpoint(&config.base_url, "chat/completions")?,
            api_key,
            model: config.default_model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProfessorAgentError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProfessorAgentError::Generation(format!(
                "API error {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProfessorAgentError::Generation(format!("invalid response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProfessorAgentError::Generation("empty completion".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Offline generator that echoes its prompts.
pub struct MockGenerator;

impl MockGenerator {
    pub const HEADER: &'static str = "MOCK RESPONSE (no API key detected)";
}

#[async_trait]
impl Generator for MockGenerator {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let preview: String = user.chars().take(300).collect();
        Ok(format!(
            "{}\n\nSystem: {system}\n\nUser: {preview}...",
            Self::HEADER
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_echoes_prompts() {
        let text = MockGenerator
            .complete("Be brief.", &"x".repeat(400))
            .await
            .unwrap();
        assert!(text.starts_with(MockGenerator::HEADER));
        assert!(text.contains("System: Be brief."));
        assert!(text.ends_with(&format!("User: {}...", "x".repeat(300))));
    }

    #[tokio::test]
    async fn mock_json_degrades_to_unparsed() {
        let generated = MockGenerator.complete_json("sys", "user").await.unwrap();
        match generated {
            Generated::Unparsed {
                error,
                raw_response,
            } => {
                assert_eq!(error, Generated::PARSE_FAILED);
                assert!(raw_response.contains(JSON_INSTRUCTIONS));
            }
            Generated::Parsed(v) => panic!("expected unparsed, got {v}"),
        }
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        assert_eq!(
            parse_generated(r#"{"outline": ["Week 1"]}"#),
            Generated::Parsed(json!({"outline": ["Week 1"]}))
        );
        assert_eq!(
            parse_generated("```json\n{\"slides\": []}\n```"),
            Generated::Parsed(json!({"slides": []}))
        );
        assert_eq!(
            parse_generated("Sure! Here it is: {"),
            Generated::unparsed("Sure! Here it is: {")
        );
    }

    fn config_for(server: &wiremock::MockServer) -> OpenRouterConfig {
        OpenRouterConfig {
            base_url: Url::parse(&format!("{}/api/v1", server.uri())).unwrap(),
            default_model: "test-model".into(),
            ..OpenRouterConfig::default()
        }
    }

    #[tokio::test]
    async fn openrouter_sends_chat_request() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/v1/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
            .and(wiremock::matchers::body_partial_json(json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&config_for(&server), "sk-test".into()).unwrap();
        assert_eq!(generator.model_name(), "test-model");
        let text = generator.complete("sys", "hello").await.unwrap();
        assert_eq!(text, r#"{"ok": true}"#);
    }

    #[tokio::test]
    async fn openrouter_error_status_is_generation_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&config_for(&server), "sk-test".into()).unwrap();
        let err = generator.complete("sys", "hello").await.unwrap_err();
        assert!(matches!(err, ProfessorAgentError::Generation(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn openrouter_empty_choices_is_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&config_for(&server), "sk-test".into()).unwrap();
        let err = generator.complete("sys", "hello").await.unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }

    #[test]
    fn missing_key_selects_mock() {
        let mut config = AppConfig::default();
        config.openrouter.api_key_env = "PROFESSORAGENT_TEST_KEY_THAT_IS_NEVER_SET".into();
        let generator = generator_from_config(&config).unwrap();
        assert_eq!(generator.model_name(), "mock");
    }
}
