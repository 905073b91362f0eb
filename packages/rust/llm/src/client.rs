//! OpenAI-compatible chat completions client.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use rfqscope_shared::{LlmConfig, Result, RfqScopeError};

use crate::TextGenerator;
use crate::retry::{backoff, is_retryable_error, is_retryable_status, retry_delay};

/// User-Agent header for service requests.
const USER_AGENT: &str = concat!("rfqscope/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl OpenAiClient {
    /// Build a client from the `[llm]` config section and a resolved API key.
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RfqScopeError::generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    #[instrument(skip_all, fields(model = %self.model, temperature = temperature, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let mut attempt = 0;
        loop {
            let sent = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    warn!(error = %e, attempt = attempt + 1, delay_secs = delay.as_secs(), "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) if e.is_timeout() => {
                    return Err(RfqScopeError::generation(format!(
                        "request timed out after {} attempt(s): {e}",
                        attempt + 1
                    )));
                }
                Err(e) => {
                    return Err(RfqScopeError::generation(format!("request failed: {e}")));
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| RfqScopeError::generation(format!("failed to read response: {e}")))?;
                return parse_completion(&text);
            }

            if is_retryable_status(status) && attempt < self.max_retries {
                let delay = retry_delay(response.headers(), attempt);
                warn!(%status, attempt = attempt + 1, delay_secs = delay.as_secs(), "service unavailable, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(RfqScopeError::generation(format!(
                "service returned {status} after {} attempt(s): {snippet}",
                attempt + 1
            )));
        }
    }
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RfqScopeError::generation(format!("malformed completion response: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RfqScopeError::generation("completion response has no content"))?;

    debug!(chars = content.len(), "completion received");
    Ok(content)
}

impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.complete(prompt, temperature).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 5,
            max_retries: 2,
            ..LlmConfig::default()
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })
    }

    #[tokio::test]
    async fn sends_prompt_model_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "temperature": 0.0,
                "messages": [{ "role": "user", "content": "Summarize this" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("summary text")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "sk-test".into()).unwrap();
        let text = client.generate("Summarize this", 0.0).await.unwrap();
        assert_eq!(text, "summary text");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "k".into()).unwrap();
        assert_eq!(client.generate("p", 0.3).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("retry-after", "0")
                    .set_body_string("overloaded"),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "k".into()).unwrap();
        let err = client.generate("p", 0.0).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "unexpected error: {msg}");
        assert!(msg.contains("3 attempt(s)"), "unexpected error: {msg}");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "k".into()).unwrap();
        let err = client.generate("p", 0.0).await.unwrap_err();
        assert!(matches!(err, RfqScopeError::Generation(_)));
    }

    #[tokio::test]
    async fn timeout_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = LlmConfig {
            timeout_secs: 1,
            max_retries: 0,
            ..config_for(&server)
        };
        let client = OpenAiClient::new(&config, "k".into()).unwrap();
        let err = client.generate("p", 0.0).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "unexpected error: {err}");
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion("not json").is_err());
        assert_eq!(
            parse_completion(r#"{"choices":[{"message":{"content":"x"}}]}"#).unwrap(),
            "x"
        );
    }

    #[test]
    fn debug_redacts_key() {
        let client = OpenAiClient::new(&LlmConfig::default(), "sk-secret".into()).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
