//! Client for OpenAI-style `/chat/completions` servers.
//!
//! Agencies usually point this at a self-hosted model (vLLM, Ollama) so
//! report text stays on their network.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};

pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    bearer: Option<String>,
}

impl OpenAiBackend {
    /// `base_url` is the API root, e.g. `http://localhost:8000/v1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            bearer: api_key.map(|k| format!("Bearer {}", k)),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(bearer) => builder.header(header::AUTHORIZATION, bearer),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [Turn<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonFormat>,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ReplyChoice>,
    usage: Option<ReplyUsage>,
}

#[derive(Deserialize)]
struct ReplyChoice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ReplyUsage {
    total_tokens: Option<u32>,
}

async fn status_error(response: Response) -> LlmError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        return LlmError::RateLimited { retry_after_ms };
    }
    LlmError::Http {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        match self.authorized(self.client.get(self.endpoint("models"))).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(base_url = %self.base_url, error = %e, "Model server probe failed");
                false
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatBody {
            model: &self.model,
            messages: [
                Turn { role: "system", content: &request.instructions },
                Turn { role: "user", content: &request.evidence },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_mode.then_some(JsonFormat { kind: "json_object" }),
        };

        debug!(stage = %request.stage, model = %self.model, "Sending completion request");
        let response = self
            .authorized(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        let tokens_used = reply.usage.and_then(|u| u.total_tokens);
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("reply has no choices".to_string()))?;

        match choice.finish_reason.as_deref() {
            Some("content_filter") => Err(LlmError::Refused {
                reason: "provider content filter".to_string(),
            }),
            finish => Ok(CompletionResponse {
                content: choice.message.content.unwrap_or_default(),
                truncated: finish == Some("length"),
                tokens_used,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> OpenAiBackend {
        OpenAiBackend::new(
            format!("{}/v1/", server.uri()),
            "triage-model",
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("classifier", "Classify the report.", "<report>x</report>")
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let backend =
            OpenAiBackend::new("http://localhost:8000/v1/", "m", None, Duration::from_secs(1)).unwrap();
        assert_eq!(backend.endpoint("models"), "http://localhost:8000/v1/models");
        assert_eq!(backend.id(), "m");
    }

    #[tokio::test]
    async fn test_complete_sends_both_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header_eq("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "triage-model",
                "messages": [
                    {"role": "system", "content": "Classify the report."},
                    {"role": "user", "content": "<report>x</report>"}
                ],
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {"content": "{\"ok\": true}"},
                    "finish_reason": "length"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
            })))
            .mount(&server)
            .await;

        let response = backend(&server).complete(request()).await.unwrap();

        assert_eq!(response.content, "{\"ok\": true}");
        assert!(response.truncated);
        assert_eq!(response.tokens_used, Some(16));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(2000));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Http { status: 503, ref body } if body == "loading model"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_content_filter_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Refused { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_availability_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        assert!(backend(&server).is_available().await);
    }
}
