//! OpenAI-compatible client for a local LM Studio server.
//!
//! LM Studio exposes `/v1/chat/completions` and `/v1/models`; any other
//! OpenAI-compatible server works the same way. The API key is a
//! placeholder because LM Studio accepts anything.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ChatMessage;

/// LM Studio ignores the key but the header must be present.
const PLACEHOLDER_API_KEY: &str = "lm-studio";

/// Callback invoked with each streamed content delta.
pub type TokenSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Errors from the inference server.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inference server returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Seam between the bot and whatever produces completions.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for status reporting.
    fn model(&self) -> &str;

    /// Run one completion over the full message list.
    ///
    /// With a sink the request streams and each content delta is passed to
    /// the callback as it arrives; either way the complete reply text is
    /// returned. An empty reply is `Ok("")`, not an error.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sink: Option<TokenSink<'_>>,
    ) -> Result<String, LlmError>;

    /// Whether the server answers at all. Never errors.
    async fn health_check(&self) -> bool;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct CompletionResponse {
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

// Streaming types

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for one configured model on one server.
pub struct LmStudioClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl LmStudioClient {
    /// `base_url` includes the `/v1` prefix, e.g. `http://localhost:1234/v1`.
    pub fn new(base_url: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            // No overall timeout: local generation can legitimately take
            // minutes. Connecting should still fail fast.
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn collect_stream(
        &self,
        response: reqwest::Response,
        sink: TokenSink<'_>,
    ) -> Result<String, LlmError> {
        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut full = String::new();

        while let Some(chunk) = byte_stream.next().await {
            buffer.extend_from_slice(&chunk?);
            drain_events(&mut buffer, sink, &mut full);
        }

        // The last event may arrive without a trailing blank line
        consume_event(String::from_utf8_lossy(&buffer).trim(), sink, &mut full);

        Ok(full)
    }
}

/// Cut complete `\n\n`-terminated SSE events out of the byte buffer.
///
/// The buffer holds raw bytes: a network chunk can end in the middle of
/// a multibyte character, so decoding happens per complete event, never
/// per chunk.
fn drain_events(buffer: &mut Vec<u8>, sink: TokenSink<'_>, full: &mut String) {
    while let Some(pos) = buffer.windows(2).position(|sep| sep == b"\n\n") {
        let event: Vec<u8> = buffer.drain(..pos + 2).collect();
        consume_event(String::from_utf8_lossy(&event).trim_end(), sink, full);
    }
}

fn consume_event(event: &str, sink: TokenSink<'_>, full: &mut String) {
    for line in event.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data.trim() == "[DONE]" || data.trim().is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) else {
            continue;
        };
        for choice in parsed.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    sink(&content);
                    full.push_str(&content);
                }
            }
        }
    }
}

#[async_trait]
impl ChatModel for LmStudioClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        sink: Option<TokenSink<'_>>,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            stream: sink.is_some().then_some(true),
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(PLACEHOLDER_API_KEY)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        match sink {
            Some(sink) => self.collect_stream(response, sink).await,
            None => {
                let completion: CompletionResponse = response.json().await?;
                Ok(completion
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .unwrap_or_default())
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(PLACEHOLDER_API_KEY)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(%err, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, ImageUrl};
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LmStudioClient {
        LmStudioClient::new(&format!("{}/v1", server.uri()), "test-model", 256)
    }

    #[tokio::test]
    async fn non_streaming_returns_the_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "¡Hola! ¿En qué te ayudo?" } }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(&[ChatMessage::user("Hola")], None)
            .await
            .unwrap();
        assert_eq!(reply, "¡Hola! ¿En qué te ayudo?");
    }

    #[tokio::test]
    async fn null_content_becomes_an_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(&[ChatMessage::user("Hola")], None)
            .await
            .unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::user("Hola")], None)
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn streaming_concatenates_deltas_and_feeds_the_sink() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hola\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" mundo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let seen = Mutex::new(Vec::new());
        let sink = |delta: &str| seen.lock().unwrap().push(delta.to_string());
        let reply = client_for(&server)
            .complete(&[ChatMessage::user("Hola")], Some(&sink))
            .await
            .unwrap();

        assert_eq!(reply, "Hola mundo");
        assert_eq!(*seen.lock().unwrap(), vec!["Hola", " mundo"]);
    }

    #[tokio::test]
    async fn streaming_handles_a_final_event_without_blank_line() {
        let server = MockServer::start().await;
        let sse_body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let sink = |_: &str| {};
        let reply = client_for(&server)
            .complete(&[ChatMessage::user("x")], Some(&sink))
            .await
            .unwrap();
        assert_eq!(reply, "tail");
    }

    #[test]
    fn split_multibyte_delta_survives_chunked_arrival() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"señal\"}}]}\n\n";
        let bytes = event.as_bytes();
        // Cut inside the two-byte encoding of 'ñ'
        let cut = event.find('ñ').unwrap() + 1;

        let seen = Mutex::new(Vec::new());
        let sink = |delta: &str| seen.lock().unwrap().push(delta.to_string());
        let mut buffer = Vec::new();
        let mut full = String::new();

        buffer.extend_from_slice(&bytes[..cut]);
        drain_events(&mut buffer, &sink, &mut full);
        assert_eq!(full, "");

        buffer.extend_from_slice(&bytes[cut..]);
        drain_events(&mut buffer, &sink, &mut full);
        assert_eq!(full, "señal");
        assert_eq!(*seen.lock().unwrap(), vec!["señal"]);
    }

    #[test]
    fn non_streaming_requests_omit_the_stream_field() {
        let request = CompletionRequest {
            model: "m",
            messages: &[ChatMessage::user("hi")],
            max_tokens: 64,
            stream: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("stream").is_none());
        assert_eq!(value["max_tokens"], 64);
    }

    #[test]
    fn multimodal_messages_serialize_into_the_request() {
        let message = ChatMessage::user_parts(vec![
            ContentPart::Text { text: "look".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/jpeg;base64,Zm9v".into(),
                },
            },
        ]);
        let request = CompletionRequest {
            model: "m",
            messages: std::slice::from_ref(&message),
            max_tokens: 64,
            stream: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["content"][1]["type"], "image_url");
    }

    #[tokio::test]
    async fn health_check_is_true_when_models_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await);
    }

    #[tokio::test]
    async fn health_check_is_false_when_unreachable() {
        // Nothing listens on this port
        let client = LmStudioClient::new("http://127.0.0.1:1/v1", "test-model", 256);
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn health_check_is_false_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(!client_for(&server).health_check().await);
    }

    #[test]
    fn trailing_slash_is_stripped_from_the_base_url() {
        let client = LmStudioClient::new("http://localhost:1234/v1/", "m", 16);
        assert_eq!(client.endpoint("models"), "http://localhost:1234/v1/models");
    }
}
