// =============================================================================
// Remote Inference Client — OpenAI-compatible chat completions over HTTP
// =============================================================================
//
// POST {base_url}/chat/completions
//   { model, temperature: 0, messages: [system, user] }
// The first choice's message content is handed to `parse_reply`.
//
// Status mapping: non-2xx -> Status(code); connect/read failures ->
// Transport; reqwest timeouts -> Timeout; unusable bodies -> Malformed.
// =============================================================================

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::reply::{parse_reply, RemoteReply};
use super::request::InferenceRequest;
use crate::error::RemoteServiceError;

/// Anything that can turn a request into a parsed remote decision.
#[async_trait]
pub trait RemoteInference: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, request: &InferenceRequest) -> Result<RemoteReply, RemoteServiceError>;
}

pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).context("API key is not a valid header value")?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        debug!(base_url = %base_url, model = %model, "HttpInferenceClient initialised");

        Ok(Self {
            client,
            base_url,
            model,
            timeout,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> RemoteServiceError {
        if err.is_timeout() {
            RemoteServiceError::Timeout(self.timeout)
        } else {
            RemoteServiceError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteInference for HttpInferenceClient {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(asset = %request.asset), name = "remote::infer")]
    async fn infer(&self, request: &InferenceRequest) -> Result<RemoteReply, RemoteServiceError> {
        let user = request
            .user_prompt()
            .map_err(|e| RemoteServiceError::Transport(format!("failed to encode request: {e}")))?;
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                { "role": "system", "content": request.system_prompt() },
                { "role": "user", "content": user },
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteServiceError::Status(status.as_u16()));
        }

        let payload: Value = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                RemoteServiceError::Timeout(self.timeout)
            } else {
                RemoteServiceError::Malformed(format!("response body is not JSON: {e}"))
            }
        })?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteServiceError::Malformed("response has no message content".to_string()))?;

        debug!(chars = content.len(), "remote reply received");
        parse_reply(content)
    }
}

impl std::fmt::Debug for HttpInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInferenceClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
