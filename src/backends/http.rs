//! HTTP synthesis backend.
//!
//! Posts each chunk as an `application/x-www-form-urlencoded` body with the
//! fields `text`, `speaker_id`, `language_id` and `style_wav`. A `200`
//! response body is the encoded audio.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::BackendError;
use crate::{SynthesisBackend, SynthesisRequest};

/// Longest response body excerpt kept in a [`BackendError::Status`].
const BODY_EXCERPT_CHARS: usize = 200;

/// [`SynthesisBackend`] that talks to a TTS service over HTTP.
///
/// Any non-`200` status is a [`BackendError::Status`]; retries are left to
/// [`SynthesisClient`](crate::SynthesisClient).
pub struct HttpBackend {
    url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Backend for `url` with the default 30 s request timeout.
    pub fn new(url: &str) -> Result<Self, BackendError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Backend for `url` whose requests give up after `timeout`.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tts-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }

    /// Endpoint every chunk is posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SynthesisBackend for HttpBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, BackendError> {
        let form = [
            ("text", request.text.as_str()),
            ("speaker_id", request.speaker_id.as_str()),
            ("language_id", request.language_id.as_str()),
            ("style_wav", request.style_reference.as_str()),
        ];

        let resp = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        log::debug!("Received {} bytes of audio from {}", bytes.len(), self.url);
        Ok(bytes.to_vec())
    }
}
