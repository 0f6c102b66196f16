//! HTTP inference backend
//!
//! Posts `{"image": "<base64 jpeg>"}` and accepts either `{"text": ...}` or
//! `[{"generated_text": ...}, ...]` in return.

use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::Classifier;
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Error, Result};
use crate::types::RasterImage;

#[derive(Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<Zeroizing<String>>,
    timeout_ms: u64,
}

impl std::fmt::Debug for HttpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClassifier")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.map(Zeroizing::new),
            timeout_ms,
        })
    }

    /// The bearer token is read from `api_key_env` when that variable is set.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config.api_key_env.as_deref().and_then(|var| match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => {
                warn!("⚠️ {} is not set, classifier requests are unauthenticated", var);
                None
            }
        });
        Self::new(config.endpoint.clone(), api_key, config.timeout_ms)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pulls the recognized text out of a response body. A body without text is empty text.
pub fn extract_text(body: &Value) -> std::result::Result<String, ClassifierError> {
    match body {
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(Value::Null) | None => {
                if let Some(error) = map.get("error") {
                    return Err(ClassifierError::Parse(format!("service error: {}", error)));
                }
                Ok(String::new())
            }
            Some(other) => Err(ClassifierError::Parse(format!("text is not a string: {}", other))),
        },
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| item.get("generated_text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ")),
        other => Err(ClassifierError::Parse(format!("unexpected response shape: {}", other))),
    }
}

#[async_trait::async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn recognize(&self, image: &RasterImage) -> std::result::Result<String, ClassifierError> {
        let encoded = Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(image.data.as_slice()));
        let mut request = self.client.post(&self.endpoint).json(&json!({ "image": encoded.as_str() }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout(self.timeout_ms)
            } else {
                ClassifierError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        debug!("Classifier responded with {}", status);
        extract_text(&body)
    }
}
