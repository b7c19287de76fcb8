use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::dispatch::ActionKind;
use crate::error::DispatchError;

/// The interface for any actuator backend.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Say `text` out loud.
    async fn speak(&self, text: &str) -> Result<(), DispatchError>;
    /// Play the pre-programmed gesture identified by `code`.
    async fn trigger(&self, code: u32) -> Result<(), DispatchError>;
}

/// Where the robot's command server lives and how long we wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub base_url: String,
    pub speech_endpoint: String,
    pub motion_endpoint: String,
    pub timeout_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/command".to_string(),
            speech_endpoint: "EpiSpeech.say/0/0".to_string(),
            motion_endpoint: "SR.trig".to_string(),
            timeout_ms: 1500,
        }
    }
}

/// Direct HTTP client for the Epi command server.
///
/// Speech: `{base}/{speech_endpoint}/{text}`
/// Motion: `{base}/{motion_endpoint}/{code}/0/0`
#[derive(Debug, Clone)]
pub struct HttpActuator {
    http: Client,
    base: Url,
    speech_endpoint: String,
    motion_endpoint: String,
}

impl HttpActuator {
    pub fn new(config: &ActuatorConfig) -> Result<Self, DispatchError> {
        let base = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            DispatchError::InvalidUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(DispatchError::InvalidUrl {
                url: config.base_url.clone(),
                reason: "cannot be used as a base".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(DispatchError::Client)?;

        tracing::info!(
            "Actuator bridge targeting {} (timeout {} ms)",
            base,
            config.timeout_ms
        );

        Ok(Self {
            http,
            base,
            speech_endpoint: config.speech_endpoint.trim_matches('/').to_string(),
            motion_endpoint: config.motion_endpoint.trim_matches('/').to_string(),
        })
    }

    /// The URL a speech command for `text` is sent to. The text becomes a
    /// single percent-encoded path segment.
    pub fn speech_url(&self, text: &str) -> Url {
        self.endpoint_url(&self.speech_endpoint, &[text])
    }

    /// The URL a motion trigger for `code` is sent to.
    pub fn motion_url(&self, code: u32) -> Url {
        let code = code.to_string();
        self.endpoint_url(&self.motion_endpoint, &[code.as_str(), "0", "0"])
    }

    fn endpoint_url(&self, endpoint: &str, tail: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so the segments are always available.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(endpoint.split('/').filter(|s| !s.is_empty()));
            segments.extend(tail);
        }
        url
    }

    async fn get(&self, kind: ActionKind, url: Url) -> Result<(), DispatchError> {
        tracing::debug!("{} -> {}", kind, url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| DispatchError::Request { kind, source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Status {
                kind,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn speak(&self, text: &str) -> Result<(), DispatchError> {
        self.get(ActionKind::Speech, self.speech_url(text)).await
    }

    async fn trigger(&self, code: u32) -> Result<(), DispatchError> {
        self.get(ActionKind::Motion, self.motion_url(code)).await
    }
}
