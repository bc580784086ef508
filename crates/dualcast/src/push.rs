//! Push gateway abstraction and the FCM HTTP v1 implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PushError};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Notification data carried by a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    pub title: String,
    pub body: String,
}

/// One push request: `{ data: { title, body }, token }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub data: PushData,
    pub token: String,
}

/// Best-effort notification service addressed by opaque tokens.
#[async_trait::async_trait]
pub trait PushGateway: Send + Sync {
    /// Submit one push. Returns the gateway's receipt for the message.
    async fn send(&self, payload: &PushPayload) -> Result<String, PushError>;
}

/// Contents of an FCM credentials file.
#[derive(Debug, Clone, Deserialize)]
pub struct FcmCredentials {
    pub project_id: String,
    pub access_token: String,
    /// Base URL of the API, for emulators and tests.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// [`PushGateway`] backed by the FCM HTTP v1 API.
pub struct FcmGateway {
    client: reqwest::Client,
    url: String,
    access_token: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    data: &'a PushData,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

impl FcmGateway {
    pub fn new(credentials: FcmCredentials) -> Self {
        let base = credentials
            .endpoint
            .as_deref()
            .unwrap_or(FCM_ENDPOINT)
            .trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            url: format!(
                "{base}/v1/projects/{}/messages:send",
                credentials.project_id
            ),
            access_token: credentials.access_token,
        }
    }

    /// Load credentials from a JSON file and build the gateway.
    pub fn from_credentials_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?;
        let credentials: FcmCredentials = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?;
        tracing::info!(project_id = %credentials.project_id, "push gateway initialised");
        Ok(Self::new(credentials))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, payload: &PushPayload) -> Result<String, PushError> {
        let request = SendRequest {
            message: FcmMessage {
                token: &payload.token,
                data: &payload.data,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        let body: SendResponse = response.json().await?;
        Ok(body.name)
    }
}
