//! PubSubHubbub hub client.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::fetcher::build_client;
use crate::config::{PushConfig, ServerConfig};
use crate::error::HubError;
use crate::Result;

/// Hub settings handed to the subscription manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Hub used when a feed does not advertise one.
    pub default_hub: String,
    /// Credentials for the default hub.
    pub username: String,
    pub password: String,
    /// Requested lease in seconds.
    pub lease_seconds: u64,
    /// Base URL the hub calls back on.
    pub public_url: String,
}

impl HubSettings {
    pub fn from_config(push: &PushConfig, server: &ServerConfig) -> Self {
        Self {
            default_hub: push.default_hub.clone(),
            username: push.default_hub_username.clone(),
            password: push.default_hub_password.clone(),
            lease_seconds: push.lease_seconds,
            public_url: server.public_url.clone(),
        }
    }

    /// Credentials to use for `hub_url`.
    ///
    /// Only the default hub has credentials, and only when both parts are set.
    pub fn credentials_for(&self, hub_url: &str) -> Option<(String, String)> {
        if hub_url != self.default_hub || self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some((self.username.clone(), self.password.clone()))
    }

    /// Callback URL for a subscription.
    pub fn callback_url(&self, subscription_id: i64) -> String {
        format!(
            "{}/push/callback/{}",
            self.public_url.trim_end_matches('/'),
            subscription_id
        )
    }
}

/// Subscription request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }

    /// Parse the `hub.mode` value of a verification request.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "subscribe" => Some(HubMode::Subscribe),
            "unsubscribe" => Some(HubMode::Unsubscribe),
            _ => None,
        }
    }
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscribe or unsubscribe request to a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubRequest {
    pub mode: HubMode,
    pub hub: String,
    pub topic: String,
    pub callback: String,
    pub verify_token: String,
    pub secret: Option<String>,
    pub lease_seconds: Option<u64>,
    /// Basic-auth username and password.
    pub credentials: Option<(String, String)>,
}

impl HubRequest {
    /// Form fields of the request, in protocol order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("hub.mode", self.mode.as_str().to_string()),
            ("hub.topic", self.topic.clone()),
            ("hub.callback", self.callback.clone()),
            ("hub.verify", "sync".to_string()),
            ("hub.verify", "async".to_string()),
            ("hub.verify_token", self.verify_token.clone()),
        ];
        if let Some(lease) = self.lease_seconds {
            fields.push(("hub.lease_seconds", lease.to_string()));
        }
        if let Some(secret) = &self.secret {
            fields.push(("hub.secret", secret.clone()));
        }
        fields
    }
}

/// Successful hub answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubAck {
    /// 204: intent verified synchronously.
    Verified,
    /// 202: accepted, verification will follow.
    Accepted,
}

/// Sends requests to PubSubHubbub hubs.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn send(&self, request: &HubRequest) -> std::result::Result<HubAck, HubError>;
}

/// Hub client posting the PubSubHubbub form over HTTP.
pub struct HttpHubClient {
    client: Client,
}

impl HttpHubClient {
    pub fn new(config: &PushConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn send(&self, request: &HubRequest) -> std::result::Result<HubAck, HubError> {
        let mut builder = self.client.post(&request.hub).form(&request.form_fields());
        if let Some((username, password)) = &request.credentials {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;
        let status = response.status();
        debug!(hub = %request.hub, topic = %request.topic, mode = %request.mode, %status, "Hub answered");

        match status {
            StatusCode::NO_CONTENT => Ok(HubAck::Verified),
            StatusCode::ACCEPTED => Ok(HubAck::Accepted),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(HubError::Rejected {
                    mode: request.mode.to_string(),
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
