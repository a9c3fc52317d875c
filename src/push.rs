//! Push subscription lifecycle management.
//!
//! State machine: `Uninitialized -> PermissionRequested -> {Granted, Denied}
//! -> {Subscribed, Unsubscribed}`. The platform side (capability check,
//! permission prompt, subscription registry, delivery endpoint) sits behind
//! the `PushPlatform` trait so the HTTP backend and test doubles are
//! interchangeable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NotifyError, Result};

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    Uninitialized,
    PermissionRequested,
    Granted,
    Denied,
    Subscribed,
    Unsubscribed,
}

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Registered push subscription (endpoint plus key material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
}

/// Structured push payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: PushData,
    #[serde(default)]
    pub actions: Vec<PushAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushData {
    pub notification_id: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAction {
    pub action: String,
    pub title: String,
}

/// Platform boundary for push capability, permission and delivery.
pub trait PushPlatform: Send + Sync {
    /// Whether the platform supports push at all.
    fn supported(&self) -> bool;

    /// Prompt for permission. Only called while permission is undecided.
    fn request_permission(&mut self) -> Result<Permission>;

    /// Register a subscription with the push backend.
    fn register(&mut self) -> Result<PushSubscription>;

    /// Tear down the registration.
    fn unregister(&mut self) -> Result<()>;

    /// Post a payload to the delivery endpoint.
    fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<()>;
}

/// Push backend configuration (gateway URL plus bearer token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBackendConfig {
    pub gateway_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PushBackendConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HTTP push platform backed by the subscription gateway.
pub struct HttpPushPlatform {
    client: reqwest::blocking::Client,
    config: PushBackendConfig,
}

impl HttpPushPlatform {
    pub fn new(config: PushBackendConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::blocking::Response> {
        let url = format!("{}{}", self.config.gateway_url, path);
        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(body)
            .send()
            .map_err(|e| NotifyError::DeliveryFailed(format!("{}: {}", path, e)))
    }
}

impl PushPlatform for HttpPushPlatform {
    fn supported(&self) -> bool {
        !self.config.gateway_url.is_empty()
    }

    fn request_permission(&mut self) -> Result<Permission> {
        let response = self.post("/push/permission", &serde_json::json!({}))?;
        match response.status().as_u16() {
            200 => Ok(Permission::Granted),
            401 | 403 => Ok(Permission::Denied),
            code => Err(NotifyError::DeliveryFailed(format!(
                "permission check returned {}",
                code
            ))),
        }
    }

    fn register(&mut self) -> Result<PushSubscription> {
        let response = self.post("/push/subscribe", &serde_json::json!({}))?;
        if !response.status().is_success() {
            return Err(NotifyError::DeliveryFailed(format!(
                "subscribe returned {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| NotifyError::DeliveryFailed(format!("subscribe response: {}", e)))
    }

    fn unregister(&mut self) -> Result<()> {
        let response = self.post("/push/unsubscribe", &serde_json::json!({}))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::DeliveryFailed(format!(
                "unsubscribe returned {}",
                response.status()
            )))
        }
    }

    fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<()> {
        let body = serde_json::json!({
            "subscription": subscription,
            "payload": payload,
        });
        let response = self.post("/push/send", &body)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::DeliveryFailed(format!(
                "push send returned {}",
                response.status()
            )))
        }
    }
}

/// Drives the subscription state machine over a `PushPlatform`.
pub struct PushSubscriptionManager {
    platform: Box<dyn PushPlatform>,
    state: PushState,
    subscription: Option<PushSubscription>,
}

impl PushSubscriptionManager {
    pub fn new(platform: Box<dyn PushPlatform>) -> Self {
        Self {
            platform,
            state: PushState::Uninitialized,
            subscription: None,
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == PushState::Subscribed
    }

    /// Idempotent capability check. Does not change decided states.
    pub fn initialize(&mut self) -> bool {
        let supported = self.platform.supported();
        if !supported && self.state == PushState::Uninitialized {
            // Leave the machine where it is; an unsupported platform can
            // never move past the permission prompt.
            info!("Push platform not supported");
        }
        supported
    }

    /// Prompt the platform permission dialog. Re-invocable: once the decision
    /// is made, subsequent calls return it without prompting again.
    pub fn request_permission(&mut self) -> Result<Permission> {
        match self.state {
            PushState::Granted | PushState::Subscribed | PushState::Unsubscribed => {
                Ok(Permission::Granted)
            }
            PushState::Denied => Ok(Permission::Denied),
            PushState::Uninitialized | PushState::PermissionRequested => {
                self.state = PushState::PermissionRequested;
                let permission = self.platform.request_permission()?;
                self.state = match permission {
                    Permission::Granted => PushState::Granted,
                    Permission::Denied => PushState::Denied,
                };
                info!(state = ?self.state, "Push permission decided");
                Ok(permission)
            }
        }
    }

    /// Register a subscription. Valid only once permission is granted; a
    /// registration failure leaves the state unchanged.
    pub fn subscribe(&mut self) -> Result<PushSubscription> {
        match self.state {
            PushState::Subscribed => {
                // unwrap 安全：Subscribed 状态必有 subscription
                Ok(self.subscription.clone().unwrap())
            }
            PushState::Granted | PushState::Unsubscribed => {
                let subscription = self.platform.register()?;
                self.subscription = Some(subscription.clone());
                self.state = PushState::Subscribed;
                info!(endpoint = %subscription.endpoint, "Push subscription registered");
                Ok(subscription)
            }
            PushState::Denied => Err(NotifyError::PermissionDenied(
                "push permission denied".to_string(),
            )),
            PushState::Uninitialized | PushState::PermissionRequested => {
                Err(NotifyError::PermissionDenied(
                    "push permission not granted".to_string(),
                ))
            }
        }
    }

    /// Tear down the registration. Idempotent once unsubscribed.
    pub fn unsubscribe(&mut self) -> Result<()> {
        match self.state {
            PushState::Subscribed => {
                self.platform.unregister()?;
                self.subscription = None;
                self.state = PushState::Unsubscribed;
                info!("Push subscription removed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Post a payload through the delivery endpoint. Requires `Subscribed`;
    /// never changes subscription state.
    pub fn send_business_message(&self, payload: &PushPayload) -> Result<()> {
        let subscription = match (&self.state, &self.subscription) {
            (PushState::Subscribed, Some(s)) => s,
            _ => {
                return Err(NotifyError::DeliveryFailed(
                    "push not subscribed".to_string(),
                ))
            }
        };
        if let Err(e) = self.platform.deliver(subscription, payload) {
            warn!(error = %e, "Push delivery failed");
            return Err(e);
        }
        Ok(())
    }
}
