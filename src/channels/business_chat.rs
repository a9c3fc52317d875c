//! 商务聊天渠道 - 通过 HTTP 网关投递到用户的聊天平台
//!
//! 用户未配置聊天标识、或在偏好中关闭了该渠道时跳过发送（预期内的不投递，
//! 不算故障）。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::channel::{ChannelKind, NotificationChannel, SendResult};
use crate::error::{NotifyError, Result};
use crate::preferences::NotificationPreferences;
use crate::store::Notification;

/// 商务聊天渠道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessChatConfig {
    /// 网关地址（如 http://localhost:9080）
    pub gateway_url: String,
    /// 认证 token
    #[serde(default)]
    pub token: String,
    /// 超时时间（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BusinessChatConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 网关请求载荷
#[derive(Debug, Serialize)]
struct ChatPayload {
    message: String,
    to: String,
    channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// 商务聊天渠道
pub struct BusinessChatChannel {
    client: reqwest::blocking::Client,
    config: BusinessChatConfig,
    preferences: Arc<RwLock<NotificationPreferences>>,
}

impl BusinessChatChannel {
    pub fn new(
        config: BusinessChatConfig,
        preferences: Arc<RwLock<NotificationPreferences>>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            config,
            preferences,
        })
    }

    /// 目标用户的聊天平台标识（缺失时跳过发送）
    fn handle(&self) -> Option<String> {
        self.preferences
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .business_chat_handle
            .clone()
    }

    fn post(&self, notification: &Notification, to: String) -> Result<SendResult> {
        let url = format!("{}/chat/send", self.config.gateway_url);
        let payload = ChatPayload {
            message: format!("{}\n{}", notification.title, notification.description),
            to,
            channel: "business_chat",
            action_url: notification.action_url.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .map_err(|e| NotifyError::DeliveryFailed(format!("chat gateway: {}", e)))?;

        let chat_response: ChatResponse = response
            .json()
            .map_err(|e| NotifyError::DeliveryFailed(format!("chat response: {}", e)))?;

        if chat_response.ok {
            info!(channel = "business_chat", id = %notification.id, "Chat message sent");
            Ok(SendResult::Sent)
        } else {
            let reason = chat_response.error.unwrap_or_else(|| "unknown error".to_string());
            error!(channel = "business_chat", id = %notification.id, error = %reason, "Chat send rejected");
            Ok(SendResult::Failed(reason))
        }
    }
}

impl NotificationChannel for BusinessChatChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::BusinessChat
    }

    fn enabled(&self) -> bool {
        !self.config.gateway_url.is_empty()
    }

    fn send(&self, notification: &Notification) -> Result<SendResult> {
        let to = match self.handle() {
            Some(handle) => handle,
            None => {
                return Ok(SendResult::Skipped(
                    "no business chat handle configured".to_string(),
                ))
            }
        };
        self.post(notification, to)
    }

    fn send_async(&self, notification: &Notification) -> Result<()> {
        let to = match self.handle() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        let url = format!("{}/chat/send", self.config.gateway_url);
        let token = self.config.token.clone();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let payload = serde_json::json!({
            "message": format!("{}\n{}", notification.title, notification.description),
            "to": to,
            "channel": "business_chat",
            "action_url": notification.action_url,
        });
        let id = notification.id.clone();

        // 发出后立即返回，不阻塞调用方
        std::thread::spawn(move || {
            let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(c) => c,
                Err(e) => {
                    warn!(channel = "business_chat", error = %e, "HTTP client build failed");
                    return;
                }
            };
            let result = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", token))
                .json(&payload)
                .send();
            if let Err(e) = result {
                warn!(channel = "business_chat", id = %id, error = %e, "Async chat send failed");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Category, NotificationType};
    use chrono::Utc;

    fn channel_with_handle(handle: Option<&str>) -> BusinessChatChannel {
        let mut prefs = NotificationPreferences::default();
        prefs.business_chat_handle = handle.map(|s| s.to_string());
        BusinessChatChannel::new(
            BusinessChatConfig {
                gateway_url: "http://localhost:9".to_string(),
                token: "t".to_string(),
                timeout_secs: 1,
            },
            Arc::new(RwLock::new(prefs)),
        )
        .unwrap()
    }

    fn notification() -> Notification {
        Notification {
            id: "n1".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            notification_type: NotificationType::Info,
            category: Category::Payment,
            read: false,
            persistent: true,
            action_url: None,
            action_label: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_handle_is_skipped() {
        let channel = channel_with_handle(None);
        let result = channel.send(&notification()).unwrap();
        assert!(matches!(result, SendResult::Skipped(_)));
    }

    #[test]
    fn test_unconfigured_gateway_is_disabled() {
        let channel = BusinessChatChannel::new(
            BusinessChatConfig::default(),
            Arc::new(RwLock::new(NotificationPreferences::default())),
        )
        .unwrap();
        assert!(!channel.enabled());
    }

    #[test]
    fn test_unreachable_gateway_is_delivery_failure() {
        // 端口 9 不可达，send 应返回 DeliveryFailed 错误而不是 panic
        let channel = channel_with_handle(Some("client-42"));
        let err = channel.send(&notification()).unwrap_err();
        assert!(matches!(err, NotifyError::DeliveryFailed(_)));
    }
}
