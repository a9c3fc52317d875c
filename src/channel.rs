//! 通知渠道 trait 定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Notification;

/// 渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Push,
    Sms,
    BusinessChat,
    InApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Push => "push",
            ChannelKind::Sms => "sms",
            ChannelKind::BusinessChat => "business_chat",
            ChannelKind::InApp => "in_app",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（预期内的不投递，如偏好关闭、缺少收件标识）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    pub fn status(&self) -> &'static str {
        match self {
            SendResult::Sent => "sent",
            SendResult::Skipped(_) => "skipped",
            SendResult::Failed(_) => "failed",
        }
    }
}

/// 单次投递审计记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: String,
    pub channel: ChannelKind,
    /// sent | skipped | failed
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn from_result(notification_id: &str, channel: ChannelKind, result: &SendResult) -> Self {
        let detail = match result {
            SendResult::Sent => None,
            SendResult::Skipped(reason) | SendResult::Failed(reason) => Some(reason.clone()),
        };
        Self {
            notification_id: notification_id.to_string(),
            channel,
            status: result.status().to_string(),
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// 通知渠道 trait
///
/// 每个渠道独立实现，互不影响；一个渠道失败不得阻塞其他渠道。
pub trait NotificationChannel: Send + Sync {
    /// 渠道类型（用于日志、审计和偏好匹配）
    fn kind(&self) -> ChannelKind;

    /// 渠道是否全局启用
    fn enabled(&self) -> bool {
        true
    }

    /// 同步发送
    fn send(&self, notification: &Notification) -> Result<SendResult>;

    /// 异步发送（发出后立即返回，不阻塞调用方）
    fn send_async(&self, notification: &Notification) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_str() {
        assert_eq!(ChannelKind::BusinessChat.as_str(), "business_chat");
        assert_eq!(ChannelKind::InApp.to_string(), "in_app");
    }

    #[test]
    fn test_channel_kind_serde() {
        let json = serde_json::to_string(&ChannelKind::BusinessChat).unwrap();
        assert_eq!(json, "\"business_chat\"");
        let kind: ChannelKind = serde_json::from_str("\"in_app\"").unwrap();
        assert_eq!(kind, ChannelKind::InApp);
    }

    #[test]
    fn test_delivery_record_from_result() {
        let rec = DeliveryRecord::from_result("n1", ChannelKind::Email, &SendResult::Sent);
        assert_eq!(rec.status, "sent");
        assert!(rec.detail.is_none());

        let rec = DeliveryRecord::from_result(
            "n1",
            ChannelKind::Push,
            &SendResult::Failed("timeout".to_string()),
        );
        assert_eq!(rec.status, "failed");
        assert_eq!(rec.detail.as_deref(), Some("timeout"));
    }
}
