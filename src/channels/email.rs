//! 邮件渠道 - 外部邮件集成的占位实现
//!
//! 真实投递委托给外部服务，这里只模拟发送并记录日志。

use tracing::info;

use crate::channel::{ChannelKind, NotificationChannel, SendResult};
use crate::error::Result;
use crate::store::Notification;

/// 邮件渠道（模拟）
pub struct EmailChannel {
    enabled: bool,
}

impl EmailChannel {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn send(&self, notification: &Notification) -> Result<SendResult> {
        info!(
            channel = "email",
            id = %notification.id,
            title = %notification.title,
            "Simulated email delivery"
        );
        Ok(SendResult::Sent)
    }

    fn send_async(&self, notification: &Notification) -> Result<()> {
        let _ = self.send(notification)?;
        Ok(())
    }
}
