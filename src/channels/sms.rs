//! 短信渠道 - 外部短信集成的占位实现

use tracing::info;

use crate::channel::{ChannelKind, NotificationChannel, SendResult};
use crate::error::Result;
use crate::store::Notification;

/// 短信渠道（模拟）
pub struct SmsChannel {
    enabled: bool,
}

impl SmsChannel {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn send(&self, notification: &Notification) -> Result<SendResult> {
        info!(
            channel = "sms",
            id = %notification.id,
            title = %notification.title,
            "Simulated SMS delivery"
        );
        Ok(SendResult::Sent)
    }

    fn send_async(&self, notification: &Notification) -> Result<()> {
        let _ = self.send(notification)?;
        Ok(())
    }
}
