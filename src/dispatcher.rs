//! 渠道分发器 - 按偏好把一条通知扇出到多个渠道
//!
//! 扇出语义为 best effort：每个渠道独立尝试，单渠道失败不阻塞、不取消其他
//! 渠道；每次尝试（成功、跳过或失败）都写入投递审计日志。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Local;
use tracing::{info, warn};

use crate::channel::{ChannelKind, DeliveryRecord, NotificationChannel, SendResult};
use crate::error::Result;
use crate::preferences::NotificationPreferences;
use crate::store::Notification;

/// 审计日志保留上限
const MAX_DELIVERY_RECORDS: usize = 200;

/// 渠道分发器
pub struct ChannelDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    preferences: Arc<RwLock<NotificationPreferences>>,
    delivery_log: Mutex<VecDeque<DeliveryRecord>>,
    dry_run: bool,
}

impl ChannelDispatcher {
    pub fn new(preferences: Arc<RwLock<NotificationPreferences>>) -> Self {
        Self {
            channels: Vec::new(),
            preferences,
            delivery_log: Mutex::new(VecDeque::new()),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式（只记录不发送）
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = %channel.kind(), "Registering notification channel");
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// 按偏好解析目标渠道并全部尝试
    pub fn dispatch(&self, notification: &Notification) -> Vec<(ChannelKind, SendResult)> {
        let kinds = self.channel_kinds();
        self.dispatch_to(notification, &kinds)
    }

    /// 向调用方指定的渠道列表扇出（仍受偏好与免打扰约束）
    pub fn dispatch_to(
        &self,
        notification: &Notification,
        kinds: &[ChannelKind],
    ) -> Vec<(ChannelKind, SendResult)> {
        let mut results = Vec::new();

        for channel in &self.channels {
            let kind = channel.kind();
            if !kinds.contains(&kind) {
                continue;
            }

            let result = if self.dry_run {
                SendResult::Skipped("dry-run".to_string())
            } else {
                match self.gate(channel.as_ref(), notification) {
                    Some(reason) => SendResult::Skipped(reason),
                    None => match channel.send(notification) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(channel = %kind, error = %e, "Channel send failed");
                            SendResult::Failed(e.to_string())
                        }
                    },
                }
            };

            self.record(notification, kind, &result);
            results.push((kind, result));
        }

        results
    }

    /// 异步扇出：逐渠道发出后立即返回，不等待完成，也不保证渠道间顺序
    pub fn dispatch_async(&self, notification: &Notification) -> Result<()> {
        for channel in &self.channels {
            let kind = channel.kind();

            if self.dry_run {
                self.record(notification, kind, &SendResult::Skipped("dry-run".to_string()));
                continue;
            }

            if let Some(reason) = self.gate(channel.as_ref(), notification) {
                self.record(notification, kind, &SendResult::Skipped(reason));
                continue;
            }

            if let Err(e) = channel.send_async(notification) {
                warn!(channel = %kind, error = %e, "Channel async send failed");
                self.record(notification, kind, &SendResult::Failed(e.to_string()));
            }
        }
        Ok(())
    }

    /// 投递审计日志（按时间顺序）
    pub fn delivery_log(&self) -> Vec<DeliveryRecord> {
        self.delivery_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// 渠道被跳过时返回原因；可投递返回 None
    ///
    /// 渠道只有在全局启用且用户的渠道级与分类级偏好都放行时才会被调用；
    /// 免打扰时段内除应用内渠道外全部抑制。
    fn gate(&self, channel: &dyn NotificationChannel, notification: &Notification) -> Option<String> {
        let kind = channel.kind();

        if !channel.enabled() {
            return Some("channel disabled".to_string());
        }

        let prefs = self
            .preferences
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !prefs.channel_enabled(kind) {
            return Some(format!("{} disabled in preferences", kind));
        }
        if !prefs.category_enabled(notification.category) {
            return Some(format!("category {} disabled in preferences", notification.category));
        }
        if kind != ChannelKind::InApp && prefs.quiet_hours.contains(Local::now().time()) {
            return Some("quiet hours".to_string());
        }
        None
    }

    fn record(&self, notification: &Notification, kind: ChannelKind, result: &SendResult) {
        let mut log = self
            .delivery_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.push_back(DeliveryRecord::from_result(&notification.id, kind, result));
        while log.len() > MAX_DELIVERY_RECORDS {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Category, NotificationType};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用的 mock 渠道
    struct MockChannel {
        kind: ChannelKind,
        fail: bool,
        send_count: AtomicUsize,
    }

    impl MockChannel {
        fn new(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: false,
                send_count: AtomicUsize::new(0),
            })
        }

        fn failing(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: true,
                send_count: AtomicUsize::new(0),
            })
        }

        fn sends(&self) -> usize {
            self.send_count.load(Ordering::SeqCst)
        }
    }

    impl NotificationChannel for MockChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn send(&self, _notification: &Notification) -> Result<SendResult> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Ok(SendResult::Failed("boom".to_string()))
            } else {
                Ok(SendResult::Sent)
            }
        }

        fn send_async(&self, notification: &Notification) -> Result<()> {
            let _ = self.send(notification)?;
            Ok(())
        }
    }

    fn open_prefs() -> Arc<RwLock<NotificationPreferences>> {
        let mut prefs = NotificationPreferences::default();
        prefs.channels.push = true;
        prefs.channels.sms = true;
        prefs.channels.business_chat = true;
        Arc::new(RwLock::new(prefs))
    }

    fn notification(category: Category) -> Notification {
        Notification {
            id: "n1".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            notification_type: NotificationType::Info,
            category,
            read: false,
            persistent: true,
            action_url: None,
            action_label: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_and_count() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        assert_eq!(dispatcher.channel_count(), 0);
        dispatcher.register_channel(MockChannel::new(ChannelKind::Email));
        assert_eq!(dispatcher.channel_count(), 1);
        assert_eq!(dispatcher.channel_kinds(), vec![ChannelKind::Email]);
    }

    #[test]
    fn test_dispatch_all_channels_attempted() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        let email = MockChannel::new(ChannelKind::Email);
        let sms = MockChannel::new(ChannelKind::Sms);
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(sms.clone());

        let results = dispatcher.dispatch(&notification(Category::Job));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| *r == SendResult::Sent));
        assert_eq!(email.sends(), 1);
        assert_eq!(sms.sends(), 1);
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        let failing = MockChannel::failing(ChannelKind::Email);
        let ok = MockChannel::new(ChannelKind::Sms);
        dispatcher.register_channel(failing.clone());
        dispatcher.register_channel(ok.clone());

        let results = dispatcher.dispatch(&notification(Category::Job));
        assert!(matches!(results[0].1, SendResult::Failed(_)));
        assert_eq!(results[1].1, SendResult::Sent);
        assert_eq!(ok.sends(), 1);
    }

    #[test]
    fn test_channel_preference_gate() {
        let prefs = open_prefs();
        prefs.write().unwrap().channels.email = false;
        let mut dispatcher = ChannelDispatcher::new(prefs);
        let email = MockChannel::new(ChannelKind::Email);
        dispatcher.register_channel(email.clone());

        let results = dispatcher.dispatch(&notification(Category::Job));
        assert!(matches!(results[0].1, SendResult::Skipped(_)));
        assert_eq!(email.sends(), 0);
    }

    #[test]
    fn test_category_preference_gate() {
        let prefs = open_prefs();
        prefs.write().unwrap().categories.payments = false;
        let mut dispatcher = ChannelDispatcher::new(prefs);
        let email = MockChannel::new(ChannelKind::Email);
        dispatcher.register_channel(email.clone());

        let results = dispatcher.dispatch(&notification(Category::Payment));
        assert!(matches!(results[0].1, SendResult::Skipped(_)));
        assert_eq!(email.sends(), 0);
    }

    #[test]
    fn test_quiet_hours_suppresses_all_but_in_app() {
        let prefs = open_prefs();
        {
            let mut p = prefs.write().unwrap();
            p.quiet_hours.enabled = true;
            // 全天窗口，保证测试运行时刻一定在窗口内
            p.quiet_hours.start = "00:00".to_string();
            p.quiet_hours.end = "23:59".to_string();
        }
        let mut dispatcher = ChannelDispatcher::new(prefs);
        let email = MockChannel::new(ChannelKind::Email);
        let in_app = MockChannel::new(ChannelKind::InApp);
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(in_app.clone());

        let results = dispatcher.dispatch(&notification(Category::Job));
        assert!(matches!(results[0].1, SendResult::Skipped(_)));
        assert_eq!(results[1].1, SendResult::Sent);
        assert_eq!(email.sends(), 0);
        assert_eq!(in_app.sends(), 1);
    }

    #[test]
    fn test_dry_run_skips_everything() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs()).with_dry_run(true);
        let email = MockChannel::new(ChannelKind::Email);
        dispatcher.register_channel(email.clone());

        let results = dispatcher.dispatch(&notification(Category::Job));
        assert_eq!(results[0].1, SendResult::Skipped("dry-run".to_string()));
        assert_eq!(email.sends(), 0);
    }

    #[test]
    fn test_dispatch_to_subset() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        let email = MockChannel::new(ChannelKind::Email);
        let sms = MockChannel::new(ChannelKind::Sms);
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(sms.clone());

        let results = dispatcher.dispatch_to(&notification(Category::Job), &[ChannelKind::Sms]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ChannelKind::Sms);
        assert_eq!(email.sends(), 0);
        assert_eq!(sms.sends(), 1);
    }

    #[test]
    fn test_dispatch_async_sends_and_gates() {
        let prefs = open_prefs();
        prefs.write().unwrap().channels.sms = false;
        let mut dispatcher = ChannelDispatcher::new(prefs);
        let email = MockChannel::new(ChannelKind::Email);
        let sms = MockChannel::new(ChannelKind::Sms);
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(sms.clone());

        dispatcher.dispatch_async(&notification(Category::Job)).unwrap();

        // 放行的渠道发出，被门控的渠道跳过并写入审计日志
        assert_eq!(email.sends(), 1);
        assert_eq!(sms.sends(), 0);
        let log = dispatcher.delivery_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].channel, ChannelKind::Sms);
        assert_eq!(log[0].status, "skipped");
    }

    #[test]
    fn test_every_attempt_is_audited() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        dispatcher.register_channel(MockChannel::new(ChannelKind::Email));
        dispatcher.register_channel(MockChannel::failing(ChannelKind::Sms));

        dispatcher.dispatch(&notification(Category::Job));

        let log = dispatcher.delivery_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].channel, ChannelKind::Email);
        assert_eq!(log[0].status, "sent");
        assert_eq!(log[1].channel, ChannelKind::Sms);
        assert_eq!(log[1].status, "failed");
        assert_eq!(log[1].detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_audit_log_is_capped() {
        let mut dispatcher = ChannelDispatcher::new(open_prefs());
        dispatcher.register_channel(MockChannel::new(ChannelKind::Email));

        for _ in 0..(MAX_DELIVERY_RECORDS + 50) {
            dispatcher.dispatch(&notification(Category::Job));
        }
        assert_eq!(dispatcher.delivery_log().len(), MAX_DELIVERY_RECORDS);
    }
}
