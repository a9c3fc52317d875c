//! 通知服务 - 组合存储、分发、推送与统计的显式服务对象
//!
//! 不使用进程级全局状态：服务由调用方构造并按引用传递，配有显式的
//! `init()` / `dispose()` 生命周期。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::analytics::{AnalyticsAggregator, EventKind, NotificationMetrics};
use crate::channel::{ChannelKind, DeliveryRecord, SendResult};
use crate::channels::{BusinessChatChannel, EmailChannel, InAppChannel, PushChannel, SmsChannel, Toast};
use crate::config::{MissingTemplatePolicy, ServiceConfig};
use crate::dispatcher::ChannelDispatcher;
use crate::error::{NotifyError, Result};
use crate::preferences::NotificationPreferences;
use crate::push::{HttpPushPlatform, Permission, PushPlatform, PushState, PushSubscriptionManager};
use crate::store::{fresh_id, Category, Notification, NotificationStore, NotificationType};
use crate::substitute::substitute;
use crate::template::{NotificationTemplate, TemplateInput, TemplateStore, TemplateUpdate};

/// 构造通知的输入
#[derive(Debug, Clone)]
pub struct NotificationInput {
    pub title: String,
    pub description: String,
    pub notification_type: NotificationType,
    pub category: Category,
    /// false 时只投递不保留
    pub persistent: bool,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
}

impl NotificationInput {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        notification_type: NotificationType,
        category: Category,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            notification_type,
            category,
            persistent: true,
            action_url: None,
            action_label: None,
        }
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_action(mut self, url: impl Into<String>, label: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self.action_label = Some(label.into());
        self
    }
}

/// 通知服务
pub struct NotificationService {
    config: ServiceConfig,
    templates: TemplateStore,
    store: NotificationStore,
    preferences: Arc<RwLock<NotificationPreferences>>,
    dispatcher: ChannelDispatcher,
    push: Arc<Mutex<PushSubscriptionManager>>,
    in_app: Arc<InAppChannel>,
    analytics: AnalyticsAggregator,
    initialized: bool,
}

impl NotificationService {
    /// 使用 HTTP 推送后端构造服务（未加载持久化状态，需调用 `init`）
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let platform = HttpPushPlatform::new(config.push.clone())?;
        Self::with_platform(config, Box::new(platform))
    }

    /// 注入自定义推送平台（测试用）
    pub fn with_platform(config: ServiceConfig, platform: Box<dyn PushPlatform>) -> Result<Self> {
        let preferences = Arc::new(RwLock::new(NotificationPreferences::default()));
        let push = Arc::new(Mutex::new(PushSubscriptionManager::new(platform)));
        let in_app = Arc::new(InAppChannel::new());

        let mut dispatcher =
            ChannelDispatcher::new(preferences.clone()).with_dry_run(config.dry_run);
        dispatcher.register_channel(in_app.clone());
        dispatcher.register_channel(Arc::new(EmailChannel::new(config.email_enabled)));
        dispatcher.register_channel(Arc::new(SmsChannel::new(config.sms_enabled)));
        dispatcher.register_channel(Arc::new(PushChannel::new(push.clone())));
        dispatcher.register_channel(Arc::new(BusinessChatChannel::new(
            config.business_chat.clone(),
            preferences.clone(),
        )?));

        Ok(Self {
            templates: TemplateStore::new(config.templates_path()),
            store: NotificationStore::new(config.notifications_path()),
            analytics: AnalyticsAggregator::new(config.events_path()),
            preferences,
            dispatcher,
            push,
            in_app,
            config,
            initialized: false,
        })
    }

    /// 加载持久化状态。幂等：重复调用无副作用。
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.store = NotificationStore::load(self.config.notifications_path())?;
        self.templates = TemplateStore::load(self.config.templates_path())?;
        self.analytics = AnalyticsAggregator::load(self.config.events_path());
        let prefs = NotificationPreferences::load(&self.config.preferences_path())?;
        *self.write_prefs() = prefs;
        self.initialized = true;
        info!(data_dir = %self.config.data_dir.display(), "Notification service initialized");
        Ok(())
    }

    /// 落盘偏好并结束生命周期
    pub fn dispose(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        let snapshot = self.read_prefs().clone();
        snapshot.persist(&self.config.preferences_path())?;
        self.initialized = false;
        info!("Notification service disposed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // 通知构造与发送
    // ------------------------------------------------------------------

    /// 创建通知：记录 sent 事件、按需持久化、弹 toast、推送已启用时走推送路径
    ///
    /// 推送失败只记日志，不影响前面的步骤，也不向调用方传播。
    pub fn add_notification(&mut self, input: NotificationInput) -> Result<Notification> {
        let notification = Notification {
            id: fresh_id("ntf"),
            title: input.title,
            description: input.description,
            notification_type: input.notification_type,
            category: input.category,
            read: false,
            persistent: input.persistent,
            action_url: input.action_url,
            action_label: input.action_label,
            created_at: Utc::now(),
        };

        self.analytics.track_event(
            &notification.id,
            EventKind::Sent,
            None,
            Some(serde_json::json!({
                "category": notification.category.as_str(),
                "type": notification.notification_type.as_str(),
            })),
        );

        if notification.persistent {
            self.store.add(notification.clone())?;
        }

        // toast 永远弹出，error 类型用醒目样式
        self.in_app.toast(&notification);

        if self.read_prefs().channel_enabled(ChannelKind::Push) {
            let results = self
                .dispatcher
                .dispatch_to(&notification, &[ChannelKind::Push]);
            for (kind, result) in results {
                if let SendResult::Failed(reason) = result {
                    warn!(channel = %kind, id = %notification.id, error = %reason, "Push path failed");
                }
            }
        }

        Ok(notification)
    }

    /// 从模板发送：解析变量、使用计数加一、委托 `add_notification`
    ///
    /// 模板缺失的行为由 `MissingTemplatePolicy` 决定：`Ignore` 返回
    /// `Ok(None)`（与原行为一致），`Error` 返回 `NotFound`。
    pub fn send_from_template(
        &mut self,
        template_id: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Option<Notification>> {
        let template = match self.templates.get(template_id) {
            Some(t) => t.clone(),
            None => match self.config.missing_template {
                MissingTemplatePolicy::Ignore => {
                    warn!(template_id, "Template not found, send skipped");
                    return Ok(None);
                }
                MissingTemplatePolicy::Error => {
                    return Err(NotifyError::NotFound(format!("template {}", template_id)))
                }
            },
        };

        let title = substitute(&template.title, vars);
        let description = substitute(&template.description, vars);
        let action_url = template.action_url.as_deref().map(|u| substitute(u, vars));

        self.templates.increment_usage(&template.id)?;

        let mut input = NotificationInput::new(
            title,
            description,
            template.notification_type,
            template.category,
        );
        input.action_url = action_url;
        input.action_label = template.action_label.clone();

        let notification = self.add_notification(input)?;

        // 模板发送额外记录一条带模板标记的 sent 事件
        self.analytics.track_event(
            &notification.id,
            EventKind::Sent,
            Some(&template.id),
            Some(serde_json::json!({ "category": template.category.as_str() })),
        );

        Ok(Some(notification))
    }

    /// 全渠道扇出（按偏好解析目标渠道）
    pub fn dispatch(&self, notification: &Notification) -> Vec<(ChannelKind, SendResult)> {
        self.dispatcher.dispatch(notification)
    }

    /// 全渠道异步扇出：逐渠道发出后立即返回，不等待完成
    ///
    /// 门控与同步扇出一致；被跳过或发起失败的渠道仍写入审计日志。
    pub fn dispatch_async(&self, notification: &Notification) -> Result<()> {
        self.dispatcher.dispatch_async(notification)
    }

    // ------------------------------------------------------------------
    // 记录读写
    // ------------------------------------------------------------------

    pub fn list_notifications(&self) -> &[Notification] {
        self.store.list()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub fn mark_as_read(&mut self, id: &str) -> Result<()> {
        self.store.mark_as_read(id)?;
        self.analytics.track_event(id, EventKind::Read, None, None);
        Ok(())
    }

    pub fn mark_all_as_read(&mut self) -> Result<()> {
        self.store.mark_all_as_read()
    }

    pub fn delete_notification(&mut self, id: &str) -> Result<()> {
        self.store.delete(id)
    }

    pub fn clear_notifications(&mut self) -> Result<()> {
        self.store.clear()
    }

    /// UI 曝光埋点
    pub fn record_viewed(&self, id: &str) {
        self.analytics.track_event(id, EventKind::Viewed, None, None);
    }

    /// UI 点击埋点
    pub fn record_clicked(&self, id: &str) {
        self.analytics.track_event(id, EventKind::Clicked, None, None);
    }

    /// UI 关闭埋点
    pub fn record_dismissed(&self, id: &str) {
        self.analytics.track_event(id, EventKind::Dismissed, None, None);
    }

    // ------------------------------------------------------------------
    // 模板
    // ------------------------------------------------------------------

    pub fn list_templates(&self) -> &[NotificationTemplate] {
        self.templates.list()
    }

    pub fn create_template(&mut self, input: TemplateInput) -> Result<NotificationTemplate> {
        self.templates.create(input)
    }

    pub fn update_template(
        &mut self,
        id: &str,
        update: TemplateUpdate,
    ) -> Result<NotificationTemplate> {
        self.templates.update(id, update)
    }

    pub fn delete_template(&mut self, id: &str) -> Result<()> {
        self.templates.delete(id)
    }

    // ------------------------------------------------------------------
    // 推送生命周期
    // ------------------------------------------------------------------

    /// 启用推送：初始化 → 请求权限 → 订阅，结果回写偏好
    ///
    /// 订阅失败时开关保持 false，绝不乐观置位。
    pub fn enable_push(&mut self) -> Result<bool> {
        let enabled = {
            let mut manager = self.lock_push();
            if !manager.initialize() {
                info!("Push not supported on this platform");
                false
            } else {
                match manager.request_permission()? {
                    Permission::Denied => {
                        info!("Push permission denied");
                        false
                    }
                    Permission::Granted => match manager.subscribe() {
                        Ok(_) => true,
                        Err(e) => {
                            warn!(error = %e, "Push subscribe failed");
                            false
                        }
                    },
                }
            }
        };

        self.set_push_preference(enabled)?;
        Ok(enabled)
    }

    /// 停用推送。未订阅时为 no-op，一律返回 false（最终开关状态）。
    pub fn disable_push(&mut self) -> Result<bool> {
        {
            let mut manager = self.lock_push();
            if manager.is_subscribed() {
                manager.unsubscribe()?;
            }
        }
        self.set_push_preference(false)?;
        Ok(false)
    }

    pub fn is_push_enabled(&self) -> bool {
        self.read_prefs().channel_enabled(ChannelKind::Push)
    }

    pub fn push_state(&self) -> PushState {
        self.lock_push().state()
    }

    // ------------------------------------------------------------------
    // 偏好与观测
    // ------------------------------------------------------------------

    pub fn preferences(&self) -> NotificationPreferences {
        self.read_prefs().clone()
    }

    /// 修改偏好并落盘。内存变更先生效，落盘失败返回错误但不回滚。
    pub fn update_preferences(
        &mut self,
        mutate: impl FnOnce(&mut NotificationPreferences),
    ) -> Result<()> {
        let snapshot = {
            let mut prefs = self.write_prefs();
            mutate(&mut prefs);
            prefs.clone()
        };
        snapshot.persist(&self.config.preferences_path())
    }

    /// 汇总指标（模板排名带名称）
    pub fn metrics(&self) -> NotificationMetrics {
        let names: HashMap<String, String> = self
            .templates
            .list()
            .iter()
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect();
        self.analytics.metrics_with_names(&names)
    }

    pub fn delivery_log(&self) -> Vec<DeliveryRecord> {
        self.dispatcher.delivery_log()
    }

    pub fn channel_count(&self) -> usize {
        self.dispatcher.channel_count()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.in_app.toasts()
    }

    pub fn live_list(&self) -> Vec<Notification> {
        self.in_app.live_list()
    }

    // ------------------------------------------------------------------

    fn set_push_preference(&mut self, enabled: bool) -> Result<()> {
        self.update_preferences(|prefs| prefs.channels.push = enabled)
    }

    fn read_prefs(&self) -> std::sync::RwLockReadGuard<'_, NotificationPreferences> {
        self.preferences
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_prefs(&self) -> std::sync::RwLockWriteGuard<'_, NotificationPreferences> {
        self.preferences
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_push(&self) -> std::sync::MutexGuard<'_, PushSubscriptionManager> {
        self.push
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
