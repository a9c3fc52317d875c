//! ReadyAimGo 通知子系统 - 模板、多渠道分发、推送订阅与统计

pub mod analytics;
pub mod channel;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod preferences;
pub mod push;
pub mod service;
pub mod store;
pub mod substitute;
pub mod template;

pub use analytics::{
    AnalyticsAggregator, AnalyticsEvent, CategoryCount, DailyMetrics, EventKind,
    NotificationMetrics, TemplateUsage,
};
pub use channel::{ChannelKind, DeliveryRecord, NotificationChannel, SendResult};
pub use channels::{
    BusinessChatChannel, BusinessChatConfig, EmailChannel, InAppChannel, PushChannel, SmsChannel,
    Toast,
};
pub use config::{MissingTemplatePolicy, ServiceConfig};
pub use dispatcher::ChannelDispatcher;
pub use error::{NotifyError, Result};
pub use preferences::{
    CategoryGates, ChannelGates, DeliveryFrequency, NotificationPreferences, QuietHours,
};
pub use push::{
    HttpPushPlatform, Permission, PushAction, PushBackendConfig, PushData, PushPayload,
    PushPlatform, PushState, PushSubscription, PushSubscriptionManager,
};
pub use service::{NotificationInput, NotificationService};
pub use store::{fresh_id, Category, Notification, NotificationStore, NotificationType};
pub use substitute::substitute;
pub use template::{
    referenced_variables, NotificationTemplate, TemplateInput, TemplateStore, TemplateUpdate,
};
