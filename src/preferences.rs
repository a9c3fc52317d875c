//! 用户通知偏好 - 渠道开关、分类开关、投递频率与免打扰时段
//!
//! 偏好只读不校验：格式错误的免打扰时间视为未启用，不报错（与原行为一致）。

use std::fs;
use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::ChannelKind;
use crate::error::Result;
use crate::store::Category;

/// 各渠道开关
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelGates {
    pub email: bool,
    pub push: bool,
    pub sms: bool,
    pub business_chat: bool,
    pub in_app: bool,
}

impl Default for ChannelGates {
    fn default() -> Self {
        Self {
            email: true,
            push: false,
            sms: false,
            business_chat: false,
            in_app: true,
        }
    }
}

/// 各分类开关
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryGates {
    pub projects: bool,
    pub payments: bool,
    pub operators: bool,
    pub system: bool,
    pub marketing: bool,
}

impl Default for CategoryGates {
    fn default() -> Self {
        Self {
            projects: true,
            payments: true,
            operators: true,
            system: true,
            // 营销类默认关闭，需显式订阅
            marketing: false,
        }
    }
}

/// 投递频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFrequency {
    Immediate,
    Hourly,
    Daily,
    Weekly,
}

/// 免打扰时段（HH:MM 墙钟字符串，可跨午夜）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }
}

impl QuietHours {
    /// 给定墙钟时间是否落在免打扰窗口内
    ///
    /// 起止时间无法解析时窗口视为关闭。start == end 视为空窗口。
    pub fn contains(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        let (start, end) = match (parse_wall_clock(&self.start), parse_wall_clock(&self.end)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                debug!(start = %self.start, end = %self.end, "Malformed quiet hours, window disabled");
                return false;
            }
        };
        if start == end {
            return false;
        }
        if start < end {
            now >= start && now < end
        } else {
            // 跨午夜窗口，如 22:00-08:00
            now >= start || now < end
        }
    }
}

fn parse_wall_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// 用户通知偏好
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub channels: ChannelGates,
    pub categories: CategoryGates,
    pub frequency: Option<DeliveryFrequency>,
    pub quiet_hours: QuietHours,
    /// 商务聊天平台的用户标识（缺失则跳过该渠道）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_chat_handle: Option<String>,
}

impl NotificationPreferences {
    /// 渠道级开关
    pub fn channel_enabled(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Email => self.channels.email,
            ChannelKind::Push => self.channels.push,
            ChannelKind::Sms => self.channels.sms,
            ChannelKind::BusinessChat => self.channels.business_chat,
            ChannelKind::InApp => self.channels.in_app,
        }
    }

    /// 分类级开关
    pub fn category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Job => self.categories.projects,
            Category::Payment => self.categories.payments,
            Category::Operator => self.categories.operators,
            Category::System | Category::Network => self.categories.system,
            Category::Marketing => self.categories.marketing,
        }
    }

    /// 从磁盘加载；文件不存在返回默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let prefs = serde_json::from_str(&content)?;
        Ok(prefs)
    }

    /// 全量覆盖写入
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gates() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.channel_enabled(ChannelKind::InApp));
        assert!(prefs.channel_enabled(ChannelKind::Email));
        assert!(!prefs.channel_enabled(ChannelKind::Push));
        assert!(prefs.category_enabled(Category::Job));
        assert!(!prefs.category_enabled(Category::Marketing));
    }

    #[test]
    fn test_network_maps_to_system_gate() {
        let mut prefs = NotificationPreferences::default();
        prefs.categories.system = false;
        assert!(!prefs.category_enabled(Category::Network));
        assert!(!prefs.category_enabled(Category::System));
    }

    #[test]
    fn test_quiet_hours_disabled() {
        let qh = QuietHours::default();
        assert!(!qh.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn test_quiet_hours_same_day_window() {
        let qh = QuietHours {
            enabled: true,
            start: "09:00".to_string(),
            end: "17:00".to_string(),
        };
        assert!(qh.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!qh.contains(NaiveTime::from_hms_opt(8, 59, 0).unwrap()));
        assert!(!qh.contains(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
    }

    #[test]
    fn test_quiet_hours_midnight_wrap() {
        let qh = QuietHours {
            enabled: true,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        };
        assert!(qh.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(qh.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!qh.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_quiet_hours_malformed_is_disabled() {
        let qh = QuietHours {
            enabled: true,
            start: "late".to_string(),
            end: "08:00".to_string(),
        };
        // 格式错误不报错，窗口视为关闭
        assert!(!qh.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefs = NotificationPreferences::load(&dir.path().join("prefs.json")).unwrap();
        assert!(prefs.channel_enabled(ChannelKind::InApp));
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = NotificationPreferences::default();
        prefs.channels.push = true;
        prefs.business_chat_handle = Some("client-42".to_string());
        prefs.frequency = Some(DeliveryFrequency::Daily);
        prefs.persist(&path).unwrap();

        let reloaded = NotificationPreferences::load(&path).unwrap();
        assert!(reloaded.channel_enabled(ChannelKind::Push));
        assert_eq!(reloaded.business_chat_handle.as_deref(), Some("client-42"));
        assert_eq!(reloaded.frequency, Some(DeliveryFrequency::Daily));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let prefs: NotificationPreferences =
            serde_json::from_str(r#"{"channels":{"push":true}}"#).unwrap();
        assert!(prefs.channel_enabled(ChannelKind::Push));
        // 未给出的字段使用默认值
        assert!(prefs.channel_enabled(ChannelKind::Email));
        assert!(!prefs.quiet_hours.enabled);
    }
}
