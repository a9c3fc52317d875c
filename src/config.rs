//! 服务配置 - 数据目录、外部网关与策略开关
//!
//! 默认布局：`~/.config/readyaimgo-notify/` 下四个持久化文件
//! （notifications.json / templates.json / preferences.json / events.jsonl），
//! 同目录可放置 `config.json` 覆盖默认配置。

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channels::BusinessChatConfig;
use crate::error::Result;
use crate::push::PushBackendConfig;

/// 模板缺失时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTemplatePolicy {
    /// 返回 NotFound 错误（默认）
    #[default]
    Error,
    /// 静默跳过，不产生通知（与原行为一致）
    Ignore,
}

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// 持久化文件所在目录
    pub data_dir: PathBuf,
    pub missing_template: MissingTemplatePolicy,
    pub push: PushBackendConfig,
    pub business_chat: BusinessChatConfig,
    /// 模拟邮件渠道开关
    pub email_enabled: bool,
    /// 模拟短信渠道开关
    pub sms_enabled: bool,
    /// dry-run 模式（分发只记录不发送）
    pub dry_run: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            missing_template: MissingTemplatePolicy::default(),
            push: PushBackendConfig::default(),
            business_chat: BusinessChatConfig::default(),
            email_enabled: true,
            sms_enabled: true,
            dry_run: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("readyaimgo-notify")
}

impl ServiceConfig {
    /// 使用指定数据目录（测试用）
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Self::default()
        }
    }

    /// 检测数据目录下的 config.json；不存在时返回默认配置
    pub fn detect() -> Result<Self> {
        let config_path = default_data_dir().join("config.json");
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        debug!(path = %config_path.display(), "Loaded service config");
        Ok(config)
    }

    pub fn notifications_path(&self) -> PathBuf {
        self.data_dir.join("notifications.json")
    }

    pub fn templates_path(&self) -> PathBuf {
        self.data_dir.join("templates.json")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}
