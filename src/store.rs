//! 通知记录存储 - 内存列表 + 本地 JSON 全量写入
//!
//! 单写者假设：所有变更来自同一线程，持久化为整集合覆盖写（last writer wins）。
//! 内存变更先生效，持久化失败向调用方返回错误但不回滚。

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NotifyError, Result};

/// 通知展示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Success => "success",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
        }
    }
}

/// 业务分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Job,
    Payment,
    Operator,
    System,
    Network,
    Marketing,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Job => "job",
            Category::Payment => "payment",
            Category::Operator => "operator",
            Category::System => "system",
            Category::Network => "network",
            Category::Marketing => "marketing",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 通知记录
///
/// 创建后除已读状态外不可变。`persistent = false` 的通知只投递不保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// 唯一标识（如 ntf-18c2a3f4b21-1）
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: Category,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    /// 点击跳转地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// 跳转按钮文案
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_persistent() -> bool {
    true
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 生成进程内唯一 id（毫秒时间戳 + 单调计数器）
pub fn fresh_id(prefix: &str) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{:x}-{}", prefix, Utc::now().timestamp_millis(), seq)
}

/// 通知记录存储
pub struct NotificationStore {
    path: PathBuf,
    items: Vec<Notification>,
}

impl NotificationStore {
    /// 创建空存储（不读盘）
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            items: Vec::new(),
        }
    }

    /// 从磁盘加载；文件不存在视为空集合
    pub fn load(path: PathBuf) -> Result<Self> {
        let items = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        debug!(count = items.len(), path = %path.display(), "Loaded notification store");
        Ok(Self { path, items })
    }

    /// 头插新记录并全量持久化
    pub fn add(&mut self, notification: Notification) -> Result<()> {
        self.items.insert(0, notification);
        self.persist()
    }

    /// 所有记录（最新在前）
    pub fn list(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// 标记单条为已读
    pub fn mark_as_read(&mut self, id: &str) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| NotifyError::NotFound(format!("notification {}", id)))?;
        item.read = true;
        self.persist()
    }

    /// 全部标记为已读
    pub fn mark_all_as_read(&mut self) -> Result<()> {
        for item in &mut self.items {
            item.read = true;
        }
        self.persist()
    }

    /// 删除指定 id，其余顺序不变
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        if self.items.len() == before {
            return Err(NotifyError::NotFound(format!("notification {}", id)));
        }
        self.persist()
    }

    /// 清空所有记录
    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.persist()
    }

    /// 全量覆盖写入 JSON 文件
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.items)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
