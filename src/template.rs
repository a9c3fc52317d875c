//! 通知模板存储 - 可参数化的通知正文，支持 `{variable}` 占位符
//!
//! 创建时校验正文引用的变量都已声明（原实现不校验，此处按构造期校验收紧）。

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NotifyError, Result};
use crate::store::{fresh_id, Category, NotificationType};

/// 通知模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    /// 唯一标识（如 tpl-18c2a3f4b21-2）
    pub id: String,
    pub name: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// 标题模板，可含 `{variable}` 占位符
    pub title: String,
    /// 描述模板，可含 `{variable}` 占位符
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
    /// 跳转地址模板，可含 `{variable}` 占位符
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// 声明的变量名（正文只允许引用这些变量）
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// 每次成功的模板发送加一
    #[serde(default)]
    pub usage_count: u64,
}

/// 创建模板的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub action_label: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 部分更新（None 字段保持原值）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub category: Option<Category>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub action_label: Option<String>,
    pub action_url: Option<String>,
    pub variables: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// 提取正文中引用的 `{variable}` 占位符名
pub fn referenced_variables(pattern: &str) -> Vec<String> {
    // unwrap 安全：字面量正则
    let re = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
    re.captures_iter(pattern)
        .map(|c| c[1].to_string())
        .collect()
}

/// 模板存储
pub struct TemplateStore {
    path: PathBuf,
    items: Vec<NotificationTemplate>,
}

impl TemplateStore {
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
        debug!(count = items.len(), path = %path.display(), "Loaded template store");
        Ok(Self { path, items })
    }

    /// 所有模板（插入顺序）
    pub fn list(&self) -> &[NotificationTemplate] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&NotificationTemplate> {
        self.items.iter().find(|t| t.id == id)
    }

    /// 创建模板：分配 id、零使用计数、当前时间戳
    ///
    /// 正文（标题、描述、跳转地址）引用了未声明变量时返回 `ValidationFailed`。
    pub fn create(&mut self, input: TemplateInput) -> Result<NotificationTemplate> {
        Self::validate_variables(
            &input.variables,
            &input.title,
            &input.description,
            input.action_url.as_deref(),
        )?;

        let template = NotificationTemplate {
            id: fresh_id("tpl"),
            name: input.name,
            category: input.category,
            notification_type: input.notification_type,
            title: input.title,
            description: input.description,
            action_label: input.action_label,
            action_url: input.action_url,
            variables: input.variables,
            tags: input.tags,
            created_at: Utc::now(),
            usage_count: 0,
        };
        self.items.push(template.clone());
        self.persist()?;
        Ok(template)
    }

    /// 部分字段合并更新
    ///
    /// 合并后的正文同样受声明变量约束：引用了未声明变量时返回
    /// `ValidationFailed`，原模板保持不变。
    pub fn update(&mut self, id: &str, update: TemplateUpdate) -> Result<NotificationTemplate> {
        let index = self
            .items
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| NotifyError::NotFound(format!("template {}", id)))?;

        let mut merged = self.items[index].clone();
        if let Some(name) = update.name {
            merged.name = name;
        }
        if let Some(category) = update.category {
            merged.category = category;
        }
        if let Some(ty) = update.notification_type {
            merged.notification_type = ty;
        }
        if let Some(title) = update.title {
            merged.title = title;
        }
        if let Some(description) = update.description {
            merged.description = description;
        }
        if let Some(label) = update.action_label {
            merged.action_label = Some(label);
        }
        if let Some(url) = update.action_url {
            merged.action_url = Some(url);
        }
        if let Some(variables) = update.variables {
            merged.variables = variables;
        }
        if let Some(tags) = update.tags {
            merged.tags = tags;
        }

        Self::validate_variables(
            &merged.variables,
            &merged.title,
            &merged.description,
            merged.action_url.as_deref(),
        )?;

        self.items[index] = merged.clone();
        self.persist()?;
        Ok(merged)
    }

    /// 删除模板；对已发送的通知无级联影响
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|t| t.id != id);
        if self.items.len() == before {
            return Err(NotifyError::NotFound(format!("template {}", id)));
        }
        self.persist()
    }

    /// 使用计数加一（每次成功的模板发送恰好调用一次）
    pub fn increment_usage(&mut self, id: &str) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| NotifyError::NotFound(format!("template {}", id)))?;
        item.usage_count += 1;
        self.persist()
    }

    fn validate_variables(
        variables: &[String],
        title: &str,
        description: &str,
        action_url: Option<&str>,
    ) -> Result<()> {
        let declared: HashSet<&str> = variables.iter().map(|s| s.as_str()).collect();

        let mut referenced = referenced_variables(title);
        referenced.extend(referenced_variables(description));
        if let Some(url) = action_url {
            referenced.extend(referenced_variables(url));
        }

        let undeclared: Vec<String> = referenced
            .into_iter()
            .filter(|v| !declared.contains(v.as_str()))
            .collect();

        if undeclared.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::ValidationFailed(format!(
                "template body references undeclared variables: {}",
                undeclared.join(", ")
            )))
        }
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
