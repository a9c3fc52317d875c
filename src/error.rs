//! 错误类型定义 - 通知子系统的统一错误分类

use thiserror::Error;

/// 通知子系统错误
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 模板、通知或渠道 id 不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// 平台拒绝推送权限
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// 单个渠道发送被拒绝或超时
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// 模板变量不匹配等校验失败
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// 本地持久化读写失败
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON 序列化/反序列化失败
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NotifyError::NotFound("template tpl-123".to_string());
        assert_eq!(err.to_string(), "not found: template tpl-123");

        let err = NotifyError::ValidationFailed("undeclared variable {city}".to_string());
        assert!(err.to_string().contains("undeclared variable"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: NotifyError = io.into();
        assert!(matches!(err, NotifyError::Storage(_)));
    }
}
