use crate::error::SyncError;
use serde::{Deserialize, Serialize};

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Idle,
    Upload,
    Download,
}

impl SyncMode {
    /// 从设置值解析，空值视为暂停
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "idle" => Some(SyncMode::Idle),
            "upload" => Some(SyncMode::Upload),
            "download" => Some(SyncMode::Download),
            _ => None,
        }
    }

    /// 对应的传输方向，Idle 没有方向
    pub fn direction(&self) -> Option<Direction> {
        match self {
            SyncMode::Idle => None,
            SyncMode::Upload => Some(Direction::Upload),
            SyncMode::Download => Some(Direction::Download),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Idle => "",
            SyncMode::Upload => "upload",
            SyncMode::Download => "download",
        }
    }
}

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 本地 -> 远程
    Upload,
    /// 远程 -> 本地
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// 审计日志类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Info,
    Error,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "info",
            LogType::Error => "error",
        }
    }
}

impl From<&str> for LogType {
    fn from(s: &str) -> Self {
        match s {
            "error" => LogType::Error,
            _ => LogType::Info,
        }
    }
}

/// 审计日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub log_type: LogType,
    /// 简短标题，例如 "Error - Transfer File"
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl AuditEntry {
    pub fn new(log_type: LogType, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            log_type,
            kind: kind.into(),
            description: description.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn info(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::Info, kind, description)
    }
}

impl From<&SyncError> for AuditEntry {
    fn from(err: &SyncError) -> Self {
        Self::new(
            LogType::Error,
            err.title(),
            format!("{} ({})", err.message, err.context),
        )
    }
}

// 数据库表模型
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: String,
    pub log_type: String,
    pub kind: String,
    pub description: String,
    pub created_at: i64,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            log_type: LogType::from(row.log_type.as_str()),
            kind: row.kind,
            description: row.description,
            timestamp: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_mode() {
        assert_eq!(SyncMode::parse(""), Some(SyncMode::Idle));
        assert_eq!(SyncMode::parse("Upload"), Some(SyncMode::Upload));
        assert_eq!(SyncMode::parse(" download "), Some(SyncMode::Download));
        assert_eq!(SyncMode::parse("sideways"), None);
        assert_eq!(SyncMode::Upload.direction(), Some(Direction::Upload));
        assert_eq!(SyncMode::Idle.direction(), None);
    }

    #[test]
    fn test_audit_entry_from_error() {
        let err = SyncError::cleanup("/remote/a.txt", "permission denied");
        let entry = AuditEntry::from(&err);
        assert_eq!(entry.log_type, LogType::Error);
        assert_eq!(entry.kind, "Error - Cleanup");
        assert!(entry.description.contains("/remote/a.txt"));
    }
}
