//! 同步引擎错误类型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// 列目录 / stat 失败，对应子树本轮不产生任何传输
    Listing,
    /// 单个文件传输失败
    Transfer,
    /// 远程端点不可达
    Connection,
    /// 配置缺失或非法
    Config,
    /// 模式切换清理时删除失败
    Cleanup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Listing => write!(f, "listing"),
            ErrorKind::Transfer => write!(f, "transfer"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// 同步错误
///
/// `context` 一般是出错的路径或配置项名称。
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error at {context}: {message}")]
pub struct SyncError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: String,
}

impl SyncError {
    pub fn new(kind: ErrorKind, context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
            context: context.into(),
        }
    }

    pub fn listing(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Listing, context, err)
    }

    pub fn transfer(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Transfer, context, err)
    }

    pub fn connection(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Connection, context, err)
    }

    pub fn config(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Config, context, err)
    }

    pub fn cleanup(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Cleanup, context, err)
    }

    /// 审计日志里显示的标题，例如 "Error - Transfer"
    pub fn title(&self) -> String {
        let kind = match self.kind {
            ErrorKind::Listing => "List Files",
            ErrorKind::Transfer => "Transfer File",
            ErrorKind::Connection => "Connect to Remote",
            ErrorKind::Config => "Configuration",
            ErrorKind::Cleanup => "Cleanup",
        };
        format!("Error - {}", kind)
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_context() {
        let err = SyncError::transfer("/remote/a.txt", "broken pipe");
        assert_eq!(err.kind, ErrorKind::Transfer);
        assert_eq!(err.to_string(), "transfer error at /remote/a.txt: broken pipe");
        assert_eq!(err.title(), "Error - Transfer File");
    }
}
