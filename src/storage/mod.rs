pub mod local;
pub mod remote;

use crate::config::{RemoteConfig, RemoteType};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// 目录条目，本地和远程统一使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    /// 所在一侧的绝对路径
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    /// 修改时间（毫秒时间戳）
    pub modified_at: i64,
    /// 远程端点原样返回的属性，只保留不解释
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

/// 文件元数据（用于快速检查）
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    pub modified_at: i64,
    pub entry_type: EntryType,
    pub etag: Option<String>,
}

impl FileMeta {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// 存储抽象接口
///
/// 路径都是所在一侧的绝对路径，拼接和规范化交给实现自己处理，
/// 这样同一套同步逻辑既能跑上传也能跑下载。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 建立连接（无状态的存储直接返回成功）
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// 断开连接
    async fn disconnect(&self) {}

    /// 列出目录下的直接子项（包含隐藏文件）
    async fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>>;

    /// 获取文件元数据，不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 检查路径是否存在，存在时返回类型
    async fn exists(&self, path: &str) -> Result<Option<EntryType>> {
        Ok(self.stat(path).await?.map(|m| m.entry_type))
    }

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个文件，父目录不存在时自动创建
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// 删除文件
    async fn delete(&self, path: &str) -> Result<()>;

    /// 创建目录（包括中间目录）
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 删除目录，`recursive` 为 false 时目录必须为空
    async fn remove_dir(&self, path: &str, recursive: bool) -> Result<()>;

    /// 拼接路径
    fn join(&self, dir: &str, name: &str) -> String;

    /// 父目录
    fn parent(&self, path: &str) -> Option<String>;

    /// 规范化路径
    fn normalize(&self, path: &str) -> String;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建远程存储
pub fn create_remote_storage(config: &RemoteConfig) -> Result<Arc<dyn Storage>> {
    let storage = match config.typ {
        RemoteType::Ftp => {
            let host = config
                .host
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("FTP remote requires host"))?;
            let username = config
                .username
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("FTP remote requires username"))?;
            let password = config.password.as_deref().unwrap_or_default();
            tracing::info!("初始化 FTP 远程: {}:{}", host, config.port.unwrap_or(21));
            RemoteStorage::ftp(host, config.port.unwrap_or(21), username, password)?
        }
        RemoteType::Sftp => sftp_storage(config)?,
        RemoteType::WebDav => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires endpoint"))?;
            let username = config
                .username
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires username"))?;
            let password = config
                .password
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires password"))?;
            tracing::info!("初始化 WebDAV 远程: {}", endpoint);
            RemoteStorage::webdav(endpoint, username, password)?
        }
        RemoteType::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires bucket"))?;
            let region = config
                .region
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires region"))?;
            let access_key = config
                .access_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires accessKey"))?;
            let secret_key = config
                .secret_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires secretKey"))?;
            tracing::info!("初始化 S3 远程: bucket={}, region={}", bucket, region);
            RemoteStorage::s3(bucket, region, access_key, secret_key, config.endpoint.as_deref())?
        }
        RemoteType::Fs => {
            let root = config
                .root
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("fs remote requires root"))?;
            tracing::info!("初始化文件系统远程: {}", root);
            RemoteStorage::fs(root)?
        }
    };
    Ok(Arc::new(storage))
}

#[cfg(unix)]
fn sftp_storage(config: &RemoteConfig) -> Result<RemoteStorage> {
    let host = config
        .host
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SFTP remote requires host"))?;
    let username = config
        .username
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SFTP remote requires username"))?;
    if config.password.is_some() && config.private_key.is_none() {
        // OpenSSH 会话不接受明文密码
        anyhow::bail!("SFTP remote requires privateKey or ssh-agent, password login is not supported");
    }
    let port = config.port.unwrap_or(22);
    tracing::info!("初始化 SFTP 远程: {}@{}:{}", username, host, port);
    RemoteStorage::sftp(host, port, username, config.private_key.as_deref())
}

#[cfg(not(unix))]
fn sftp_storage(_config: &RemoteConfig) -> Result<RemoteStorage> {
    anyhow::bail!("SFTP remote is only available on Unix")
}
