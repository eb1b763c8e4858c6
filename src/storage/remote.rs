use super::{DirectoryEntry, EntryType, FileMeta, Storage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::core::paths;
use anyhow::Result;
use async_trait::async_trait;
use opendal::{layers::TimeoutLayer, Metadata, Metakey, Operator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// 远程端点（FTP / SFTP / WebDAV / S3 / 文件系统），基于 opendal
///
/// 端点被看作单个共享会话，同一时刻只发出一个逻辑操作。
pub struct RemoteStorage {
    operator: Operator,
    name: String,
    session: Mutex<()>,
    connected: AtomicBool,
}

impl RemoteStorage {
    fn from_operator(operator: Operator, name: String) -> Self {
        Self {
            operator,
            name,
            session: Mutex::new(()),
            connected: AtomicBool::new(false),
        }
    }

    fn timeout_layer() -> TimeoutLayer {
        TimeoutLayer::default()
            .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS))
    }

    pub fn ftp(host: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        use opendal::services::Ftp;

        let endpoint = format!("ftp://{}:{}", host, port);
        let builder = Ftp::default()
            .endpoint(&endpoint)
            .user(username)
            .password(password);

        let operator = Operator::new(builder)?
            .layer(Self::timeout_layer())
            .finish();

        Ok(Self::from_operator(operator, endpoint))
    }

    /// SFTP 通过系统的 OpenSSH 建立会话，认证使用私钥或 ssh-agent
    #[cfg(unix)]
    pub fn sftp(host: &str, port: u16, username: &str, key: Option<&str>) -> Result<Self> {
        use opendal::services::Sftp;

        let endpoint = format!("ssh://{}:{}", host, port);
        let mut builder = Sftp::default()
            .endpoint(&endpoint)
            .user(username)
            .known_hosts_strategy("accept");
        if let Some(key) = key {
            builder = builder.key(key);
        }

        let operator = Operator::new(builder)?
            .layer(Self::timeout_layer())
            .finish();

        Ok(Self::from_operator(operator, format!("sftp://{}@{}:{}", username, host, port)))
    }

    pub fn webdav(endpoint: &str, username: &str, password: &str) -> Result<Self> {
        use opendal::services::Webdav;

        let builder = Webdav::default()
            .endpoint(endpoint)
            .username(username)
            .password(password);

        let operator = Operator::new(builder)?
            .layer(Self::timeout_layer())
            .finish();

        let name = format!("webdav://{}", endpoint.trim_end_matches('/'));
        Ok(Self::from_operator(operator, name))
    }

    pub fn s3(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        if let Some(ep) = endpoint {
            builder = builder.endpoint(ep);
        }

        let operator = Operator::new(builder)?
            .layer(Self::timeout_layer())
            .finish();

        Ok(Self::from_operator(operator, format!("s3://{}", bucket)))
    }

    /// 以本地目录充当远程端点，测试和本机镜像时使用
    pub fn fs(root: &str) -> Result<Self> {
        use opendal::services::Fs;

        let operator = Operator::new(Fs::default().root(root))?.finish();
        Ok(Self::from_operator(operator, format!("fs://{}", root)))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 文件路径转为 opendal 的 key（不带前导 `/`）
    fn file_key(path: &str) -> String {
        paths::normalize_remote(path)
            .trim_start_matches('/')
            .to_string()
    }

    /// 目录路径转为 opendal 的 key（以 `/` 结尾）
    fn dir_key(path: &str) -> String {
        let key = Self::file_key(path);
        if key.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", key)
        }
    }

    fn meta_from(meta: &Metadata) -> FileMeta {
        let is_dir = meta.is_dir();
        FileMeta {
            size: if is_dir { 0 } else { meta.content_length() },
            modified_at: meta.last_modified().map_or(0, |t| t.timestamp_millis()),
            entry_type: if is_dir {
                EntryType::Directory
            } else {
                EntryType::File
            },
            etag: meta.etag().map(|s| s.trim_matches('"').to_string()),
        }
    }

    async fn stat_unlocked(&self, path: &str) -> Result<Option<FileMeta>> {
        let key = Self::file_key(path);
        if key.is_empty() {
            // 根目录总是存在
            return Ok(Some(FileMeta {
                size: 0,
                modified_at: 0,
                entry_type: EntryType::Directory,
                etag: None,
            }));
        }

        match self.operator.stat(&key).await {
            Ok(meta) => Ok(Some(Self::meta_from(&meta))),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                // 可能是目录，带上 `/` 再查一次
                match self.operator.stat(&Self::dir_key(path)).await {
                    Ok(meta) => Ok(Some(Self::meta_from(&meta))),
                    Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_unlocked(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let dir = paths::normalize_remote(path);
        let key = Self::dir_key(&dir);

        let listed = self
            .operator
            .list_with(&key)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await?;

        let mut entries = Vec::with_capacity(listed.len());
        for entry in listed {
            // 部分服务会把目录自身也列出来
            if entry.path() == key || entry.path().trim_matches('/').is_empty() {
                continue;
            }
            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }

            let raw = entry.metadata();
            let meta = Self::meta_from(raw);
            entries.push(DirectoryEntry {
                path: paths::join_remote(&dir, &name),
                name,
                entry_type: meta.entry_type,
                size: meta.size,
                modified_at: meta.modified_at,
                etag: meta.etag,
                content_type: raw.content_type().map(|s| s.to_string()),
            });
        }

        Ok(entries)
    }

    async fn create_dir_unlocked(&self, path: &str) -> Result<()> {
        let key = Self::file_key(path);
        if key.is_empty() {
            return Ok(());
        }

        // 逐级创建，中间目录已存在时忽略错误
        let parts: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = String::new();
        for (idx, part) in parts.iter().enumerate() {
            current.push_str(part);
            current.push('/');
            let result = self.operator.create_dir(&current).await;
            if idx + 1 == parts.len() {
                if let Err(e) = result {
                    match self.stat_unlocked(&current).await? {
                        Some(meta) if meta.is_dir() => {}
                        _ => return Err(e.into()),
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn connect(&self) -> Result<()> {
        let _session = self.session.lock().await;
        match self.operator.check().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                tracing::debug!("已连接远程端点: {}", self.name);
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(anyhow::anyhow!("无法连接远程端点 {}: {}", self.name, e))
            }
        }
    }

    async fn disconnect(&self) {
        let _session = self.session.lock().await;
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!("已断开远程端点: {}", self.name);
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let _session = self.session.lock().await;
        self.list_unlocked(path).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let _session = self.session.lock().await;
        self.stat_unlocked(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let _session = self.session.lock().await;
        let data = self.operator.read(&Self::file_key(path)).await?;
        Ok(data.to_vec())
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let _session = self.session.lock().await;
        if let Some(parent) = paths::parent_remote(path) {
            self.create_dir_unlocked(&parent).await?;
        }
        self.operator.write(&Self::file_key(path), data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _session = self.session.lock().await;
        match self.operator.delete(&Self::file_key(path)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let _session = self.session.lock().await;
        self.create_dir_unlocked(path).await
    }

    async fn remove_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let _session = self.session.lock().await;
        let key = Self::dir_key(path);
        if key == "/" {
            anyhow::bail!("refusing to remove remote root");
        }

        if recursive {
            self.operator.remove_all(&key).await?;
            return Ok(());
        }

        if !self.list_unlocked(path).await?.is_empty() {
            anyhow::bail!("directory not empty: {}", path);
        }
        match self.operator.delete(&key).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn join(&self, dir: &str, name: &str) -> String {
        paths::join_remote(dir, name)
    }

    fn parent(&self, path: &str) -> Option<String> {
        paths::parent_remote(path)
    }

    fn normalize(&self, path: &str) -> String {
        paths::normalize_remote(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
