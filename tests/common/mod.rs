#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use remotesync_lib::audit::MemoryAudit;
use remotesync_lib::config::{keys, MemorySettings, SettingsStore};
use remotesync_lib::storage::{DirectoryEntry, FileMeta, LocalStorage, RemoteStorage, Storage};
use remotesync_lib::{EventBus, SyncConfig, SyncEvent, SyncScheduler};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

/// 包装一个存储，用来模拟远程端的延迟和故障
pub struct ShimStorage {
    inner: Arc<dyn Storage>,
    /// stat 总是报告文件大小为 0，批次永远不会收敛
    hide_sizes: bool,
    /// 读取这些文件名时失败
    unreadable: Vec<String>,
    /// 每次写入前的延迟
    write_delay: Option<Duration>,
}

impl ShimStorage {
    pub fn lagging(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            hide_sizes: true,
            unreadable: vec![],
            write_delay: None,
        }
    }

    pub fn slow_writes(inner: Arc<dyn Storage>, delay: Duration) -> Self {
        Self {
            inner,
            hide_sizes: false,
            unreadable: vec![],
            write_delay: Some(delay),
        }
    }

    pub fn unreadable(inner: Arc<dyn Storage>, names: &[&str]) -> Self {
        Self {
            inner,
            hide_sizes: false,
            unreadable: names.iter().map(|s| s.to_string()).collect(),
            write_delay: None,
        }
    }
}

#[async_trait]
impl Storage for ShimStorage {
    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        self.inner.list_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let meta = self.inner.stat(path).await?;
        if self.hide_sizes {
            return Ok(meta.map(|mut m| {
                if !m.is_dir() {
                    m.size = 0;
                }
                m
            }));
        }
        Ok(meta)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        if self.unreadable.iter().any(|n| path.ends_with(n.as_str())) {
            anyhow::bail!("permission denied");
        }
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inner.create_dir(path).await
    }

    async fn remove_dir(&self, path: &str, recursive: bool) -> Result<()> {
        self.inner.remove_dir(path, recursive).await
    }

    fn join(&self, dir: &str, name: &str) -> String {
        self.inner.join(dir, name)
    }

    fn parent(&self, path: &str) -> Option<String> {
        self.inner.parent(path)
    }

    fn normalize(&self, path: &str) -> String {
        self.inner.normalize(path)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// 一套本地目录 + fs 远程端点 + 内存设置的测试环境
pub struct Env {
    pub local_dir: tempfile::TempDir,
    pub remote_dir: tempfile::TempDir,
    pub settings: Arc<MemorySettings>,
    pub audit: Arc<MemoryAudit>,
    pub events: EventBus,
}

impl Env {
    pub fn new() -> Self {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(MemorySettings::new());
        settings
            .set(keys::LOCAL_ROOT, json!(local_dir.path().to_string_lossy()))
            .unwrap();
        settings.set(keys::REMOTE_ROOT, json!("/sync")).unwrap();
        Self {
            local_dir,
            remote_dir,
            settings,
            audit: Arc::new(MemoryAudit::new()),
            events: EventBus::default(),
        }
    }

    pub fn local(&self) -> Arc<dyn Storage> {
        Arc::new(LocalStorage::new())
    }

    pub fn remote(&self) -> Arc<dyn Storage> {
        Arc::new(RemoteStorage::fs(&self.remote_dir.path().to_string_lossy()).unwrap())
    }

    /// 远程同步根目录在磁盘上的位置
    pub fn remote_root(&self) -> std::path::PathBuf {
        self.remote_dir.path().join("sync")
    }

    pub fn set_mode(&self, mode: &str) {
        self.settings.set(keys::SYNC_MODE, json!(mode)).unwrap();
    }

    pub fn scheduler(&self) -> SyncScheduler {
        self.scheduler_with(self.local(), self.remote(), Some(Duration::from_secs(5)))
    }

    pub fn scheduler_with(
        &self,
        local: Arc<dyn Storage>,
        remote: Arc<dyn Storage>,
        convergence_timeout: Option<Duration>,
    ) -> SyncScheduler {
        SyncScheduler::new(
            local,
            remote,
            self.settings.clone(),
            self.audit.clone(),
            self.events.clone(),
            SyncConfig {
                poll_interval: Duration::from_millis(20),
                convergence_timeout,
            },
        )
    }
}

pub fn write_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}

pub fn write_file_with_mtime(path: &Path, data: &[u8], mtime: SystemTime) {
    write_file(path, data);
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(mtime).unwrap();
}

pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
