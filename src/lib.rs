use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod audit;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod storage;

pub use crate::core::{SyncConfig, SyncScheduler, TickOutcome};
pub use config::{JsonSettingsStore, RemoteConfig, SettingsStore, SyncSettings};
pub use db::{Direction, SyncMode};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};

use audit::AuditLog;
use storage::{LocalStorage, Storage};

/// 应用状态：设置、审计日志、事件总线和调度器
#[derive(Clone)]
pub struct AppState {
    pub db: db::SqlitePool,
    pub settings: Arc<JsonSettingsStore>,
    pub audit: Arc<AuditLog>,
    pub events: EventBus,
    pub config_dir: PathBuf,
    scheduler: Arc<Mutex<Option<SyncScheduler>>>,
}

impl AppState {
    /// 使用默认配置目录初始化
    pub async fn new() -> anyhow::Result<Self> {
        let config_dir = dirs::app_config_dir();
        Self::with_config_dir(&config_dir).await
    }

    pub async fn with_config_dir(config_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config_dir)?;

        let db = db::open(config_dir).await?;
        let settings = Arc::new(JsonSettingsStore::load(config_dir));
        let audit = Arc::new(AuditLog::new(db.clone()));

        Ok(Self {
            db,
            settings,
            audit,
            events: EventBus::default(),
            config_dir: config_dir.to_path_buf(),
            scheduler: Arc::new(Mutex::new(None)),
        })
    }

    /// 按当前设置创建远程端点
    fn create_remote(&self) -> SyncResult<Arc<dyn Storage>> {
        let remote_config = RemoteConfig::load(self.settings.as_ref())?;
        storage::create_remote_storage(&remote_config)
            .map_err(|e| SyncError::config(config::keys::REMOTE, format!("{:#}", e)))
    }

    /// 启动同步定时器，已有的调度器会先停止
    pub async fn start_sync(&self) -> SyncResult<SyncScheduler> {
        let mut guard = self.scheduler.lock().await;
        if let Some(old) = guard.take() {
            old.stop().await;
        }

        let remote = match self.create_remote() {
            Ok(remote) => remote,
            Err(e) => {
                audit::report(self.audit.as_ref(), &e);
                return Err(e);
            }
        };

        let scheduler = SyncScheduler::new(
            Arc::new(LocalStorage::new()),
            remote,
            self.settings.clone(),
            self.audit.clone(),
            self.events.clone(),
            SyncConfig::default(),
        );
        scheduler.start();
        *guard = Some(scheduler.clone());
        Ok(scheduler)
    }

    /// 停止同步并清理残留
    pub async fn stop_sync(&self) {
        let scheduler = self.scheduler.lock().await.take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
    }

    pub async fn scheduler(&self) -> Option<SyncScheduler> {
        self.scheduler.lock().await.clone()
    }

    /// 测试远程连接：连接后立即断开
    pub async fn test_connection(&self, remote_config: &RemoteConfig) -> SyncResult<()> {
        let remote = storage::create_remote_storage(remote_config)
            .map_err(|e| SyncError::config(config::keys::REMOTE, format!("{:#}", e)))?;

        let result = remote
            .connect()
            .await
            .map_err(|e| SyncError::connection(remote.name(), format!("{:#}", e)));
        remote.disconnect().await;

        match &result {
            Ok(()) => tracing::info!("连接测试成功: {}", remote.name()),
            Err(e) => tracing::warn!("连接测试失败: {}", e),
        }
        result
    }

    /// 清理资源（进程退出时调用）
    pub async fn cleanup(&self) {
        tracing::info!("正在清理应用资源...");
        self.stop_sync().await;

        tracing::debug!("关闭数据库连接池...");
        self.db.close().await;

        tracing::info!("资源清理完成");
    }
}

/// 平台相关的配置目录
pub mod dirs {
    use std::path::PathBuf;

    pub const APP_DIR_NAME: &str = "remotesync";

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 应用自己的配置目录
    pub fn app_config_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR_NAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteType;
    use serde_json::json;

    #[tokio::test]
    async fn test_app_state_connection_test() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config_dir(dir.path()).await.unwrap();

        let remote_dir = tempfile::tempdir().unwrap();
        let ok = RemoteConfig {
            typ: RemoteType::Fs,
            root: Some(remote_dir.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        state.test_connection(&ok).await.unwrap();

        let missing = RemoteConfig {
            typ: RemoteType::WebDav,
            ..Default::default()
        };
        let err = state.test_connection(&missing).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        state.cleanup().await;
    }

    #[tokio::test]
    async fn test_start_sync_requires_remote() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config_dir(dir.path()).await.unwrap();
        let err = state.start_sync().await.unwrap_err();
        assert_eq!(err.context, config::keys::REMOTE);

        let remote_dir = tempfile::tempdir().unwrap();
        state
            .settings
            .set(
                config::keys::REMOTE,
                json!({"type": "fs", "root": remote_dir.path().to_string_lossy()}),
            )
            .unwrap();
        let scheduler = state.start_sync().await.unwrap();
        assert!(state.scheduler().await.is_some());
        // Idle 模式下第一次触发就暂停
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!scheduler.is_running());

        state.cleanup().await;
        assert!(state.scheduler().await.is_none());
        assert!(dir.path().join("config.json").is_file());
    }
}
