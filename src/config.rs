//! 应用配置模块
//!
//! 设置以键值对形式保存在 `config.json` 中，同步引擎每次定时触发时重新读取，
//! 因此界面修改设置后下一轮就会生效。

use crate::db::SyncMode;
use crate::error::{SyncError, SyncResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// 设置项名称
pub mod keys {
    pub const SYNC_MODE: &str = "syncMode";
    pub const LOCAL_ROOT: &str = "localRoot";
    pub const REMOTE_ROOT: &str = "remoteRoot";
    pub const SYNC_INTERVAL_MS: &str = "syncIntervalMs";
    pub const DELETE_AFTER_UPLOAD: &str = "deleteAfterUpload";
    pub const REMOTE: &str = "remote";
}

/// 默认同步间隔（毫秒）
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// 键值设置存储
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// 基于 `config.json` 的设置存储
pub struct JsonSettingsStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonSettingsStore {
    /// 从配置目录加载，文件不存在或损坏时从空配置开始
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join("config.json");
        let values = Self::read_map(&path).unwrap_or_default();
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    fn read_map(path: &Path) -> Option<Map<String, Value>> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Value>(&content).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// 导出全部设置到指定文件
    pub fn export_to(&self, target: &Path) -> Result<()> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        fs::write(target, serde_json::to_string_pretty(&*values)?)?;
        Ok(())
    }

    /// 从指定文件导入设置，覆盖同名项，返回导入的项数
    pub fn import_from(&self, source: &Path) -> Result<usize> {
        let content = fs::read_to_string(source)?;
        let imported = match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("settings file must contain a JSON object"),
        };

        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let count = imported.len();
        for (key, value) in imported {
            values.insert(key, value);
        }
        self.persist(&values)?;
        Ok(count)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

/// 内存设置存储
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<Map<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// 远程端点类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    #[default]
    Ftp,
    Sftp,
    WebDav,
    S3,
    Fs,
}

/// 远程端点配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type")]
    pub typ: RemoteType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SFTP 私钥路径，不填时使用 ssh-agent 和默认密钥
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// fs 类型使用的本地根目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl RemoteConfig {
    pub fn load(store: &dyn SettingsStore) -> SyncResult<Self> {
        let value = store
            .get(keys::REMOTE)
            .ok_or_else(|| SyncError::config(keys::REMOTE, "请先设置远程连接"))?;
        serde_json::from_value(value).map_err(|e| SyncError::config(keys::REMOTE, e))
    }
}

/// 每次定时触发时读取的同步设置快照
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub mode: SyncMode,
    /// 本地同步根目录，Idle 模式下可以为空
    pub local_root: String,
    /// 远程同步根目录，未设置时为 `/`
    pub remote_root: String,
    pub interval: Duration,
    pub delete_after_upload: bool,
}

impl SyncSettings {
    pub fn load(store: &dyn SettingsStore) -> SyncResult<Self> {
        let mode = read_mode(store)?;
        let local_root = read_string(store, keys::LOCAL_ROOT).unwrap_or_default();
        let remote_root = read_string(store, keys::REMOTE_ROOT)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "/".to_string());

        if mode != SyncMode::Idle && local_root.trim().is_empty() {
            return Err(SyncError::config(keys::LOCAL_ROOT, "请先设置本地同步目录"));
        }

        Ok(Self {
            mode,
            local_root,
            remote_root,
            interval: read_interval(store),
            delete_after_upload: store
                .get(keys::DELETE_AFTER_UPLOAD)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }
}

fn read_string(store: &dyn SettingsStore, key: &str) -> Option<String> {
    store.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

/// 读取同步模式，非法值返回配置错误
pub fn read_mode(store: &dyn SettingsStore) -> SyncResult<SyncMode> {
    match store.get(keys::SYNC_MODE) {
        None | Some(Value::Null) => Ok(SyncMode::Idle),
        Some(Value::String(s)) => SyncMode::parse(&s)
            .ok_or_else(|| SyncError::config(keys::SYNC_MODE, format!("无效的同步模式: {}", s))),
        Some(other) => Err(SyncError::config(
            keys::SYNC_MODE,
            format!("无效的同步模式: {}", other),
        )),
    }
}

/// 读取同步间隔，未设置或非法时使用默认值
pub fn read_interval(store: &dyn SettingsStore) -> Duration {
    let ms = store
        .get(keys::SYNC_INTERVAL_MS)
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            // 界面可能把数字存成字符串
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_SYNC_INTERVAL_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_json_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::load(dir.path());
        store.set(keys::SYNC_MODE, json!("upload")).unwrap();
        store.set(keys::SYNC_INTERVAL_MS, json!(5000)).unwrap();

        let reloaded = JsonSettingsStore::load(dir.path());
        assert_eq!(reloaded.get(keys::SYNC_MODE), Some(json!("upload")));
        assert_eq!(read_interval(&reloaded), Duration::from_millis(5000));
    }

    #[test]
    fn test_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::load(dir.path());
        store.set(keys::LOCAL_ROOT, json!("/home/user/sync")).unwrap();

        let exported = dir.path().join("export.json");
        store.export_to(&exported).unwrap();

        let other_dir = tempfile::tempdir().unwrap();
        let other = JsonSettingsStore::load(other_dir.path());
        assert_eq!(other.import_from(&exported).unwrap(), 1);
        assert_eq!(other.get(keys::LOCAL_ROOT), Some(json!("/home/user/sync")));
    }

    #[test]
    fn test_sync_settings_defaults() {
        let store = MemorySettings::new();
        let settings = SyncSettings::load(&store).unwrap();
        assert_eq!(settings.mode, SyncMode::Idle);
        assert_eq!(settings.remote_root, "/");
        assert_eq!(settings.interval, Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS));
        assert!(!settings.delete_after_upload);
    }

    #[test]
    fn test_invalid_mode_is_config_error() {
        let store = MemorySettings::new();
        store.set(keys::SYNC_MODE, json!("both")).unwrap();
        let err = SyncSettings::load(&store).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.context, keys::SYNC_MODE);
    }

    #[test]
    fn test_upload_requires_local_root() {
        let store = MemorySettings::new();
        store.set(keys::SYNC_MODE, json!("upload")).unwrap();
        let err = SyncSettings::load(&store).unwrap_err();
        assert_eq!(err.context, keys::LOCAL_ROOT);
    }

    #[test]
    fn test_interval_accepts_strings_and_ignores_zero() {
        let store = MemorySettings::new();
        store.set(keys::SYNC_INTERVAL_MS, json!("1500")).unwrap();
        assert_eq!(read_interval(&store), Duration::from_millis(1500));
        store.set(keys::SYNC_INTERVAL_MS, json!(0)).unwrap();
        assert_eq!(read_interval(&store), Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS));
    }

    #[test]
    fn test_remote_config_from_settings() {
        let store = MemorySettings::new();
        assert!(RemoteConfig::load(&store).is_err());
        store
            .set(
                keys::REMOTE,
                json!({"type": "ftp", "host": "example.org", "port": 2121, "username": "u"}),
            )
            .unwrap();
        let config = RemoteConfig::load(&store).unwrap();
        assert_eq!(config.typ, RemoteType::Ftp);
        assert_eq!(config.port, Some(2121));

        store
            .set(
                keys::REMOTE,
                json!({"type": "sftp", "host": "example.org", "username": "u", "privateKey": "/home/u/.ssh/id_ed25519"}),
            )
            .unwrap();
        let config = RemoteConfig::load(&store).unwrap();
        assert_eq!(config.typ, RemoteType::Sftp);
        assert_eq!(config.private_key.as_deref(), Some("/home/u/.ssh/id_ed25519"));
    }
}
