use super::{DirectoryEntry, EntryType, FileMeta, Storage};
use crate::core::paths;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs;

/// 本地文件系统
pub struct LocalStorage {
    name: String,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    fn meta_from(metadata: &std::fs::Metadata) -> FileMeta {
        // 部分文件系统不支持 mtime，按 0 处理
        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as i64);

        FileMeta {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified_at,
            entry_type: if metadata.is_dir() {
                EntryType::Directory
            } else {
                EntryType::File
            },
            etag: None,
        }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let dir = paths::normalize_local(path);
        let mut reader = fs::read_dir(&dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    // 列目录期间被删除的条目直接跳过
                    if e.kind() == std::io::ErrorKind::NotFound {
                        continue;
                    }
                    return Err(e.into());
                }
            };
            let meta = Self::meta_from(&metadata);

            entries.push(DirectoryEntry {
                path: paths::join_local(&dir, &name),
                name,
                entry_type: meta.entry_type,
                size: meta.size,
                modified_at: meta.modified_at,
                etag: None,
                content_type: None,
            });
        }

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match fs::metadata(paths::normalize_local(path)).await {
            Ok(metadata) => Ok(Some(Self::meta_from(&metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(paths::normalize_local(path)).await?;
        Ok(data)
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let full_path = paths::normalize_local(path);
        let target = Path::new(&full_path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 先写隐藏的临时文件再重命名，临时文件本身不会被同步
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("invalid file path: {}", full_path))?;
        let temp_path = target.with_file_name(format!(".{}.part", file_name));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, target).await?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match fs::remove_file(paths::normalize_local(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(paths::normalize_local(path)).await?;
        Ok(())
    }

    async fn remove_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let full_path = paths::normalize_local(path);
        let result = if recursive {
            fs::remove_dir_all(&full_path).await
        } else {
            fs::remove_dir(&full_path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn join(&self, dir: &str, name: &str) -> String {
        paths::join_local(dir, name)
    }

    fn parent(&self, path: &str) -> Option<String> {
        paths::parent_local(path)
    }

    fn normalize(&self, path: &str) -> String {
        paths::normalize_local(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
