use crate::core::paths;
use crate::storage::{DirectoryEntry, Storage};
use anyhow::Result;
use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info, warn};

/// 目录遍历配置
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// 结果中是否包含目录
    pub include_dirs: bool,
    /// 排除规则（glob patterns，相对根目录匹配）
    pub exclude_patterns: Vec<String>,
    /// 仅包含的扩展名（空表示不限制）
    pub include_extensions: Vec<String>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            include_dirs: true,
            exclude_patterns: vec![],
            include_extensions: vec![],
        }
    }
}

/// 只读的目录遍历器，用于界面浏览两侧文件，与同步流程互不影响
pub struct TreeWalker {
    config: WalkConfig,
    excludes: Vec<Regex>,
}

impl TreeWalker {
    pub fn new() -> Self {
        Self::with_config(WalkConfig::default())
    }

    pub fn with_config(config: WalkConfig) -> Self {
        let excludes = config
            .exclude_patterns
            .iter()
            .filter_map(|p| match Self::glob_to_regex(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("忽略无效的排除规则 {}: {}", p, e);
                    None
                }
            })
            .collect();
        Self { config, excludes }
    }

    /// 简单的 glob 转正则：`**` 匹配任意层级，`*` 不跨越 `/`，`?` 匹配单个字符
    fn glob_to_regex(pattern: &str) -> Result<Regex> {
        let pattern = pattern.to_lowercase();
        let mut re = String::from("^(.*/)?");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        re.push_str(".*");
                    } else {
                        re.push_str("[^/]*");
                    }
                }
                '?' => re.push_str("[^/]"),
                c => re.push_str(&regex::escape(&c.to_string())),
            }
        }
        re.push('$');
        Ok(Regex::new(&re)?)
    }

    /// 检查相对路径是否应该被排除
    fn should_exclude(&self, relative: &str, entry: &DirectoryEntry) -> bool {
        let relative = relative.to_lowercase();
        if self.excludes.iter().any(|re| re.is_match(&relative)) {
            return true;
        }

        if entry.is_file() && !self.config.include_extensions.is_empty() {
            let ext = std::path::Path::new(&entry.name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();

            if !self
                .config
                .include_extensions
                .iter()
                .any(|e| e.trim_start_matches('.').to_lowercase() == ext)
            {
                return true;
            }
        }

        false
    }

    /// 列出单层目录（隐藏条目不显示）
    pub async fn list(&self, storage: &dyn Storage, dir: &str) -> Result<Vec<DirectoryEntry>> {
        let mut entries: Vec<DirectoryEntry> = storage
            .list_dir(dir)
            .await?
            .into_iter()
            .filter(|e| !paths::is_hidden(&e.name))
            .filter(|e| !self.should_exclude(&e.name, e))
            .collect();
        // 目录在前，再按名称排序
        entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// 递归遍历，出错的子目录记录警告后跳过
    pub async fn walk(&self, storage: &dyn Storage, root: &str) -> Result<Vec<DirectoryEntry>> {
        info!("开始遍历: {} {}", storage.name(), root);
        let root = storage.normalize(root);
        // 根目录本身列不出来时直接返回错误
        let top = storage.list_dir(&root).await?;

        let mut out = Vec::new();
        self.walk_entries(storage, top, String::new(), &mut out).await;

        info!("遍历完成: {} 个条目", out.len());
        Ok(out)
    }

    fn walk_entries<'a>(
        &'a self,
        storage: &'a dyn Storage,
        entries: Vec<DirectoryEntry>,
        prefix: String,
        out: &'a mut Vec<DirectoryEntry>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for entry in entries {
                if paths::is_hidden(&entry.name) {
                    continue;
                }
                let relative = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", prefix, entry.name)
                };
                if self.should_exclude(&relative, &entry) {
                    debug!("排除: {}", relative);
                    continue;
                }

                if entry.is_dir() {
                    let children = match storage.list_dir(&entry.path).await {
                        Ok(children) => Some(children),
                        Err(e) => {
                            warn!("列出目录失败，跳过 {}: {}", entry.path, e);
                            None
                        }
                    };
                    if self.config.include_dirs {
                        out.push(entry);
                    }
                    if let Some(children) = children {
                        self.walk_entries(storage, children, relative, out).await;
                    }
                } else {
                    out.push(entry);
                }
            }
        })
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    async fn sample_tree() -> (tempfile::TempDir, String, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let storage = LocalStorage::new();
        for rel in ["a.txt", "docs/b.md", "docs/deep/c.txt", ".git/config", "tmp/x.tmp"] {
            let path = rel
                .split('/')
                .fold(root.clone(), |acc, part| storage.join(&acc, part));
            storage.write(&path, b"data".to_vec()).await.unwrap();
        }
        (dir, root, storage)
    }

    #[tokio::test]
    async fn test_walk_skips_hidden_and_recurses() {
        let (_dir, root, storage) = sample_tree().await;
        let walker = TreeWalker::new();

        let entries = walker.walk(&storage, &root).await.unwrap();
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.md", "c.txt", "deep", "docs", "tmp", "x.tmp"]);
    }

    #[tokio::test]
    async fn test_walk_with_filters() {
        let (_dir, root, storage) = sample_tree().await;
        let walker = TreeWalker::with_config(WalkConfig {
            include_dirs: false,
            exclude_patterns: vec!["*.tmp".to_string(), "docs/deep/**".to_string()],
            include_extensions: vec![],
        });

        let entries = walker.walk(&storage, &root).await.unwrap();
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.md"]);

        let md_only = TreeWalker::with_config(WalkConfig {
            include_dirs: false,
            exclude_patterns: vec![],
            include_extensions: vec!["MD".to_string()],
        });
        let entries = md_only.walk(&storage, &root).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b.md");
    }

    #[tokio::test]
    async fn test_list_sorts_dirs_first() {
        let (_dir, root, storage) = sample_tree().await;
        let entries = TreeWalker::new().list(&storage, &root).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "tmp", "a.txt"]);
    }

    #[tokio::test]
    async fn test_walk_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let missing = storage.join(&dir.path().to_string_lossy(), "missing");
        assert!(TreeWalker::new().walk(&storage, &missing).await.is_err());
    }
}
