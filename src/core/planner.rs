//! 传输集合构建
//!
//! 递归对比源和目标目录树，生成按深度优先排列的传输队列，
//! 同时记录待清理的父目录。上传和下载共用同一套逻辑，只是源和目标互换。

use crate::audit::{self, AuditSink};
use crate::core::comparator::FileComparator;
use crate::core::paths;
use crate::db::Direction;
use crate::error::SyncError;
use crate::storage::{DirectoryEntry, EntryType, Storage};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// 路径所在的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    /// 某个方向的源端
    pub fn source_of(direction: Direction) -> Self {
        match direction {
            Direction::Upload => Side::Local,
            Direction::Download => Side::Remote,
        }
    }

    /// 某个方向的目标端
    pub fn dest_of(direction: Direction) -> Self {
        match direction {
            Direction::Upload => Side::Remote,
            Direction::Download => Side::Local,
        }
    }
}

/// 单个待传输条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDescriptor {
    pub name: String,
    pub local_path: String,
    pub remote_path: String,
    pub kind: EntryType,
    /// 源文件大小，目录为 0
    pub size: u64,
    pub direction: Direction,
}

impl TransferDescriptor {
    pub fn path_on(&self, side: Side) -> &str {
        match side {
            Side::Local => &self.local_path,
            Side::Remote => &self.remote_path,
        }
    }

    pub fn source_path(&self) -> &str {
        self.path_on(Side::source_of(self.direction))
    }

    pub fn dest_path(&self) -> &str {
        self.path_on(Side::dest_of(self.direction))
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryType::Directory
    }
}

/// 待清理目录台账
///
/// 每排入一个文件就登记它在两侧的父目录，清理时只删除空目录且跳过同步根目录。
#[derive(Debug, Clone, Default)]
pub struct FoldersToDelete {
    local: BTreeSet<String>,
    remote: BTreeSet<String>,
}

impl FoldersToDelete {
    pub fn insert(&mut self, local_dir: String, remote_dir: String) {
        self.local.insert(local_dir);
        self.remote.insert(remote_dir);
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn contains(&self, side: Side, dir: &str) -> bool {
        match side {
            Side::Local => self.local.contains(dir),
            Side::Remote => self.remote.contains(dir),
        }
    }

    pub fn iter(&self, side: Side) -> impl Iterator<Item = &String> {
        match side {
            Side::Local => self.local.iter(),
            Side::Remote => self.remote.iter(),
        }
    }
}

/// 按深度由深到浅排序并去重
pub fn deepest_first<I: IntoIterator<Item = String>>(dirs: I) -> Vec<String> {
    let set: BTreeSet<String> = dirs.into_iter().collect();
    let mut dirs: Vec<String> = set.into_iter().collect();
    dirs.sort_by(|a, b| paths::depth(b).cmp(&paths::depth(a)).then_with(|| b.cmp(a)));
    dirs
}

/// 一批传输
#[derive(Debug, Clone, Default)]
pub struct TransferSet {
    pub descriptors: Vec<TransferDescriptor>,
    pub folders_to_delete: FoldersToDelete,
}

impl TransferSet {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &TransferDescriptor> {
        self.descriptors.iter().filter(|d| !d.is_dir())
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files().map(|d| d.name.clone()).collect()
    }
}

/// 传输集合构建器
pub struct TransferPlanner<'a> {
    local: &'a dyn Storage,
    remote: &'a dyn Storage,
    audit: &'a dyn AuditSink,
    comparator: FileComparator,
}

/// 当前递归位置在两侧的目录
struct DirPair {
    local: String,
    remote: String,
}

impl<'a> TransferPlanner<'a> {
    pub fn new(local: &'a dyn Storage, remote: &'a dyn Storage, audit: &'a dyn AuditSink) -> Self {
        Self {
            local,
            remote,
            audit,
            comparator: FileComparator::new(),
        }
    }

    fn storage(&self, side: Side) -> &'a dyn Storage {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    /// 对比两侧目录树，生成传输集合
    ///
    /// 缺失的目标目录会立即创建。任何子树的列目录错误只写审计日志，
    /// 该子树不产生传输，其他子树不受影响。
    pub async fn build_transfer_set(
        &self,
        direction: Direction,
        local_root: &str,
        remote_root: &str,
    ) -> TransferSet {
        let roots = DirPair {
            local: self.local.normalize(local_root),
            remote: self.remote.normalize(remote_root),
        };
        let dest_side = Side::dest_of(direction);
        let dest = self.storage(dest_side);
        let dest_root = match dest_side {
            Side::Local => &roots.local,
            Side::Remote => &roots.remote,
        };

        info!(
            "构建{}集合: {} <-> {}",
            direction, roots.local, roots.remote
        );

        let mut set = TransferSet::default();

        // 目标根目录不存在时先创建
        match dest.exists(dest_root).await {
            Ok(Some(EntryType::Directory)) => {}
            Ok(Some(EntryType::File)) => {
                audit::report(
                    self.audit,
                    &SyncError::listing(dest_root.as_str(), "sync root is a file"),
                );
                return set;
            }
            Ok(None) => {
                if let Err(e) = dest.create_dir(dest_root).await {
                    audit::report(self.audit, &SyncError::listing(dest_root.as_str(), e));
                    return set;
                }
            }
            Err(e) => {
                audit::report(self.audit, &SyncError::listing(dest_root.as_str(), e));
                return set;
            }
        }

        self.diff_dir(direction, roots, &mut set).await;

        info!(
            "{}集合构建完成: {} 个条目, {} 个待清理目录",
            direction,
            set.descriptors.len(),
            set.folders_to_delete.len()
        );
        set
    }

    fn diff_dir<'s>(
        &'s self,
        direction: Direction,
        dir: DirPair,
        set: &'s mut TransferSet,
    ) -> BoxFuture<'s, ()> {
        Box::pin(async move {
            let source_side = Side::source_of(direction);
            let dest_side = Side::dest_of(direction);
            let source = self.storage(source_side);
            let dest = self.storage(dest_side);
            let (source_dir, dest_dir) = match direction {
                Direction::Upload => (&dir.local, &dir.remote),
                Direction::Download => (&dir.remote, &dir.local),
            };

            let mut source_entries = match source.list_dir(source_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    audit::report(self.audit, &SyncError::listing(source_dir.as_str(), e));
                    return;
                }
            };
            // 每个源目录只列一次目标目录
            let dest_entries: HashMap<String, DirectoryEntry> = match dest.list_dir(dest_dir).await
            {
                Ok(entries) => entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
                Err(e) => {
                    audit::report(self.audit, &SyncError::listing(dest_dir.as_str(), e));
                    return;
                }
            };

            source_entries.sort_by(|a, b| a.name.cmp(&b.name));

            for entry in source_entries {
                if paths::is_hidden(&entry.name) {
                    continue;
                }
                let child = DirPair {
                    local: self.local.join(&dir.local, &entry.name),
                    remote: self.remote.join(&dir.remote, &entry.name),
                };
                let existing = dest_entries.get(&entry.name);

                if entry.is_dir() {
                    match existing {
                        Some(d) if d.is_dir() => {}
                        Some(_) => {
                            audit::report(
                                self.audit,
                                &SyncError::listing(
                                    child.path_on(dest_side),
                                    "destination is a file, expected a directory",
                                ),
                            );
                            continue;
                        }
                        None => {
                            let dest_path = child.path_on(dest_side).to_string();
                            if let Err(e) = dest.create_dir(&dest_path).await {
                                audit::report(self.audit, &SyncError::listing(dest_path, e));
                                continue;
                            }
                            debug!("已创建目标目录: {}", dest_path);
                            set.descriptors.push(TransferDescriptor {
                                name: entry.name.clone(),
                                local_path: child.local.clone(),
                                remote_path: child.remote.clone(),
                                kind: EntryType::Directory,
                                size: 0,
                                direction,
                            });
                        }
                    }
                    self.diff_dir(direction, child, set).await;
                    continue;
                }

                let dest_file = match existing {
                    Some(d) if d.is_dir() => {
                        audit::report(
                            self.audit,
                            &SyncError::listing(
                                child.path_on(dest_side),
                                "destination is a directory, expected a file",
                            ),
                        );
                        continue;
                    }
                    other => other,
                };

                if self.comparator.needs_transfer(&entry, dest_file) {
                    debug!("排入{}: {}", direction, entry.path);
                    set.folders_to_delete
                        .insert(dir.local.clone(), dir.remote.clone());
                    set.descriptors.push(TransferDescriptor {
                        name: entry.name,
                        local_path: child.local,
                        remote_path: child.remote,
                        kind: EntryType::File,
                        size: entry.size,
                        direction,
                    });
                }
            }
        })
    }
}

impl DirPair {
    fn path_on(&self, side: Side) -> &str {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }
}
