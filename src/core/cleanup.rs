//! 模式切换清理
//!
//! 被放弃的批次可能已经在目标侧留下了部分文件，这里把它们删掉，
//! 再由深到浅删除留空的目录。每次删除都单独处理错误。

use crate::audit::{self, AuditSink};
use crate::core::planner::{deepest_first, Side, TransferSet};
use crate::error::SyncError;
use crate::storage::{EntryType, Storage};
use tracing::{debug, info};

/// 清理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_deleted: usize,
    pub dirs_removed: usize,
    pub errors: usize,
}

pub struct Cleanup<'a> {
    local: &'a dyn Storage,
    remote: &'a dyn Storage,
    audit: &'a dyn AuditSink,
}

impl<'a> Cleanup<'a> {
    pub fn new(local: &'a dyn Storage, remote: &'a dyn Storage, audit: &'a dyn AuditSink) -> Self {
        Self {
            local,
            remote,
            audit,
        }
    }

    fn storage(&self, side: Side) -> &'a dyn Storage {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    /// 删除被放弃批次在目标侧的条目
    ///
    /// `dest_root` 是目标侧的同步根目录，永远不会被删除。
    pub async fn reconcile_pending(&self, set: &TransferSet, dest_root: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        let direction = match set.descriptors.first() {
            Some(d) => d.direction,
            None => return report,
        };
        let side = Side::dest_of(direction);

        info!("清理被放弃的{}批次: {} 个条目", direction, set.descriptors.len());

        let paths: Vec<String> = set.files().map(|d| d.path_on(side).to_string()).collect();
        self.delete_files(side, paths, &mut report).await;

        let dirs: Vec<String> = set
            .descriptors
            .iter()
            .filter(|d| d.is_dir())
            .map(|d| d.path_on(side).to_string())
            .chain(set.folders_to_delete.iter(side).cloned())
            .collect();
        self.prune_empty_dirs(side, dirs, dest_root, &mut report).await;

        report
    }

    /// 上传完成后删除本地源文件，以及因此变空的本地目录
    pub async fn delete_after_upload(&self, set: &TransferSet, local_root: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        info!("上传后删除本地文件: {} 个", set.files().count());

        let paths: Vec<String> = set.files().map(|d| d.local_path.clone()).collect();
        self.delete_files(Side::Local, paths, &mut report).await;

        let dirs: Vec<String> = set
            .descriptors
            .iter()
            .filter(|d| d.is_dir())
            .map(|d| d.local_path.clone())
            .chain(set.folders_to_delete.iter(Side::Local).cloned())
            .collect();
        self.prune_empty_dirs(Side::Local, dirs, local_root, &mut report)
            .await;

        report
    }

    async fn delete_files<I: IntoIterator<Item = String>>(
        &self,
        side: Side,
        paths: I,
        report: &mut CleanupReport,
    ) {
        let storage = self.storage(side);
        for path in paths {
            match storage.delete(&path).await {
                Ok(()) => {
                    debug!("已删除: {}", path);
                    report.files_deleted += 1;
                }
                Err(e) => {
                    audit::report(self.audit, &SyncError::cleanup(path, e));
                    report.errors += 1;
                }
            }
        }
    }

    /// 只删除空目录（隐藏文件也算内容），跳过根目录
    async fn prune_empty_dirs<I: IntoIterator<Item = String>>(
        &self,
        side: Side,
        dirs: I,
        root: &str,
        report: &mut CleanupReport,
    ) {
        let storage = self.storage(side);
        let root = storage.normalize(root);

        for dir in deepest_first(dirs) {
            let dir = storage.normalize(&dir);
            if dir == root {
                continue;
            }
            match storage.exists(&dir).await {
                Ok(Some(EntryType::Directory)) => {}
                Ok(_) => continue,
                Err(e) => {
                    audit::report(self.audit, &SyncError::cleanup(dir, e));
                    report.errors += 1;
                    continue;
                }
            }

            let empty = match storage.list_dir(&dir).await {
                Ok(entries) => entries.is_empty(),
                Err(e) => {
                    audit::report(self.audit, &SyncError::cleanup(dir, e));
                    report.errors += 1;
                    continue;
                }
            };
            if !empty {
                debug!("目录非空，保留: {}", dir);
                continue;
            }

            match storage.remove_dir(&dir, false).await {
                Ok(()) => {
                    debug!("已删除空目录: {}", dir);
                    report.dirs_removed += 1;
                }
                Err(e) => {
                    audit::report(self.audit, &SyncError::cleanup(dir, e));
                    report.errors += 1;
                }
            }
        }
    }
}
