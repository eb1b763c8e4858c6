use crate::core::paths;
use crate::storage::DirectoryEntry;

/// 文件比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// 目标不存在
    Missing,
    /// 目标比源小，上次传输未完成
    Partial,
    /// 源文件更新（按整秒比较）
    SourceNewer,
    /// 无需传输
    UpToDate,
}

impl Staleness {
    pub fn needs_transfer(&self) -> bool {
        !matches!(self, Staleness::UpToDate)
    }
}

/// 文件比较器
///
/// 只看存在性、大小和修改时间，不计算校验和。
#[derive(Debug, Clone, Copy, Default)]
pub struct FileComparator;

impl FileComparator {
    pub fn new() -> Self {
        Self
    }

    /// 比较源文件和目标文件
    pub fn compare(&self, source: &DirectoryEntry, dest: Option<&DirectoryEntry>) -> Staleness {
        let dest = match dest {
            Some(d) => d,
            None => return Staleness::Missing,
        };

        if source.size > dest.size {
            tracing::debug!(
                "目标文件不完整: {} (src={}, dst={})",
                source.path,
                source.size,
                dest.size
            );
            return Staleness::Partial;
        }

        // 远程端点的时间精度通常只到秒
        let src_secs = source.modified_at.div_euclid(1000);
        let dst_secs = dest.modified_at.div_euclid(1000);
        if src_secs > dst_secs {
            tracing::debug!(
                "源文件更新: {} (src_time={}, dst_time={})",
                source.path,
                src_secs,
                dst_secs
            );
            return Staleness::SourceNewer;
        }

        Staleness::UpToDate
    }

    /// 是否需要传输，隐藏文件永远不传输
    pub fn needs_transfer(&self, source: &DirectoryEntry, dest: Option<&DirectoryEntry>) -> bool {
        if paths::is_hidden(&source.name) {
            return false;
        }
        self.compare(source, dest).needs_transfer()
    }
}
