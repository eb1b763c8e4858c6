use crate::audit::{self, AuditSink};
use crate::core::planner::{Side, TransferDescriptor};
use crate::error::SyncError;
use crate::events::{EventBus, SyncEvent};
use crate::storage::Storage;
use anyhow::Result;
use tracing::{debug, info};

/// 执行结果
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// 成功传输的文件数
    pub transferred: usize,
    pub bytes: u64,
    /// 失败的条目，下一轮重新检测
    pub failed: Vec<TransferDescriptor>,
}

impl ExecutionReport {
    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_failed(&self, descriptor: &TransferDescriptor) -> bool {
        self.failed.iter().any(|d| d == descriptor)
    }
}

/// 传输执行器
///
/// 严格按队列顺序逐个传输整个文件，单个文件失败不影响后续文件，本层不重试。
pub struct TransferExecutor<'a> {
    local: &'a dyn Storage,
    remote: &'a dyn Storage,
    audit: &'a dyn AuditSink,
    events: &'a EventBus,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        local: &'a dyn Storage,
        remote: &'a dyn Storage,
        audit: &'a dyn AuditSink,
        events: &'a EventBus,
    ) -> Self {
        Self {
            local,
            remote,
            audit,
            events,
        }
    }

    fn storage(&self, side: Side) -> &'a dyn Storage {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    pub async fn execute(&self, descriptors: &[TransferDescriptor]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for descriptor in descriptors {
            if !descriptor.is_dir() {
                self.events.emit(SyncEvent::Transferring {
                    direction: descriptor.direction,
                    name: descriptor.name.clone(),
                });
            }

            match self.execute_one(descriptor).await {
                Ok(bytes) => {
                    if !descriptor.is_dir() {
                        report.transferred += 1;
                        report.bytes += bytes;
                    }
                }
                Err(e) => {
                    audit::report(
                        self.audit,
                        &SyncError::transfer(descriptor.dest_path(), format!("{:#}", e)),
                    );
                    report.failed.push(descriptor.clone());
                }
            }
        }

        info!(
            "传输完成: 成功 {} 个, 失败 {} 个, {} 字节",
            report.transferred,
            report.failed.len(),
            report.bytes
        );
        report
    }

    /// 执行单个条目，返回传输字节数
    async fn execute_one(&self, descriptor: &TransferDescriptor) -> Result<u64> {
        let source = self.storage(Side::source_of(descriptor.direction));
        let dest = self.storage(Side::dest_of(descriptor.direction));
        let source_path = descriptor.source_path();
        let dest_path = descriptor.dest_path();

        if descriptor.is_dir() {
            dest.create_dir(dest_path).await?;
            return Ok(0);
        }

        debug!("复制: {} -> {} ({}字节)", source_path, dest_path, descriptor.size);

        let data = source.read(source_path).await?;
        let bytes = data.len() as u64;
        debug!("  读取完成: {} 实际{}字节", source_path, bytes);

        dest.write(dest_path, data).await?;
        debug!("  写入完成: {}", dest_path);

        Ok(bytes)
    }
}
