//! 按大小收敛的进度跟踪
//!
//! 传输进行中和传输结束后按固定间隔分别统计两侧这一批文件的总大小，
//! 两侧相等即认为这一批已经落盘。

use crate::core::planner::TransferDescriptor;
use crate::db::Direction;
use crate::events::{EventBus, SyncEvent};
use crate::storage::Storage;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// 默认收敛超时
pub const DEFAULT_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(600);

/// 两侧总大小
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeSnapshot {
    pub local: u64,
    pub remote: u64,
}

impl SizeSnapshot {
    pub fn converged(&self) -> bool {
        self.local == self.remote
    }
}

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Converged,
    /// 模式切换，这一批被放弃
    Abandoned,
    TimedOut,
}

pub struct ProgressTracker {
    poll_interval: Duration,
    timeout: Option<Duration>,
    /// 已报告的最大百分比，对外只报告不回退的进度
    reported: AtomicU8,
}

impl ProgressTracker {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
            reported: AtomicU8::new(0),
        }
    }

    /// 统计这一批文件在两侧的总大小，不存在的文件按 0 计
    pub async fn measure(
        &self,
        local: &dyn Storage,
        remote: &dyn Storage,
        descriptors: &[TransferDescriptor],
    ) -> SizeSnapshot {
        let mut snapshot = SizeSnapshot::default();
        for d in descriptors.iter().filter(|d| !d.is_dir()) {
            snapshot.local += Self::size_of(local, &d.local_path).await;
            snapshot.remote += Self::size_of(remote, &d.remote_path).await;
        }
        snapshot
    }

    /// 两侧大小仍不一致的条目，目录条目原样保留
    pub async fn outstanding(
        &self,
        local: &dyn Storage,
        remote: &dyn Storage,
        descriptors: &[TransferDescriptor],
    ) -> Vec<TransferDescriptor> {
        let mut pending = Vec::new();
        for d in descriptors {
            if d.is_dir()
                || Self::size_of(local, &d.local_path).await
                    != Self::size_of(remote, &d.remote_path).await
            {
                pending.push(d.clone());
            }
        }
        pending
    }

    async fn size_of(storage: &dyn Storage, path: &str) -> u64 {
        match storage.stat(path).await {
            Ok(Some(meta)) if !meta.is_dir() => meta.size,
            Ok(_) => 0,
            Err(e) => {
                warn!("获取文件大小失败 {}: {}", path, e);
                0
            }
        }
    }

    /// 进度百分比：目标侧 / 源侧，截断到 100，源侧为 0 时视为完成
    pub fn percent(direction: Direction, snapshot: SizeSnapshot) -> u8 {
        let (done, total) = match direction {
            Direction::Upload => (snapshot.remote, snapshot.local),
            Direction::Download => (snapshot.local, snapshot.remote),
        };
        if total == 0 {
            return 100;
        }
        let percent = (done as u128 * 100 / total as u128).min(100);
        percent as u8
    }

    fn emit(&self, direction: Direction, snapshot: SizeSnapshot, events: &EventBus) -> u8 {
        let current = Self::percent(direction, snapshot);
        let percent = self.reported.fetch_max(current, Ordering::SeqCst).max(current);
        events.emit(SyncEvent::Progress { direction, percent });
        debug!(
            "{}进度: {}% (local={}, remote={})",
            direction, percent, snapshot.local, snapshot.remote
        );
        percent
    }

    /// 在传输进行期间按间隔报告进度，直到 `transfer` 结束并返回它的结果
    pub async fn track<F>(
        &self,
        local: &dyn Storage,
        remote: &dyn Storage,
        direction: Direction,
        descriptors: &[TransferDescriptor],
        transfer: F,
        events: &EventBus,
    ) -> F::Output
    where
        F: Future,
    {
        if descriptors.iter().all(|d| d.is_dir()) {
            return transfer.await;
        }

        let finished = CancellationToken::new();
        let run = async {
            let output = transfer.await;
            finished.cancel();
            output
        };
        let poll = async {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = finished.cancelled() => break,
                }
                let snapshot = self.measure(local, remote, descriptors).await;
                self.emit(direction, snapshot, events);
            }
        };

        let (output, ()) = tokio::join!(run, poll);
        output
    }

    /// 轮询直到两侧大小相等、被取消或超时
    ///
    /// 每轮先测量再检查取消：取消时已经全部落盘的批次仍按完成处理。
    pub async fn await_convergence(
        &self,
        local: &dyn Storage,
        remote: &dyn Storage,
        direction: Direction,
        descriptors: &[TransferDescriptor],
        cancel: &CancellationToken,
        events: &EventBus,
    ) -> Convergence {
        if descriptors.iter().all(|d| d.is_dir()) {
            self.reported.store(100, Ordering::SeqCst);
            events.emit(SyncEvent::Progress {
                direction,
                percent: 100,
            });
            return Convergence::Converged;
        }

        let started = Instant::now();

        loop {
            let snapshot = self.measure(local, remote, descriptors).await;
            self.emit(direction, snapshot, events);

            if snapshot.converged() {
                return Convergence::Converged;
            }

            if cancel.is_cancelled() {
                info!(
                    "{}批次被放弃 (local={}, remote={})",
                    direction, snapshot.local, snapshot.remote
                );
                return Convergence::Abandoned;
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!(
                        "{}批次在 {:?} 内未收敛 (local={}, remote={})",
                        direction, timeout, snapshot.local, snapshot.remote
                    );
                    return Convergence::TimedOut;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_CONVERGENCE_TIMEOUT))
    }
}
