//! 同步调度器
//!
//! 定时读取设置中的同步模式，按模式启动上传或下载批次。
//! 每个方向同一时刻最多只有一个批次在执行；模式切换时先放弃旧批次，
//! 等它结束后清理残留，再开始新模式的第一批。

use crate::audit::{self, AuditSink};
use crate::config::{self, SettingsStore, SyncSettings};
use crate::core::cleanup::{Cleanup, CleanupReport};
use crate::core::executor::TransferExecutor;
use crate::core::planner::{TransferDescriptor, TransferPlanner, TransferSet};
use crate::core::progress::{
    Convergence, ProgressTracker, DEFAULT_CONVERGENCE_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
use crate::core::walker::TreeWalker;
use crate::db::{AuditEntry, Direction, SyncMode};
use crate::error::SyncError;
use crate::events::{EventBus, SyncEvent};
use crate::storage::Storage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 调度配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 收敛检测的轮询间隔
    pub poll_interval: Duration,
    /// 收敛超时，None 表示一直等待
    pub convergence_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            convergence_timeout: Some(DEFAULT_CONVERGENCE_TIMEOUT),
        }
    }
}

/// 单次触发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 启动了一个新批次
    Started(Direction),
    /// 该方向已有批次在执行，本次不做任何事
    Busy(Direction),
    /// 模式为 Idle，定时器停止
    Paused,
    /// 配置错误，本次跳过
    Skipped,
}

/// 被放弃的批次留下的待清理条目
struct PendingBatch {
    set: TransferSet,
    local_root: String,
    remote_root: String,
}

impl PendingBatch {
    fn dest_root(&self, direction: Direction) -> &str {
        match direction {
            Direction::Upload => &self.remote_root,
            Direction::Download => &self.local_root,
        }
    }
}

/// 一个方向的批次状态
struct BatchSlot {
    direction: Direction,
    in_progress: AtomicBool,
    pending: Mutex<Option<PendingBatch>>,
    cancel: Mutex<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BatchSlot {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            in_progress: AtomicBool::new(false),
            pending: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
        }
    }
}

struct TimerHandle {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SchedulerInner {
    local: Arc<dyn Storage>,
    remote: Arc<dyn Storage>,
    settings: Arc<dyn SettingsStore>,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
    config: SyncConfig,
    mode: Mutex<SyncMode>,
    upload: BatchSlot,
    download: BatchSlot,
    timer: Mutex<Option<TimerHandle>>,
    // 定时器和手动触发互斥
    tick_lock: tokio::sync::Mutex<()>,
}

/// 同步调度器
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler").finish_non_exhaustive()
    }
}

impl SyncScheduler {
    pub fn new(
        local: Arc<dyn Storage>,
        remote: Arc<dyn Storage>,
        settings: Arc<dyn SettingsStore>,
        audit: Arc<dyn AuditSink>,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                local,
                remote,
                settings,
                audit,
                events,
                config,
                mode: Mutex::new(SyncMode::Idle),
                upload: BatchSlot::new(Direction::Upload),
                download: BatchSlot::new(Direction::Download),
                timer: Mutex::new(None),
                tick_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// 启动定时器，已在运行时返回 false
    pub fn start(&self) -> bool {
        let mut timer = lock(&self.inner.timer);
        if let Some(t) = timer.as_ref() {
            if !t.handle.is_finished() {
                return false;
            }
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.inner).run_timer(shutdown.clone()));
        *timer = Some(TimerHandle { shutdown, handle });
        drop(timer);

        let mode = config::read_mode(self.inner.settings.as_ref()).unwrap_or(SyncMode::Idle);
        info!("同步定时器已启动, 模式: {:?}", mode);
        self.inner.events.emit(SyncEvent::Started { mode });
        true
    }

    /// 停止定时器，放弃进行中的批次并清理两侧残留
    pub async fn stop(&self) {
        let timer = lock(&self.inner.timer).take();
        if let Some(timer) = timer {
            timer.shutdown.cancel();
            if let Err(e) = timer.handle.await {
                warn!("定时器任务异常结束: {}", e);
            }
        }

        let _tick = self.inner.tick_lock.lock().await;
        self.inner.leave_mode(SyncMode::Idle).await;
        *lock(&self.inner.mode) = SyncMode::Idle;

        info!("同步已停止");
        self.inner.events.emit(SyncEvent::Stopped);
    }

    /// 执行一次调度
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    /// 等待当前所有批次结束
    pub async fn wait_for_batches(&self) {
        for slot in [&self.inner.upload, &self.inner.download] {
            let handle = lock(&slot.handle).take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!("{}批次任务异常结束: {}", slot.direction, e);
                }
            }
        }
    }

    /// 删除被放弃批次的残留条目
    pub async fn reconcile(&self, delete_upload_side: bool, delete_download_side: bool) -> CleanupReport {
        self.inner
            .reconcile(delete_upload_side, delete_download_side)
            .await
    }

    /// 重新列出两侧根目录并通知界面
    pub async fn refresh_listings(&self) {
        match SyncSettings::load(self.inner.settings.as_ref()) {
            Ok(settings) => {
                self.inner
                    .refresh_listings(&settings.local_root, &settings.remote_root)
                    .await
            }
            Err(e) => self.inner.report(&e),
        }
    }

    /// 最近一次触发时生效的模式
    pub fn mode(&self) -> SyncMode {
        *lock(&self.inner.mode)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .map_or(false, |t| !t.handle.is_finished())
    }

    pub fn is_busy(&self, direction: Direction) -> bool {
        self.inner.slot(direction).in_progress.load(Ordering::SeqCst)
    }

    /// 某个方向尚未完成或已被放弃、等待清理的条目
    pub fn pending(&self, direction: Direction) -> Vec<TransferDescriptor> {
        lock(&self.inner.slot(direction).pending)
            .as_ref()
            .map(|p| p.set.descriptors.clone())
            .unwrap_or_default()
    }
}

impl SchedulerInner {
    fn slot(&self, direction: Direction) -> &BatchSlot {
        match direction {
            Direction::Upload => &self.upload,
            Direction::Download => &self.download,
        }
    }

    /// 写审计日志并通知界面
    fn report(&self, err: &SyncError) {
        audit::report(self.audit.as_ref(), err);
        self.events.emit(SyncEvent::Error {
            kind: err.kind,
            message: err.to_string(),
        });
    }

    async fn run_timer(self: Arc<Self>, shutdown: CancellationToken) {
        let mut period = config::read_interval(self.settings.as_ref());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("定时器间隔: {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let current = config::read_interval(self.settings.as_ref());
            if current != period {
                info!("同步间隔变更: {:?} -> {:?}", period, current);
                period = current;
                // 新的 interval 第一次 tick 立即返回
                ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                continue;
            }

            if self.tick().await == TickOutcome::Paused {
                info!("同步已暂停，定时器退出");
                break;
            }
        }
    }

    async fn tick(self: &Arc<Self>) -> TickOutcome {
        let _tick = self.tick_lock.lock().await;

        let settings = match SyncSettings::load(self.settings.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                self.report(&e);
                return TickOutcome::Skipped;
            }
        };

        let previous = std::mem::replace(&mut *lock(&self.mode), settings.mode);
        if previous != settings.mode {
            info!("同步模式切换: {:?} -> {:?}", previous, settings.mode);
        }
        if previous != settings.mode || settings.mode == SyncMode::Idle {
            self.leave_mode(settings.mode).await;
        }

        match settings.mode.direction() {
            None => {
                if previous != SyncMode::Idle {
                    self.audit.record(AuditEntry::info("Sync", "同步已暂停"));
                }
                self.events.emit(SyncEvent::Paused);
                TickOutcome::Paused
            }
            Some(direction) => self.start_batch(direction, settings),
        }
    }

    /// 放弃不属于新模式的批次，等它们结束后清理残留
    async fn leave_mode(&self, next: SyncMode) {
        for slot in [&self.upload, &self.download] {
            if next.direction() == Some(slot.direction) {
                continue;
            }
            lock(&slot.cancel).cancel();
            let handle = lock(&slot.handle).take();
            if let Some(handle) = handle {
                debug!("等待{}批次结束", slot.direction);
                if let Err(e) = handle.await {
                    warn!("{}批次任务异常结束: {}", slot.direction, e);
                }
            }
        }

        self.reconcile(next != SyncMode::Upload, next != SyncMode::Download)
            .await;
    }

    async fn reconcile(&self, delete_upload_side: bool, delete_download_side: bool) -> CleanupReport {
        let mut total = CleanupReport::default();
        let cleanup = Cleanup::new(self.local.as_ref(), self.remote.as_ref(), self.audit.as_ref());

        for (slot, selected) in [
            (&self.upload, delete_upload_side),
            (&self.download, delete_download_side),
        ] {
            if !selected {
                continue;
            }
            if slot.in_progress.load(Ordering::SeqCst) {
                warn!("{}批次仍在执行，暂不清理", slot.direction);
                continue;
            }
            let pending = lock(&slot.pending).take();
            if let Some(pending) = pending {
                let report = cleanup
                    .reconcile_pending(&pending.set, pending.dest_root(slot.direction))
                    .await;
                total.files_deleted += report.files_deleted;
                total.dirs_removed += report.dirs_removed;
                total.errors += report.errors;
            }
        }

        if total != CleanupReport::default() {
            info!(
                "清理完成: 删除 {} 个文件, {} 个目录, {} 个错误",
                total.files_deleted, total.dirs_removed, total.errors
            );
        }
        total
    }

    fn start_batch(self: &Arc<Self>, direction: Direction, settings: SyncSettings) -> TickOutcome {
        let slot = self.slot(direction);
        if slot
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("{}批次仍在进行，本次跳过", direction);
            return TickOutcome::Busy(direction);
        }

        let token = CancellationToken::new();
        *lock(&slot.cancel) = token.clone();

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let flag_owner = Arc::clone(&inner);
            // 无论成功、失败还是被取消都要释放标志
            scopeguard::defer! {
                flag_owner.slot(direction).in_progress.store(false, Ordering::SeqCst);
            }
            inner.run_batch(direction, settings, token).await;
        });
        *lock(&slot.handle) = Some(handle);

        TickOutcome::Started(direction)
    }

    async fn run_batch(&self, direction: Direction, settings: SyncSettings, cancel: CancellationToken) {
        let slot = self.slot(direction);
        let local = self.local.as_ref();
        let remote = self.remote.as_ref();

        if let Err(e) = remote.connect().await {
            error!("{}批次无法连接远程端点: {:#}", direction, e);
            self.report(&SyncError::connection(remote.name(), format!("{:#}", e)));
            return;
        }

        let set = TransferPlanner::new(local, remote, self.audit.as_ref())
            .build_transfer_set(direction, &settings.local_root, &settings.remote_root)
            .await;

        if set.is_empty() {
            debug!("没有需要{}的文件", direction);
        } else {
            info!("开始{}批次: {} 个条目", direction, set.descriptors.len());
            self.events.emit(SyncEvent::BatchStarted {
                direction,
                files: set.file_names(),
            });
            *lock(&slot.pending) = Some(PendingBatch {
                set: set.clone(),
                local_root: settings.local_root.clone(),
                remote_root: settings.remote_root.clone(),
            });
        }

        // 模式切换不打断传输本身，只打断之后的收敛等待
        let tracker = ProgressTracker::new(self.config.poll_interval, self.config.convergence_timeout);
        let executor = TransferExecutor::new(local, remote, self.audit.as_ref(), &self.events);
        let report = tracker
            .track(
                local,
                remote,
                direction,
                &set.descriptors,
                executor.execute(&set.descriptors),
                &self.events,
            )
            .await;

        // 失败的文件不参与收敛检测，下一轮重新检测
        let tracked: Vec<TransferDescriptor> = set
            .descriptors
            .iter()
            .filter(|d| !report.is_failed(d))
            .cloned()
            .collect();

        let outcome = tracker
            .await_convergence(local, remote, direction, &tracked, &cancel, &self.events)
            .await;

        match outcome {
            Convergence::Abandoned => {
                // 已经落盘的文件不再算残留，其余留给模式切换清理
                let outstanding = tracker.outstanding(local, remote, &set.descriptors).await;
                if let Some(pending) = lock(&slot.pending).as_mut() {
                    pending.set.descriptors = outstanding;
                }
                self.events.emit(SyncEvent::BatchAbandoned { direction });
                return;
            }
            Convergence::TimedOut => {
                lock(&slot.pending).take();
                self.report(&SyncError::transfer(
                    settings.remote_root.as_str(),
                    format!("{} batch did not converge", direction),
                ));
                return;
            }
            Convergence::Converged => {
                lock(&slot.pending).take();
            }
        }

        if !set.is_empty() {
            if direction == Direction::Upload && settings.delete_after_upload {
                let uploaded = TransferSet {
                    descriptors: tracked,
                    folders_to_delete: set.folders_to_delete.clone(),
                };
                Cleanup::new(local, remote, self.audit.as_ref())
                    .delete_after_upload(&uploaded, &settings.local_root)
                    .await;
            }

            info!(
                "{}批次完成: 成功 {} 个, 失败 {} 个",
                direction,
                report.transferred,
                report.failed.len()
            );
            self.audit.record(AuditEntry::info(
                match direction {
                    Direction::Upload => "Upload",
                    Direction::Download => "Download",
                },
                format!(
                    "{} file(s) transferred, {} failed",
                    report.transferred,
                    report.failed.len()
                ),
            ));
            self.events.emit(SyncEvent::BatchFinished {
                direction,
                transferred: report.transferred,
                failed: report.failed_names(),
            });
        }

        self.refresh_listings(&settings.local_root, &settings.remote_root)
            .await;
    }

    async fn refresh_listings(&self, local_root: &str, remote_root: &str) {
        let walker = TreeWalker::new();

        let local = if local_root.trim().is_empty() {
            Vec::new()
        } else {
            match walker.list(self.local.as_ref(), local_root).await {
                Ok(entries) => entries,
                Err(e) => {
                    audit::report(self.audit.as_ref(), &SyncError::listing(local_root, e));
                    Vec::new()
                }
            }
        };
        let remote = match walker.list(self.remote.as_ref(), remote_root).await {
            Ok(entries) => entries,
            Err(e) => {
                audit::report(self.audit.as_ref(), &SyncError::listing(remote_root, e));
                Vec::new()
            }
        };

        self.events.emit(SyncEvent::ListingRefreshed { local, remote });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use crate::config::{keys, MemorySettings};
    use crate::error::ErrorKind;
    use crate::storage::{LocalStorage, RemoteStorage};
    use serde_json::json;

    struct Harness {
        local_dir: tempfile::TempDir,
        remote_dir: tempfile::TempDir,
        settings: Arc<MemorySettings>,
        audit: Arc<MemoryAudit>,
        events: EventBus,
        scheduler: SyncScheduler,
    }

    fn harness() -> Harness {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(MemorySettings::new());
        settings
            .set(keys::LOCAL_ROOT, json!(local_dir.path().to_string_lossy()))
            .unwrap();
        let audit = Arc::new(MemoryAudit::new());
        let events = EventBus::default();
        let remote = RemoteStorage::fs(&remote_dir.path().to_string_lossy()).unwrap();
        let scheduler = SyncScheduler::new(
            Arc::new(LocalStorage::new()),
            Arc::new(remote),
            settings.clone(),
            audit.clone(),
            events.clone(),
            SyncConfig {
                poll_interval: Duration::from_millis(20),
                convergence_timeout: Some(Duration::from_secs(5)),
            },
        );
        Harness {
            local_dir,
            remote_dir,
            settings,
            audit,
            events,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_idle_tick_pauses() {
        let h = harness();
        let mut rx = h.events.subscribe();
        assert_eq!(h.scheduler.tick().await, TickOutcome::Paused);
        assert!(matches!(rx.try_recv().unwrap(), SyncEvent::Paused));
    }

    #[tokio::test]
    async fn test_invalid_mode_skips_without_side_effects() {
        let h = harness();
        std::fs::write(h.local_dir.path().join("a.txt"), b"abc").unwrap();
        h.settings.set(keys::SYNC_MODE, json!("sideways")).unwrap();

        assert_eq!(h.scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(h.scheduler.mode(), SyncMode::Idle);
        assert!(!h.remote_dir.path().join("a.txt").exists());
        let entries = h.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "Error - Configuration");
    }

    #[tokio::test]
    async fn test_upload_tick_runs_batch() {
        let h = harness();
        let mut rx = h.events.subscribe();
        std::fs::write(h.local_dir.path().join("a.txt"), b"abc").unwrap();
        h.settings.set(keys::SYNC_MODE, json!("upload")).unwrap();

        assert_eq!(
            h.scheduler.tick().await,
            TickOutcome::Started(Direction::Upload)
        );
        h.scheduler.wait_for_batches().await;

        assert_eq!(std::fs::read(h.remote_dir.path().join("a.txt")).unwrap(), b"abc");
        assert!(!h.scheduler.is_busy(Direction::Upload));
        assert!(h.scheduler.pending(Direction::Upload).is_empty());

        let mut finished = false;
        let mut refreshed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::BatchFinished { transferred, .. } => {
                    assert_eq!(transferred, 1);
                    finished = true;
                }
                SyncEvent::ListingRefreshed { remote, .. } => {
                    refreshed = remote.iter().any(|e| e.name == "a.txt");
                }
                _ => {}
            }
        }
        assert!(finished);
        assert!(refreshed);
    }

    /// 永远连不上的远程端点
    struct Unreachable;

    #[async_trait::async_trait]
    impl Storage for Unreachable {
        async fn connect(&self) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn list_dir(&self, _path: &str) -> anyhow::Result<Vec<crate::storage::DirectoryEntry>> {
            anyhow::bail!("not connected")
        }
        async fn stat(&self, _path: &str) -> anyhow::Result<Option<crate::storage::FileMeta>> {
            anyhow::bail!("not connected")
        }
        async fn read(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("not connected")
        }
        async fn write(&self, _path: &str, _data: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("not connected")
        }
        async fn delete(&self, _path: &str) -> anyhow::Result<()> {
            anyhow::bail!("not connected")
        }
        async fn create_dir(&self, _path: &str) -> anyhow::Result<()> {
            anyhow::bail!("not connected")
        }
        async fn remove_dir(&self, _path: &str, _recursive: bool) -> anyhow::Result<()> {
            anyhow::bail!("not connected")
        }
        fn join(&self, dir: &str, name: &str) -> String {
            crate::core::paths::join_remote(dir, name)
        }
        fn parent(&self, path: &str) -> Option<String> {
            crate::core::paths::parent_remote(path)
        }
        fn normalize(&self, path: &str) -> String {
            crate::core::paths::normalize_remote(path)
        }
        fn name(&self) -> &str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn test_connection_failure_fails_batch_only() {
        let local_dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(MemorySettings::new());
        settings
            .set(keys::LOCAL_ROOT, json!(local_dir.path().to_string_lossy()))
            .unwrap();
        settings.set(keys::SYNC_MODE, json!("download")).unwrap();
        let audit = Arc::new(MemoryAudit::new());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let scheduler = SyncScheduler::new(
            Arc::new(LocalStorage::new()),
            Arc::new(Unreachable),
            settings.clone(),
            audit.clone(),
            events,
            SyncConfig::default(),
        );

        assert_eq!(scheduler.tick().await, TickOutcome::Started(Direction::Download));
        scheduler.wait_for_batches().await;
        assert!(!scheduler.is_busy(Direction::Download));
        assert!(audit
            .entries()
            .iter()
            .any(|e| e.kind == "Error - Connect to Remote"));
        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::Error { kind, .. } = event {
                assert_eq!(kind, ErrorKind::Connection);
                saw_error = true;
            }
        }
        assert!(saw_error);

        // 标志已释放，下一轮可以重新开始
        assert_eq!(scheduler.tick().await, TickOutcome::Started(Direction::Download));
        scheduler.wait_for_batches().await;
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let h = harness();
        let mut rx = h.events.subscribe();
        h.settings.set(keys::SYNC_MODE, json!("upload")).unwrap();
        h.settings.set(keys::SYNC_INTERVAL_MS, json!(50)).unwrap();

        assert!(h.scheduler.start());
        assert!(!h.scheduler.start());
        tokio::time::sleep(Duration::from_millis(120)).await;
        h.scheduler.stop().await;

        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.mode(), SyncMode::Idle);

        let mut saw_started = false;
        let mut saw_stopped = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::Started { mode } => {
                    assert_eq!(mode, SyncMode::Upload);
                    saw_started = true;
                }
                SyncEvent::Stopped => saw_stopped = true,
                _ => {}
            }
        }
        assert!(saw_started && saw_stopped);
    }

    #[tokio::test]
    async fn test_interval_change_rearms_timer_and_ticks_immediately() {
        let h = harness();
        let mut rx = h.events.subscribe();
        h.settings.set(keys::SYNC_MODE, json!("upload")).unwrap();
        h.settings.set(keys::SYNC_INTERVAL_MS, json!(200)).unwrap();

        let count_passes = |rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>| {
            let mut passes = 0;
            while let Ok(event) = rx.try_recv() {
                if matches!(event, SyncEvent::ListingRefreshed { .. }) {
                    passes += 1;
                }
            }
            passes
        };

        assert!(h.scheduler.start());
        tokio::time::sleep(Duration::from_millis(80)).await;
        h.scheduler.wait_for_batches().await;
        assert_eq!(count_passes(&mut rx), 1);

        // 新间隔很长，只有立即重新触发才会在下一个旧周期内看到第二次同步
        h.settings.set(keys::SYNC_INTERVAL_MS, json!(60_000)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.scheduler.wait_for_batches().await;
        assert_eq!(count_passes(&mut rx), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count_passes(&mut rx), 0);
        assert!(h.scheduler.is_running());

        h.scheduler.stop().await;
    }
}
