//! 同步事件通知
//!
//! 单向广播给界面等监听者，没有监听者时直接丢弃。

use crate::db::{Direction, SyncMode};
use crate::error::ErrorKind;
use crate::storage::DirectoryEntry;
use serde::Serialize;
use tokio::sync::broadcast;

/// 同步事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    /// 定时器启动
    Started { mode: SyncMode },
    /// 一批传输开始，附带待传文件名
    BatchStarted { direction: Direction, files: Vec<String> },
    /// 正在传输的文件
    Transferring { direction: Direction, name: String },
    /// 进度百分比（0-100）
    Progress { direction: Direction, percent: u8 },
    /// 一批传输已收敛
    BatchFinished {
        direction: Direction,
        transferred: usize,
        failed: Vec<String>,
    },
    /// 模式切换导致这一批被放弃
    BatchAbandoned { direction: Direction },
    /// 进入暂停（Idle）
    Paused,
    /// 显式停止
    Stopped,
    /// 两侧目录列表已刷新
    ListingRefreshed {
        local: Vec<DirectoryEntry>,
        remote: Vec<DirectoryEntry>,
    },
    /// 需要提示用户的错误
    Error { kind: ErrorKind, message: String },
}

/// 事件总线
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// 发送事件，没有监听者时忽略
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listener_is_dropped() {
        let bus = EventBus::default();
        bus.emit(SyncEvent::Paused);

        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::Progress {
            direction: Direction::Upload,
            percent: 40,
        });
        match rx.try_recv().unwrap() {
            SyncEvent::Progress { percent, .. } => assert_eq!(percent, 40),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_value(SyncEvent::BatchAbandoned {
            direction: Direction::Download,
        })
        .unwrap();
        assert_eq!(json["event"], "batchAbandoned");
        assert_eq!(json["direction"], "download");
    }
}
