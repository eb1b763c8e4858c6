//! 审计日志
//!
//! 同步过程中的错误和关键事件都会写一条审计记录，供界面展示。
//! 写入是即发即忘的，不会阻塞同步流程。

use crate::db::{AuditEntry, AuditRow};
use crate::error::SyncError;
use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::warn;

/// 审计日志接收端
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// 记录一个错误：写 tracing 日志并发送到审计日志
pub fn report(sink: &dyn AuditSink, err: &SyncError) {
    warn!("{}", err);
    sink.record(AuditEntry::from(err));
}

/// 基于 SQLite 的审计日志
pub struct AuditLog {
    pool: SqlitePool,
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLog {
    /// 创建审计日志并启动后台写入任务（需要在 tokio 运行时中调用）
    pub fn new(pool: SqlitePool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();
        let writer_pool = pool.clone();

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = Self::insert_into(&writer_pool, &entry).await {
                    warn!("写入审计日志失败: {}", e);
                }
            }
        });

        Self { pool, tx }
    }

    async fn insert_into(pool: &SqlitePool, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO audit_logs (id, log_type, kind, description, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.id)
        .bind(entry.log_type.as_str())
        .bind(&entry.kind)
        .bind(&entry.description)
        .bind(entry.timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 直接写入一条记录（等待写入完成）
    pub async fn insert(&self, entry: &AuditEntry) -> Result<()> {
        Self::insert_into(&self.pool, entry).await
    }

    /// 按时间倒序获取最近的记录
    pub async fn list(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, log_type, kind, description, created_at
             FROM audit_logs
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }

    /// 删除单条记录
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM audit_logs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 清空所有记录
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM audit_logs")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 导出全部记录为 JSON 文件，返回导出的条数
    pub async fn export_json(&self, path: &Path) -> Result<usize> {
        let entries = self.list(i64::MAX).await?;
        let content = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(path, content).await?;
        Ok(entries.len())
    }
}

impl AuditSink for AuditLog {
    fn record(&self, entry: AuditEntry) {
        if self.tx.send(entry).is_err() {
            warn!("审计日志写入任务已停止，丢弃记录");
        }
    }
}

/// 内存中的审计日志，嵌入使用或测试时使用
#[derive(Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
