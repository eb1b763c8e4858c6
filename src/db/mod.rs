pub mod models;
pub use models::*;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
pub use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// 打开审计日志数据库并执行迁移
pub async fn open(config_dir: &Path) -> Result<SqlitePool> {
    let db_path = config_dir.join("remotesync.db");
    // Windows 路径需要转换反斜杠为正斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid database path"))?
        .replace('\\', "/");

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// 内存数据库，测试使用
pub async fn open_in_memory() -> Result<SqlitePool> {
    // 内存库每个连接各自独立，只能保留一个连接
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
