use remotesync_lib::config::JsonSettingsStore;
use remotesync_lib::logging::{self, LogConfig};
use remotesync_lib::{dirs, AppState, SyncEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = dirs::app_config_dir();
    std::fs::create_dir_all(&config_dir)?;

    // 日志配置需要在 AppState 之前读取
    let log_config = LogConfig::load(&JsonSettingsStore::load(&config_dir));
    logging::init(&config_dir, &log_config);
    tracing::info!("配置目录: {:?}", config_dir);

    let state = AppState::with_config_dir(&config_dir).await?;

    let mut events = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Error { kind, message }) => tracing::error!("[{}] {}", kind, message),
                Ok(SyncEvent::ListingRefreshed { .. }) | Ok(SyncEvent::Progress { .. }) => {}
                Ok(other) => tracing::debug!("{:?}", other),
                Err(RecvError::Lagged(n)) => tracing::debug!("丢弃了 {} 个事件", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = state.start_sync().await {
        tracing::error!("无法启动同步: {}", e);
        state.cleanup().await;
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("收到退出信号");
    state.cleanup().await;
    Ok(())
}
