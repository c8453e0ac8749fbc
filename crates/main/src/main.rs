//! 主应用程序入口
//!
//! 加载配置、打开房间库，启动广播分发器、心跳任务和 Axum Web 服务。

use std::sync::Arc;

use application::{
    BroadcastDispatcher, ConnectionRegistry, HeartbeatMonitor, RoomLifecycleTracker, RoomService,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    // 房间库打不开或迁移失败时直接退出
    let infra = Infrastructure::connect(&config.database, &config.security).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let tracker = Arc::new(RoomLifecycleTracker::new(infra.room_store.clone()));
    let (dispatcher, dispatch_handle) =
        BroadcastDispatcher::new(registry.clone(), tracker.clone(), &config.dispatch);
    let dispatcher_task = dispatcher.spawn();
    let heartbeat_task = HeartbeatMonitor::new(
        registry.clone(),
        tracker.clone(),
        dispatch_handle.clone(),
        config.heartbeat.clone(),
    )
    .spawn();

    let room_service = Arc::new(RoomService::new(
        infra.room_store.clone(),
        infra.password_hasher.clone(),
        tracker.clone(),
    ));
    let state = AppState::new(
        registry,
        tracker,
        dispatch_handle,
        room_service,
        config.dispatch.write_timeout(),
    );

    let app = router(state, &config.server.static_dir);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, static_dir = %config.server.static_dir, "chat relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat_task.abort();
    dispatcher_task.abort();
    tracing::info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
}
