use ares_launcher::config::LauncherConfig;
use ares_launcher::ipc::IPCServer;
use ares_launcher::Launcher;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("ARES Launcher {} starting", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(LauncherConfig::load()?);
    let launcher = Arc::new(Launcher::from_config(config.clone())?);

    // 시작 시 한 번 상태 확인. 실패해도 API는 띄운다
    match launcher.check_condition().await {
        Ok(status) => tracing::info!("Initial state: {:?} (version {:?})", status.state, status.current_version),
        Err(e) => tracing::warn!("Initial condition check failed: {}", e),
    }

    let ipc_server = IPCServer::new(launcher.clone(), &config.ipc_listen);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received, cleaning up...");
    };

    if let Err(e) = ipc_server.start(shutdown).await {
        tracing::error!("IPC server error: {}", e);
    }

    // 우리가 띄운(또는 입양한) UI / Service 정리
    launcher.stop().await;
    tracing::info!("ARES Launcher shutting down");
    Ok(())
}
