use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use hookbeat_gateway::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hookbeat_gateway=info,hookbeat_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    // load config: explicit path > HOOKBEAT_CONFIG env > ~/.hookbeat/hookbeat.toml
    let config_path = std::env::var("HOOKBEAT_CONFIG").ok();
    let config = hookbeat_core::HookbeatConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        hookbeat_core::HookbeatConfig::default()
    });

    // open SQLite and run migrations (idempotent)
    let repo = hookbeat_storage::Repository::open(&config.database.path)?;

    // arm all active jobs and start the timer loop; a storage failure here
    // is fatal, a single bad expression is not
    let scheduler = Arc::new(hookbeat_scheduler::SchedulerEngine::new(repo.clone()));
    scheduler.start().await?;

    let state = Arc::new(app::AppState {
        config: config.clone(),
        repo,
        scheduler: Arc::clone(&scheduler),
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("Hookbeat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop arming/firing, then wait out in-flight dispatches
    scheduler.stop().await;
    info!("Hookbeat stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
