use std::{net::SocketAddr, sync::Arc};

use tokio::sync::broadcast;
use tracing::{error, info};
use tunedeck::{
    audio::ClockVoice,
    commands::Dispatcher,
    common::{logger, types::AnyResult},
    configs::Config,
    monitoring::HostMonitor,
    player::{SessionRegistry, Ticker},
    server::AppState,
    sources::LocalSource,
    stats::StatsService,
    transport,
};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    info!("tunedeck v{} starting", env!("CARGO_PKG_VERSION"));

    let stats = StatsService::open(&config.stats.path);
    let (events, _) = broadcast::channel(config.player.event_buffer.max(1));

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(ClockVoice::new()),
        stats.handle(),
        events.clone(),
    ));
    let host = Arc::new(HostMonitor::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        Arc::new(LocalSource::new(config.sources.music_dir.clone())),
        host.clone(),
        config.player.command_prefix.clone(),
        config.sources.search_limit,
    ));

    let ticker = Ticker::new(registry.clone(), events, &config.player).spawn();

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(config, registry, dispatcher, host)?);
    let app = transport::router(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on {}", address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    ticker.abort();
    if tokio::task::spawn_blocking(move || stats.shutdown()).await.is_err() {
        error!("Stats writer did not shut down cleanly");
    }
    info!("Stats flushed, bye");

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
