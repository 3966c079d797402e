mod core;
mod http;
mod mpv;

use anyhow::Context;
use skyradio_proto::config::Config;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = skyradio_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,skyradio_daemon=debug,hyper=warn,reqwest=warn",
                )
            }),
        )
        .init();

    eprintln!("skyradio: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);

    let transport = mpv::MpvTransport::new(&config.mpv, event_tx.clone());
    let daemon_core = core::DaemonCore::new(config.clone(), transport, event_tx.clone())?;
    let state_manager = daemon_core.state_manager();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager,
            event_tx.clone(),
        );
        eprintln!(
            "skyradio: API on http://{}:{}",
            config.http.bind_address, config.http.port
        );
    } else {
        warn!("HTTP API disabled in config; nothing can drive the daemon");
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });
    drop(event_tx);

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
