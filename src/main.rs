use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use wakegate::config::{Config, WakeTarget};
use wakegate::gate::RequestGate;
use wakegate::pool::PoolConfig;
use wakegate::server::GateServer;
use wakegate::{PKG_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wakegate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");

    print_startup_banner(&config);

    let gate = RequestGate::new(&config.gate).map_err(|e| {
        error!(error = %e, "Invalid gate configuration");
        anyhow::anyhow!("Invalid gate configuration: {}", e)
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    let pool_config = PoolConfig {
        max_idle_per_host: config.server.pool_max_idle_per_host,
        idle_timeout: Duration::from_secs(config.server.pool_idle_timeout_secs),
    };

    let server = GateServer::with_pool_config(
        bind_addr,
        Arc::new(gate),
        &config.server.upstream,
        config.server.forward_timeout(),
        shutdown_rx,
        pool_config,
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Gate server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting wake gate");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        upstream = %config.server.upstream,
        forward_timeout_secs = config.server.forward_timeout_secs,
        "Server configuration"
    );
    info!(
        pool_max_idle = config.server.pool_max_idle_per_host,
        pool_idle_timeout_secs = config.server.pool_idle_timeout_secs,
        "Connection pool settings"
    );

    let gate = &config.gate;
    match gate.wake_target() {
        Ok(WakeTarget::Broadcast {
            mac_address,
            ip_address,
            interface,
        }) => info!(
            mac = %mac_address,
            ip = %ip_address,
            interface = interface.as_deref().unwrap_or("any"),
            "Wake mode: magic packet broadcast"
        ),
        Ok(WakeTarget::Http { start_url, method }) => {
            info!(url = %start_url, method = %method, "Wake mode: HTTP start call")
        }
        Err(_) => {}
    }
    info!(
        health_check = %gate.health_check,
        request_timeout_secs = gate.request_timeout,
        num_retries = gate.num_retries,
        poll_interval_ms = gate.poll_interval_ms,
        "Health check settings"
    );
    match gate.stop_url() {
        Some(stop_url) => info!(
            url = %stop_url,
            method = %gate.stop_method,
            idle_minutes = gate.stop_timeout,
            "Idle sleep enabled"
        ),
        None => info!("Idle sleep disabled (no stop URL)"),
    }
}
