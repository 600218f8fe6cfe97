// ingestd: Ingests location/telemetry reports from tracking hardware.
//
// Runtime event loop: wires together Postgres persistence, the ingestion
// pipeline, the TCP ingress listeners, and the HTTP webhook server.

use ingestd::config;
use ingestd::http::build_router;
use ingestd::pipeline::{IngestPipeline, PipelineOptions};
use ingestd::state::AppState;
use ingestd::store::postgres::{PgStore, create_pool, run_migrations};
use ingestd::store::{DeviceDirectory, IngestStore};
use ingestd::tcp::TcpIngress;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ingestd starting");

    // Parse optional --config <path> argument.
    // Defaults to /etc/rastro/ingestd.toml when not supplied.
    let args: Vec<String> = std::env::args().collect();
    let cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(p) => config::load_config_from_path(std::path::Path::new(p)),
            None => {
                eprintln!("FATAL: --config requires a path argument");
                std::process::exit(1);
            }
        },
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => {
            info!(
                http_bind = %cfg.http.bind,
                tcp_listeners = cfg.tcp_listeners.len(),
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    info!("connecting to database...");
    let pool = create_pool(&cfg.database.url).await;
    run_migrations(&pool).await;
    info!("migrations applied");

    let pg = Arc::new(PgStore::new(pool));
    let store: Arc<dyn IngestStore> = pg.clone();
    let directory: Arc<dyn DeviceDirectory> = pg;
    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        directory,
        PipelineOptions::from_config(&cfg),
    ));

    // Set up shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Bind TCP ingress listeners up front so port conflicts are fatal at
    // startup rather than silent later.
    for listener_cfg in cfg.tcp_listeners.clone() {
        let label = listener_cfg.label.clone();
        let ingress = match TcpIngress::bind(
            listener_cfg,
            Arc::clone(&pipeline),
            shutdown_rx.clone(),
        )
        .await
        {
            Ok(ingress) => ingress,
            Err(e) => {
                eprintln!("FATAL: failed to bind tcp listener '{label}': {e}");
                std::process::exit(1);
            }
        };
        match ingress.local_addr() {
            Ok(addr) => info!(listener = %label, addr = %addr, "tcp ingress bound"),
            Err(e) => error!(listener = %label, error = %e, "local_addr unavailable"),
        }
        tokio::spawn(async move {
            ingress.run().await;
        });
    }

    // HTTP ingress (webhook + audit query + health).
    let state = AppState::new(Arc::clone(&pipeline), store);
    let router = build_router(state);
    let http_listener = match tokio::net::TcpListener::bind(&cfg.http.bind).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("FATAL: failed to bind http server on {}: {e}", cfg.http.bind);
            std::process::exit(1);
        }
    };
    info!(addr = %cfg.http.bind, "http server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            http_listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!(error = %e, "http server error");
        }
    });

    info!("ingestd initialized — all workers running");

    // Wait for Ctrl-C or SIGTERM
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                tokio::signal::ctrl_c().await.ok();
                shutdown_tx.send(true).ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown: SIGINT received"),
            _ = sigterm.recv() => info!("shutdown: SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown: Ctrl-C received");
    }

    // Signal all tasks to stop; in-flight audit writes and persists finish
    // on their own.
    shutdown_tx.send(true).ok();

    // Brief delay to allow tasks to observe shutdown and flush
    sleep(Duration::from_millis(200)).await;

    info!("ingestd shutdown complete");
}
