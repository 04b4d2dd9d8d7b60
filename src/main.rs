use rentwallet_backend::api;
use rentwallet_backend::app::{Components, ServiceSettings, Stores};
use rentwallet_backend::config::AppConfig;
use rentwallet_backend::database::{self, memory::InMemoryStore};
use rentwallet_backend::logging::init_tracing;
use rentwallet_backend::payments::providers::mpesa::MpesaProvider;
use rentwallet_backend::services::notification::LogNotifier;
use rentwallet_backend::workers::settlement_queue::TokioSettlementQueue;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    let skip_externals = std::env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    info!(
        version = env!("CARGO_PKG_VERSION"),
        currency = %config.wallet.currency,
        service_fee_bps = config.wallet.service_fee_bps,
        "🚀 Starting rent wallet backend"
    );

    let (db_pool, stores) = if skip_externals {
        info!("⏭️  Using in-memory store (SKIP_EXTERNALS=true)");
        (None, Stores::in_memory(Arc::new(InMemoryStore::new())))
    } else {
        let db_config = config
            .database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not set"))?;

        info!("📊 Initializing database connection pool...");
        let pool = database::connect(db_config)
            .await
            .map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
        info!(
            max_connections = pool.options().get_max_connections(),
            "✅ Database connection pool initialized"
        );

        if db_config.run_migrations {
            database::run_migrations(&pool).await?;
            info!("✅ Migrations applied");
        }
        (Some(pool.clone()), Stores::postgres(pool))
    };

    let gateway = Arc::new(MpesaProvider::new(config.gateway.clone())?);
    info!(
        initiate_url = %config.gateway.stk_initiate_url,
        confirm_url = %config.gateway.confirm_url,
        "M-Pesa relay configured"
    );

    let (queue, jobs) = TokioSettlementQueue::new();
    let components = Components::build(
        &stores,
        gateway,
        Arc::new(queue),
        Arc::new(LogNotifier::new()),
        ServiceSettings::from(&config),
    );

    match components.worker.recover_live().await {
        Ok(0) => {}
        Ok(recovered) => info!(recovered, "♻️  Re-enqueued live settlements"),
        Err(e) => warn!(error = %e, "Settlement recovery failed; stuck monitor will flag them"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(components.worker.clone().run(jobs, shutdown_rx.clone()));
    let monitor = components.stuck_monitor();
    let monitor_rx = shutdown_rx.clone();
    let monitor_handle = tokio::spawn(async move { monitor.run(monitor_rx).await });

    let app = api::router(components.api_state(db_pool));

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    for (name, handle) in [("reconciliation", worker_handle), ("stuck monitor", monitor_handle)] {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            error!(worker = name, "Timed out waiting for worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");
    Ok(())
}
