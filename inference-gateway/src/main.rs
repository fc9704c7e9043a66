//! Inference Gateway - auditing reverse proxy for a supervised inference server.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use inference_gateway::{
    router, AppState, BackendClient, BackendProcess, Config, ObjectStoreAuditSink,
    ReadinessPolicy,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("inference-gateway {}", VERSION);
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    // Start the backend and hold traffic until it is ready
    let backend = BackendProcess::launch(&config.backend)?;
    let policy = ReadinessPolicy::with_timeout(Duration::from_secs(config.backend.ready_timeout_secs));
    if let Err(e) = backend
        .wait_until_ready(&config.backend.health_url(), policy)
        .await
    {
        tracing::error!("Backend failed to initialize; terminating: {}", e);
        backend.stop().await;
        std::process::exit(1);
    }

    let client = BackendClient::new(
        &config.backend.base_url(),
        config.backend.pool_idle_per_host,
        config.backend.max_connections,
    )?;
    let audit_sink = Arc::new(ObjectStoreAuditSink::from_config(&config.audit));
    if config.audit.bucket.is_none() {
        tracing::warn!("No audit bucket configured; audit documents will not be persisted");
    }

    let state = Arc::new(AppState::new(config.clone(), Some(client), audit_sink));
    let app = router(state.clone());

    // Start server
    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!("Starting audit gateway on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Close the outbound client first, then the backend itself
    state.close_backend();
    backend.stop().await;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
