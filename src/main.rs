//! Libros Reader Server
//!
//! Serves FB2 book content, chapters and images from a local library
//! directory through a file-backed render cache.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libros_reader::config::Config;
use libros_reader::reader::CacheSweeper;
use libros_reader::routes;
use libros_reader::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "libros_reader=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Libros Reader v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Library path: {}", config.library.path.display());
    tracing::info!(
        "Reader cache: {} (ttl {}s)",
        config.reader.cache_path.display(),
        config.reader.cache_ttl.as_secs()
    );

    let app_state = AppState::new(config.clone());

    // Background eviction; a zero ttl keeps everything
    let sweeper = if config.reader.cache_ttl.is_zero() {
        tracing::info!("Reader cache eviction disabled");
        None
    } else {
        Some(CacheSweeper::start(
            app_state.reader().clone(),
            config.reader.sweep_interval,
        ))
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid SERVER_HOST {:?}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!("Libros Reader listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
