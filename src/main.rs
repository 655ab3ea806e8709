//! Admission guard (v1)
//!
//! Fronts an upstream HTTP service with distributed rate limiting, a
//! degrading response cache, and circuit breakers.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ trace / request id / timeout / metrics
//!                         │
//!                         ▼
//!                  rate_limit_middleware ──(deny)──▶ 429 + Retry-After
//!                         │
//!                         ▼
//!          /health              /api/...
//!             │                    │
//!             ▼                    ▼
//!      cache health +      CacheClient (hit?) ──▶ upstream breaker ──▶ Upstream
//!      breaker states            │
//!                                ▼
//!                   KeyValueStore (Redis / memory)
//!                   behind the cache breaker
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use admission_guard::admin::setup_admin_router;
use admission_guard::clock::SystemClock;
use admission_guard::config::load_config;
use admission_guard::http::HttpServer;
use admission_guard::lifecycle::{build_state, spawn_signal_handler, Shutdown};
use admission_guard::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "admission-guard")]
#[command(about = "Rate limiting, caching and circuit breaking in front of an HTTP service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "admission-guard.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability);
    tracing::info!("admission-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        store_url = %config.store.url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = build_state(&config, Arc::new(SystemClock))?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_router = setup_admin_router(state.clone(), &config.admin.api_key);
        let mut stop = shutdown.subscribe();
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin_router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(&config, state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
