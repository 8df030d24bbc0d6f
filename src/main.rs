use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rental_core::build_app;
use rental_core::clients::{MockProcessor, PaymentProcessor, StripeClient};
use rental_core::config::{EnvironmentConfig, ProcessorBackend, StoreBackend};
use rental_core::state::AppState;
use rental_core::store::{MemoryStore, RecordStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🏎️ Rental booking service");
    info!("================================================");

    let config = EnvironmentConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Redis => match RedisStore::connect(&config.store).await {
            Ok(store) => {
                info!("✅ Redis connected ({})", config.store.key_prefix);
                Arc::new(store)
            }
            Err(e) => {
                error!("❌ Could not connect to Redis: {}", e);
                return Err(anyhow::anyhow!("record store unavailable: {}", e));
            }
        },
        StoreBackend::Memory => {
            warn!("⚠️ Using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let processor: Arc<dyn PaymentProcessor> = match config.payments.backend {
        ProcessorBackend::Stripe => Arc::new(
            StripeClient::new(&config.payments.stripe_api_base, &config.payments.stripe_secret_key)
                .map_err(|e| anyhow::anyhow!("payment processor setup failed: {}", e))?,
        ),
        ProcessorBackend::Mock => {
            warn!("⚠️ Using the mock payment processor");
            Arc::new(MockProcessor::new())
        }
    };

    let addr: SocketAddr = config
        .server_url()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_url()))?;
    let app = build_app(AppState::new(config, store, processor));

    info!("🌐 Listening on http://{}", addr);
    info!("   POST /bookings - Booking request");
    info!("   GET  /cars - Fleet");
    info!("   POST /webhooks/payments - Processor webhooks");
    info!("   /bookings/:id/* - Back office (admin token)");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Server error: {}", e);
            e
        })?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Could not listen for Ctrl+C: {}", e);
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
                error!("❌ Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Ctrl+C received, shutting down...");
        },
        _ = terminate => {
            info!("🛑 SIGTERM received, shutting down...");
        },
    }
}
