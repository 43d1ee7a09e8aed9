//! API server entry point.

use std::sync::Arc;

use api::config::LogFormat;
use api::{AppState, Config, StartupError};
use saga::{HostedCheckoutLinks, SagaWorkers};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    // 1. Connect backends; the process does not start without them
    let backends = api::build_backends(&config).await?;

    // 2. Start saga consumers and the expiry sweeper
    let workers = SagaWorkers::start(
        backends.broker.clone(),
        backends.orders.clone(),
        Arc::new(HostedCheckoutLinks::new(config.payment_link_base_url.clone())),
        config.broker_settings(),
    )
    .await?;

    // 3. Serve until a shutdown signal arrives
    let app = api::create_app(Arc::new(AppState::new(backends.orders)));
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "starting API server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 4. Stop workers, then close the broker
    workers.shutdown().await;
    if let Err(e) = backends.broker.close().await {
        tracing::warn!(error = %e, "failed to close broker connection");
    }

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}
