use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use terrarium_service::{
    alerts::{AlertThrottle, LogNotifier, Notifier, WebhookNotifier},
    api::{self, AppState},
    clock::{Clock, SystemClock},
    config::Config,
    db,
    presence::PresenceService,
    reconcile::ReconciliationEngine,
    registry::PinHasher,
    store::{DeviceStore, PgDeviceStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;
    info!("Database ready");

    let store: Arc<dyn DeviceStore> = Arc::new(PgDeviceStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.device_timezone));

    let notifier: Arc<dyn Notifier> = match &config.notifier_webhook_url {
        Some(url) => {
            info!(url = %url, "Alerts go to mail relay");
            Arc::new(WebhookNotifier::new(url, &config.alert_sender)?)
        }
        None => {
            info!("NOTIFIER_WEBHOOK_URL not set, alerts are only logged");
            Arc::new(LogNotifier)
        }
    };

    let throttle = AlertThrottle::new(config.alert_cooldown);
    info!(cooldown_secs = throttle.cooldown().num_seconds(), "Alert throttle configured");
    let engine = ReconciliationEngine::new(store.clone(), notifier, clock.clone(), throttle);

    // Spawn presence sweep
    let presence = PresenceService::new(
        store.clone(),
        clock,
        config.online_timeout,
        Duration::from_secs(config.presence_interval_secs),
    );
    tokio::spawn(presence.clone().run());

    let state = AppState {
        engine: Arc::new(engine),
        store,
        presence,
        pins: PinHasher::new(&config.pin_secret),
        admin_token: Arc::from(config.admin_api_token.as_str()),
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, timezone = %config.device_timezone, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
