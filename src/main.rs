use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::{signal, sync::mpsc};
use tracing::info;

use roastery_api as api;

use api::services::notifications::{HttpNotifier, LogNotifier, NotificationService};
use api::services::payments::{PaymentProvider, StripeGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await?;
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let payments: Arc<dyn PaymentProvider> = Arc::new(StripeGateway::new(
        cfg.stripe_secret_key.clone(),
        Duration::from_secs(cfg.payment_timeout_secs),
    ));

    let notifier: Arc<dyn NotificationService> = match &cfg.notification_endpoint {
        Some(endpoint) => {
            info!("notification relay configured: {}", endpoint);
            Arc::new(HttpNotifier::new(
                endpoint.clone(),
                Duration::from_secs(cfg.notification_timeout_secs),
            ))
        }
        None => {
            info!("no notification relay configured; notices will be logged only");
            Arc::new(LogNotifier)
        }
    };

    let services = api::handlers::AppServices::new(
        db.clone(),
        event_sender.clone(),
        payments,
        notifier,
        &cfg,
    );

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let app = api::handlers::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}
