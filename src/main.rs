use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rental_payments::{
    config::Config,
    database::{pool::create_pool, InMemoryPaymentStore, PaymentStore, PgPaymentStore},
    routes,
    services::{gateway_service::PaystackClient, notification_service::NotificationService},
    AppState,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rental_payments=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Arc::new(Config::from_env()?);

    let store: Arc<dyn PaymentStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgPaymentStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, payments are kept in memory and lost on restart");
            Arc::new(InMemoryPaymentStore::new())
        }
    };

    let gateway = Arc::new(PaystackClient::from_config(&config)?);
    let notification_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let notifier = NotificationService::spawn(notification_client, config.notification_url.clone());

    let app_state = AppState::new(config.clone(), store, gateway, notifier);

    {
        let service = app_state.payment_service.clone();
        let window = config.reconcile_after();
        let interval = config.reconcile_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = service.reconcile_stale(window).await {
                    tracing::error!(error = %e, "stale payment sweep failed");
                }
            }
        });
    }

    let app = routes::app(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
