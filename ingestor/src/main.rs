use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vitals_ingestor::config::Config;
use vitals_ingestor::db::{self, PgStore};
use vitals_ingestor::store::Store;
use vitals_ingestor::{metrics, mqtt, rest, retention, Ingestor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    info!("Starting vitals ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Database: {}",
        config.database_url.split('@').last().unwrap_or("***")
    );
    match &config.mqtt {
        Some(mqtt) => info!("MQTT broker: {}:{}", mqtt.broker, mqtt.port),
        None => info!("MQTT intake disabled"),
    }

    metrics::init_metrics();

    let pool = match db::make_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let ingestor = Arc::new(Ingestor::from_config(store.clone(), &config));

    let mqtt_handle = config.mqtt.clone().map(|mqtt_config| {
        let client_id = format!("vitals-ingestor-{}", uuid::Uuid::new_v4());
        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            if let Err(e) =
                mqtt::run_mqtt(mqtt_config.broker, mqtt_config.port, client_id, ingestor).await
            {
                error!("MQTT task failed: {}", e);
            }
        })
    });

    let retention_handle = (config.retention_days > 0).then(|| {
        tokio::spawn(retention::run_retention(
            store.clone(),
            config.retention_days,
            config.retention_interval,
        ))
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(ingestor));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = wait_optional(mqtt_handle) => {
            error!("MQTT task terminated");
        }
        _ = wait_optional(retention_handle) => {
            error!("Retention task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

/// Resolves when the task ends; never resolves for a task that was not started.
async fn wait_optional(handle: Option<tokio::task::JoinHandle<()>>) {
    match handle {
        Some(handle) => {
            let _ = handle.await;
        }
        None => std::future::pending().await,
    }
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
