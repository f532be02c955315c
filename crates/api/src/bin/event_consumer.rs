//! Broker consumer entry point.
//!
//! Subscribes to `change_batch_quantity` on Redis and feeds each message to
//! the message bus.

use std::sync::Arc;

use api::Config;
use api::redis_pubsub::{RedisPublisher, run_consumer};
use api::runtime::{init_tracing, shutdown_signal};
use service::{LoggingNotifier, Notifier};
use store::{InMemoryProductStore, PostgresStore};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let redis_url = config
        .redis_url
        .clone()
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    let client = redis::Client::open(redis_url.as_str()).expect("invalid REDIS_URL");

    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
    let publisher = Arc::new(RedisPublisher::new(client.clone()));

    let consumer = async {
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PostgresStore::connect(url)
                    .await
                    .expect("failed to connect to PostgreSQL");
                store
                    .run_migrations()
                    .await
                    .expect("failed to run migrations");
                let state = api::create_state(store, notifier, publisher, &config);
                run_consumer(state, client).await
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory product store");
                let state =
                    api::create_state(InMemoryProductStore::new(), notifier, publisher, &config);
                run_consumer(state, client).await
            }
        }
    };

    tokio::select! {
        result = consumer => {
            if let Err(e) = result {
                tracing::error!(error = %e, "event consumer stopped");
                std::process::exit(1);
            }
        }
        () = shutdown_signal() => {}
    }

    tracing::info!("event consumer shut down");
}
