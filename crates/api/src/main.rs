//! API server entry point.

use std::sync::Arc;

use api::Config;
use api::runtime::{init_tracing, shutdown_signal};
use service::{LoggingNotifier, Notifier};
use store::{InMemoryProductStore, PostgresStore};

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Outbound adapters
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
    let publisher = api::create_publisher(&config).expect("failed to configure event publisher");

    // 4. Pick the product store and build the application
    let app = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL product store");
            let state = api::create_state(store, notifier, publisher, &config);
            api::create_app(state, metrics_handle)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory product store");
            let state =
                api::create_state(InMemoryProductStore::new(), notifier, publisher, &config);
            api::create_app(state, metrics_handle)
        }
    };

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
