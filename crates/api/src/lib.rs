//! Entrypoints for the allocation service.
//!
//! Provides the REST API, the broker consumer for batch quantity changes
//! and the process bootstrap (configuration, structured logging via tracing,
//! Prometheus metrics).

pub mod config;
pub mod consumer;
pub mod error;
#[cfg(feature = "redis")]
pub mod redis_pubsub;
pub mod routes;
pub mod runtime;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use service::{
    EventPublisher, HandlerRegistry, InMemoryPublisher, MessageBus, Notifier,
};
use store::UnitOfWorkFactory;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<F: UnitOfWorkFactory + 'static>(
    state: Arc<AppState<F>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/batches", post(routes::allocation::add_batch::<F>))
        .route(
            "/batches/{reference}/quantity",
            post(routes::allocation::change_quantity::<F>),
        )
        .route("/allocate", post(routes::allocation::allocate::<F>))
        .route("/deallocate", post(routes::allocation::deallocate::<F>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the standard handlers over a product store.
pub fn create_state<F: UnitOfWorkFactory>(
    uow_factory: F,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn EventPublisher>,
    config: &Config,
) -> Arc<AppState<F>> {
    let registry =
        HandlerRegistry::standard(notifier, publisher, config.out_of_stock_email.clone());
    let bus = MessageBus::new(registry, config.retry_policy());
    Arc::new(AppState::new(uow_factory, bus))
}

/// Picks the event publisher for the configured broker.
pub fn create_publisher(config: &Config) -> Result<Arc<dyn EventPublisher>, ApiError> {
    match config.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let publisher = redis_pubsub::RedisPublisher::open(url)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            tracing::info!("publishing events to Redis");
            Ok(Arc::new(publisher))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("REDIS_URL is set but the redis feature is disabled");
            Ok(Arc::new(InMemoryPublisher::new()))
        }
        None => Ok(Arc::new(InMemoryPublisher::new())),
    }
}
