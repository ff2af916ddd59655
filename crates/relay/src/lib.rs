//! Operational surface for the order lifecycle engine.
//!
//! The relay binary runs the dispatch workers and the stuck-claim sweeper,
//! and serves a small admin API: health, Prometheus metrics, and dead letter
//! queue inspection and replay. Order writes happen elsewhere; this daemon
//! only moves events out of the outbox and exposes what got stuck.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use dispatcher::DlqHandler;
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::LifecycleStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use routes::dlq::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LifecycleStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/dlq", get(routes::dlq::list::<S>))
        .route("/dlq/{id}/reprocess", post(routes::dlq::reprocess::<S>))
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

/// Creates the shared state for the admin routes over a store.
pub fn create_state<S: LifecycleStore>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        dlq: DlqHandler::new(store),
    })
}
