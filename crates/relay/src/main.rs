//! Relay entry point: dispatch workers, sweeper, and the admin server.

use dispatcher::{Dispatcher, WebhookPublisher};
use outbox::PostgresLifecycleStore;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = relay::Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Connect to Postgres and run migrations
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = PostgresLifecycleStore::new(pool);
    store.run_migrations().await.expect("migrations failed");

    // 5. Start dispatch workers and the sweeper
    let publisher = WebhookPublisher::new(config.publish_url.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut tasks = Vec::new();
    for worker in 0..config.dispatch_workers {
        let dispatcher = Dispatcher::new(
            store.clone(),
            publisher.clone(),
            config.dispatcher.clone(),
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            tracing::info!(worker, "dispatch worker started");
            if let Err(err) = dispatcher.run(shutdown).await {
                tracing::error!(worker, error = %err, "dispatch worker exited with error");
            }
        }));
    }

    let sweeper = Dispatcher::new(store.clone(), publisher, config.dispatcher.clone());
    let sweeper_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(err) = sweeper.run_sweeper(sweeper_shutdown).await {
            tracing::error!(error = %err, "sweeper exited with error");
        }
    }));

    // 6. Serve the admin API
    let state = relay::create_state(store);
    let app = relay::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, workers = config.dispatch_workers, "starting relay");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop the workers and wait for them to finish their cycle
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("relay shut down gracefully");
}
