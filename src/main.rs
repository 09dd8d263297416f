use dotenvy::dotenv;
use members::logging::{init_tracing, shutdown_tracer};
use members::metrics::{init_metrics, metrics_app};
use members::router::init_router;
use members::state::init_app_state;
use members_db::run_migrations;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let state = init_app_state().await?;
    run_migrations(&state.db).await?;

    let bind_address = state.server_config.bind_address();
    let public_url = state.server_config.public_url.clone();

    let mut app = init_router(state);
    if let Some(handle) = init_metrics() {
        app = app.merge(metrics_app(handle));
    }

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Server running");
    info!("Swagger UI available at {}/swagger-ui", public_url);
    info!("Scalar UI available at {}/scalar", public_url);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "Server error");
    }

    shutdown_tracer().await;
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
