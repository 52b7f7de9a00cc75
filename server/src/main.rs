//! BlogSphere HTTP server.
//!
//! Run from repo root: `cargo run -p blogsphere-server`
//! `STORAGE_BACKEND=memory` runs without a database.

use blogsphere::{app, builtin_config, load_from_path, resolve, store, AppState, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("blogsphere=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let mut config = match &settings.resource_config {
        Some(path) => load_from_path(path).await?,
        None => builtin_config()?,
    };
    if let Some(schema) = &settings.db_schema {
        config.schema = schema.clone();
    }
    let model = resolve(&config, &settings.deployment())?;
    tracing::info!(
        resources = model.resources.len(),
        id_strategy = ?settings.id_strategy,
        delete_policy = ?settings.delete_policy,
        "resources resolved"
    );

    let store = store::connect(&settings, &model).await?;
    let state = AppState::new(store.clone(), model);
    let router = app(state, settings.body_limit);

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("BlogSphere listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}
