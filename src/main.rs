use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use moneta_backend::core::logging;
use moneta_backend::server::router;
use moneta_backend::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    // Each process is one conversational session; start it clean.
    if let Err(err) = state.pipeline.reset_session().await {
        tracing::warn!("Failed to reset session memory: {}", err);
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(0);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("MONETA_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = router::router(state.clone());

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
