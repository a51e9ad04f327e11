mod app;
mod config;
mod db;
mod email;
mod hooks;
mod issuer;
mod routes;
mod state;
mod telemetry;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let (app_state, db) = state::AppState::init().await?;
    db::migrate(&db).await;

    let config = app_state.config.clone();
    tracing::info!(
        storage = ?config.storage.backend,
        namespace = %config.storage.namespace,
        issuer = %config.upstream.url,
        max_body_bytes = config.upstream.max_body_bytes,
        "issuer configured"
    );

    let sweeper = issuer::spawn_sweeper(
        app_state.issuer_config.storage.clone(),
        config.storage.sweep_interval,
    );
    let served = app::serve(app::build_app(app_state), config.listen_addr).await;
    sweeper.abort();
    served
}
