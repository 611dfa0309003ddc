use anyhow::Context;
use argon2::Argon2;
use packchann::{
    app::{router, AppState},
    config::Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is fine, the environment may already carry everything
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "packchann=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let app_state = AppState::new(&config, Argon2::default());

    let identity = app_state.identity.clone();
    let purge_interval = config.session_purge_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        loop {
            interval.tick().await;
            let purged = identity.purge_expired_sessions();
            if purged > 0 {
                tracing::debug!(purged, "purged expired sessions");
            }
        }
    });

    let app = router(app_state);

    tracing::info!("listening on {}", config.listen_addr);

    axum::Server::bind(&config.listen_addr)
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
