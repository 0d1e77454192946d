use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{config::Config, router::build_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = build_router(state.clone())?;

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let sweep_interval = Duration::from_secs(sweep_state.config.session_sweep_interval_secs);
        loop {
            tokio::time::sleep(sweep_interval).await;
            match sweep_state.protocol.issuer.expire_elapsed(Utc::now()).await {
                Ok(0) => {}
                Ok(closed) => {
                    tracing::info!("🧹 Closed {} elapsed sessions", closed);
                }
                Err(e) => {
                    tracing::error!("❌ Session sweep failed: {}", e);
                }
            }
        }
    });
    tracing::info!(
        "✅ Session sweeper started (every {}s)",
        state.config.session_sweep_interval_secs
    );

    let addr = state.config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
