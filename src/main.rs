use hookrelay::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "hookrelay=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hookrelay starting up");

    let config = AppConfig::from_env()?;
    let app = hookrelay::build_app(&config)?;
    let bind_addr = app.bind_addr;
    let router = hookrelay::http::build_router(app.state.clone());
    let (_state_manager, _daily_activator) = hookrelay::spawn_workers(&app);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
