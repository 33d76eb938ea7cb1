//! Trading engine entrypoint: loads `.env`, initializes structured
//! logging, builds the `Application`, starts it, and blocks until Ctrl-C.

use rustrade_options::application::bootstrap::Application;
use rustrade_options::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.observability.rust_log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut app = Application::build(config).await?;
    app.start().await?;

    tokio::signal::ctrl_c().await?;
    app.shutdown().await;
    Ok(())
}
