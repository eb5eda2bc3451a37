mod reactor;
mod tests;
mod utils;

use tracing_subscriber::EnvFilter;
use utils::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter()))
        .with_target(true)
        .init();

    reactor::init::run(config).await
}
