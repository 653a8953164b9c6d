use anyhow::Result;
use chartboard::app;
use std::env;

/// Address used when `CHARTBOARD_ADDR` is not set.
const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = env::var("CHARTBOARD_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    app::run(&addr).await?;

    Ok(())
}
