use anyhow::{Context as _, Result};
use tigris_sentinel::{AppContext, config::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("loading settings (config/<env>.toml + TSN_*)")?;
    let ctx = AppContext::bootstrap(settings).await?;

    if let Err(e) = tigris_sentinel::run(ctx.clone()).await {
        tracing::error!(error = ?e, "sentinel stopped with error");
        ctx.sentinel().shutdown();
        return Err(e);
    }
    tracing::info!("sentinel stopped");
    Ok(())
}
