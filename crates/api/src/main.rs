use std::sync::Arc;

use anyhow::Context;

use salescast_api::app::{AppServices, build_app};
use salescast_infra::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;
    salescast_observability::init_with(config.log_format);

    let services = AppServices::from_config(&config)
        .await
        .context("failed to wire services")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
