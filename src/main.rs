use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

use drama_edge::{AppConfig, EdgeApplicationServer, EdgeServices, Logger, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards flush the log writer and keep sentry alive, drop them and logs go missing
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped...");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("metrics recorder not installed, /metrics disabled: {}", e);
            None
        }
    };

    let redis_db = RedisDatabase::connect_optional(config.redis_url.as_deref())
        .await
        .context("redis url is set but the connection failed")?;

    let services = EdgeServices::new(config, redis_db, metrics)
        .await
        .context("failed to build edge services")?;

    info!("services ok, starting edge server...");

    EdgeApplicationServer::serve(services)
        .await
        .context("edge server failed to start")?;

    Ok(())
}
