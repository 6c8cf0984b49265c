pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method},
    routing::get,
};
use once_cell::sync::Lazy;
use tower::{Layer, ServiceBuilder};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::server::{
    api::{
        drama_controller::DramaController,
        health_controller::{health_endpoint, metrics_endpoint},
        proxy_controller::ProxyController,
    },
    services::edge_services::EdgeServices,
};

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// every route with services attached. split out from `serve` so tests can drive it with
    /// `oneshot` and no socket
    pub fn router(services: EdgeServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        Router::new()
            .nest("/api/v1/dramabox", DramaController::app())
            .nest("/api/v1/relay", ProxyController::app())
            .route("/health", get(health_endpoint))
            .route("/metrics", get(metrics_endpoint))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(Extension(services)),
            )
    }

    pub async fn serve(services: EdgeServices) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let port = services.config.port;
        let app = NormalizePathLayer::trim_trailing_slash().layer(Self::router(services));

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;

        info!("edge server listening on port {}", port);

        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("error while serving")?;

        Ok(())
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        if cors_origin.trim() == "*" {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid cors origin {}", origin);
                    None
                }
            })
            .collect();

        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        // never resolve, keep serving
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
