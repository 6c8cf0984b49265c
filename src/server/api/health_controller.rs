use axum::Extension;
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, RedisHealth, ServiceHealthDetails, SignerHealth,
};
use crate::server::services::edge_services::EdgeServices;
use crate::server::services::signer_services::SignerTrait;
use crate::server::{get_app_version, get_uptime_seconds};

/// signer down means nothing signed can go out, so that's unhealthy. redis down only costs us
/// the persisted tier, degraded
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let signer_health = SignerHealth {
        status: if services.signer.is_available().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        mode: services.signer.name().to_string(),
    };

    let redis_health = check_redis_health(&services).await;

    let overall_status = match (&signer_health.status, &redis_health) {
        (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
        (_, Some(redis)) if redis.status == HealthStatus::Unhealthy => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            signer: signer_health,
            redis: redis_health,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

/// prometheus text format, 404 when no recorder was installed
pub async fn metrics_endpoint(Extension(services): Extension<EdgeServices>) -> Response {
    match &services.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn check_redis_health(services: &EdgeServices) -> Option<RedisHealth> {
    let redis = services.redis.as_ref()?;

    Some(match redis.health_check().await {
        Ok(response_time) => RedisHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Redis health check failed: {}", e);
            RedisHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    })
}
