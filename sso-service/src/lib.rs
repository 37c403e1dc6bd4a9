pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::middleware::{
    metrics::metrics_middleware, rate_limit::ip_rate_limit_middleware,
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::SsoConfig;
use crate::services::{LogoutCoordinator, ServiceCatalog, TicketAuthority};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::tickets::login,
        handlers::tickets::grant,
        handlers::tickets::destroy,
        handlers::validate::service_validate,
        handlers::logout::next_front_channel,
        handlers::services::list,
        handlers::services::save,
        handlers::services::get,
        handlers::services::delete,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::LoginRequest,
            dtos::LoginResponse,
            dtos::GrantRequest,
            dtos::GrantResponse,
            dtos::ValidateParams,
            dtos::ValidateResponse,
            dtos::LogoutRequestView,
            dtos::LogoutResponse,
            dtos::FrontChannelResponse,
            dtos::SaveServiceRequest,
            models::RegisteredService,
            models::AccessStrategy,
            models::ServiceExpirationPolicy,
            models::LogoutType,
            models::LogoutStatus,
            models::Service,
        )
    ),
    tags(
        (name = "Tickets", description = "SSO session and ticket lifecycle"),
        (name = "Logout", description = "Single logout propagation"),
        (name = "Services", description = "Registered service management"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: SsoConfig,
    pub catalog: Arc<ServiceCatalog>,
    pub authority: Arc<TicketAuthority>,
    pub coordinator: Arc<LogoutCoordinator>,
    pub login_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub metrics: PrometheusHandle,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login gets its own tighter limiter on top of the global one
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/v1/tickets", post(handlers::tickets::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => {
            state.config.swagger.enabled == crate::config::SwaggerMode::Public
        }
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Keep the OpenAPI JSON available for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .merge(login_route)
        .route(
            "/v1/tickets/:tgt_id",
            post(handlers::tickets::grant).delete(handlers::tickets::destroy),
        )
        .route("/v1/serviceValidate", get(handlers::validate::service_validate))
        .route(
            "/v1/logout/:session_id/next",
            get(handlers::logout::next_front_channel),
        )
        .route(
            "/v1/services",
            get(handlers::services::list).post(handlers::services::save),
        )
        .route(
            "/v1/services/:id",
            get(handlers::services::get).delete(handlers::services::delete),
        )
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .unwrap_or_else(|e| {
                                    tracing::error!(
                                        "Invalid CORS origin '{}': {}. Using fallback.",
                                        o,
                                        e
                                    );
                                    service_core::axum::http::HeaderValue::from_static("*")
                                })
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::DELETE,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    // An empty catalog means no service can ever authenticate; surface it
    let registered = state.catalog.size().await;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": if registered > 0 { "healthy" } else { "degraded" },
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "registered_services": registered
        }
    })))
}
