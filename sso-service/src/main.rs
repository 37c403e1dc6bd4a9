use metrics_exporter_prometheus::PrometheusBuilder;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use sso_service::{
    AppState, build_router,
    config::SsoConfig,
    services::{
        Authenticator, HttpLogoutTransport, InMemoryServiceRegistry, InMemoryTicketStore,
        JsonServiceRegistry, LogoutCoordinator, RegistryWatcher, ServiceCatalog, ServiceRegistry,
        StaticAuthenticator, TicketAuthority,
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = SsoConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| service_core::error::AppError::InternalError(anyhow::Error::new(e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting single sign-on service"
    );

    // Service registry backend: file-backed with hot reload, or in-memory
    let file_registry = match &config.registry.directory {
        Some(directory) => Some(Arc::new(JsonServiceRegistry::new(directory).await?)),
        None => None,
    };
    let registry: Arc<dyn ServiceRegistry> = match &file_registry {
        Some(registry) => Arc::clone(registry) as Arc<dyn ServiceRegistry>,
        None => Arc::new(InMemoryServiceRegistry::new()),
    };

    let catalog = Arc::new(ServiceCatalog::new(registry));
    let loaded = catalog.load().await?;
    tracing::info!(services = loaded, "Service catalog initialized");

    if let Some(registry) = &file_registry {
        if config.registry.watch {
            let watcher = RegistryWatcher::new(
                registry.root(),
                Duration::from_secs(config.registry.watch_poll_seconds),
            );
            let _ = catalog.spawn_file_watch_loop(Arc::clone(registry), watcher.spawn().await);
            tracing::info!(root = %registry.root().display(), "Registry watcher started");
        }
    }
    let _ =
        catalog.spawn_periodic_reload(Duration::from_secs(config.registry.reload_interval_seconds));

    let authenticator: Arc<dyn Authenticator> =
        Arc::new(StaticAuthenticator::from_spec(&config.users.credentials));

    let authority = Arc::new(TicketAuthority::new(
        Arc::new(InMemoryTicketStore::new()),
        catalog.clone(),
        authenticator,
        config.ticket_policy(),
    ));

    let transport = Arc::new(HttpLogoutTransport::new(Duration::from_secs(
        config.slo.back_channel_timeout_seconds,
    ))?);
    let coordinator = Arc::new(LogoutCoordinator::with_session_ttl(
        catalog.clone(),
        transport,
        Duration::from_secs(config.slo.front_channel_session_ttl_seconds),
    ));

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login and Global IP");

    let state = AppState {
        config: config.clone(),
        catalog,
        authority,
        coordinator,
        login_rate_limiter,
        ip_rate_limiter,
        metrics,
    };
    let app = build_router(state).await?;

    let addr = config.common.socket_addr()?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
