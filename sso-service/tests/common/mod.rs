use metrics_exporter_prometheus::PrometheusBuilder;
use service_core::config::Config as CoreConfig;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use sso_service::config::{
    Environment, RateLimitConfig, RegistryConfig, SecurityConfig, SloConfig, SsoConfig,
    SwaggerConfig, SwaggerMode, TicketConfig, UserConfig,
};
use sso_service::models::RegisteredService;
use sso_service::services::{
    JsonServiceRegistry, LogoutCoordinator, MockLogoutTransport, RegistryWatcher,
    InMemoryServiceRegistry, InMemoryTicketStore, ServiceCatalog, ServiceRegistry,
    StaticAuthenticator, TicketAuthority,
};
use sso_service::{AppState, build_router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub catalog: Arc<ServiceCatalog>,
    pub transport: Arc<MockLogoutTransport>,
}

fn test_config() -> SsoConfig {
    SsoConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "sso-service".to_string(),
        service_version: "test".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        registry: RegistryConfig {
            directory: None,
            watch: false,
            watch_poll_seconds: 1,
            reload_interval_seconds: 3600,
        },
        tickets: TicketConfig {
            tgt_max_lifetime_seconds: 28800,
            tgt_idle_timeout_seconds: 7200,
            st_time_to_live_seconds: 10,
            pgt_max_lifetime_seconds: 28800,
        },
        slo: SloConfig {
            back_channel_timeout_seconds: 2,
            front_channel_session_ttl_seconds: 300,
        },
        users: UserConfig {
            credentials: "alice:secret,bob:hunter2".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 10_000,
            login_window_seconds: 60,
            global_ip_limit: 100_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    /// Spawn the service with an in-memory registry seeded with `services`.
    pub async fn spawn(services: Vec<RegisteredService>) -> Self {
        let registry: Arc<dyn ServiceRegistry> =
            Arc::new(InMemoryServiceRegistry::with_services(services));
        Self::spawn_with_registry(registry, None).await
    }

    /// Spawn the service over a watched directory of JSON definitions.
    pub async fn spawn_with_dir(root: &Path) -> Self {
        let registry = Arc::new(
            JsonServiceRegistry::new(root)
                .await
                .expect("Failed to create file registry"),
        );
        Self::spawn_with_registry(
            Arc::clone(&registry) as Arc<dyn ServiceRegistry>,
            Some(registry),
        )
        .await
    }

    async fn spawn_with_registry(
        registry: Arc<dyn ServiceRegistry>,
        file_registry: Option<Arc<JsonServiceRegistry>>,
    ) -> Self {
        let config = test_config();

        let catalog = Arc::new(ServiceCatalog::new(registry));
        catalog.load().await.expect("Failed to load catalog");

        if let Some(file_registry) = file_registry {
            let watcher =
                RegistryWatcher::new(file_registry.root(), Duration::from_millis(25));
            let _ = catalog.spawn_file_watch_loop(file_registry, watcher.spawn().await);
        }

        let authority = Arc::new(TicketAuthority::new(
            Arc::new(InMemoryTicketStore::new()),
            catalog.clone(),
            Arc::new(StaticAuthenticator::from_spec(&config.users.credentials)),
            config.ticket_policy(),
        ));

        let transport = Arc::new(MockLogoutTransport::new());
        let coordinator = Arc::new(LogoutCoordinator::new(
            catalog.clone(),
            transport.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            catalog: catalog.clone(),
            authority,
            coordinator,
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
            // Not installed globally so parallel test apps can coexist
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = build_router(state).await.expect("Failed to build router");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            service_core::axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            client,
            catalog,
            transport,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Log in as alice and return the TGT id.
    pub async fn login(&self) -> String {
        let response = self
            .client
            .post(self.url("/v1/tickets"))
            .json(&serde_json::json!({ "username": "alice", "password": "secret" }))
            .send()
            .await
            .expect("Failed to execute login request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["tgt_id"].as_str().expect("Missing tgt_id").to_string()
    }

    /// Grant a plain (non-renew) service ticket and return the ST id.
    pub async fn grant(&self, tgt_id: &str, service: &str) -> String {
        let response = self
            .client
            .post(self.url(&format!("/v1/tickets/{}", tgt_id)))
            .json(&serde_json::json!({ "service": service }))
            .send()
            .await
            .expect("Failed to execute grant request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["st_id"].as_str().expect("Missing st_id").to_string()
    }
}

/// A registered service definition for test fixtures.
pub fn registered(id: u64, name: &str, service_id: &str) -> RegisteredService {
    let mut service = RegisteredService::new(name, service_id);
    service.id = id;
    service
}
