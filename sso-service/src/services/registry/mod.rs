pub mod file;
pub mod watcher;

use crate::models::RegisteredService;
use crate::services::SsoError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Pluggable storage for registered service definitions.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Load every definition this backend holds.
    async fn load(&self) -> Result<Vec<RegisteredService>, SsoError>;

    /// Persist a definition (full replace, keyed by id).
    async fn save(&self, service: RegisteredService) -> Result<RegisteredService, SsoError>;

    /// Remove a definition. Returns false when it was not present.
    async fn delete(&self, service: &RegisteredService) -> Result<bool, SsoError>;

    /// Exact string lookup on the matching expression, no pattern evaluation.
    async fn find_by_exact_service_id(
        &self,
        service_id: &str,
    ) -> Result<Option<RegisteredService>, SsoError>;

    async fn size(&self) -> Result<usize, SsoError>;

    fn name(&self) -> &str;
}

/// Process-local registry, used for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    services: DashMap<u64, RegisteredService>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: Vec<RegisteredService>) -> Self {
        let registry = Self::new();
        for service in services {
            registry.services.insert(service.id, service);
        }
        registry
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn load(&self) -> Result<Vec<RegisteredService>, SsoError> {
        Ok(self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save(&self, service: RegisteredService) -> Result<RegisteredService, SsoError> {
        self.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn delete(&self, service: &RegisteredService) -> Result<bool, SsoError> {
        Ok(self.services.remove(&service.id).is_some())
    }

    async fn find_by_exact_service_id(
        &self,
        service_id: &str,
    ) -> Result<Option<RegisteredService>, SsoError> {
        Ok(self
            .services
            .iter()
            .find(|entry| entry.value().service_id == service_id)
            .map(|entry| entry.value().clone()))
    }

    async fn size(&self) -> Result<usize, SsoError> {
        Ok(self.services.len())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
