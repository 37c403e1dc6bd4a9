use crate::models::registered_service::{RegisteredService, ServiceMatcher, extract_host};
use crate::services::SsoError;
use crate::services::registry::ServiceRegistry;
use crate::services::registry::file::JsonServiceRegistry;
use crate::services::registry::watcher::RegistryEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};

/// Bucket for service ids whose domain cannot be determined, including every
/// wildcarded expression.
pub const DEFAULT_DOMAIN: &str = "default";

/// Change notification published by the catalog.
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    Saved(RegisteredService),
    Deleted(RegisteredService),
    Expired(RegisteredService),
    Reloaded(usize),
}

/// Predicates deciding which services and candidate URLs a (sub-)catalog
/// handles when several catalogs are chained.
pub trait CatalogFilter: Send + Sync {
    fn supports_service(&self, service: &RegisteredService) -> bool;
    fn supports_id(&self, candidate: &str) -> bool;
}

/// Default filter: a single catalog handles everything.
pub struct AllServices;

impl CatalogFilter for AllServices {
    fn supports_service(&self, _service: &RegisteredService) -> bool {
        true
    }
    fn supports_id(&self, _candidate: &str) -> bool {
        true
    }
}

/// Read side of a catalog; the seam the ticket authority and logout
/// coordinator depend on.
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    /// Highest-priority registered service matching the candidate URL.
    /// `Err(EmptyCatalog)` when nothing is registered at all; `Ok(None)` when
    /// the candidate matched no definition.
    async fn find_service_by(
        &self,
        candidate: &str,
    ) -> Result<Option<RegisteredService>, SsoError>;
}

struct CatalogEntry {
    service: Arc<RegisteredService>,
    matcher: ServiceMatcher,
}

#[derive(Default)]
struct CatalogIndex {
    services: HashMap<u64, Arc<RegisteredService>>,
    /// domain -> definitions sorted by evaluation order; first match wins
    domains: HashMap<String, Vec<CatalogEntry>>,
}

fn is_strict_domain(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

/// Domain bucket key for a service-id expression or candidate URL.
fn domain_key(expression: &str) -> String {
    match extract_host(expression) {
        Some(host) if is_strict_domain(&host) => host,
        _ => DEFAULT_DOMAIN.to_string(),
    }
}

impl CatalogIndex {
    fn insert(&mut self, service: RegisteredService) {
        self.remove(service.id);
        let matcher = service.matcher();
        let key = domain_key(&service.service_id);
        let service = Arc::new(service);
        self.services.insert(service.id, Arc::clone(&service));
        let bucket = self.domains.entry(key).or_default();
        bucket.push(CatalogEntry { service, matcher });
        bucket.sort_by(|a, b| a.service.evaluation_cmp(&b.service));
    }

    fn remove(&mut self, id: u64) -> Option<Arc<RegisteredService>> {
        let removed = self.services.remove(&id)?;
        let key = domain_key(&removed.service_id);
        if let Some(bucket) = self.domains.get_mut(&key) {
            bucket.retain(|entry| entry.service.id != id);
            if bucket.is_empty() {
                self.domains.remove(&key);
            }
        }
        Some(removed)
    }

    fn find(&self, candidate: &str) -> Option<Arc<RegisteredService>> {
        let key = domain_key(candidate);
        let bucket = self
            .domains
            .get(&key)
            .or_else(|| self.domains.get(DEFAULT_DOMAIN))?;
        bucket
            .iter()
            .find(|entry| entry.matcher.matches(candidate))
            .map(|entry| Arc::clone(&entry.service))
    }
}

/// Indexed, hot-reloadable view over one registry backend. Reads never block
/// behind writes for longer than the index swap; the rebuilt index replaces
/// the old one atomically.
pub struct ServiceCatalog {
    registry: Arc<dyn ServiceRegistry>,
    index: RwLock<CatalogIndex>,
    filter: Arc<dyn CatalogFilter>,
    events: broadcast::Sender<CatalogEvent>,
    id_high_water: AtomicU64,
    /// Serializes watcher batches against scheduled and manual reloads
    /// without blocking catalog reads.
    reload_lock: Mutex<()>,
}

impl ServiceCatalog {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self::with_filter(registry, Arc::new(AllServices))
    }

    pub fn with_filter(registry: Arc<dyn ServiceRegistry>, filter: Arc<dyn CatalogFilter>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            index: RwLock::new(CatalogIndex::default()),
            filter,
            events,
            id_high_water: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn supports_service(&self, service: &RegisteredService) -> bool {
        self.filter.supports_service(service)
    }

    pub fn supports_id(&self, candidate: &str) -> bool {
        self.filter.supports_id(candidate)
    }

    /// Current-time-millis id, bumped past the high-water mark so assignment
    /// stays monotonic and an id is never reused.
    fn next_id(&self) -> u64 {
        let now = Utc::now().timestamp_millis() as u64;
        let mut prev = self.id_high_water.load(AtomicOrdering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.id_high_water.compare_exchange_weak(
                prev,
                candidate,
                AtomicOrdering::SeqCst,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => prev = observed,
            }
        }
    }

    fn note_id(&self, id: u64) {
        self.id_high_water.fetch_max(id, AtomicOrdering::SeqCst);
    }

    pub async fn save(
        &self,
        mut service: RegisteredService,
    ) -> Result<RegisteredService, SsoError> {
        if service.id == 0 {
            service.id = self.next_id();
        } else {
            self.note_id(service.id);
        }
        let saved = self.registry.save(service).await?;
        {
            let mut index = self.index.write().await;
            index.insert(saved.clone());
        }
        tracing::info!(
            id = saved.id,
            name = %saved.name,
            service_id = %saved.service_id,
            "Registered service saved"
        );
        let _ = self.events.send(CatalogEvent::Saved(saved.clone()));
        Ok(saved)
    }

    pub async fn delete(&self, id: u64) -> Result<Option<RegisteredService>, SsoError> {
        let existing = {
            let index = self.index.read().await;
            index.services.get(&id).cloned()
        };
        let Some(existing) = existing else {
            return Ok(None);
        };
        self.registry.delete(&existing).await?;
        // The index removal is the commit point: of any number of concurrent
        // deletions of the same id, only the one that takes the entry out
        // publishes the event.
        let removed = {
            let mut index = self.index.write().await;
            index.remove(id)
        };
        let Some(removed) = removed else {
            return Ok(None);
        };
        let deleted = (*removed).clone();
        tracing::info!(id = deleted.id, name = %deleted.name, "Registered service deleted");
        let _ = self.events.send(CatalogEvent::Deleted(deleted.clone()));
        Ok(Some(deleted))
    }

    /// Full reload from the backend. The fresh index replaces the live one in
    /// a single swap; on backend failure the previous snapshot is retained.
    pub async fn load(&self) -> Result<usize, SsoError> {
        let _guard = self.reload_lock.lock().await;
        self.load_locked().await
    }

    async fn load_locked(&self) -> Result<usize, SsoError> {
        let definitions = self.registry.load().await?;
        let mut fresh = CatalogIndex::default();
        let mut count = 0usize;
        for service in definitions {
            if fresh.services.contains_key(&service.id) {
                tracing::warn!(
                    id = service.id,
                    name = %service.name,
                    "Duplicate service id during reload; first definition wins"
                );
                continue;
            }
            self.note_id(service.id);
            fresh.insert(service);
            count += 1;
        }
        {
            let mut index = self.index.write().await;
            *index = fresh;
        }
        tracing::info!(count, registry = self.registry.name(), "Service catalog loaded");
        let _ = self.events.send(CatalogEvent::Reloaded(count));
        Ok(count)
    }

    pub async fn get_all_services(&self) -> Vec<RegisteredService> {
        let index = self.index.read().await;
        let mut services: Vec<RegisteredService> = index
            .services
            .values()
            .map(|service| (**service).clone())
            .collect();
        services.sort_by(|a, b| a.evaluation_cmp(b));
        services
    }

    pub async fn get_service(&self, id: u64) -> Option<RegisteredService> {
        let index = self.index.read().await;
        index.services.get(&id).map(|service| (**service).clone())
    }

    pub async fn size(&self) -> usize {
        self.index.read().await.services.len()
    }

    async fn find_in_index(
        &self,
        candidate: &str,
    ) -> Result<Option<Arc<RegisteredService>>, SsoError> {
        let index = self.index.read().await;
        if index.services.is_empty() {
            return Err(SsoError::EmptyCatalog);
        }
        Ok(index.find(candidate))
    }

    /// Apply the matched definition's expiration policy before handing it out.
    async fn enforce_expiration(
        &self,
        service: Arc<RegisteredService>,
    ) -> Result<Option<RegisteredService>, SsoError> {
        if !service.expiration_policy.is_expired() {
            return Ok(Some((*service).clone()));
        }
        if service.expiration_policy.delete_when_expired {
            tracing::info!(
                id = service.id,
                name = %service.name,
                "Registered service expired; deleting"
            );
            self.delete(service.id).await?;
            if service.expiration_policy.notify_when_expired {
                let _ = self.events.send(CatalogEvent::Expired((*service).clone()));
            }
            // Indistinguishable from "no match" for access checks
            Ok(None)
        } else {
            tracing::warn!(
                id = service.id,
                name = %service.name,
                "Registered service is expired but retained by its expiration policy"
            );
            Ok(Some((*service).clone()))
        }
    }

    /// Merge watcher events into the cache: created/modified files re-load
    /// only that unit, a deletion forces a full reload since the dead file's
    /// prior identity is not independently known.
    pub fn spawn_file_watch_loop(
        self: &Arc<Self>,
        registry: Arc<JsonServiceRegistry>,
        mut events: mpsc::Receiver<RegistryEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let _guard = catalog.reload_lock.lock().await;
                match event {
                    RegistryEvent::Created(path) | RegistryEvent::Modified(path) => {
                        if let Some(service) = registry.load_unit(&path).await {
                            catalog.note_id(service.id);
                            {
                                let mut index = catalog.index.write().await;
                                index.insert(service.clone());
                            }
                            tracing::info!(
                                id = service.id,
                                name = %service.name,
                                path = %path.display(),
                                "Merged changed service definition"
                            );
                            let _ = catalog.events.send(CatalogEvent::Saved(service));
                        }
                    }
                    RegistryEvent::Deleted(path) => {
                        registry.forget_unit(&path);
                        if let Err(e) = catalog.load_locked().await {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Reload after deletion failed; keeping previous snapshot"
                            );
                        }
                    }
                }
            }
        })
    }

    /// Scheduled full reload, a consistency backstop independent of the watcher.
    pub fn spawn_periodic_reload(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; the initial load already happened
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = catalog.load().await {
                    tracing::warn!(error = %e, "Scheduled catalog reload failed; keeping previous snapshot");
                }
            }
        })
    }
}

#[async_trait]
impl ServiceLookup for ServiceCatalog {
    async fn find_service_by(
        &self,
        candidate: &str,
    ) -> Result<Option<RegisteredService>, SsoError> {
        match self.find_in_index(candidate).await? {
            None => Ok(None),
            Some(service) => self.enforce_expiration(service).await,
        }
    }
}

/// Several independently-backed catalogs behind one facade. Writes route to
/// the first sub-catalog that supports the object; reads merge across all.
pub struct ChainedServiceCatalog {
    chain: Vec<Arc<ServiceCatalog>>,
}

impl ChainedServiceCatalog {
    pub fn new(chain: Vec<Arc<ServiceCatalog>>) -> Self {
        Self { chain }
    }

    pub async fn save(&self, service: RegisteredService) -> Result<RegisteredService, SsoError> {
        for catalog in &self.chain {
            if catalog.supports_service(&service) {
                return catalog.save(service).await;
            }
        }
        Err(SsoError::Registry(anyhow::anyhow!(
            "no catalog in the chain supports service '{}'",
            service.name
        )))
    }

    pub async fn delete(&self, id: u64) -> Result<Option<RegisteredService>, SsoError> {
        for catalog in &self.chain {
            if let Some(deleted) = catalog.delete(id).await? {
                return Ok(Some(deleted));
            }
        }
        Ok(None)
    }

    pub async fn load(&self) -> Result<usize, SsoError> {
        let mut total = 0;
        for catalog in &self.chain {
            total += catalog.load().await?;
        }
        Ok(total)
    }

    pub async fn get_all_services(&self) -> Vec<RegisteredService> {
        let mut services = Vec::new();
        for catalog in &self.chain {
            services.extend(catalog.get_all_services().await);
        }
        services.sort_by(|a, b| a.evaluation_cmp(b));
        services
    }

    pub async fn size(&self) -> usize {
        let mut total = 0;
        for catalog in &self.chain {
            total += catalog.size().await;
        }
        total
    }
}

#[async_trait]
impl ServiceLookup for ChainedServiceCatalog {
    async fn find_service_by(
        &self,
        candidate: &str,
    ) -> Result<Option<RegisteredService>, SsoError> {
        if self.size().await == 0 {
            return Err(SsoError::EmptyCatalog);
        }
        for catalog in &self.chain {
            if !catalog.supports_id(candidate) {
                continue;
            }
            match catalog.find_service_by(candidate).await {
                Ok(Some(service)) => return Ok(Some(service)),
                Ok(None) | Err(SsoError::EmptyCatalog) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
