use crate::models::{
    FrontChannelCursor, LogoutMessage, LogoutRequest, LogoutStatus, LogoutType, RegisteredService,
};
use crate::services::SsoError;
use crate::services::catalog::ServiceLookup;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Server-to-server delivery of a logout message.
#[async_trait]
pub trait LogoutTransport: Send + Sync {
    /// A non-success response, network error, or timeout is a failure.
    async fn post(&self, url: &str, message: &LogoutMessage) -> Result<(), SsoError>;
}

/// Back-channel transport over HTTP POST with a bounded per-call timeout.
pub struct HttpLogoutTransport {
    client: reqwest::Client,
}

impl HttpLogoutTransport {
    pub fn new(timeout: Duration) -> Result<Self, SsoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SsoError::Internal(anyhow::Error::new(e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LogoutTransport for HttpLogoutTransport {
    async fn post(&self, url: &str, message: &LogoutMessage) -> Result<(), SsoError> {
        let response = self
            .client
            .post(url)
            .form(&[("logoutRequest", message.to_payload())])
            .send()
            .await
            .map_err(|e| SsoError::LogoutDelivery(url.to_string(), e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SsoError::LogoutDelivery(
                url.to_string(),
                format!("status {}", response.status()),
            ))
        }
    }
}

/// Recording transport for tests and dry runs.
#[derive(Default)]
pub struct MockLogoutTransport {
    /// URLs that must fail delivery
    pub failing: Vec<String>,
    pub delivered: DashMap<String, LogoutMessage>,
}

impl MockLogoutTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(urls: Vec<String>) -> Self {
        Self {
            failing: urls,
            delivered: DashMap::new(),
        }
    }
}

#[async_trait]
impl LogoutTransport for MockLogoutTransport {
    async fn post(&self, url: &str, message: &LogoutMessage) -> Result<(), SsoError> {
        if self.failing.iter().any(|failing| failing == url) {
            return Err(SsoError::LogoutDelivery(
                url.to_string(),
                "mock failure".to_string(),
            ));
        }
        self.delivered.insert(url.to_string(), message.clone());
        Ok(())
    }
}

/// Where the browser goes next during front-channel logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontChannelStep {
    Redirect { url: String, message: String },
    Finished,
}

/// Outcome of driving a logout plan: the per-service statuses after the
/// back-channel phase, plus a session id when front-channel work remains.
#[derive(Debug, Clone)]
pub struct SloOutcome {
    pub requests: Vec<LogoutRequest>,
    pub front_channel_session: Option<String>,
}

struct FrontChannelSession {
    cursor: FrontChannelCursor,
    requests: Vec<LogoutRequest>,
    /// logout URL per request, resolved up front so stepping never touches
    /// the catalog
    targets: Vec<Option<ResolvedTarget>>,
    created_at: Instant,
}

#[derive(Clone)]
struct ResolvedTarget {
    logout_type: LogoutType,
    logout_url: String,
}

/// Drives single logout: synchronous best-effort back-channel calls at
/// destruction time, then a resumable one-redirect-per-step front-channel
/// walk. Never fatal to the destruction caller.
pub struct LogoutCoordinator {
    lookup: Arc<dyn ServiceLookup>,
    transport: Arc<dyn LogoutTransport>,
    sessions: DashMap<String, FrontChannelSession>,
    /// Abandoned walks are forgotten after this long
    session_ttl: Duration,
}

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

impl LogoutCoordinator {
    pub fn new(lookup: Arc<dyn ServiceLookup>, transport: Arc<dyn LogoutTransport>) -> Self {
        Self::with_session_ttl(lookup, transport, DEFAULT_SESSION_TTL)
    }

    pub fn with_session_ttl(
        lookup: Arc<dyn ServiceLookup>,
        transport: Arc<dyn LogoutTransport>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            lookup,
            transport,
            sessions: DashMap::new(),
            session_ttl,
        }
    }

    async fn resolve_target(&self, request: &LogoutRequest) -> Option<ResolvedTarget> {
        let registered: RegisteredService =
            match self.lookup.find_service_by(&request.service.url).await {
                Ok(Some(registered)) => registered,
                Ok(None) | Err(SsoError::EmptyCatalog) => {
                    tracing::warn!(
                        service = %request.service.url,
                        "Service no longer registered; skipping logout delivery"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        service = %request.service.url,
                        error = %e,
                        "Catalog lookup failed during logout"
                    );
                    return None;
                }
            };
        if registered.logout_type == LogoutType::None {
            return None;
        }
        // Default the callback to the service URL itself when no explicit
        // logout endpoint is registered
        let logout_url = registered
            .logout_url
            .unwrap_or_else(|| request.service.url.clone());
        Some(ResolvedTarget {
            logout_type: registered.logout_type,
            logout_url,
        })
    }

    /// Run the back-channel phase over a freshly built logout plan and stash
    /// any front-channel remainder behind a session cursor. No catalog or
    /// store lock is held across the blocking delivery calls.
    pub async fn handle(&self, mut requests: Vec<LogoutRequest>) -> SloOutcome {
        let mut targets = Vec::with_capacity(requests.len());
        for request in &requests {
            targets.push(self.resolve_target(request).await);
        }

        let mut front_channel_pending = false;
        for (request, target) in requests.iter_mut().zip(&targets) {
            let Some(target) = target else {
                continue;
            };
            match target.logout_type {
                LogoutType::BackChannel => {
                    let message = LogoutMessage::for_ticket(request.ticket_id.clone());
                    match self.transport.post(&target.logout_url, &message).await {
                        Ok(()) => {
                            tracing::info!(
                                service = %request.service.url,
                                url = %target.logout_url,
                                "Back-channel logout delivered"
                            );
                            request.mark(LogoutStatus::Success);
                        }
                        Err(e) => {
                            // Best effort: record and keep going
                            tracing::warn!(
                                service = %request.service.url,
                                url = %target.logout_url,
                                error = %e,
                                "Back-channel logout failed"
                            );
                            request.mark(LogoutStatus::Failure);
                        }
                    }
                }
                LogoutType::FrontChannel => front_channel_pending = true,
                LogoutType::None => {}
            }
        }

        let front_channel_session = if front_channel_pending {
            let cursor = FrontChannelCursor::new();
            let session_id = cursor.session_id.clone();
            self.sessions.insert(
                session_id.clone(),
                FrontChannelSession {
                    cursor,
                    requests: requests.clone(),
                    targets,
                    created_at: Instant::now(),
                },
            );
            Some(session_id)
        } else {
            None
        };

        SloOutcome {
            requests,
            front_channel_session,
        }
    }

    /// Advance a front-channel session by one service. Each call yields the
    /// next redirect exactly once; after every front-channel request has been
    /// visited the session is finished and forgotten.
    pub fn next_front_channel(&self, session_id: &str) -> FrontChannelStep {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return FrontChannelStep::Finished;
        };
        if session.created_at.elapsed() > self.session_ttl {
            tracing::info!(session_id, "Front-channel logout session expired");
            drop(session);
            self.sessions.remove(session_id);
            return FrontChannelStep::Finished;
        }

        let start = session.cursor.next_index;
        for index in start..session.requests.len() {
            let target = match &session.targets[index] {
                Some(target) if target.logout_type == LogoutType::FrontChannel => target.clone(),
                _ => continue,
            };
            if session.requests[index].status != LogoutStatus::NotAttempted {
                continue;
            }
            // Marked optimistically; the browser may never come back and
            // delivery cannot be confirmed server-side
            session.requests[index].mark(LogoutStatus::Success);
            session.cursor.next_index = index + 1;
            let message = LogoutMessage::for_ticket(session.requests[index].ticket_id.clone());
            tracing::info!(
                session_id,
                service = %session.requests[index].service.url,
                url = %target.logout_url,
                "Front-channel logout redirect issued"
            );
            return FrontChannelStep::Redirect {
                url: target.logout_url,
                message: message.to_url_param(),
            };
        }

        drop(session);
        self.sessions.remove(session_id);
        FrontChannelStep::Finished
    }

    /// Snapshot of a session's per-service statuses, for auditing.
    pub fn session_requests(&self, session_id: &str) -> Option<Vec<LogoutRequest>> {
        self.sessions
            .get(session_id)
            .map(|session| session.requests.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegisteredService, Service};
    use crate::services::catalog::ServiceCatalog;
    use crate::services::registry::InMemoryServiceRegistry;

    fn registered(
        id: u64,
        name: &str,
        service_id: &str,
        logout_type: LogoutType,
    ) -> RegisteredService {
        let mut service = RegisteredService::new(name, service_id);
        service.id = id;
        service.logout_type = logout_type;
        service.logout_url = Some(format!("{service_id}/logout"));
        service
    }

    async fn coordinator_with(
        services: Vec<RegisteredService>,
        transport: Arc<MockLogoutTransport>,
    ) -> LogoutCoordinator {
        let registry = Arc::new(InMemoryServiceRegistry::with_services(services));
        let catalog = Arc::new(ServiceCatalog::new(registry));
        catalog.load().await.unwrap();
        LogoutCoordinator::new(catalog, transport)
    }

    fn request(ticket_id: &str, url: &str) -> LogoutRequest {
        LogoutRequest::new(ticket_id, Service::new(url))
    }

    #[tokio::test]
    async fn test_back_channel_failure_does_not_block_others() {
        let transport = Arc::new(MockLogoutTransport::failing_for(vec![
            "https://down.example.org/logout".to_string(),
        ]));
        let coordinator = coordinator_with(
            vec![
                registered(1, "down", "https://down.example.org", LogoutType::BackChannel),
                registered(2, "up", "https://up.example.org", LogoutType::BackChannel),
            ],
            Arc::clone(&transport),
        )
        .await;

        let outcome = coordinator
            .handle(vec![
                request("ST-1-a", "https://down.example.org"),
                request("ST-2-b", "https://up.example.org"),
            ])
            .await;

        assert_eq!(outcome.requests[0].status, LogoutStatus::Failure);
        assert_eq!(outcome.requests[1].status, LogoutStatus::Success);
        assert!(outcome.front_channel_session.is_none());
        assert!(transport.delivered.contains_key("https://up.example.org/logout"));

        let delivered = transport
            .delivered
            .get("https://up.example.org/logout")
            .unwrap();
        assert_eq!(delivered.session_ticket, "ST-2-b");
    }

    #[tokio::test]
    async fn test_front_channel_visits_each_service_once_then_finishes() {
        let transport = Arc::new(MockLogoutTransport::new());
        let coordinator = coordinator_with(
            vec![
                registered(1, "a", "https://a.example.org", LogoutType::FrontChannel),
                registered(2, "b", "https://b.example.org", LogoutType::BackChannel),
                registered(3, "c", "https://c.example.org", LogoutType::FrontChannel),
            ],
            transport,
        )
        .await;

        let outcome = coordinator
            .handle(vec![
                request("ST-1-a", "https://a.example.org"),
                request("ST-2-b", "https://b.example.org"),
                request("ST-3-c", "https://c.example.org"),
            ])
            .await;
        let session_id = outcome.front_channel_session.unwrap();

        let mut urls = Vec::new();
        loop {
            match coordinator.next_front_channel(&session_id) {
                FrontChannelStep::Redirect { url, message } => {
                    assert!(!message.is_empty());
                    urls.push(url);
                }
                FrontChannelStep::Finished => break,
            }
        }
        assert_eq!(
            urls,
            vec![
                "https://a.example.org/logout".to_string(),
                "https://c.example.org/logout".to_string(),
            ]
        );

        // Finished sessions stay finished
        assert_eq!(
            coordinator.next_front_channel(&session_id),
            FrontChannelStep::Finished
        );
        assert_eq!(
            coordinator.next_front_channel("no-such-session"),
            FrontChannelStep::Finished
        );
    }

    #[tokio::test]
    async fn test_expired_front_channel_session_finishes() {
        let transport = Arc::new(MockLogoutTransport::new());
        let registry = Arc::new(InMemoryServiceRegistry::with_services(vec![registered(
            1,
            "a",
            "https://a.example.org",
            LogoutType::FrontChannel,
        )]));
        let catalog = Arc::new(ServiceCatalog::new(registry));
        catalog.load().await.unwrap();
        let coordinator =
            LogoutCoordinator::with_session_ttl(catalog, transport, Duration::from_millis(10));

        let outcome = coordinator
            .handle(vec![request("ST-1-a", "https://a.example.org")])
            .await;
        let session_id = outcome.front_channel_session.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            coordinator.next_front_channel(&session_id),
            FrontChannelStep::Finished
        );
        assert!(coordinator.session_requests(&session_id).is_none());
    }

    #[tokio::test]
    async fn test_logout_type_none_is_skipped() {
        let transport = Arc::new(MockLogoutTransport::new());
        let coordinator = coordinator_with(
            vec![registered(1, "quiet", "https://quiet.example.org", LogoutType::None)],
            Arc::clone(&transport),
        )
        .await;

        let outcome = coordinator
            .handle(vec![request("ST-1-a", "https://quiet.example.org")])
            .await;
        assert_eq!(outcome.requests[0].status, LogoutStatus::NotAttempted);
        assert!(outcome.front_channel_session.is_none());
        assert!(transport.delivered.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_service_is_skipped_not_fatal() {
        let transport = Arc::new(MockLogoutTransport::new());
        let coordinator = coordinator_with(
            vec![registered(1, "app", "https://app.example.org", LogoutType::BackChannel)],
            Arc::clone(&transport),
        )
        .await;

        let outcome = coordinator
            .handle(vec![
                request("ST-1-a", "https://gone.example.org"),
                request("ST-2-b", "https://app.example.org"),
            ])
            .await;
        assert_eq!(outcome.requests[0].status, LogoutStatus::NotAttempted);
        assert_eq!(outcome.requests[1].status, LogoutStatus::Success);
    }
}
