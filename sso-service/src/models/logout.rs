use crate::models::ticket::Service;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Delivery status of one single-logout attempt. Transitions only forward,
/// never back to `NotAttempted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogoutStatus {
    NotAttempted,
    Success,
    Failure,
}

/// One entry in a logout plan: a service that received at least one ticket
/// under the ticket-granting ticket being destroyed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// The service ticket the target service originally received
    pub ticket_id: String,
    pub service: Service,
    pub status: LogoutStatus,
}

impl LogoutRequest {
    pub fn new(ticket_id: impl Into<String>, service: Service) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            service,
            status: LogoutStatus::NotAttempted,
        }
    }

    /// Record an outcome. A request that has already been attempted keeps its
    /// first outcome.
    pub fn mark(&mut self, status: LogoutStatus) {
        if self.status == LogoutStatus::NotAttempted {
            self.status = status;
        }
    }
}

/// Opaque message delivered to a service so it can tear down its own session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutMessage {
    pub id: String,
    /// The now-dead ticket the receiving service knows the session by
    pub session_ticket: String,
    pub issued_at: DateTime<Utc>,
}

impl LogoutMessage {
    pub fn for_ticket(ticket_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_ticket: ticket_id.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// URL-safe encoding for front-channel redirects.
    pub fn to_url_param(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.to_payload())
    }
}

/// Persisted position of a resumable front-channel logout walk. Each browser
/// round-trip advances the cursor past exactly one service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FrontChannelCursor {
    pub session_id: String,
    pub next_index: usize,
}

impl FrontChannelCursor {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            next_index: 0,
        }
    }
}

impl Default for FrontChannelCursor {
    fn default() -> Self {
        Self::new()
    }
}
