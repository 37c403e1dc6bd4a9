use crate::models::principal::Principal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

pub const TGT_PREFIX: &str = "TGT";
pub const ST_PREFIX: &str = "ST";
pub const PGT_PREFIX: &str = "PGT";

/// A service as presented by an inbound request: the candidate URL tickets
/// are bound to and the catalog matches against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Service {
    pub url: String,
}

impl Service {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Time-based expiration knobs for the three ticket kinds.
#[derive(Debug, Clone, Copy)]
pub struct TicketPolicy {
    /// Hard lifetime of a ticket-granting ticket
    pub tgt_max_lifetime: Duration,
    /// Sliding idle window of a ticket-granting ticket
    pub tgt_idle_timeout: Duration,
    /// Validation window of a service ticket
    pub st_time_to_live: Duration,
    /// Hard lifetime of a proxy-granting ticket
    pub pgt_max_lifetime: Duration,
}

impl Default for TicketPolicy {
    fn default() -> Self {
        Self {
            tgt_max_lifetime: Duration::hours(8),
            tgt_idle_timeout: Duration::hours(2),
            st_time_to_live: Duration::seconds(10),
            pgt_max_lifetime: Duration::hours(8),
        }
    }
}

/// One service ticket issued under a ticket-granting ticket, kept in issuance
/// order for the logout plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGrant {
    pub ticket_id: String,
    pub service: Service,
    pub granted_at: DateTime<Utc>,
}

/// Proof of a completed SSO login. Owns its child service and proxy-granting
/// tickets; destroying it invalidates the whole subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGrantingTicket {
    pub id: String,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub use_count: u64,
    pub expired: bool,
    /// Set when this TGT was obtained through proxy authentication; lookup
    /// only, the proxying PGT does not own this TGT.
    pub proxied_by: Option<String>,
    pub grants: Vec<ServiceGrant>,
    pub children: Vec<String>,
}

impl TicketGrantingTicket {
    pub fn new(id: String, principal: Principal, proxied_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            principal,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            expired: false,
            proxied_by,
            grants: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn record_grant(&mut self, ticket_id: String, service: Service) {
        self.use_count += 1;
        self.last_used_at = Utc::now();
        self.children.push(ticket_id.clone());
        self.grants.push(ServiceGrant {
            ticket_id,
            service,
            granted_at: self.last_used_at,
        });
    }

    pub fn is_expired(&self, policy: &TicketPolicy) -> bool {
        if self.expired {
            return true;
        }
        let now = Utc::now();
        now - self.created_at >= policy.tgt_max_lifetime
            || now - self.last_used_at >= policy.tgt_idle_timeout
    }
}

/// Single-use proof presented to one specific service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTicket {
    pub id: String,
    pub service: Service,
    /// Parent ticket-granting ticket; lookup only
    pub tgt_id: String,
    /// True when the grant that minted this ticket presented fresh credentials
    pub renew: bool,
    pub consumed: bool,
    pub expired: bool,
    pub created_at: DateTime<Utc>,
}

impl ServiceTicket {
    pub fn new(id: String, service: Service, tgt_id: String, renew: bool) -> Self {
        Self {
            id,
            service,
            tgt_id,
            renew,
            consumed: false,
            expired: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, policy: &TicketPolicy) -> bool {
        self.expired || Utc::now() - self.created_at >= policy.st_time_to_live
    }
}

/// Lets a service request tickets on behalf of the user toward downstream
/// services. Child of a TGT; owns the proxy TGTs minted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyGrantingTicket {
    pub id: String,
    /// Parent ticket-granting ticket; lookup only
    pub tgt_id: String,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub expired: bool,
    pub children: Vec<String>,
}

impl ProxyGrantingTicket {
    pub fn new(id: String, tgt_id: String, principal: Principal) -> Self {
        Self {
            id,
            tgt_id,
            principal,
            created_at: Utc::now(),
            expired: false,
            children: Vec::new(),
        }
    }

    pub fn is_expired(&self, policy: &TicketPolicy) -> bool {
        self.expired || Utc::now() - self.created_at >= policy.pgt_max_lifetime
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Ticket {
    TicketGranting(TicketGrantingTicket),
    Service(ServiceTicket),
    ProxyGranting(ProxyGrantingTicket),
}

impl Ticket {
    pub fn id(&self) -> &str {
        match self {
            Ticket::TicketGranting(tgt) => &tgt.id,
            Ticket::Service(st) => &st.id,
            Ticket::ProxyGranting(pgt) => &pgt.id,
        }
    }

    /// Expiration is monotonic: once marked, a ticket never becomes live again.
    pub fn mark_expired(&mut self) {
        match self {
            Ticket::TicketGranting(tgt) => tgt.expired = true,
            Ticket::Service(st) => st.expired = true,
            Ticket::ProxyGranting(pgt) => pgt.expired = true,
        }
    }

    pub fn is_marked_expired(&self) -> bool {
        match self {
            Ticket::TicketGranting(tgt) => tgt.expired,
            Ticket::Service(st) => st.expired,
            Ticket::ProxyGranting(pgt) => pgt.expired,
        }
    }
}
