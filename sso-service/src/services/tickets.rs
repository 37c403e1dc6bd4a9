use crate::models::ticket::{PGT_PREFIX, ST_PREFIX, TGT_PREFIX};
use crate::models::{
    LogoutRequest, Principal, ProxyGrantingTicket, Service, ServiceGrant, ServiceTicket, Ticket,
    TicketGrantingTicket, TicketPolicy,
};
use crate::services::SsoError;
use crate::services::authenticator::{Authenticator, Credential};
use crate::services::catalog::ServiceLookup;
use crate::services::ticket_store::TicketStore;
use dashmap::DashMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::Mutex;

/// Opaque ticket ids: `{prefix}-{sequence}-{random}`. The sequence makes ids
/// unique within the process, the random tail makes them unguessable.
pub struct TicketIdGenerator {
    sequence: AtomicU64,
}

impl TicketIdGenerator {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next(&self, prefix: &str) -> String {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        format!("{prefix}-{sequence}-{suffix}")
    }
}

impl Default for TicketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state machine for ticket-granting, service, and proxy-granting
/// tickets. Consults the service catalog for every service-bound decision.
pub struct TicketAuthority {
    store: Arc<dyn TicketStore>,
    catalog: Arc<dyn ServiceLookup>,
    authenticator: Arc<dyn Authenticator>,
    policy: TicketPolicy,
    ids: TicketIdGenerator,
    /// Per-TGT mutation locks. Grants under one TGT are totally ordered by
    /// issuance, which is what "first use" checks rely on; unrelated TGTs
    /// proceed in parallel.
    tgt_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TicketAuthority {
    pub fn new(
        store: Arc<dyn TicketStore>,
        catalog: Arc<dyn ServiceLookup>,
        authenticator: Arc<dyn Authenticator>,
        policy: TicketPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            authenticator,
            policy,
            ids: TicketIdGenerator::new(),
            tgt_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, tgt_id: &str) -> Arc<Mutex<()>> {
        self.tgt_locks
            .entry(tgt_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch a TGT and verify that it, and every proxying ancestor above it,
    /// is still live. Checking the whole chain is what makes cascade destroy
    /// observable even before every descendant key has been rewritten.
    async fn live_tgt(&self, tgt_id: &str) -> Result<TicketGrantingTicket, SsoError> {
        let ticket = self
            .store
            .get(tgt_id)
            .await
            .ok_or_else(|| SsoError::InvalidTicket(tgt_id.to_string()))?;
        let Ticket::TicketGranting(tgt) = ticket else {
            return Err(SsoError::InvalidTicket(tgt_id.to_string()));
        };
        if tgt.is_expired(&self.policy) {
            return Err(SsoError::InvalidTicket(tgt_id.to_string()));
        }

        let mut proxied_by = tgt.proxied_by.clone();
        let mut seen = HashSet::new();
        while let Some(pgt_id) = proxied_by {
            if !seen.insert(pgt_id.clone()) {
                return Err(SsoError::InvalidTicket(tgt_id.to_string()));
            }
            let Some(Ticket::ProxyGranting(pgt)) = self.store.get(&pgt_id).await else {
                return Err(SsoError::InvalidTicket(tgt_id.to_string()));
            };
            if pgt.is_expired(&self.policy) {
                return Err(SsoError::InvalidTicket(tgt_id.to_string()));
            }
            let Some(Ticket::TicketGranting(parent)) = self.store.get(&pgt.tgt_id).await else {
                return Err(SsoError::InvalidTicket(tgt_id.to_string()));
            };
            if parent.is_expired(&self.policy) {
                return Err(SsoError::InvalidTicket(tgt_id.to_string()));
            }
            proxied_by = parent.proxied_by;
        }
        Ok(tgt)
    }

    /// Authenticate and mint a fresh SSO session.
    pub async fn create_ticket_granting_ticket(
        &self,
        credential: &Credential,
    ) -> Result<TicketGrantingTicket, SsoError> {
        let principal = self.authenticator.authenticate(credential).await?;
        let tgt = TicketGrantingTicket::new(self.ids.next(TGT_PREFIX), principal, None);
        self.store.put(Ticket::TicketGranting(tgt.clone())).await;
        tracing::info!(tgt_id = %tgt.id, principal = %tgt.principal.id, "Ticket-granting ticket created");
        Ok(tgt)
    }

    /// Issue a service ticket under an existing TGT. `renew` demands fresh
    /// credentials for the same identity; a mismatch or rejection destroys the
    /// TGT so a stale session cannot be ridden past a renew gate.
    pub async fn grant_service_ticket(
        &self,
        tgt_id: &str,
        service: Service,
        renew: bool,
        credential: Option<&Credential>,
    ) -> Result<ServiceTicket, SsoError> {
        let lock = self.lock_for(tgt_id);
        let _guard = lock.lock().await;

        let mut tgt = self.live_tgt(tgt_id).await?;

        let registered = self
            .catalog
            .find_service_by(&service.url)
            .await?
            .ok_or_else(|| SsoError::ServiceNotMatched(service.url.clone()))?;
        if !registered.access_strategy.authorized_for(&tgt.principal) {
            tracing::warn!(
                tgt_id,
                service = %service.url,
                registered = %registered.name,
                "Service access denied by access strategy"
            );
            return Err(SsoError::ServiceAccessDenied(registered.name.clone()));
        }

        if renew {
            // No credentials at all is a malformed request, not a failed
            // authentication; the TGT survives it.
            let Some(credential) = credential else {
                return Err(SsoError::TicketCreation(
                    "renew requires credentials".to_string(),
                ));
            };
            let fresh = match self.authenticator.authenticate(credential).await {
                Ok(principal) => principal,
                Err(_) => {
                    drop(_guard);
                    self.destroy_ticket_granting_ticket(tgt_id).await?;
                    return Err(SsoError::TicketCreation(
                        "credentials rejected during renew".to_string(),
                    ));
                }
            };
            if fresh.id != tgt.principal.id {
                drop(_guard);
                self.destroy_ticket_granting_ticket(tgt_id).await?;
                return Err(SsoError::TicketCreation(format!(
                    "renew presented a different identity ({} != {})",
                    fresh.id, tgt.principal.id
                )));
            }
        }

        // A service that opts out of SSO accepts only the session's first use,
        // or a grant backed by fresh credentials.
        if !registered.access_strategy.sso_enabled && !renew && tgt.use_count > 0 {
            return Err(SsoError::UnauthorizedSsoService(registered.name.clone()));
        }

        let st = ServiceTicket::new(
            self.ids.next(ST_PREFIX),
            service.clone(),
            tgt_id.to_string(),
            renew,
        );
        self.store.put(Ticket::Service(st.clone())).await;
        tgt.record_grant(st.id.clone(), service);
        self.store.put(Ticket::TicketGranting(tgt)).await;
        tracing::info!(tgt_id, st_id = %st.id, service = %st.service, "Service ticket granted");
        Ok(st)
    }

    /// Validate and consume a service ticket, returning the authenticated
    /// principal. Exactly one of any number of concurrent validations of the
    /// same ticket succeeds; the losers observe an already-taken or
    /// already-consumed ticket.
    pub async fn validate_service_ticket(
        &self,
        st_id: &str,
        service: &Service,
        renew_required: bool,
    ) -> Result<Principal, SsoError> {
        // An id naming some other kind of ticket must not be disturbed:
        // removing a TGT here, even briefly, would make it invisible to
        // concurrent grants. Reject on a read before taking anything out.
        match self.store.get(st_id).await {
            Some(Ticket::Service(_)) => {}
            _ => return Err(SsoError::InvalidTicket(st_id.to_string())),
        }

        // Atomic take: the sole winner of a validation race holds the ticket.
        let ticket = self
            .store
            .remove(st_id)
            .await
            .ok_or_else(|| SsoError::InvalidTicket(st_id.to_string()))?;
        let mut st = match ticket {
            Ticket::Service(st) => st,
            other => {
                // The id changed kind between the read and the take; put it
                // back untouched.
                self.store.put(other).await;
                return Err(SsoError::InvalidTicket(st_id.to_string()));
            }
        };

        let verdict = self.check_service_ticket(&st, service, renew_required).await;
        match verdict {
            Ok(principal) => {
                // Reinsert consumed so a replay is told apart from "never existed"
                st.consumed = true;
                self.store.put(Ticket::Service(st)).await;
                tracing::info!(st_id, service = %service.url, "Service ticket validated");
                Ok(principal)
            }
            Err(e) => {
                // Failed validation does not consume the ticket
                self.store.put(Ticket::Service(st)).await;
                Err(e)
            }
        }
    }

    async fn check_service_ticket(
        &self,
        st: &ServiceTicket,
        service: &Service,
        renew_required: bool,
    ) -> Result<Principal, SsoError> {
        if st.consumed || st.is_expired(&self.policy) {
            return Err(SsoError::InvalidTicket(st.id.clone()));
        }
        // Exact equality by protocol; catalog pattern matching does not apply
        if st.service != *service {
            return Err(SsoError::InvalidTicket(st.id.clone()));
        }
        if renew_required && !st.renew {
            return Err(SsoError::InvalidTicket(st.id.clone()));
        }
        let tgt = self.live_tgt(&st.tgt_id).await?;
        Ok(tgt.principal)
    }

    /// Mint a proxy-granting ticket under a live TGT, typically after a
    /// successful validation that carried a proxy callback.
    pub async fn grant_proxy_granting_ticket(
        &self,
        tgt_id: &str,
    ) -> Result<ProxyGrantingTicket, SsoError> {
        let lock = self.lock_for(tgt_id);
        let _guard = lock.lock().await;

        let mut tgt = self.live_tgt(tgt_id).await?;
        let pgt = ProxyGrantingTicket::new(
            self.ids.next(PGT_PREFIX),
            tgt_id.to_string(),
            tgt.principal.clone(),
        );
        self.store.put(Ticket::ProxyGranting(pgt.clone())).await;
        tgt.children.push(pgt.id.clone());
        self.store.put(Ticket::TicketGranting(tgt)).await;
        tracing::info!(tgt_id, pgt_id = %pgt.id, "Proxy-granting ticket issued");
        Ok(pgt)
    }

    /// Mint a proxy TGT from a PGT so the holding service can obtain service
    /// tickets toward downstream services on the user's behalf.
    pub async fn create_proxy_ticket_granting_ticket(
        &self,
        pgt_id: &str,
    ) -> Result<TicketGrantingTicket, SsoError> {
        let Some(Ticket::ProxyGranting(mut pgt)) = self.store.get(pgt_id).await else {
            return Err(SsoError::InvalidTicket(pgt_id.to_string()));
        };
        if pgt.is_expired(&self.policy) {
            return Err(SsoError::InvalidTicket(pgt_id.to_string()));
        }
        // The owning chain above the PGT must itself be live
        self.live_tgt(&pgt.tgt_id).await?;

        let tgt = TicketGrantingTicket::new(
            self.ids.next(TGT_PREFIX),
            pgt.principal.clone(),
            Some(pgt_id.to_string()),
        );
        self.store.put(Ticket::TicketGranting(tgt.clone())).await;
        pgt.children.push(tgt.id.clone());
        self.store.put(Ticket::ProxyGranting(pgt)).await;
        tracing::info!(pgt_id, tgt_id = %tgt.id, "Proxy ticket-granting ticket created");
        Ok(tgt)
    }

    /// Destroy a TGT and its whole ownership subtree, returning the logout
    /// plan: one not-attempted request per distinct service, in issuance
    /// order. Idempotent; an absent or already-expired TGT yields an empty
    /// plan.
    pub async fn destroy_ticket_granting_ticket(
        &self,
        tgt_id: &str,
    ) -> Result<Vec<LogoutRequest>, SsoError> {
        let lock = self.lock_for(tgt_id);
        let _guard = lock.lock().await;

        let Some(Ticket::TicketGranting(mut tgt)) = self.store.get(tgt_id).await else {
            return Ok(Vec::new());
        };
        if tgt.expired {
            return Ok(Vec::new());
        }

        // The parent is marked dead before any child so that ancestry-checking
        // validation can never succeed mid-cascade.
        tgt.expired = true;
        self.store.put(Ticket::TicketGranting(tgt.clone())).await;

        let mut grants: Vec<ServiceGrant> = tgt.grants.clone();
        let mut queue: VecDeque<String> = tgt.children.iter().cloned().collect();
        let mut seen: HashSet<String> = queue.iter().cloned().collect();
        seen.insert(tgt.id.clone());

        while let Some(child_id) = queue.pop_front() {
            let Some(mut child) = self.store.get(&child_id).await else {
                continue;
            };
            match &child {
                Ticket::TicketGranting(descendant) => {
                    grants.extend(descendant.grants.iter().cloned());
                    for grandchild in &descendant.children {
                        if seen.insert(grandchild.clone()) {
                            queue.push_back(grandchild.clone());
                        }
                    }
                }
                Ticket::ProxyGranting(descendant) => {
                    for grandchild in &descendant.children {
                        if seen.insert(grandchild.clone()) {
                            queue.push_back(grandchild.clone());
                        }
                    }
                }
                Ticket::Service(_) => {}
            }
            child.mark_expired();
            self.store.put(child).await;
        }

        // One request per distinct service, keyed by URL, keeping the first
        // granted ticket's id and the issuance order.
        let mut plan: Vec<LogoutRequest> = Vec::new();
        let mut planned: HashSet<String> = HashSet::new();
        for grant in grants {
            if planned.insert(grant.service.url.clone()) {
                plan.push(LogoutRequest::new(grant.ticket_id, grant.service));
            }
        }

        self.tgt_locks.remove(tgt_id);
        tracing::info!(
            tgt_id,
            services = plan.len(),
            "Ticket-granting ticket destroyed"
        );
        Ok(plan)
    }

    pub fn policy(&self) -> &TicketPolicy {
        &self.policy
    }
}
