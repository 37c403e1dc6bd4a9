use crate::models::Ticket;
use async_trait::async_trait;
use dashmap::DashMap;

/// Keyed ticket storage with atomic removal. `remove` is the primitive that
/// makes service-ticket consumption single-use under concurrency: exactly one
/// caller gets the ticket back.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn put(&self, ticket: Ticket);

    async fn get(&self, id: &str) -> Option<Ticket>;

    /// Atomically take a ticket out of the store.
    async fn remove(&self, id: &str) -> Option<Ticket>;

    async fn get_all(&self) -> Vec<Ticket>;
}

/// Process-local ticket store over a concurrent map.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: DashMap<String, Ticket>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn put(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id().to_string(), ticket);
    }

    async fn get(&self, id: &str) -> Option<Ticket> {
        self.tickets.get(id).map(|entry| entry.value().clone())
    }

    async fn remove(&self, id: &str) -> Option<Ticket> {
        self.tickets.remove(id).map(|(_, ticket)| ticket)
    }

    async fn get_all(&self) -> Vec<Ticket> {
        self.tickets
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Principal, TicketGrantingTicket};

    #[tokio::test]
    async fn test_remove_is_a_take() {
        let store = InMemoryTicketStore::new();
        let tgt =
            TicketGrantingTicket::new("TGT-1-abc".to_string(), Principal::new("alice"), None);
        store.put(Ticket::TicketGranting(tgt)).await;

        assert!(store.get("TGT-1-abc").await.is_some());
        assert!(store.remove("TGT-1-abc").await.is_some());
        assert!(store.remove("TGT-1-abc").await.is_none());
        assert!(store.get("TGT-1-abc").await.is_none());
    }
}
