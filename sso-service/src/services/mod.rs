pub mod authenticator;
pub mod catalog;
pub mod error;
pub mod logout;
pub mod registry;
pub mod ticket_store;
pub mod tickets;

pub use authenticator::{Authenticator, Credential, StaticAuthenticator};
pub use catalog::{
    CatalogEvent, CatalogFilter, ChainedServiceCatalog, ServiceCatalog, ServiceLookup,
};
pub use error::SsoError;
pub use logout::{
    FrontChannelStep, HttpLogoutTransport, LogoutCoordinator, LogoutTransport,
    MockLogoutTransport, SloOutcome,
};
pub use registry::{InMemoryServiceRegistry, ServiceRegistry};
pub use registry::file::JsonServiceRegistry;
pub use registry::watcher::{RegistryEvent, RegistryWatcher};
pub use ticket_store::{InMemoryTicketStore, TicketStore};
pub use tickets::{TicketAuthority, TicketIdGenerator};
