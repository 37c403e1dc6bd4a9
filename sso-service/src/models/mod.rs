pub mod logout;
pub mod principal;
pub mod registered_service;
pub mod ticket;

pub use logout::{FrontChannelCursor, LogoutMessage, LogoutRequest, LogoutStatus};
pub use principal::Principal;
pub use registered_service::{
    AccessStrategy, LogoutType, RegisteredService, ServiceExpirationPolicy, ServiceMatcher,
};
pub use ticket::{
    ProxyGrantingTicket, Service, ServiceGrant, ServiceTicket, Ticket, TicketGrantingTicket,
    TicketPolicy,
};
