pub mod logout;
pub mod metrics;
pub mod services;
pub mod tickets;
pub mod validate;
