//! Port traits implemented by the adapters.

pub mod config_port;
pub mod quote_port;
pub mod store_port;
