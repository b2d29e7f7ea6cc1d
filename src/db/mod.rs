//! Database module for homewatch.
//!
//! SQLite storage for the service registry and the uptime history, plus the
//! traits the health engine uses to reach them.

mod history;
mod models;
mod ports;
mod store;

pub use history::*;
pub use models::*;
pub use ports::*;
pub use store::*;
