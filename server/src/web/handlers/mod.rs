//! HTTP request handlers for the dashboard API.
//!
//! This module is organized by domain:
//! - `common` - shared response envelope, pagination, and time-range parsing
//! - `probes` - probe (agent) list/detail/delete, metrics, ssh/tamper config, traffic policy
//! - `monitors` - synthetic-monitor CRUD, overview, and history
//! - `alerts` - alert record list/clear-all and alert-rule configuration
//! - `tokens` - API token CRUD

pub mod alerts;
pub mod common;
pub mod monitors;
pub mod probes;
pub mod tokens;

pub use alerts::*;
pub use monitors::*;
pub use probes::*;
pub use tokens::*;
