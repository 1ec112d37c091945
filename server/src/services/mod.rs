//! Business logic services layer.
//!
//! Thin orchestration facades that coordinate the relational store, the
//! TSDB adapter, the caches, and the scheduler for operations that span
//! more than one of them. Each service focuses on a single domain.

pub mod agent_service;
pub mod monitor_service;

pub use agent_service::AgentService;
pub use monitor_service::{MonitorService, NewMonitor};
