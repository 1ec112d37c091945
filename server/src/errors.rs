//! Custom error types for the fleet monitoring server core.
//!
//! Provides structured error handling with context for different failure
//! scenarios: validation errors are returned to the caller with no retry,
//! not-found is distinguished from other failures, transient I/O is logged
//! with context and retried on the next tick, partial query failures
//! degrade rather than fail the whole request, and fatal startup errors
//! propagate immediately.

use std::fmt;

/// Top-level error type for the server core.
#[derive(Debug)]
pub enum FleetError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Time-series database adapter errors
    Tsdb(TsdbError),

    /// Relational store errors
    Database(DatabaseError),

    /// Connection registry errors
    Registry(RegistryError),

    /// Monitor scheduler / config fan-out errors
    Monitor(MonitorError),

    /// Alert engine errors
    Alert(AlertError),

    /// Traffic accounter errors
    Traffic(TrafficError),

    /// Other errors with context
    Other(String),
}

#[derive(Debug)]
pub enum ConfigError {
    LoadFailed { path: String, reason: String },
    InvalidValue { field: String, reason: String },
    MissingRequired { field: String },
    ParseError { reason: String },
}

#[derive(Debug)]
pub enum TsdbError {
    ConnectionFailed { reason: String },
    Timeout { operation: String },
    InvalidResponse { reason: String },
    QueryFailed { query: String, reason: String },
}

#[derive(Debug)]
pub enum DatabaseError {
    ConnectionFailed { reason: String },
    QueryFailed { query: String, reason: String },
    SerializationError { reason: String },
}

#[derive(Debug)]
pub enum RegistryError {
    NoSuchAgent { agent_id: String },
    TransportError { agent_id: String, reason: String },
}

#[derive(Debug)]
pub enum MonitorError {
    NotFound { monitor_id: String },
    InvalidInterval { interval: i64 },
    ScheduleFailed { monitor_id: String, reason: String },
}

#[derive(Debug)]
pub enum AlertError {
    RecordPersistFailed { key: String, reason: String },
    StatePersistFailed { key: String, reason: String },
}

#[derive(Debug)]
pub enum TrafficError {
    AgentNotFound { agent_id: String },
    InvalidResetDay { reset_day: i32 },
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::Config(e) => write!(f, "configuration error: {}", e),
            FleetError::Tsdb(e) => write!(f, "tsdb error: {}", e),
            FleetError::Database(e) => write!(f, "database error: {}", e),
            FleetError::Registry(e) => write!(f, "registry error: {}", e),
            FleetError::Monitor(e) => write!(f, "monitor error: {}", e),
            FleetError::Alert(e) => write!(f, "alert error: {}", e),
            FleetError::Traffic(e) => write!(f, "traffic error: {}", e),
            FleetError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
            ConfigError::MissingRequired { field } => {
                write!(f, "missing required field: {}", field)
            }
            ConfigError::ParseError { reason } => write!(f, "failed to parse config: {}", reason),
        }
    }
}

impl fmt::Display for TsdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsdbError::ConnectionFailed { reason } => {
                write!(f, "connection to tsdb failed: {}", reason)
            }
            TsdbError::Timeout { operation } => write!(f, "tsdb timeout during {}", operation),
            TsdbError::InvalidResponse { reason } => {
                write!(f, "invalid tsdb response: {}", reason)
            }
            TsdbError::QueryFailed { query, reason } => {
                write!(f, "query '{}' failed: {}", query, reason)
            }
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectionFailed { reason } => {
                write!(f, "database connection failed: {}", reason)
            }
            DatabaseError::QueryFailed { query, reason } => {
                write!(f, "query '{}' failed: {}", query, reason)
            }
            DatabaseError::SerializationError { reason } => {
                write!(f, "serialization error: {}", reason)
            }
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NoSuchAgent { agent_id } => {
                write!(f, "no live session for agent '{}'", agent_id)
            }
            RegistryError::TransportError { agent_id, reason } => {
                write!(f, "transport error sending to '{}': {}", agent_id, reason)
            }
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::NotFound { monitor_id } => {
                write!(f, "monitor '{}' not found", monitor_id)
            }
            MonitorError::InvalidInterval { interval } => {
                write!(f, "interval {} is below the 10s minimum", interval)
            }
            MonitorError::ScheduleFailed { monitor_id, reason } => {
                write!(f, "failed to schedule monitor '{}': {}", monitor_id, reason)
            }
        }
    }
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertError::RecordPersistFailed { key, reason } => {
                write!(f, "failed to persist alert record for '{}': {}", key, reason)
            }
            AlertError::StatePersistFailed { key, reason } => {
                write!(f, "failed to persist alert state for '{}': {}", key, reason)
            }
        }
    }
}

impl fmt::Display for TrafficError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficError::AgentNotFound { agent_id } => {
                write!(f, "no traffic policy for agent '{}'", agent_id)
            }
            TrafficError::InvalidResetDay { reset_day } => {
                write!(f, "reset day {} is out of range 0..=31", reset_day)
            }
        }
    }
}

impl std::error::Error for FleetError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TsdbError {}
impl std::error::Error for DatabaseError {}
impl std::error::Error for RegistryError {}
impl std::error::Error for MonitorError {}
impl std::error::Error for AlertError {}
impl std::error::Error for TrafficError {}

impl From<anyhow::Error> for FleetError {
    fn from(err: anyhow::Error) -> Self {
        FleetError::Other(err.to_string())
    }
}

impl From<ConfigError> for FleetError {
    fn from(err: ConfigError) -> Self {
        FleetError::Config(err)
    }
}

impl From<TsdbError> for FleetError {
    fn from(err: TsdbError) -> Self {
        FleetError::Tsdb(err)
    }
}

impl From<DatabaseError> for FleetError {
    fn from(err: DatabaseError) -> Self {
        FleetError::Database(err)
    }
}

impl From<RegistryError> for FleetError {
    fn from(err: RegistryError) -> Self {
        FleetError::Registry(err)
    }
}

impl From<MonitorError> for FleetError {
    fn from(err: MonitorError) -> Self {
        FleetError::Monitor(err)
    }
}

impl From<AlertError> for FleetError {
    fn from(err: AlertError) -> Self {
        FleetError::Alert(err)
    }
}

impl From<TrafficError> for FleetError {
    fn from(err: TrafficError) -> Self {
        FleetError::Traffic(err)
    }
}
