//! Dashboard HTTP surface and probe WebSocket endpoint. This module only
//! adapts the contracts built by the other modules to HTTP/WS — it owns no
//! business state of its own beyond the `AppState` handle.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::alert::AlertEngine;
use crate::cache::LatestValueCache;
use crate::config::Config;
use crate::database::Database;
use crate::geoip::GeoIpLookup;
use crate::ingest::{MetricIngest, MetricQuery};
use crate::notify::NotificationDispatcher;
use crate::registry::ConnectionRegistry;
use crate::scheduler::MonitorScheduler;
use crate::services::{AgentService, MonitorService};
use crate::traffic::TrafficAccounter;

/// Shared application state handed to every axum handler and to the
/// WebSocket upgrade handler. All fields are cheap to clone (`Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
    pub cache: Arc<LatestValueCache>,
    pub registry: Arc<ConnectionRegistry>,
    pub ingest: Arc<MetricIngest>,
    pub query: Arc<MetricQuery>,
    pub scheduler: Arc<MonitorScheduler>,
    pub alert: Arc<AlertEngine>,
    pub traffic: Arc<TrafficAccounter>,
    pub agent_service: Arc<AgentService>,
    pub monitor_service: Arc<MonitorService>,
    pub dispatcher: NotificationDispatcher,
    pub geoip: Arc<dyn GeoIpLookup>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        database: Arc<Database>,
        cache: Arc<LatestValueCache>,
        registry: Arc<ConnectionRegistry>,
        ingest: Arc<MetricIngest>,
        query: Arc<MetricQuery>,
        scheduler: Arc<MonitorScheduler>,
        alert: Arc<AlertEngine>,
        traffic: Arc<TrafficAccounter>,
        agent_service: Arc<AgentService>,
        monitor_service: Arc<MonitorService>,
        dispatcher: NotificationDispatcher,
        geoip: Arc<dyn GeoIpLookup>,
    ) -> Self {
        Self {
            config,
            database,
            cache,
            registry,
            ingest,
            query,
            scheduler,
            alert,
            traffic,
            agent_service,
            monitor_service,
            dispatcher,
            geoip,
        }
    }
}
