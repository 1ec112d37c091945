// File: server/src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use fleet_server::alert::AlertEngine;
use fleet_server::cache::LatestValueCache;
use fleet_server::config::ConfigManager;
use fleet_server::database::{ApiTokenRecord, Database};
use fleet_server::geoip::{GeoIpLookup, HttpGeoIpLookup, NoopGeoIpLookup};
use fleet_server::ingest::{MetricIngest, MetricQuery};
use fleet_server::notify::{NotificationChannel, NotificationDispatcher, WebhookChannel};
use fleet_server::registry::ConnectionRegistry;
use fleet_server::scheduler::MonitorScheduler;
use fleet_server::services::{AgentService, MonitorService};
use fleet_server::traffic::TrafficAccounter;
use fleet_server::tsdb::{HttpTsdbClient, TsdbClient};
use fleet_server::web::{self, start_web_server};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("fleet_server=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting fleet monitoring server core");

    let config_manager = Arc::new(ConfigManager::new("config".to_string()).await?);
    let config = config_manager.get_current_config().await;
    info!(
        "Configuration loaded: listening on {}:{}, tsdb={}, {} notification webhook(s)",
        config.host,
        config.port,
        config.tsdb_url,
        config.notification_webhooks.len()
    );

    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized");

    let seeded = seed_api_tokens(&database, &config_manager).await?;
    info!(seeded, "seed API token(s) imported from secrets.toml");

    let cache = Arc::new(LatestValueCache::new());
    let registry = Arc::new(ConnectionRegistry::new());
    info!("Connection registry and latest-value cache initialized");

    let tsdb_client: Arc<dyn TsdbClient> = Arc::new(HttpTsdbClient::new(config.tsdb_url.clone())?);
    info!("TSDB adapter initialized against {}", config.tsdb_url);

    let channels: Vec<Arc<dyn NotificationChannel>> = config
        .notification_webhooks
        .iter()
        .enumerate()
        .map(|(i, url)| Arc::new(WebhookChannel::new(format!("webhook-{i}"), url.clone())) as Arc<dyn NotificationChannel>)
        .collect();
    if channels.is_empty() {
        warn!("no notification webhooks configured, alert records will be written without fan-out");
    }
    let dispatcher = NotificationDispatcher::new(channels);

    let alert = Arc::new(AlertEngine::new(database.clone(), cache.clone(), dispatcher.clone()).await);
    info!("Alert engine initialized");

    let traffic = Arc::new(TrafficAccounter::new(database.clone(), Some(alert.clone())));
    info!("Traffic accounter initialized");

    let query = Arc::new(MetricQuery::new(cache.clone(), tsdb_client.clone()));
    let ingest = Arc::new(MetricIngest::new(cache.clone(), tsdb_client.clone(), traffic.clone()));
    info!("Metric ingest & query adapter initialized");

    let monitor_scheduler = Arc::new(MonitorScheduler::new(database.clone(), registry.clone(), cache.clone()).await?);
    info!("Monitor scheduler initialized");

    let agent_service = Arc::new(AgentService::new(
        database.clone(),
        cache.clone(),
        query.clone(),
        registry.clone(),
    ));
    let monitor_service = Arc::new(MonitorService::new(database.clone(), monitor_scheduler.clone(), query.clone()));
    info!("Service layer initialized");

    let geoip: Arc<dyn GeoIpLookup> = match &config.geoip_base_url {
        Some(base_url) => {
            info!("GeoIP enrichment enabled via {}", base_url);
            Arc::new(HttpGeoIpLookup::new(base_url.clone())?)
        }
        None => {
            info!("GeoIP enrichment disabled, SSH-login notices will carry no location");
            Arc::new(NoopGeoIpLookup)
        }
    };

    let state = web::AppState::new(
        config.clone(),
        database,
        cache,
        registry,
        ingest,
        query,
        monitor_scheduler.clone(),
        alert.clone(),
        traffic.clone(),
        agent_service,
        monitor_service,
        dispatcher,
        geoip,
    );

    monitor_scheduler.start().await?;
    info!("Monitor scheduler started, synthetic checks are now ticking");

    let shutdown = CancellationToken::new();

    spawn_traffic_housekeeping(traffic, config.traffic_housekeeping_seconds, shutdown.clone());
    spawn_alert_sweep(alert, config.alert_sweep_seconds, shutdown.clone());
    info!(
        "Background tasks started: traffic housekeeping every {}s, alert sweep every {}s",
        config.traffic_housekeeping_seconds, config.alert_sweep_seconds
    );

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, stopping background tasks");
            server_shutdown.cancel();
        }
    });

    start_web_server(state).await?;

    Ok(())
}

/// Imports every seed token from `secrets.toml` that isn't already present
/// in the `api_token` table, so an operator-disabled token survives a
/// restart without the secrets file clobbering it.
async fn seed_api_tokens(database: &Database, config_manager: &ConfigManager) -> Result<usize> {
    let now = chrono::Utc::now();
    let mut count = 0;
    for (name, token) in config_manager.secrets().seed_tokens() {
        database
            .upsert_token_if_absent(&ApiTokenRecord {
                token: token.to_string(),
                name: name.to_string(),
                enabled: true,
                created_at: now,
            })
            .await?;
        count += 1;
    }
    Ok(count)
}

fn spawn_traffic_housekeeping(traffic: Arc<TrafficAccounter>, interval_seconds: u64, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = traffic.run_housekeeping().await {
                        warn!(error = %e, "traffic housekeeping sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("traffic housekeeping loop stopped");
                    break;
                }
            }
        }
    });
}

fn spawn_alert_sweep(alert: Arc<AlertEngine>, interval_seconds: u64, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = alert.check_monitor_alerts().await {
                        error!(error = %e, "alert sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("alert sweep loop stopped");
                    break;
                }
            }
        }
    });
}
