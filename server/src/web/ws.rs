//! Probe-facing WebSocket endpoint: the read/write loop that owns the
//! actual socket. `registry::ConnectionRegistry` only owns the mailbox map;
//! this is the task that drains it and decodes/dispatches inbound frames
//! (§4.1, §6 "Probe wire protocol").

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::database::{SshLoginEventRecord, SshLoginStatus, TamperAlertRecord, TamperEventRecord};
use crate::protocol::{
    inbound_tag, CommandResponseFrame, Envelope, MetricFrame, RegisterFrame, SshLoginConfigResultFrame,
    SshLoginEventFrame, TamperAlertFrame, TamperEventFrame,
};
use crate::registry::new_mailbox;
use crate::web::AppState;

pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// A probe session must send `register` first; everything else before
/// that is rejected.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

async fn handle_socket(mut socket: WebSocket, state: AppState, addr: SocketAddr) {
    let source_ip = addr.ip().to_string();

    let register = match tokio::time::timeout(REGISTER_TIMEOUT, recv_envelope(&mut socket)).await {
        Ok(Some(envelope)) if envelope.frame_type == inbound_tag::REGISTER => envelope,
        Ok(Some(_)) => {
            debug!(%source_ip, "first frame was not register, closing");
            return;
        }
        Ok(None) => return,
        Err(_) => {
            debug!(%source_ip, "probe did not register within the grace period");
            return;
        }
    };

    let frame: RegisterFrame = match serde_json::from_value(register.data) {
        Ok(f) => f,
        Err(e) => {
            warn!(%source_ip, error = %e, "malformed register frame");
            return;
        }
    };

    match state.database.get_token(&frame.api_token).await {
        Ok(Some(token)) if token.enabled => {}
        _ => {
            warn!(agent_id = %frame.id, %source_ip, "registration rejected: invalid or disabled api token");
            return;
        }
    }

    let agent = match state.agent_service.register(&frame, Some(&source_ip)).await {
        Ok(agent) => agent,
        Err(e) => {
            warn!(agent_id = %frame.id, error = %e, "failed to persist probe registration");
            return;
        }
    };
    let agent_id = agent.id.clone();

    let (mailbox_tx, mut mailbox_rx) = new_mailbox();
    let (generation, displaced) = state.registry.on_connect(&agent_id, mailbox_tx);
    if displaced.is_some() {
        info!(agent_id = %agent_id, "new session displaced a stale one");
    }

    if let Err(e) = state.scheduler.on_probe_connect(&agent_id).await {
        warn!(agent_id = %agent_id, error = %e, "failed to push initial monitor config set");
    }
    state.agent_service.push_config_on_connect(&agent).await;

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(envelope) = mailbox_rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let grace = Duration::from_secs(state.config.heartbeat_grace_seconds);
    loop {
        let next = tokio::time::timeout(grace, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                debug!(agent_id = %agent_id, "heartbeat grace period elapsed, disconnecting");
                break;
            }
        };

        let Message::Text(text) = message else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
            warn!(agent_id = %agent_id, "failed to decode inbound envelope");
            continue;
        };

        if let Err(e) = dispatch(&state, &agent_id, &agent.name, envelope).await {
            warn!(agent_id = %agent_id, error = %e, "failed to process inbound frame");
        }
    }

    writer.abort();
    state.registry.on_disconnect(&agent_id, generation);
    if let Err(e) = state.agent_service.mark_offline(&agent_id).await {
        warn!(agent_id = %agent_id, error = %e, "failed to mark probe offline on disconnect");
    }
    info!(agent_id = %agent_id, "probe session closed");
}

async fn recv_envelope(socket: &mut WebSocket) -> Option<Envelope> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn dispatch(state: &AppState, agent_id: &str, agent_name: &str, envelope: Envelope) -> anyhow::Result<()> {
    match envelope.frame_type.as_str() {
        inbound_tag::HEARTBEAT => {
            state
                .database
                .set_agent_online(agent_id, true, None, Utc::now())
                .await?;
        }
        inbound_tag::METRIC => {
            let frame: MetricFrame = serde_json::from_value(envelope.data)?;
            state.ingest.ingest(agent_id, &frame.metric_type, frame.payload).await?;

            if matches!(frame.metric_type.as_str(), "cpu" | "memory" | "disk" | "network") {
                let snapshot = state.query.get_latest(agent_id);
                let cpu = snapshot.cpu.map(|s| s.usage_percent).unwrap_or(0.0);
                let memory = snapshot.memory.map(|s| s.usage_percent).unwrap_or(0.0);
                let disk = snapshot.disk.map(|s| s.usage_percent).unwrap_or(0.0);
                let network_mbps = snapshot
                    .network
                    .map(|s| (s.upload_rate_bytes_per_sec + s.download_rate_bytes_per_sec) / (1024.0 * 1024.0))
                    .unwrap_or(0.0);
                state
                    .alert
                    .check_metrics(agent_id, agent_name, cpu, memory, disk, network_mbps)
                    .await;
            }
        }
        inbound_tag::SSH_LOGIN_EVENT => {
            let frame: SshLoginEventFrame = serde_json::from_value(envelope.data)?;
            let status = SshLoginStatus::parse(&frame.status);
            let agent = state.database.get_agent_by_id(agent_id).await?;
            let allowlist_violation = matches!(status, SshLoginStatus::Success)
                && agent
                    .map(|a| a.ssh_login_enabled && !a.allows_ssh_source(&frame.source_ip))
                    .unwrap_or(false);

            let record = SshLoginEventRecord {
                id: 0,
                agent_id: agent_id.to_string(),
                username: frame.username,
                source_ip: frame.source_ip.clone(),
                source_port: frame.source_port as i32,
                status,
                tty: frame.tty,
                session_id: frame.session_id,
                event_time: Utc::now(),
            };
            state.database.insert_ssh_login_event(&record).await?;
            let location = state.geoip.lookup(&frame.source_ip).await;
            state
                .alert
                .check_ssh_login(
                    agent_id,
                    agent_name,
                    &frame.source_ip,
                    allowlist_violation,
                    location.as_deref(),
                )
                .await?;
        }
        inbound_tag::SSH_LOGIN_CONFIG_RESULT => {
            let frame: SshLoginConfigResultFrame = serde_json::from_value(envelope.data)?;
            if let Some(mut agent) = state.database.get_agent_by_id(agent_id).await? {
                agent.ssh_login_apply_status = if frame.success {
                    crate::database::SshApplyStatus::Success
                } else {
                    crate::database::SshApplyStatus::Failed
                };
                agent.ssh_login_apply_message = frame.message;
                agent.updated_at = Utc::now();
                state.database.upsert_agent(&agent).await?;
            }
        }
        inbound_tag::TAMPER_EVENT => {
            let frame: TamperEventFrame = serde_json::from_value(envelope.data)?;
            let record = TamperEventRecord {
                id: 0,
                agent_id: agent_id.to_string(),
                path: frame.path,
                operation: frame.operation,
                details: frame.details,
                restored: frame.restored,
                event_time: Utc::now(),
            };
            state.database.insert_tamper_event(&record).await?;
        }
        inbound_tag::TAMPER_ALERT => {
            let frame: TamperAlertFrame = serde_json::from_value(envelope.data)?;
            let record = TamperAlertRecord {
                id: 0,
                agent_id: agent_id.to_string(),
                path: frame.path,
                operation: frame.operation,
                details: frame.details,
                restored: frame.restored,
                event_time: Utc::now(),
            };
            state.database.insert_tamper_alert(&record).await?;
        }
        inbound_tag::COMMAND_RESPONSE => {
            let frame: CommandResponseFrame = serde_json::from_value(envelope.data)?;
            debug!(agent_id, command_id = %frame.command_id, success = frame.success, "command response received");
        }
        inbound_tag::REGISTER => {
            // A probe re-sending `register` mid-session refreshes identity
            // fields without tearing down the live connection.
            let frame: RegisterFrame = serde_json::from_value(envelope.data)?;
            state.agent_service.register(&frame, None).await?;
        }
        other => {
            warn!(agent_id, frame_type = other, "unrecognized inbound frame type");
        }
    }
    Ok(())
}
