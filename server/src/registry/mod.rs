//! Connection registry: the `agent_id -> live session` map.
//!
//! Holds one mailbox sender per connected probe. The actual socket read/
//! write loop lives in `web::ws` (it needs the axum `WebSocket` type); this
//! module only owns the map and the outbound send path — a plain
//! `RwLock<HashMap<...>>`, no external actor-framework dependency.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::constants::registry::SESSION_MAILBOX_CAPACITY;
use crate::errors::RegistryError;
use crate::protocol::Envelope;

/// A session's write mailbox. Cloning is cheap; the registry hands out
/// senders so the per-probe read-loop task can be the sole owner of the
/// receiver and the socket.
pub type Mailbox = mpsc::Sender<Envelope>;

struct Session {
    mailbox: Mailbox,
    /// Monotonic generation counter so a stale `on_disconnect` from a
    /// displaced session can't unregister the session that replaced it.
    generation: u64,
}

pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    next_generation: std::sync::atomic::AtomicU64,
}

/// Returned by `on_connect` so the caller can close the displaced socket
/// *outside* the registry lock.
pub struct Displaced {
    pub agent_id: String,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_generation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Registers a new live session for `agent_id`, displacing any existing
    /// one. Returns the mailbox for the caller's read loop to drain writes
    /// from is not needed here — the caller already built the channel and
    /// keeps the receiver; this only needs the sender half plus a fresh
    /// generation handle for later `on_disconnect`.
    pub fn on_connect(&self, agent_id: &str, mailbox: Mailbox) -> (u64, Option<Displaced>) {
        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let displaced = {
            let mut guard = self.sessions.write().expect("registry lock poisoned");
            let previous = guard.insert(
                agent_id.to_string(),
                Session {
                    mailbox,
                    generation,
                },
            );
            previous.map(|_| Displaced {
                agent_id: agent_id.to_string(),
            })
        };

        if displaced.is_some() {
            debug!(agent_id, "displaced an existing session on reconnect");
        }
        (generation, displaced)
    }

    /// Removes the session for `agent_id` only if `generation` still
    /// matches the live entry — a disconnect from an already-displaced
    /// session must not unregister the newer one.
    pub fn on_disconnect(&self, agent_id: &str, generation: u64) -> bool {
        let mut guard = self.sessions.write().expect("registry lock poisoned");
        if let Some(session) = guard.get(agent_id) {
            if session.generation == generation {
                guard.remove(agent_id);
                return true;
            }
        }
        false
    }

    pub fn send(&self, agent_id: &str, envelope: Envelope) -> Result<(), RegistryError> {
        let mailbox = {
            let guard = self.sessions.read().expect("registry lock poisoned");
            guard
                .get(agent_id)
                .map(|s| s.mailbox.clone())
                .ok_or_else(|| RegistryError::NoSuchAgent {
                    agent_id: agent_id.to_string(),
                })?
        };

        mailbox.try_send(envelope).map_err(|e| {
            warn!(agent_id, error = %e, "failed to enqueue frame on probe mailbox");
            RegistryError::TransportError {
                agent_id: agent_id.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn is_online(&self, agent_id: &str) -> bool {
        self.sessions
            .read()
            .expect("registry lock poisoned")
            .contains_key(agent_id)
    }

    pub fn list_online(&self) -> Vec<String> {
        self.sessions
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.sessions.read().expect("registry lock poisoned").len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn new_mailbox() -> (Mailbox, mpsc::Receiver<Envelope>) {
    mpsc::channel(SESSION_MAILBOX_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_send_delivers_to_mailbox() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = new_mailbox();
        registry.on_connect("p1", tx);

        registry
            .send("p1", Envelope::new("monitor_config", serde_json::json!({})))
            .unwrap();

        let received = rx.try_recv().unwrap();
        assert_eq!(received.frame_type, "monitor_config");
    }

    #[test]
    fn send_to_unknown_agent_is_no_such_agent() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .send("ghost", Envelope::new("monitor_config", serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoSuchAgent { .. }));
    }

    #[test]
    fn reconnect_displaces_previous_session() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = new_mailbox();
        let (gen1, displaced1) = registry.on_connect("p1", tx1);
        assert!(displaced1.is_none());

        let (tx2, _rx2) = new_mailbox();
        let (_gen2, displaced2) = registry.on_connect("p1", tx2);
        assert!(displaced2.is_some());

        // Stale disconnect from the displaced generation must not remove
        // the newer session.
        assert!(!registry.on_disconnect("p1", gen1));
        assert!(registry.is_online("p1"));
        assert_eq!(registry.list_online(), vec!["p1".to_string()]);
    }

    #[test]
    fn disconnect_with_current_generation_removes_session() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = new_mailbox();
        let (generation, _) = registry.on_connect("p1", tx);
        assert!(registry.on_disconnect("p1", generation));
        assert!(!registry.is_online("p1"));
    }
}
