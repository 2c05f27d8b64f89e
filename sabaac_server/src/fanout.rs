use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use sabaac_core::ClientId;

/// Server-side id for one live WebSocket connection.
pub type ConnId = Uuid;

/// One registered connection: who it belongs to and how to reach its
/// writer task.
struct Connection {
    identity: ClientId,
    sender: mpsc::Sender<String>,
}

/// Indices over live connections: a global sender map, subscribers per
/// session code, and connections per client identity (a player may have
/// several tabs open). One lock guards all three so the views never
/// diverge; senders are cloned out before any await.
pub struct ConnectionManager {
    inner: Mutex<Indices>,
}

#[derive(Default)]
struct Indices {
    active: HashMap<ConnId, Connection>,
    by_code: HashMap<String, Vec<ConnId>>,
    by_identity: HashMap<ClientId, Vec<ConnId>>,
}

impl ConnectionManager {
    pub fn new() -> ConnectionManager {
        ConnectionManager {
            inner: Mutex::new(Indices::default()),
        }
    }

    /// Register an accepted connection under its client identity.
    /// The WebSocket handshake happens before this, at the caller.
    pub fn subscribe(&self, identity: ClientId, conn: ConnId, sender: mpsc::Sender<String>) {
        let mut inner = self.inner.lock();
        inner.active.insert(conn, Connection { identity, sender });
        let conns = inner.by_identity.entry(identity).or_default();
        if !conns.contains(&conn) {
            conns.push(conn);
        }
    }

    /// Add a connection to a session's broadcast channel. Duplicate joins
    /// are detected and skipped.
    pub fn join_session_channel(&self, code: &str, conn: ConnId) {
        let mut inner = self.inner.lock();
        let conns = inner.by_code.entry(code.to_string()).or_default();
        if !conns.contains(&conn) {
            conns.push(conn);
        }
    }

    /// Remove a connection from every index. Runs unconditionally when a
    /// socket closes, normally or not. Index entries left without any
    /// connection are dropped rather than kept as empty keys.
    pub fn unsubscribe(&self, conn: ConnId) {
        let mut inner = self.inner.lock();
        inner.active.remove(&conn);
        inner.by_code.retain(|_, conns| {
            conns.retain(|c| *c != conn);
            !conns.is_empty()
        });
        inner.by_identity.retain(|_, conns| {
            conns.retain(|c| *c != conn);
            !conns.is_empty()
        });
    }

    /// Deliver a payload to every subscriber of a session channel, minus
    /// the identities in `exclude` (their view arrives separately via
    /// [`ConnectionManager::send_to_identity`]). Each send is independent;
    /// a failed one is logged and the rest proceed.
    pub async fn broadcast(&self, code: &str, payload: &str, exclude: &[ClientId]) {
        let targets = {
            let inner = self.inner.lock();
            inner.senders_for(inner.by_code.get(code), exclude)
        };
        send_all(targets, payload).await;
    }

    /// Deliver a payload to every connection of one client identity.
    pub async fn send_to_identity(&self, identity: &ClientId, payload: &str) {
        let targets = {
            let inner = self.inner.lock();
            inner.senders_for(inner.by_identity.get(identity), &[])
        };
        send_all(targets, payload).await;
    }
}

impl Indices {
    fn senders_for(
        &self,
        conns: Option<&Vec<ConnId>>,
        exclude: &[ClientId],
    ) -> Vec<(ConnId, mpsc::Sender<String>)> {
        conns
            .map(|conns| {
                conns
                    .iter()
                    .filter_map(|c| {
                        self.active
                            .get(c)
                            .filter(|connection| !exclude.contains(&connection.identity))
                            .map(|connection| (*c, connection.sender.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn send_all(targets: Vec<(ConnId, mpsc::Sender<String>)>, payload: &str) {
    for (conn, sender) in targets {
        if sender.send(payload.to_string()).await.is_err() {
            // The connection's own task cleans up once its loop ends.
            warn!(%conn, "failed to deliver snapshot (connection likely closed)");
        }
    }
}
