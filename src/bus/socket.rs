//! # TCP socket engine (`"socket"` package).
//!
//! Bridges a local [`StreamBusEngine`] over TCP with newline-delimited JSON
//! frames, one [`BusMessage`](crate::BusMessage) per line.
//!
//! ```text
//! Server role:  bind ──► accept peers ──► ingest lines ──► local channels
//!                                   └──► fan out locally-published frames
//! Client role:  connect (retry loop) ──► same ingest/egress over one socket
//! ```
//!
//! ## Rules
//! - A local publish is delivered locally first, then framed to peers;
//!   peer-ingested frames are only delivered locally (no re-forwarding to
//!   the origin, so frames never loop).
//! - Transport faults are counted on the engine's counters and logged; the
//!   engine itself stays usable for local traffic.
//! - `close()` cancels all transport tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BusCounters, BusEngine, BusMessage, StreamBusEngine};
use crate::config::EngineKind;
use crate::error::BusError;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type PeerMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>>;

/// TCP-backed bus engine; wraps a local stream engine for delivery.
pub struct SocketBusEngine {
    local: Arc<StreamBusEngine>,
    outbound: mpsc::UnboundedSender<BusMessage>,
    cancel: CancellationToken,
}

impl SocketBusEngine {
    /// Creates the engine and spawns its transport loop for the given role.
    ///
    /// ### Parameters
    /// - `name`: bus unique name of this endpoint.
    /// - `kind`: `Server` binds `addr`, `Client` connects to it with retry.
    /// - `addr`: `host:port` endpoint.
    /// - `capacity`: local channel ring capacity.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EngineKind, addr: String, capacity: usize) -> Self {
        let local = Arc::new(StreamBusEngine::new(name, capacity));
        let (outbound, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_local = Arc::clone(&local);
        let task_cancel = cancel.clone();
        match kind {
            EngineKind::Server => {
                tokio::spawn(run_server(addr, task_local, rx, task_cancel));
            }
            EngineKind::Client => {
                tokio::spawn(run_client(addr, task_local, rx, task_cancel));
            }
        }

        Self {
            local,
            outbound,
            cancel,
        }
    }
}

impl BusEngine for SocketBusEngine {
    fn name(&self) -> &str {
        self.local.name()
    }

    fn channel_add(&self, channel: &str) {
        self.local.channel_add(channel);
    }

    fn publish(&self, msg: BusMessage) -> Result<(), BusError> {
        self.local.publish(msg.clone())?;
        if self.outbound.send(msg).is_err() {
            // Transport loop is gone; local delivery already happened.
            self.local.counters().record_error();
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError> {
        self.local.subscribe(channel)
    }

    fn counters(&self) -> &BusCounters {
        self.local.counters()
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SocketBusEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_server(
    addr: String,
    local: Arc<StreamBusEngine>,
    mut outbound: mpsc::UnboundedReceiver<BusMessage>,
    cancel: CancellationToken,
) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            local.counters().record_error();
            warn!(engine = local.name(), %addr, %error, "bus socket bind failed");
            return;
        }
    };
    debug!(engine = local.name(), %addr, "bus socket listening");

    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
    let peer_seq = AtomicU64::new(0);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                match serde_json::to_string(&msg) {
                    Ok(line) => fan_out(&peers, None, &line),
                    Err(error) => {
                        local.counters().record_error();
                        warn!(engine = local.name(), %error, "bus frame encode failed");
                    }
                }
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let id = peer_seq.fetch_add(1, Ordering::Relaxed);
                        debug!(engine = local.name(), peer = %peer_addr, id, "bus peer connected");
                        tokio::spawn(serve_peer(
                            id,
                            stream,
                            Arc::clone(&local),
                            Arc::clone(&peers),
                            cancel.child_token(),
                        ));
                    }
                    Err(error) => {
                        local.counters().record_error();
                        warn!(engine = local.name(), %error, "bus accept failed");
                    }
                }
            }
        }
    }
}

/// Sends a frame to every connected peer except `skip`, pruning dead ones.
fn fan_out(peers: &PeerMap, skip: Option<u64>, line: &str) {
    let mut peers = peers.lock().unwrap_or_else(|p| p.into_inner());
    peers.retain(|id, tx| {
        if Some(*id) == skip {
            return true;
        }
        tx.send(line.to_string()).is_ok()
    });
}

async fn serve_peer(
    id: u64,
    stream: TcpStream,
    local: Arc<StreamBusEngine>,
    peers: PeerMap,
    cancel: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut egress) = mpsc::unbounded_channel::<String>();
    {
        let mut peers = peers.lock().unwrap_or_else(|p| p.into_inner());
        peers.insert(id, tx);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            line = egress.recv() => {
                let Some(mut line) = line else { break };
                line.push('\n');
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        // Deliver locally and relay to the other peers.
                        ingest_frame(&local, &line);
                        fan_out(&peers, Some(id), &line);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        local.counters().record_error();
                        debug!(engine = local.name(), id, %error, "bus peer read failed");
                        break;
                    }
                }
            }
        }
    }

    let mut peers = peers.lock().unwrap_or_else(|p| p.into_inner());
    peers.remove(&id);
    debug!(engine = local.name(), id, "bus peer disconnected");
}

async fn run_client(
    addr: String,
    local: Arc<StreamBusEngine>,
    mut outbound: mpsc::UnboundedReceiver<BusMessage>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = TcpStream::connect(&addr) => match connected {
                Ok(stream) => stream,
                Err(error) => {
                    debug!(engine = local.name(), %addr, %error, "bus connect failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                }
            },
        };
        debug!(engine = local.name(), %addr, "bus socket connected");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,

                msg = outbound.recv() => {
                    let Some(msg) = msg else { return };
                    match serde_json::to_string(&msg) {
                        Ok(mut line) => {
                            line.push('\n');
                            if write_half.write_all(line.as_bytes()).await.is_err() {
                                local.counters().record_error();
                                break;
                            }
                        }
                        Err(error) => {
                            local.counters().record_error();
                            warn!(engine = local.name(), %error, "bus frame encode failed");
                        }
                    }
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => ingest_frame(&local, &line),
                        Ok(None) => break,
                        Err(error) => {
                            local.counters().record_error();
                            debug!(engine = local.name(), %error, "bus read failed");
                            break;
                        }
                    }
                }
            }
        }
        // Connection lost; loop back to reconnect.
    }
}

/// Decodes one wire frame and delivers it on the local engine.
fn ingest_frame(local: &StreamBusEngine, line: &str) {
    match serde_json::from_str::<BusMessage>(line) {
        Ok(msg) => {
            // Remote channels may not exist locally yet.
            local.channel_add(&msg.channel);
            if let Err(error) = local.publish(msg) {
                warn!(engine = local.name(), %error, "bus ingest delivery failed");
            }
        }
        Err(error) => {
            local.counters().record_error();
            warn!(engine = local.name(), %error, "bus frame decode failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn bound_addr() -> String {
        // Reserve a free port, then release it for the engine to bind.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap().to_string();
        drop(probe);
        addr
    }

    #[tokio::test]
    async fn test_client_frames_reach_server_subscribers() {
        let addr = bound_addr().await;
        let server = SocketBusEngine::new("master_msg_bus", EngineKind::Server, addr.clone(), 16);
        server.channel_add("msg");
        let mut rx = server.subscribe("msg").unwrap();

        let client = SocketBusEngine::new("worker_msg_bus", EngineKind::Client, addr, 16);
        client.channel_add("msg");
        tokio::time::sleep(Duration::from_millis(200)).await;

        client
            .publish(BusMessage::new("msg", "worker_msg_bus", json!({"hello": 1})))
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame within deadline")
            .unwrap();
        assert_eq!(got.sender, "worker_msg_bus");
        assert_eq!(got.payload["hello"], 1);

        client.close();
        server.close();
    }

    #[tokio::test]
    async fn test_server_frames_reach_client_subscribers() {
        let addr = bound_addr().await;
        let server = SocketBusEngine::new("master_msg_bus", EngineKind::Server, addr.clone(), 16);
        server.channel_add("msg");

        let client = SocketBusEngine::new("worker_msg_bus", EngineKind::Client, addr, 16);
        client.channel_add("msg");
        let mut rx = client.subscribe("msg").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        server
            .publish(BusMessage::new("msg", "master_msg_bus", json!("down")))
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame within deadline")
            .unwrap();
        assert_eq!(got.payload, json!("down"));

        client.close();
        server.close();
    }

    #[tokio::test]
    async fn test_local_delivery_survives_missing_transport() {
        // Client with nothing listening: local pub/sub still works.
        let client =
            SocketBusEngine::new("lone_bus", EngineKind::Client, "127.0.0.1:1".into(), 16);
        client.channel_add("metrics");
        let mut rx = client.subscribe("metrics").unwrap();
        client
            .publish(BusMessage::new("metrics", "lone_bus", json!(42)))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().payload, json!(42));
        client.close();
    }
}
