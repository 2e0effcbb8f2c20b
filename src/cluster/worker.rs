//! Worker-Side Delegation
//!
//! A worker owns zero data. Its HTTP handlers shape each request into an
//! operation, park a continuation under the operation's correlation id, send
//! the frame upstream, and suspend until the matching reply returns. The
//! stdio channel to the primary is a single ordered duplex stream shared by
//! every in-flight request, multiplexed purely by correlation id.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use super::dispatcher::StoreClient;
use super::protocol::{IpcError, Operation, Reply, WorkerMessage};
use crate::api::handlers::{AppContext, WorkerIdentity};
use crate::api::routes;
use crate::config::WorkerConfig;

/// Entry point of a forked worker process: wires the stdio channel to the
/// primary, binds the HTTP listener, signals readiness, then serves.
pub async fn run(worker: WorkerConfig) -> Result<()> {
    let client = IpcClient::start();

    let listener = TcpListener::bind(("127.0.0.1", worker.port))
        .await
        .with_context(|| format!("worker {} failed to bind port {}", worker.index, worker.port))?;

    client.send(WorkerMessage::Ready {
        index: worker.index,
    })?;
    tracing::info!(
        "Worker {} is running on port {} (pid {})",
        worker.index,
        worker.port,
        std::process::id()
    );

    let ctx = AppContext {
        client: StoreClient::Ipc(client),
        worker: Some(WorkerIdentity {
            index: worker.index,
            port: worker.port,
        }),
    };
    axum::serve(listener, routes::router(ctx))
        .await
        .context("worker http server failed")?;
    Ok(())
}

/// Suspended HTTP continuations keyed by correlation id.
///
/// An entry lives from just before its operation is sent until the matching
/// reply arrives. The guard removes the entry when the waiting request is
/// dropped, so an aborted connection cannot leak it.
#[derive(Clone, Default)]
pub struct PendingActions {
    inner: Arc<DashMap<String, oneshot::Sender<Reply>>>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a continuation. At most one entry exists per correlation id.
    pub fn register(&self, id: String) -> (PendingGuard, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(id.clone(), tx);
        (
            PendingGuard {
                table: Arc::clone(&self.inner),
                id,
            },
            rx,
        )
    }

    /// Routes a reply to its continuation. Returns false for stale or
    /// duplicate ids, which callers discard.
    pub fn complete(&self, reply: Reply) -> bool {
        match self.inner.remove(&reply.id) {
            Some((_, tx)) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct PendingGuard {
    table: Arc<DashMap<String, oneshot::Sender<Reply>>>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

/// Client half of the worker/primary channel: operations out on stdout,
/// replies in on stdin.
pub struct IpcClient {
    outbound: mpsc::UnboundedSender<WorkerMessage>,
    pending: PendingActions,
}

impl IpcClient {
    /// Spawns the writer and reader halves over this process's stdio.
    /// Stdout belongs to the channel from here on; diagnostics must go to
    /// stderr.
    pub fn start() -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = PendingActions::new();

        tokio::spawn(write_frames(outbound_rx));
        tokio::spawn(read_replies(pending.clone()));

        Arc::new(Self { outbound, pending })
    }

    pub fn send(&self, message: WorkerMessage) -> Result<(), IpcError> {
        self.outbound
            .send(message)
            .map_err(|_| IpcError::ChannelClosed)
    }

    /// One full round trip: register, send, suspend until the reply fires.
    pub async fn call(&self, op: Operation) -> Result<Reply, IpcError> {
        let (guard, rx) = self.pending.register(op.id.clone());
        self.send(WorkerMessage::Op { op })?;
        let reply = rx.await.map_err(|_| IpcError::ChannelClosed);
        drop(guard);
        reply
    }
}

async fn write_frames(mut outbound: mpsc::UnboundedReceiver<WorkerMessage>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = outbound.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!("Failed to encode ipc frame: {err}");
                continue;
            }
        };
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            tracing::error!("Primary channel write failed; stopping writer");
            break;
        }
    }
}

async fn read_replies(pending: PendingActions) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<Reply>(&line) {
                Ok(reply) => {
                    if !pending.complete(reply) {
                        tracing::debug!("Discarding stale reply");
                    }
                }
                Err(err) => tracing::warn!("Malformed reply frame: {err}"),
            },
            // EOF: the primary is gone and no reply will ever arrive.
            Ok(None) => break,
            Err(err) => {
                tracing::error!("Primary channel read failed: {err}");
                break;
            }
        }
    }
    tracing::error!("Lost the primary process; shutting down");
    std::process::exit(1);
}
