//! Primary Process Bring-Up
//!
//! The primary forks the worker pool, owns the record store behind the
//! dispatcher, and fronts everything with the round-robin balancer. Order
//! matters: the balancer only starts after every worker has signalled ready,
//! so no connection is ever routed to a half-started pool.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use super::dispatcher::{self, DispatcherCall, ReplyTo};
use super::protocol::{Reply, WorkerMessage};
use crate::balancer::LoadBalancer;
use crate::config::{Config, ENV_WORKER_INDEX, ENV_WORKER_PORT};
use crate::store::records::RecordStore;

/// Primary-side view of one forked worker: identity, readiness, and the
/// channel replies travel down. The child process itself is reaped by the
/// task that pumps its frames.
pub struct WorkerHandle {
    pub index: usize,
    pub port: u16,
    pub ready: bool,
    replies: mpsc::UnboundedSender<Reply>,
}

enum WorkerEvent {
    Ready { index: usize },
    Exited { index: usize },
}

/// Pool size: one core stays reserved for the primary and its balancer.
pub fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Worker ports follow the public port: public+1, public+2, ...
pub fn worker_ports(public_port: u16, count: usize) -> Result<Vec<u16>> {
    (1..=count)
        .map(|offset| {
            u16::try_from(u32::from(public_port) + offset as u32)
                .context("worker port range exceeds 65535")
        })
        .collect()
}

/// Forks the pool, waits for every ready signal, then runs the balancer.
pub async fn run(config: &Config) -> Result<()> {
    let count = worker_count();
    let ports = worker_ports(config.public_port, count)?;
    tracing::info!(
        "Primary {} is running, forking {} workers",
        std::process::id(),
        count
    );

    let exe = std::env::current_exe().context("cannot locate the worker executable")?;
    // The operation channel exists before the first fork; the store itself is
    // only brought up once the whole pool is ready.
    let (calls, calls_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let mut workers = Vec::with_capacity(count);
    for (i, &port) in ports.iter().enumerate() {
        let index = i + 1;
        let mut child = Command::new(&exe)
            .env(ENV_WORKER_PORT, port.to_string())
            .env(ENV_WORKER_INDEX, index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to fork worker {index}"))?;

        let stdin = child.stdin.take().context("worker stdin not piped")?;
        let stdout = child.stdout.take().context("worker stdout not piped")?;

        let (replies, replies_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_replies(index, stdin, replies_rx));
        let handle = WorkerHandle {
            index,
            port,
            ready: false,
            replies,
        };
        tokio::spawn(pump_operations(
            index,
            child,
            stdout,
            calls.clone(),
            handle.replies.clone(),
            events_tx.clone(),
        ));

        workers.push(handle);
    }

    wait_until_ready(&mut events, &mut workers).await?;
    tracing::info!("All workers are ready");

    tokio::spawn(dispatcher::run(RecordStore::new(), calls_rx));

    // Losing a worker after this point takes the whole system down: the port
    // rotation is fixed at startup and there is no partial-capacity mode.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let WorkerEvent::Exited { index } = event {
                tracing::error!("Worker {index} exited; shutting down");
                std::process::exit(1);
            }
        }
    });

    let balancer = LoadBalancer::bind(config.public_port, ports).await?;
    tracing::info!("Load balancer is running on port {}", config.public_port);
    balancer.run().await
}

async fn wait_until_ready(
    events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
    workers: &mut [WorkerHandle],
) -> Result<()> {
    let total = workers.len();
    let mut ready = 0usize;
    while ready < total {
        match events.recv().await {
            Some(WorkerEvent::Ready { index }) => {
                match workers.iter_mut().find(|w| w.index == index && !w.ready) {
                    Some(worker) => {
                        worker.ready = true;
                        ready += 1;
                        tracing::info!(
                            "Worker {} on port {} is ready ({ready}/{total})",
                            worker.index,
                            worker.port
                        );
                    }
                    None => tracing::warn!("Duplicate ready signal from worker {index}"),
                }
            }
            Some(WorkerEvent::Exited { index }) => {
                bail!("worker {index} exited before signalling ready")
            }
            None => bail!("worker channels closed during startup"),
        }
    }
    Ok(())
}

/// Reads one worker's frames: ready signals go to the startup barrier,
/// operations go to the dispatcher tagged with this worker's reply channel.
/// Runs until the child's stdout closes, then reaps the process.
async fn pump_operations(
    index: usize,
    mut child: Child,
    stdout: ChildStdout,
    calls: mpsc::UnboundedSender<DispatcherCall>,
    replies: mpsc::UnboundedSender<Reply>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<WorkerMessage>(&line) {
                Ok(WorkerMessage::Ready { index }) => {
                    let _ = events.send(WorkerEvent::Ready { index });
                }
                Ok(WorkerMessage::Op { op }) => {
                    let call = DispatcherCall {
                        op,
                        reply_to: ReplyTo::Stream(replies.clone()),
                    };
                    if calls.send(call).is_err() {
                        tracing::error!("Dispatcher is gone; dropping operations from worker {index}");
                        break;
                    }
                }
                Err(err) => tracing::warn!("Worker {index} sent a malformed frame: {err}"),
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("Worker {index} channel read failed: {err}");
                break;
            }
        }
    }
    match child.wait().await {
        Ok(status) => tracing::error!("Worker {index} exited with {status}"),
        Err(err) => tracing::error!("Worker {index} wait failed: {err}"),
    }
    let _ = events.send(WorkerEvent::Exited { index });
}

/// Writes replies down to one worker, one frame per line.
async fn pump_replies(
    index: usize,
    mut stdin: ChildStdin,
    mut replies: mpsc::UnboundedReceiver<Reply>,
) {
    while let Some(reply) = replies.recv().await {
        let mut line = match serde_json::to_string(&reply) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!("Failed to encode reply frame: {err}");
                continue;
            }
        };
        line.push('\n');
        if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
            tracing::warn!("Worker {index} stdin closed; stopping reply writer");
            break;
        }
    }
}
