//! Operation Dispatch
//!
//! The dispatcher task is the only code that touches the record store. Every
//! operation, from every worker channel or from the local HTTP layer in
//! single mode, funnels into one queue and executes fully before the next is
//! taken. Interleaving across channels is arbitrary; execution never is.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::protocol::{Action, IpcError, Operation, Reply, ResponseError};
use super::worker::IpcClient;
use crate::store::records::RecordStore;
use crate::store::types::RecordFields;

/// One queued operation plus the way back to whoever is waiting on it.
pub struct DispatcherCall {
    pub op: Operation,
    pub reply_to: ReplyTo,
}

/// Local callers wait on a oneshot; forked workers get the reply pushed down
/// the channel their operation came in on.
pub enum ReplyTo {
    Once(oneshot::Sender<Reply>),
    Stream(mpsc::UnboundedSender<Reply>),
}

/// Spawns the dispatcher task that owns the store. The returned sender is
/// the only path to the data.
pub fn spawn(store: RecordStore) -> mpsc::UnboundedSender<DispatcherCall> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(store, rx));
    tx
}

/// The dispatch loop itself, for callers that create the channel first and
/// bring the store up later.
pub async fn run(mut store: RecordStore, mut calls: mpsc::UnboundedReceiver<DispatcherCall>) {
    while let Some(call) = calls.recv().await {
        let reply = execute(&mut store, &call.op);
        match call.reply_to {
            // A dropped receiver means the caller went away; nothing to do.
            ReplyTo::Once(tx) => {
                let _ = tx.send(reply);
            }
            ReplyTo::Stream(tx) => {
                if tx.send(reply).is_err() {
                    tracing::warn!("Worker channel closed before reply delivery");
                }
            }
        }
    }
    tracing::info!("Dispatcher stopped: all operation channels closed");
}

/// Runs one operation against the store and shapes the outcome into a reply
/// carrying the same correlation id.
pub fn execute(store: &mut RecordStore, op: &Operation) -> Reply {
    let action = match op.action.parse::<Action>() {
        Ok(action) => action,
        Err(err) => {
            tracing::error!("{err}");
            return Reply::failure(op, ResponseError::unknown_action(&op.action));
        }
    };

    let outcome = match action {
        Action::All => to_payload(&store.all()).map(Some),
        Action::Get => id_arg(op, 0).and_then(|id| match store.get(id) {
            Ok(record) => to_payload(&record).map(Some),
            Err(err) => Err(ResponseError::from(&err)),
        }),
        Action::Create => {
            fields_arg(op, 0).and_then(|fields| to_payload(&store.create(fields)).map(Some))
        }
        Action::Update => id_arg(op, 0).and_then(|id| {
            let fields = fields_arg(op, 1)?;
            match store.update(id, fields) {
                Ok(record) => to_payload(&record).map(Some),
                Err(err) => Err(ResponseError::from(&err)),
            }
        }),
        Action::Delete => id_arg(op, 0).and_then(|id| match store.delete(id) {
            Ok(()) => Ok(None),
            Err(err) => Err(ResponseError::from(&err)),
        }),
    };

    match outcome {
        Ok(data) => Reply::success(op, data),
        Err(error) => Reply::failure(op, error),
    }
}

fn id_arg(op: &Operation, index: usize) -> Result<Uuid, ResponseError> {
    op.data
        .get(index)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .ok_or_else(|| ResponseError::invalid_arguments("expected a record id"))
}

fn fields_arg(op: &Operation, index: usize) -> Result<RecordFields, ResponseError> {
    let value = op
        .data
        .get(index)
        .cloned()
        .ok_or_else(|| ResponseError::invalid_arguments("expected a record payload"))?;
    serde_json::from_value(value).map_err(|err| ResponseError::invalid_arguments(&err.to_string()))
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value, ResponseError> {
    serde_json::to_value(value).map_err(|err| ResponseError::internal(&err.to_string()))
}

/// Uniform handle the HTTP layer uses to reach the store, wherever the store
/// actually lives.
#[derive(Clone)]
pub enum StoreClient {
    /// Same-process dispatcher (single mode and tests).
    Local(mpsc::UnboundedSender<DispatcherCall>),
    /// Stdio channel to the primary (forked worker).
    Ipc(Arc<IpcClient>),
}

impl StoreClient {
    /// Spawns a local dispatcher around a fresh store and returns its handle.
    pub fn local(store: RecordStore) -> Self {
        Self::Local(spawn(store))
    }

    /// One full operation/reply round trip.
    pub async fn call(&self, op: Operation) -> Result<Reply, IpcError> {
        match self {
            Self::Local(calls) => {
                let (tx, rx) = oneshot::channel();
                calls
                    .send(DispatcherCall {
                        op,
                        reply_to: ReplyTo::Once(tx),
                    })
                    .map_err(|_| IpcError::ChannelClosed)?;
                rx.await.map_err(|_| IpcError::ChannelClosed)
            }
            Self::Ipc(client) => client.call(op).await,
        }
    }
}
