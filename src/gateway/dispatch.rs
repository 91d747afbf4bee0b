//! Single dispatch queue in front of the gateway.
//!
//! Every trigger (touch tap, remote app event, countdown expiry, scheduled
//! close) enqueues a [`DispatchJob`] here. One worker task consumes the queue
//! and runs the jobs through [`CommandGateway::send_sms`] strictly one at a
//! time, so producers never juggle the device lock themselves.
//!
//! There is no cancellation: once a job reaches the worker it runs to its
//! fixed timeout. Callers that do not care about the result may drop the
//! reply receiver.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::{CommandGateway, DispatchResult};
use crate::error::GateError;
use crate::gate::command::CommandRequest;

#[derive(Debug)]
pub struct DispatchJob {
    pub request: CommandRequest,
    pub reply: oneshot::Sender<DispatchResult>,
}

pub enum DispatchCommand {
    Job(DispatchJob),
    Snapshot(oneshot::Sender<DispatchStats>),
    /// Stop the worker; the reply carries the final counters.
    Shutdown(oneshot::Sender<DispatchStats>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
}

#[derive(Clone, Debug)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatchHandle {
    /// Queue `request` and wait for the worker to run it.
    pub async fn dispatch(&self, request: CommandRequest) -> Result<DispatchResult, GateError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DispatchCommand::Job(DispatchJob { request, reply }))
            .map_err(|_| GateError::DispatcherClosed)?;
        rx.await.map_err(|_| GateError::DispatcherClosed)
    }

    pub async fn snapshot(&self) -> Option<DispatchStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(DispatchCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Stop the worker after the jobs already queued. Returns the final
    /// counters, or `None` when the worker was already gone.
    pub async fn shutdown(&self) -> Option<DispatchStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(DispatchCommand::Shutdown(tx)).is_err() {
            return None;
        }
        rx.await.ok()
    }
}

/// Spawn the dispatch worker for `gateway`.
pub fn start_dispatcher(gateway: Arc<CommandGateway>) -> DispatchHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<DispatchCommand>();
    let handle = DispatchHandle { tx };

    tokio::spawn(async move {
        let mut stats = DispatchStats::default();
        while let Some(cmd) = rx.recv().await {
            match cmd {
                DispatchCommand::Job(job) => {
                    let DispatchJob { request, reply } = job;
                    log::debug!(
                        "dispatching {} to {}",
                        request.kind.label(),
                        request.number
                    );
                    let result = gateway.send_sms(&request.number, &request.payload).await;
                    stats.dispatched_total += 1;
                    if result.success {
                        stats.succeeded_total += 1;
                    } else {
                        stats.failed_total += 1;
                    }
                    if reply.send(result).is_err() {
                        log::debug!("dispatch requester went away before the result");
                    }
                }
                DispatchCommand::Snapshot(resp) => {
                    let _ = resp.send(stats.clone());
                }
                DispatchCommand::Shutdown(done) => {
                    let _ = done.send(stats.clone());
                    break;
                }
            }
        }
        log::debug!(
            "dispatch loop terminated (dispatched={} failed={})",
            stats.dispatched_total,
            stats.failed_total
        );
    });

    handle
}
