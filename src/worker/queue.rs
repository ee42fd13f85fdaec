//! Job transport port and the in-process channel implementation
//!
//! The broker (Redis/BullMQ on the API side) is an external collaborator;
//! this module only defines the seam. [`ChannelTransport`] is the in-process
//! implementation on crossbeam channels — MPMC, so any number of worker
//! threads can share one receiver — used by the binary's stdin feed and by
//! tests.

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SegueError};
use crate::worker::cancel::JobToken;
use crate::worker::jobs::ResultMessage;

/// The four ingress queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Analyze,
    Transition,
    DraftTransition,
    Mix,
}

/// One job pulled off a queue
#[derive(Debug, Clone)]
pub struct JobEnvelope {
    pub id: String,
    pub queue: QueueName,
    pub payload: Value,
    pub token: JobToken,
}

/// Transport seam between the worker pool and the broker
pub trait JobTransport: Send + Sync {
    /// Block for the next job; `None` means the transport is shutting down
    fn next_job(&self) -> Option<JobEnvelope>;

    /// Publish a message on the results queue
    fn publish(&self, message: ResultMessage) -> Result<()>;
}

/// In-process transport over crossbeam channels
pub struct ChannelTransport {
    jobs: Receiver<JobEnvelope>,
    results: Sender<ResultMessage>,
}

/// Producer half of a [`ChannelTransport`]
///
/// Dropping the handle closes the job channel; workers drain what is queued
/// and then shut down cleanly.
pub struct TransportHandle {
    jobs: Sender<JobEnvelope>,
    results: Receiver<ResultMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, TransportHandle) {
        let (job_tx, job_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        (
            Self {
                jobs: job_rx,
                results: result_tx,
            },
            TransportHandle {
                jobs: job_tx,
                results: result_rx,
            },
        )
    }
}

impl JobTransport for ChannelTransport {
    fn next_job(&self) -> Option<JobEnvelope> {
        self.jobs.recv().ok()
    }

    fn publish(&self, message: ResultMessage) -> Result<()> {
        self.results
            .send(message)
            .map_err(|_| SegueError::Other("results channel closed".to_string()))
    }
}

impl TransportHandle {
    /// Enqueue a job, returning its cancellation token
    pub fn enqueue(&self, id: &str, queue: QueueName, payload: Value) -> Result<JobToken> {
        let token = JobToken::new();
        self.jobs
            .send(JobEnvelope {
                id: id.to_string(),
                queue,
                payload,
                token: token.clone(),
            })
            .map_err(|_| SegueError::Other("job channel closed".to_string()))?;
        Ok(token)
    }

    /// Receive the next result message, blocking
    pub fn next_result(&self) -> Option<ResultMessage> {
        self.results.recv().ok()
    }

    /// A clone of the results stream, for consuming on another thread
    ///
    /// The stream ends once every transport clone has been dropped.
    pub fn results_stream(&self) -> Receiver<ResultMessage> {
        self.results.clone()
    }

    /// Drain whatever results are currently available
    pub fn drain_results(&self) -> Vec<ResultMessage> {
        self.results.try_iter().collect()
    }
}
