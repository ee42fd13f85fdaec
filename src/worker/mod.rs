//! The job worker: transport, payloads, cancellation, and the consumer loop

pub mod cancel;
pub mod consumer;
pub mod jobs;
pub mod queue;

pub use cancel::JobToken;
pub use consumer::{spawn_workers, Worker};
pub use jobs::{
    AnalyzeJob, ErrorBody, MixJob, MixJobResult, MixJobTrack, Outcome, ResultMessage,
    TransitionJob, TransitionJobResult,
};
pub use queue::{ChannelTransport, JobEnvelope, JobTransport, QueueName, TransportHandle};
