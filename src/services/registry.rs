use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::job::{JobMetadata, JobType};

/// Decoded payload handed to a handler. The dispatcher strips any data-URL
/// prefix and base64-decodes the record's input before this point.
#[derive(Debug, Clone)]
pub struct HandlerInput {
    pub data: Vec<u8>,
    pub metadata: JobMetadata,
}

/// Structured result a handler produces within its time budget.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    /// JSON-encoded result payload, stored verbatim in the record's
    /// `outputData`.
    pub data: String,
    pub metadata: JobMetadata,
}

impl HandlerOutput {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            data: value.to_string(),
            metadata: JobMetadata::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("unsupported job type: {0}")]
    Unsupported(JobType),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// A pluggable execution backend for one job type.
///
/// The contract is deliberately narrow: decoded input in, structured output
/// or an error out, wall-clock-bounded by the dispatcher. Real inference
/// backends live behind this trait; the engine never performs inference
/// itself.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, input: HandlerInput) -> Result<HandlerOutput, HandlerError>;
}

/// Maps a job's declared type to the handler that executes it. Handlers are
/// registered up front and can be swapped without touching the dispatcher.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    pub fn with_handler(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        self.register(job_type, handler);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Route input to the handler registered for `job_type`.
    pub async fn dispatch(
        &self,
        job_type: JobType,
        input: HandlerInput,
    ) -> Result<HandlerOutput, HandlerError> {
        match self.get(job_type) {
            Some(handler) => handler.execute(input).await,
            None => Err(HandlerError::Unsupported(job_type)),
        }
    }
}

/// Placeholder handler that completes every job with an empty result.
/// Useful for wiring tests and for job types a deployment does not serve
/// with a real backend.
pub struct NoopHandler;

#[async_trait]
impl JobHandler for NoopHandler {
    async fn execute(&self, _input: HandlerInput) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::json(serde_json::json!({})))
    }
}
