//! Publisher Pipeline Error Hierarchy
//!
//! Defines error types for the telemetry publishing pipeline, categorized by
//! the layer that raises them. Transient connectivity failures normally stay
//! inside the pipeline (counters and logs); only configuration conflicts that
//! exhausted their retries, invalid requests and unsupported job shapes reach
//! callers of the configuration service.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rejected publish requests and unsupported job definitions
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Unrecoverable failures requiring the writer group to stop
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The field device refused or failed to create a subscription
    #[error("Subscription {subscription_id} on {endpoint_url} failed: {reason}")]
    SubscriptionFailed {
        endpoint_url: String,
        subscription_id: String,
        reason: String,
    },

    /// The session to the field device was lost
    #[error("Connection to {0} lost")]
    ConnectionLost(String),

    /// Transport refused a message batch or is not reachable
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Single operation timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Retry policy exhaustion
    #[error("Task failed after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    /// Retries stopped by cancellation
    #[error("Task cancelled after {attempts} attempts")]
    RetryCancelled { attempts: usize },

    /// Outgoing queue has been closed
    #[error("Sink {0} is closed")]
    SinkClosed(String),

    /// Cancelled while waiting for room in a full outgoing queue
    #[error("Sink {sink} dropped {dropped} messages on cancellation")]
    SendAbandoned { sink: String, dropped: usize },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency check failed on conditional write
    #[error("Version conflict on job {job_id} (expected: {expected:?}, actual: {actual:?})")]
    VersionConflict {
        job_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Fetch-mutate-store cycle kept conflicting
    #[error("Job {job_id} update gave up after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { job_id: String, attempts: usize },

    /// Document does not exist
    #[error("Job {0} not found")]
    NotFound(String),

    /// Persisted document could not be read back
    #[error("Job document {job_id} is corrupted: {reason}")]
    CorruptedDocument { job_id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Endpoint id could not be resolved through the registry
    #[error("Endpoint {0} is not registered")]
    UnknownEndpoint(String),

    /// Required request field missing or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Job document carries a configuration type this publisher cannot run
    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),

    /// Messaging mode and encoding combination cannot be produced
    #[error("Unsupported encoding {encoding} for messaging mode {mode}")]
    UnsupportedEncoding { mode: String, encoding: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Field device and transport layer
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    // Job document storage
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    // Message body serialization
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Writer group failed to start: {0}")]
    GroupStartFailed(String),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<EncodingError> for Error {
    fn from(e: EncodingError) -> Self {
        Error::System(SystemError::Encoding(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        EncodingError::Json(e).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        EncodingError::Bincode(e).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}

impl Error {
    /// Optimistic concurrency conflicts are the only errors the job update
    /// loop retries by re-running the mutation.
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Storage(StorageError::VersionConflict { .. }))
        )
    }
}
