//! Error type for the conversion pipeline.

/// Errors raised by the pipeline library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external codec action failed before or while running the tool.
    #[error(transparent)]
    Av(#[from] amur_av::Error),

    /// In-process image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The distributed job queue rejected an operation.
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    /// A queued job envelope could not be (de)serialized.
    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The worker pool has shut down.
    #[error("Worker pool is closed")]
    PoolClosed,

    /// A blocking or spawned task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias using the pipeline Error type.
pub type Result<T> = std::result::Result<T, Error>;
