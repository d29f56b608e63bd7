pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("workers must be at least 1")]
    InvalidWorkers,

    #[error("connections must be between 1 and the worker count")]
    InvalidConnections,

    #[error("rate must be at least 1 when set")]
    InvalidRate,

    #[error("total calls must be at least 1 when set")]
    InvalidCalls,

    #[error("duration must be non-zero when set")]
    InvalidDuration,

    #[error("ramp interval must be non-zero")]
    InvalidRampInterval,

    #[error("a ramp requires a target rate")]
    RampWithoutRate,

    #[error("stream message budget must be at least 1 when set")]
    InvalidStreamMessages,

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("call handler failed: {0}")]
    Worker(String),
}
