pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] tonic::transport::Error),

    #[error("failed to connect: {0}")]
    Connect(#[source] tonic::transport::Error),

    #[error("invalid metadata key: {0}")]
    MetadataKey(String),

    #[error("invalid metadata value for '{key}': {value}")]
    MetadataValue { key: String, value: String },

    #[error("failed to build request message: {0}")]
    Message(#[from] crate::message::Error),
}

/// Failures below the gRPC status layer, reported in the per-status
/// breakdown separately from remote (status-carrying) errors. Connect
/// failures are not in here: they happen before the run starts and are
/// fatal, not per-call data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    ChannelNotReady,
}
