use thiserror::Error;

/// Public status code reported for a failed client operation.
///
/// Successful operations return `Ok(_)`; every [`Error`] maps onto exactly
/// one of these codes through [`Error::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientResult {
    /// A precondition was violated. The call had no side effect.
    InvalidArg,

    /// Resource exhaustion, clock failure, or a transport-reported failure.
    Error,

    /// No inbound message has been received yet (receive-time query only).
    IndefiniteTime,
}

/// Errors that can occur during client operations
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument violated a precondition
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No inbound message has arrived since the client was created
    #[error("no message has been received yet")]
    IndefiniteTime,

    /// The clock source could not be acquired or read
    #[error("clock unavailable: {0}")]
    Clock(String),

    /// Deep copy of an outbound message failed
    #[error("message copy failed: {0}")]
    MessageCopy(String),

    /// A transport operation reported failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The option name is not known to the client or the bound transport
    #[error("unsupported option: {0}")]
    UnsupportedOption(String),

    /// Required configuration value not provided
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Conflicting configuration provided
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Connection string could not be parsed
    #[error("invalid connection string: {0}")]
    ConnectionString(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map this error onto the public status code.
    pub fn status(&self) -> ClientResult {
        // ---
        match self {
            Error::InvalidArgument(_)
            | Error::UnsupportedOption(_)
            | Error::MissingConfig(_)
            | Error::ConfigConflict(_)
            | Error::ConnectionString(_) => ClientResult::InvalidArg,
            Error::IndefiniteTime => ClientResult::IndefiniteTime,
            Error::Clock(_)
            | Error::MessageCopy(_)
            | Error::Transport(_)
            | Error::Serialization(_) => ClientResult::Error,
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;
