//! Error types for DrishtiIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// DrishtiIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Endpoint has no connected peer
    #[error("Not connected")]
    NotConnected,

    /// Peer closed the connection; endpoint demoted to listening
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Invalid packet or message
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Capture pipeline still reported work after the bounded drain
    #[error("Capture drain did not converge after {0} attempts")]
    DrainNotConverged(usize),

    /// Unknown camera device type in configuration
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Configuration parse error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration serialize error
    #[error("Config error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
