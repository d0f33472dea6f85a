use thiserror::Error;

#[derive(Error, Debug)]
pub enum XproberError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Metadata discovery failed: {0}")]
    MetadataError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("RPC transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("RPC call failed: {0}")]
    RpcError(#[from] tonic::Status),

    #[error("Logging setup failed: {0}")]
    LoggingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XproberError>;
