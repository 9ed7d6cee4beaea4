use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// `ConfigError` and `TlsBundleError` are fatal at startup. `TransportDown`,
/// `ParseError`, and `Unknown` are recoverable: the event loop logs and
/// continues.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("TLS bundle error: {0}")]
    TlsBundleError(String),

    #[error("transport down: {0}")]
    TransportDown(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("zenoh error: {0}")]
    ZenohError(#[from] zenoh::Error),

    #[error("serde_json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("serde_yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unexpected error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
