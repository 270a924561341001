use thiserror::Error;

/// Crate-wide error type.
///
/// Library code returns `Result<T>` and propagates with `?`; the CLI boundary
/// converts into `anyhow` for operator-facing reporting and exit codes.
#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrawlerError>;
