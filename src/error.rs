//! Error types for chain analysis and address resolution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Chain reorganization: block count shrank from {expected} to {actual}")]
    Reorg { expected: u32, actual: u32 },

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;
