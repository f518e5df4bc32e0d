use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
    #[error("vertex program protocol violation: {0}")]
    Protocol(String),
}
