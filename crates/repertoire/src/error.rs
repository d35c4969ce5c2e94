//! Repertoire analysis error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepertoireError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Opening book error: {0}")]
    Book(String),

    #[error("Stockfish error: {0}")]
    Engine(String),

    #[error("Evaluator used before start()")]
    EngineNotStarted,

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Analysis worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, RepertoireError>;
