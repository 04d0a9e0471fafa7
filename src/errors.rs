// Error types and error handling module
// This file defines the error kinds raised by timer sequences, bearer token
// decoding and metric publishing
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("timer sequence has already been started; stop it before starting a new one")]
    AlreadyRunning,
    #[error("timer sequence has already been stopped; start a new timer sequence")]
    AlreadyStopped,
    #[error("timer sequence was never started")]
    NotStarted,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("publish error: {0}")]
    Publish(String),
}
