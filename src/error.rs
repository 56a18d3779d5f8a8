//! Crate-wide error type.
//!
//! Follows `engine/types.rs::EngineError` shape: one
//! `thiserror` enum covering every error-taxonomy entry from the
//! design (parsing, process, protocol, state-machine). `IllegalMove`
//! is deliberately absent — `Game::add` reports illegality as `false`,
//! never as an `Error` (see `game.rs`).

use crate::uci::EngineState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed FEN: {0}")]
    MalformedFen(String),

    #[error("malformed PGN: {0}")]
    MalformedPgn(String),

    #[error("engine executable not found: {0}")]
    EngineNotFound(String),

    #[error("engine process exited unexpectedly")]
    ProcessExited,

    #[error("invalid driver state: expected {expected:?}, got {actual:?}")]
    BadState {
        expected: EngineState,
        actual: EngineState,
    },

    #[error("could not parse engine line: {0}")]
    ProtocolError(String),

    #[error("engine did not respond in time")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
