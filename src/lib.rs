//! Chess analysis core: a UCI engine driver, a legal move generator,
//! and a PGN/SAN reader, assembled for game-analysis tooling.
//!
//! This crate has no process entry point of its own — it is a library
//! collaborator for a GUI, CLI, or batch-analysis binary that owns the
//! engine path, user interaction, and persistence.

pub mod analysis;
pub mod board;
pub mod error;
pub mod game;
pub mod opening;
pub mod pgn;
pub mod position;
pub mod san;
pub mod uci;
mod zobrist;

pub use error::{Error, Result};
pub use game::{Game, GameResult, UciExtendedMove};
pub use position::{Position, UciMove};
