//! UCI engine process management: wire-level I/O, the driver state
//! machine, and `info`-line parsing.

mod driver;
mod info;
mod process;
mod types;

pub use driver::{BestMoveResult, UciDriver};
pub use info::{Score, ScoreBound, ScoreInfo, UciEngineInfo};
pub use types::{EngineOption, EngineOptions, EngineState, GoMode, PlayersTime, UciEngineOption};
