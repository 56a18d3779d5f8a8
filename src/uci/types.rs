//! Shared UCI driver types: engine state, search modes, option records.

use std::time::Duration;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::position::UciMove;

/// Timeout for the `uci` / `uciok` handshake.
pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a `stop` command to be acknowledged by `bestmove`.
pub const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(8);

/// First, short wait before retrying a `stop` command.
pub const ENGINE_QUICK_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Delay between `stop` command retries.
pub const STOP_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Maximum number of `stop` command retries.
pub const MAX_STOP_RETRIES: u32 = 3;

/// Driver-level states. `Idle` accepts `position`/`go`;
/// `Analyzing` accepts only `stop`; `Stopping` accepts nothing until
/// `bestmove` arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Uninitialized,
    Idle,
    Analyzing,
    Stopping,
    Terminated,
}

/// Engine search mode for the `go` command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum GoMode {
    Depth(u32),
    Time(u32),
    Nodes(u32),
    PlayersTime(PlayersTime),
    Infinite,
}

/// Per-side time control for `GoMode::PlayersTime`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayersTime {
    pub white: u32,
    pub black: u32,
    pub winc: u32,
    pub binc: u32,
}

impl GoMode {
    /// Renders the UCI `go ...` command line, without a trailing
    /// newline. `search_moves`, if non-empty, is appended as a
    /// `searchmoves` restriction, independent of the chosen mode.
    pub fn to_go_command(&self, search_moves: &[UciMove]) -> String {
        let mut cmd = match self {
            GoMode::Depth(d) => format!("go depth {d}"),
            GoMode::Time(ms) => format!("go movetime {ms}"),
            GoMode::Nodes(n) => format!("go nodes {n}"),
            GoMode::Infinite => "go infinite".to_string(),
            GoMode::PlayersTime(t) => format!(
                "go wtime {} btime {} winc {} binc {}",
                t.white, t.black, t.winc, t.binc
            ),
        };
        if !search_moves.is_empty() {
            cmd.push_str(" searchmoves");
            for mv in search_moves {
                cmd.push(' ');
                cmd.push_str(&mv.to_string());
            }
        }
        cmd
    }
}

/// A single UCI `setoption` name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

/// Position and extra options to configure before a `go` command.
#[derive(Debug, Clone, Deserialize, Derivative, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
#[derivative(Default)]
pub struct EngineOptions {
    pub fen: String,
    pub moves: Vec<String>,
    pub extra_options: Vec<EngineOption>,
}

/// A `setoption` definition as advertised by the engine via `option ...`
///: a name plus a type-specific value shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UciEngineOption {
    Check {
        name: String,
        default: bool,
    },
    Spin {
        name: String,
        default: i64,
        min: i64,
        max: i64,
    },
    Combo {
        name: String,
        default: String,
        vars: Vec<String>,
    },
    Button {
        name: String,
    },
    String {
        name: String,
        default: String,
    },
}

impl UciEngineOption {
    pub fn name(&self) -> &str {
        match self {
            UciEngineOption::Check { name, .. }
            | UciEngineOption::Spin { name, .. }
            | UciEngineOption::Combo { name, .. }
            | UciEngineOption::Button { name }
            | UciEngineOption::String { name, .. } => name,
        }
    }

    /// Parses one `option name ... type ...` line from the `uci`
    /// handshake.
    pub fn parse(line: &str) -> Option<UciEngineOption> {
        let rest = line.strip_prefix("option name ")?;
        let (name, rest) = rest.split_once(" type ")?;
        let name = name.trim().to_string();
        let mut tokens = rest.split_whitespace().peekable();
        let kind = tokens.next()?;

        let mut default = None;
        let mut min = None;
        let mut max = None;
        let mut vars = Vec::new();
        while let Some(tok) = tokens.next() {
            match tok {
                "default" => default = tokens.next().map(str::to_string),
                "min" => min = tokens.next().and_then(|v| v.parse().ok()),
                "max" => max = tokens.next().and_then(|v| v.parse().ok()),
                "var" => {
                    if let Some(v) = tokens.next() {
                        vars.push(v.to_string());
                    }
                }
                _ => {}
            }
        }

        Some(match kind {
            "check" => UciEngineOption::Check {
                name,
                default: default.as_deref() == Some("true"),
            },
            "spin" => UciEngineOption::Spin {
                name,
                default: default.and_then(|v| v.parse().ok()).unwrap_or(0),
                min: min.unwrap_or(0),
                max: max.unwrap_or(0),
            },
            "combo" => UciEngineOption::Combo {
                name,
                default: default.unwrap_or_default(),
                vars,
            },
            "button" => UciEngineOption::Button { name },
            "string" => UciEngineOption::String {
                name,
                default: default.unwrap_or_default(),
            },
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_mode_renders_depth() {
        assert_eq!(GoMode::Depth(20).to_go_command(&[]), "go depth 20");
    }

    #[test]
    fn go_mode_appends_searchmoves() {
        let moves = vec!["e2e4".parse().unwrap(), "d2d4".parse().unwrap()];
        assert_eq!(
            GoMode::Depth(20).to_go_command(&moves),
            "go depth 20 searchmoves e2e4 d2d4"
        );
    }

    #[test]
    fn parses_spin_option_line() {
        let opt = UciEngineOption::parse("option name Hash type spin default 16 min 1 max 33554432")
            .unwrap();
        assert_eq!(
            opt,
            UciEngineOption::Spin {
                name: "Hash".to_string(),
                default: 16,
                min: 1,
                max: 33554432,
            }
        );
    }

    #[test]
    fn parses_combo_option_line() {
        let opt = UciEngineOption::parse("option name Style type combo default Normal var Solid var Normal var Risky")
            .unwrap();
        match opt {
            UciEngineOption::Combo { vars, default, .. } => {
                assert_eq!(default, "Normal");
                assert_eq!(vars, vec!["Solid", "Normal", "Risky"]);
            }
            _ => panic!("expected combo"),
        }
    }

    #[test]
    fn go_mode_renders_players_time() {
        let t = PlayersTime {
            white: 60000,
            black: 60000,
            winc: 1000,
            binc: 1000,
        };
        assert_eq!(
            GoMode::PlayersTime(t).to_go_command(&[]),
            "go wtime 60000 btime 60000 winc 1000 binc 1000"
        );
    }
}
