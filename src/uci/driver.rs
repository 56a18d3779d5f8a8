//! `UciDriver`: the public engine-process state machine.
//!
//! `Idle` accepts `position` and `go`; `Analyzing` accepts only
//! `stop`; `Stopping` accepts nothing until `bestmove` is observed, at
//! which point the driver returns to `Idle`.

use std::path::Path;

use log::{debug, info, warn};
use tokio::io::{BufReader, Lines};
use tokio::process::ChildStdout;

use crate::board::Color;
use crate::error::{Error, Result};
use crate::position::{Position, UciMove};
use crate::san;
use crate::uci::info::UciEngineInfo;
use crate::uci::process::EngineProcess;
use crate::uci::types::{EngineOptions, EngineState, GoMode};

/// The outcome of a completed `go`: the chosen move stamped with the
/// position it was chosen in, an optional ponder move, and every
/// MultiPV-complete info snapshot observed along the way (last element
/// is the final, deepest one).
#[derive(Debug, Clone)]
pub struct BestMoveResult {
    pub best_move: UciMove,
    pub san: String,
    pub fen_before: String,
    pub side_to_move: Color,
    pub ponder: Option<UciMove>,
    pub think_time_ms: Option<u64>,
    pub depth: Option<u32>,
    pub evaluation_cp: Option<i32>,
    pub info_snapshots: Vec<Vec<UciEngineInfo>>,
}

/// Drives one engine process through its UCI lifecycle.
pub struct UciDriver {
    process: Option<EngineProcess>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
    state: EngineState,
    multipv_count: u32,
    slots: Vec<Option<UciEngineInfo>>,
    last_complete_depth: Option<u32>,
    on_info: Option<Box<dyn FnMut(&[UciEngineInfo]) + Send>>,
    /// The position last sent via `set_position`, kept so `bestmove`
    /// can be stamped with SAN/side-to-move/fen without the engine
    /// ever being asked to report them.
    current_fen: Option<String>,
    current_moves: Vec<String>,
}

impl UciDriver {
    pub fn new() -> UciDriver {
        UciDriver {
            process: None,
            lines: None,
            state: EngineState::Uninitialized,
            multipv_count: 1,
            slots: vec![None],
            last_complete_depth: None,
            on_info: None,
            current_fen: None,
            current_moves: Vec::new(),
        }
    }

    /// Registers a callback invoked each time a complete, ordered,
    /// same-depth MultiPV set becomes available.
    pub fn set_on_info(&mut self, f: impl FnMut(&[UciEngineInfo]) + Send + 'static) {
        self.on_info = Some(Box::new(f));
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The options the engine advertised during the `uci` handshake.
    pub fn advertised_options(&self) -> &[crate::uci::UciEngineOption] {
        self.process.as_ref().map_or(&[], |p| &p.options)
    }

    fn require_state(&self, expected: EngineState) -> Result<()> {
        if self.state != expected {
            return Err(Error::BadState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Spawns the engine binary and completes the `uci`/`uciok`
    /// handshake, leaving the driver in `Idle`.
    pub async fn start_engine(&mut self, path: &Path) -> Result<()> {
        self.require_state(EngineState::Uninitialized)?;
        let (process, lines) = EngineProcess::spawn(path).await?;
        self.process = Some(process);
        self.lines = Some(lines);
        self.state = EngineState::Idle;
        Ok(())
    }

    fn process_mut(&mut self) -> Result<&mut EngineProcess> {
        self.process.as_mut().ok_or(Error::ProcessExited)
    }

    fn lines_mut(&mut self) -> Result<&mut Lines<BufReader<ChildStdout>>> {
        self.lines.as_mut().ok_or(Error::ProcessExited)
    }

    /// Sends `setoption` for every entry in `extra_options` that the
    /// engine actually advertised during the handshake (dropping and
    /// logging anything else), tracking `MultiPV` so the driver knows
    /// how many slots to expect back, then syncs with `isready` before
    /// returning.
    pub async fn set_options(&mut self, options: &EngineOptions) -> Result<()> {
        self.require_state(EngineState::Idle)?;
        let advertised: Vec<String> = self
            .advertised_options()
            .iter()
            .map(|o| o.name().to_ascii_lowercase())
            .collect();
        for opt in &options.extra_options {
            if !advertised.iter().any(|name| *name == opt.name.to_ascii_lowercase()) {
                warn!("ignoring unadvertised engine option {:?}", opt.name);
                continue;
            }
            if opt.name.eq_ignore_ascii_case("MultiPV") {
                self.multipv_count = opt.value.parse().unwrap_or(1).max(1);
            }
            let line = format!("setoption name {} value {}", opt.name, opt.value);
            self.process_mut()?.send_line(&line).await?;
        }
        self.slots = vec![None; self.multipv_count as usize];
        let mut lines = self.lines.take().ok_or(Error::ProcessExited)?;
        let result = self.process_mut()?.wait_ready(&mut lines).await;
        self.lines = Some(lines);
        result
    }

    /// Sends `ucinewgame` followed by an `isready` sync.
    pub async fn new_game(&mut self) -> Result<()> {
        self.require_state(EngineState::Idle)?;
        self.process_mut()?.send_line("ucinewgame").await?;
        let mut lines = self.lines.take().ok_or(Error::ProcessExited)?;
        let result = self.process_mut()?.wait_ready(&mut lines).await;
        self.lines = Some(lines);
        result
    }

    /// Sends `position fen <fen> moves <moves...>`. If the engine is
    /// still `Analyzing`, stops it and drains the pending `bestmove`
    /// first rather than rejecting the call.
    pub async fn set_position(&mut self, fen: &str, moves: &[String]) -> Result<()> {
        if self.state == EngineState::Analyzing {
            self.stop_thinking().await?;
        }
        if self.state == EngineState::Stopping {
            self.await_bestmove().await?;
        }
        self.require_state(EngineState::Idle)?;
        let mut line = format!("position fen {fen}");
        if !moves.is_empty() {
            line.push_str(" moves ");
            line.push_str(&moves.join(" "));
        }
        self.process_mut()?.send_line(&line).await?;
        self.current_fen = Some(fen.to_string());
        self.current_moves = moves.to_vec();
        Ok(())
    }

    /// The position last sent via `set_position`, replayed from its
    /// FEN through its moves — used to stamp `bestmove` with SAN,
    /// side-to-move and the FEN it was chosen in.
    fn current_position(&self) -> Option<Position> {
        let fen = self.current_fen.as_deref()?;
        let mut pos = Position::new(fen).ok()?;
        for mv in &self.current_moves {
            pos.apply(mv.parse().ok()?);
        }
        Some(pos)
    }

    /// Sends `go ...` for `mode`, optionally restricted to
    /// `search_moves`, and transitions to `Analyzing`. Does not itself
    /// read any engine output — call `await_bestmove` (and
    /// `stop_thinking` first, for infinite analysis) to collect it.
    pub async fn start_analysis(&mut self, mode: GoMode, search_moves: &[UciMove]) -> Result<()> {
        self.require_state(EngineState::Idle)?;
        self.slots = vec![None; self.multipv_count.max(1) as usize];
        self.last_complete_depth = None;
        let command = mode.to_go_command(search_moves);
        info!("starting analysis: {command}");
        self.process_mut()?.send_line(&command).await?;
        self.state = EngineState::Analyzing;
        Ok(())
    }

    /// Sends `stop`, transitioning to `Stopping`. The caller must
    /// still drain output via `await_bestmove` to observe `bestmove`
    /// and return the driver to `Idle`.
    pub async fn stop_thinking(&mut self) -> Result<()> {
        if self.state != EngineState::Analyzing {
            debug!("stop_thinking called while not analyzing, ignored");
            return Ok(());
        }
        self.process_mut()?.send_line("stop").await?;
        self.state = EngineState::Stopping;
        Ok(())
    }

    /// Reads engine output until `bestmove` is observed, accumulating
    /// `info` lines into MultiPV-complete snapshots along the way.
    /// Valid after `start_analysis` (for a bounded search) or after
    /// `stop_thinking` (for an infinite one).
    pub async fn await_bestmove(&mut self) -> Result<BestMoveResult> {
        if !matches!(self.state, EngineState::Analyzing | EngineState::Stopping) {
            return Err(Error::BadState {
                expected: EngineState::Analyzing,
                actual: self.state,
            });
        }

        let mut snapshots = Vec::new();
        loop {
            let line = self
                .lines_mut()?
                .next_line()
                .await
                .map_err(Error::Io)?
                .ok_or(Error::ProcessExited)?;

            if let Some(rest) = line.strip_prefix("bestmove") {
                let mut parts = rest.split_whitespace();
                let best_str = parts
                    .next()
                    .ok_or_else(|| Error::ProtocolError(line.clone()))?;
                let best_move: UciMove = best_str
                    .parse()
                    .map_err(|_| Error::ProtocolError(line.clone()))?;
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().and_then(|m| m.parse().ok()),
                    _ => None,
                };
                self.state = EngineState::Idle;

                let pos = self.current_position();
                let side_to_move = pos.as_ref().map_or(Color::White, Position::side_to_move);
                let fen_before = pos.as_ref().map_or_else(String::new, Position::fen);
                let san = pos
                    .as_ref()
                    .filter(|p| p.generate_legal_moves().contains(&best_move))
                    .map_or_else(|| best_move.to_string(), |p| san::to_san(p, best_move));

                let best_slot = snapshots.last().and_then(|snapshot| snapshot.first());
                let depth = best_slot.and_then(|i| i.depth);
                let think_time_ms = best_slot.and_then(|i| i.time_ms);
                let evaluation_cp = best_slot.and_then(|i| i.score).map(|s| s.score.to_cp());

                return Ok(BestMoveResult {
                    best_move,
                    san,
                    fen_before,
                    side_to_move,
                    ponder,
                    think_time_ms,
                    depth,
                    evaluation_cp,
                    info_snapshots: snapshots,
                });
            }

            if let Some(completed) = self.ingest_info_line(&line) {
                if let Some(cb) = self.on_info.as_mut() {
                    cb(&completed);
                }
                snapshots.push(completed);
            }
        }
    }

    /// Parses one `info` line and, if it completes an ordered MultiPV
    /// set at a depth at least as deep as the last complete set,
    /// returns that set.
    fn ingest_info_line(&mut self, line: &str) -> Option<Vec<UciEngineInfo>> {
        let info = UciEngineInfo::parse(line)?;
        if !info.has_score() {
            return None;
        }
        let slot = info.multipv.unwrap_or(1).saturating_sub(1) as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        let depth = info.depth.unwrap_or(0);
        self.slots[slot] = Some(info);

        if self.slots.iter().any(Option::is_none) {
            return None;
        }
        let depths_match = self
            .slots
            .iter()
            .all(|s| s.as_ref().map(|i| i.depth.unwrap_or(0)) == Some(depth));
        if !depths_match || self.last_complete_depth.is_some_and(|d| depth < d) {
            return None;
        }
        self.last_complete_depth = Some(depth);
        let completed: Vec<_> = self.slots.iter().cloned().map(Option::unwrap).collect();
        self.slots = vec![None; self.slots.len()];
        Some(completed)
    }

    /// Sends `quit` and kills the process if it doesn't exit on its
    /// own. Any in-flight `await_bestmove` caller still holding an
    /// `&mut UciDriver` will simply see `ProcessExited` on its next
    /// read — there are no outstanding completions to fail here since
    /// this driver has no separate notification channel.
    pub async fn dispose(&mut self) -> Result<()> {
        if let Some(process) = self.process.take() {
            process.shutdown().await?;
        }
        self.lines = None;
        self.state = EngineState::Terminated;
        Ok(())
    }
}

impl Default for UciDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UciDriver {
    fn drop(&mut self) {
        if self.process.is_some() {
            warn!("UciDriver dropped without calling dispose(); engine process may leak");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_engine_reports_missing_binary() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut driver = UciDriver::new();
        let err = driver
            .start_engine(Path::new("/nonexistent/not-a-real-engine"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineNotFound(_)));
        assert_eq!(driver.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn commands_from_wrong_state_are_rejected() {
        let mut driver = UciDriver::new();
        let err = driver.new_game().await.unwrap_err();
        assert!(matches!(
            err,
            Error::BadState {
                expected: EngineState::Idle,
                actual: EngineState::Uninitialized,
            }
        ));
    }

    #[tokio::test]
    async fn set_options_rejects_wrong_state() {
        let mut driver = UciDriver::new();
        let err = driver
            .set_options(&EngineOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BadState {
                expected: EngineState::Idle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn start_analysis_rejects_wrong_state() {
        let mut driver = UciDriver::new();
        let err = driver
            .start_analysis(GoMode::Infinite, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BadState {
                expected: EngineState::Idle,
                ..
            }
        ));
    }

    #[test]
    fn current_position_replays_fen_and_moves() {
        let mut driver = UciDriver::new();
        driver.current_fen = Some(crate::position::Position::starting().fen());
        driver.current_moves = vec!["e2e4".to_string()];
        let pos = driver.current_position().unwrap();
        assert_eq!(pos.side_to_move(), crate::board::Color::Black);
        assert!(pos.fen().contains("e3"));
    }
}
