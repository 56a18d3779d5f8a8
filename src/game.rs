//! Game model: a move tree rooted at a starting position, with tags,
//! result metadata, threefold-repetition and 50-move detection, and
//! PGN emission.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::board::Color;
use crate::position::{Position, UciMove, UndoInfo};
use crate::san;

/// A played move plus everything needed to undo it and to annotate it
/// for PGN output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UciExtendedMove {
    pub uci_move: UciMove,
    pub san: String,
    pub fen_before: String,
    pub comment: Option<String>,
    pub clock_ms: Option<u64>,
    pub evaluation_cp: Option<i32>,
    pub depth: Option<u32>,
    pub think_time_ms: Option<u64>,
    pub is_book: bool,
    pub is_tablebase: bool,
    #[serde(skip)]
    pub(crate) undo: Option<UndoInfo>,
    pub variations: Vec<Vec<UciExtendedMove>>,
}

/// Game result, per the standard PGN `Result` tag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Unknown,
}

impl GameResult {
    pub fn to_pgn_str(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Unknown => "*",
        }
    }
}

/// Which terminal condition produced `GameResult`. `None` while the game is undecided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultDetail {
    Checkmate,
    Stalemate,
    FiftyMoveRule,
    ThreefoldRepetition,
    InsufficientMaterial,
}

/// A time control, parsed from the PGN `TimeControl` tag, e.g. `"40/9000:900"`
/// or `"300+5"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub base_seconds: u32,
    pub increment_seconds: u32,
    pub moves_per_session: Option<u32>,
}

impl TimeControl {
    pub fn parse(tag: &str) -> Option<TimeControl> {
        let tag = tag.trim();
        if tag.is_empty() || tag == "-" {
            return None;
        }
        if let Some((moves, rest)) = tag.split_once('/') {
            let moves_per_session = moves.parse().ok();
            let (base, inc) = rest.split_once(':').unwrap_or((rest, "0"));
            return Some(TimeControl {
                base_seconds: base.parse().ok()?,
                increment_seconds: inc.parse().unwrap_or(0),
                moves_per_session,
            });
        }
        let (base, inc) = tag.split_once('+').unwrap_or((tag, "0"));
        Some(TimeControl {
            base_seconds: base.parse().ok()?,
            increment_seconds: inc.parse().unwrap_or(0),
            moves_per_session: None,
        })
    }
}

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A full game: the tag section, the starting position, and the
/// mainline of played moves (each of which may itself carry sibling
/// variations).
#[derive(Debug, Clone)]
pub struct Game {
    start_fen: String,
    position: Position,
    mainline: Vec<UciExtendedMove>,
    tags: HashMap<String, String>,
    result: GameResult,
    result_detail: Option<ResultDetail>,
    hash_history: Vec<u64>,
}

impl Game {
    pub fn new() -> Game {
        Game::from_fen(STARTING_FEN).expect("starting FEN is well-formed")
    }

    pub fn from_fen(fen: &str) -> crate::error::Result<Game> {
        let position = Position::new(fen)?;
        let hash_history = vec![position.hash()];
        Ok(Game {
            start_fen: fen.to_string(),
            position,
            mainline: Vec::new(),
            tags: HashMap::new(),
            result: GameResult::Unknown,
            result_detail: None,
            hash_history,
        })
    }

    pub fn current_position(&self) -> &Position {
        &self.position
    }

    pub fn mainline(&self) -> &[UciExtendedMove] {
        &self.mainline
    }

    pub(crate) fn mainline_mut(&mut self) -> &mut Vec<UciExtendedMove> {
        &mut self.mainline
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn result_detail(&self) -> Option<ResultDetail> {
        self.result_detail
    }

    pub fn set_result(&mut self, result: GameResult) {
        self.result = result;
        self.result_detail = None;
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn time_control(&self) -> Option<TimeControl> {
        self.tag("TimeControl").and_then(TimeControl::parse)
    }

    /// Plays `mv` if it is legal, recording SAN and returning `true`.
    /// An illegal move is reported as `false`, never as an `Error`
    ///. On success, evaluates terminal conditions in
    /// order {checkmate, stalemate, 50-move, threefold repetition,
    /// insufficient material} and sets `result`/`result_detail`
    /// accordingly.
    pub fn add(&mut self, mv: UciMove) -> bool {
        if !self.position.generate_legal_moves().contains(&mv) {
            return false;
        }
        let mover = self.position.side_to_move();
        let fen_before = self.position.fen();
        let san = san::to_san(&self.position, mv);
        let undo = self.position.apply(mv);
        self.hash_history.push(self.position.hash());

        self.mainline.push(UciExtendedMove {
            uci_move: mv,
            san,
            fen_before,
            comment: None,
            clock_ms: None,
            evaluation_cp: None,
            depth: None,
            think_time_ms: None,
            is_book: false,
            is_tablebase: false,
            undo: Some(undo),
            variations: Vec::new(),
        });

        self.update_terminal_state(mover);
        true
    }

    /// Checks terminal conditions in order and sets
    /// `result`/`result_detail`, leaving `Unknown`/`None` if none apply.
    fn update_terminal_state(&mut self, mover: Color) {
        if self.position.is_mate() {
            self.result = match mover {
                Color::White => GameResult::WhiteWins,
                Color::Black => GameResult::BlackWins,
            };
            self.result_detail = Some(ResultDetail::Checkmate);
        } else if self.position.is_stalemate() {
            self.result = GameResult::Draw;
            self.result_detail = Some(ResultDetail::Stalemate);
        } else if self.is_fifty_move_rule() {
            self.result = GameResult::Draw;
            self.result_detail = Some(ResultDetail::FiftyMoveRule);
        } else if self.is_threefold_repetition() {
            self.result = GameResult::Draw;
            self.result_detail = Some(ResultDetail::ThreefoldRepetition);
        } else if self.position.is_drawn_by_insufficient_material() {
            self.result = GameResult::Draw;
            self.result_detail = Some(ResultDetail::InsufficientMaterial);
        }
    }

    /// Undoes the last mainline move, if any, restoring the prior hash
    /// and clearing `result`/`result_detail`.
    pub fn undo_last_move(&mut self) -> bool {
        let Some(last) = self.mainline.pop() else {
            return false;
        };
        let undo = last.undo.expect("mainline moves always carry an UndoInfo");
        self.position.undo(last.uci_move, &undo);
        self.hash_history.pop();
        self.result = GameResult::Unknown;
        self.result_detail = None;
        true
    }

    pub fn get_position(&self, ply: usize) -> crate::error::Result<Position> {
        let mut pos = Position::new(&self.start_fen)?;
        for mv in self.mainline.iter().take(ply) {
            pos.apply(mv.uci_move);
        }
        Ok(pos)
    }

    pub fn get_move(&self, ply: usize) -> Option<&UciExtendedMove> {
        self.mainline.get(ply)
    }

    pub fn san_notation(&self, ply: usize) -> Option<&str> {
        self.mainline.get(ply).map(|m| m.san.as_str())
    }

    /// Adds a variation branching off the mainline move at `ply`
    /// (0-indexed), replaying it from that move's `fen_before`.
    pub fn add_variation(&mut self, ply: usize, moves: &[UciMove]) -> crate::error::Result<()> {
        let anchor = self
            .mainline
            .get(ply)
            .ok_or_else(|| crate::error::Error::ProtocolError(format!("no move at ply {ply}")))?;
        let mut pos = Position::new(&anchor.fen_before)?;
        let mut variation = Vec::new();
        for &mv in moves {
            if !pos.generate_legal_moves().contains(&mv) {
                break;
            }
            let fen_before = pos.fen();
            let san = san::to_san(&pos, mv);
            let undo = pos.apply(mv);
            variation.push(UciExtendedMove {
                uci_move: mv,
                san,
                fen_before,
                comment: None,
                clock_ms: None,
                evaluation_cp: None,
                depth: None,
                think_time_ms: None,
                is_book: false,
                is_tablebase: false,
                undo: Some(undo),
                variations: Vec::new(),
            });
        }
        self.mainline[ply].variations.push(variation);
        Ok(())
    }

    /// True once the current position's hash has occurred three times
    /// since the last irreversible move: the history
    /// list is only ever as long as the halfmove clock allows a repeat
    /// to have survived.
    pub fn is_threefold_repetition(&self) -> bool {
        let current = *self.hash_history.last().unwrap_or(&0);
        let window = (self.position.halfmove_clock() as usize + 1).min(self.hash_history.len());
        let start = self.hash_history.len() - window;
        self.hash_history[start..]
            .iter()
            .filter(|&&h| h == current)
            .count()
            >= 3
    }

    pub fn is_fifty_move_rule(&self) -> bool {
        self.position.halfmove_clock() >= 100
    }

    pub fn is_game_over(&self) -> bool {
        self.position.is_mate()
            || self.position.is_stalemate()
            || self.position.is_drawn_by_insufficient_material()
            || self.is_threefold_repetition()
            || self.is_fifty_move_rule()
    }

    /// Renders the full game as PGN: the tag section, then the
    /// movetext wrapped at 80 columns.
    pub fn to_pgn(&self) -> String {
        let mut out = String::new();
        let mut tag_order = vec![
            "Event", "Site", "Date", "Round", "White", "Black", "Result",
        ];
        for key in &tag_order {
            if let Some(value) = self.tags.get(*key) {
                out.push_str(&format!("[{key} \"{value}\"]\n"));
            } else if *key == "Result" {
                out.push_str(&format!("[Result \"{}\"]\n", self.result.to_pgn_str()));
            } else {
                out.push_str(&format!("[{key} \"?\"]\n"));
            }
        }
        for (key, value) in &self.tags {
            if !tag_order.contains(&key.as_str()) {
                out.push_str(&format!("[{key} \"{value}\"]\n"));
                tag_order.push(key.as_str());
            }
        }
        out.push('\n');

        let mut line = String::new();
        for (i, mv) in self.mainline.iter().enumerate() {
            let mut token = String::new();
            if i % 2 == 0 {
                token.push_str(&format!("{}. ", i / 2 + 1));
            }
            token.push_str(&mv.san);
            token.push(' ');
            if let Some(comment) = &mv.comment {
                token.push_str(&format!("{{{comment}}} "));
            }
            if line.len() + token.len() > 80 {
                out.push_str(line.trim_end());
                out.push('\n');
                line.clear();
            }
            line.push_str(&token);
        }
        line.push_str(self.result.to_pgn_str());
        out.push_str(line.trim_end());
        out.push('\n');
        out
    }
}

impl Default for Game {
    fn default() -> Self {
        Game::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accepts_legal_move_and_rejects_illegal() {
        let mut game = Game::new();
        assert!(game.add("e2e4".parse().unwrap()));
        assert!(!game.add("e2e4".parse().unwrap()));
    }

    #[test]
    fn undo_last_move_restores_position() {
        let mut game = Game::new();
        let start_fen = game.current_position().fen();
        game.add("e2e4".parse().unwrap());
        assert!(game.undo_last_move());
        assert_eq!(game.current_position().fen(), start_fen);
    }

    #[test]
    fn to_pgn_includes_tags_and_result() {
        let mut game = Game::new();
        game.set_tag("White", "Alice");
        game.set_tag("Black", "Bob");
        game.add("e2e4".parse().unwrap());
        game.add("e7e5".parse().unwrap());
        game.set_result(GameResult::Draw);
        let pgn = game.to_pgn();
        assert!(pgn.contains("[White \"Alice\"]"));
        assert!(pgn.contains("1. e4 e5 1/2-1/2"));
    }

    #[test]
    fn time_control_parses_increment_form() {
        let tc = TimeControl::parse("300+5").unwrap();
        assert_eq!(tc.base_seconds, 300);
        assert_eq!(tc.increment_seconds, 5);
    }

    #[test]
    fn time_control_parses_moves_per_session_form() {
        let tc = TimeControl::parse("40/9000:900").unwrap();
        assert_eq!(tc.moves_per_session, Some(40));
        assert_eq!(tc.base_seconds, 9000);
        assert_eq!(tc.increment_seconds, 900);
    }

    const BACK_RANK_MATE_FEN: &str = "6k1/5ppp/8/8/8/8/8/4R2K w - - 0 1";

    #[test]
    fn checkmate_sets_result_and_detail() {
        let mut game = Game::from_fen(BACK_RANK_MATE_FEN).unwrap();
        assert!(game.add("e1e8".parse().unwrap()));
        assert_eq!(game.result(), GameResult::WhiteWins);
        assert_eq!(game.result_detail(), Some(ResultDetail::Checkmate));
    }

    #[test]
    fn undo_last_move_clears_result() {
        let mut game = Game::from_fen(BACK_RANK_MATE_FEN).unwrap();
        game.add("e1e8".parse().unwrap());
        assert!(game.undo_last_move());
        assert_eq!(game.result(), GameResult::Unknown);
        assert_eq!(game.result_detail(), None);
    }

    #[test]
    fn threefold_repetition_detected() {
        let mut game = Game::new();
        for _ in 0..2 {
            game.add("g1f3".parse().unwrap());
            game.add("g8f6".parse().unwrap());
            game.add("f3g1".parse().unwrap());
            game.add("f6g8".parse().unwrap());
        }
        assert!(game.is_threefold_repetition());
    }
}
