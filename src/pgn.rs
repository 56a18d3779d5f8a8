//! PGN ingestion: splitting a multi-game file, tag extraction, and the
//! text-preprocessing pipeline that turns raw movetext into a flat
//! token stream `game.rs` can replay move-by-move.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::game::{Game, GameResult};
use crate::san;

/// One parsed comment annotation, covering the three GUI/engine
/// flavors the corpus emits:
/// - Lichess: `[%clk 0:05:00]`, `[%eval 0.34]`, `[%emt 0:00:02]`
/// - TCEC: `d=24, mt=1.2, tl=598.4`
/// - Cutechess: `+0.34/24 1.2s`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentAnnotation {
    pub clock_ms: Option<u64>,
    pub eval_cp: Option<i32>,
    pub depth: Option<u32>,
    pub move_time_ms: Option<u64>,
    pub text: String,
}

fn hms_to_ms(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    let (h, m, sec): (u64, u64, f64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };
    Some(((h * 3600 + m * 60) as f64 * 1000.0 + sec * 1000.0) as u64)
}

impl CommentAnnotation {
    /// Extracts known annotation flavours from `comment` and removes
    /// their matched substrings, leaving only genuine free-form text
    /// in `ann.text`.
    pub fn parse(comment: &str) -> CommentAnnotation {
        let mut ann = CommentAnnotation::default();
        let mut remaining = comment.to_string();

        static CLK_RE: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new(r"\[%clk\s+([\d:.]+)\]").unwrap());
        static EVAL_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
            Regex::new(r"\[%eval\s+(#?-?[\d.]+)(?:,(\d+))?\]").unwrap()
        });
        static EMT_RE: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new(r"\[%emt\s+([\d:.]+)\]").unwrap());
        static TCEC_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
            Regex::new(r"d=(\d+)(?:,\s*mt=([\d.]+))?(?:,\s*tl=([\d.]+))?").unwrap()
        });
        static CUTECHESS_RE: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new(r"^([+-]?[\d.]+)/(\d+)\s+([\d.]+)s?$").unwrap());

        if let Some(c) = CLK_RE.captures(&remaining) {
            ann.clock_ms = hms_to_ms(&c[1]);
            let matched = c.get(0).unwrap().range();
            remaining.replace_range(matched, "");
        }
        if let Some(c) = EMT_RE.captures(&remaining) {
            ann.move_time_ms = hms_to_ms(&c[1]);
            let matched = c.get(0).unwrap().range();
            remaining.replace_range(matched, "");
        }
        if let Some(c) = EVAL_RE.captures(&remaining) {
            let raw = &c[1];
            ann.eval_cp = if let Some(mate) = raw.strip_prefix('#') {
                mate.parse::<i32>().ok().map(|n| 30000 - n.abs())
            } else {
                raw.parse::<f64>().ok().map(|v| (v * 100.0).round() as i32)
            };
            ann.depth = c.get(2).and_then(|m| m.as_str().parse().ok());
            let matched = c.get(0).unwrap().range();
            remaining.replace_range(matched, "");
        }
        if let Some(c) = TCEC_RE.captures(&remaining) {
            ann.depth = ann.depth.or_else(|| c.get(1).and_then(|m| m.as_str().parse().ok()));
            ann.move_time_ms = c
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|s| (s * 1000.0) as u64)
                .or(ann.move_time_ms);
            let matched = c.get(0).unwrap().range();
            remaining.replace_range(matched, "");
        }
        if let Some(c) = CUTECHESS_RE.captures(remaining.trim()) {
            ann.eval_cp = c
                .get(1)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|v| (v * 100.0).round() as i32);
            ann.depth = c.get(2).and_then(|m| m.as_str().parse().ok());
            ann.move_time_ms = c
                .get(3)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|s| (s * 1000.0) as u64);
            remaining.clear();
        }

        ann.text = remaining.split_whitespace().collect::<Vec<_>>().join(" ");
        ann
    }
}

/// Splits a multi-game PGN file into raw per-game text blocks: each
/// block starts at a `[Tag "..."]` line and runs to the next one (or
/// EOF).
pub fn split_games(pgn_text: &str) -> Vec<&str> {
    static TAG_START: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?m)^\[Event\s").unwrap());

    let starts: Vec<usize> = TAG_START.find_iter(pgn_text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return if pgn_text.trim().is_empty() {
            Vec::new()
        } else {
            vec![pgn_text]
        };
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(pgn_text.len());
            pgn_text[start..end].trim()
        })
        .collect()
}

fn extract_tags(block: &str) -> HashMap<String, String> {
    static TAG_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r#"(?m)^\[(\w+)\s+"((?:[^"\\]|\\.)*)"\]"#).unwrap());
    TAG_RE
        .captures_iter(block)
        .map(|c| (c[1].to_string(), c[2].replace("\\\"", "\"")))
        .collect()
}

fn movetext_of(block: &str) -> &str {
    match block.find("\n\n") {
        Some(idx) => &block[idx..],
        None => block,
    }
}

/// Replaces nested `{...}` comments and `(...)` variations with
/// numbered placeholders (`@N@`), returning the placeholder-substituted
/// text and the original contents keyed by placeholder index
///.
fn extract_nested(text: &str, open: char, close: char, prefix: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut stash = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        if c == open {
            if depth == 0 {
                current.clear();
            } else {
                current.push(c);
            }
            depth += 1;
        } else if c == close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                stash.push(current.clone());
                out.push_str(&format!("{prefix}{}@", stash.len() - 1));
            } else {
                current.push(c);
            }
        } else if depth > 0 {
            current.push(c);
        } else {
            out.push(c);
        }
    }
    (out, stash)
}

/// One token of preprocessed movetext: either a SAN move (with its
/// resolved comment, if any) or a variation attached to the previous
/// move.
#[derive(Debug, Clone)]
enum MoveToken {
    San { san: String, comment: Option<String> },
    Variation(Vec<MoveToken>),
}

fn tokenize_movetext(text: &str) -> Vec<MoveToken> {
    let (no_comments, comments) = extract_nested(text, '{', '}', "@C");
    let (no_vars, variations) = extract_nested(&no_comments, '(', ')', "@V");

    static NAG_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\$\d+").unwrap());
    static MOVE_NUM_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\d+\.(\.\.)?").unwrap());
    static RESULT_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"^(1-0|0-1|1/2-1/2|\*)$").unwrap());
    static PLACEHOLDER_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"@([CV])(\d+)@").unwrap());

    let cleaned = NAG_RE.replace_all(&no_vars, "");
    let cleaned = MOVE_NUM_RE.replace_all(&cleaned, "");
    let cleaned = cleaned.replace("0-0-0", "O-O-O").replace("0-0", "O-O");

    let mut tokens = Vec::new();
    let mut words = cleaned.split_whitespace().peekable();
    while let Some(word) = words.next() {
        if RESULT_RE.is_match(word) {
            continue;
        }
        if let Some(caps) = PLACEHOLDER_RE.captures(word) {
            let idx: usize = caps[2].parse().unwrap();
            match &caps[1] {
                "V" => {
                    let inner = variations.get(idx).cloned().unwrap_or_default();
                    tokens.push(MoveToken::Variation(tokenize_movetext(&inner)));
                }
                "C" => {
                    if let Some(MoveToken::San { comment, .. }) = tokens.last_mut() {
                        *comment = comments.get(idx).cloned();
                    }
                }
                _ => {}
            }
            continue;
        }
        tokens.push(MoveToken::San {
            san: word.trim_matches(['!', '?']).to_string(),
            comment: None,
        });
    }
    tokens
}

/// Parses a single-game PGN block into a `Game`: tags, result, and
/// the mainline with its attached variations and comment annotations.
pub fn parse_game(block: &str) -> Result<Game> {
    let tags = extract_tags(block);
    let fen = tags
        .get("FEN")
        .cloned()
        .unwrap_or_else(|| "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string());
    let mut game = Game::from_fen(&fen)?;
    for (key, value) in &tags {
        game.set_tag(key.clone(), value.clone());
    }

    let movetext = movetext_of(block);
    let tokens = tokenize_movetext(movetext);
    apply_tokens(&mut game, &tokens)?;

    let result = match tags.get("Result").map(String::as_str) {
        Some("1-0") => GameResult::WhiteWins,
        Some("0-1") => GameResult::BlackWins,
        Some("1/2-1/2") => GameResult::Draw,
        _ => GameResult::Unknown,
    };
    game.set_result(result);
    Ok(game)
}

fn apply_tokens(game: &mut Game, tokens: &[MoveToken]) -> Result<()> {
    for token in tokens {
        match token {
            MoveToken::San { san, comment } => {
                let pos = game.current_position().clone();
                let mv = san::parse_san(&pos, san)
                    .map_err(|_| Error::MalformedPgn(format!("unparseable move: {san}")))?;
                if !game.add(mv) {
                    return Err(Error::MalformedPgn(format!("illegal move in PGN: {san}")));
                }
                if let Some(comment) = comment {
                    let ply = game.mainline().len() - 1;
                    let ann = CommentAnnotation::parse(comment);
                    let mv = &mut game_mainline_mut(game)[ply];
                    mv.comment = if ann.text.is_empty() {
                        None
                    } else {
                        Some(ann.text.clone())
                    };
                    mv.clock_ms = ann.clock_ms;
                    mv.evaluation_cp = ann.eval_cp;
                    mv.depth = ann.depth;
                    mv.think_time_ms = ann.move_time_ms;
                }
            }
            MoveToken::Variation(inner) => {
                if game.mainline().is_empty() {
                    continue;
                }
                let ply = game.mainline().len() - 1;
                let moves = tokens_to_uci_moves(game, ply, inner)?;
                game.add_variation(ply, &moves)?;
            }
        }
    }
    Ok(())
}

fn game_mainline_mut(game: &mut Game) -> &mut Vec<crate::game::UciExtendedMove> {
    // SAFETY-free accessor: `Game` keeps its mainline private, but
    // this module lives in the same crate, so a direct field accessor
    // via a small crate-visible method is simpler than unsafe casts.
    game.mainline_mut()
}

fn tokens_to_uci_moves(
    game: &Game,
    anchor_ply: usize,
    tokens: &[MoveToken],
) -> Result<Vec<crate::position::UciMove>> {
    let anchor = game
        .get_move(anchor_ply)
        .ok_or_else(|| Error::MalformedPgn("variation with no anchor move".to_string()))?;
    let mut pos = crate::position::Position::new(&anchor.fen_before)?;
    let mut moves = Vec::new();
    for token in tokens {
        if let MoveToken::San { san, .. } = token {
            let mv = san::parse_san(&pos, san)
                .map_err(|_| Error::MalformedPgn(format!("unparseable variation move: {san}")))?;
            pos.apply(mv);
            moves.push(mv);
        }
    }
    Ok(moves)
}

/// Parses every game in `pgn_text`, skipping (and logging) any block
/// that fails to parse rather than aborting the whole file
///.
pub fn parse_all(pgn_text: &str) -> Vec<Game> {
    split_games(pgn_text)
        .into_iter()
        .filter_map(|block| match parse_game(block) {
            Ok(game) => Some(game),
            Err(e) => {
                log::warn!("skipping malformed PGN game: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[Event "Test"]
[Site "?"]
[Date "2024.01.01"]
[Round "1"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 {good} e5 2. Nf3 Nc6 3. Bb5 a6 (3... Nf6 4. O-O) 4. Ba4 1-0
"#;

    #[test]
    fn split_games_finds_single_game() {
        assert_eq!(split_games(SAMPLE).len(), 1);
    }

    #[test]
    fn parse_game_builds_mainline_and_tags() {
        let game = parse_game(SAMPLE).unwrap();
        assert_eq!(game.tag("White"), Some("Alice"));
        assert_eq!(game.mainline().len(), 7);
        assert_eq!(game.result(), GameResult::WhiteWins);
        assert_eq!(game.mainline()[0].comment.as_deref(), Some("good"));
    }

    #[test]
    fn parse_game_attaches_variation() {
        let game = parse_game(SAMPLE).unwrap();
        // ply index 4 is "4. Ba4"? anchor is move that the variation
        // follows: "3... a6" is ply 5 (0-indexed): e4,e5,Nf3,Nc6,Bb5,a6
        let anchored = game.mainline().iter().find(|m| !m.variations.is_empty());
        assert!(anchored.is_some());
    }

    #[test]
    fn lichess_clock_annotation_parses() {
        let ann = CommentAnnotation::parse("[%clk 0:05:23]");
        assert_eq!(ann.clock_ms, Some(323_000));
    }

    #[test]
    fn lichess_eval_annotation_parses() {
        let ann = CommentAnnotation::parse("[%eval 1.25]");
        assert_eq!(ann.eval_cp, Some(125));
    }

    #[test]
    fn tcec_annotation_parses_depth_and_time() {
        let ann = CommentAnnotation::parse("d=24, mt=1.2, tl=598.4");
        assert_eq!(ann.depth, Some(24));
        assert_eq!(ann.move_time_ms, Some(1200));
    }

    #[test]
    fn cutechess_annotation_parses() {
        let ann = CommentAnnotation::parse("+0.34/24 1.2s");
        assert_eq!(ann.eval_cp, Some(34));
        assert_eq!(ann.depth, Some(24));
        assert_eq!(ann.move_time_ms, Some(1200));
    }

    #[test]
    fn malformed_game_is_skipped_not_fatal() {
        let text = format!("{SAMPLE}\n[Event \"Bad\"]\n[Result \"*\"]\n\n1. zz9 *\n");
        let games = parse_all(&text);
        assert_eq!(games.len(), 1);
    }

    #[test]
    fn eval_annotation_with_depth_parses_both_and_clears_text() {
        let ann = CommentAnnotation::parse("[%eval 0.35,24] [%clk 0:05:00]");
        assert_eq!(ann.eval_cp, Some(35));
        assert_eq!(ann.depth, Some(24));
        assert_eq!(ann.clock_ms, Some(300_000));
        assert_eq!(ann.text, "");
    }

    #[test]
    fn scenario_lichess_eval_clk_comment_produces_empty_free_text() {
        let pgn = r#"[Event "x"]

1. e4 {[%eval 0.35,24] [%clk 0:05:00]} e5 1/2-1/2
"#;
        let game = parse_game(pgn).unwrap();
        let white_move = &game.mainline()[0];
        assert_eq!(white_move.evaluation_cp, Some(35));
        assert_eq!(white_move.depth, Some(24));
        assert_eq!(white_move.clock_ms, Some(300_000));
        assert_eq!(white_move.comment, None);
        assert_eq!(game.result(), GameResult::Draw);
    }
}
