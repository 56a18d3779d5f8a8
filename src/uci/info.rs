//! Parsing of UCI `info ...` lines into `UciEngineInfo` records.
//!
//! Parses the wire text directly rather than depending on an external
//! UCI parser crate.

use crate::position::UciMove;

/// An engine evaluation, either in centipawns or as a mate-in-N count,
/// together with the bound type the engine reported it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Exact,
    LowerBound,
    UpperBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreInfo {
    pub score: Score,
    pub bound: ScoreBound,
}

/// One parsed `info` line. `multipv` is 1-indexed as UCI specifies
///; absent fields are `None`/empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UciEngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub multipv: Option<u32>,
    pub currmove: Option<String>,
    pub currmovenumber: Option<u32>,
    pub hashfull: Option<u32>,
    pub tbhits: Option<u64>,
    pub pv: Vec<String>,
    pub score: Option<ScoreInfo>,
}

impl Default for Score {
    fn default() -> Self {
        Score::Centipawns(0)
    }
}

impl Score {
    /// Folds mate-in-N into an out-of-range centipawn value that still
    /// orders correctly against any realistic centipawn evaluation.
    pub fn to_cp(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) if n >= 0 => 30000 - n,
            Score::Mate(n) => -30000 - n,
        }
    }
}

impl UciEngineInfo {
    /// Parses an `info ...` UCI line. Unknown/unsupported tokens are
    /// skipped rather than rejected, matching UCI's forward-compatible
    /// design: engines may emit fields this driver doesn't know about.
    pub fn parse(line: &str) -> Option<UciEngineInfo> {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.next()? != "info" {
            return None;
        }

        let mut info = UciEngineInfo::default();

        while let Some(tok) = tokens.next() {
            match tok {
                "depth" => info.depth = tokens.next().and_then(|v| v.parse().ok()),
                "seldepth" => info.seldepth = tokens.next().and_then(|v| v.parse().ok()),
                "time" => info.time_ms = tokens.next().and_then(|v| v.parse().ok()),
                "nodes" => info.nodes = tokens.next().and_then(|v| v.parse().ok()),
                "nps" => info.nps = tokens.next().and_then(|v| v.parse().ok()),
                "multipv" => info.multipv = tokens.next().and_then(|v| v.parse().ok()),
                "currmove" => info.currmove = tokens.next().map(str::to_string),
                "currmovenumber" => {
                    info.currmovenumber = tokens.next().and_then(|v| v.parse().ok())
                }
                "hashfull" => info.hashfull = tokens.next().and_then(|v| v.parse().ok()),
                "tbhits" => info.tbhits = tokens.next().and_then(|v| v.parse().ok()),
                "score" => {
                    let kind = tokens.next();
                    let value: Option<i32> = tokens
                        .peek()
                        .and_then(|v| v.parse().ok())
                        .inspect(|_| {
                            tokens.next();
                        });
                    let score = match (kind, value) {
                        (Some("cp"), Some(v)) => Some(Score::Centipawns(v)),
                        (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                        _ => None,
                    };
                    let bound = match tokens.peek().copied() {
                        Some("lowerbound") => {
                            tokens.next();
                            ScoreBound::LowerBound
                        }
                        Some("upperbound") => {
                            tokens.next();
                            ScoreBound::UpperBound
                        }
                        _ => ScoreBound::Exact,
                    };
                    if let Some(score) = score {
                        info.score = Some(ScoreInfo { score, bound });
                    }
                }
                "pv" => {
                    info.pv = tokens.by_ref().map(str::to_string).collect();
                    break;
                }
                "string" => {
                    break;
                }
                _ => {}
            }
        }

        Some(info)
    }

    /// True iff this line carried a `score` field — the signal the
    /// driver uses to decide whether an info line completes a MultiPV
    /// slot.
    pub fn has_score(&self) -> bool {
        self.score.is_some()
    }

    /// Parses `pv` into `UciMove`s, dropping any malformed trailing
    /// token rather than failing the whole line.
    pub fn pv_moves(&self) -> Vec<UciMove> {
        self.pv.iter().filter_map(|m| m.parse().ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_depth_score_and_pv() {
        let line = "info depth 12 seldepth 18 multipv 1 score cp 34 nodes 10000 nps 500000 time 20 pv e2e4 e7e5 g1f3";
        let info = UciEngineInfo::parse(line).unwrap();
        assert_eq!(info.depth, Some(12));
        assert_eq!(info.multipv, Some(1));
        assert_eq!(
            info.score,
            Some(ScoreInfo {
                score: Score::Centipawns(34),
                bound: ScoreBound::Exact
            })
        );
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
        assert!(info.has_score());
    }

    #[test]
    fn parses_mate_score_with_bound() {
        let info = UciEngineInfo::parse("info depth 5 score mate -3 lowerbound").unwrap();
        assert_eq!(
            info.score,
            Some(ScoreInfo {
                score: Score::Mate(-3),
                bound: ScoreBound::LowerBound
            })
        );
    }

    #[test]
    fn non_info_line_returns_none() {
        assert!(UciEngineInfo::parse("bestmove e2e4").is_none());
    }

    #[test]
    fn info_without_score_has_score_false() {
        let info = UciEngineInfo::parse("info depth 1 currmove e2e4 currmovenumber 1").unwrap();
        assert!(!info.has_score());
        assert_eq!(info.currmove.as_deref(), Some("e2e4"));
    }
}
