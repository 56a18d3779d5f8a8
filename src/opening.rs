//! Process-global ECO opening lookup, lazily built from an embedded
//! JSON blob the first time it's queried.
//!
//! Matching is tiered: try an exact FEN match first, then
//! board+turn+counters, then board+turn alone, so positions reached
//! by transposition or with stripped move counters still resolve to
//! an opening.

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::position::Position;
use crate::san;

const ECO_JSON: &str = include_str!("../data/eco.json");

#[derive(Debug, Deserialize)]
struct OpeningRecord {
    eco: String,
    name: String,
    pgn: String,
}

#[derive(Debug, Clone)]
struct Opening {
    eco: String,
    name: String,
    fen: String,
}

/// `eco`/`opening`/`variation`, split from the combined name as
/// `"Opening: Variation"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningInfo {
    pub eco: String,
    pub opening: String,
    pub variation: String,
}

fn fen_fields(fen: &str) -> Vec<&str> {
    fen.split_whitespace().collect()
}

fn build_table() -> Vec<Opening> {
    let records: Vec<OpeningRecord> = serde_json::from_str(ECO_JSON)
        .expect("embedded eco.json must be well-formed");
    let mut openings = vec![Opening {
        eco: "Extra".to_string(),
        name: "Starting Position".to_string(),
        fen: Position::starting().fen(),
    }];
    for record in records {
        let mut pos = Position::starting();
        let mut ok = true;
        for token in record.pgn.split_whitespace() {
            if token.ends_with('.') {
                continue;
            }
            match san::parse_san(&pos, token) {
                Ok(mv) => {
                    pos.apply(mv);
                }
                Err(_) => {
                    log::warn!("skipping unparseable move {token} in opening {}", record.name);
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            openings.push(Opening {
                eco: record.eco,
                name: record.name,
                fen: pos.fen(),
            });
        }
    }
    openings
}

static OPENINGS: Lazy<Vec<Opening>> = Lazy::new(build_table);

fn split_name(full_name: &str) -> (String, String) {
    if let Some((opening, variation)) = full_name.split_once(':') {
        (opening.trim().to_string(), variation.trim().to_string())
    } else {
        (full_name.trim().to_string(), String::new())
    }
}

/// Looks up `fen`'s opening with tiered matching. Returns
/// `Error::MalformedFen` only if `fen` itself doesn't parse; no match
/// is reported via `Ok(None)`.
pub fn get_opening_info_from_fen(fen: &str) -> Result<Option<OpeningInfo>> {
    let pos = Position::new(fen)?;
    let target = pos.fen();
    let target_fields = fen_fields(&target);

    let exact = OPENINGS.iter().find(|o| o.fen == target);
    let loose = exact.or_else(|| {
        OPENINGS.iter().find(|o| {
            let f = fen_fields(&o.fen);
            f.len() == 6
                && target_fields.len() == 6
                && f[0] == target_fields[0]
                && f[1] == target_fields[1]
                && f[4] == target_fields[4]
                && f[5] == target_fields[5]
        })
    });
    let loosest = loose.or_else(|| {
        OPENINGS.iter().find(|o| {
            let f = fen_fields(&o.fen);
            !f.is_empty() && !target_fields.is_empty() && f[0] == target_fields[0] && f[1] == target_fields[1]
        })
    });

    Ok(loosest.map(|o| {
        let (opening, variation) = split_name(&o.name);
        OpeningInfo {
            eco: o.eco.clone(),
            opening,
            variation,
        }
    }))
}

/// Looks up an opening by its exact recorded name, returning the FEN
/// it resolves to.
pub fn get_fen_from_name(name: &str) -> Result<String> {
    OPENINGS
        .iter()
        .find(|o| o.name == name)
        .map(|o| o.fen.clone())
        .ok_or_else(|| Error::ProtocolError(format!("no opening named {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_resolves() {
        let info = get_opening_info_from_fen(&Position::starting().fen())
            .unwrap()
            .unwrap();
        assert_eq!(info.opening, "Starting Position");
    }

    #[test]
    fn ruy_lopez_resolves_by_exact_match() {
        let mut pos = Position::starting();
        for mv in ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"] {
            pos.apply(mv.parse().unwrap());
        }
        let info = get_opening_info_from_fen(&pos.fen()).unwrap().unwrap();
        assert_eq!(info.eco, "C60");
        assert_eq!(info.opening, "Ruy Lopez");
    }

    #[test]
    fn loose_match_ignores_move_counters() {
        let mut pos = Position::starting();
        for mv in ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"] {
            pos.apply(mv.parse().unwrap());
        }
        let mut fen = pos.fen();
        // Corrupt the halfmove/fullmove counters; board+turn still match.
        fen = fen.rsplit_once(' ').map(|(head, _)| format!("{head} 99")).unwrap();
        let info = get_opening_info_from_fen(&fen).unwrap().unwrap();
        assert_eq!(info.eco, "C60");
    }

    #[test]
    fn fen_from_name_resolves_known_opening() {
        let fen = get_fen_from_name("Starting Position").unwrap();
        assert_eq!(fen, Position::starting().fen());
    }

    #[test]
    fn fen_from_name_rejects_unknown_opening() {
        assert!(get_fen_from_name("Not A Real Opening").is_err());
    }

    #[test]
    fn unknown_position_returns_none() {
        let pos = Position::new("4k3/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        assert!(get_opening_info_from_fen(&pos.fen()).unwrap().is_none());
    }
}
