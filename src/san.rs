//! Standard Algebraic Notation: emission from a legal move, and
//! parsing of a SAN token back into a `UciMove` against a `Position`.

use crate::board::{file_of, parse_square, rank_of, square_name, Piece, Role};
use crate::error::{Error, Result};
use crate::position::{Position, UciMove};

/// Renders `mv` as SAN, including `+`/`#` suffixes, assuming `mv` is
/// legal in `pos`. Behaviour is undefined for an illegal move
///.
pub fn to_san(pos: &Position, mv: UciMove) -> String {
    let piece = pos.piece_at(mv.from);
    let role = piece.role().expect("SAN move must originate from a piece");
    let is_castle_kingside = role == Role::King && mv.to as i32 - mv.from as i32 == 2;
    let is_castle_queenside = role == Role::King && mv.from as i32 - mv.to as i32 == 2;

    let mut san = if is_castle_kingside {
        "O-O".to_string()
    } else if is_castle_queenside {
        "O-O-O".to_string()
    } else {
        let is_capture = pos.piece_at(mv.to) != Piece::Blank
            || (role == Role::Pawn && file_of(mv.from) != file_of(mv.to));

        let mut s = String::new();
        if role == Role::Pawn {
            if is_capture {
                s.push((b'a' + file_of(mv.from)) as char);
            }
        } else {
            s.push(role.to_char());
            s.push_str(&disambiguation(pos, mv, role));
        }
        if is_capture {
            s.push('x');
        }
        s.push_str(&square_name(mv.to));
        if let Some(promo) = mv.promotion {
            s.push('=');
            s.push(promo.to_char());
        }
        s
    };

    let mut after = pos.clone();
    after.apply(mv);
    if after.is_mate() {
        san.push('#');
    } else if after.in_check(after.side_to_move()) {
        san.push('+');
    }
    san
}

fn disambiguation(pos: &Position, mv: UciMove, role: Role) -> String {
    let ambiguous: Vec<_> = pos
        .generate_legal_moves()
        .into_iter()
        .filter(|&other| {
            other.to == mv.to
                && other.from != mv.from
                && pos.piece_at(other.from).role() == Some(role)
        })
        .collect();
    if ambiguous.is_empty() {
        return String::new();
    }
    let same_file = ambiguous.iter().any(|o| file_of(o.from) == file_of(mv.from));
    let same_rank = ambiguous.iter().any(|o| rank_of(o.from) == rank_of(mv.from));
    if !same_file {
        ((b'a' + file_of(mv.from)) as char).to_string()
    } else if !same_rank {
        ((b'1' + rank_of(mv.from)) as char).to_string()
    } else {
        square_name(mv.from)
    }
}

/// Parses a SAN token (tolerating trailing `+`, `#`, `!`, `?`) into the
/// matching legal move in `pos`.
pub fn parse_san(pos: &Position, token: &str) -> Result<UciMove> {
    let trimmed = token.trim_end_matches(['+', '#', '!', '?']);
    let legal = pos.generate_legal_moves();

    if trimmed == "O-O" || trimmed == "0-0" {
        return legal
            .into_iter()
            .find(|m| pos.piece_at(m.from).role() == Some(Role::King) && m.to as i32 - m.from as i32 == 2)
            .ok_or_else(|| Error::MalformedPgn(format!("no legal kingside castle for {token}")));
    }
    if trimmed == "O-O-O" || trimmed == "0-0-0" {
        return legal
            .into_iter()
            .find(|m| pos.piece_at(m.from).role() == Some(Role::King) && m.from as i32 - m.to as i32 == 2)
            .ok_or_else(|| Error::MalformedPgn(format!("no legal queenside castle for {token}")));
    }

    let (body, promotion) = match trimmed.split_once('=') {
        Some((b, p)) => (
            b,
            Some(
                Role::from_char(p.chars().next().unwrap_or(' '))
                    .ok_or_else(|| Error::MalformedPgn(format!("bad promotion in {token}")))?,
            ),
        ),
        None => (trimmed, None),
    };

    let bytes = body.as_bytes();
    let (role, rest) = if bytes[0].is_ascii_uppercase() && bytes[0] != b'x' {
        (
            Role::from_char(bytes[0] as char)
                .ok_or_else(|| Error::MalformedPgn(format!("bad SAN: {token}")))?,
            &body[1..],
        )
    } else {
        (Role::Pawn, body)
    };

    let rest = rest.replace('x', "");
    if rest.len() < 2 {
        return Err(Error::MalformedPgn(format!("bad SAN: {token}")));
    }
    let dest_str = &rest[rest.len() - 2..];
    let to = parse_square(dest_str)
        .ok_or_else(|| Error::MalformedPgn(format!("bad destination square in {token}")))?;
    let disambig = &rest[..rest.len() - 2];

    let candidates: Vec<_> = legal
        .into_iter()
        .filter(|&m| {
            m.to == to
                && m.promotion == promotion
                && pos.piece_at(m.from).role() == Some(role)
                && disambig
                    .chars()
                    .all(|c| match c {
                        'a'..='h' => file_of(m.from) == c as u8 - b'a',
                        '1'..='8' => rank_of(m.from) == c as u8 - b'1',
                        _ => true,
                    })
        })
        .collect();

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(Error::MalformedPgn(format!("no legal move matches {token}"))),
        _ => Err(Error::MalformedPgn(format!("ambiguous SAN: {token}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_move_has_no_disambiguation() {
        let pos = Position::starting();
        let mv = "e2e4".parse::<UciMove>().unwrap();
        assert_eq!(to_san(&pos, mv), "e4");
    }

    #[test]
    fn knight_capture_is_notated() {
        let pos = Position::new("rnbqkb1r/pppp1ppp/5n2/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3")
            .unwrap();
        let mv = "f3e5".parse::<UciMove>().unwrap();
        assert_eq!(to_san(&pos, mv), "Nxe5");
    }

    #[test]
    fn castling_kingside_notation() {
        let pos = Position::new("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let mv = "e1g1".parse::<UciMove>().unwrap();
        assert_eq!(to_san(&pos, mv), "O-O");
    }

    #[test]
    fn parse_san_roundtrips_through_to_san() {
        let pos = Position::starting();
        let mv = parse_san(&pos, "Nf3").unwrap();
        assert_eq!(to_san(&pos, mv), "Nf3");
    }

    #[test]
    fn parse_san_tolerates_check_marker() {
        let pos = Position::new("4k3/8/8/8/8/8/4Q3/4K3 w - - 0 1").unwrap();
        let mv = parse_san(&pos, "Qe7+").unwrap();
        assert_eq!(mv.to, parse_square("e7").unwrap());
    }

    #[test]
    fn disambiguates_two_rooks_on_same_rank() {
        let pos = Position::new("4k3/8/8/8/8/8/8/R3K2R w - - 0 1").unwrap();
        let mv = parse_san(&pos, "Rad1").unwrap();
        assert_eq!(mv.from, parse_square("a1").unwrap());
        assert_eq!(to_san(&pos, mv), "Rad1");
    }
}
