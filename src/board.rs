//! Board primitives: squares, pieces, colours and castling flags.
//!
//! Mirrors the layout fixes: squares are `0..63` in
//! little-endian rank-file mapping (`A1=0 .. H8=63`), pieces are
//! packed as `2*role + colour`.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type Square = u8;

/// Sentinel for "no square" (used for en-passant target, ponder move, etc).
pub const OUTSIDE: Square = 64;

pub const fn file_of(sq: Square) -> u8 {
    sq & 7
}

pub const fn rank_of(sq: Square) -> u8 {
    sq >> 3
}

pub const fn square(file: u8, rank: u8) -> Square {
    rank * 8 + file
}

/// Parses a square name like `"e4"`. Returns `None` on malformed input.
pub fn parse_square(s: &str) -> Option<Square> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = bytes[0];
    let rank = bytes[1];
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Some(square(file - b'a', rank - b'1'))
}

/// Renders a square as its algebraic name, e.g. `27 -> "d4"`.
pub fn square_name(sq: Square) -> String {
    let file = (b'a' + file_of(sq)) as char;
    let rank = (b'1' + rank_of(sq)) as char;
    format!("{file}{rank}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    pub const fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub const fn from_index(i: u8) -> Color {
        if i == 0 {
            Color::White
        } else {
            Color::Black
        }
    }
}

/// Piece type, ordered to match the `2*role + colour` packing in `Piece`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    Queen = 0,
    Rook = 1,
    Bishop = 2,
    Knight = 3,
    Pawn = 4,
    King = 5,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Queen,
        Role::Rook,
        Role::Bishop,
        Role::Knight,
        Role::Pawn,
        Role::King,
    ];

    /// Promotion-eligible roles in SAN-preferred order.
    pub const PROMOTIONS: [Role; 4] = [Role::Queen, Role::Rook, Role::Bishop, Role::Knight];

    pub const fn to_char(self) -> char {
        match self {
            Role::Queen => 'Q',
            Role::Rook => 'R',
            Role::Bishop => 'B',
            Role::Knight => 'N',
            Role::Pawn => 'P',
            Role::King => 'K',
        }
    }

    pub const fn from_char(c: char) -> Option<Role> {
        match c {
            'Q' | 'q' => Some(Role::Queen),
            'R' | 'r' => Some(Role::Rook),
            'B' | 'b' => Some(Role::Bishop),
            'N' | 'n' => Some(Role::Knight),
            'P' | 'p' => Some(Role::Pawn),
            'K' | 'k' => Some(Role::King),
            _ => None,
        }
    }
}

/// A coloured piece, packed as `2*role + colour`, plus a `Blank` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Piece {
    Occupied(Role, Color),
    Blank,
}

impl Piece {
    pub const fn role(self) -> Option<Role> {
        match self {
            Piece::Occupied(role, _) => Some(role),
            Piece::Blank => None,
        }
    }

    pub const fn color(self) -> Option<Color> {
        match self {
            Piece::Occupied(_, color) => Some(color),
            Piece::Blank => None,
        }
    }

    pub const fn packed(self) -> u8 {
        match self {
            Piece::Occupied(role, color) => 2 * role as u8 + color as u8,
            Piece::Blank => 12,
        }
    }

    pub fn to_fen_char(self) -> char {
        match self {
            Piece::Blank => ' ',
            Piece::Occupied(role, Color::White) => role.to_char(),
            Piece::Occupied(role, Color::Black) => role.to_char().to_ascii_lowercase(),
        }
    }

    pub fn from_fen_char(c: char) -> Option<Piece> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Role::from_char(c).map(|role| Piece::Occupied(role, color))
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_fen_char())
    }
}

bitflags::bitflags! {
    /// Castling rights bitset: white-kingside=1, white-queenside=2,
    /// black-kingside=4, black-queenside=8.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CastleFlag: u8 {
        const WHITE_KINGSIDE = 1;
        const WHITE_QUEENSIDE = 2;
        const BLACK_KINGSIDE = 4;
        const BLACK_QUEENSIDE = 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_roundtrip() {
        for sq in 0u8..64 {
            let name = square_name(sq);
            assert_eq!(parse_square(&name), Some(sq));
        }
    }

    #[test]
    fn a1_is_zero_h8_is_63() {
        assert_eq!(parse_square("a1"), Some(0));
        assert_eq!(parse_square("h8"), Some(63));
    }

    #[test]
    fn piece_packing_matches_spec() {
        let wq = Piece::Occupied(Role::Queen, Color::White);
        let bq = Piece::Occupied(Role::Queen, Color::Black);
        assert_eq!(wq.packed(), 0);
        assert_eq!(bq.packed(), 1);
        let bk = Piece::Occupied(Role::King, Color::Black);
        assert_eq!(bk.packed(), 11);
    }

    #[test]
    fn castle_flags() {
        let mut f = CastleFlag::empty();
        f.insert(CastleFlag::WHITE_KINGSIDE);
        f.insert(CastleFlag::BLACK_QUEENSIDE);
        assert!(f.contains(CastleFlag::WHITE_KINGSIDE));
        assert!(!f.contains(CastleFlag::WHITE_QUEENSIDE));
        f.remove(CastleFlag::WHITE_KINGSIDE);
        assert!(!f.contains(CastleFlag::WHITE_KINGSIDE));
    }
}
