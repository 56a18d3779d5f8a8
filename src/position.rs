//! Mutable chess position: piece placement, legality, FEN, Zobrist hash.
//!
//! Move generation is pseudo-legal-then-filter: every
//! candidate move for a piece is generated, played, checked for
//! leaving the mover's own king in check, then undone.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::board::{
    file_of, parse_square, rank_of, square, square_name, CastleFlag, Color, Piece, Role, Square,
};
use crate::error::{Error, Result};
use crate::zobrist::{self, HashKey};

/// A single chess move in UCI coordinate form, e.g. `e2e4`, `e7e8q`.
/// Castling is encoded as the king's two-square move. `NULL_MOVE` is
/// the `(a1,a1,None)` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UciMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

pub const NULL_MOVE: UciMove = UciMove {
    from: 0,
    to: 0,
    promotion: None,
};

impl UciMove {
    pub fn is_null(self) -> bool {
        self == NULL_MOVE
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", square_name(self.from), square_name(self.to))?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.to_char().to_ascii_lowercase())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for UciMove {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() < 4 || s.len() > 5 {
            return Err(Error::ProtocolError(format!("bad uci move: {s}")));
        }
        let from = parse_square(&s[0..2])
            .ok_or_else(|| Error::ProtocolError(format!("bad uci move: {s}")))?;
        let to = parse_square(&s[2..4])
            .ok_or_else(|| Error::ProtocolError(format!("bad uci move: {s}")))?;
        let promotion = if s.len() == 5 {
            Some(
                Role::from_char(s.as_bytes()[4] as char)
                    .ok_or_else(|| Error::ProtocolError(format!("bad uci move: {s}")))?,
            )
        } else {
            None
        };
        Ok(UciMove {
            from,
            to,
            promotion,
        })
    }
}

/// Everything needed to exactly reverse `Position::apply`.
#[derive(Debug, Clone, Copy)]
pub struct UndoInfo {
    pub halfmove_clock: u32,
    pub captured: Piece,
    pub ep_square: Option<Square>,
    pub castling: CastleFlag,
    pub is_promotion: bool,
    pub prior_hash: HashKey,
}

#[derive(Debug, Clone)]
pub struct Position {
    board: [Piece; 64],
    side_to_move: Color,
    castling: CastleFlag,
    ep_square: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
    hash: HashKey,
}

static FEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<board>[pnbrqkPNBRQK1-8/]+) (?P<turn>[wb]) (?P<castle>-|K?Q?k?q?) (?P<ep>-|[a-h][36])(?: (?P<half>\d+) (?P<full>\d+))?$",
    )
    .unwrap()
});

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Position {
    /// Parses a FEN string, regex-validated per Missing
    /// halfmove/fullmove fields default to `0`/`1`.
    pub fn new(fen: &str) -> Result<Position> {
        let caps = FEN_RE
            .captures(fen.trim())
            .ok_or_else(|| Error::MalformedFen(fen.to_string()))?;

        let mut board = [Piece::Blank; 64];
        let ranks: Vec<&str> = caps["board"].split('/').collect();
        if ranks.len() != 8 {
            return Err(Error::MalformedFen(fen.to_string()));
        }
        for (rank_from_top, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - rank_from_top as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(digit) = c.to_digit(10) {
                    file += digit as u8;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or_else(|| Error::MalformedFen(fen.to_string()))?;
                    if file >= 8 {
                        return Err(Error::MalformedFen(fen.to_string()));
                    }
                    board[square(file, rank) as usize] = piece;
                    file += 1;
                }
            }
            if file != 8 {
                return Err(Error::MalformedFen(fen.to_string()));
            }
        }

        let side_to_move = if &caps["turn"] == "w" {
            Color::White
        } else {
            Color::Black
        };

        let mut castling = CastleFlag::empty();
        for c in caps["castle"].chars() {
            match c {
                'K' => castling.insert(CastleFlag::WHITE_KINGSIDE),
                'Q' => castling.insert(CastleFlag::WHITE_QUEENSIDE),
                'k' => castling.insert(CastleFlag::BLACK_KINGSIDE),
                'q' => castling.insert(CastleFlag::BLACK_QUEENSIDE),
                _ => {}
            }
        }

        let ep_square = if &caps["ep"] == "-" {
            None
        } else {
            parse_square(&caps["ep"])
        };

        let halfmove_clock = caps
            .name("half")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let fullmove_number = caps
            .name("full")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);

        let mut pos = Position {
            board,
            side_to_move,
            castling,
            ep_square,
            halfmove_clock,
            fullmove_number,
            hash: 0,
        };
        pos.hash = pos.compute_hash();
        Ok(pos)
    }

    pub fn starting() -> Position {
        Position::new(STARTING_FEN).expect("starting FEN is well-formed")
    }

    /// Renders the current state as FEN. Never fails.
    pub fn fen(&self) -> String {
        let mut ranks = Vec::with_capacity(8);
        for rank in (0..8u8).rev() {
            let mut s = String::new();
            let mut empties = 0u8;
            for file in 0..8u8 {
                let piece = self.board[square(file, rank) as usize];
                match piece {
                    Piece::Blank => empties += 1,
                    _ => {
                        if empties > 0 {
                            s.push_str(&empties.to_string());
                            empties = 0;
                        }
                        s.push(piece.to_fen_char());
                    }
                }
            }
            if empties > 0 {
                s.push_str(&empties.to_string());
            }
            ranks.push(s);
        }
        let board = ranks.join("/");
        let turn = if self.side_to_move == Color::White {
            "w"
        } else {
            "b"
        };
        let mut castle = String::new();
        if self.castling.contains(CastleFlag::WHITE_KINGSIDE) {
            castle.push('K');
        }
        if self.castling.contains(CastleFlag::WHITE_QUEENSIDE) {
            castle.push('Q');
        }
        if self.castling.contains(CastleFlag::BLACK_KINGSIDE) {
            castle.push('k');
        }
        if self.castling.contains(CastleFlag::BLACK_QUEENSIDE) {
            castle.push('q');
        }
        if castle.is_empty() {
            castle.push('-');
        }
        let ep = self.ep_square.map_or("-".to_string(), square_name);
        format!(
            "{board} {turn} {castle} {ep} {} {}",
            self.halfmove_clock, self.fullmove_number
        )
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn castling(&self) -> CastleFlag {
        self.castling
    }

    pub fn en_passant(&self) -> Option<Square> {
        self.ep_square
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn hash(&self) -> HashKey {
        self.hash
    }

    pub fn piece_at(&self, sq: Square) -> Piece {
        self.board[sq as usize]
    }

    fn king_square(&self, color: Color) -> Square {
        (0..64)
            .find(|&sq| self.board[sq as usize] == Piece::Occupied(Role::King, color))
            .expect("every legal position has exactly one king per side")
    }

    /// True if `color`'s king stands on a square attacked by the other side.
    pub fn in_check(&self, color: Color) -> bool {
        self.is_square_attacked(self.king_square(color), color.opposite())
    }

    fn is_square_attacked(&self, sq: Square, by: Color) -> bool {
        // Pawns.
        let pawn_rank_delta: i32 = if by == Color::White { -1 } else { 1 };
        for df in [-1i32, 1] {
            let f = file_of(sq) as i32 + df;
            let r = rank_of(sq) as i32 + pawn_rank_delta;
            if (0..8).contains(&f) && (0..8).contains(&r) {
                let from = square(f as u8, r as u8);
                if self.board[from as usize] == Piece::Occupied(Role::Pawn, by) {
                    return true;
                }
            }
        }
        // Knights.
        for (df, dr) in KNIGHT_DELTAS {
            let f = file_of(sq) as i32 + df;
            let r = rank_of(sq) as i32 + dr;
            if (0..8).contains(&f) && (0..8).contains(&r) {
                let from = square(f as u8, r as u8);
                if self.board[from as usize] == Piece::Occupied(Role::Knight, by) {
                    return true;
                }
            }
        }
        // King.
        for (df, dr) in KING_DELTAS {
            let f = file_of(sq) as i32 + df;
            let r = rank_of(sq) as i32 + dr;
            if (0..8).contains(&f) && (0..8).contains(&r) {
                let from = square(f as u8, r as u8);
                if self.board[from as usize] == Piece::Occupied(Role::King, by) {
                    return true;
                }
            }
        }
        // Sliding pieces.
        for (deltas, roles) in [
            (ROOK_DELTAS, [Role::Rook, Role::Queen]),
            (BISHOP_DELTAS, [Role::Bishop, Role::Queen]),
        ] {
            for (df, dr) in deltas {
                let mut f = file_of(sq) as i32 + df;
                let mut r = rank_of(sq) as i32 + dr;
                while (0..8).contains(&f) && (0..8).contains(&r) {
                    let at = square(f as u8, r as u8);
                    match self.board[at as usize] {
                        Piece::Blank => {}
                        Piece::Occupied(role, c) if c == by && roles.contains(&role) => {
                            return true
                        }
                        Piece::Occupied(..) => break,
                    }
                    f += df;
                    r += dr;
                }
            }
        }
        false
    }

    /// Pseudo-legal candidates, before the own-king-in-check filter.
    fn generate_pseudo_legal(&self) -> Vec<UciMove> {
        let mut moves = Vec::new();
        let us = self.side_to_move;
        for sq in 0u8..64 {
            let piece = self.board[sq as usize];
            let (role, color) = match piece {
                Piece::Occupied(role, color) if color == us => (role, color),
                _ => continue,
            };
            match role {
                Role::Pawn => self.gen_pawn_moves(sq, color, &mut moves),
                Role::Knight => self.gen_stepping(sq, color, &KNIGHT_DELTAS, &mut moves),
                Role::King => {
                    self.gen_stepping(sq, color, &KING_DELTAS, &mut moves);
                    self.gen_castling(color, &mut moves);
                }
                Role::Rook => self.gen_sliding(sq, color, &ROOK_DELTAS, &mut moves),
                Role::Bishop => self.gen_sliding(sq, color, &BISHOP_DELTAS, &mut moves),
                Role::Queen => {
                    self.gen_sliding(sq, color, &ROOK_DELTAS, &mut moves);
                    self.gen_sliding(sq, color, &BISHOP_DELTAS, &mut moves);
                }
            }
        }
        moves
    }

    fn gen_stepping(&self, sq: Square, color: Color, deltas: &[(i32, i32)], out: &mut Vec<UciMove>) {
        for &(df, dr) in deltas {
            let f = file_of(sq) as i32 + df;
            let r = rank_of(sq) as i32 + dr;
            if !(0..8).contains(&f) || !(0..8).contains(&r) {
                continue;
            }
            let to = square(f as u8, r as u8);
            match self.board[to as usize] {
                Piece::Occupied(_, c) if c == color => {}
                _ => out.push(UciMove {
                    from: sq,
                    to,
                    promotion: None,
                }),
            }
        }
    }

    fn gen_sliding(&self, sq: Square, color: Color, deltas: &[(i32, i32)], out: &mut Vec<UciMove>) {
        for &(df, dr) in deltas {
            let mut f = file_of(sq) as i32 + df;
            let mut r = rank_of(sq) as i32 + dr;
            while (0..8).contains(&f) && (0..8).contains(&r) {
                let to = square(f as u8, r as u8);
                match self.board[to as usize] {
                    Piece::Blank => {
                        out.push(UciMove {
                            from: sq,
                            to,
                            promotion: None,
                        });
                    }
                    Piece::Occupied(_, c) => {
                        if c != color {
                            out.push(UciMove {
                                from: sq,
                                to,
                                promotion: None,
                            });
                        }
                        break;
                    }
                }
                f += df;
                r += dr;
            }
        }
    }

    fn gen_pawn_moves(&self, sq: Square, color: Color, out: &mut Vec<UciMove>) {
        let rank = rank_of(sq);
        let file = file_of(sq) as i32;
        let (dir, start_rank, promo_rank) = match color {
            Color::White => (1i32, 1u8, 7u8),
            Color::Black => (-1i32, 6u8, 0u8),
        };
        let push_one_rank = rank as i32 + dir;
        let push_to = |r: i32| -> Option<Square> {
            if (0..8).contains(&r) {
                Some(square(file as u8, r as u8))
            } else {
                None
            }
        };

        let emit = |out: &mut Vec<UciMove>, to: Square| {
            if rank_of(to) == promo_rank {
                for role in Role::PROMOTIONS {
                    out.push(UciMove {
                        from: sq,
                        to,
                        promotion: Some(role),
                    });
                }
            } else {
                out.push(UciMove {
                    from: sq,
                    to,
                    promotion: None,
                });
            }
        };

        // Single push.
        if let Some(to) = push_to(push_one_rank) {
            if self.board[to as usize] == Piece::Blank {
                emit(out, to);
                // Double push.
                if rank == start_rank {
                    if let Some(to2) = push_to(rank as i32 + 2 * dir) {
                        if self.board[to2 as usize] == Piece::Blank {
                            out.push(UciMove {
                                from: sq,
                                to: to2,
                                promotion: None,
                            });
                        }
                    }
                }
            }
        }

        // Captures (including en passant).
        for df in [-1i32, 1] {
            let cf = file + df;
            if !(0..8).contains(&cf) {
                continue;
            }
            if let Some(to) = push_to(push_one_rank) {
                let to = square(cf as u8, rank_of(to));
                match self.board[to as usize] {
                    Piece::Occupied(_, c) if c != color => emit(out, to),
                    Piece::Blank if self.ep_square == Some(to) => {
                        out.push(UciMove {
                            from: sq,
                            to,
                            promotion: None,
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    fn gen_castling(&self, color: Color, out: &mut Vec<UciMove>) {
        let (king_from, king_side, queen_side, rook_king_from, rook_queen_from, rank) = match color
        {
            Color::White => (
                4u8,
                CastleFlag::WHITE_KINGSIDE,
                CastleFlag::WHITE_QUEENSIDE,
                7u8,
                0u8,
                0u8,
            ),
            Color::Black => (
                60u8,
                CastleFlag::BLACK_KINGSIDE,
                CastleFlag::BLACK_QUEENSIDE,
                63u8,
                56u8,
                7u8,
            ),
        };
        if self.in_check(color) {
            return;
        }
        if self.castling.contains(king_side) && self.board[rook_king_from as usize] == Piece::Occupied(Role::Rook, color) {
            let f1 = square(5, rank);
            let f2 = square(6, rank);
            if self.board[f1 as usize] == Piece::Blank
                && self.board[f2 as usize] == Piece::Blank
                && !self.is_square_attacked(f1, color.opposite())
                && !self.is_square_attacked(f2, color.opposite())
            {
                out.push(UciMove {
                    from: king_from,
                    to: f2,
                    promotion: None,
                });
            }
        }
        if self.castling.contains(queen_side) && self.board[rook_queen_from as usize] == Piece::Occupied(Role::Rook, color) {
            let d1 = square(3, rank);
            let d2 = square(2, rank);
            let d3 = square(1, rank);
            if self.board[d1 as usize] == Piece::Blank
                && self.board[d2 as usize] == Piece::Blank
                && self.board[d3 as usize] == Piece::Blank
                && !self.is_square_attacked(d1, color.opposite())
                && !self.is_square_attacked(d2, color.opposite())
            {
                out.push(UciMove {
                    from: king_from,
                    to: d2,
                    promotion: None,
                });
            }
        }
    }

    /// The king's `UciMove` for a given castling right.
    pub fn castle_move(&self, flag: CastleFlag) -> UciMove {
        match flag {
            CastleFlag::WHITE_KINGSIDE => UciMove {
                from: 4,
                to: 6,
                promotion: None,
            },
            CastleFlag::WHITE_QUEENSIDE => UciMove {
                from: 4,
                to: 2,
                promotion: None,
            },
            CastleFlag::BLACK_KINGSIDE => UciMove {
                from: 60,
                to: 62,
                promotion: None,
            },
            CastleFlag::BLACK_QUEENSIDE => UciMove {
                from: 60,
                to: 58,
                promotion: None,
            },
            _ => NULL_MOVE,
        }
    }

    fn is_castling_move(&self, mv: UciMove) -> bool {
        self.board[mv.from as usize].role() == Some(Role::King)
            && (mv.from as i32 - mv.to as i32).abs() == 2
    }

    fn is_en_passant_move(&self, mv: UciMove) -> bool {
        self.board[mv.from as usize].role() == Some(Role::Pawn)
            && Some(mv.to) == self.ep_square
            && self.board[mv.to as usize] == Piece::Blank
            && file_of(mv.from) != file_of(mv.to)
    }

    /// The complete list of legal moves in the current position.
    pub fn generate_legal_moves(&self) -> Vec<UciMove> {
        let us = self.side_to_move;
        self.generate_pseudo_legal()
            .into_iter()
            .filter(|&mv| {
                let mut pos = self.clone();
                pos.apply(mv);
                !pos.in_check(us)
            })
            .collect()
    }

    fn rook_original_square_right(sq: Square) -> Option<CastleFlag> {
        match sq {
            7 => Some(CastleFlag::WHITE_KINGSIDE),
            0 => Some(CastleFlag::WHITE_QUEENSIDE),
            63 => Some(CastleFlag::BLACK_KINGSIDE),
            56 => Some(CastleFlag::BLACK_QUEENSIDE),
            _ => None,
        }
    }

    /// Mutates the position to reflect playing `mv`, assumed to come
    /// from `generate_legal_moves`. Returns the `UndoInfo` needed to
    /// reverse it.
    pub fn apply(&mut self, mv: UciMove) -> UndoInfo {
        let prior_hash = self.hash;
        let us = self.side_to_move;
        // Captured before any mutation, since it reflects the board
        // state the current ep key (if any) was XORed in under.
        let old_ep_file = self.legal_en_passant_file();
        let piece = self.board[mv.from as usize];
        let role = piece.role().expect("move must originate from a piece");
        let captured_piece = self.board[mv.to as usize];
        let is_en_passant = self.is_en_passant_move(mv);
        let is_castling = self.is_castling_move(mv);
        let is_pawn_move = role == Role::Pawn;
        let is_double_push = is_pawn_move && (mv.from as i32 - mv.to as i32).abs() == 16;

        let undo = UndoInfo {
            halfmove_clock: self.halfmove_clock,
            captured: if is_en_passant {
                Piece::Occupied(Role::Pawn, us.opposite())
            } else {
                captured_piece
            },
            ep_square: self.ep_square,
            castling: self.castling,
            is_promotion: mv.promotion.is_some(),
            prior_hash,
        };

        // Remove moving piece from origin.
        self.hash ^= zobrist::piece_square_key(piece, mv.from);
        self.board[mv.from as usize] = Piece::Blank;

        // Remove captured piece (destination, or en-passant square).
        if is_en_passant {
            let captured_sq = square(file_of(mv.to), rank_of(mv.from));
            self.hash ^= zobrist::piece_square_key(self.board[captured_sq as usize], captured_sq);
            self.board[captured_sq as usize] = Piece::Blank;
        } else if captured_piece != Piece::Blank {
            self.hash ^= zobrist::piece_square_key(captured_piece, mv.to);
        }

        // Place moving (possibly promoted) piece on destination.
        let placed = match mv.promotion {
            Some(role) => Piece::Occupied(role, us),
            None => piece,
        };
        self.hash ^= zobrist::piece_square_key(placed, mv.to);
        self.board[mv.to as usize] = placed;

        // Move the rook too, for castling.
        if is_castling {
            let (rook_from, rook_to) = match mv.to {
                6 => (7u8, 5u8),
                2 => (0u8, 3u8),
                62 => (63u8, 61u8),
                58 => (56u8, 59u8),
                _ => unreachable!("castling destination must be one of the four castle squares"),
            };
            let rook = self.board[rook_from as usize];
            self.hash ^= zobrist::piece_square_key(rook, rook_from);
            self.board[rook_from as usize] = Piece::Blank;
            self.hash ^= zobrist::piece_square_key(rook, rook_to);
            self.board[rook_to as usize] = rook;
        }

        // Castling rights.
        self.hash ^= zobrist::castle_key(self.castling);
        if role == Role::King {
            let cleared = match us {
                Color::White => CastleFlag::WHITE_KINGSIDE | CastleFlag::WHITE_QUEENSIDE,
                Color::Black => CastleFlag::BLACK_KINGSIDE | CastleFlag::BLACK_QUEENSIDE,
            };
            self.castling.remove(cleared);
        }
        if let Some(right) = Self::rook_original_square_right(mv.from) {
            self.castling.remove(right);
        }
        if let Some(right) = Self::rook_original_square_right(mv.to) {
            self.castling.remove(right);
        }
        self.hash ^= zobrist::castle_key(self.castling);

        // En-passant target. Both XORs are gated on an actual capturing
        // pawn being present, matching `compute_hash`/Polyglot: the old
        // key is undone from the mover's perspective (who held the
        // right to capture before this move), the new key is set from
        // the opponent's perspective (who holds it after).
        self.hash ^= old_ep_file.map_or(0, zobrist::en_passant_key);
        self.ep_square = if is_double_push {
            Some(square(file_of(mv.from), (rank_of(mv.from) + rank_of(mv.to)) / 2))
        } else {
            None
        };
        let new_ep_file = self.legal_en_passant_file_for(us.opposite());
        self.hash ^= new_ep_file.map_or(0, zobrist::en_passant_key);

        // Clocks.
        if is_pawn_move || captured_piece != Piece::Blank || is_en_passant {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if us == Color::Black {
            self.fullmove_number += 1;
        }

        // Side to move.
        self.hash ^= zobrist::turn_key();
        self.side_to_move = us.opposite();

        undo
    }

    /// Reverses `apply(mv)` using its `UndoInfo`. The hash is restored
    /// to the recorded prior value rather than recomputed.
    pub fn undo(&mut self, mv: UciMove, undo: &UndoInfo) {
        let moved_was = self.side_to_move.opposite();
        self.side_to_move = moved_was;
        if moved_was == Color::Black {
            self.fullmove_number -= 1;
        }
        self.halfmove_clock = undo.halfmove_clock;
        self.castling = undo.castling;
        self.ep_square = undo.ep_square;

        let is_castling = mv.promotion.is_none()
            && self.board[mv.to as usize].role() == Some(Role::King)
            && (mv.from as i32 - mv.to as i32).abs() == 2;

        let original_piece = match mv.promotion {
            Some(_) => Piece::Occupied(Role::Pawn, moved_was),
            None => self.board[mv.to as usize],
        };

        self.board[mv.to as usize] = Piece::Blank;
        self.board[mv.from as usize] = original_piece;

        let is_en_passant = original_piece.role() == Some(Role::Pawn)
            && undo.captured.role() == Some(Role::Pawn)
            && file_of(mv.from) != file_of(mv.to)
            && undo.ep_square == Some(mv.to);

        if is_en_passant {
            let captured_sq = square(file_of(mv.to), rank_of(mv.from));
            self.board[captured_sq as usize] = undo.captured;
        } else if undo.captured != Piece::Blank {
            self.board[mv.to as usize] = undo.captured;
        }

        if is_castling {
            let (rook_from, rook_to) = match mv.to {
                6 => (7u8, 5u8),
                2 => (0u8, 3u8),
                62 => (63u8, 61u8),
                58 => (56u8, 59u8),
                _ => unreachable!(),
            };
            let rook = self.board[rook_to as usize];
            self.board[rook_to as usize] = Piece::Blank;
            self.board[rook_from as usize] = rook;
        }

        self.hash = undo.prior_hash;
    }

    fn compute_hash(&self) -> HashKey {
        let mut hash = 0u64;
        for sq in 0u8..64 {
            if let piece @ Piece::Occupied(..) = self.board[sq as usize] {
                hash ^= zobrist::piece_square_key(piece, sq);
            }
        }
        hash ^= zobrist::castle_key(self.castling);
        if let Some(ep) = self.legal_en_passant_file() {
            hash ^= zobrist::en_passant_key(ep);
        }
        if self.side_to_move == Color::Black {
            hash ^= zobrist::turn_key();
        }
        hash
    }

    /// Polyglot XORs the en-passant file in only when a pseudo-legal
    /// en-passant capture is actually available.
    fn legal_en_passant_file(&self) -> Option<u8> {
        self.legal_en_passant_file_for(self.side_to_move)
    }

    /// As `legal_en_passant_file`, but for an explicit side rather
    /// than `self.side_to_move` — needed by `apply`, which must
    /// evaluate the capturing side before (to undo the prior ep key)
    /// and after (to set the new one) the side-to-move flip happens.
    fn legal_en_passant_file_for(&self, side: Color) -> Option<u8> {
        let ep = self.ep_square?;
        let capture_rank = match side {
            Color::White => 4u8,
            Color::Black => 3u8,
        };
        if rank_of(ep) != match side {
            Color::White => 5,
            Color::Black => 2,
        } {
            return None;
        }
        for df in [-1i32, 1] {
            let f = file_of(ep) as i32 + df;
            if (0..8).contains(&f)
                && self.board[square(f as u8, capture_rank) as usize]
                    == Piece::Occupied(Role::Pawn, side)
            {
                return Some(file_of(ep));
            }
        }
        None
    }

    pub fn is_mate(&self) -> bool {
        self.in_check(self.side_to_move) && self.generate_legal_moves().is_empty()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.in_check(self.side_to_move) && self.generate_legal_moves().is_empty()
    }

    pub fn is_drawn_by_insufficient_material(&self) -> bool {
        let mut minors = Vec::new();
        for sq in 0u8..64 {
            match self.board[sq as usize] {
                Piece::Occupied(Role::King, _) => {}
                Piece::Occupied(role @ (Role::Bishop | Role::Knight), color) => {
                    minors.push((role, color, sq))
                }
                Piece::Blank => {}
                Piece::Occupied(..) => return false,
            }
        }
        match minors.len() {
            0 => true,
            1 => true,
            2 => {
                let (r0, c0, s0) = minors[0];
                let (r1, c1, s1) = minors[1];
                r0 == Role::Bishop && r1 == Role::Bishop && c0 != c1 && is_light_square(s0) == is_light_square(s1)
            }
            _ => false,
        }
    }
}

fn is_light_square(sq: Square) -> bool {
    (file_of(sq) + rank_of(sq)) % 2 == 1
}

const KNIGHT_DELTAS: [(i32, i32); 8] = [
    (1, 2),
    (2, 1),
    (-1, 2),
    (-2, 1),
    (1, -2),
    (2, -1),
    (-1, -2),
    (-2, -1),
];
const KING_DELTAS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const ROOK_DELTAS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DELTAS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_has_twenty_legal_moves() {
        let pos = Position::starting();
        assert_eq!(pos.generate_legal_moves().len(), 20);
    }

    #[test]
    fn e2e4_updates_fen_and_ep_square() {
        let mut pos = Position::starting();
        let mv = "e2e4".parse::<UciMove>().unwrap();
        pos.apply(mv);
        assert_eq!(
            pos.fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn ep_hash_matches_fen_reparse_when_no_capture_is_available() {
        // After 1.e4 no black pawn stands on d7/f7... rather, none of
        // black's pawns can actually capture on e3 (the adjacent
        // d7/f7 pawns haven't moved), so the ep file must not be
        // folded into the hash, matching `compute_hash` on reparse.
        let mut pos = Position::starting();
        pos.apply("e2e4".parse().unwrap());
        let reparsed = Position::new(&pos.fen()).unwrap();
        assert_eq!(pos.hash(), reparsed.hash());
    }

    #[test]
    fn ep_hash_folds_file_in_when_a_capture_is_available() {
        // White's e5 pawn can capture en passant on d6, so the ep
        // file must be folded into the hash, matching `compute_hash`
        // on reparse.
        let mut pos = Position::new("4k3/3p4/8/4P3/8/8/8/4K3 b - - 0 1").unwrap();
        pos.apply("d7d5".parse().unwrap());
        assert_eq!(pos.en_passant(), parse_square("d6"));
        let reparsed = Position::new(&pos.fen()).unwrap();
        assert_eq!(pos.hash(), reparsed.hash());
    }

    #[test]
    fn apply_undo_round_trip_preserves_everything() {
        let start = Position::starting();
        for mv in start.generate_legal_moves() {
            let mut pos = start.clone();
            let undo = pos.apply(mv);
            pos.undo(mv, &undo);
            assert_eq!(pos.fen(), start.fen());
            assert_eq!(pos.hash(), start.hash());
        }
    }

    #[test]
    fn fen_round_trip() {
        let fen = "r1bqkb1r/ppp1pppp/8/8/3nn3/2N5/PPP2PPP/R1BQKB1R w KQkq - 0 1";
        let pos = Position::new(fen).unwrap();
        assert_eq!(pos.fen(), fen);
    }

    #[test]
    fn malformed_fen_is_rejected() {
        assert!(Position::new("not a fen").is_err());
    }

    #[test]
    fn castling_both_sides_legal_and_clears_only_kingside_right() {
        let pos = Position::new("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let moves = pos.generate_legal_moves();
        assert!(moves.contains(&"e1g1".parse().unwrap()));
        assert!(moves.contains(&"e1c1".parse().unwrap()));

        let mut after = pos.clone();
        after.apply("e1g1".parse().unwrap());
        assert_eq!(
            after.fen(),
            "r3k2r/8/8/8/8/8/8/R4RK1 b kq - 1 1"
        );
    }

    #[test]
    fn en_passant_capture_is_generated_and_applied() {
        let mut pos = Position::new("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let mv: UciMove = "e5d6".parse().unwrap();
        assert!(pos.generate_legal_moves().contains(&mv));
        pos.apply(mv);
        assert_eq!(pos.piece_at(parse_square("d5").unwrap()), Piece::Blank);
    }

    #[test]
    fn promotion_emits_four_moves() {
        let pos = Position::new("8/4P3/8/8/8/8/4k3/4K3 w - - 0 1").unwrap();
        let promos: Vec<_> = pos
            .generate_legal_moves()
            .into_iter()
            .filter(|m| m.from == parse_square("e7").unwrap())
            .collect();
        assert_eq!(promos.len(), 4);
    }

    #[test]
    fn insufficient_material_same_color_bishops() {
        let pos = Position::new("4k3/8/8/8/8/2b5/8/3KB3 w - - 0 1").unwrap();
        assert!(pos.is_drawn_by_insufficient_material());
    }
}
