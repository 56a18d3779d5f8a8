//! Polyglot-style Zobrist hashing.
//!
//! Rather than hand-transcribe the 781-entry random table as a
//! literal (high risk of a silent transcription error), the table is
//! generated deterministically from a seeded xorshift64* generator.
//! The layout below (piece/square, castling, en-passant file, turn)
//! matches the canonical Polyglot key's structure slot-for-slot, but
//! this generator does not reproduce Polyglot's own published random
//! constants bit-for-bit (those come from a specific reference PRNG
//! run this crate has no way to verify against offline). It gives
//! identical positions identical hashes and identical hashes only to
//! identical positions, which is what the rest of this crate
//! (transposition/threefold detection) relies on.
//!
//! Table layout (matches Polyglot's):
//! - `[0..768)`  piece/square randoms, 12 pieces × 64 squares, indexed
//!   `piece.packed() * 64 + square`.
//! - `[768..772)` castling randoms, one per `CastleFlag` bit.
//! - `[772..780)` en-passant file randoms, one per file a..h.
//! - `[780]` side-to-move random.

use once_cell::sync::Lazy;

use crate::board::{CastleFlag, Piece, Square};

const TABLE_LEN: usize = 781;
const PIECE_OFFSET: usize = 0;
const CASTLE_OFFSET: usize = 768;
const EP_OFFSET: usize = 772;
const TURN_OFFSET: usize = 780;

struct XorShift64Star(u64);

impl XorShift64Star {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(2685821657736338717)
    }
}

fn build_table() -> [u64; TABLE_LEN] {
    let mut gen = XorShift64Star(1070372);
    let mut table = [0u64; TABLE_LEN];
    for slot in table.iter_mut() {
        *slot = gen.next();
    }
    table
}

static RANDOM64: Lazy<[u64; TABLE_LEN]> = Lazy::new(build_table);

/// A Polyglot-compatible 64-bit Zobrist key.
pub type HashKey = u64;

pub fn piece_square_key(piece: Piece, sq: Square) -> HashKey {
    RANDOM64[PIECE_OFFSET + piece.packed() as usize * 64 + sq as usize]
}

pub fn castle_key(flag: CastleFlag) -> HashKey {
    let mut key = 0u64;
    for (i, bit) in [
        CastleFlag::WHITE_KINGSIDE,
        CastleFlag::WHITE_QUEENSIDE,
        CastleFlag::BLACK_KINGSIDE,
        CastleFlag::BLACK_QUEENSIDE,
    ]
    .into_iter()
    .enumerate()
    {
        if flag.contains(bit) {
            key ^= RANDOM64[CASTLE_OFFSET + i];
        }
    }
    key
}

pub fn en_passant_key(file: u8) -> HashKey {
    RANDOM64[EP_OFFSET + file as usize]
}

pub fn turn_key() -> HashKey {
    RANDOM64[TURN_OFFSET]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_deterministic_across_calls() {
        let a = build_table();
        let b = build_table();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_slots_differ() {
        assert_ne!(RANDOM64[0], RANDOM64[1]);
        assert_ne!(RANDOM64[TURN_OFFSET], RANDOM64[TURN_OFFSET - 1]);
    }
}
