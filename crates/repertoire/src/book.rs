//! Opening references: which moves count as theory in a given position.
//!
//! Two file formats are understood. Polyglot `.bin` books (the usual GM
//! books) are probed by Zobrist key; the bincode position book maps a
//! normalized FEN to SAN move statistics.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::Zobrist64;
use shakmaty::{CastlingMode, Chess, EnPassantMode, File as BoardFile, Move, Position, Rank, Role, Square};
use tracing::info;

use crate::error::{RepertoireError, Result};

/// Read-only lookup from a position to its endorsed moves.
///
/// An empty result means the reference has nothing for this position.
pub trait OpeningReference: Send + Sync {
    fn book_moves(&self, pos: &Chess) -> Vec<Move>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BookFormat {
    Polyglot,
    Bincode,
}

/// Load an opening reference of the given format from disk.
pub fn load_reference(path: &Path, format: BookFormat) -> Result<Box<dyn OpeningReference>> {
    let reference: Box<dyn OpeningReference> = match format {
        BookFormat::Polyglot => Box::new(PolyglotBook::load(path)?),
        BookFormat::Bincode => Box::new(SanBook::load(path)?),
    };
    Ok(reference)
}

/// Polyglot-compatible Zobrist key of a position.
///
/// Polyglot hashes the en passant file whenever a pawn of the side to move
/// stands next to the double-pushed pawn, even if the capture is illegal.
pub fn polyglot_key(pos: &Chess) -> u64 {
    let key: Zobrist64 = pos.zobrist_hash(EnPassantMode::PseudoLegal);
    key.0
}

// =============================================================================
// Polyglot
// =============================================================================

const ENTRY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyglotEntry {
    pub key: u64,
    pub raw_move: u16,
    pub weight: u16,
    pub learn: u32,
}

impl PolyglotEntry {
    fn from_bytes(chunk: &[u8; ENTRY_SIZE]) -> Self {
        let [k0, k1, k2, k3, k4, k5, k6, k7, m0, m1, w0, w1, l0, l1, l2, l3] = *chunk;
        Self {
            key: u64::from_be_bytes([k0, k1, k2, k3, k4, k5, k6, k7]),
            raw_move: u16::from_be_bytes([m0, m1]),
            weight: u16::from_be_bytes([w0, w1]),
            learn: u32::from_be_bytes([l0, l1, l2, l3]),
        }
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.key.to_be_bytes());
        out[8..10].copy_from_slice(&self.raw_move.to_be_bytes());
        out[10..12].copy_from_slice(&self.weight.to_be_bytes());
        out[12..16].copy_from_slice(&self.learn.to_be_bytes());
        out
    }
}

/// Polyglot book held in memory. Entries are sorted by key as in the file.
pub struct PolyglotBook {
    entries: Vec<PolyglotEntry>,
}

impl PolyglotBook {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            RepertoireError::Book(format!("Failed to read {}: {e}", path.display()))
        })?;
        let book = Self::from_bytes(&data);
        info!(path = %path.display(), entries = book.entries.len(), "Loaded polyglot book");
        Ok(book)
    }

    /// Parse raw book bytes. A truncated trailing entry is ignored.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut entries: Vec<PolyglotEntry> = data
            .chunks_exact(ENTRY_SIZE)
            .filter_map(|chunk| chunk.try_into().ok().map(PolyglotEntry::from_bytes))
            .collect();
        // Only needed for hand-built books; real files are already sorted
        if !entries.windows(2).all(|w| w[0].key <= w[1].key) {
            entries.sort_by_key(|e| e.key);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries stored for `key`, heaviest first.
    pub fn find_entries(&self, key: u64) -> Vec<PolyglotEntry> {
        let start = self.entries.partition_point(|e| e.key < key);
        let mut found: Vec<PolyglotEntry> = self.entries[start..]
            .iter()
            .take_while(|e| e.key == key)
            .copied()
            .collect();
        found.sort_by(|a, b| b.weight.cmp(&a.weight));
        found
    }
}

impl OpeningReference for PolyglotBook {
    fn book_moves(&self, pos: &Chess) -> Vec<Move> {
        let mut moves: Vec<Move> = Vec::new();
        for entry in self.find_entries(polyglot_key(pos)) {
            if let Some(mv) = decode_polyglot_move(entry.raw_move, pos) {
                if !moves.contains(&mv) {
                    moves.push(mv);
                }
            }
        }
        moves
    }
}

/// Decode a Polyglot move into a legal move of `pos`.
///
/// Polyglot writes castling as king-takes-rook (e1h1), which is rewritten to
/// the king's destination square before legality is checked.
pub fn decode_polyglot_move(raw: u16, pos: &Chess) -> Option<Move> {
    let to_file = u32::from(raw & 0x7);
    let to_rank = u32::from((raw >> 3) & 0x7);
    let from_file = u32::from((raw >> 6) & 0x7);
    let from_rank = u32::from((raw >> 9) & 0x7);

    let from = Square::from_coords(BoardFile::new(from_file), Rank::new(from_rank));
    let mut to = Square::from_coords(BoardFile::new(to_file), Rank::new(to_rank));

    if pos.board().role_at(from) == Some(Role::King) {
        to = match (from, to) {
            (Square::E1, Square::H1) => Square::G1,
            (Square::E1, Square::A1) => Square::C1,
            (Square::E8, Square::H8) => Square::G8,
            (Square::E8, Square::A8) => Square::C8,
            _ => to,
        };
    }

    let promotion = match (raw >> 12) & 0x7 {
        1 => Some(Role::Knight),
        2 => Some(Role::Bishop),
        3 => Some(Role::Rook),
        4 => Some(Role::Queen),
        _ => None,
    };

    UciMove::Normal { from, to, promotion }.to_move(pos).ok()
}

// =============================================================================
// Bincode position book
// =============================================================================

/// Aggregate results for one book move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMoveStats {
    pub games: i32,
    pub white_wins: i32,
    pub draws: i32,
    pub black_wins: i32,
}

/// Normalized FEN -> (move SAN -> stats)
pub type PositionBook = HashMap<String, HashMap<String, BookMoveStats>>;

/// Position book keyed by normalized FEN with SAN move keys.
pub struct SanBook {
    positions: PositionBook,
}

impl SanBook {
    pub fn new(positions: PositionBook) -> Self {
        Self { positions }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            RepertoireError::Book(format!("Failed to open {}: {e}", path.display()))
        })?;
        let positions: PositionBook = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| RepertoireError::Book(format!("Failed to decode {}: {e}", path.display())))?;
        let total_moves: usize = positions.values().map(|m| m.len()).sum();
        info!(
            path = %path.display(),
            positions = positions.len(),
            moves = total_moves,
            "Loaded position book"
        );
        Ok(Self { positions })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), &self.positions)
            .map_err(|e| RepertoireError::Book(format!("Failed to encode book: {e}")))
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }
}

impl OpeningReference for SanBook {
    fn book_moves(&self, pos: &Chess) -> Vec<Move> {
        let fen = Fen::from_position(pos, EnPassantMode::Legal).to_string();
        let Some(moves) = self.positions.get(&normalize_fen(&fen)) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, &BookMoveStats)> = moves.iter().collect();
        ranked.sort_by(|a, b| b.1.games.cmp(&a.1.games).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .filter_map(|(san, _)| san.parse::<San>().ok()?.to_move(pos).ok())
            .collect()
    }
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

// =============================================================================
// In-memory reference
// =============================================================================

/// Reference built in memory, keyed by Zobrist hash.
#[derive(Default)]
pub struct MemoryBook {
    positions: HashMap<u64, Vec<Move>>,
}

impl MemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: &Chess, mv: Move) {
        let moves = self.positions.entry(polyglot_key(pos)).or_default();
        if !moves.contains(&mv) {
            moves.push(mv);
        }
    }

    /// Endorse every move of each line, where a line is space-separated UCI
    /// moves from the starting position.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let mut book = Self::new();
        for line in lines {
            let mut pos = Chess::default();
            for token in line.as_ref().split_whitespace() {
                let mv = token
                    .parse::<UciMove>()
                    .ok()
                    .and_then(|uci| uci.to_move(&pos).ok())
                    .ok_or_else(|| RepertoireError::Book(format!("Illegal book move {token}")))?;
                book.insert(&pos, mv.clone());
                pos.play_unchecked(mv);
            }
        }
        Ok(book)
    }
}

impl OpeningReference for MemoryBook {
    fn book_moves(&self, pos: &Chess) -> Vec<Move> {
        self.positions
            .get(&polyglot_key(pos))
            .cloned()
            .unwrap_or_default()
    }
}

/// UCI text of a move in standard castling notation.
pub fn uci_string(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}
