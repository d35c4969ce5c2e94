//! Locate the first move of a game that leaves the opening reference.

use std::path::Path;

use shakmaty::{Chess, Color, Move, Position};

use crate::book::{load_reference, BookFormat, OpeningReference};
use crate::error::Result;

/// Where a game left the book.
#[derive(Debug, Clone)]
pub struct DeviationResult {
    /// Zero-based ply of the first non-book move, or the move count when
    /// every move was in book.
    pub deviation_ply: usize,
    /// Side that played the non-book move; `None` when fully booked.
    pub deviating_side: Option<Color>,
    /// Position before the deviating move (the deepest book position when
    /// fully booked).
    pub position: Chess,
    pub is_fully_booked: bool,
    pub played_move: Option<Move>,
    pub book_moves: Vec<Move>,
}

pub struct OpeningDetector {
    reference: Box<dyn OpeningReference>,
}

impl OpeningDetector {
    pub fn new(reference: Box<dyn OpeningReference>) -> Self {
        Self { reference }
    }

    pub fn open(path: &Path, format: BookFormat) -> Result<Self> {
        Ok(Self::new(load_reference(path, format)?))
    }

    /// Walk `moves` from the starting position until one is not endorsed.
    /// Returns `None` for an empty game.
    pub fn find_deviation(&self, moves: &[Move]) -> Option<DeviationResult> {
        if moves.is_empty() {
            return None;
        }

        let mut board = Chess::default();
        let mut last_book_position = board.clone();

        for (ply, mv) in moves.iter().enumerate() {
            let book_moves = self.reference.book_moves(&board);
            if !book_moves.contains(mv) {
                return Some(DeviationResult {
                    deviation_ply: ply,
                    deviating_side: Some(board.turn()),
                    position: board,
                    is_fully_booked: false,
                    played_move: Some(mv.clone()),
                    book_moves,
                });
            }
            last_book_position = board.clone();
            board.play_unchecked(mv.clone());
        }

        Some(DeviationResult {
            deviation_ply: moves.len(),
            deviating_side: None,
            position: last_book_position,
            is_fully_booked: true,
            played_move: None,
            book_moves: Vec::new(),
        })
    }
}
