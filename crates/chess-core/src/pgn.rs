//! PGN movetext extraction built on pgn-reader.
//!
//! Games from the platforms frequently come without notation, with headers
//! only, or with garbage. All of these collapse into `None`; none of them are
//! errors.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use regex::Regex;
use shakmaty::{Chess, Move, Position};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Header state collected before the movetext.
#[derive(Default)]
struct SetupTags {
    custom_start: bool,
}

/// Replays SAN tokens from the standard starting position.
struct LineState {
    board: Chess,
    moves: Vec<Move>,
    broken: bool,
}

/// Mainline collector. Variations are skipped and the line ends at the
/// first token that is not legal in the current position.
struct MainlineCollector;

impl Visitor for MainlineCollector {
    type Tags = SetupTags;
    type Movetext = LineState;
    type Output = Option<Vec<Move>>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(SetupTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        if name == b"FEN" {
            let fen = value.decode_utf8_lossy();
            if fen.trim() != STANDARD_START_FEN {
                tags.custom_start = true;
            }
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        // Games from a custom setup cannot be walked against the book
        if tags.custom_start {
            return ControlFlow::Break(None);
        }
        ControlFlow::Continue(LineState {
            board: Chess::default(),
            moves: Vec::new(),
            broken: false,
        })
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, state: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        if state.broken {
            return ControlFlow::Continue(());
        }
        match san_plus.san.to_move(&state.board) {
            Ok(mv) => {
                state.board.play_unchecked(mv.clone());
                state.moves.push(mv);
            }
            Err(_) => state.broken = true,
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, state: Self::Movetext) -> Self::Output {
        Some(state.moves)
    }
}

/// Extract the mainline moves of a PGN string.
///
/// Returns `None` when the text is blank, cannot be read, or holds no moves.
pub fn parse_moves(pgn: &str) -> Option<Vec<Move>> {
    if pgn.trim().is_empty() {
        return None;
    }
    let mut reader = Reader::new(pgn.as_bytes());
    let moves = reader
        .read_game(&mut MainlineCollector)
        .ok()
        .flatten()
        .flatten()?;
    if moves.is_empty() {
        None
    } else {
        Some(moves)
    }
}

/// Position after applying moves `0..=move_index` of the game.
pub fn replay_to_position(pgn: &str, move_index: usize) -> Option<Chess> {
    let moves = parse_moves(pgn)?;
    if move_index >= moves.len() {
        return None;
    }
    let mut board = Chess::default();
    for mv in &moves[..=move_index] {
        board.play_unchecked(mv.clone());
    }
    Some(board)
}

/// Extract a string value from a PGN header (e.g. ECO, Opening).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::{fen::Fen, CastlingMode, EnPassantMode};

    const SCHOLARS: &str = r#"[Event "Live Chess"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[ECO "C20"]

1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0"#;

    fn uci(moves: &[Move]) -> Vec<String> {
        moves
            .iter()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect()
    }

    #[test]
    fn test_parse_moves_basic() {
        let moves = parse_moves(SCHOLARS).unwrap();
        assert_eq!(moves.len(), 7);
        assert_eq!(
            uci(&moves),
            vec!["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"]
        );
    }

    #[test]
    fn test_blank_and_header_only_are_none() {
        assert!(parse_moves("").is_none());
        assert!(parse_moves("   \n\t ").is_none());
        assert!(parse_moves("[White \"Alice\"]\n[Black \"Bob\"]\n\n*").is_none());
    }

    #[test]
    fn test_variations_and_comments_skipped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3) 2. Nf3 Nc6 *";
        let moves = parse_moves(pgn).unwrap();
        assert_eq!(uci(&moves), vec!["e2e4", "e7e5", "g1f3", "b8c6"]);
    }

    #[test]
    fn test_line_stops_at_illegal_token() {
        let pgn = "1. e4 e5 2. Ke3 Nc6 *";
        let moves = parse_moves(pgn).unwrap();
        assert_eq!(uci(&moves), vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn test_custom_setup_rejected() {
        let pgn = "[SetUp \"1\"]\n[FEN \"8/8/8/8/8/8/4K3/4k3 w - - 0 1\"]\n\n1. Kd3 *";
        assert!(parse_moves(pgn).is_none());
    }

    #[test]
    fn test_replay_to_position() {
        let board = replay_to_position(SCHOLARS, 1).unwrap();
        let fen = Fen::from_position(&board, EnPassantMode::Legal).to_string();
        assert_eq!(
            fen,
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
        );
        assert!(replay_to_position(SCHOLARS, 7).is_none());
        assert!(replay_to_position("", 0).is_none());
    }

    #[test]
    fn test_extract_header() {
        assert_eq!(extract_header(SCHOLARS, "ECO").as_deref(), Some("C20"));
        assert_eq!(extract_header(SCHOLARS, "Opening"), None);
    }
}
