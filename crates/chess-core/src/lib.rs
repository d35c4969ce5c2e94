pub mod endgame;
pub mod error;
pub mod filter;
pub mod game_data;
pub mod pgn;
pub mod summary;

pub use error::CoreError;
pub use game_data::{color_name, parse_color, GameOutcome, GameRecord};
