use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown time class: {0} (expected bullet, blitz, rapid or daily)")]
    UnknownTimeClass(String),
}
