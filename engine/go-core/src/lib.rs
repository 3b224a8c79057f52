//! Shared Go vocabulary used across the distributed master.
//!
//! This crate holds the small, dependency-free types that every other crate
//! speaks in: stone colors, board coordinates in GTP notation, and the
//! playout statistics exchanged between master and slaves.

pub mod color;
pub mod coord;
pub mod stats;

use thiserror::Error;

pub use color::Stone;
pub use coord::Coord;
pub use stats::{MoveStats, Stats2};

/// Errors from parsing GTP vocabulary tokens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid color: {0:?}")]
    Color(String),

    #[error("invalid coordinate: {0:?}")]
    Coord(String),
}
