//! Board coordinates in GTP notation.
//!
//! Columns are letters `A`..`Z` skipping `I`, rows count from 1 at the
//! bottom. `pass` and `resign` are first-class coordinates since they flow
//! through the same statistics tables as board points.

use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// Largest board edge GTP notation can express (columns A..Z minus I).
pub const MAX_BOARD_SIZE: u8 = 25;

/// A move destination.
///
/// The derived ordering (resign < pass < points in row-major order) is the
/// canonical coordinate order used for sorted child lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coord {
    Resign,
    Pass,
    /// 1-based row and column.
    Point { row: u8, col: u8 },
}

impl Coord {
    /// Build a point coordinate, validating the 1..=25 range.
    pub fn point(col: u8, row: u8) -> Option<Coord> {
        if (1..=MAX_BOARD_SIZE).contains(&col) && (1..=MAX_BOARD_SIZE).contains(&row) {
            Some(Coord::Point { row, col })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_pass(self) -> bool {
        self == Coord::Pass
    }

    #[inline]
    pub fn is_resign(self) -> bool {
        self == Coord::Resign
    }

    /// True for actual board points (not pass/resign).
    #[inline]
    pub fn is_point(self) -> bool {
        matches!(self, Coord::Point { .. })
    }

    fn col_letter(col: u8) -> char {
        // Skip 'I' per GTP convention.
        let idx = if col >= 9 { col } else { col - 1 };
        (b'A' + idx) as char
    }

    fn col_from_letter(letter: char) -> Option<u8> {
        let upper = letter.to_ascii_uppercase();
        match upper {
            'I' => None,
            'A'..='H' => Some(upper as u8 - b'A' + 1),
            'J'..='Z' => Some(upper as u8 - b'A'),
            _ => None,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Resign => write!(f, "resign"),
            Coord::Pass => write!(f, "pass"),
            Coord::Point { row, col } => write!(f, "{}{}", Coord::col_letter(*col), row),
        }
    }
}

impl FromStr for Coord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::Coord(s.to_string());
        match s.to_ascii_lowercase().as_str() {
            "pass" => return Ok(Coord::Pass),
            "resign" => return Ok(Coord::Resign),
            _ => {}
        }
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(err)?;
        let col = Coord::col_from_letter(letter).ok_or_else(err)?;
        let row: u8 = chars.as_str().parse().map_err(|_| err())?;
        Coord::point(col, row).ok_or_else(err)
    }
}
