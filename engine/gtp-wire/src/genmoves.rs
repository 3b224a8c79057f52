//! Payload codec for the genmoves command family.
//!
//! Arguments: `color played [main_time byoyomi_time byoyomi_periods
//! byoyomi_stones]\n` followed by zero or more prior-stat lines
//! `coord playouts value amaf_playouts amaf_value\n`, terminated by a
//! blank line. Replies carry `played_own total_playouts threads
//! keep_looking` in the header, then per-child stat lines in the same
//! five-column shape. Values are printed with 7 fractional digits.

use std::fmt::Write as _;
use std::str::FromStr;

use go_core::{Coord, MoveStats, Stats2, Stone};

use crate::{Reply, WireError};

/// Wall-clock budget fields riding along in the genmoves header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeArgs {
    pub main_time: f64,
    pub byoyomi_time: f64,
    pub byoyomi_periods: u32,
    pub byoyomi_stones: u32,
}

/// Arguments of one `pachi-genmoves` / `pachi-genmoves_cleanup` command.
#[derive(Debug, Clone, PartialEq)]
pub struct GenmovesArgs {
    pub color: Stone,
    /// Total playouts accounted so far across all slaves.
    pub played: u32,
    /// Present only under wall-clock time control.
    pub time: Option<TimeArgs>,
    /// Merged prior statistics redistributed to the slaves.
    pub stats: Vec<(Coord, Stats2)>,
}

impl GenmovesArgs {
    /// Render the argument block, including its blank-line terminator.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let color = match self.color {
            Stone::Black => "b",
            Stone::White => "w",
        };
        let _ = write!(out, "{} {}", color, self.played);
        if let Some(t) = &self.time {
            let _ = write!(
                out,
                " {:.3} {:.3} {} {}",
                t.main_time, t.byoyomi_time, t.byoyomi_periods, t.byoyomi_stones
            );
        }
        out.push('\n');
        for (coord, s) in &self.stats {
            let _ = writeln!(
                out,
                "{} {} {:.7} {} {:.7}",
                coord, s.u.playouts, s.u.value, s.amaf.playouts, s.amaf.value
            );
        }
        out.push('\n');
        out
    }

    /// Parse an argument block produced by [`GenmovesArgs::encode`].
    pub fn parse(args: &str) -> Result<GenmovesArgs, WireError> {
        let err = || WireError::Genmoves(args.to_string());
        let mut lines = args.lines();
        let header = lines.next().ok_or_else(err)?;
        let mut tokens = header.split_whitespace();
        let color = Stone::from_str(tokens.next().ok_or_else(err)?)?;
        let played: u32 = tokens.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let time = match tokens.next() {
            None => None,
            Some(main) => {
                let parse_f = |t: Option<&str>| -> Result<f64, WireError> {
                    t.ok_or_else(err)?.parse().map_err(|_| err())
                };
                let parse_u = |t: Option<&str>| -> Result<u32, WireError> {
                    t.ok_or_else(err)?.parse().map_err(|_| err())
                };
                Some(TimeArgs {
                    main_time: main.parse().map_err(|_| err())?,
                    byoyomi_time: parse_f(tokens.next())?,
                    byoyomi_periods: parse_u(tokens.next())?,
                    byoyomi_stones: parse_u(tokens.next())?,
                })
            }
        };
        let mut stats = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            match parse_stat_line(line) {
                Some(entry) => stats.push(entry),
                None => return Err(err()),
            }
        }
        Ok(GenmovesArgs {
            color,
            played,
            time,
            stats,
        })
    }
}

/// Parsed reply to one genmoves command.
#[derive(Debug, Clone, PartialEq)]
pub struct GenmovesReply {
    /// Playouts this slave performed itself.
    pub played_own: u32,
    pub total_playouts: u32,
    pub threads: u32,
    pub keep_looking: bool,
    /// Per-child statistics: this slave's own contribution only.
    pub children: Vec<(Coord, Stats2)>,
}

impl GenmovesReply {
    /// Parse from the raw reply text (`=id …` header plus child lines).
    ///
    /// Extra trailing header fields are tolerated for future extensions.
    /// Child-line consumption stops at the first malformed line.
    pub fn parse(reply: &Reply) -> Result<GenmovesReply, WireError> {
        let err = || WireError::Genmoves(reply.raw.clone());
        let payload = reply.payload();
        let mut lines = payload.lines();
        let header = lines.next().ok_or_else(err)?;
        let mut tokens = header.split_whitespace();
        let mut next_u32 = || -> Result<u32, WireError> {
            tokens.next().ok_or_else(err)?.parse().map_err(|_| err())
        };
        let played_own = next_u32()?;
        let total_playouts = next_u32()?;
        let threads = next_u32()?;
        let keep_looking = next_u32()? != 0;

        let children = lines.map_while(parse_stat_line).collect();
        Ok(GenmovesReply {
            played_own,
            total_playouts,
            threads,
            keep_looking,
            children,
        })
    }

    /// Render the reply for transmission (slave side and test harnesses).
    pub fn encode(&self, id: u32) -> String {
        let mut out = format!(
            "={} {} {} {} {}\n",
            id,
            self.played_own,
            self.total_playouts,
            self.threads,
            self.keep_looking as u32
        );
        for (coord, s) in &self.children {
            let _ = writeln!(
                out,
                "{} {} {:.7} {} {:.7}",
                coord, s.u.playouts, s.u.value, s.amaf.playouts, s.amaf.value
            );
        }
        out.push('\n');
        out
    }
}

fn parse_stat_line(line: &str) -> Option<(Coord, Stats2)> {
    let mut tokens = line.split_whitespace();
    let coord = Coord::from_str(tokens.next()?).ok()?;
    let playouts: u32 = tokens.next()?.parse().ok()?;
    let value: f32 = tokens.next()?.parse().ok()?;
    let amaf_playouts: u32 = tokens.next()?.parse().ok()?;
    let amaf_value: f32 = tokens.next()?.parse().ok()?;
    Some((
        coord,
        Stats2::new(
            MoveStats::new(playouts, value),
            MoveStats::new(amaf_playouts, amaf_value),
        ),
    ))
}
