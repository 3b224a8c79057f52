//! Per-game search statistics.
//!
//! Tracks how much search the fleet produced over the game and optionally
//! writes a JSON snapshot after every move (atomic write-then-rename) for
//! external tooling to display.

use std::fs;
use std::io::Write;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::genmoves::SearchOutcome;

#[derive(Debug)]
pub struct SearchStats {
    moves: u32,
    total_played: u64,
    total_elapsed_secs: f64,
    last: Option<LastMove>,
    start_time: Instant,
    stats_path: Option<String>,
}

#[derive(Debug, Clone)]
struct LastMove {
    coord: String,
    playouts: u32,
    value: f32,
    slaves: usize,
}

/// Serializable stats for JSON output.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchStatsSnapshot {
    pub moves: u32,
    pub total_played: u64,
    pub games_per_second: f64,
    pub runtime_seconds: f64,
    pub last_move: Option<String>,
    pub last_playouts: u32,
    pub last_value: f32,
    pub last_slaves: usize,
}

impl SearchStats {
    pub fn new(stats_path: Option<String>) -> Self {
        Self {
            moves: 0,
            total_played: 0,
            total_elapsed_secs: 0.0,
            last: None,
            start_time: Instant::now(),
            stats_path,
        }
    }

    /// Record one completed search.
    pub fn record_move(&mut self, outcome: &SearchOutcome) {
        self.moves += 1;
        self.total_played += u64::from(outcome.played);
        self.total_elapsed_secs += outcome.elapsed.as_secs_f64();
        self.last = Some(LastMove {
            coord: outcome.coord.to_string(),
            playouts: outcome.stats.playouts,
            value: outcome.stats.value,
            slaves: outcome.replies,
        });
    }

    pub fn snapshot(&self) -> SearchStatsSnapshot {
        let games_per_second = if self.total_elapsed_secs > 0.0 {
            self.total_played as f64 / self.total_elapsed_secs
        } else {
            0.0
        };
        SearchStatsSnapshot {
            moves: self.moves,
            total_played: self.total_played,
            games_per_second,
            runtime_seconds: self.start_time.elapsed().as_secs_f64(),
            last_move: self.last.as_ref().map(|l| l.coord.clone()),
            last_playouts: self.last.as_ref().map(|l| l.playouts).unwrap_or(0),
            last_value: self.last.as_ref().map(|l| l.value).unwrap_or(0.0),
            last_slaves: self.last.as_ref().map(|l| l.slaves).unwrap_or(0),
        }
    }

    /// Write the snapshot to the configured file, if any. Failures are
    /// logged, never fatal.
    pub fn write_snapshot(&self) {
        let Some(path) = &self.stats_path else {
            return;
        };
        let snapshot = self.snapshot();
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("failed to serialize search stats: {}", e);
                return;
            }
        };

        // Write to a temp file then rename so readers never see a torn
        // snapshot.
        let temp_path = format!("{}.tmp", path);
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("failed to write search stats: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("failed to create temp stats file: {}", e);
                return;
            }
        }
        if let Err(e) = fs::rename(&temp_path, path) {
            warn!("failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }
        debug!("wrote search stats to {}", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use go_core::{MoveStats, Stone};
    use std::time::Duration;

    fn outcome(coord: &str, played: u32, elapsed_ms: u64) -> SearchOutcome {
        SearchOutcome {
            color: Stone::Black,
            coord: coord.parse().unwrap(),
            stats: MoveStats::new(played / 2, 0.55),
            played,
            replies: 3,
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    #[test]
    fn records_moves_and_rates() {
        let mut stats = SearchStats::new(None);
        stats.record_move(&outcome("D4", 10_000, 1000));
        stats.record_move(&outcome("Q16", 20_000, 2000));

        let snap = stats.snapshot();
        assert_eq!(snap.moves, 2);
        assert_eq!(snap.total_played, 30_000);
        assert!((snap.games_per_second - 10_000.0).abs() < 1.0);
        assert_eq!(snap.last_move.as_deref(), Some("Q16"));
        assert_eq!(snap.last_slaves, 3);
    }

    #[test]
    fn writes_valid_json_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search_stats.json");
        let mut stats = SearchStats::new(Some(path.to_str().unwrap().to_string()));
        stats.record_move(&outcome("C3", 5000, 500));
        stats.write_snapshot();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: SearchStatsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.moves, 1);
        assert_eq!(parsed.last_move.as_deref(), Some("C3"));
    }
}
