//! Time budgets for the search loop.
//!
//! The real per-move time management runs on the slaves; the master only
//! needs a coarse stop condition for the aggregation loop, either a total
//! playout count shared by the whole fleet or a wall-clock allowance
//! carved out of the remaining clock.

use std::time::{Duration, Instant};

use gtp_wire::TimeArgs;

/// Maximum wait for replies to fast commands (everything except the
/// genmoves family and final_status_list).
pub const MAX_FAST_CMD_WAIT: Duration = Duration::from_secs(1);

/// Default number of simulations per move, in total over all slaves.
pub const DIST_GAMES: u32 = 80_000;

/// Board-fill percentages bounding the opening and endgame phases, used
/// to skew the per-move time allocation toward the middle game.
const FUSEKI_END: u32 = 20;
const YOSE_START: u32 = 40;

/// Per-move search budget.
#[derive(Debug, Clone)]
pub enum TimeInfo {
    /// Fixed number of playouts, summed across all slaves.
    Games { games: u32 },
    /// Wall-clock budget; `timer_start` is armed when the move begins.
    Walltime {
        main_time: f64,
        byoyomi_time: f64,
        byoyomi_periods: u32,
        byoyomi_stones: u32,
        timer_start: Option<Instant>,
    },
}

impl Default for TimeInfo {
    fn default() -> Self {
        TimeInfo::Games { games: DIST_GAMES }
    }
}

/// The loop-exit threshold derived from a [`TimeInfo`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCondition {
    /// Stop once this many playouts were accounted.
    Playouts(u32),
    /// Stop once this much wall-clock time elapsed since `timer_start`.
    Elapsed(f64),
}

impl TimeInfo {
    /// Construct from GTP `time_settings` arguments. Zero main time with
    /// zero byo-yomi stones means no time control.
    pub fn from_time_settings(main_time: f64, byoyomi_time: f64, byoyomi_stones: u32) -> TimeInfo {
        if main_time <= 0.0 && byoyomi_stones == 0 {
            return TimeInfo::default();
        }
        TimeInfo::Walltime {
            main_time,
            byoyomi_time,
            byoyomi_periods: 1,
            byoyomi_stones,
            timer_start: None,
        }
    }

    /// Fold in a GTP `time_left` update.
    pub fn update_left(&mut self, time: f64, stones: u32) {
        match self {
            TimeInfo::Games { .. } => {
                *self = TimeInfo::Walltime {
                    main_time: if stones == 0 { time } else { 0.0 },
                    byoyomi_time: if stones > 0 { time } else { 0.0 },
                    byoyomi_periods: 1,
                    byoyomi_stones: stones,
                    timer_start: None,
                };
            }
            TimeInfo::Walltime {
                main_time,
                byoyomi_time,
                byoyomi_stones,
                ..
            } => {
                if stones == 0 {
                    *main_time = time;
                } else {
                    // In byo-yomi: main time exhausted.
                    *main_time = 0.0;
                    *byoyomi_time = time;
                    *byoyomi_stones = stones;
                }
            }
        }
    }

    /// Arm the wall-clock timer at the start of a move.
    pub fn start_timer(&mut self) {
        if let TimeInfo::Walltime { timer_start, .. } = self {
            *timer_start = Some(Instant::now());
        }
    }

    /// Seconds elapsed since the timer was armed.
    pub fn elapsed(&self) -> f64 {
        match self {
            TimeInfo::Walltime {
                timer_start: Some(t0),
                ..
            } => t0.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Subtract time spent waiting from the remaining budget.
    pub fn subtract(&mut self, spent: Duration) {
        if let TimeInfo::Walltime {
            main_time,
            byoyomi_time,
            byoyomi_stones,
            ..
        } = self
        {
            let spent = spent.as_secs_f64();
            if *main_time > 0.0 {
                *main_time = (*main_time - spent).max(0.0);
            } else if *byoyomi_stones > 0 {
                *byoyomi_time = (*byoyomi_time - spent).max(0.0);
            }
        }
    }

    /// Header fields for the genmoves command, present only under
    /// wall-clock control.
    pub fn wire_args(&self) -> Option<TimeArgs> {
        match self {
            TimeInfo::Games { .. } => None,
            TimeInfo::Walltime {
                main_time,
                byoyomi_time,
                byoyomi_periods,
                byoyomi_stones,
                ..
            } => Some(TimeArgs {
                main_time: *main_time,
                byoyomi_time: *byoyomi_time,
                byoyomi_periods: *byoyomi_periods,
                byoyomi_stones: *byoyomi_stones,
            }),
        }
    }

    /// Worst-case stop condition for this move.
    ///
    /// Wall-clock allocation is deliberately coarse: remaining main time
    /// spread over an estimate of the moves left, skewed to spend less in
    /// the opening, plus the byo-yomi period. The slaves do the careful
    /// accounting.
    pub fn stop_conditions(&self, board_size: u8, moves_played: u32) -> StopCondition {
        match self {
            TimeInfo::Games { games } => StopCondition::Playouts(*games),
            TimeInfo::Walltime {
                main_time,
                byoyomi_time,
                ..
            } => {
                let area = u32::from(board_size) * u32::from(board_size);
                // Typical game fills ~40% of the board per player.
                let expected = area * 2 / 5;
                let mut moves_left = expected.saturating_sub(moves_played / 2).max(10);
                let fill_pct = (moves_played * 100) / area.max(1);
                if fill_pct < FUSEKI_END {
                    // Save clock during the opening.
                    moves_left = moves_left * 5 / 4;
                } else if fill_pct >= YOSE_START {
                    moves_left = moves_left * 3 / 4;
                }
                let allowance = main_time / f64::from(moves_left) + byoyomi_time;
                StopCondition::Elapsed(allowance.max(0.1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_playouts() {
        let ti = TimeInfo::default();
        assert_eq!(
            ti.stop_conditions(19, 0),
            StopCondition::Playouts(DIST_GAMES)
        );
        assert!(ti.wire_args().is_none());
    }

    #[test]
    fn untimed_settings_fall_back_to_playouts() {
        let ti = TimeInfo::from_time_settings(0.0, 0.0, 0);
        assert!(matches!(ti, TimeInfo::Games { .. }));
    }

    #[test]
    fn walltime_allocates_a_bounded_slice() {
        let ti = TimeInfo::from_time_settings(300.0, 30.0, 25);
        let StopCondition::Elapsed(allowance) = ti.stop_conditions(19, 40) else {
            panic!("expected wall-clock stop condition");
        };
        assert!(allowance > 30.0, "byo-yomi period must be included");
        assert!(allowance < 300.0, "must not spend the whole clock");
    }

    #[test]
    fn subtract_drains_main_time_first() {
        let mut ti = TimeInfo::from_time_settings(10.0, 30.0, 25);
        ti.subtract(Duration::from_secs(4));
        let args = ti.wire_args().unwrap();
        assert!((args.main_time - 6.0).abs() < 1e-9);
        assert!((args.byoyomi_time - 30.0).abs() < 1e-9);
    }

    #[test]
    fn time_left_switches_to_byoyomi() {
        let mut ti = TimeInfo::from_time_settings(300.0, 30.0, 25);
        ti.update_left(25.0, 5);
        let args = ti.wire_args().unwrap();
        assert!((args.main_time).abs() < 1e-9);
        assert!((args.byoyomi_time - 25.0).abs() < 1e-9);
        assert_eq!(args.byoyomi_stones, 5);
    }
}
