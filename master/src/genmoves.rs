//! The genmoves aggregation loop.
//!
//! The master fans a `pachi-genmoves` command out to every slave, then
//! loops: gather the cumulative per-child statistics each slave has
//! reported so far, merge them into one aggregate, redistribute the
//! merged statistics as priors in a refreshed command (same id, so the
//! slaves treat it as an incremental update of the running search), and
//! stop when the fleet votes to stop or the budget runs out. The chosen
//! move is committed by rewriting the trailing search command into a
//! `play` under a fresh id.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use go_core::{Coord, MoveStats, Stats2, Stone};
use gtp_wire::{GenmovesArgs, GenmovesReply, Reply};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::collector::ReplyCollector;
use crate::protocol::Protocol;
use crate::time_control::{StopCondition, TimeInfo};

/// How often merged statistics are pushed back out to the slaves.
pub const STATS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Combined statistics from one round of replies.
#[derive(Debug, Default)]
pub struct Aggregate {
    stats: BTreeMap<Coord, Stats2>,
    /// Sum of `played_own` over all replies.
    pub played: u32,
    pub total_playouts: u32,
    pub total_threads: u32,
    /// Strict majority of the replying slaves want to keep searching.
    pub keep_looking: bool,
    /// Number of parseable replies.
    pub replies: usize,
}

impl Aggregate {
    /// Merge one round of raw replies. Unparseable replies are skipped;
    /// per-child statistics combine by playout-weighted mean, so the
    /// aggregate is independent of reply order.
    pub fn from_replies(raw_replies: &[(u32, String)]) -> Aggregate {
        let mut agg = Aggregate::default();
        let mut keep_votes = 0usize;
        for (_, raw) in raw_replies {
            let Ok(reply) = Reply::parse(raw) else {
                continue;
            };
            let Ok(gm) = GenmovesReply::parse(&reply) else {
                continue;
            };
            agg.replies += 1;
            agg.played += gm.played_own;
            agg.total_playouts += gm.total_playouts;
            agg.total_threads += gm.threads;
            keep_votes += gm.keep_looking as usize;
            for (coord, s) in gm.children {
                let entry = agg.stats.entry(coord).or_default();
                entry.u.add_result(s.u.value, s.u.playouts);
                entry.amaf.add_result(s.amaf.value, s.amaf.playouts);
            }
        }
        agg.keep_looking = keep_votes * 2 > agg.replies;
        agg
    }

    /// The move with the most aggregated playouts. Ties resolve to the
    /// first coordinate in board order, which keeps the choice
    /// independent of reply arrival order.
    pub fn best(&self) -> Option<(Coord, Stats2)> {
        let mut best: Option<(Coord, Stats2)> = None;
        for (&coord, &s) in &self.stats {
            if best.map_or(true, |(_, b)| s.u.playouts > b.u.playouts) {
                best = Some((coord, s));
            }
        }
        best
    }

    /// Prior payload for the next command iteration: every child above
    /// the playout floor, except pass and resign.
    pub fn prior_payload(&self, min_playouts: u32) -> Vec<(Coord, Stats2)> {
        self.stats
            .iter()
            .filter(|(coord, s)| coord.is_point() && s.u.playouts > min_playouts)
            .map(|(&coord, &s)| (coord, s))
            .collect()
    }

    #[cfg(test)]
    pub fn stats_for(&self, coord: Coord) -> Option<Stats2> {
        self.stats.get(&coord).copied()
    }
}

/// Outcome of one search, recorded for the chat interface and stats.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub color: Stone,
    pub coord: Coord,
    /// Aggregated statistics of the winning move.
    pub stats: MoveStats,
    /// Total playouts accounted across the fleet.
    pub played: u32,
    /// Slaves that contributed to the final aggregate.
    pub replies: usize,
    pub elapsed: Duration,
}

/// Run one full search: fan out, aggregate until the stop condition,
/// commit the winner as a `play` command.
pub async fn search(
    protocol: &Arc<Protocol>,
    collector: &ReplyCollector,
    ti: &mut TimeInfo,
    color: Stone,
    cleanup: bool,
    board_size: u8,
    moves_played: u32,
) -> SearchOutcome {
    let first = Instant::now();
    let verb = if cleanup {
        "pachi-genmoves_cleanup"
    } else {
        "pachi-genmoves"
    };

    let stop = ti.stop_conditions(board_size, moves_played);
    let saved_ti = ti.clone();
    ti.start_timer();

    // First genmoves goes out without stats.
    let args = GenmovesArgs {
        color,
        played: 0,
        time: ti.wire_args(),
        stats: Vec::new(),
    };
    protocol.append_command(verb, &args.encode());

    // Loop until most slaves want to stop or the budget runs out.
    let mut agg;
    let mut now = first;
    loop {
        let start = now;
        let replies = collector.wait_until(start + STATS_UPDATE_INTERVAL).await;
        now = Instant::now();
        ti.subtract(now - start);

        agg = Aggregate::from_replies(&replies);
        let best = agg.best();

        if !agg.keep_looking {
            break;
        }
        match stop {
            StopCondition::Elapsed(worst) => {
                if ti.elapsed() >= worst {
                    break;
                }
            }
            StopCondition::Playouts(worst) => {
                if agg.played >= worst {
                    break;
                }
            }
        }

        let (best_coord, best_stats) = best.unwrap_or((Coord::Pass, Stats2::default()));
        debug!(
            color = %color,
            coord = %best_coord,
            score = color.value_for(best_stats.u.value),
            playouts = best_stats.u.playouts,
            total_playouts = agg.total_playouts,
            slaves = agg.replies,
            threads = agg.total_threads,
            "temporary winner"
        );

        // Refresh the search under the same id so a reply to the previous
        // payload is not discarded.
        let args = GenmovesArgs {
            color,
            played: agg.played,
            time: ti.wire_args(),
            stats: agg.prior_payload(best_stats.u.playouts / 100),
        };
        protocol.replace_last(verb, &args.encode());
    }

    // The caller's clock bookkeeping happens upstream; don't double-bill
    // the time spent waiting here.
    *ti = saved_ti;

    let (coord, stats) = agg.best().unwrap_or((Coord::Pass, Stats2::default()));

    // Commit: every slave executes the chosen move and stops searching.
    let play_args = format!("{} {}\n", color, coord);
    protocol.supersede_last("play", &play_args);

    let elapsed = first.elapsed();
    let secs = elapsed.as_secs_f64().max(1e-6);
    info!(
        color = %color,
        coord = %coord,
        score = color.value_for(stats.u.value),
        playouts = stats.u.playouts,
        total_playouts = agg.total_playouts,
        played = agg.played,
        elapsed_s = format!("{:.2}", secs),
        slaves = agg.replies,
        threads = agg.total_threads,
        games_per_s = (f64::from(agg.played) / secs) as u64,
        "global winner"
    );

    SearchOutcome {
        color,
        coord,
        stats: stats.u,
        played: agg.played,
        replies: agg.replies,
        elapsed,
    }
}
