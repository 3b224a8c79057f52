//! The distributed engine: broadcast dispatch, search entry points,
//! dead-group consensus and the chat interface.

use std::str::FromStr;
use std::sync::Arc;

use go_core::{Coord, MoveStats, Stone};
use tokio::time::Instant;
use tracing::debug;

use crate::collector::ReplyCollector;
use crate::config::Config;
use crate::genmoves::{self, SearchOutcome};
use crate::protocol::Protocol;
use crate::stats::SearchStats;
use crate::time_control::{TimeInfo, MAX_FAST_CMD_WAIT};

/// Commands the master keeps to itself: handled locally, folded into the
/// next genmoves, or routed through a specialized path below.
const UNFORWARDED: &[&str] = &[
    "uct_genbook",
    "uct_dumpbook",
    "kgs-chat",
    "time_left",
    "genmove",
    "kgs-genmove_cleanup",
    "final_score",
    "final_status_list",
];

pub struct DistributedEngine {
    config: Config,
    protocol: Arc<Protocol>,
    collector: ReplyCollector,
    stats: SearchStats,
    my_last_move: Option<(Stone, Coord)>,
    my_last_stats: MoveStats,
}

impl DistributedEngine {
    pub fn new(config: Config, protocol: Arc<Protocol>) -> Self {
        let collector = ReplyCollector::new(Arc::clone(&protocol));
        let stats = SearchStats::new(config.stats_file.clone());
        Self {
            config,
            protocol,
            collector,
            stats,
            my_last_move: None,
            my_last_stats: MoveStats::default(),
        }
    }

    /// Whether an upstream command is forwarded to the slaves.
    pub fn forwards(&self, verb: &str) -> bool {
        if verb.eq_ignore_ascii_case("quit") {
            return self.config.slaves_quit;
        }
        !UNFORWARDED
            .iter()
            .any(|skip| verb.eq_ignore_ascii_case(skip))
    }

    /// Broadcast a command to all slaves and wait briefly for their
    /// replies. Waiting here keeps the fleet in step; without it slaves
    /// drift behind and need history replays far more often. Reply
    /// contents are ignored for plain forwards.
    pub async fn broadcast(&self, verb: &str, args: &str) {
        self.protocol.append_command(verb, args);
        self.collector
            .wait_until(Instant::now() + MAX_FAST_CMD_WAIT)
            .await;
    }

    /// Run a full distributed search and commit the chosen move.
    pub async fn genmove(
        &mut self,
        color: Stone,
        ti: &mut TimeInfo,
        cleanup: bool,
        board_size: u8,
        moves_played: u32,
    ) -> Coord {
        let outcome: SearchOutcome = genmoves::search(
            &self.protocol,
            &self.collector,
            ti,
            color,
            cleanup,
            board_size,
            moves_played,
        )
        .await;

        self.my_last_move = Some((outcome.color, outcome.coord));
        self.my_last_stats = outcome.stats;
        self.stats.record_move(&outcome);
        self.stats.write_snapshot();
        outcome.coord
    }

    /// Ask every slave for its dead-group list and take the most popular
    /// answer.
    pub async fn dead_group_list(&self) -> Vec<Coord> {
        self.protocol.append_command("final_status_list", "dead\n");
        let replies = self
            .collector
            .wait_until(Instant::now() + MAX_FAST_CMD_WAIT)
            .await;
        let raws: Vec<String> = replies.into_iter().map(|(_, raw)| raw).collect();
        let Some(winner) = vote_best_reply(raws) else {
            return Vec::new();
        };
        parse_coord_list(&winner)
    }

    /// Broadcast a command and return the most popular reply payload.
    pub async fn consensus(&self, verb: &str, args: &str) -> Option<String> {
        self.protocol.append_command(verb, args);
        let replies = self
            .collector
            .wait_until(Instant::now() + MAX_FAST_CMD_WAIT)
            .await;
        let raws: Vec<String> = replies.into_iter().map(|(_, raw)| raw).collect();
        vote_best_reply(raws).map(|winner| strip_reply_prefix(&winner).to_string())
    }

    /// Chat interface: currently understands `winrate`.
    pub fn chat(&self, text: &str) -> Option<String> {
        let text = text.trim_start();
        if !text.to_ascii_lowercase().starts_with("winrate") {
            return None;
        }
        let (color, coord) = self.my_last_move?;
        Some(format!(
            "In {} playouts at {} machines, {} {} can win with {:.2}% probability.",
            self.my_last_stats.playouts,
            self.protocol.active_slaves(),
            color,
            coord,
            100.0 * color.value_for(self.my_last_stats.value)
        ))
    }
}

/// The most popular reply: sort case-insensitively, take the first run
/// whose length strictly exceeds every earlier run.
pub fn vote_best_reply(mut raws: Vec<String>) -> Option<String> {
    if raws.is_empty() {
        return None;
    }
    raws.sort_by(|a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));
    let mut best_idx = 0;
    let mut best_count = 1;
    let mut count = 1;
    for i in 1..raws.len() {
        if raws[i].eq_ignore_ascii_case(&raws[i - 1]) {
            count += 1;
        } else {
            count = 1;
        }
        if count > best_count {
            best_count = count;
            best_idx = i;
        }
    }
    debug!(
        replies = raws.len(),
        votes = best_count,
        "dead-group consensus"
    );
    Some(raws.swap_remove(best_idx))
}

/// Strip the `=id ` prefix from a raw reply.
fn strip_reply_prefix(raw: &str) -> &str {
    let body = raw.trim_start_matches(['=', '?']);
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    body.trim_start_matches(' ').trim_end_matches('\n')
}

/// Parse the space-separated coordinates of a winning reply.
fn parse_coord_list(raw: &str) -> Vec<Coord> {
    strip_reply_prefix(raw)
        .split_whitespace()
        .filter_map(|token| Coord::from_str(token).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            options: None,
            slave_port: Some(6000),
            proxy_port: None,
            max_slaves: 10,
            slaves_quit: false,
            log_level: "info".into(),
            stats_file: None,
        }
    }

    #[test]
    fn forwarding_rules() {
        let engine = DistributedEngine::new(test_config(), Arc::new(Protocol::new(10)));
        assert!(engine.forwards("boardsize"));
        assert!(engine.forwards("play"));
        assert!(!engine.forwards("genmove"));
        assert!(!engine.forwards("time_left"));
        assert!(!engine.forwards("final_status_list"));
        assert!(!engine.forwards("quit"));

        let mut config = test_config();
        config.slaves_quit = true;
        let engine = DistributedEngine::new(config, Arc::new(Protocol::new(10)));
        assert!(engine.forwards("quit"));
    }

    #[test]
    fn vote_picks_the_mode() {
        let raws = vec![
            "=1 A1 A2\n".to_string(),
            "=1 A1\n".to_string(),
            "=1 A1 A2\n".to_string(),
            "=1 A1 A2 A3\n".to_string(),
            "=1 A1 A2\n".to_string(),
        ];
        let winner = vote_best_reply(raws).unwrap();
        assert_eq!(winner, "=1 A1 A2\n");
        let coords = parse_coord_list(&winner);
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0].to_string(), "A1");
        assert_eq!(coords[1].to_string(), "A2");
    }

    #[test]
    fn vote_tie_keeps_the_first_sorted_run() {
        // Two runs of two; in sorted order "=1 A1\n" comes first and a
        // later run only wins by strictly exceeding it.
        let raws = vec![
            "=1 A1 A2\n".to_string(),
            "=1 A1 A2\n".to_string(),
            "=1 A1 A2 A3\n".to_string(),
            "=1 A1\n".to_string(),
            "=1 A1\n".to_string(),
        ];
        let winner = vote_best_reply(raws).unwrap();
        assert_eq!(winner, "=1 A1\n");
        assert_eq!(parse_coord_list(&winner).len(), 1);
    }

    #[test]
    fn vote_is_case_insensitive() {
        let raws = vec![
            "=1 a1 a2\n".to_string(),
            "=1 A1 A2\n".to_string(),
            "=1 B2\n".to_string(),
        ];
        let winner = vote_best_reply(raws).unwrap();
        let coords = parse_coord_list(&winner);
        assert_eq!(coords[0].to_string(), "A1");
        assert_eq!(coords[1].to_string(), "A2");
    }

    #[test]
    fn chat_reports_the_last_move() {
        let mut engine = DistributedEngine::new(test_config(), Arc::new(Protocol::new(10)));
        assert!(engine.chat("winrate").is_none());

        engine.my_last_move = Some((Stone::White, "D4".parse().unwrap()));
        engine.my_last_stats = MoveStats::new(1200, 0.38);
        let msg = engine.chat(" winrate").unwrap();
        assert!(msg.contains("1200 playouts"));
        assert!(msg.contains("white D4"));
        assert!(msg.contains("62.00%"));

        assert!(engine.chat("hello").is_none());
    }
}
