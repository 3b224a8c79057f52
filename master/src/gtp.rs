//! Upstream GTP dispatch on stdin/stdout.
//!
//! The controller-facing edge stays thin: parse one line, route it, print
//! `=id payload` or `?id payload`. Most commands broadcast to the slaves;
//! the genmove variants and the consensus commands take the specialized
//! paths, and a handful are answered locally. stdout carries nothing but
//! GTP replies; all diagnostics go to stderr.

use anyhow::Result;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use go_core::Stone;
use gtp_wire::format_reply;

use crate::engine::DistributedEngine;
use crate::time_control::TimeInfo;

/// Commands the master answers (directly or via the slaves).
const KNOWN_COMMANDS: &[&str] = &[
    "protocol_version",
    "name",
    "version",
    "list_commands",
    "quit",
    "boardsize",
    "clear_board",
    "komi",
    "play",
    "genmove",
    "kgs-genmove_cleanup",
    "time_settings",
    "kgs-time_settings",
    "time_left",
    "final_score",
    "final_status_list",
    "kgs-chat",
];

/// Game state the master tracks for itself. There is no board here: the
/// command history is the authoritative game record, this is only what
/// time allocation and coordinate bookkeeping need.
#[derive(Debug)]
struct GtpState {
    board_size: u8,
    moves_played: u32,
    ti: [TimeInfo; 2],
}

impl Default for GtpState {
    fn default() -> Self {
        Self {
            board_size: 19,
            moves_played: 0,
            ti: [TimeInfo::default(), TimeInfo::default()],
        }
    }
}

/// Outcome of one dispatched command.
struct Response {
    ok: bool,
    payload: String,
    quit: bool,
}

impl Response {
    fn ok(payload: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload: payload.into(),
            quit: false,
        }
    }

    fn err(payload: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: payload.into(),
            quit: false,
        }
    }
}

/// Drive the GTP loop until EOF, `quit`, or interrupt.
pub async fn run(engine: &mut DistributedEngine) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();
    let mut state = GtpState::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            debug!("controller closed stdin");
            break;
        };
        let Some((id, verb, args)) = parse_line(&line) else {
            continue;
        };

        let response = dispatch(engine, &mut state, &verb, &args).await;
        stdout
            .write_all(format_reply(id, response.ok, &response.payload).as_bytes())
            .await?;
        stdout.flush().await?;
        if response.quit {
            break;
        }
    }
    Ok(())
}

/// Split a GTP line into optional id, verb and argument text. Comments
/// and blank lines yield `None`.
fn parse_line(line: &str) -> Option<(Option<u32>, String, String)> {
    let line = line.split('#').next().unwrap_or("").replace('\t', " ");
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut tokens = line.splitn(2, ' ');
    let first = tokens.next()?;
    let rest = tokens.next().unwrap_or("").trim().to_string();
    match first.parse::<u32>() {
        Ok(id) => {
            let mut tokens = rest.splitn(2, ' ');
            let verb = tokens.next().unwrap_or("").to_string();
            if verb.is_empty() {
                return None;
            }
            let args = tokens.next().unwrap_or("").trim().to_string();
            Some((Some(id), verb, args))
        }
        Err(_) => Some((None, first.to_string(), rest)),
    }
}

async fn dispatch(
    engine: &mut DistributedEngine,
    state: &mut GtpState,
    verb: &str,
    args: &str,
) -> Response {
    match verb.to_ascii_lowercase().as_str() {
        "protocol_version" => Response::ok("2"),
        "name" => Response::ok("Distributed Engine"),
        "version" => Response::ok(env!("CARGO_PKG_VERSION")),
        "list_commands" => Response::ok(KNOWN_COMMANDS.join("\n")),

        "quit" => {
            if engine.forwards("quit") {
                engine.broadcast("quit", "").await;
            }
            Response {
                ok: true,
                payload: String::new(),
                quit: true,
            }
        }

        "boardsize" => match args.split_whitespace().next().and_then(|t| t.parse().ok()) {
            Some(size) if (1..=go_core::coord::MAX_BOARD_SIZE).contains(&size) => {
                state.board_size = size;
                forward(engine, verb, args).await;
                Response::ok("")
            }
            _ => Response::err("unacceptable size"),
        },

        "clear_board" => {
            state.moves_played = 0;
            forward(engine, verb, args).await;
            Response::ok("")
        }

        "play" => {
            state.moves_played += 1;
            forward(engine, verb, args).await;
            Response::ok("")
        }

        "genmove" | "kgs-genmove_cleanup" => {
            let cleanup = verb.eq_ignore_ascii_case("kgs-genmove_cleanup");
            let Some(color) = args.split_whitespace().next().and_then(|t| Stone::from_str(t).ok())
            else {
                return Response::err("syntax error");
            };
            let (board_size, moves_played) = (state.board_size, state.moves_played);
            let ti = &mut state.ti[color.index()];
            let coord = engine
                .genmove(color, ti, cleanup, board_size, moves_played)
                .await;
            state.moves_played += 1;
            Response::ok(coord.to_string())
        }

        // time_left is deliberately not forwarded; it rides along in the
        // next genmoves header instead, which saves a round trip.
        "time_left" => match parse_time_left(args) {
            Some((color, time, stones)) => {
                state.ti[color.index()].update_left(time, stones);
                Response::ok("")
            }
            None => Response::err("syntax error"),
        },

        "time_settings" => match parse_time_settings(args) {
            Some(ti) => {
                state.ti = [ti.clone(), ti];
                forward(engine, verb, args).await;
                Response::ok("")
            }
            None => Response::err("syntax error"),
        },

        "kgs-time_settings" => match parse_kgs_time_settings(args) {
            Some(ti) => {
                state.ti = [ti.clone(), ti];
                forward(engine, verb, args).await;
                Response::ok("")
            }
            None => Response::err("syntax error"),
        },

        "final_status_list" => {
            if args.trim().eq_ignore_ascii_case("dead") {
                let dead = engine.dead_group_list().await;
                let payload = dead
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                Response::ok(payload)
            } else {
                match engine.consensus(verb, &framed_args(args)).await {
                    Some(payload) => Response::ok(payload),
                    None => Response::err("no slaves connected"),
                }
            }
        }

        "final_score" => match engine.consensus(verb, &framed_args(args)).await {
            Some(payload) => Response::ok(payload),
            None => Response::err("cannot score"),
        },

        "kgs-chat" => {
            // Args are "type user text..."; the text is what the chat
            // interface understands.
            let text = args.splitn(3, ' ').nth(2).unwrap_or(args);
            match engine.chat(text) {
                Some(reply) => Response::ok(reply),
                None => Response::err("unknown chat command"),
            }
        }

        // Book maintenance has no meaning on the master; accept and drop.
        "uct_genbook" | "uct_dumpbook" => Response::ok(""),

        _ => {
            forward(engine, verb, args).await;
            Response::ok("")
        }
    }
}

async fn forward(engine: &DistributedEngine, verb: &str, args: &str) {
    if engine.forwards(verb) {
        engine.broadcast(verb, &framed_args(args)).await;
    }
}

/// Wire framing: argument text is empty or ends with a newline.
fn framed_args(args: &str) -> String {
    if args.is_empty() {
        String::new()
    } else {
        format!("{}\n", args.trim_end())
    }
}

fn parse_time_left(args: &str) -> Option<(Stone, f64, u32)> {
    let mut tokens = args.split_whitespace();
    let color = Stone::from_str(tokens.next()?).ok()?;
    let time: f64 = tokens.next()?.parse().ok()?;
    let stones: u32 = tokens.next()?.parse().ok()?;
    Some((color, time, stones))
}

fn parse_time_settings(args: &str) -> Option<TimeInfo> {
    let mut tokens = args.split_whitespace();
    let main_time: f64 = tokens.next()?.parse().ok()?;
    let byoyomi_time: f64 = tokens.next()?.parse().ok()?;
    let byoyomi_stones: u32 = tokens.next()?.parse().ok()?;
    Some(TimeInfo::from_time_settings(
        main_time,
        byoyomi_time,
        byoyomi_stones,
    ))
}

fn parse_kgs_time_settings(args: &str) -> Option<TimeInfo> {
    let mut tokens = args.split_whitespace();
    match tokens.next()? {
        "none" => Some(TimeInfo::default()),
        "absolute" => {
            let main_time: f64 = tokens.next()?.parse().ok()?;
            Some(TimeInfo::from_time_settings(main_time, 0.0, 0))
        }
        "byoyomi" => {
            let main_time: f64 = tokens.next()?.parse().ok()?;
            let byoyomi_time: f64 = tokens.next()?.parse().ok()?;
            let periods: u32 = tokens.next()?.parse().ok()?;
            // Treat period count as the stone budget of canadian-style
            // accounting; the slaves interpret the detailed fields.
            Some(TimeInfo::from_time_settings(
                main_time,
                byoyomi_time,
                periods,
            ))
        }
        "canadian" => {
            let main_time: f64 = tokens.next()?.parse().ok()?;
            let byoyomi_time: f64 = tokens.next()?.parse().ok()?;
            let stones: u32 = tokens.next()?.parse().ok()?;
            Some(TimeInfo::from_time_settings(main_time, byoyomi_time, stones))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_with_and_without_id() {
        assert_eq!(
            parse_line("3 play black D4"),
            Some((Some(3), "play".into(), "black D4".into()))
        );
        assert_eq!(
            parse_line("genmove b"),
            Some((None, "genmove".into(), "b".into()))
        );
        assert_eq!(parse_line("  # just a comment"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(
            parse_line("7 boardsize 19 # trailing comment"),
            Some((Some(7), "boardsize".into(), "19".into()))
        );
    }

    #[test]
    fn framed_args_keeps_wire_contract() {
        assert_eq!(framed_args(""), "");
        assert_eq!(framed_args("black D4"), "black D4\n");
        assert_eq!(framed_args("dead\n"), "dead\n");
    }

    #[test]
    fn parses_time_left() {
        let (color, time, stones) = parse_time_left("black 120.5 0").unwrap();
        assert_eq!(color, Stone::Black);
        assert!((time - 120.5).abs() < 1e-9);
        assert_eq!(stones, 0);
        assert!(parse_time_left("black").is_none());
    }

    #[test]
    fn parses_kgs_time_settings() {
        assert!(matches!(
            parse_kgs_time_settings("none").unwrap(),
            TimeInfo::Games { .. }
        ));
        assert!(matches!(
            parse_kgs_time_settings("byoyomi 600 30 5").unwrap(),
            TimeInfo::Walltime { .. }
        ));
        assert!(parse_kgs_time_settings("martian 1 2 3").is_none());
    }
}
