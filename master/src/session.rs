//! Slave sessions: one task per connected worker.
//!
//! A session owns its socket exclusively from accept to disconnect. It
//! pulls commands out of the registry through its cursor, transmits them
//! one at a time and waits for the matching reply before moving on, so
//! there is never more than one outstanding command per slave. A dropped
//! socket ends the session without disturbing the rest of the master; a
//! reconnecting worker is accepted as a brand-new session that replays
//! the command history from the start.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use gtp_wire::{read_reply, Reply};

use crate::protocol::{Protocol, SessionCursor};

/// Accept slave connections forever, spawning a session task for each.
pub async fn run_listener(protocol: Arc<Protocol>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => match protocol.register_slave() {
                Some(slave_id) => {
                    info!(slave_id, %addr, "slave connected");
                    let protocol = Arc::clone(&protocol);
                    tokio::spawn(async move {
                        match serve_slave(&protocol, stream, slave_id).await {
                            Ok(()) => info!(slave_id, "slave disconnected"),
                            Err(e) => warn!(slave_id, error = %e, "slave session ended"),
                        }
                        protocol.deregister_slave(slave_id);
                    });
                }
                None => {
                    warn!(%addr, "refusing slave connection, max_slaves reached");
                }
            },
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Drive one slave until its socket closes.
async fn serve_slave(protocol: &Protocol, stream: TcpStream, slave_id: u32) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut cursor = SessionCursor::default();
    let mut cmd_rx = protocol.cmd_watch();

    loop {
        // Next command at the cursor, waiting for the registry when idle.
        let cmd = loop {
            if let Some(cmd) = protocol.next_for(&mut cursor) {
                break cmd;
            }
            if cmd_rx.changed().await.is_err() {
                return Ok(());
            }
        };

        write_half.write_all(cmd.encode().as_bytes()).await?;
        write_half.flush().await?;

        // Wait for the reply matching what we sent; anything older was
        // already answered once and is dropped silently.
        let reply: Reply = loop {
            let Some(reply) = read_reply(&mut reader).await? else {
                return Ok(());
            };
            if reply.id == cmd.id {
                break reply;
            }
            debug!(
                slave_id,
                reply_id = reply.id,
                expected = cmd.id,
                "discarding stale reply"
            );
        };

        if reply.ok {
            protocol.ack(&mut cursor, reply.id);
            if !protocol.publish_reply(slave_id, reply.id, reply.raw) {
                debug!(slave_id, cmd_id = reply.id, "reply superseded");
            }
        } else {
            // The slave's game state diverged; replay history from the
            // last command it acknowledged.
            warn!(
                slave_id,
                cmd_id = reply.id,
                payload = reply.payload(),
                "slave reported error, resynchronizing"
            );
            protocol.rewind(&mut cursor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    use go_core::Stone;
    use gtp_wire::{read_command, Command};

    use crate::collector::ReplyCollector;
    use crate::genmoves;
    use crate::time_control::TimeInfo;

    struct FakeSlave {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl FakeSlave {
        async fn connect(addr: std::net::SocketAddr) -> FakeSlave {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            FakeSlave {
                reader: BufReader::new(read_half),
                writer,
            }
        }

        async fn next_command(&mut self) -> Command {
            read_command(&mut self.reader).await.unwrap().unwrap()
        }

        async fn send(&mut self, text: &str) {
            self.writer.write_all(text.as_bytes()).await.unwrap();
            self.writer.flush().await.unwrap();
        }
    }

    async fn start_master(protocol: &Arc<Protocol>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_listener(Arc::clone(protocol), listener));
        addr
    }

    async fn wait_for_slaves(protocol: &Protocol, count: usize) {
        for _ in 0..200 {
            if protocol.active_slaves() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("slaves did not register in time");
    }

    #[tokio::test]
    async fn history_is_replayed_to_a_new_slave_in_order() {
        let protocol = Arc::new(Protocol::new(4));
        protocol.append_command("boardsize", "19\n");
        protocol.append_command("clear_board", "");
        protocol.append_command("komi", "7.5\n");

        let addr = start_master(&protocol).await;
        let mut slave = FakeSlave::connect(addr).await;

        for (expect_id, expect_verb) in [(1, "boardsize"), (2, "clear_board"), (3, "komi")] {
            let cmd = slave.next_command().await;
            assert_eq!(cmd.id, expect_id);
            assert_eq!(cmd.verb, expect_verb);
            slave.send(&format!("={}\n\n", cmd.id)).await;
        }

        // Commands issued later flow through the same session.
        protocol.append_command("play", "black D4\n");
        let cmd = slave.next_command().await;
        assert_eq!((cmd.id, cmd.verb.as_str()), (4, "play"));
    }

    #[tokio::test]
    async fn stale_replies_are_discarded_silently() {
        let protocol = Arc::new(Protocol::new(4));
        protocol.append_command("clear_board", "");
        let addr = start_master(&protocol).await;
        let mut slave = FakeSlave::connect(addr).await;

        let cmd = slave.next_command().await;
        // A leftover reply from a past life, then the real one.
        slave.send("=99 stale\n\n").await;
        slave.send(&format!("={}\n\n", cmd.id)).await;

        protocol.append_command("komi", "6.5\n");
        let cmd = slave.next_command().await;
        assert_eq!(cmd.id, 2);
    }

    #[tokio::test]
    async fn error_reply_triggers_history_replay() {
        let protocol = Arc::new(Protocol::new(4));
        protocol.append_command("boardsize", "19\n");
        protocol.append_command("play", "black D4\n");

        let addr = start_master(&protocol).await;
        let mut slave = FakeSlave::connect(addr).await;

        let cmd = slave.next_command().await;
        assert_eq!(cmd.id, 1);
        slave.send("=1\n\n").await;

        let cmd = slave.next_command().await;
        assert_eq!(cmd.id, 2);
        slave.send("?2 unknown position\n\n").await;

        // The master replays from the last acknowledged command onward.
        let resent = slave.next_command().await;
        assert_eq!(resent.id, 2);
        assert_eq!(resent.verb, "play");
        slave.send("=2\n\n").await;
    }

    #[tokio::test]
    async fn full_search_round_aggregates_two_slaves() {
        let protocol = Arc::new(Protocol::new(4));
        let addr = start_master(&protocol).await;

        // Two scripted slaves: canned genmoves stats with keep_looking
        // off, plain acks for everything else.
        for children in [
            "A1 60 0.60 50 0.55\nB2 40 0.40 30 0.45\n",
            "A1 50 0.65 40 0.60\nB2 30 0.35 20 0.40\n",
        ] {
            let mut slave = FakeSlave::connect(addr).await;
            tokio::spawn(async move {
                loop {
                    let cmd = slave.next_command().await;
                    if cmd.verb.starts_with("pachi-genmoves") {
                        let own = if children.starts_with("A1 60") { 10 } else { 8 };
                        slave
                            .send(&format!("={} {} 100 4 0\n{}\n", cmd.id, own, children))
                            .await;
                    } else {
                        slave.send(&format!("={}\n\n", cmd.id)).await;
                    }
                }
            });
        }
        wait_for_slaves(&protocol, 2).await;

        let collector = ReplyCollector::new(Arc::clone(&protocol));
        let mut ti = TimeInfo::default();
        let outcome = genmoves::search(
            &protocol,
            &collector,
            &mut ti,
            Stone::Black,
            false,
            19,
            0,
        )
        .await;

        assert_eq!(outcome.coord.to_string(), "A1");
        assert_eq!(outcome.stats.playouts, 110);
        assert!((outcome.stats.value - 0.6227).abs() < 1e-4);
        assert_eq!(outcome.played, 18);
        assert_eq!(outcome.replies, 2);

        // The search was committed as a play under a fresh id; a slave
        // connecting now replays the committed history, never the search.
        assert_eq!(protocol.trailing_id(), Some(2));
        let mut late = FakeSlave::connect(addr).await;
        let cmd = late.next_command().await;
        assert_eq!((cmd.id, cmd.verb.as_str()), (2, "play"));
        assert!(cmd.args.starts_with("black A1"));
    }
}

