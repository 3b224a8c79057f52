//! Process-wide protocol state: the command registry, the reply buffer
//! and the slave table.
//!
//! The registry is the authoritative, monotonic log of every command the
//! master has issued; resynchronizing a slave is always a replay of a
//! suffix of this log, never a retry. All state sits behind one mutex
//! held only for short critical sections; two watch channels take the
//! place of condition variables, waking idle sessions when commands are
//! posted and the reply collector when replies (or the slave population)
//! change.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use gtp_wire::Command;
use tokio::sync::watch;
use tracing::debug;

/// One slot of the command history.
#[derive(Debug, Clone)]
struct Slot {
    cmd: Command,
    /// Bumped whenever the slot is rewritten in place, so sessions that
    /// already transmitted it know to retransmit.
    revision: u32,
}

#[derive(Debug)]
struct ProtocolState {
    history: Vec<Slot>,
    next_id: u32,
    next_slave_id: u32,
    slaves: HashSet<u32>,
    replies: HashMap<u32, SlaveReply>,
    /// Monotonic counter stamped onto every published reply.
    reply_seq: u64,
    /// `reply_seq` as of the last command mutation. Replies at or below
    /// this mark answered an earlier payload of the command: they still
    /// aggregate, but the collector's barrier only counts newer ones, so
    /// a stats refresh under an unchanged id does not release the next
    /// wait instantly.
    cmd_seq_mark: u64,
}

/// Most recent successful reply from one slave.
#[derive(Debug, Clone)]
pub struct SlaveReply {
    pub cmd_id: u32,
    seq: u64,
    pub raw: String,
}

/// A session's position in the command history.
///
/// `acked_index ≤ next_index` always holds, mirroring the
/// `last_acked_id ≤ last_sent_id` session invariant.
#[derive(Debug, Default, Clone)]
pub struct SessionCursor {
    next_index: usize,
    acked_index: usize,
    pub last_sent_id: u32,
    pub last_acked_id: u32,
    last_sent_revision: u32,
}

/// Shared protocol context handed to every subsystem.
#[derive(Debug)]
pub struct Protocol {
    state: Mutex<ProtocolState>,
    max_slaves: usize,
    cmd_tx: watch::Sender<u64>,
    reply_tx: watch::Sender<u64>,
}

impl Protocol {
    pub fn new(max_slaves: usize) -> Self {
        let (cmd_tx, _) = watch::channel(0);
        let (reply_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(ProtocolState {
                history: Vec::new(),
                next_id: 1,
                next_slave_id: 1,
                slaves: HashSet::new(),
                replies: HashMap::new(),
                reply_seq: 0,
                cmd_seq_mark: 0,
            }),
            max_slaves,
            cmd_tx,
            reply_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProtocolState> {
        self.state.lock().expect("protocol lock poisoned")
    }

    /// Append a new command under a fresh id.
    pub fn append_command(&self, verb: &str, args: &str) -> u32 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.cmd_seq_mark = state.reply_seq;
        state.history.push(Slot {
            cmd: Command::new(id, verb, args),
            revision: 0,
        });
        drop(state);
        self.cmd_tx.send_modify(|v| *v += 1);
        id
    }

    /// Rewrite the trailing command in place, keeping its id so an
    /// in-flight reply still matches. Used to refresh the prior-stat
    /// payload of a running search.
    pub fn replace_last(&self, verb: &str, args: &str) -> u32 {
        self.rewrite_last(verb, args, false)
    }

    /// Rewrite the trailing command under a new id, retiring the old one:
    /// no slave will ever execute the original command under the retired
    /// id. Used to commit the chosen move over a pending search.
    pub fn supersede_last(&self, verb: &str, args: &str) -> u32 {
        self.rewrite_last(verb, args, true)
    }

    fn rewrite_last(&self, verb: &str, args: &str, new_id: bool) -> u32 {
        let mut state = self.lock();
        if state.history.is_empty() {
            drop(state);
            return self.append_command(verb, args);
        }
        let id = if new_id {
            let id = state.next_id;
            state.next_id += 1;
            id
        } else {
            state.history.last().expect("non-empty history").cmd.id
        };
        state.cmd_seq_mark = state.reply_seq;
        let last = state.history.last_mut().expect("non-empty history");
        last.cmd = Command::new(id, verb, args);
        last.revision += 1;
        drop(state);
        self.cmd_tx.send_modify(|v| *v += 1);
        id
    }

    /// Id of the trailing (outstanding) command.
    pub fn trailing_id(&self) -> Option<u32> {
        self.lock().history.last().map(|slot| slot.cmd.id)
    }

    /// Number of commands ever logged (superseded slots included).
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// The next command this session should transmit, if any: the first
    /// slot past its cursor, or the trailing slot again if that was
    /// rewritten since it was last sent.
    pub fn next_for(&self, cursor: &mut SessionCursor) -> Option<Command> {
        let state = self.lock();
        let slot = if cursor.next_index < state.history.len() {
            let slot = &state.history[cursor.next_index];
            cursor.next_index += 1;
            slot
        } else if cursor.next_index > 0 {
            let slot = &state.history[cursor.next_index - 1];
            if slot.cmd.id == cursor.last_sent_id && slot.revision == cursor.last_sent_revision {
                return None;
            }
            slot
        } else {
            return None;
        };
        cursor.last_sent_id = slot.cmd.id;
        cursor.last_sent_revision = slot.revision;
        Some(slot.cmd.clone())
    }

    /// Record a successful reply for the session's outstanding command.
    pub fn ack(&self, cursor: &mut SessionCursor, id: u32) {
        cursor.acked_index = cursor.next_index;
        cursor.last_acked_id = id;
    }

    /// Rewind the cursor for history replay from the last acknowledged
    /// command onward.
    pub fn rewind(&self, cursor: &mut SessionCursor) {
        cursor.next_index = cursor.acked_index;
        // Force retransmission even if the trailing slot is unchanged.
        cursor.last_sent_revision = u32::MAX;
    }

    /// Store a slave's reply. Only replies to the current outstanding
    /// command are published; anything else was superseded in the
    /// meantime and is dropped. Returns whether the reply was published.
    pub fn publish_reply(&self, slave_id: u32, cmd_id: u32, raw: String) -> bool {
        let mut state = self.lock();
        let current = state.history.last().map(|slot| slot.cmd.id);
        if current != Some(cmd_id) {
            debug!(slave_id, cmd_id, ?current, "discarding superseded reply");
            return false;
        }
        state.reply_seq += 1;
        let seq = state.reply_seq;
        state.replies.insert(slave_id, SlaveReply { cmd_id, seq, raw });
        drop(state);
        self.reply_tx.send_modify(|v| *v += 1);
        true
    }

    /// Register a connecting slave, refusing beyond `max_slaves`.
    pub fn register_slave(&self) -> Option<u32> {
        let mut state = self.lock();
        if state.slaves.len() >= self.max_slaves {
            return None;
        }
        let id = state.next_slave_id;
        state.next_slave_id += 1;
        state.slaves.insert(id);
        drop(state);
        // The collector's all-slaves-replied condition depends on the
        // slave population.
        self.reply_tx.send_modify(|v| *v += 1);
        Some(id)
    }

    pub fn deregister_slave(&self, slave_id: u32) {
        let mut state = self.lock();
        state.slaves.remove(&slave_id);
        state.replies.remove(&slave_id);
        drop(state);
        self.reply_tx.send_modify(|v| *v += 1);
    }

    pub fn active_slaves(&self) -> usize {
        self.lock().slaves.len()
    }

    /// How many fresh replies the current command payload has received,
    /// and how many slaves are connected. Replies retained from an
    /// earlier payload of the same command id are not fresh.
    pub fn reply_progress(&self) -> (usize, usize) {
        let state = self.lock();
        let current = state.history.last().map(|slot| slot.cmd.id);
        let count = match current {
            Some(id) => state
                .replies
                .values()
                .filter(|reply| reply.cmd_id == id && reply.seq > state.cmd_seq_mark)
                .count(),
            None => 0,
        };
        (count, state.slaves.len())
    }

    /// Stable snapshot of the replies to the current command.
    pub fn replies_snapshot(&self) -> Vec<(u32, String)> {
        let state = self.lock();
        let Some(current) = state.history.last().map(|slot| slot.cmd.id) else {
            return Vec::new();
        };
        let mut replies: Vec<(u32, String)> = state
            .replies
            .iter()
            .filter(|(_, reply)| reply.cmd_id == current)
            .map(|(&slave, reply)| (slave, reply.raw.clone()))
            .collect();
        replies.sort_by_key(|(slave, _)| *slave);
        replies
    }

    /// Subscribe to command postings.
    pub fn cmd_watch(&self) -> watch::Receiver<u64> {
        self.cmd_tx.subscribe()
    }

    /// Subscribe to reply (and slave population) changes.
    pub fn reply_watch(&self) -> watch::Receiver<u64> {
        self.reply_tx.subscribe()
    }
}
