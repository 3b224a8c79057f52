//! Reply collection barrier.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};

use crate::protocol::Protocol;

/// Waits for replies to the current command, up to a deadline.
#[derive(Debug, Clone)]
pub struct ReplyCollector {
    protocol: Arc<Protocol>,
}

impl ReplyCollector {
    pub fn new(protocol: Arc<Protocol>) -> Self {
        Self { protocol }
    }

    /// Block until every connected slave replied to the current command
    /// payload or the deadline passes, then return a stable snapshot of
    /// the reply buffer.
    ///
    /// Past the deadline the barrier still holds out for the very first
    /// reply while slaves are connected, so a slow fleet yields a late
    /// answer rather than none. With no slaves connected it returns an
    /// empty snapshot at the deadline; a timeout is never an error, just
    /// a smaller aggregate.
    pub async fn wait_until(&self, deadline: Instant) -> Vec<(u32, String)> {
        let mut rx = self.protocol.reply_watch();
        loop {
            let (fresh, active) = self.protocol.reply_progress();
            if fresh > 0 && fresh >= active {
                break;
            }
            if Instant::now() >= deadline {
                if fresh > 0 || active == 0 {
                    break;
                }
                // Nothing yet: only a change can release us now.
                if rx.changed().await.is_err() {
                    break;
                }
            } else if matches!(timeout_at(deadline, rx.changed()).await, Ok(Err(_))) {
                // The protocol context went away.
                break;
            }
        }
        self.protocol.replies_snapshot()
    }
}
