//! Log proxy: fans slave log streams into the master's stderr.
//!
//! Each slave may optionally connect here and stream its log lines. They
//! are echoed to stderr prefixed with `< addr: ` so one logfile holds the
//! whole fleet yet the streams can be separated again with sed.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Accept proxy connections forever, spawning a copy task for each.
pub async fn run_listener(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "log proxy connected");
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stream).lines();
                    let mut stderr = tokio::io::stderr();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let framed = format!("< {}: {}\n", addr, line);
                        if stderr.write_all(framed.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    info!(%addr, "log proxy disconnected");
                });
            }
            Err(e) => {
                warn!(error = %e, "proxy accept failed");
            }
        }
    }
}
