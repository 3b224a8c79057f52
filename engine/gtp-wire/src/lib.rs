//! Wire codec for the master-slave command stream.
//!
//! Commands travel as `id verb args\n` lines; commands with multi-line
//! arguments (the genmoves family) terminate the argument block with an
//! empty line. Replies mirror GTP: `=id payload\n\n` on success, `?id
//! payload\n\n` on failure, with multi-line payloads permitted.
//!
//! The codec is shared knowledge between both ends of the socket, so the
//! reader helpers here are written against `AsyncBufRead` and used by the
//! master's sessions as well as test harness slaves.

pub mod command;
pub mod genmoves;
pub mod reply;

use thiserror::Error;

pub use command::{read_command, Command};
pub use genmoves::{GenmovesArgs, GenmovesReply, TimeArgs};
pub use reply::{format_reply, read_reply, Reply};

/// Codec failures. Parse errors are never fatal to a connection; callers
/// discard the offending line and continue.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed command line: {0:?}")]
    Command(String),

    #[error("malformed reply: {0:?}")]
    Reply(String),

    #[error("malformed genmoves payload: {0:?}")]
    Genmoves(String),

    #[error(transparent)]
    Token(#[from] go_core::ParseError),
}
