//! Command framing.

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt};

use crate::WireError;

/// A numbered GTP command as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Sequence number assigned by the master's registry.
    pub id: u32,
    pub verb: String,
    /// Argument text. Multi-line arguments carry their own framing: they
    /// end with an empty line (i.e. the text ends in `\n\n`).
    pub args: String,
}

impl Command {
    pub fn new(id: u32, verb: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id,
            verb: verb.into(),
            args: args.into(),
        }
    }

    /// Verbs whose argument block spans multiple lines and is terminated
    /// by an empty line.
    pub fn has_multiline_args(verb: &str) -> bool {
        matches!(verb, "pachi-genmoves" | "pachi-genmoves_cleanup")
    }

    /// Render the command for transmission. Output always ends with a
    /// newline; multi-line argument blocks keep their trailing empty line.
    pub fn encode(&self) -> String {
        let mut out = if self.args.is_empty() {
            format!("{} {}", self.id, self.verb)
        } else {
            format!("{} {} {}", self.id, self.verb, self.args)
        };
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Parse a command from its full wire text (first line plus any
    /// continuation lines).
    pub fn parse(text: &str) -> Result<Command, WireError> {
        let err = || WireError::Command(text.to_string());
        let (first, rest) = match text.split_once('\n') {
            Some((f, r)) => (f, r),
            None => (text, ""),
        };
        let mut tokens = first.splitn(3, ' ');
        let id: u32 = tokens.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let verb = tokens.next().ok_or_else(err)?.to_string();
        let mut args = tokens.next().unwrap_or("").to_string();
        if !rest.is_empty() {
            if !args.is_empty() {
                args.push('\n');
            }
            args.push_str(rest);
        }
        Ok(Command { id, verb, args })
    }
}

/// Read one command from the stream, honoring multi-line framing for the
/// genmoves family. Returns `Ok(None)` on a clean EOF between commands.
///
/// Malformed lines yield a `WireError` wrapped in `InvalidData`; callers
/// may discard and continue reading.
pub async fn read_command<R>(reader: &mut R) -> io::Result<Option<Command>>
where
    R: AsyncBufRead + Unpin,
{
    let mut first = String::new();
    loop {
        first.clear();
        if reader.read_line(&mut first).await? == 0 {
            return Ok(None);
        }
        if !first.trim().is_empty() {
            break;
        }
        // Blank line between commands: keep scanning.
    }

    let mut text = first.trim_end_matches(['\r', '\n']).to_string();
    let verb = text.split(' ').nth(1).unwrap_or("").to_string();
    if Command::has_multiline_args(&verb) {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            text.push('\n');
            text.push_str(trimmed);
        }
        // Restore the blank-line terminator so parse() sees the framing.
        text.push('\n');
    }

    Command::parse(&text)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
