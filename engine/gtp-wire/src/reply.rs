//! Reply framing.

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt};

use crate::WireError;

/// A slave's reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Id echoed from the command this answers.
    pub id: u32,
    /// `=` replies are successes, `?` replies failures.
    pub ok: bool,
    /// Full reply text including the `=id`/`?id` prefix, without the
    /// terminating blank line. Always ends with a newline.
    pub raw: String,
}

impl Reply {
    /// Parse a reply from its accumulated text (blank-line terminator
    /// already stripped).
    pub fn parse(text: &str) -> Result<Reply, WireError> {
        let err = || WireError::Reply(text.to_string());
        let ok = match text.as_bytes().first() {
            Some(b'=') => true,
            Some(b'?') => false,
            _ => return Err(err()),
        };
        let body = &text[1..];
        let id_end = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        let id: u32 = body[..id_end].parse().map_err(|_| err())?;
        let mut raw = text.trim_end_matches('\n').to_string();
        raw.push('\n');
        Ok(Reply { id, ok, raw })
    }

    /// The reply text after the `=id `/`?id ` prefix.
    pub fn payload(&self) -> &str {
        let body = &self.raw[1..];
        let id_end = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        body[id_end..].trim_start_matches(' ').trim_end_matches('\n')
    }
}

/// Format an upstream GTP reply: `=id payload\n\n` or `?id payload\n\n`,
/// omitting the id when the controller sent none.
pub fn format_reply(id: Option<u32>, ok: bool, payload: &str) -> String {
    let marker = if ok { '=' } else { '?' };
    let id_text = id.map(|n| n.to_string()).unwrap_or_default();
    let payload = payload.trim_end_matches('\n');
    if payload.is_empty() {
        format!("{marker}{id_text}\n\n")
    } else {
        format!("{marker}{id_text} {payload}\n\n")
    }
}

/// Read one reply (lines until a blank line) from the stream. Returns
/// `Ok(None)` on EOF before any reply content.
pub async fn read_reply<R>(reader: &mut R) -> io::Result<Option<Reply>>
where
    R: AsyncBufRead + Unpin,
{
    let mut text = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if text.is_empty() {
                return Ok(None);
            }
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if text.is_empty() {
                // Leading blank line: keep scanning.
                continue;
            }
            break;
        }
        text.push_str(trimmed);
        text.push('\n');
    }
    Reply::parse(&text)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_and_failure() {
        let ok = Reply::parse("=7 10 100 4 1\n").unwrap();
        assert_eq!((ok.id, ok.ok), (7, true));
        assert_eq!(ok.payload(), "10 100 4 1");

        let err = Reply::parse("?42 unknown position\n").unwrap();
        assert_eq!((err.id, err.ok), (42, false));
        assert_eq!(err.payload(), "unknown position");
    }

    #[test]
    fn multiline_payload_is_preserved() {
        let r = Reply::parse("=1 10 100 4 1\nA1 60 0.60 50 0.55\n").unwrap();
        assert!(r.raw.ends_with("0.55\n"));
        assert_eq!(r.payload(), "10 100 4 1\nA1 60 0.60 50 0.55");
    }

    #[test]
    fn formats_upstream_replies() {
        assert_eq!(format_reply(Some(5), true, "A1"), "=5 A1\n\n");
        assert_eq!(format_reply(None, true, ""), "=\n\n");
        assert_eq!(format_reply(Some(2), false, "syntax error"), "?2 syntax error\n\n");
    }

    #[tokio::test]
    async fn reads_replies_until_blank_line() {
        let wire = "=1 8 80 4 1\nA1 50 0.65 40 0.60\n\n=2 done\n\n";
        let mut reader = tokio::io::BufReader::new(wire.as_bytes());

        let r1 = read_reply(&mut reader).await.unwrap().unwrap();
        assert_eq!(r1.id, 1);
        assert!(r1.raw.contains("A1 50"));

        let r2 = read_reply(&mut reader).await.unwrap().unwrap();
        assert_eq!((r2.id, r2.payload()), (2, "done"));

        assert!(read_reply(&mut reader).await.unwrap().is_none());
    }
}
