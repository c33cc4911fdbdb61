//! Minimal IMAP4rev1 client plumbing: tagged commands, literal-aware
//! response reading and the few response parsers the session needs.
//!
//! Generic over the byte stream so the TLS socket can be swapped for a
//! scripted buffer in tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::MailError;

/// Largest literal accepted from the server. Bigger announcements are
/// rejected before any allocation.
pub const MAX_LITERAL_BYTES: usize = 64 * 1024 * 1024;

static LIST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\* LIST \(([^)]*)\) (?:NIL|"(?:[^"\\]|\\.)*") (.+)$"#).expect("static regex")
});

static FETCH_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUID (\d+)").expect("static regex"));

/// One logical response line. Literals (`{n}\r\n<n bytes>`) are kept out of
/// `text`, which still contains the `{n}` markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

impl ResponseLine {
    fn is_untagged(&self, keyword: &str) -> bool {
        self.text
            .strip_prefix("* ")
            .is_some_and(|rest| rest.to_ascii_uppercase().starts_with(keyword))
    }

    /// Untagged `* <n> FETCH (...)` line.
    fn is_fetch(&self) -> bool {
        self.text.starts_with("* ") && self.text.to_ascii_uppercase().contains(" FETCH ")
    }
}

/// Blocking IMAP connection over any duplex byte stream.
pub struct ImapConnection<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
}

impl<S: Read + Write> ImapConnection<S> {
    /// Wrap a freshly opened stream and consume the server greeting.
    pub fn from_stream(stream: S) -> Result<Self, MailError> {
        let mut conn = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
        };
        let greeting = read_line(&mut conn.stream)?;
        let upper = greeting.text.to_ascii_uppercase();
        if !(upper.starts_with("* OK") || upper.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.text
            )));
        }
        Ok(conn)
    }

    /// Send a tagged command and collect the response up to its completion.
    ///
    /// `label` names the command in errors so credentials never leak into
    /// error messages or logs.
    pub fn command(&mut self, label: &str, command: &str) -> Result<Vec<ResponseLine>, MailError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        writer.flush()?;

        let lines = read_response(&mut self.stream, &tag)?;
        check_completion(&lines, &tag, label)?;
        Ok(lines)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let command = format!("LOGIN {} {}", quote(username), quote(password));
        self.command("LOGIN", &command).map_err(|e| match e {
            MailError::Command { .. } => MailError::AuthFailed {
                username: username.to_string(),
            },
            other => other,
        })?;
        Ok(())
    }

    pub fn select(&mut self, inbox: &str) -> Result<(), MailError> {
        self.command("SELECT", &format!("SELECT {}", quote(inbox)))?;
        Ok(())
    }

    pub fn list(&mut self) -> Result<Vec<String>, MailError> {
        let lines = self.command("LIST", "LIST \"\" \"*\"")?;
        Ok(lines.iter().filter_map(parse_list_line).collect())
    }

    /// UIDs of every message in the selected inbox.
    pub fn search_all(&mut self) -> Result<Vec<String>, MailError> {
        let lines = self.command("UID SEARCH", "UID SEARCH ALL")?;
        Ok(parse_search(&lines))
    }

    /// Header block of each message, keyed by UID.
    pub fn fetch_headers(&mut self, uids: &[String]) -> Result<Vec<(String, Vec<u8>)>, MailError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uids.join(",");
        let lines = self.command(
            "UID FETCH",
            &format!("UID FETCH {set} (UID BODY.PEEK[HEADER])"),
        )?;

        Ok(lines
            .into_iter()
            .filter(ResponseLine::is_fetch)
            .filter_map(|mut line| {
                let uid = parse_fetch_uid(&line.text)?;
                let header = line.literals.drain(..).next()?;
                Some((uid, header))
            })
            .collect())
    }

    /// Full RFC 822 source of one message, without setting `\Seen`.
    pub fn fetch_message(&mut self, uid: &str) -> Result<Vec<u8>, MailError> {
        if uid.is_empty() || !uid.chars().all(|c| c.is_ascii_digit()) {
            return Err(MailError::MessageNotFound(uid.to_string()));
        }
        let lines = self.command("UID FETCH", &format!("UID FETCH {uid} BODY.PEEK[]"))?;

        lines
            .into_iter()
            .filter(ResponseLine::is_fetch)
            .find_map(|mut line| line.literals.drain(..).next())
            .ok_or_else(|| MailError::MessageNotFound(uid.to_string()))
    }

    pub fn logout(&mut self) -> Result<(), MailError> {
        self.command("LOGOUT", "LOGOUT")?;
        Ok(())
    }
}

/// Read one logical line, pulling in any literals it announces.
fn read_line<R: BufRead>(reader: &mut R) -> Result<ResponseLine, MailError> {
    let mut text = String::new();
    let mut literals = Vec::new();

    loop {
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(MailError::Transport("IMAP connection closed".into()));
        }
        let chunk = String::from_utf8_lossy(&buf);
        let chunk = chunk.trim_end_matches(['\r', '\n']);
        text.push_str(chunk);

        match literal_length(chunk) {
            Some(len) if len > MAX_LITERAL_BYTES => {
                return Err(MailError::Protocol(format!(
                    "literal of {len} bytes exceeds the {MAX_LITERAL_BYTES} byte limit"
                )));
            }
            Some(len) => {
                let mut literal = vec![0u8; len];
                reader.read_exact(&mut literal)?;
                literals.push(literal);
            }
            None => return Ok(ResponseLine { text, literals }),
        }
    }
}

/// Read lines until the tagged completion line for `tag` (inclusive).
pub fn read_response<R: BufRead>(reader: &mut R, tag: &str) -> Result<Vec<ResponseLine>, MailError> {
    let prefix = format!("{tag} ");
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader)?;
        let done = line.text.starts_with(&prefix);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Fail unless the tagged completion is `OK`.
fn check_completion(lines: &[ResponseLine], tag: &str, label: &str) -> Result<(), MailError> {
    let status = lines
        .last()
        .and_then(|l| l.text.strip_prefix(tag))
        .map(str::trim_start)
        .unwrap_or_default();
    if status.to_ascii_uppercase().starts_with("OK") {
        Ok(())
    } else {
        Err(MailError::Command {
            command: label.to_string(),
            response: status.to_string(),
        })
    }
}

/// `"... {123}"` → `Some(123)`.
fn literal_length(chunk: &str) -> Option<usize> {
    let inner = chunk.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    let digits = inner[open + 1..].trim_end_matches('+');
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Quote a string for use as an IMAP quoted string.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return s.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Mailbox name from a `* LIST` line; quoted, atom and literal forms.
pub fn parse_list_line(line: &ResponseLine) -> Option<String> {
    if !line.is_untagged("LIST ") {
        return None;
    }
    let caps = LIST_LINE.captures(&line.text)?;
    let name = caps.get(2)?.as_str().trim();

    if literal_length(name).is_some() {
        let literal = line.literals.first()?;
        return Some(String::from_utf8_lossy(literal).into_owned());
    }
    Some(unquote(name))
}

/// UIDs from `* SEARCH` lines.
pub fn parse_search(lines: &[ResponseLine]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.is_untagged("SEARCH"))
        .flat_map(|l| l.text.split_whitespace().skip(2).map(str::to_string))
        .collect()
}

/// `UID n` from a FETCH line.
pub fn parse_fetch_uid(text: &str) -> Option<String> {
    FETCH_UID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scripted stand-in for the server socket.
#[cfg(test)]
pub(crate) mod scripted {
    use std::io::{Cursor, Read, Write};

    use super::ImapConnection;

    /// Duplex stream: reads canned server output, records client writes.
    pub(crate) struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        pub(crate) fn new(server: &str) -> Self {
            Self {
                input: Cursor::new(server.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn connection(server: &str) -> ImapConnection<Scripted> {
        ImapConnection::from_stream(Scripted::new(server)).unwrap()
    }

    /// Everything the client wrote so far.
    pub(crate) fn sent(conn: &ImapConnection<Scripted>) -> String {
        String::from_utf8_lossy(&conn.stream.get_ref().output).into_owned()
    }
}
