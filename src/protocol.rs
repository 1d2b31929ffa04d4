//! The wire protocol: a NUL-terminated, `/`-prefixed line protocol
//! carrying `Nick`, `Msg`, `Log`, `Ok`, `Err`, `Quit` and `List` frames.

use std::fmt;

use crate::buffer::Buf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nick,
    Msg,
    Log,
    Ok,
    Err,
    Quit,
    /// Lists currently authenticated nicknames.
    List,
}

impl Kind {
    fn prefix(self) -> &'static str {
        match self {
            Kind::Nick => "nick",
            Kind::Msg => "msg",
            Kind::Log => "log",
            Kind::Ok => "ok",
            Kind::Err => "err",
            Kind::Quit => "quit",
            Kind::List => "list",
        }
    }

    fn from_prefix(s: &str) -> Option<Kind> {
        match s {
            "nick" => Some(Kind::Nick),
            "msg" => Some(Kind::Msg),
            "log" => Some(Kind::Log),
            "ok" => Some(Kind::Ok),
            "err" => Some(Kind::Err),
            "quit" => Some(Kind::Quit),
            "list" => Some(Kind::List),
            _ => None,
        }
    }

    /// Whether this kind may be emitted with no content at all
    /// (`/ok\0` rather than `/ok <text>\0`). A `/msg` or `/log` with empty
    /// content is accepted by the grammar; it is up to whoever handles the
    /// decoded message to decide whether an empty one is worth acting on.
    fn allows_empty_content(self) -> bool {
        matches!(self, Kind::Ok | Kind::Quit | Kind::List | Kind::Msg | Kind::Log)
    }

    /// Whether this kind carries an optional `[user]` wire tag.
    fn carries_user_tag(self) -> bool {
        matches!(self, Kind::Msg | Kind::Log)
    }
}

/// An immutable chat protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub kind: Kind,
    pub content: String,
    pub user: Option<String>,
}

impl Msg {
    pub fn nick<S: Into<String>>(name: S) -> Msg {
        Msg { kind: Kind::Nick, content: name.into(), user: None }
    }

    pub fn chat<S: Into<String>>(content: S) -> Msg {
        Msg { kind: Kind::Msg, content: content.into(), user: None }
    }

    pub fn chat_from<U: Into<String>, S: Into<String>>(user: U, content: S) -> Msg {
        Msg { kind: Kind::Msg, content: content.into(), user: Some(user.into()) }
    }

    pub fn log_from<U: Into<String>, S: Into<String>>(user: U, content: S) -> Msg {
        Msg { kind: Kind::Log, content: content.into(), user: Some(user.into()) }
    }

    pub fn ok<S: Into<String>>(content: S) -> Msg {
        Msg { kind: Kind::Ok, content: content.into(), user: None }
    }

    pub fn ok_empty() -> Msg {
        Msg { kind: Kind::Ok, content: String::new(), user: None }
    }

    pub fn err<S: Into<String>>(reason: S) -> Msg {
        Msg { kind: Kind::Err, content: reason.into(), user: None }
    }

    pub fn quit<S: Into<String>>(reason: S) -> Msg {
        Msg { kind: Kind::Quit, content: reason.into(), user: None }
    }

    pub fn quit_empty() -> Msg {
        Msg { kind: Kind::Quit, content: String::new(), user: None }
    }

    pub fn list() -> Msg {
        Msg { kind: Kind::List, content: String::new(), user: None }
    }

    /// Serializes this message into wire form.
    /// The returned buffer includes the trailing NUL delimiter.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("/{}", self.kind.prefix()).into_bytes();

        if self.kind.carries_user_tag() {
            match &self.user {
                // a user tag is worth sending even with empty content, e.g.
                // a `/list` entry's "[name] " line
                Some(user) => out.extend(format!(" [{}] {}", user, self.content).into_bytes()),
                None if self.content.is_empty() => {}
                None => out.extend(format!(" {}", self.content).into_bytes()),
            }
        } else if self.content.is_empty() && self.kind.allows_empty_content() {
            // no trailing space for bare /ok and /quit
        } else {
            out.extend(format!(" {}", self.content).into_bytes());
        }

        out.push(0);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalCommand {
    ForgedServerPrefix,
}

impl fmt::Display for IllegalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client may not forge an /ok, /err or /log command")
    }
}

impl std::error::Error for IllegalCommand {}

/// Parses a line a human typed at a client prompt.
/// Only `Msg`, `Nick` and `Quit` can be produced this way: a line that
/// looks like a server-only command is rejected rather than silently
/// reinterpreted.
pub fn from_string(s: &str) -> Result<Msg, IllegalCommand> {
    let trimmed = s.trim();

    if let Some(rest) = strip_prefix_word(trimmed, "nick") {
        return Ok(Msg::nick(rest.trim()));
    }
    if let Some(rest) = strip_prefix_word(trimmed, "msg") {
        return Ok(Msg::chat(rest.trim()));
    }
    if let Some(rest) = strip_prefix_word(trimmed, "quit") {
        return Ok(Msg::quit(rest.trim()));
    }
    if starts_with_word(trimmed, "list") {
        return Ok(Msg::list());
    }
    if starts_with_word(trimmed, "ok") || starts_with_word(trimmed, "err")
        || starts_with_word(trimmed, "log")
    {
        return Err(IllegalCommand::ForgedServerPrefix);
    }

    Ok(Msg::chat(trimmed))
}

fn starts_with_word(s: &str, word: &str) -> bool {
    s == format!("/{}", word) || s.starts_with(&format!("/{} ", word))
}

fn strip_prefix_word<'a>(s: &'a str, word: &str) -> Option<&'a str> {
    if s == format!("/{}", word) {
        return Some("");
    }
    s.strip_prefix(&format!("/{} ", word))
}

/// Result of a single `decode_next` scan.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A fully-formed message was decoded and consumed from `buf`.
    Msg(Msg),
    /// `buf` holds the start of a message, or nothing usable at all;
    /// the caller should stop decoding and wait for more bytes.
    Partial,
}

/// Scans `buf` for the next complete `/`-prefixed, NUL-terminated frame,
/// On success the frame (including any discarded leading noise)
/// is consumed from `buf`. An unrecognized prefix desyncs silently: the
/// whole frame is discarded and `Partial` is returned, so the stream
/// resynchronizes on the next `/`.
pub fn decode_next(buf: &mut Buf) -> Decoded {
    let data = buf.unread();

    let slash_pos = match data.iter().position(|&b| b == b'/') {
        Some(p) => p,
        None => return Decoded::Partial,
    };

    let after_slash = &data[slash_pos + 1..];
    let nul_offset = match after_slash.iter().position(|&b| b == 0) {
        Some(p) => p,
        None => {
            // leave `start` pointing at the `/`, discarding only the
            // leading noise that preceded it
            if slash_pos > 0 {
                buf.consume(slash_pos);
            }
            return Decoded::Partial;
        }
    };

    let frame_end = slash_pos + 1 + nul_offset; // index of the NUL byte
    let frame = &data[slash_pos..frame_end];
    let total_consumed = frame_end + 1;

    let result = parse_frame(frame).map(Decoded::Msg).unwrap_or(Decoded::Partial);
    buf.consume(total_consumed);
    result
}

fn parse_frame(frame: &[u8]) -> Option<Msg> {
    let frame = std::str::from_utf8(frame).ok()?;
    let frame = &frame[1..]; // drop leading '/'

    let (prefix, rest) = match frame.find(' ') {
        Some(idx) => (&frame[..idx], &frame[idx + 1..]),
        None => (frame, ""),
    };
    let kind = Kind::from_prefix(prefix)?;

    if rest.is_empty() {
        return if kind.allows_empty_content() {
            Some(Msg { kind, content: String::new(), user: None })
        } else {
            None
        };
    }

    if kind.carries_user_tag() {
        if let Some((user, content)) = split_user_tag(rest) {
            return Some(Msg { kind, content: content.to_string(), user: Some(user.to_string()) });
        }
        return Some(Msg { kind, content: rest.to_string(), user: None });
    }

    Some(Msg { kind, content: rest.to_string(), user: None })
}

/// Splits a `"[user] rest of content"` tag off the front of `s`.
/// Returns `None` if `s` does not start with a
/// well-formed `[user] ` tag, in which case the whole string is content.
fn split_user_tag(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix('[')?;
    let close = rest.find(']')?;
    let user = &rest[..close];
    let after = rest[close + 1..].strip_prefix(' ')?;
    Some((user, after))
}
