//! STOMP 1.2 text frame codec
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! Frames may be preceded by any number of EOLs (heart-beats). One WebSocket
//! message may carry several frames back to back.

use crate::error::{Result, StompSocketError};
use std::fmt;
use std::str::FromStr;

/// STOMP frame command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames carry their header values verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = StompSocketError;

    fn from_str(s: &str) -> Result<Self> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => {
                return Err(StompSocketError::Frame(format!("unknown command '{}'", other)))
            }
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name` (repeated headers: the first one wins)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to wire text, NUL-terminated
    ///
    /// A `content-length` header is added for non-empty bodies unless one
    /// is already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Whether `input` starts like a STOMP frame (after optional heart-beat EOLs)
pub fn looks_like_frame(input: &str) -> bool {
    let trimmed = input.trim_start_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return true;
    }
    let first_line = trimmed.split(['\n', '\r']).next().unwrap_or_default();
    first_line.parse::<Command>().is_ok()
}

/// Decode every frame in `input`, failing on the first malformed one
///
/// Returns an empty vector for pure heart-beat input.
pub fn decode_frames(input: &str) -> Result<Vec<Frame>> {
    decode_each(input).into_iter().collect()
}

/// Decode every frame in `input`, one result per frame
///
/// A malformed frame is skipped up to its NUL terminator so the frames after
/// it still decode. Without a terminator the rest of the input is one error.
pub fn decode_each(input: &str) -> Vec<Result<Frame>> {
    let mut results = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            break;
        }
        match decode_frame(rest) {
            Ok((frame, consumed)) => {
                results.push(Ok(frame));
                rest = &rest[consumed..];
            }
            Err(e) => {
                results.push(Err(e));
                match rest.find('\0') {
                    Some(nul) => rest = &rest[nul + 1..],
                    None => break,
                }
            }
        }
    }

    results
}

/// Decode one frame from the start of `input`, returning the bytes consumed
fn decode_frame(input: &str) -> Result<(Frame, usize)> {
    let mut pos = 0;

    let command_line = read_line(input, &mut pos)
        .ok_or_else(|| StompSocketError::Frame("missing command line".to_string()))?;
    let command: Command = command_line.parse()?;
    let unescape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(input, &mut pos)
            .ok_or_else(|| StompSocketError::Frame("unterminated header block".to_string()))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompSocketError::Frame(format!("malformed header '{}'", line)))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .map(|(_, value)| {
            value.trim().parse::<usize>().map_err(|_| {
                StompSocketError::Frame(format!("invalid content-length '{}'", value))
            })
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos.checked_add(len).ok_or_else(|| {
                StompSocketError::Frame(format!("content-length {} out of range", len))
            })?;
            if input.get(pos..end).is_none() {
                return Err(StompSocketError::Frame(format!(
                    "body shorter than content-length {}",
                    len
                )));
            }
            if !input[end..].starts_with('\0') {
                return Err(StompSocketError::Frame(
                    "missing NUL after content-length body".to_string(),
                ));
            }
            end
        }
        None => input[pos..]
            .find('\0')
            .map(|offset| pos + offset)
            .ok_or_else(|| StompSocketError::Frame("missing NUL terminator".to_string()))?,
    };

    let frame = Frame {
        command,
        headers,
        body: input[pos..body_end].to_string(),
    };

    Ok((frame, body_end + 1))
}

/// Read one EOL-terminated line, stripping an optional CR
fn read_line<'a>(input: &'a str, pos: &mut usize) -> Option<&'a str> {
    let rest = &input[*pos..];
    let offset = rest.find('\n')?;
    *pos += offset + 1;
    let line = &rest[..offset];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(StompSocketError::Frame(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
