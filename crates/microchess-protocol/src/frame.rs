//! STOMP 1.2 frames.
//!
//! A frame is a command line, `name:value` header lines, a blank line, an
//! optional body and a terminating NUL octet:
//!
//! ```text
//! SEND
//! destination:/app/create-game-proposal
//! content-length:36
//!
//! 6f1c…(36 bytes)…^@
//! ```
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c` for `:`)
//! in every frame except `CONNECT` and `CONNECTED`.

use std::fmt;

use crate::ProtocolError;

/// The STOMP protocol version this client negotiates.
pub const STOMP_VERSION: &str = "1.2";

/// A frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // -- client → broker --
    Connect,
    Send,
    Subscribe,
    Disconnect,
    // -- broker → client --
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The command as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Ok(match raw {
            "CONNECT" => Self::Connect,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => {
                return Err(ProtocolError::InvalidFrame(format!(
                    "unknown command {other:?}"
                )));
            }
        })
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; lookups return the
    /// first occurrence.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` frame opening a session on `host`. Heart-beating is
    /// disabled; liveness is left to the WebSocket.
    pub fn connect(host: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    /// `SUBSCRIBE` frame binding subscription `id` to `destination`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `SEND` frame publishing `body` to `destination`.
    pub fn send(destination: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", content_type)
            .with_body(body)
    }

    /// `DISCONNECT` frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Returns the first value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as UTF-8, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Serializes the frame, adding `content-length` when there is a body
    /// and the header is not already set.
    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());

        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');

        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(b':');
            push_header_part(&mut out, value, escape);
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parses exactly one frame. Leading heart-beat EOLs are skipped;
    /// anything after the frame other than EOLs is an error.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, consumed) = parse_frame(data, 0)?.ok_or_else(|| {
            ProtocolError::InvalidFrame("no frame in buffer".into())
        })?;
        if skip_eols(data, consumed) != data.len() {
            return Err(ProtocolError::InvalidFrame(
                "trailing data after frame".into(),
            ));
        }
        Ok(frame)
    }

    /// Parses every frame in `data`, skipping heart-beat EOLs between them.
    pub fn decode_all(data: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        let mut frames = Vec::new();
        let mut pos = 0;
        while let Some((frame, next)) = parse_frame(data, pos)? {
            frames.push(frame);
            pos = next;
        }
        Ok(frames)
    }
}

fn push_header_part(out: &mut Vec<u8>, raw: &str, escape: bool) {
    if !escape {
        out.extend_from_slice(raw.as_bytes());
        return;
    }
    for b in raw.bytes() {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b':' => out.extend_from_slice(b"\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
                return Err(ProtocolError::InvalidFrame(format!(
                    "undefined escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

fn skip_eols(data: &[u8], mut pos: usize) -> usize {
    loop {
        match data.get(pos..) {
            Some([b'\n', ..]) => pos += 1,
            Some([b'\r', b'\n', ..]) => pos += 2,
            _ => return pos,
        }
    }
}

/// Reads one line starting at `pos`; returns it without its EOL and the
/// position after the EOL.
fn read_line(data: &[u8], pos: usize) -> Result<(&str, usize), ProtocolError> {
    let rest = &data[pos..];
    let len = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| ProtocolError::InvalidFrame("unterminated line".into()))?;
    let line = rest[..len].strip_suffix(b"\r").unwrap_or(&rest[..len]);
    let line = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidFrame("line is not UTF-8".into()))?;
    Ok((line, pos + len + 1))
}

fn parse_frame(data: &[u8], pos: usize) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let pos = skip_eols(data, pos);
    if pos >= data.len() {
        return Ok(None);
    }

    let (command_line, mut pos) = read_line(data, pos)?;
    let command = Command::parse(command_line)?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, next) = read_line(data, pos)?;
        pos = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ProtocolError::InvalidFrame(format!("malformed header {line:?}"))
        })?;
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim().parse::<usize>().map_err(|_| {
                ProtocolError::InvalidFrame(format!("bad content-length {v:?}"))
            })
        })
        .transpose()?;

    let rest = &data[pos..];
    let body_len = match content_length {
        Some(len) => {
            if rest.len() <= len || rest[len] != 0 {
                return Err(ProtocolError::InvalidFrame(
                    "body does not match content-length".into(),
                ));
            }
            len
        }
        None => rest.iter().position(|&b| b == 0).ok_or_else(|| {
            ProtocolError::InvalidFrame("missing NUL terminator".into())
        })?,
    };

    let frame = Frame {
        command,
        headers,
        body: rest[..body_len].to_vec(),
    };
    Ok(Some((frame, pos + body_len + 1)))
}
