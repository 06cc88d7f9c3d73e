//! STOMP 1.2 frame codec.
//!
//! A frame is a command line, `name:value` header lines, a blank line,
//! the body and a terminating NUL octet. The broker sends one or more
//! frames per WebSocket text message and uses bare EOLs as heart-beats;
//! [`parse_frames`] skips those and decodes each real frame on its own,
//! so one bad frame does not take its neighbours down with it.

use crate::heartbeat::HeartBeat;

/// Heart-beat payload sent on an otherwise idle connection.
pub const HEARTBEAT_EOL: &str = "\n";

/// STOMP protocol versions offered in the CONNECT frame.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Frame commands used by this client and the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let command = match s {
            // STOMP 1.2 allows `STOMP` as a synonym for CONNECT.
            "CONNECT" | "STOMP" => Command::Connect,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(command)
    }

    /// Commands a broker may send to a client.
    pub fn is_server_command(self) -> bool {
        matches!(
            self,
            Command::Connected | Command::Message | Command::Receipt | Command::Error
        )
    }

    /// CONNECT and CONNECTED frames carry their header values verbatim.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

/// A single decoded (or to-be-encoded) STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first wins on lookup.
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

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value. Per STOMP 1.2 only the first occurrence counts.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.header_value())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to wire format, including the trailing NUL.
    pub fn encode(&self) -> String {
        let escape_headers = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decode every frame a broker sent in one transport message.
///
/// Heart-beat EOLs before, between and after frames are skipped. Each
/// frame decodes independently: after a bad frame the decoder resumes
/// behind its NUL terminator. Client commands are rejected with
/// [`FrameError::UnexpectedCommand`].
pub fn parse_frames(input: &str) -> Vec<Result<Frame, FrameError>> {
    decode(input, Command::is_server_command)
}

/// Decode every frame a client sent in one transport message, as a
/// broker sees them. Only client commands are accepted.
pub fn parse_client_frames(input: &str) -> Vec<Result<Frame, FrameError>> {
    decode(input, |command| !command.is_server_command())
}

/// True when the transport message carried nothing but heart-beats.
pub fn is_heartbeat(input: &str) -> bool {
    !input.is_empty() && input.chars().all(|c| c == '\n' || c == '\r')
}

fn decode(input: &str, accepts: fn(Command) -> bool) -> Vec<Result<Frame, FrameError>> {
    let mut results = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            return results;
        }
        match parse_one(rest, accepts) {
            Ok((frame, remaining)) => {
                results.push(Ok(frame));
                rest = remaining;
            }
            Err(e) => {
                results.push(Err(e));
                match rest.find('\0') {
                    Some(nul) => rest = &rest[nul + 1..],
                    None => return results,
                }
            }
        }
    }
}

fn parse_one(input: &str, accepts: fn(Command) -> bool) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::Truncated)?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
    if !accepts(command) {
        return Err(FrameError::UnexpectedCommand(command_line.to_string()));
    }

    let mut headers = Vec::new();
    loop {
        let (line, next) = split_line(rest).ok_or(FrameError::Truncated)?;
        rest = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.clone());

    let (body, remaining) = match content_length {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.clone()))?;
            if rest.len() <= len {
                return Err(FrameError::Truncated);
            }
            if !rest.is_char_boundary(len) {
                return Err(FrameError::InvalidContentLength(raw));
            }
            if rest.as_bytes()[len] != 0 {
                return Err(FrameError::MissingTerminator);
            }
            (&rest[..len], &rest[len + 1..])
        }
        None => {
            let nul = rest.find('\0').ok_or(FrameError::Truncated)?;
            (&rest[..nul], &rest[nul + 1..])
        }
    };

    let frame = Frame {
        command,
        headers,
        body: body.to_string(),
    };
    Ok((frame, remaining))
}

/// Split off one line, accepting both LF and CRLF endings.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    let line = line.strip_suffix('\r').unwrap_or(line);
    Some((line, &input[idx + 1..]))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn unescape(raw: &str) -> Result<String, FrameError> {
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
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// Errors produced while decoding broker frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The input ended before the frame was complete.
    #[error("Truncated frame")]
    Truncated,

    #[error("Unknown frame command: {0}")]
    UnknownCommand(String),

    /// A known command sent by the wrong side of the connection.
    #[error("Unexpected frame command: {0}")]
    UnexpectedCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    /// STOMP 1.2 treats undefined escape sequences as fatal.
    #[error("Invalid header escape in: {0}")]
    InvalidEscape(String),

    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("Frame body not followed by NUL")]
    MissingTerminator,
}
