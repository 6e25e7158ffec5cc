//! Event model and wire frame codec.
//!
//! Every event crossing the wire is a self-describing frame:
//!
//! ```text
//! event:<total> <header> <content>\n
//! id:<id>\n
//! timestamp:<seconds, 6 decimals>\n
//! source:<source>\n
//! tags:<tag>,<tag>,...\n      (only when tags are present)
//! <content bytes>
//! ```
//!
//! `total` counts everything after the preamble newline, `header` the header
//! block including its newlines, and `content` the raw payload. Content is
//! never newline-terminated by the codec, so payloads may carry any bytes.

// Rust guideline compliant 2026-02

use thiserror::Error;

/// Literal tag opening every frame preamble.
const PREAMBLE_TAG: &str = "event:";

/// A single log record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    /// Opaque unique identifier.
    pub id: String,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
    /// Free-text origin label, usually a file path.
    pub source: String,
    /// Ordered labels. `None` means the frame carries no `tags` line.
    pub tags: Option<Vec<String>>,
    /// Raw record body.
    pub content: Vec<u8>,
}

impl Event {
    /// Author a new event with a fresh id and the current time.
    pub fn new(source: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id: new_event_id(),
            timestamp: now_timestamp(),
            source: source.into(),
            tags: None,
            content: content.into(),
        }
    }

    /// Attach tags, replacing any present.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Content as text, replacing invalid UTF-8 sequences.
    pub fn content_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Serialize into a wire frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = String::with_capacity(64);
        header.push_str("id:");
        header.push_str(&self.id);
        header.push('\n');
        header.push_str(&format!("timestamp:{:.6}\n", self.timestamp));
        header.push_str("source:");
        header.push_str(&self.source);
        header.push('\n');
        if let Some(tags) = &self.tags {
            header.push_str("tags:");
            header.push_str(&tags.join(","));
            header.push('\n');
        }

        let header_size = header.len();
        let content_size = self.content.len();
        let preamble = format!(
            "{PREAMBLE_TAG}{} {} {}\n",
            header_size + content_size,
            header_size,
            content_size
        );

        let mut frame = Vec::with_capacity(preamble.len() + header_size + content_size);
        frame.extend_from_slice(preamble.as_bytes());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(&self.content);
        frame
    }

    /// Parse a wire frame.
    ///
    /// The buffer must hold exactly one frame: the preamble line followed by
    /// `header + content` bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let preamble = Preamble::parse(data)?;
        let body = &data[preamble.line_len..];

        if body.len() < preamble.header + preamble.content {
            return Err(FrameError::TruncatedFrame {
                expected: preamble.header + preamble.content,
                available: body.len(),
            });
        }
        if body.len() > preamble.total {
            return Err(FrameError::SizeMismatch(format!(
                "{} trailing bytes after declared frame end",
                body.len() - preamble.total
            )));
        }

        let (header, content) = body.split_at(preamble.header);
        let mut event = Self {
            content: content.to_vec(),
            ..Self::default()
        };
        parse_header(header, &mut event)?;
        Ok(event)
    }
}

/// Generate a fresh unique event id.
pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time in seconds since the epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Errors raised while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The preamble line is missing or is not `event:<int> <int> <int>`.
    #[error("malformed preamble: {0}")]
    MalformedPreamble(String),
    /// Declared sizes disagree with each other or with the buffer.
    #[error("frame size mismatch: {0}")]
    SizeMismatch(String),
    /// Fewer bytes follow the preamble than it declares.
    #[error("truncated frame: expected {expected} bytes after preamble, got {available}")]
    TruncatedFrame {
        /// Declared `header + content` size.
        expected: usize,
        /// Bytes actually present after the preamble.
        available: usize,
    },
    /// A header line is not valid `key:value` or a value fails to parse.
    #[error("malformed header: {0}")]
    MalformedHeader(String),
}

/// Parsed `event:total header content` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Preamble {
    /// Length of the preamble line including its newline.
    line_len: usize,
    total: usize,
    header: usize,
    content: usize,
}

impl Preamble {
    fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| FrameError::MalformedPreamble("no preamble line".to_string()))?;
        let line = std::str::from_utf8(&data[..newline])
            .map_err(|e| FrameError::MalformedPreamble(format!("not UTF-8: {e}")))?;
        let sizes = line
            .trim()
            .strip_prefix(PREAMBLE_TAG)
            .ok_or_else(|| FrameError::MalformedPreamble(format!("missing '{PREAMBLE_TAG}' tag")))?;

        let parts = sizes
            .split_whitespace()
            .map(|part| {
                part.parse::<usize>()
                    .map_err(|e| FrameError::MalformedPreamble(format!("invalid size '{part}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let &[total, header, content] = parts.as_slice() else {
            return Err(FrameError::MalformedPreamble(format!(
                "expected 3 sizes, got {}",
                parts.len()
            )));
        };

        if header.checked_add(content) != Some(total) {
            return Err(FrameError::SizeMismatch(format!(
                "total {total} != header {header} + content {content}"
            )));
        }

        Ok(Self {
            line_len: newline + 1,
            total,
            header,
            content,
        })
    }
}

/// Fill `event` from `key:value` header lines. Unknown keys are ignored.
fn parse_header(header: &[u8], event: &mut Event) -> Result<(), FrameError> {
    let header = std::str::from_utf8(header)
        .map_err(|e| FrameError::MalformedHeader(format!("not UTF-8: {e}")))?;

    for line in header.split('\n').filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(format!("line without ':': {line:?}")))?;
        let value = value.trim();
        match key.trim() {
            "id" => event.id = value.to_string(),
            "source" => event.source = value.to_string(),
            "timestamp" => {
                event.timestamp = value.parse().map_err(|e| {
                    FrameError::MalformedHeader(format!("invalid timestamp '{value}': {e}"))
                })?;
            }
            "tags" => {
                event.tags = Some(if value.is_empty() {
                    Vec::new()
                } else {
                    value.split(',').map(str::to_string).collect()
                });
            }
            _ => {}
        }
    }
    Ok(())
}
