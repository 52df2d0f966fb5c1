//! Runtime log demultiplexing.
//!
//! Worker and router code frame their console output as
//!
//! ```text
//! \u{1e}{"id":"node-1","type":"worker","name":"My Blog"}\u{1f} free text
//! ```
//!
//! Everything else the runtime prints is its own diagnostic output.
//! Parsing never fails: a frame that cannot be decoded is reported as
//! runtime output with placeholder identity.

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const START_MARKER: char = '\u{1e}';
pub const END_MARKER: char = '\u{1f}';

/// Placeholder id and name for unframed or malformed lines.
pub const UNKNOWN: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Worker,
    Router,
    Runtime,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Worker => "worker",
            LogSource::Router => "router",
            LogSource::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// One classified line of runtime output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub source: LogSource,
    pub id: String,
    pub name: String,
    pub stream: Stream,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum FrameKind {
    Worker,
    Router,
}

#[derive(Deserialize)]
struct FrameHeader {
    id: String,
    #[serde(rename = "type")]
    kind: FrameKind,
    name: String,
}

impl LogLine {
    fn runtime(message: String, stream: Stream) -> Self {
        Self {
            source: LogSource::Runtime,
            id: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
            stream,
            message,
        }
    }

    /// Re-emit the line as a tracing event. Stderr lines are warnings.
    pub fn emit(&self) {
        let source = self.source.as_str();
        let stream = self.stream.as_str();
        match self.stream {
            Stream::Stdout => info!(
                target: "workgrid::runtime",
                source,
                id = %self.id,
                name = %self.name,
                stream,
                "{}",
                self.message
            ),
            Stream::Stderr => warn!(
                target: "workgrid::runtime",
                source,
                id = %self.id,
                name = %self.name,
                stream,
                "{}",
                self.message
            ),
        }
    }
}

/// Classify a single line (without its trailing newline).
pub fn parse_frame(line: &str, stream: Stream) -> LogLine {
    let Some(rest) = line.strip_prefix(START_MARKER) else {
        return LogLine::runtime(line.to_string(), stream);
    };

    let header = rest
        .split_once(END_MARKER)
        .and_then(|(header, message)| {
            serde_json::from_str::<FrameHeader>(header)
                .ok()
                .map(|header| (header, message))
        });

    match header {
        Some((header, message)) => LogLine {
            source: match header.kind {
                FrameKind::Worker => LogSource::Worker,
                FrameKind::Router => LogSource::Router,
            },
            id: header.id,
            name: header.name,
            stream,
            message: message.strip_prefix(' ').unwrap_or(message).to_string(),
        },
        None => LogLine::runtime(line.replace([START_MARKER, END_MARKER], ""), stream),
    }
}

/// Longest line kept in memory. Longer output is split into chunks of
/// this size, each reported as runtime output.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Read `reader` line by line until EOF, emitting and broadcasting each
/// classified line. Invalid UTF-8 is replaced rather than dropped.
pub(crate) async fn pump<R>(reader: R, stream: Stream, tx: broadcast::Sender<LogLine>)
where
    R: AsyncRead + Unpin,
{
    pump_lines(reader, stream, tx, MAX_LINE_BYTES).await;
}

async fn pump_lines<R>(reader: R, stream: Stream, tx: broadcast::Sender<LogLine>, max_line: usize)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(max_line as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = if buf.ends_with(b"\n") {
                    parse_frame(text.trim_end_matches(['\n', '\r']), stream)
                } else if buf.len() >= max_line {
                    // the rest of the line arrives with the next read
                    LogLine::runtime(text.into_owned(), stream)
                } else {
                    parse_frame(text.trim_end_matches('\r'), stream)
                };
                line.emit();
                // no subscribers is fine
                let _ = tx.send(line);
            }
            Err(e) => {
                warn!(stream = stream.as_str(), error = %e, "runtime output stream failed");
                break;
            }
        }
    }
}
