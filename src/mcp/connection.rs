//! Message stream for the responders.
//!
//! Incoming requests are decoded as a stream of JSON values: one value may
//! span several lines or reads, and several values may arrive in one read.
//! Outgoing messages follow the MCP stdio rules:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//!
//! stderr is left to logging; nothing here writes to it.

use std::io;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

const READ_CHUNK: usize = 8192;

/// Outcome of one decode attempt over the buffered bytes.
enum Decoded {
    /// A complete value and the number of bytes it used.
    Value(Value, usize),
    /// The buffer ends inside a value.
    Incomplete,
    /// The buffer holds nothing but whitespace.
    Empty,
}

/// Tracks JSON nesting over the buffered bytes so that a value is only
/// parsed once it can be complete.
///
/// Each byte is scanned once, however many reads a value spans.
#[derive(Debug, Default)]
struct Framer {
    /// Bytes of the buffer already scanned.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Framer {
    /// Scans the bytes of `buffer` not seen yet.
    ///
    /// Returns `true` if a top-level value closed or a newline appeared
    /// outside any value.
    fn advance(&mut self, buffer: &[u8]) -> bool {
        let mut ready = false;
        for &byte in &buffer[self.scanned..] {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    ready |= self.depth == 0;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    ready |= self.depth == 0;
                }
                b'\n' => ready |= self.depth == 0,
                _ => {}
            }
        }
        self.scanned = buffer.len();
        ready
    }
}

/// A bidirectional JSON message stream over any async reader/writer pair.
pub struct Connection<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
    framer: Framer,
    eof: bool,
}

impl Connection<tokio::io::Stdin, tokio::io::Stdout> {
    /// Creates a connection over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a connection over `reader` and `writer`.
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
            framer: Framer {
                scanned: 0,
                depth: 0,
                in_string: false,
                escaped: false,
            },
            eof: false,
        }
    }

    /// Consumes the connection, returning the reader and writer.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Decodes the next JSON value from the input stream.
    ///
    /// Returns `None` once the stream ends cleanly between values.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Decode`] for invalid JSON, including a value cut
    /// short by end-of-stream, and [`ServerError::Io`] if reading fails.
    pub async fn next_value(&mut self) -> Result<Option<Value>, ServerError> {
        // Leftovers from the previous read may already hold a value
        let mut ready = !self.buffer.is_empty() || self.eof;
        loop {
            if ready {
                match self.decode_buffered()? {
                    Decoded::Value(value, consumed) => {
                        self.buffer.drain(..consumed);
                        self.framer = Framer::default();
                        return Ok(Some(value));
                    }
                    Decoded::Empty => {
                        self.buffer.clear();
                        self.framer = Framer::default();
                        if self.eof {
                            return Ok(None);
                        }
                    }
                    Decoded::Incomplete => {}
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                self.eof = true;
            } else {
                self.buffer.extend_from_slice(&chunk[..read]);
            }
            ready = self.framer.advance(&self.buffer) || self.eof;
        }
    }

    fn decode_buffered(&self) -> Result<Decoded, ServerError> {
        let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => Ok(Decoded::Value(value, stream.byte_offset())),
            Some(Err(e)) if e.is_eof() && !self.eof => Ok(Decoded::Incomplete),
            Some(Err(e)) => Err(ServerError::Decode(e)),
            None => Ok(Decoded::Empty),
        }
    }

    /// Writes one message followed by a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}
