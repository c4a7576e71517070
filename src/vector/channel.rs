//! Newline-delimited JSON framing over a reader/writer pair.
//!
//! Each worker talks to the orchestrator through one `Duplex`: the
//! orchestrator wraps the child's stdout/stdin, the worker wraps its own
//! stdin/stdout. One message per line, flushed on every send.

use std::io::{BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Whether the peer went away (broken pipe or reset connection).
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            CodecError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            )
        )
    }
}

/// A bidirectional message pipe.
pub struct Duplex<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R: BufRead, W: Write> Duplex<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer, line: String::new() }
    }

    /// Serialize `msg` as one line and flush it.
    pub fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<(), CodecError> {
        let mut buf = serde_json::to_vec(msg)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Next raw line without its terminator, or `None` once the peer closed its end.
    pub fn recv_line(&mut self) -> Result<Option<&str>, CodecError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end_matches(['\r', '\n'])))
    }

    /// Next decoded message, or `None` once the peer closed its end.
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        match self.recv_line()? {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
