//! Requesting side of a peer pair.

use std::io::{Read, Write};

use serde_json::{json, Value};
use types::{Error, Result};

use crate::frame::{self, FrameReader};

/// Client half of the RPC pair.
///
/// Calls are strictly serialized: one request, one response, with optional
/// binary blocks between them as the command dictates.
pub struct ProtocolClient {
    reader: FrameReader,
    writer: Box<dyn Write + Send>,
    last_command: String,
}

impl ProtocolClient {
    /// Wraps a read/write pair connected to a peer.
    #[must_use]
    pub fn new(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer,
            last_command: String::new(),
        }
    }

    /// Sends a command without waiting for the response.
    pub fn send(&mut self, command: &str, params: Vec<Value>) -> Result<()> {
        self.last_command = command.to_string();
        tracing::trace!(command, "protocol send");

        frame::write_json(
            self.writer.as_mut(),
            &json!({ "cmd": command, "param": params }),
        )
    }

    /// Reads the next response frame, decoding peer errors.
    pub fn response(&mut self) -> Result<Value> {
        let frame = self.reader.read_json()?.ok_or_else(|| {
            Error::protocol(format!(
                "unexpected eof from peer while waiting for '{}'",
                self.last_command
            ))
        })?;

        if let Some(error) = frame::read_error(&frame) {
            return Err(error);
        }

        frame
            .get("out")
            .cloned()
            .ok_or_else(|| Error::protocol(format!("invalid response frame '{frame}'")))
    }

    /// Sends a command and waits for its response.
    pub fn call(&mut self, command: &str, params: Vec<Value>) -> Result<Value> {
        self.send(command, params)?;
        self.response()
    }

    /// Reads one binary block; `None` is the stream terminator.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_chunk().map_err(|error| {
            Error::with_cause(
                error.kind(),
                format!("while streaming '{}'", self.last_command),
                error,
            )
        })
    }

    /// Writes one binary block.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        frame::write_chunk(self.writer.as_mut(), data)
    }

    /// Terminates an outgoing block stream.
    pub fn end_chunks(&mut self) -> Result<()> {
        frame::write_chunk_end(self.writer.as_mut())
    }

    /// Aborts an outgoing block stream; the peer discards partial state.
    pub fn abort_chunks(&mut self) -> Result<()> {
        frame::write_chunk_abort(self.writer.as_mut())
    }
}
