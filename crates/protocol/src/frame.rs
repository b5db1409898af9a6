//! Line-delimited JSON frames and chunked binary blocks.

use std::io::{Read, Write};

use serde_json::{json, Value};
use types::{Error, ErrorKind, Result};

/// Buffered reader over one side of a peer pair.
pub struct FrameReader {
    inner: Box<dyn Read + Send>,
    buffer: Vec<u8>,
    start: usize,
    end: usize,
}

impl FrameReader {
    const BUFFER_SIZE: usize = 8 * 1024;

    /// Wraps a raw reader.
    #[must_use]
    pub fn new(inner: Box<dyn Read + Send>) -> Self {
        Self {
            inner,
            buffer: vec![0; Self::BUFFER_SIZE],
            start: 0,
            end: 0,
        }
    }

    fn fill(&mut self) -> Result<usize> {
        self.start = 0;
        self.end = self
            .inner
            .read(&mut self.buffer)
            .map_err(|error| Error::protocol(format!("unable to read from peer: {error}")))?;

        Ok(self.end)
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();

        loop {
            if self.start == self.end && self.fill()? == 0 {
                if line.is_empty() {
                    return Ok(None);
                }

                return Err(Error::protocol("unexpected eof inside frame"));
            }

            while self.start < self.end {
                let byte = self.buffer[self.start];
                self.start += 1;

                if byte == b'\n' {
                    return Ok(Some(line));
                }

                line.push(byte);
            }
        }
    }

    /// Reads one JSON frame; `None` on clean EOF at a frame boundary.
    pub fn read_json(&mut self) -> Result<Option<Value>> {
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };

        serde_json::from_slice(&line)
            .map(Some)
            .map_err(|error| Error::protocol(format!("invalid frame from peer: {error}")))
    }

    /// Fills `out` with raw block bytes.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < out.len() {
            if self.start == self.end && self.fill()? == 0 {
                return Err(Error::protocol("unexpected eof inside binary block"));
            }

            let take = (self.end - self.start).min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&self.buffer[self.start..self.start + take]);
            self.start += take;
            filled += take;
        }

        Ok(())
    }

    /// Reads one binary block: `Some(data)` for a data block, `None` for the
    /// terminator. A negative size - the abort marker - is an error naming
    /// the peer.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let frame = self
            .read_json()?
            .ok_or_else(|| Error::protocol("unexpected eof while reading chunk header"))?;

        // A peer that fails mid-stream sends an error frame in place of the
        // next chunk header
        if let Some(error) = read_error(&frame) {
            return Err(error);
        }

        let size = frame
            .get("size")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::protocol(format!("invalid chunk header '{frame}'")))?;

        if size < 0 {
            return Err(Error::protocol("stream aborted by peer"));
        }

        if size == 0 {
            return Ok(None);
        }

        let mut data = vec![0; size as usize];
        self.read_exact(&mut data)?;

        // Trailing newline keeps the stream line-parseable
        let mut newline = [0u8; 1];
        self.read_exact(&mut newline)?;

        if newline[0] != b'\n' {
            return Err(Error::protocol("binary block missing trailing newline"));
        }

        Ok(Some(data))
    }
}

/// Writes one JSON frame followed by a newline and flushes.
pub fn write_json(writer: &mut (dyn Write + Send), value: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(value)
        .map_err(|error| Error::protocol(format!("unable to serialize frame: {error}")))?;
    line.push(b'\n');

    writer
        .write_all(&line)
        .and_then(|()| writer.flush())
        .map_err(|error| Error::protocol(format!("unable to write to peer: {error}")))
}

/// Writes one binary block.
pub fn write_chunk(writer: &mut (dyn Write + Send), data: &[u8]) -> Result<()> {
    write_json(writer, &json!({ "size": data.len() }))?;

    writer
        .write_all(data)
        .and_then(|()| writer.write_all(b"\n"))
        .and_then(|()| writer.flush())
        .map_err(|error| Error::protocol(format!("unable to write to peer: {error}")))
}

/// Writes the chunk-stream terminator.
pub fn write_chunk_end(writer: &mut (dyn Write + Send)) -> Result<()> {
    write_json(writer, &json!({ "size": 0 }))
}

/// Writes the chunk-stream abort marker.
pub fn write_chunk_abort(writer: &mut (dyn Write + Send)) -> Result<()> {
    write_json(writer, &json!({ "size": -1 }))
}

/// Encodes an error as a response frame.
#[must_use]
pub fn error_frame(error: &Error) -> Value {
    json!({
        "err": {
            "code": error.kind().code(),
            "message": error.message(),
            "stack": error.stack(),
        }
    })
}

/// Writes an error response frame.
pub fn write_error(writer: &mut (dyn Write + Send), error: &Error) -> Result<()> {
    write_json(writer, &error_frame(error))
}

/// Decodes a response frame into output or a reconstructed peer error.
pub fn read_error(frame: &Value) -> Option<Error> {
    let error = frame.get("err")?;

    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error from peer");
    let stack: Vec<String> = error
        .get("stack")
        .and_then(Value::as_array)
        .map(|frames| {
            frames
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let kind = ErrorKind::from_code(code).unwrap_or(ErrorKind::Protocol);
    Some(Error::new(kind, message).with_stack(stack))
}
