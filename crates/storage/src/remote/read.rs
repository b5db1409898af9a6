//! Remote read driver: chunk stream from the peer.

use serde_json::json;
use types::{Buffer, Result};
use vault_io::ReadDriver;

use crate::storage::ReadParams;

use super::SharedClient;

pub(crate) struct RemoteRead {
    client: SharedClient,
    params: ReadParams,
    pending: Vec<u8>,
    pos: usize,
    streaming: bool,
    eof: bool,
}

impl RemoteRead {
    pub(crate) fn new(client: SharedClient, params: ReadParams) -> Self {
        Self {
            client,
            params,
            pending: Vec::new(),
            pos: 0,
            streaming: false,
            eof: false,
        }
    }

    /// Reads the stream terminator's completion frame.
    fn finish(&mut self) -> Result<()> {
        self.client.borrow_mut().response()?;
        self.streaming = false;
        self.eof = true;
        Ok(())
    }
}

impl ReadDriver for RemoteRead {
    fn open(&mut self) -> Result<bool> {
        let found = self.client.borrow_mut().call(
            "open-read",
            vec![json!(self.params.path), json!(self.params.ignore_missing)],
        )?;

        let found = found.as_bool().unwrap_or(false);

        if found {
            self.streaming = true;
        } else {
            self.eof = true;
        }

        Ok(found)
    }

    fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        if self.pos == self.pending.len() && !self.eof {
            let chunk = self.client.borrow_mut().read_chunk()?;

            match chunk {
                Some(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                None => self.finish()?,
            }
        }

        let taken = out.append_limited(&self.pending[self.pos..]);
        self.pos += taken;
        Ok(taken)
    }

    fn close(&mut self) -> Result<()> {
        // Closing early leaves chunks in flight; drain them so the pair
        // stays in sync for the next command
        while self.streaming {
            let chunk = self.client.borrow_mut().read_chunk()?;

            if chunk.is_none() {
                self.finish()?;
            }
        }

        Ok(())
    }
}
