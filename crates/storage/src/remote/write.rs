//! Remote write driver: chunk stream to the peer.

use serde_json::json;
use types::{Buffer, Result};
use vault_io::WriteDriver;

use crate::storage::WriteParams;

use super::SharedClient;

pub(crate) struct RemoteWrite {
    client: SharedClient,
    params: WriteParams,
    opened: bool,
    closed: bool,
}

impl RemoteWrite {
    pub(crate) fn new(client: SharedClient, params: WriteParams) -> Self {
        Self {
            client,
            params,
            opened: false,
            closed: false,
        }
    }
}

impl WriteDriver for RemoteWrite {
    fn open(&mut self) -> Result<()> {
        let options = json!({
            "mode_file": self.params.mode_file,
            "mode_path": self.params.mode_path,
            "create_path": self.params.create_path,
            "sync_file": self.params.sync_file,
            "sync_path": self.params.sync_path,
            "atomic": self.params.atomic,
        });

        self.client
            .borrow_mut()
            .call("open-write", vec![json!(self.params.path), options])?;

        self.opened = true;
        Ok(())
    }

    fn write(&mut self, input: &Buffer) -> Result<()> {
        self.client.borrow_mut().write_chunk(input.bytes())
    }

    fn close(&mut self) -> Result<()> {
        let mut client = self.client.borrow_mut();
        client.end_chunks()?;

        // The peer confirms once its own close (rename, sync) finished
        client.response()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for RemoteWrite {
    fn drop(&mut self) {
        // Abandoned mid-stream: tell the peer to discard its partial state
        // and absorb the error frame it answers with
        if self.opened && !self.closed {
            let mut client = self.client.borrow_mut();

            if client.abort_chunks().is_ok() {
                let _ = client.response();
            }
        }
    }
}
