//! Serving side of a peer pair.

use std::io::{Read, Write};

use serde_json::{json, Value};
use types::{Error, Result};

use crate::frame::{self, FrameReader};

/// Chunk and response access handed to a command handler while its command
/// is in flight.
pub struct PeerIo<'a> {
    reader: &'a mut FrameReader,
    writer: &'a mut (dyn Write + Send),
    responded: bool,
}

impl PeerIo<'_> {
    /// Reads one binary block from the requester; `None` is the terminator.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_chunk()
    }

    /// Writes one binary block to the requester.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        frame::write_chunk(self.writer, data)
    }

    /// Terminates an outgoing block stream.
    pub fn end_chunks(&mut self) -> Result<()> {
        frame::write_chunk_end(self.writer)
    }

    /// Sends the command's success response early, before streaming blocks.
    pub fn respond(&mut self, output: Value) -> Result<()> {
        self.responded = true;
        frame::write_json(self.writer, &json!({ "out": output }))
    }
}

/// Dispatch target for commands arriving at a [`ProtocolServer`].
pub trait CommandHandler {
    /// Executes one command. The returned value becomes the `out` response
    /// unless the handler already responded through [`PeerIo::respond`].
    fn handle(&mut self, command: &str, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value>;
}

/// Server half of the RPC pair: reads commands, dispatches, responds.
pub struct ProtocolServer {
    reader: FrameReader,
    writer: Box<dyn Write + Send>,
}

impl ProtocolServer {
    /// Wraps a read/write pair connected to the requesting peer.
    #[must_use]
    pub fn new(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer,
        }
    }

    /// Serves commands until the peer disconnects or sends `exit`.
    ///
    /// Handler errors are reported to the peer as error frames and the loop
    /// continues; only transport failures end the service.
    pub fn run(&mut self, handler: &mut dyn CommandHandler) -> Result<()> {
        loop {
            let Some(request) = self.reader.read_json()? else {
                tracing::debug!("peer disconnected");
                return Ok(());
            };

            let command = request
                .get("cmd")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::protocol(format!("invalid request frame '{request}'")))?
                .to_string();

            if command == "exit" {
                frame::write_json(self.writer.as_mut(), &json!({ "out": null }))?;
                tracing::debug!("peer requested exit");
                return Ok(());
            }

            let params = request
                .get("param")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            tracing::trace!(command = %command, "protocol dispatch");

            if command == "noop" {
                frame::write_json(self.writer.as_mut(), &json!({ "out": null }))?;
                continue;
            }

            let mut peer = PeerIo {
                reader: &mut self.reader,
                writer: self.writer.as_mut(),
                responded: false,
            };

            let result = handler.handle(&command, &params, &mut peer);
            let responded = peer.responded;
            drop(peer);

            match result {
                Ok(output) => {
                    if !responded {
                        frame::write_json(self.writer.as_mut(), &json!({ "out": output }))?;
                    }
                }
                Err(error) => {
                    tracing::debug!(command = %command, %error, "command failed");
                    frame::write_error(self.writer.as_mut(), &error)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use types::ErrorKind;

    use super::*;
    use crate::client::ProtocolClient;

    struct EchoHandler;

    impl CommandHandler for EchoHandler {
        fn handle(&mut self, command: &str, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value> {
            match command {
                "echo" => Ok(params.first().cloned().unwrap_or(Value::Null)),
                "upload" => {
                    // Collect the chunk stream that follows the request
                    let mut collected = Vec::new();

                    while let Some(chunk) = peer.read_chunk()? {
                        collected.extend_from_slice(&chunk);
                    }

                    Ok(Value::from(collected.len()))
                }
                "download" => {
                    peer.respond(Value::Bool(true))?;
                    peer.write_chunk(b"block one ")?;
                    peer.write_chunk(b"block two")?;
                    peer.end_chunks()?;
                    // Completion frame closes out the stream
                    peer.respond(Value::Null)?;
                    Ok(Value::Null)
                }
                "fail" => Err(Error::new(ErrorKind::FileMissing, "no such file")
                    .with_stack(vec!["handler: fail".into()])),
                _ => Err(Error::protocol(format!("unknown command '{command}'"))),
            }
        }
    }

    fn peer_pair() -> (ProtocolClient, thread::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("addr");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let reader = stream.try_clone().expect("clone");
            let mut server = ProtocolServer::new(Box::new(reader), Box::new(stream));
            server.run(&mut EchoHandler)
        });

        let stream = TcpStream::connect(address).expect("connect");
        let reader = stream.try_clone().expect("clone");
        let client = ProtocolClient::new(Box::new(reader), Box::new(stream));

        (client, server)
    }

    #[test]
    fn call_round_trips_output() {
        let (mut client, server) = peer_pair();

        let output = client.call("echo", vec![json!("hello peer")]).expect("call");
        assert_eq!(output, "hello peer");

        client.call("exit", vec![]).expect("exit");
        server.join().expect("join").expect("server clean exit");
    }

    #[test]
    fn peer_error_reproduces_kind_message_and_stack() {
        let (mut client, server) = peer_pair();

        let error = client.call("fail", vec![]).expect_err("peer error");
        assert_eq!(error.kind(), ErrorKind::FileMissing);
        assert_eq!(error.message(), "no such file");
        assert_eq!(error.stack(), ["handler: fail"]);

        // The server keeps serving after a command error
        let output = client.call("echo", vec![json!(1)]).expect("still serving");
        assert_eq!(output, 1);

        client.call("exit", vec![]).expect("exit");
        server.join().expect("join").expect("server clean exit");
    }

    #[test]
    fn outbound_chunk_stream() {
        let (mut client, server) = peer_pair();

        client.send("upload", vec![]).expect("send");
        client.write_chunk(b"0123456789").expect("chunk");
        client.write_chunk(b"abcdef").expect("chunk");
        client.end_chunks().expect("end");

        assert_eq!(client.response().expect("response"), 16);

        client.call("exit", vec![]).expect("exit");
        server.join().expect("join").expect("server clean exit");
    }

    #[test]
    fn inbound_chunk_stream_after_early_response() {
        let (mut client, server) = peer_pair();

        client.send("download", vec![]).expect("send");
        assert_eq!(client.response().expect("response"), true);

        let mut collected = Vec::new();
        while let Some(chunk) = client.read_chunk().expect("chunk") {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"block one block two");

        // Completion frame follows the stream
        assert_eq!(client.response().expect("completion"), Value::Null);

        client.call("exit", vec![]).expect("exit");
        server.join().expect("join").expect("server clean exit");
    }

    #[test]
    fn noop_answers_without_dispatch() {
        let (mut client, server) = peer_pair();

        assert_eq!(client.call("noop", vec![]).expect("noop"), Value::Null);

        client.call("exit", vec![]).expect("exit");
        server.join().expect("join").expect("server clean exit");
    }
}
