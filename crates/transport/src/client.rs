//! HTTP/1.1 request execution and response streaming.

use std::cell::RefCell;
use std::rc::Rc;

use types::{Buffer, Error, Result};

use crate::header::HttpHeader;
use crate::query::HttpQuery;
use crate::session::{HttpSession, TransportConfig};

/// One HTTP request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// Request verb, e.g. `GET`.
    pub verb: String,
    /// Encoded request path beginning with `/`.
    pub uri: String,
    /// Query parameters.
    pub query: HttpQuery,
    /// Request headers.
    pub headers: HttpHeader,
    /// Fixed-length request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a bodyless request.
    #[must_use]
    pub fn new(verb: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            uri: uri.into(),
            query: HttpQuery::new(),
            headers: HttpHeader::new(),
            body: None,
        }
    }

    /// Renders `verb uri?query` for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.query.is_empty() {
            format!("{} {}", self.verb, self.uri)
        } else {
            format!("{} {}?{}", self.verb, self.uri, self.query.render())
        }
    }
}

enum Framing {
    Empty,
    Sized { remaining: u64 },
    Chunked { remaining: u64, first: bool, complete: bool },
    UntilClose,
}

type SessionPool = Rc<RefCell<Vec<HttpSession>>>;

/// Streaming response body.
///
/// Reading to the end returns the session to the client's pool when both
/// sides allow keep-alive; dropping a partially-read body closes the
/// connection instead.
pub struct ResponseBody {
    session: Option<HttpSession>,
    framing: Framing,
    keep_alive: bool,
    pool: SessionPool,
}

impl ResponseBody {
    /// Appends up to `out.remains()` body bytes; zero means the body is
    /// complete (or that `out` arrived full).
    pub fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        if out.full() {
            return Ok(0);
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };

        let count = match &mut self.framing {
            Framing::Empty => 0,
            Framing::Sized { remaining } => {
                let want = out.remains().min(usize::try_from(*remaining).unwrap_or(usize::MAX));

                if want == 0 {
                    0
                } else {
                    let mut scratch = vec![0; want];
                    session.read_exact(&mut scratch)?;
                    out.append(&scratch);
                    *remaining -= want as u64;
                    want
                }
            }
            Framing::Chunked {
                remaining,
                first,
                complete,
            } => {
                if *complete {
                    0
                } else {
                    if *remaining == 0 {
                        if !*first {
                            // CRLF that trails the previous chunk's data
                            session.read_line()?;
                        }
                        *first = false;

                        let line = session.read_line()?;
                        let size_text = line.split(';').next().unwrap_or("").trim();
                        *remaining = u64::from_str_radix(size_text, 16).map_err(|_| {
                            Error::protocol(format!("invalid chunk size '{line}'"))
                        })?;

                        if *remaining == 0 {
                            // Trailer section ends with an empty line
                            while !session.read_line()?.is_empty() {}
                            *complete = true;
                        }
                    }

                    if *complete {
                        0
                    } else {
                        let want = out.remains().min(usize::try_from(*remaining).unwrap_or(usize::MAX));
                        let mut scratch = vec![0; want];
                        session.read_exact(&mut scratch)?;
                        out.append(&scratch);
                        *remaining -= want as u64;
                        want
                    }
                }
            }
            Framing::UntilClose => {
                let want = out.remains();
                let mut scratch = vec![0; want];
                let taken = session.read_some(&mut scratch)?;
                out.append(&scratch[..taken]);
                taken
            }
        };

        let finished = match &self.framing {
            Framing::Empty => true,
            Framing::Sized { remaining } => *remaining == 0,
            Framing::Chunked { complete, .. } => *complete,
            Framing::UntilClose => count == 0,
        };

        if finished {
            self.finish();
        }

        Ok(count)
    }

    /// Drains the whole body into a vector.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut collected = Vec::new();
        let mut chunk = Buffer::new(8 * 1024);

        loop {
            chunk.clear_used();

            if self.read(&mut chunk)? == 0 {
                return Ok(collected);
            }

            collected.extend_from_slice(chunk.bytes());
        }
    }

    /// True once the body has been fully consumed.
    #[must_use]
    pub const fn complete(&self) -> bool {
        match &self.framing {
            Framing::Empty => true,
            Framing::Sized { remaining } => *remaining == 0,
            Framing::Chunked { complete, .. } => *complete,
            Framing::UntilClose => self.session.is_none(),
        }
    }

    fn finish(&mut self) {
        // A drained keep-alive session goes back to the pool; anything else
        // drops and closes
        let reusable = self.keep_alive && !matches!(self.framing, Framing::UntilClose);

        if let Some(session) = self.session.take() {
            if reusable {
                self.pool.borrow_mut().push(session);
            }
        }
    }
}

/// One HTTP response: status, headers, and a streaming body.
pub struct HttpResponse {
    code: u16,
    reason: String,
    headers: HttpHeader,
    body: ResponseBody,
}

impl HttpResponse {
    /// Status code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Status reason phrase.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HttpHeader {
        &self.headers
    }

    /// True for any 2xx status.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// The streaming body.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Drains and returns the whole body.
    pub fn read_body(&mut self) -> Result<Vec<u8>> {
        self.body.read_all()
    }

    /// Consumes the response, leaving the caller with the streaming body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Connection-pooling HTTP client bound to one host and port.
pub struct HttpClient {
    config: TransportConfig,
    pool: SessionPool,
}

impl HttpClient {
    /// Creates a client for `config`.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            pool: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The configured host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Executes a request and returns the response with its body unread.
    ///
    /// A socket failure before the status line arrives is retried once on a
    /// fresh session; later failures surface to the caller.
    pub fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            let session = match self.pool.borrow_mut().pop() {
                Some(session) => session,
                None => HttpSession::connect(&self.config)?,
            };

            match self.execute(session, request) {
                Ok(response) => return Ok(response),
                Err(Retryable(error)) if attempt == 0 => {
                    tracing::warn!(request = %request.describe(), %error, "retrying on fresh session");
                    // The pooled session is gone; the retry dials fresh
                    self.pool.borrow_mut().clear();
                    attempt += 1;
                }
                Err(Retryable(error) | Fatal(error)) => return Err(error),
            }
        }
    }

    fn execute(
        &mut self,
        mut session: HttpSession,
        request: &HttpRequest,
    ) -> std::result::Result<HttpResponse, RequestError> {
        let serialized = serialize(request, &self.config.host);

        // Failures up to the status line are retryable; the server cannot
        // have acted on the request yet
        session.write_all(&serialized).map_err(Retryable)?;

        if let Some(body) = &request.body {
            session.write_all(body).map_err(Retryable)?;
        }

        let status = session.read_line().map_err(Retryable)?;
        let mut parts = status.splitn(3, ' ');
        let version = parts.next().unwrap_or("");

        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return Err(Fatal(Error::protocol(format!(
                "invalid http version in response '{status}'"
            ))));
        }

        let code: u16 = parts
            .next()
            .unwrap_or("")
            .parse()
            .map_err(|_| Fatal(Error::protocol(format!("invalid status line '{status}'"))))?;
        let reason = parts.next().unwrap_or("").to_string();

        let mut headers = HttpHeader::new();

        loop {
            let line = session.read_line().map_err(Fatal)?;

            if line.is_empty() {
                break;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(Fatal(Error::protocol(format!("invalid header line '{line}'"))));
            };

            headers.put(key.trim(), value.trim());
        }

        let keep_alive = !headers
            .get("connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
            && version == "HTTP/1.1";

        let framing = if request.verb == "HEAD" || code == 204 || code == 304 {
            Framing::Empty
        } else if headers
            .get("transfer-encoding")
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
        {
            Framing::Chunked {
                remaining: 0,
                first: true,
                complete: false,
            }
        } else if let Some(length) = headers.get("content-length") {
            let remaining: u64 = length
                .parse()
                .map_err(|_| Fatal(Error::protocol(format!("invalid content-length '{length}'"))))?;

            if remaining == 0 {
                Framing::Empty
            } else {
                Framing::Sized { remaining }
            }
        } else {
            Framing::UntilClose
        };

        tracing::debug!(request = %request.describe(), code, "response");

        let mut body = ResponseBody {
            session: Some(session),
            framing,
            keep_alive,
            pool: Rc::clone(&self.pool),
        };

        // Bodyless responses release the session immediately
        if matches!(body.framing, Framing::Empty) {
            body.finish();
        }

        Ok(HttpResponse {
            code,
            reason,
            headers,
            body,
        })
    }
}

enum RequestError {
    Retryable(Error),
    Fatal(Error),
}

use RequestError::{Fatal, Retryable};

fn serialize(request: &HttpRequest, host: &str) -> Vec<u8> {
    let mut text = String::new();

    if request.query.is_empty() {
        text.push_str(&format!("{} {} HTTP/1.1\r\n", request.verb, request.uri));
    } else {
        text.push_str(&format!(
            "{} {}?{} HTTP/1.1\r\n",
            request.verb,
            request.uri,
            request.query.render()
        ));
    }

    let mut headers = request.headers.clone();

    if headers.get("host").is_none() {
        headers.put("host", host);
    }

    if headers.get("content-length").is_none() {
        let length = request.body.as_ref().map_or(0, Vec::len);
        headers.put("content-length", length.to_string());
    }

    for (key, value) in headers.iter() {
        text.push_str(&format!("{key}: {value}\r\n"));
    }

    text.push_str("\r\n");
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Accepts connections and answers each request on a connection with the
    /// next canned response; closes the connection when its list runs out.
    fn replay_server(connections: Vec<Vec<&'static str>>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let handle = thread::spawn(move || {
            for responses in connections {
                let (mut stream, _) = listener.accept().expect("accept");

                for response in responses {
                    // Drain the request head
                    let mut request = Vec::new();
                    let mut byte = [0u8; 1];

                    while !request.ends_with(b"\r\n\r\n") {
                        if stream.read(&mut byte).unwrap_or(0) == 0 {
                            break;
                        }
                        request.push(byte[0]);
                    }

                    if response.is_empty() {
                        // Simulate a server that dropped the connection
                        break;
                    }

                    stream.write_all(response.as_bytes()).expect("write response");
                }
            }
        });

        (port, handle)
    }

    fn client(port: u16) -> HttpClient {
        HttpClient::new(TransportConfig::plain("127.0.0.1", port))
    }

    #[test]
    fn content_length_body() {
        let (port, server) = replay_server(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello",
        ]]);

        let mut client = client(port);
        let mut response = client.request(&HttpRequest::new("GET", "/file")).expect("request");

        assert_eq!(response.code(), 200);
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.read_body().expect("body"), b"hello");

        server.join().expect("server");
    }

    #[test]
    fn chunked_body() {
        let (port, server) = replay_server(vec![vec![
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        ]]);

        let mut client = client(port);
        let mut response = client.request(&HttpRequest::new("GET", "/chunked")).expect("request");

        assert_eq!(response.read_body().expect("body"), b"hello world");
        assert!(response.body_mut().complete());

        server.join().expect("server");
    }

    #[test]
    fn keep_alive_session_is_reused() {
        // Both responses arrive on the same accepted connection
        let (port, server) = replay_server(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\none",
            "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\ntwo",
        ]]);

        let mut client = client(port);

        let mut first = client.request(&HttpRequest::new("GET", "/a")).expect("first");
        assert_eq!(first.read_body().expect("body"), b"one");

        let mut second = client.request(&HttpRequest::new("GET", "/b")).expect("second");
        assert_eq!(second.read_body().expect("body"), b"two");

        server.join().expect("server");
    }

    #[test]
    fn error_before_status_line_is_retried_once() {
        // First connection closes without answering; the retry succeeds
        let (port, server) = replay_server(vec![
            vec![""],
            vec!["HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok"],
        ]);

        let mut client = client(port);
        let mut response = client.request(&HttpRequest::new("PUT", "/retry")).expect("request");

        assert_eq!(response.read_body().expect("body"), b"ok");

        server.join().expect("server");
    }

    #[test]
    fn head_has_no_body() {
        let (port, server) = replay_server(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 1024\r\n\r\n",
        ]]);

        let mut client = client(port);
        let mut response = client.request(&HttpRequest::new("HEAD", "/object")).expect("request");

        assert_eq!(response.headers().get("content-length"), Some("1024"));
        assert_eq!(response.read_body().expect("body"), b"");

        server.join().expect("server");
    }

    #[test]
    fn request_line_includes_sorted_query() {
        let mut request = HttpRequest::new("GET", "/");
        request.query.put("prefix", "p/");
        request.query.put("list-type", "2");

        assert_eq!(request.describe(), "GET /?list-type=2&prefix=p%2F");

        let serialized = serialize(&request, "example.org");
        let text = String::from_utf8(serialized).expect("utf-8");

        assert!(text.starts_with("GET /?list-type=2&prefix=p%2F HTTP/1.1\r\n"));
        assert!(text.contains("host: example.org\r\n"));
        assert!(text.contains("content-length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
