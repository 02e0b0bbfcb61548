use std::fs::File;
use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::http::parser::{ParseStatus, Parser};
use crate::http::response::{ResponseBuf, StatusCode};
use crate::server::Shared;
use crate::timers::TimerId;

/// Capacity of the per-connection read buffer. A request that cannot fit
/// is a failure, not a condition to grow past.
pub const READ_BUFFER_SIZE: usize = 2048;

/// What resolving a completed request against the document root produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The target exists, is a readable regular file, and is mapped.
    File,
    /// Malformed request, or the target is a directory.
    BadRequest,
    /// The target has no world-read permission.
    Forbidden,
    /// No such path under the document root.
    NotFound,
    /// Composition or mapping failure.
    Internal,
}

/// What the write step left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The connection stays registered; nothing more to do right now.
    Open,
    /// A keep-alive reset found pipelined bytes already buffered. The
    /// socket is deliberately left unarmed; the caller must queue a parse
    /// pass, which re-arms once it is done with the connection.
    NextRequest,
    /// The response is flushed and the peer did not ask for keep-alive.
    Finished,
}

/// One client connection: socket, buffers, parser position, response
/// segments and timer linkage.
///
/// Socket I/O (`on_readable`, `on_writable`) runs on the reactor thread;
/// `process` runs on a worker and performs no socket syscalls. One-shot
/// readiness registration guarantees those never overlap for the same
/// connection; the mutex around each connection materializes that
/// discipline rather than adding contention.
pub struct Connection {
    id: u64,
    stream: Option<TcpStream>,
    peer: SocketAddr,
    read_buf: [u8; READ_BUFFER_SIZE],
    read_bytes: usize,
    parser: Parser,
    write_buf: ResponseBuf,
    /// Read-only mapping of the resolved file, held until the response is
    /// flushed or the connection dies.
    file: Option<Mmap>,
    file_len: usize,
    /// Sent-byte offsets into the two response segments. Progress is
    /// position tracking only; the buffers are never reshuffled.
    head_sent: usize,
    file_sent: usize,
    /// Set when the parser hit a protocol violation; the keep-alive reset
    /// then discards the whole read buffer instead of replaying it.
    bad_request: bool,
    /// Handle into the shared timer list, if one is registered.
    pub timer: Option<TimerId>,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            stream: Some(stream),
            peer,
            read_buf: [0; READ_BUFFER_SIZE],
            read_bytes: 0,
            parser: Parser::new(),
            write_buf: ResponseBuf::new(),
            file: None,
            file_len: 0,
            head_sent: 0,
            file_sent: 0,
            bad_request: false,
            timer: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Adds the socket to the poller, armed for the first read.
    pub fn register(&self, shared: &Shared) -> io::Result<()> {
        match &self.stream {
            Some(stream) => shared.poller.register_conn(stream, self.id),
            None => Ok(()),
        }
    }

    /// Drains everything currently readable into the buffer.
    ///
    /// Would-block means the socket is drained and is success; EOF, a hard
    /// error, or a buffer that was already full are failures the caller
    /// answers by closing.
    pub fn on_readable(&mut self) -> io::Result<()> {
        if self.read_bytes >= READ_BUFFER_SIZE {
            return Err(io::Error::other("read buffer full"));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        loop {
            if self.read_bytes == READ_BUFFER_SIZE {
                // Parse what we have; if the request still cannot complete
                // the next readable pass fails above.
                return Ok(());
            }
            match stream.read(&mut self.read_buf[self.read_bytes..]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.read_bytes += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Worker entry point: parse, resolve, compose, and arm the socket for
    /// writing. CPU only; the reactor performs the actual sends.
    pub fn process(&mut self, shared: &Shared) {
        let outcome = match self.parser.advance(&mut self.read_buf, self.read_bytes) {
            ParseStatus::NeedMore => {
                if let Err(error) = self.rearm_read(shared) {
                    warn!(conn = self.id, %error, "failed to re-arm for reading");
                    shared.discard(self);
                }
                return;
            }
            ParseStatus::Bad => {
                // Nothing buffered past a protocol violation is trustworthy.
                self.bad_request = true;
                RequestOutcome::BadRequest
            }
            ParseStatus::Complete => self.resolve(shared),
        };

        if !self.compose(outcome) {
            // The head did not fit; retry with the plain 500 response.
            self.write_buf.clear();
            self.file = None;
            self.file_len = 0;
            if !self.compose(RequestOutcome::Internal) {
                shared.discard(self);
                return;
            }
        }

        if let Err(error) = self.rearm_write(shared) {
            warn!(conn = self.id, %error, "failed to re-arm for writing");
            shared.discard(self);
        }
    }

    /// Maps the parsed URL onto the document root.
    fn resolve(&mut self, shared: &Shared) -> RequestOutcome {
        let Some(url) = self.parser.url(&self.read_buf) else {
            return RequestOutcome::BadRequest;
        };
        debug!(
            conn = self.id,
            url,
            host = self.parser.host(&self.read_buf),
            "resolving request"
        );

        // Verbatim concatenation; the URL is not sanitized against path
        // traversal (known gap, see DESIGN.md).
        let path = PathBuf::from(format!("{}{}", shared.doc_root.display(), url));

        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(_) => return RequestOutcome::NotFound,
        };
        if meta.permissions().mode() & 0o004 == 0 {
            return RequestOutcome::Forbidden;
        }
        if meta.is_dir() {
            return RequestOutcome::BadRequest;
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => return RequestOutcome::Internal,
        };
        self.file_len = meta.len() as usize;
        if self.file_len > 0 {
            // SAFETY: the mapping is read-only and private; it is dropped
            // before the connection is reused or torn down. Concurrent
            // truncation of the underlying file would be an external fault
            // shared with every mmap consumer.
            match unsafe { Mmap::map(&file) } {
                Ok(map) => self.file = Some(map),
                Err(_) => return RequestOutcome::Internal,
            }
        }
        RequestOutcome::File
    }

    /// Fills the write buffer with the response head (and canned body for
    /// errors). Returns false if the buffer overflows.
    fn compose(&mut self, outcome: RequestOutcome) -> bool {
        let keep_alive = self.parser.keep_alive();
        match outcome {
            RequestOutcome::File => {
                self.write_buf.add_status_line(StatusCode::Ok)
                    && self.write_buf.add_headers(self.file_len, keep_alive)
            }
            RequestOutcome::BadRequest
            | RequestOutcome::Forbidden
            | RequestOutcome::NotFound
            | RequestOutcome::Internal => {
                let status = match outcome {
                    RequestOutcome::BadRequest => StatusCode::BadRequest,
                    RequestOutcome::Forbidden => StatusCode::Forbidden,
                    RequestOutcome::NotFound => StatusCode::NotFound,
                    _ => StatusCode::InternalServerError,
                };
                let body = status.error_body().unwrap_or("");
                self.write_buf.add_status_line(status)
                    && self.write_buf.add_headers(body.len(), keep_alive)
                    && self.write_buf.add_content(body)
            }
        }
    }

    /// Scatter-gather write step, driven by writable readiness.
    ///
    /// Partial sends advance the segment offsets; would-block re-arms and
    /// stays open; completion releases the mapping and either resets for
    /// keep-alive or reports that the connection is done.
    pub fn on_writable(&mut self, shared: &Shared) -> io::Result<WriteOutcome> {
        if self.write_buf.is_empty() && self.file.is_none() {
            // Spurious wakeup with nothing composed: wait for a request.
            self.reset_for_next();
            self.rearm_read(shared)?;
            return Ok(WriteOutcome::Open);
        }

        loop {
            let head = &self.write_buf.as_bytes()[self.head_sent..];
            let body: &[u8] = match &self.file {
                Some(map) => &map[self.file_sent..self.file_len],
                None => &[],
            };
            if head.is_empty() && body.is_empty() {
                break;
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(io::ErrorKind::NotConnected.into());
            };
            let segments = [IoSlice::new(head), IoSlice::new(body)];
            match stream.write_vectored(&segments) {
                Ok(0) => {
                    self.file = None;
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(mut sent) => {
                    let head_left = self.write_buf.len() - self.head_sent;
                    let advanced = sent.min(head_left);
                    self.head_sent += advanced;
                    sent -= advanced;
                    self.file_sent += sent;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Socket buffer is full; wait for the next edge.
                    self.rearm_write(shared)?;
                    return Ok(WriteOutcome::Open);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Err(e);
                }
            }
        }

        // Fully flushed.
        self.file = None;
        if self.parser.keep_alive() {
            if self.reset_for_next() {
                // Pipelined bytes stay buffered and the socket stays
                // unarmed: the worker pass the reactor queues next owns the
                // connection until it re-arms, so no readable edge can
                // enqueue a second job underneath it.
                Ok(WriteOutcome::NextRequest)
            } else {
                self.rearm_read(shared)?;
                Ok(WriteOutcome::Open)
            }
        } else {
            Ok(WriteOutcome::Finished)
        }
    }

    /// Returns the connection to its initial parse state for the next
    /// request on the same socket. Bytes past the completed request are
    /// shifted to the front and kept; returns whether any were. After a
    /// protocol violation the whole buffer is discarded instead.
    fn reset_for_next(&mut self) -> bool {
        let consumed = if self.bad_request {
            self.read_bytes
        } else {
            self.parser.consumed().min(self.read_bytes)
        };
        self.bad_request = false;
        let leftover = self.read_bytes - consumed;
        self.read_buf.copy_within(consumed..self.read_bytes, 0);
        self.read_bytes = leftover;
        self.parser.reset();
        self.write_buf.clear();
        self.head_sent = 0;
        self.file_sent = 0;
        self.file = None;
        self.file_len = 0;
        leftover > 0
    }

    /// Deregisters and closes the socket and releases the mapping.
    /// Idempotent; the timer handle is the caller's to clean up.
    pub fn close(&mut self, shared: &Shared) {
        if let Some(stream) = self.stream.take() {
            if let Err(error) = shared.poller.deregister(&stream) {
                debug!(conn = self.id, %error, "deregister on close failed");
            }
            // Dropping the stream closes the descriptor.
        }
        self.file = None;
    }

    fn rearm_read(&self, shared: &Shared) -> io::Result<()> {
        match &self.stream {
            Some(stream) => shared.poller.rearm_read(stream, self.id),
            None => Ok(()),
        }
    }

    fn rearm_write(&self, shared: &Shared) -> io::Result<()> {
        match &self.stream {
            Some(stream) => shared.poller.rearm_write(stream, self.id),
            None => Ok(()),
        }
    }
}
