use std::fmt;
use std::io::{self, Write};

/// Capacity of the per-connection write buffer holding the status line and
/// headers (and, for error responses, the canned body).
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): file request served
/// - `BadRequest` (400): malformed request or directory target
/// - `Forbidden` (403): file without world-read permission
/// - `NotFound` (404): no such file under the document root
/// - `InternalServerError` (500): response composition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use hearth::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Error",
        }
    }

    /// Canned explanatory body sent with error responses.
    pub fn error_body(&self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => {
                Some("Your request has bad syntax or is inherently impossible to satisfy.\n")
            }
            StatusCode::Forbidden => {
                Some("You do not have permission to get file from this server.\n")
            }
            StatusCode::NotFound => Some("The requested file was not found on this server.\n"),
            StatusCode::InternalServerError => {
                Some("There was an unusual problem serving the requested file.\n")
            }
        }
    }
}

/// Fixed-capacity buffer the response head is composed into.
///
/// Every append is bounds-checked against the remaining capacity; an append
/// that does not fit reports failure and leaves the recorded length where
/// it was, so the caller can fall back to an error response or drop the
/// connection.
pub struct ResponseBuf {
    buf: [u8; WRITE_BUFFER_SIZE],
    len: usize,
}

impl Default for ResponseBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuf {
    pub fn new() -> Self {
        Self {
            buf: [0; WRITE_BUFFER_SIZE],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends formatted text, failing if it would overflow the buffer.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> bool {
        let mut cursor = io::Cursor::new(&mut self.buf[self.len..]);
        if cursor.write_fmt(args).is_err() {
            return false;
        }
        let written = cursor.position() as usize;
        self.len += written;
        true
    }

    /// `HTTP/1.1 <code> <reason>\r\n`
    pub fn add_status_line(&mut self, status: StatusCode) -> bool {
        self.append(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    /// Content-Length, Content-Type, Connection and the blank line ending
    /// the header block.
    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> bool {
        self.append(format_args!("Content-Length: {content_length}\r\n"))
            && self.append(format_args!("Content-Type: {}\r\n", "text/html"))
            && self.append(format_args!(
                "Connection: {}\r\n",
                if keep_alive { "keep-alive" } else { "close" }
            ))
            && self.append(format_args!("\r\n"))
    }

    /// Literal body content for error responses.
    pub fn add_content(&mut self, content: &str) -> bool {
        self.append(format_args!("{content}"))
    }
}
