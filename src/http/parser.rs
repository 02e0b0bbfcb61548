use crate::http::request::Method;

/// Main state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
    /// Terminal: a request completed and `reset` has not run yet.
    Done,
}

/// Result of scanning the buffer for the next line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A full line was extracted and terminated in place.
    Complete,
    /// No terminator yet; more bytes are needed.
    Open,
    /// The terminator sequence is malformed.
    Bad,
}

/// Outcome of driving the parser over the bytes buffered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The buffered bytes do not yet hold a full request.
    NeedMore,
    /// A complete request was parsed; fields are available.
    Complete,
    /// Protocol violation; answer 400.
    Bad,
}

/// Incremental HTTP/1.1 request parser.
///
/// The parser operates on the connection's read buffer and keeps its scan
/// position across calls, so a request delivered one byte at a time reaches
/// the same terminal state as one delivered whole. Line terminators are
/// overwritten in place with NUL sentinels; parsed fields are byte ranges
/// into the buffer rather than copies.
#[derive(Debug)]
pub struct Parser {
    state: ParseState,
    /// Index of the next unscanned byte.
    checked: usize,
    /// Index where the line currently being scanned starts.
    line_start: usize,
    method: Option<Method>,
    url: Option<(usize, usize)>,
    version: Option<(usize, usize)>,
    host: Option<(usize, usize)>,
    content_length: usize,
    keep_alive: bool,
    /// Total bytes of the completed request, set once `Complete` is
    /// returned; bytes past this index belong to a pipelined successor.
    consumed: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            checked: 0,
            line_start: 0,
            method: None,
            url: None,
            version: None,
            host: None,
            content_length: 0,
            keep_alive: false,
            consumed: 0,
        }
    }

    /// Returns the parser to its initial state for the next request.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Drives the state machine over `buf[..filled]`.
    ///
    /// May be called repeatedly as more bytes arrive; `filled` must never
    /// shrink between calls for the same request. Once a request has
    /// completed, further calls report `Complete` again without scanning,
    /// so bytes past `consumed` are never eaten before `reset` runs.
    pub fn advance(&mut self, buf: &mut [u8], filled: usize) -> ParseStatus {
        loop {
            if self.state == ParseState::Done {
                return ParseStatus::Complete;
            }
            if self.state == ParseState::Body {
                // No line structure in the body: just wait until the
                // declared length has been buffered.
                if filled >= self.checked + self.content_length {
                    self.consumed = self.checked + self.content_length;
                    self.state = ParseState::Done;
                    return ParseStatus::Complete;
                }
                return ParseStatus::NeedMore;
            }

            match self.next_line(buf, filled) {
                LineStatus::Open => return ParseStatus::NeedMore,
                LineStatus::Bad => return ParseStatus::Bad,
                LineStatus::Complete => {}
            }

            // The two sentinel bytes sit just before `checked`.
            let line = (self.line_start, self.checked - 2);
            self.line_start = self.checked;

            match self.state {
                ParseState::RequestLine => {
                    if !self.parse_request_line(buf, line) {
                        return ParseStatus::Bad;
                    }
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    if line.0 == line.1 {
                        // Blank line ends the header block.
                        if self.content_length != 0 {
                            self.state = ParseState::Body;
                        } else {
                            self.consumed = self.checked;
                            self.state = ParseState::Done;
                            return ParseStatus::Complete;
                        }
                    } else {
                        self.parse_header_line(buf, line);
                    }
                }
                ParseState::Body | ParseState::Done => {
                    unreachable!("terminal states handled above")
                }
            }
        }
    }

    /// Scans forward for a line terminator, accepting `\r\n` and a bare
    /// `\n` preceded by `\r`. On success the terminator bytes are replaced
    /// with NULs so the line is independently terminated without copying.
    fn next_line(&mut self, buf: &mut [u8], filled: usize) -> LineStatus {
        while self.checked < filled {
            match buf[self.checked] {
                b'\r' => {
                    if self.checked + 1 == filled {
                        // The pair may still be on the wire.
                        return LineStatus::Open;
                    }
                    if buf[self.checked + 1] == b'\n' {
                        buf[self.checked] = b'\0';
                        buf[self.checked + 1] = b'\0';
                        self.checked += 2;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Bad;
                }
                b'\n' => {
                    if self.checked >= 1 && buf[self.checked - 1] == b'\r' {
                        buf[self.checked - 1] = b'\0';
                        buf[self.checked] = b'\0';
                        self.checked += 1;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Bad;
                }
                _ => self.checked += 1,
            }
        }
        LineStatus::Open
    }

    /// `GET /index.html HTTP/1.1` — method, URL, version.
    fn parse_request_line(&mut self, buf: &[u8], (start, end): (usize, usize)) -> bool {
        let line = &buf[start..end];

        let Some(sp1) = line.iter().position(|&b| b == b' ') else {
            return false;
        };
        let Some(method) = Method::from_token(&line[..sp1]) else {
            return false;
        };
        self.method = Some(method);

        let rest_start = start + sp1 + 1;
        let rest = &buf[rest_start..end];
        let Some(sp2) = rest.iter().position(|&b| b == b' ') else {
            return false;
        };
        let mut url_start = rest_start;
        let url_end = rest_start + sp2;

        let ver_start = url_end + 1;
        if !buf[ver_start..end].eq_ignore_ascii_case(b"HTTP/1.1") {
            return false;
        }
        self.version = Some((ver_start, end));

        // Absolute-form target: strip scheme and authority, keep the path.
        let url = &buf[url_start..url_end];
        if url.len() >= 7 && url[..7].eq_ignore_ascii_case(b"http://") {
            let after_scheme = url_start + 7;
            match buf[after_scheme..url_end].iter().position(|&b| b == b'/') {
                Some(slash) => url_start = after_scheme + slash,
                None => return false,
            }
        }
        if url_start >= url_end || buf[url_start] != b'/' {
            return false;
        }
        self.url = Some((url_start, url_end));
        true
    }

    /// Recognizes Connection, Content-Length and Host; every other header
    /// is ignored without error.
    fn parse_header_line(&mut self, buf: &[u8], (start, end): (usize, usize)) {
        let line = &buf[start..end];

        if let Some(value) = header_value(line, b"Connection:") {
            if starts_with_ignore_case(value, b"keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some(value) = header_value(line, b"Content-Length:") {
            self.content_length = parse_decimal(value);
        } else if let Some(value) = header_value(line, b"Host:") {
            let offset = line.len() - value.len();
            self.host = Some((start + offset, start + offset + value.trim_ascii_end().len()));
        }
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn url<'b>(&self, buf: &'b [u8]) -> Option<&'b str> {
        self.url
            .and_then(|(s, e)| std::str::from_utf8(&buf[s..e]).ok())
    }

    pub fn version<'b>(&self, buf: &'b [u8]) -> Option<&'b str> {
        self.version
            .and_then(|(s, e)| std::str::from_utf8(&buf[s..e]).ok())
    }

    pub fn host<'b>(&self, buf: &'b [u8]) -> Option<&'b str> {
        self.host
            .and_then(|(s, e)| std::str::from_utf8(&buf[s..e]).ok())
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Bytes consumed by the completed request, valid after `Complete`.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Returns the value portion of `line` if it carries the given header
/// prefix, with leading whitespace skipped.
fn header_value<'a>(line: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    if starts_with_ignore_case(line, name) {
        Some(line[name.len()..].trim_ascii_start())
    } else {
        None
    }
}

/// Leading-digits decimal parse; anything malformed reads as zero.
fn parse_decimal(value: &[u8]) -> usize {
    let digits: &[u8] = match value.iter().position(|b| !b.is_ascii_digit()) {
        Some(end) => &value[..end],
        None => value,
    };
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
