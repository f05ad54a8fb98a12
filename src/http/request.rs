//! HTTP/1.1 request parsing: the `RequestLine -> Headers -> Body -> Complete` half of the
//! connection state machine.
//!
//! A growing, cursor-tracked `Vec<u8>` buffer fed incrementally by the reactor/worker, parsed
//! state-by-state so a request split across arbitrary read boundaries parses identically to
//! one delivered whole.

use crate::prelude::*;

/// The method token must be exactly `GET` or `POST`; POST also sets the CGI flag
/// (`HttpRequest::is_cgi`). Any other token is `BAD_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    IncompleteRequestLine,
    MalformedRequestLine,
    InvalidMethod,
    InvalidVersion,
    HeaderTooLong,
    PayloadTooLarge,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompleteRequestLine => write!(f, "incomplete request line"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidMethod => write!(f, "invalid HTTP method"),
            ParseError::InvalidVersion => write!(f, "unsupported HTTP version"),
            ParseError::HeaderTooLong => write!(f, "header line too long"),
            ParseError::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_length: usize,
    pub linger: bool,
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub state: ParsingState,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::GET,
            url: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            content_length: 0,
            linger: false,
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            state: ParsingState::RequestLine,
        }
    }

    /// Resets everything but the buffer/cursor, which `finish_request` drains separately —
    /// this is what a keep-alive connection calls before parsing its next pipelined request.
    pub fn clear(&mut self) {
        self.method = Method::GET;
        self.url.clear();
        self.version.clear();
        self.headers.clear();
        self.body.clear();
        self.content_length = 0;
        self.linger = false;
        self.state = ParsingState::RequestLine;
    }

    pub fn finish_request(&mut self) {
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.clear();
    }

    /// Drives the state machine as far as the buffered bytes allow. Returns `Ok(true)` once
    /// a full request is parsed, `Ok(false)` if more bytes are needed, or a `ParseError`.
    pub fn advance(&mut self) -> std::result::Result<bool, ParseError> {
        loop {
            match self.state {
                ParsingState::RequestLine => match self.parse_request_line()? {
                    true => self.state = ParsingState::Headers,
                    false => return Ok(false),
                },
                ParsingState::Headers => match self.parse_headers()? {
                    true => {
                        self.state = if self.content_length > 0 {
                            ParsingState::Body
                        } else {
                            ParsingState::Complete
                        };
                    }
                    false => return Ok(false),
                },
                ParsingState::Body => match self.parse_body()? {
                    true => self.state = ParsingState::Complete,
                    false => return Ok(false),
                },
                ParsingState::Complete => return Ok(true),
            }
        }
    }

    fn parse_request_line(&mut self) -> std::result::Result<bool, ParseError> {
        let line_end = match find_crlf(&self.buffer, self.cursor) {
            Some(end) => end,
            None => {
                if self.buffer.len() - self.cursor > MAX_READ_DATA {
                    return Err(ParseError::HeaderTooLong);
                }
                return Ok(false);
            }
        };

        let line = std::str::from_utf8(&self.buffer[self.cursor..line_end])
            .map_err(|_| ParseError::MalformedRequestLine)?;
        let mut parts = line.split(' ').filter(|s| !s.is_empty());
        let method = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        let raw_url = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        if parts.next().is_some() {
            return Err(ParseError::MalformedRequestLine);
        }
        if version != "HTTP/1.1" {
            return Err(ParseError::InvalidVersion);
        }

        self.method = method.parse()?;
        self.url = canonicalise_url(raw_url);
        self.version = version.to_string();
        self.cursor = line_end + 2;
        Ok(true)
    }

    fn parse_headers(&mut self) -> std::result::Result<bool, ParseError> {
        loop {
            let line_end = match find_crlf(&self.buffer, self.cursor) {
                Some(end) => end,
                None => {
                    if self.buffer.len() - self.cursor > MAX_READ_DATA {
                        return Err(ParseError::HeaderTooLong);
                    }
                    return Ok(false);
                }
            };

            if line_end == self.cursor {
                // Blank line: end of headers.
                self.cursor = line_end + 2;
                return Ok(true);
            }

            let line = std::str::from_utf8(&self.buffer[self.cursor..line_end])
                .map_err(|_| ParseError::MalformedRequestLine)?;
            if let Some(colon) = line.find(':') {
                let name = line[..colon].trim().to_ascii_lowercase();
                let value = line[colon + 1..].trim().to_string();
                match name.as_str() {
                    "connection" => self.linger = value.eq_ignore_ascii_case("keep-alive"),
                    "content-length" => {
                        self.content_length = value.parse().map_err(|_| ParseError::MalformedRequestLine)?;
                        if self.content_length > MAX_READ_DATA {
                            return Err(ParseError::PayloadTooLarge);
                        }
                    }
                    _ => trace!("ignoring header `{}`", name),
                }
                self.headers.insert(name, value);
            }
            self.cursor = line_end + 2;
        }
    }

    fn parse_body(&mut self) -> std::result::Result<bool, ParseError> {
        if self.buffer.len() - self.cursor < self.content_length {
            return Ok(false);
        }
        self.body = self.buffer[self.cursor..self.cursor + self.content_length].to_vec();
        self.cursor += self.content_length;
        Ok(true)
    }

    /// Single-character routing tag: the segment after the last `/` in the URL.
    /// A URL with no extra segment (just `/`) has no tag.
    pub fn routing_tag(&self) -> Option<char> {
        let last_segment = self.url.rsplit('/').next().unwrap_or("");
        last_segment.chars().next()
    }

    pub fn is_cgi(&self) -> bool {
        self.method == Method::POST
    }
}

/// An absolute URL (`http://host/path`) is canonicalised by skipping scheme+authority to the
/// first `/`; a bare `/` becomes `/judge.html`, the tag-0-equivalent default page.
fn canonicalise_url(raw: &str) -> String {
    let path = if let Some(rest) = raw.strip_prefix("http://").or_else(|| raw.strip_prefix("https://")) {
        match rest.find('/') {
            Some(i) => &rest[i..],
            None => "/",
        }
    } else {
        raw
    };
    if path == "/" {
        "/judge.html".to_string()
    } else {
        path.to_string()
    }
}

fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    let window = &buffer[start_offset..];
    window.windows(2).position(|w| w == b"\r\n").map(|i| start_offset + i)
}

impl Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.url, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(req: &mut HttpRequest, bytes: &[u8]) {
        req.buffer.extend_from_slice(bytes);
    }

    #[test]
    fn parses_simple_get() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /judge.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n");
        assert_eq!(req.advance(), Ok(true));
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "/judge.html");
        assert!(req.linger);
    }

    #[test]
    fn bare_slash_rewrites_to_judge_html() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(req.advance(), Ok(true));
        assert_eq!(req.url, "/judge.html");
    }

    #[test]
    fn split_across_arbitrary_boundaries_parses_the_same() {
        let whole = b"POST /2CGISQL.cgi HTTP/1.1\r\nContent-Length: 20\r\n\r\nuser=a&password=sekr";
        let mut one_shot = HttpRequest::new();
        feed(&mut one_shot, whole);
        assert_eq!(one_shot.advance(), Ok(true));

        let mut split = HttpRequest::new();
        for chunk in whole.chunks(7) {
            feed(&mut split, chunk);
            let _ = split.advance();
        }
        assert_eq!(split.state, ParsingState::Complete);
        assert_eq!(split.url, one_shot.url);
        assert_eq!(split.body, one_shot.body);
    }

    #[test]
    fn incomplete_request_line_needs_more_bytes() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /judge.html HTTP/1.1");
        assert_eq!(req.advance(), Ok(false));
    }

    #[test]
    fn oversized_request_line_without_crlf_fails_closed() {
        let mut req = HttpRequest::new();
        let mut junk = vec![b'a'; MAX_READ_DATA + 10];
        junk.splice(0..0, b"GET /".iter().copied());
        feed(&mut req, &junk);
        assert_eq!(req.advance(), Err(ParseError::HeaderTooLong));
    }

    #[test]
    fn routing_tag_is_last_url_segment() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /3CGISQL.cgi HTTP/1.1\r\n\r\n");
        req.advance().unwrap();
        assert_eq!(req.routing_tag(), Some('3'));
    }
}
