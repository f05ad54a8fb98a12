//! Per-connection state: owns the parse state machine, assembles responses, and drives the
//! gather-write. A file response is streamed in fixed chunks through the same `write_buffer`
//! the header bytes go through, rather than mapped; `ActiveAction::FileDownload` tracks how
//! much of the open file is still queued.

use crate::cred_pool::CredentialPool;
use crate::prelude::*;
use crate::process_config::Trigger;
use crate::router::{self, Route};
use crate::timer_list::TimerKey;

/// What's left to push onto the socket after the header bytes in `write_buffer` drain.
pub enum ActiveAction {
    None,
    /// An open file plus the number of bytes of it not yet queued into `write_buffer`.
    FileDownload(File, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data,
    WouldBlock,
    PeerClose,
    Failed,
    /// The read buffer would exceed `MAX_READ_DATA` without completing a line — fail closed.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Done,
    WouldBlock,
    Failed,
}

/// One slot in the reactor's connection table. Owned by exactly one of {reactor, worker} at a
/// time; `Arc<Mutex<HttpConnection>>` in `server.rs` is how that exclusivity is enforced
/// across threads.
pub struct HttpConnection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub request: HttpRequest,
    pub write_buffer: Vec<u8>,
    pub action: ActiveAction,
    /// Keep-alive decided for the response currently in flight (mirrors `HttpRequest::linger`
    /// at the moment `apply_response` ran, since `request.clear()` wipes it on reset).
    pub linger: bool,
    /// Starts at 1; each completed keep-alive response spends it. A request lingering with
    /// this at 0 closes regardless of its own `Connection` header.
    followups_remaining: u8,
    pub closed: bool,
    pub timer_key: Option<TimerKey>,
}

impl HttpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            request: HttpRequest::new(),
            write_buffer: Vec::new(),
            action: ActiveAction::None,
            linger: false,
            followups_remaining: 1,
            closed: false,
            timer_key: None,
        }
    }

    /// Reads available bytes into `request.buffer` per the configured trigger semantics. LT
    /// issues a single `recv`; a zero-byte read is peer-close. ET drains until `EWOULDBLOCK`,
    /// treating a zero-byte read mid-drain as peer-close too.
    pub fn read_once(&mut self, trigger: Trigger) -> ReadOutcome {
        let mut chunk = [0u8; 4096];
        match trigger {
            Trigger::LevelTriggered => match self.stream.read(&mut chunk) {
                Ok(0) => ReadOutcome::PeerClose,
                Ok(n) => self.buffer_chunk(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
                Err(e) if e.kind() == ErrorKind::Interrupted => self.read_once(trigger),
                Err(_) => ReadOutcome::Failed,
            },
            Trigger::EdgeTriggered => {
                let mut read_any = false;
                loop {
                    match self.stream.read(&mut chunk) {
                        Ok(0) => return ReadOutcome::PeerClose,
                        Ok(n) => {
                            read_any = true;
                            match self.buffer_chunk(&chunk[..n]) {
                                ReadOutcome::Data => continue,
                                other => return other,
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            return if read_any { ReadOutcome::Data } else { ReadOutcome::WouldBlock };
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(_) => return ReadOutcome::Failed,
                    }
                }
            }
        }
    }

    fn buffer_chunk(&mut self, bytes: &[u8]) -> ReadOutcome {
        if self.request.buffer.len() + bytes.len() > MAX_READ_DATA {
            return ReadOutcome::Overflow;
        }
        self.request.buffer.extend_from_slice(bytes);
        ReadOutcome::Data
    }

    /// Drives `HttpRequest::advance`, dispatching and assembling a response the moment a full
    /// request is parsed. Returns `true` once a response is queued in `write_buffer` (either a
    /// dispatch result or a `BAD_REQUEST` from a parse failure); `false` means more bytes are
    /// needed before anything can be decided.
    pub fn try_parse_and_dispatch(&mut self, cred_pool: &CredentialPool, doc_root: &Path) -> bool {
        match self.request.advance() {
            Ok(true) => {
                self.dispatch(cred_pool, doc_root);
                true
            }
            Ok(false) => false,
            Err(e) => {
                trace!("connection {}: parse error: {}", self.peer, e);
                self.apply_response(handle_error(HTTP_BAD_REQUEST));
                true
            }
        }
    }

    fn dispatch(&mut self, cred_pool: &CredentialPool, doc_root: &Path) {
        match router::resolve_route(&self.request) {
            Route::Page(path) => self.serve_file(doc_root, path),
            Route::Raw => {
                let url = self.request.url.clone();
                self.serve_file(doc_root, &url);
            }
            Route::Login | Route::Register if !self.request.is_cgi() => {
                self.apply_response(handle_error(HTTP_BAD_REQUEST));
            }
            Route::Login => self.handle_credential_route(cred_pool, doc_root, true),
            Route::Register => self.handle_credential_route(cred_pool, doc_root, false),
        }
    }

    /// Tags `2` and `3` share the same body shape and failure-to-`BAD_REQUEST` path;
    /// `is_login` picks which credential-pool operation runs.
    fn handle_credential_route(&mut self, cred_pool: &CredentialPool, doc_root: &Path, is_login: bool) {
        let body = match router::parse_login_body(&self.request.body) {
            Some(body) => body,
            None => {
                self.apply_response(handle_error(HTTP_BAD_REQUEST));
                return;
            }
        };
        let session = cred_pool.acquire();
        let page = if is_login {
            if session.login(&body.username, &body.password) {
                "/welcome.html"
            } else {
                "/logError.html"
            }
        } else if session.register_user(&body.username, &body.password) {
            "/log.html"
        } else {
            "/registerError.html"
        };
        drop(session);
        self.serve_file(doc_root, page);
    }

    /// `stat`-then-serve under `doc_root`. `..` is rejected outright rather than relying on
    /// `canonicalize` succeeding, since a missing target would otherwise fall through to the
    /// generic 404 path instead of 403.
    fn serve_file(&mut self, doc_root: &Path, rel_path: &str) {
        if rel_path.contains("..") {
            self.apply_response(handle_error(HTTP_FORBIDDEN));
            return;
        }
        let full = doc_root.join(rel_path.trim_start_matches('/'));
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(_) => {
                self.apply_response(handle_error(HTTP_NOT_FOUND));
                return;
            }
        };
        if meta.is_dir() {
            self.apply_response(handle_error(HTTP_BAD_REQUEST));
            return;
        }
        if meta.permissions().mode() & 0o004 == 0 {
            self.apply_response(handle_error(HTTP_FORBIDDEN));
            return;
        }
        let file = match File::open(&full) {
            Ok(file) => file,
            Err(_) => {
                self.apply_response(handle_error(HTTP_INTERNAL_SERVER_ERROR));
                return;
            }
        };

        let len = meta.len() as usize;
        let ext = full.extension().and_then(|e| e.to_str());
        let mut res = HttpResponse::new(HTTP_OK, HttpResponse::status_text(HTTP_OK));
        res.set_body(Vec::new(), get_mime_type(ext));
        res.headers.insert("content-length".to_string(), len.to_string());
        self.action = ActiveAction::FileDownload(file, len);
        self.apply_response(res);
    }

    /// Sets `Connection:` from the request's keep-alive flag (capped by `followups_remaining`)
    /// and queues the status line + headers (and, for an in-memory body, the body itself) into
    /// `write_buffer`. A streamed `FileDownload` sends headers only here; its bytes are queued
    /// by `write_ready` as the file is read.
    fn apply_response(&mut self, mut res: HttpResponse) {
        self.linger = self.request.linger && self.followups_remaining > 0;
        res.set_header("Connection", if self.linger { "keep-alive" } else { "close" });
        let head = match self.action {
            ActiveAction::FileDownload(..) => res.to_bytes_headers_only(),
            ActiveAction::None => res.to_bytes(),
        };
        self.write_buffer.extend_from_slice(&head);
    }

    /// Drains `write_buffer`, pulling further chunks from an in-flight `FileDownload` as room
    /// frees up, until the socket would block, fails, or everything queued has been sent.
    pub fn write_ready(&mut self) -> WriteOutcome {
        loop {
            if !self.write_buffer.is_empty() {
                match self.stream.write(&self.write_buffer) {
                    Ok(0) => return WriteOutcome::Failed,
                    Ok(n) => {
                        self.write_buffer.drain(..n);
                        continue;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => return WriteOutcome::WouldBlock,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => return WriteOutcome::Failed,
                }
            }

            let remaining = match &self.action {
                ActiveAction::FileDownload(_, remaining) => *remaining,
                ActiveAction::None => 0,
            };
            if remaining == 0 {
                self.action = ActiveAction::None;
                return WriteOutcome::Done;
            }

            let mut chunk = [0u8; 8192];
            let to_read = chunk.len().min(remaining);
            let n = match &mut self.action {
                ActiveAction::FileDownload(file, _) => match file.read(&mut chunk[..to_read]) {
                    Ok(n) => n,
                    Err(_) => return WriteOutcome::Failed,
                },
                ActiveAction::None => unreachable!(),
            };
            if let ActiveAction::FileDownload(_, remaining) = &mut self.action {
                *remaining -= n;
            }
            if n == 0 {
                // File shrank under us since `stat`; nothing left worth sending.
                self.action = ActiveAction::None;
                return WriteOutcome::Done;
            }
            self.write_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Called once `write_ready` reports `Done`. Returns whether the connection should be
    /// re-armed for another request (keep-alive, follow-up budget not yet spent) or closed.
    pub fn finish_response(&mut self) -> bool {
        self.action = ActiveAction::None;
        if self.linger && self.followups_remaining > 0 {
            self.followups_remaining -= 1;
            self.request.finish_request();
            true
        } else {
            false
        }
    }
}
