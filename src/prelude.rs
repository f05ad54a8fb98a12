//! Central glob-import + shared constants; every module opens with `use crate::prelude::*;`.

pub use crate::error::Result;
pub use crate::http::*;

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};
pub use proxy_log::{erro, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::os::unix::fs::PermissionsExt;
pub use std::path::{Path, PathBuf};
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

pub use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// A connection's idle timer is reset to `now + 3 * TIMESLOT` on every successful read or
/// write and fires after three missed slots.
pub const TIMESLOT: Duration = Duration::from_secs(5);

/// Ceiling on simultaneously live connections.
pub const MAX_CONN: usize = 65536;

// 2xx
pub const HTTP_OK: u16 = 200;
// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;

pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB
