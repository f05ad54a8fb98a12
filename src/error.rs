//! Top-level `Result` alias for config/process-level failures.
//!
//! Internal component errors (`ParseError`, `RoutingError`, `ConfigError`) stay as their own
//! small enums close to the module that raises them; they convert into `CleanError` only at
//! the boundary that reports to the terminal.

use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

pub struct CleanError(pub Box<dyn Error>);

impl Debug for CleanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for CleanError {}

impl From<std::io::Error> for CleanError {
    fn from(e: std::io::Error) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for CleanError {
    fn from(e: std::net::AddrParseError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<crate::process_config::CliError> for CleanError {
    fn from(e: crate::process_config::CliError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<crate::cred_pool::InitError> for CleanError {
    fn from(_: crate::cred_pool::InitError) -> Self {
        CleanError(Box::new(Generic(
            "credential pool: all sessions failed to initialise".to_string(),
        )))
    }
}

#[derive(Debug)]
pub struct Generic(pub String);

impl fmt::Display for Generic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl Error for Generic {}

impl From<String> for CleanError {
    fn from(s: String) -> Self {
        CleanError(Box::new(Generic(s)))
    }
}

impl From<&str> for CleanError {
    fn from(s: &str) -> Self {
        CleanError(Box::new(Generic(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;
