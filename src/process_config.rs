//! CLI flag parsing into an immutable process-level config record: single-letter flags,
//! decimal-integer values, scanned straight off `std::env::args()`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    LevelTriggered,
    EdgeTriggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerMode {
    pub listen: Trigger,
    pub conn: Trigger,
}

impl TriggerMode {
    fn from_combo(n: u8) -> Self {
        use Trigger::*;
        match n {
            0 => TriggerMode { listen: LevelTriggered, conn: LevelTriggered },
            1 => TriggerMode { listen: LevelTriggered, conn: EdgeTriggered },
            2 => TriggerMode { listen: EdgeTriggered, conn: LevelTriggered },
            _ => TriggerMode { listen: EdgeTriggered, conn: EdgeTriggered },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Completion,
    Readiness,
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub port: u16,
    pub log_mode: LogMode,
    pub logging_enabled: bool,
    pub trigger_mode: TriggerMode,
    pub linger: bool,
    pub session_pool_size: usize,
    pub worker_count: usize,
    pub dispatch_mode: DispatchMode,
    /// Seed file for the in-process user table.
    pub users_file: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            port: 9006,
            log_mode: LogMode::Sync,
            logging_enabled: true,
            trigger_mode: TriggerMode::from_combo(0),
            linger: false,
            session_pool_size: 8,
            worker_count: 8,
            dispatch_mode: DispatchMode::Completion,
            users_file: "users.txt".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for CliError {}

impl ProcessConfig {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, CliError> {
        let mut cfg = ProcessConfig::default();
        let mut it = args.into_iter();
        // Skip argv[0].
        it.next();

        while let Some(flag) = it.next() {
            let value = it
                .next()
                .ok_or_else(|| CliError(format!("flag `{}` requires a value", flag)))?;

            if flag == "-u" {
                cfg.users_file = value;
                continue;
            }

            let n: i64 = value
                .parse()
                .map_err(|_| CliError(format!("`{}` expects a decimal integer, got `{}`", flag, value)))?;

            match flag.as_str() {
                "-p" => cfg.port = n as u16,
                "-l" => cfg.log_mode = if n == 0 { LogMode::Sync } else { LogMode::Async },
                "-m" => cfg.trigger_mode = TriggerMode::from_combo(n as u8),
                "-o" => cfg.linger = n != 0,
                "-s" => cfg.session_pool_size = n as usize,
                "-t" => cfg.worker_count = n as usize,
                "-c" => cfg.logging_enabled = n == 0,
                "-a" => {
                    cfg.dispatch_mode = if n == 0 {
                        DispatchMode::Completion
                    } else {
                        DispatchMode::Readiness
                    }
                }
                other => return Err(CliError(format!("unrecognized flag `{}`", other))),
            }
        }

        if cfg.session_pool_size == 0 {
            return Err(CliError("-s must be at least 1".into()));
        }
        if cfg.worker_count == 0 {
            return Err(CliError("-t must be at least 1".into()));
        }
        Ok(cfg)
    }
}
