//! Line-based wire protocol.
//!
//! A client sends one command terminated by CR or LF and receives one response,
//! after which the connection is closed. Commands are case-insensitive:
//!
//! - a 32 character hex digest → `OK:<count>` or `BLOCK:<retry_at>`
//! - `STATS` → `key=value` lines
//! - `STOP` → `SHUTTING DOWN`
//!
//! Malformed input gets `ERROR:<message>`.

use std::fmt;

use thiserror::Error;

use crate::tracker::{Digest, Outcome};

/// Longest command accepted, in bytes, excluding the line terminator.
pub const MAX_COMMAND_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Check(Digest),
    Stats,
    Stop,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command too long")]
    TooLong,
    #[error("Invalid input - expected command or 32 character hex string")]
    Invalid,
}

/// Outcome of scanning buffered client bytes for a complete command line.
#[derive(Debug, PartialEq, Eq)]
pub enum Framed<'a> {
    /// A terminator was found, or enough bytes arrived to decide without one.
    Line(&'a [u8]),
    /// More bytes are needed.
    Incomplete,
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\r' || *b == b'\n'
}

/// Drops CR and LF bytes preceding the command.
pub fn skip_blank(buf: &[u8]) -> &[u8] {
    let start = buf.iter().position(|b| !is_terminator(b)).unwrap_or(buf.len());
    &buf[start..]
}

/// Splits off the command line from `buf`.
///
/// Leading blank lines are skipped, then the line ends at the next CR or LF. Without
/// a terminator, once [`MAX_COMMAND_LEN`] bytes are buffered the whole remainder is
/// handed back: a bare digest needs no terminator, and anything longer is rejected
/// by the parser.
pub fn frame(buf: &[u8]) -> Framed<'_> {
    let buf = skip_blank(buf);
    match buf.iter().position(is_terminator) {
        Some(end) => Framed::Line(&buf[..end]),
        None if buf.len() >= MAX_COMMAND_LEN => Framed::Line(buf),
        None => Framed::Incomplete,
    }
}

impl Command {
    pub fn parse(line: &[u8]) -> Result<Self, CommandError> {
        if line.len() > MAX_COMMAND_LEN {
            return Err(CommandError::TooLong);
        }
        if line.eq_ignore_ascii_case(b"stats") {
            return Ok(Command::Stats);
        }
        if line.eq_ignore_ascii_case(b"stop") {
            return Ok(Command::Stop);
        }
        if line.len() != 2 * crate::tracker::DIGEST_LEN {
            return Err(CommandError::Invalid);
        }
        let text = std::str::from_utf8(line).map_err(|_| CommandError::Invalid)?;
        text.parse::<Digest>().map(Command::Check).map_err(|_| CommandError::Invalid)
    }

    /// Canonical lowercase form, as forwarded to peer shards.
    pub fn to_line(&self) -> String {
        match self {
            Command::Check(digest) => format!("{digest}\n"),
            Command::Stats => "stats\n".to_string(),
            Command::Stop => "stop\n".to_string(),
        }
    }
}

/// One `STATS` reply. Values are rounded to whole numbers on output.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub log_size: usize,
    pub free_slots: usize,
    pub uptime_secs: f64,
    pub error_rate: f64,
    pub proxy_rate: f64,
    pub query_rate: f64,
    pub connection_rate: f64,
    pub clients_now: usize,
}

impl StatsReport {
    pub fn lines(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("logSize", self.log_size as f64),
            ("freeSlots", self.free_slots as f64),
            ("uptime", self.uptime_secs),
            ("errorRate", self.error_rate),
            ("proxyRate", self.proxy_rate),
            ("queryRate", self.query_rate),
            ("connectionRate", self.connection_rate),
            ("numClientsNow", self.clients_now as f64),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Outcome(Outcome),
    Stats(StatsReport),
    ShuttingDown,
    Error(String),
    /// A peer shard's reply, passed through unchanged.
    Relayed(String),
}

impl Response {
    pub fn error(message: impl fmt::Display) -> Self {
        Response::Error(message.to_string())
    }

    pub fn is_error(&self) -> bool {
        match self {
            Response::Error(_) => true,
            Response::Relayed(reply) => reply.starts_with("ERROR"),
            _ => false,
        }
    }
}

impl From<CommandError> for Response {
    fn from(err: CommandError) -> Self {
        Response::error(err)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Outcome(Outcome::Allowed { count }) => writeln!(f, "OK:{count}"),
            Response::Outcome(Outcome::Blocked { retry_at }) => writeln!(f, "BLOCK:{retry_at}"),
            Response::Stats(report) => {
                for (key, value) in report.lines() {
                    writeln!(f, "{key}={}", value.round() as i64)?;
                }
                Ok(())
            }
            Response::ShuttingDown => writeln!(f, "SHUTTING DOWN"),
            Response::Error(message) => writeln!(f, "ERROR:{message}"),
            Response::Relayed(reply) => f.write_str(reply),
        }
    }
}
