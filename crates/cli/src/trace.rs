//! JSON request traces.
//!
//! A trace names the caches above the directory and lists the requests they
//! issue, each stamped with the cycle it becomes visible to the directory:
//!
//! ```json
//! {
//!   "caches": ["c0", "c1"],
//!   "events": [
//!     { "cycle": 1, "cache": "c0", "cmd": "GetS", "addr": 4096 },
//!     { "cycle": 4, "cache": "c1", "cmd": "GetX", "addr": 4096 },
//!     { "cycle": 9, "cache": "c1", "cmd": "PutM", "addr": 4096, "data": 171 }
//!   ]
//! }
//! ```

use std::{fs, io};

use serde::Deserialize;
use thiserror::Error;

use dirsim_core::common::{Addr, line_base};
use dirsim_core::protocol::{Command, MemEvent, MemFlags};

/// Failure to load a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Trace path.
        path: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The file is not a valid trace document.
    #[error("malformed trace: {0}")]
    Json(#[from] serde_json::Error),
    /// A record uses a command caches never issue.
    #[error("cycle {cycle}: {cmd:?} is not a cache-issued command")]
    BadCommand {
        /// Cycle of the offending record.
        cycle: u64,
        /// The command.
        cmd: Command,
    },
}

/// One request in a trace.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceRecord {
    /// Cycle at which the request is offered to the directory.
    pub cycle: u64,
    /// Issuing cache.
    pub cache: String,
    /// Request, replacement or flush command.
    pub cmd: Command,
    /// Byte address.
    pub addr: Addr,
    /// Access size in bytes; a full line when absent.
    #[serde(default)]
    pub size: Option<u32>,
    /// Fill byte for writes and writebacks.
    #[serde(default)]
    pub data: Option<u8>,
    /// Bypass the coherence machinery.
    #[serde(default)]
    pub noncacheable: bool,
}

impl TraceRecord {
    /// Builds the event this record stands for.
    ///
    /// `held` is the cache's current copy of the line, used as the writeback
    /// payload when the record carries no data of its own.
    pub fn to_event(&self, dir: &str, line_size: u64, held: Option<&[u8]>) -> MemEvent {
        let size = self.size.unwrap_or(line_size as u32);
        let mut event = MemEvent::new(self.cache.as_str(), self.addr, line_base(self.addr, line_size), self.cmd)
            .with_dst(dir)
            .with_size(size);
        if self.noncacheable {
            event = event.with_flags(MemFlags::NONCACHEABLE);
        }
        let carries_data = matches!(
            self.cmd,
            Command::PutM | Command::PutX | Command::Write | Command::FlushLine | Command::FlushLineInv
        );
        if carries_data {
            match (self.data, held) {
                (Some(byte), _) => {
                    event = event.with_payload(vec![byte; size as usize]).with_dirty(true);
                }
                (None, Some(line)) if self.cmd != Command::Write => {
                    event = event
                        .with_payload(line.to_vec())
                        .with_dirty(matches!(self.cmd, Command::PutM | Command::PutX));
                }
                _ => {}
            }
        }
        event
    }
}

/// A parsed trace.
#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    /// Caches above the directory. Derived from the records when omitted.
    #[serde(default)]
    pub caches: Vec<String>,
    /// Requests in issue order.
    pub events: Vec<TraceRecord>,
}

impl Trace {
    /// Reads and checks a trace file.
    ///
    /// # Errors
    ///
    /// Returns `TraceError` if the file is unreadable, malformed, or issues a
    /// command that only the directory or memory may send.
    pub fn load(path: &str) -> Result<Self, TraceError> {
        let text = fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses and checks a trace document.
    ///
    /// # Errors
    ///
    /// See [`Trace::load`].
    pub fn parse(text: &str) -> Result<Self, TraceError> {
        let mut trace: Self = serde_json::from_str(text)?;
        if let Some(bad) = trace.events.iter().find(|r| !issued_by_caches(r.cmd)) {
            return Err(TraceError::BadCommand {
                cycle: bad.cycle,
                cmd: bad.cmd,
            });
        }
        if trace.caches.is_empty() {
            trace.caches = trace.events.iter().map(|r| r.cache.clone()).collect();
            trace.caches.sort();
            trace.caches.dedup();
        }
        trace.events.sort_by_key(|r| r.cycle);
        Ok(trace)
    }
}

const fn issued_by_caches(cmd: Command) -> bool {
    matches!(
        cmd,
        Command::GetS
            | Command::GetX
            | Command::GetSX
            | Command::Write
            | Command::PutS
            | Command::PutE
            | Command::PutM
            | Command::PutX
            | Command::FlushLine
            | Command::FlushLineInv
            | Command::FlushAll
    )
}
