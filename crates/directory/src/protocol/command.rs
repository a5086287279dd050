//! Protocol command set.
//!
//! Commands fall into five families: requests from caches, voluntary
//! replacements, flushes, shootdowns issued by memory-side agents, and
//! responses. [`Command::class`] reports the family and [`Command::response`]
//! the command that answers a request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every command the directory can send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Read request for a shared copy.
    GetS,
    /// Read request for an exclusive copy.
    GetX,
    /// Locked read for an exclusive copy.
    GetSX,
    /// Write-through of data from an agent that does not cache the line.
    Write,

    /// Eviction of a shared copy.
    PutS,
    /// Eviction of a clean exclusive copy.
    PutE,
    /// Eviction of a dirty copy with data.
    PutM,
    /// Downgrade from exclusive to shared, returning data.
    PutX,

    /// Write the line back to memory and keep a shared copy.
    FlushLine,
    /// Write the line back to memory and drop every copy.
    FlushLineInv,
    /// Flush every cache above this directory.
    FlushAll,
    /// Instruction to a source to flush its contents.
    ForwardFlush,
    /// Release of sources held by a completed flush barrier.
    UnblockFlush,

    /// Invalidate and return data.
    FetchInv,
    /// Downgrade to shared and return data.
    FetchInvX,
    /// Invalidate, discarding any dirty data.
    ForceInv,
    /// Invalidate a shared copy.
    Inv,

    /// Data response granting a shared copy.
    GetSResp,
    /// Data response granting an exclusive copy.
    GetXResp,
    /// Acknowledgement of a `Write`.
    WriteResp,
    /// Completion of a `FlushLine` or `FlushLineInv`.
    FlushLineResp,
    /// Completion of a `FlushAll`.
    FlushAllResp,
    /// Response to `FetchInv`, with data.
    FetchResp,
    /// Response to `FetchInvX`, with data.
    FetchXResp,
    /// Acknowledgement of an invalidation.
    AckInv,
    /// Acknowledgement of a replacement.
    AckPut,
    /// Acknowledgement of a `ForwardFlush`.
    AckFlush,
    /// Negative acknowledgement; the carried event must be resent.
    Nack,
}

/// Command family, used for routing and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// `GetS`, `GetX`, `GetSX`, `Write`.
    Request,
    /// `PutS`, `PutE`, `PutM`, `PutX`.
    Replacement,
    /// Line and whole-cache flushes and the barrier messages.
    Flush,
    /// Invalidations and fetches.
    Shootdown,
    /// Everything that answers another command.
    Response,
}

impl Command {
    /// Returns the family this command belongs to.
    pub const fn class(self) -> CommandClass {
        match self {
            Self::GetS | Self::GetX | Self::GetSX | Self::Write => CommandClass::Request,
            Self::PutS | Self::PutE | Self::PutM | Self::PutX => CommandClass::Replacement,
            Self::FlushLine
            | Self::FlushLineInv
            | Self::FlushAll
            | Self::ForwardFlush
            | Self::UnblockFlush => CommandClass::Flush,
            Self::FetchInv | Self::FetchInvX | Self::ForceInv | Self::Inv => {
                CommandClass::Shootdown
            }
            Self::GetSResp
            | Self::GetXResp
            | Self::WriteResp
            | Self::FlushLineResp
            | Self::FlushAllResp
            | Self::FetchResp
            | Self::FetchXResp
            | Self::AckInv
            | Self::AckPut
            | Self::AckFlush
            | Self::Nack => CommandClass::Response,
        }
    }

    /// Returns the command that answers this one, if it expects an answer.
    ///
    /// `UnblockFlush` and every response return `None`.
    pub const fn response(self) -> Option<Self> {
        match self {
            Self::GetS => Some(Self::GetSResp),
            Self::GetX | Self::GetSX => Some(Self::GetXResp),
            Self::Write => Some(Self::WriteResp),
            Self::PutS | Self::PutE | Self::PutM | Self::PutX => Some(Self::AckPut),
            Self::FlushLine | Self::FlushLineInv => Some(Self::FlushLineResp),
            Self::FlushAll => Some(Self::FlushAllResp),
            Self::ForwardFlush => Some(Self::AckFlush),
            Self::FetchInv => Some(Self::FetchResp),
            Self::FetchInvX => Some(Self::FetchXResp),
            Self::ForceInv | Self::Inv => Some(Self::AckInv),
            _ => None,
        }
    }

    /// Returns true for commands that invalidate or downgrade copies.
    #[inline]
    pub const fn is_shootdown(self) -> bool {
        matches!(self.class(), CommandClass::Shootdown)
    }

    /// Returns true for responses (including NACK).
    #[inline]
    pub const fn is_response(self) -> bool {
        matches!(self.class(), CommandClass::Response)
    }

    /// Returns true for read or write requests that need the line.
    #[inline]
    pub const fn is_request(self) -> bool {
        matches!(self.class(), CommandClass::Request)
    }

    /// Returns true when the requester asks for exclusive access.
    #[inline]
    pub const fn wants_exclusive(self) -> bool {
        matches!(self, Self::GetX | Self::GetSX)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
