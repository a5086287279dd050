//! Directory line states.
//!
//! The directory keeps one state per tracked line. States fall into four groups:
//! 1. **Stable:** `I`, `S`, `M`. No request is in flight for the line.
//! 2. **Waiting on memory:** `IS`, `IM`, `S_D`, and the entry reloads `I_d`, `S_d`, `M_d`.
//! 3. **Invalidation in flight:** `S_Inv`, `SD_Inv`, `SM_Inv`, `SB_Inv`, `M_Inv`, `M_InvX`.
//! 4. **Flush in flight:** `S_B`, `I_B`.
//!
//! The names follow the usual protocol-table convention: the first letter is
//! the state the line came from, what follows says what it is waiting for.

use std::fmt;

/// Directory state of one cache line.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// No cache holds the line.
    #[default]
    I,
    /// One or more caches hold read-only copies.
    S,
    /// One cache owns the line (exclusive or modified).
    M,
    /// Fetching data from memory for a shared request.
    IS,
    /// Fetching data from memory for an exclusive request, or forwarding a write.
    IM,
    /// Shared, fetching data from memory for another sharer.
    S_D,
    /// Entry for an `I` line is being read back from memory.
    I_d,
    /// Entry for an `S` line is being read back from memory.
    S_d,
    /// Entry for an `M` line is being read back from memory.
    M_d,
    /// Invalidating sharers.
    S_Inv,
    /// Invalidating sharers while a shared data fetch is outstanding.
    SD_Inv,
    /// Invalidating sharers while an exclusive data fetch is outstanding.
    SM_Inv,
    /// Invalidating sharers while a line flush is outstanding.
    SB_Inv,
    /// Invalidating the owner.
    M_Inv,
    /// Downgrading the owner to a sharer.
    M_InvX,
    /// Shared, waiting for memory to complete a flush.
    S_B,
    /// No copies, waiting for memory to complete a flush.
    I_B,
}

impl State {
    /// Returns true for `I`, `S` and `M`.
    #[inline]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::I | Self::S | Self::M)
    }

    /// Returns true while the entry itself is being read back from memory.
    #[inline]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::I_d | Self::S_d | Self::M_d)
    }

    /// Returns true while sharers are being invalidated.
    #[inline]
    pub const fn is_invalidating_sharers(self) -> bool {
        matches!(self, Self::S_Inv | Self::SD_Inv | Self::SM_Inv | Self::SB_Inv)
    }

    /// Returns true while the owner is being invalidated or downgraded.
    #[inline]
    pub const fn is_fetching_owner(self) -> bool {
        matches!(self, Self::M_Inv | Self::M_InvX)
    }

    /// Returns the reload state for a stable state whose entry was spilled.
    pub const fn loading(self) -> Option<Self> {
        match self {
            Self::I => Some(Self::I_d),
            Self::S => Some(Self::S_d),
            Self::M => Some(Self::M_d),
            _ => None,
        }
    }

    /// Returns the stable state restored once a reload completes.
    pub const fn loaded(self) -> Option<Self> {
        match self {
            Self::I_d => Some(Self::I),
            Self::S_d => Some(Self::S),
            Self::M_d => Some(Self::M),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Progress of the whole-cache flush barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushState {
    /// No flush in progress; the next queued flush may start.
    #[default]
    Ready,
    /// `ForwardFlush` sent to every source; collecting `AckFlush`.
    Forward,
}
