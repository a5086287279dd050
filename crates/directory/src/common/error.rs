//! Directory error definitions.
//!
//! This module defines the failures the directory can report. It provides:
//! 1. **Protocol Violations:** A command observed in a state the protocol does not define for it.
//! 2. **Bookkeeping Failures:** Responses that cannot be matched to any outstanding request.
//! 3. **Configuration Errors:** Invalid parameters and malformed JSON.
//!
//! Resource exhaustion and same-cycle conflicts are not errors; they resolve
//! locally through NACKs and the retry buffer.

use thiserror::Error;

use super::addr::Addr;
use crate::protocol::{Command, EventId, FlushState, State};

/// Errors raised by the directory controller.
///
/// Every variant except the configuration ones indicates a bug in the protocol
/// implementation or a misbehaving peer; the simulation is expected to stop and
/// dump state via `DirectoryController::emergency_shutdown`.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A command arrived for a line in a state that does not accept it.
    #[error("received {cmd} for {addr:#x} in state {state} (event {event})")]
    ProtocolViolation {
        /// Command that was received.
        cmd: Command,
        /// Line state at the time.
        state: State,
        /// Line base address.
        addr: Addr,
        /// Id of the offending event.
        event: EventId,
    },

    /// An owner-only command came from a node that does not own the line.
    #[error("{cmd} for {addr:#x} from {src}, which is not the owner")]
    NotOwner {
        /// Command that was received.
        cmd: Command,
        /// Line base address.
        addr: Addr,
        /// Name of the sender.
        src: String,
    },

    /// A response needed the MSHR head for its address but none was queued.
    #[error("{cmd} for {addr:#x} has no MSHR head to complete")]
    MissingMshrHead {
        /// Command that was received.
        cmd: Command,
        /// Line base address.
        addr: Addr,
    },

    /// A memory response did not correlate with any request this directory sent.
    #[error("{cmd} responds to unknown request {id}")]
    UnmatchedResponse {
        /// Command that was received.
        cmd: Command,
        /// The `response_to` id carried by the event, if any.
        id: EventId,
    },

    /// A NACK arrived without the event it rejects.
    #[error("NACK {0} carries no rejected event")]
    EmptyNack(EventId),

    /// A writeback carried a payload that is not exactly one line.
    #[error("writeback payload is {actual} bytes, expected {expected}")]
    PayloadSize {
        /// Configured line size.
        expected: usize,
        /// Payload length received.
        actual: usize,
    },

    /// A flush-barrier command arrived in a flush state that does not accept it.
    #[error("received {cmd} in flush state {state:?}")]
    FlushViolation {
        /// Command that was received.
        cmd: Command,
        /// Current flush state.
        state: FlushState,
    },

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
