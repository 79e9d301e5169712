//! Crate-level error type.
//!
//! Hardware traits report their own associated error types; handlers map
//! them into [`Error`] at the boundary, log them and carry on. Nothing in the
//! protocol core is fatal: the next periodic action resubmits whatever a
//! failure lost.

use thiserror::Error;

use crate::message::CodecError;

/// Failures reported by the protocol core.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// The radio refused to queue a frame.
    #[error("radio send failed")]
    Send,
    /// The radio refused to register or remove a peer.
    #[error("radio peer table update failed")]
    Peer,
    /// Persistent storage could not be read or written.
    #[error("persistent storage access failed")]
    Storage,
    /// Every scheduler slot is in use.
    #[error("no free scheduler slot")]
    SchedulerFull,
    /// The controller roster has no room for another client.
    #[error("roster is full")]
    RosterFull,
    /// A frame or envelope could not be encoded.
    #[error("frame encoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
