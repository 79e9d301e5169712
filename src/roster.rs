//! Ordered collection of the clients paired with a controller.
//!
//! Entries are appended at the tail and never reordered, so insertion order
//! is fan-out order: the n-th paired client always gets the n-th envelope of
//! a whole-roster frame. There is at most one entry per `(id, mac)` pair.
//! Two clients with colliding ids but different addresses get separate
//! entries; lookups by id alone return the oldest one.

use heapless::Vec;

use crate::error::{Error, Result};
use crate::identity::{DeviceId, MacAddress};

/// One paired client.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct RosterEntry {
    /// Device id of the client.
    pub id: DeviceId,
    /// Radio address of the client.
    pub mac: MacAddress,
    /// Last time any envelope from this client was seen.
    pub last_seen_ms: u64,
    /// Whether the client is registered as a radio peer.
    pub peer_registered: bool,
}

/// Paired clients in insertion order, at most `N`.
#[derive(Clone, Debug, Default)]
pub struct Roster<const N: usize> {
    entries: Vec<RosterEntry, N>,
}

impl<const N: usize> Roster<N> {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in fan-out order.
    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }

    fn position(&self, id: DeviceId, mac: &MacAddress) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.id == id && entry.mac == *mac)
    }

    /// The entry for `(id, mac)`.
    pub fn find(&self, id: DeviceId, mac: &MacAddress) -> Option<&RosterEntry> {
        self.position(id, mac).map(|index| &self.entries[index])
    }

    /// The oldest entry with `id`.
    pub fn find_by_id(&self, id: DeviceId) -> Option<&RosterEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Appends `(id, mac)` unless present.
    ///
    /// Returns `true` if a new entry was created, `false` if it existed.
    pub fn insert(&mut self, id: DeviceId, mac: MacAddress, now_ms: u64) -> Result<bool> {
        if let Some(index) = self.position(id, &mac) {
            self.entries[index].last_seen_ms = now_ms;
            return Ok(false);
        }
        self.entries
            .push(RosterEntry {
                id,
                mac,
                last_seen_ms: now_ms,
                peer_registered: false,
            })
            .map_err(|_| Error::RosterFull)?;
        Ok(true)
    }

    /// Records whether the peer registration of `(id, mac)` succeeded.
    pub fn set_peer_registered(&mut self, id: DeviceId, mac: &MacAddress, registered: bool) {
        if let Some(index) = self.position(id, mac) {
            self.entries[index].peer_registered = registered;
        }
    }

    /// Removes and returns the entry for `(id, mac)`, keeping the order of
    /// the others.
    pub fn remove(&mut self, id: DeviceId, mac: &MacAddress) -> Option<RosterEntry> {
        let index = self.position(id, mac)?;
        Some(self.entries.remove(index))
    }

    /// Refreshes the liveness timestamp of `(id, mac)`. Returns whether the
    /// entry exists.
    pub fn touch(&mut self, id: DeviceId, mac: &MacAddress, now_ms: u64) -> bool {
        match self.position(id, mac) {
            Some(index) => {
                self.entries[index].last_seen_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Removes every entry unseen for at least `timeout_ms`, returning them.
    pub fn expire(&mut self, now_ms: u64, timeout_ms: u32) -> Vec<RosterEntry, N> {
        let mut expired = Vec::new();
        self.entries.retain(|entry| {
            let stale = now_ms.saturating_sub(entry.last_seen_ms) >= timeout_ms as u64;
            if stale {
                // Capacity matches the roster, so this cannot fail
                let _ = expired.push(*entry);
            }
            !stale
        });
        expired
    }
}
