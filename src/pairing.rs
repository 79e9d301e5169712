//! Client pairing state machine.
//!
//! A client is in one of three states:
//!
//! ```text
//!            hold >= 3 s                 PAIRING_ACCEPTED
//! Unpaired ─────────────▶ PairingMode ──────────────────────▶ Paired
//!    ▲                        │  ▲                              │
//!    │ PAIRING_REMOVE/timeout │  │         hold >= 3 s          │
//!    └────────────────────────┘  └──────────────────────────────┤
//!    ▲                                                          │
//!    └─────────────────────── PAIRING_REMOVE ───────────────────┘
//! ```
//!
//! The controller address is known iff the state is `Paired`. Every
//! transition into or out of `Paired` is persisted, so the next boot resumes
//! where the last session left off. Timers tied to the states (pairing
//! broadcast, pairing timeout, ping) are owned by [`Client`](crate::client::Client);
//! this module only reports whether a transition happened.

use crate::consts::{KEY_CONTROLLER_MAC, KEY_PAIRED};
use crate::error::{Error, Result};
use crate::hal::{self, Radio, Storage};
use crate::identity::{DeviceId, MacAddress};
use crate::message::MessageType;

/// Pairing state of a client.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PairingState {
    /// No controller known.
    Unpaired,
    /// Broadcasting pairing requests, waiting for a controller.
    PairingMode,
    /// Bound to a controller.
    Paired,
}

/// Pairing state plus the controller it refers to.
#[derive(Clone, Debug)]
pub struct PairingSession {
    state: PairingState,
    controller: Option<MacAddress>,
}

impl PairingSession {
    /// A session with no controller.
    pub fn unpaired() -> Self {
        Self {
            state: PairingState::Unpaired,
            controller: None,
        }
    }

    /// Restores the session from storage.
    ///
    /// Any read failure, a missing record or a malformed address yields an
    /// unpaired session. Boot never fails because of storage.
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        let paired = match storage.get_bool(KEY_PAIRED) {
            Ok(paired) => paired.unwrap_or(false),
            Err(_) => {
                warn!("reading pairing flag failed, starting unpaired");
                return Self::unpaired();
            }
        };
        if !paired {
            return Self::unpaired();
        }

        let mut buf = [0u8; 6];
        match storage.get_blob(KEY_CONTROLLER_MAC, &mut buf) {
            Ok(Some(6)) => {
                let controller = MacAddress(buf);
                info!("restored pairing with {}", controller);
                Self {
                    state: PairingState::Paired,
                    controller: Some(controller),
                }
            }
            Ok(_) => {
                warn!("pairing flag set without a valid controller address");
                Self::unpaired()
            }
            Err(_) => {
                warn!("reading controller address failed, starting unpaired");
                Self::unpaired()
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Whether the client is bound to a controller.
    pub fn is_paired(&self) -> bool {
        self.state == PairingState::Paired
    }

    /// Whether the client is looking for a controller.
    pub fn in_pairing_mode(&self) -> bool {
        self.state == PairingState::PairingMode
    }

    /// Controller address, set iff paired.
    pub fn controller(&self) -> Option<MacAddress> {
        self.controller
    }

    /// Registers the restored controller as a radio peer.
    pub fn register_controller<R: Radio>(&self, radio: &mut R) -> Result<()> {
        match self.controller {
            Some(controller) => hal::ensure_peer(radio, &controller),
            None => Ok(()),
        }
    }

    /// Enters pairing mode after a long hold.
    ///
    /// When paired, the old controller is told with a `PAIRING_REMOVE` and
    /// its peer registration dropped first. Returns `false` if the session
    /// already was in pairing mode.
    pub fn enter_pairing_mode<R: Radio, S: Storage>(
        &mut self,
        own_id: DeviceId,
        radio: &mut R,
        storage: &mut S,
    ) -> bool {
        match self.state {
            PairingState::PairingMode => return false,
            PairingState::Paired => {
                if let Some(controller) = self.controller {
                    info!("leaving controller {}", controller);
                    let _ = hal::send_envelope(
                        radio,
                        &controller,
                        own_id,
                        MessageType::PairingRemove,
                        &[],
                    );
                    let _ = hal::drop_peer(radio, &controller);
                }
            }
            PairingState::Unpaired => {}
        }

        self.state = PairingState::PairingMode;
        self.controller = None;
        let _ = persist(storage, None);
        info!("pairing mode");
        true
    }

    /// Handles `PAIRING_ACCEPTED` from `sender`.
    ///
    /// Only honoured in pairing mode. Returns whether the client is now
    /// paired with `sender` as a result of this call.
    pub fn on_accepted<R: Radio, S: Storage>(
        &mut self,
        sender: MacAddress,
        radio: &mut R,
        storage: &mut S,
    ) -> bool {
        if self.state != PairingState::PairingMode {
            debug!("ignoring PAIRING_ACCEPTED from {} in {:?}", sender, self.state);
            return false;
        }

        self.state = PairingState::Paired;
        self.controller = Some(sender);
        let _ = hal::ensure_peer(radio, &sender);
        let _ = persist(storage, Some(sender));
        info!("paired with {}", sender);
        true
    }

    /// Handles `PAIRING_REMOVE` from `sender`.
    ///
    /// While paired only the bound controller may unpair the client; in
    /// pairing mode the request is taken from anyone. Returns whether the
    /// client left a pairing state as a result of this call.
    pub fn on_remove<R: Radio, S: Storage>(
        &mut self,
        sender: MacAddress,
        radio: &mut R,
        storage: &mut S,
    ) -> bool {
        match self.state {
            PairingState::Unpaired => return false,
            PairingState::Paired if self.controller != Some(sender) => {
                debug!("ignoring PAIRING_REMOVE from foreign {}", sender);
                return false;
            }
            PairingState::Paired | PairingState::PairingMode => {}
        }

        if let Some(controller) = self.controller.take() {
            let _ = hal::drop_peer(radio, &controller);
        }
        self.state = PairingState::Unpaired;
        let _ = persist(storage, None);
        info!("unpaired by {}", sender);
        true
    }

    /// Gives up pairing mode when the pairing timeout fires.
    ///
    /// Returns whether the session left pairing mode. Any other state is
    /// left alone.
    pub fn on_timeout<S: Storage>(&mut self, storage: &mut S) -> bool {
        if self.state != PairingState::PairingMode {
            return false;
        }
        self.state = PairingState::Unpaired;
        self.controller = None;
        let _ = persist(storage, None);
        info!("pairing mode timed out");
        true
    }
}

impl Default for PairingSession {
    fn default() -> Self {
        Self::unpaired()
    }
}

/// Writes the pairing record. The address goes first so an interrupted
/// write never leaves `paired` set next to a stale address.
fn persist<S: Storage>(storage: &mut S, controller: Option<MacAddress>) -> Result<()> {
    let result = match controller {
        Some(mac) => storage
            .set_blob(KEY_CONTROLLER_MAC, mac.octets())
            .and_then(|()| storage.set_bool(KEY_PAIRED, true)),
        None => storage.set_bool(KEY_PAIRED, false),
    };
    result.map_err(|_| {
        warn!("persisting pairing state failed, memory is ahead of storage");
        Error::Storage
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStorage, MockRadio};

    const CONTROLLER: MacAddress = MacAddress([0x24, 0x6f, 0x28, 0x01, 0x02, 0x03]);
    const OTHER: MacAddress = MacAddress([0x24, 0x6f, 0x28, 0x09, 0x09, 0x09]);

    #[test]
    fn test_load_defaults_to_unpaired() {
        let mut storage = MemoryStorage::default();
        assert_eq!(PairingSession::load(&mut storage).state(), PairingState::Unpaired);

        storage.fail = true;
        assert_eq!(PairingSession::load(&mut storage).state(), PairingState::Unpaired);
    }

    #[test]
    fn test_load_rejects_flag_without_address() {
        let mut storage = MemoryStorage::default();
        storage.set_bool(KEY_PAIRED, true).unwrap();
        let session = PairingSession::load(&mut storage);
        assert_eq!(session.state(), PairingState::Unpaired);
        assert_eq!(session.controller(), None);

        storage.set_blob(KEY_CONTROLLER_MAC, &[1, 2, 3]).unwrap();
        assert_eq!(PairingSession::load(&mut storage).state(), PairingState::Unpaired);
    }

    #[test]
    fn test_accept_persists_and_restores() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();

        assert!(session.enter_pairing_mode(7, &mut radio, &mut storage));
        assert!(session.on_accepted(CONTROLLER, &mut radio, &mut storage));
        assert!(radio.peer_exists(&CONTROLLER));

        let restored = PairingSession::load(&mut storage);
        assert_eq!(restored.state(), PairingState::Paired);
        assert_eq!(restored.controller(), Some(CONTROLLER));
    }

    #[test]
    fn test_repeated_accept_is_idempotent() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();
        let _ = session.enter_pairing_mode(7, &mut radio, &mut storage);
        let _ = session.on_accepted(CONTROLLER, &mut radio, &mut storage);
        let (writes, adds) = (storage.writes, radio.peer_adds);

        assert!(!session.on_accepted(CONTROLLER, &mut radio, &mut storage));
        assert!(!session.on_accepted(OTHER, &mut radio, &mut storage));
        assert_eq!(storage.writes, writes);
        assert_eq!(radio.peer_adds, adds);
        assert_eq!(session.controller(), Some(CONTROLLER));
    }

    #[test]
    fn test_accept_outside_pairing_mode_ignored() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();

        assert!(!session.on_accepted(CONTROLLER, &mut radio, &mut storage));
        assert_eq!(session.state(), PairingState::Unpaired);
        assert_eq!(storage.writes, 0);
    }

    #[test]
    fn test_remove_only_from_bound_controller() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();
        let _ = session.enter_pairing_mode(7, &mut radio, &mut storage);
        let _ = session.on_accepted(CONTROLLER, &mut radio, &mut storage);

        assert!(!session.on_remove(OTHER, &mut radio, &mut storage));
        assert!(session.is_paired());

        assert!(session.on_remove(CONTROLLER, &mut radio, &mut storage));
        assert_eq!(session.state(), PairingState::Unpaired);
        assert!(!radio.peer_exists(&CONTROLLER));
        assert_eq!(PairingSession::load(&mut storage).state(), PairingState::Unpaired);

        let writes = storage.writes;
        assert!(!session.on_remove(CONTROLLER, &mut radio, &mut storage));
        assert_eq!(storage.writes, writes);
    }

    #[test]
    fn test_timeout_leaves_pairing_mode_only() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();
        assert!(!session.on_timeout(&mut storage));
        assert_eq!(storage.writes, 0);

        let _ = session.enter_pairing_mode(7, &mut radio, &mut storage);
        assert!(session.on_timeout(&mut storage));
        assert_eq!(session.state(), PairingState::Unpaired);
        assert_eq!(session.controller(), None);
        assert_eq!(storage.get_bool(KEY_PAIRED), Ok(Some(false)));

        let _ = session.enter_pairing_mode(7, &mut radio, &mut storage);
        let _ = session.on_accepted(CONTROLLER, &mut radio, &mut storage);
        assert!(!session.on_timeout(&mut storage));
        assert!(session.is_paired());
    }

    #[test]
    fn test_repairing_releases_old_controller() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        let mut session = PairingSession::unpaired();
        let _ = session.enter_pairing_mode(7, &mut radio, &mut storage);
        let _ = session.on_accepted(CONTROLLER, &mut radio, &mut storage);

        assert!(session.enter_pairing_mode(7, &mut radio, &mut storage));
        assert!(!session.enter_pairing_mode(7, &mut radio, &mut storage));
        assert_eq!(session.controller(), None);
        assert!(!radio.peer_exists(&CONTROLLER));

        let removes: Vec<_> = radio
            .envelopes()
            .into_iter()
            .filter(|(_, e)| e.message_type() == Some(MessageType::PairingRemove))
            .collect();
        assert_eq!(removes.len(), 1);
        assert_eq!(removes[0].0, CONTROLLER);
        assert_eq!(removes[0].1.recipient, 7);
    }

    #[test]
    fn test_storage_failure_keeps_memory_state() {
        let mut radio = MockRadio::default();
        let mut storage = MemoryStorage::default();
        storage.fail = true;
        let mut session = PairingSession::unpaired();

        assert!(session.enter_pairing_mode(7, &mut radio, &mut storage));
        assert!(session.on_accepted(CONTROLLER, &mut radio, &mut storage));
        assert!(session.is_paired());
    }
}
