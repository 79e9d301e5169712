//! Hardware boundaries consumed by the protocol core.
//!
//! The core never touches a peripheral directly. A platform crate implements
//! these traits on top of its radio stack, LED driver, key-value store and
//! sleep controller. Button inputs use [`embedded_hal::digital::InputPin`]
//! directly.
//!
//! All calls are made with the device context lock held, from either the
//! tick path or the receive path.

use core::fmt::Debug;

use crate::color::Color;
use crate::error::{self, Error};
use crate::identity::{DeviceId, MacAddress};
use crate::message::{self, MessageType};

/// Broadcast radio transport with a peer table (ESP-NOW style).
///
/// Sends are fire-and-forget: `Ok` means the frame was queued, not delivered.
pub trait Radio {
    /// Driver error.
    type Error: Debug;

    /// Queues `frame` for `destination`, which may be [`MacAddress::BROADCAST`].
    fn send(&mut self, destination: &MacAddress, frame: &[u8]) -> Result<(), Self::Error>;

    /// Registers a peer. Required before the first unicast to an address.
    fn add_peer(&mut self, address: &MacAddress) -> Result<(), Self::Error>;

    /// Removes a peer registration.
    fn remove_peer(&mut self, address: &MacAddress) -> Result<(), Self::Error>;

    /// Whether `address` is currently registered.
    fn peer_exists(&self, address: &MacAddress) -> bool;
}

/// Durable key-value storage, namespaced by the platform under
/// [`STORAGE_NAMESPACE`](crate::consts::STORAGE_NAMESPACE).
///
/// Must survive power loss and be readable before the radio is up.
pub trait Storage {
    /// Storage error.
    type Error: Debug;

    /// Reads a bool, `None` if the key was never written.
    fn get_bool(&mut self, key: &str) -> Result<Option<bool>, Self::Error>;

    /// Writes a bool.
    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), Self::Error>;

    /// Reads a blob into `buf`, returning its length, `None` if absent.
    fn get_blob(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Writes a blob.
    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error>;
}

/// A strip of addressable LEDs driven as one solid color.
pub trait Indicator {
    /// Sets every pixel to `color`.
    fn set_all(&mut self, color: Color);
}

/// Why the device is running.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum WakeCause {
    /// Cold boot or reset.
    PowerOn,
    /// The armed wake timer expired.
    Timer,
    /// The button pulled the wake pin to its active level.
    ExternalPin,
}

/// Deep-sleep controller.
pub trait Power {
    /// Reason for the last wake.
    fn wake_cause(&mut self) -> WakeCause;

    /// Arms a timer wake `duration_ms` after sleep entry.
    fn arm_timer_wake(&mut self, duration_ms: u32);

    /// Arms a wake on `pin` reaching `level`.
    fn arm_external_wake(&mut self, pin: u8, level: bool);

    /// Flushes pending console output. Defaults to a no-op.
    fn flush(&mut self) {}

    /// Cuts auxiliary power rails (LED strip supply, sensors).
    fn power_down_peripherals(&mut self);

    /// Enters deep sleep. On hardware this does not return; the next
    /// instruction executed is the boot path.
    fn enter_deep_sleep(&mut self);
}

/// Sends one envelope, mapping the driver error into [`Error::Send`].
pub(crate) fn send_envelope<R: Radio>(
    radio: &mut R,
    destination: &MacAddress,
    recipient: DeviceId,
    kind: MessageType,
    payload: &[u8],
) -> error::Result<()> {
    let frame = message::encode(recipient, kind, payload)?;
    send_frame(radio, destination, &frame)
}

/// Sends a prepared frame, mapping the driver error into [`Error::Send`].
pub(crate) fn send_frame<R: Radio>(
    radio: &mut R,
    destination: &MacAddress,
    frame: &[u8],
) -> error::Result<()> {
    radio.send(destination, frame).map_err(|_| {
        warn!("send to {} failed", destination);
        Error::Send
    })
}

/// Registers `address` unless the radio already knows it.
pub(crate) fn ensure_peer<R: Radio>(radio: &mut R, address: &MacAddress) -> error::Result<()> {
    if radio.peer_exists(address) {
        return Ok(());
    }
    radio.add_peer(address).map_err(|_| {
        warn!("adding peer {} failed", address);
        Error::Peer
    })
}

/// Unregisters `address` if the radio knows it.
pub(crate) fn drop_peer<R: Radio>(radio: &mut R, address: &MacAddress) -> error::Result<()> {
    if !radio.peer_exists(address) {
        return Ok(());
    }
    radio.remove_peer(address).map_err(|_| {
        warn!("removing peer {} failed", address);
        Error::Peer
    })
}
