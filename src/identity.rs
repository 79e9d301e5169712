//! Hardware addresses and the one-byte device identity derived from them.
//!
//! Every device on the link is known by two names: the 6-byte radio hardware
//! address used by the transport, and a one-byte id used inside envelopes.
//! The id is the sum of the address bytes modulo 256.
//!
//! ## Limitations
//!
//! The id is a checksum, not a unique name. Two clients whose addresses sum
//! to the same value collide on a controller: lookups by `(id, mac)` still
//! keep their roster entries apart, but a frame addressed to that id is
//! accepted by both.

use core::fmt;

/// One-byte device identifier carried in every envelope header.
pub type DeviceId = u8;

/// A 6-byte radio hardware address.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash, Debug)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The broadcast address `FF:FF:FF:FF:FF:FF`.
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Builds an address from a byte slice, if it is exactly 6 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.try_into().ok()?;
        Some(MacAddress(octets))
    }

    /// Raw address bytes.
    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// The device id derived from this address.
    pub fn device_id(&self) -> DeviceId {
        self.0.iter().fold(0u8, |id, b| id.wrapping_add(*b))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[cfg(feature = "defmt-0-3")]
impl defmt::Format for MacAddress {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=[u8]:X}", &self.0[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_wraps_modulo_256() {
        let mac = MacAddress([0xA0, 0xB7, 0x65, 0x67, 0xCA, 0xD4]);
        let expected = (0xA0u32 + 0xB7 + 0x65 + 0x67 + 0xCA + 0xD4) % 256;
        assert_eq!(mac.device_id() as u32, expected);
    }

    #[test]
    fn test_colliding_ids_are_possible() {
        let a = MacAddress([1, 2, 3, 4, 5, 6]);
        let b = MacAddress([6, 5, 4, 3, 2, 1]);
        assert_ne!(a, b);
        assert_eq!(a.device_id(), b.device_id());
    }

    #[test]
    fn test_from_slice_requires_six_bytes() {
        assert!(MacAddress::from_slice(&[1, 2, 3, 4, 5]).is_none());
        assert_eq!(
            MacAddress::from_slice(&[1, 2, 3, 4, 5, 6]),
            Some(MacAddress([1, 2, 3, 4, 5, 6]))
        );
    }

    #[test]
    fn test_broadcast_display() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert_eq!(
            format!("{}", MacAddress::BROADCAST),
            "FF:FF:FF:FF:FF:FF"
        );
    }
}
