//! Envelope framing for the broadcast radio link.
//!
//! A frame is the byte sequence handed to the radio in one `send` call. It
//! holds one or more envelopes laid out back to back:
//!
//! ```text
//! +--------------+-------------+------+-----------------------+
//! | recipient_id | payload_len | type | payload (len - 1 B)   |  ...next envelope
//! +--------------+-------------+------+-----------------------+
//! ```
//!
//! `payload_len` counts the type byte plus the payload bytes, so the next
//! envelope starts `2 + payload_len` bytes after the current one.
//!
//! Envelopes sent by a client to the controller carry the client's own id in
//! the `recipient_id` byte; the controller has no id of its own.
//!
//! ## Functions
//!
//! - [`encode`]: Builds a single envelope
//! - [`encode_into`]: Writes a single envelope into a caller buffer
//! - [`decode`]: Walks every envelope of a frame
//! - [`find_addressed`]: Returns the first envelope for a given id
//! - [`Frame`]: Packs several envelopes into one broadcast frame
//!
//! ## Limitations
//!
//! - Type bytes are not interpreted while walking: unknown types are skipped,
//!   not rejected, so old devices ignore messages they do not know.
//! - A length field pointing past the end of the frame, or a zero length,
//!   stops decoding. Whatever follows is dropped.

use heapless::Vec;
use thiserror::Error;

use crate::consts::{ENVELOPE_HEADER_LEN, MAX_ENVELOPE_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use crate::identity::DeviceId;

/// Message types of the buzzer protocol.
///
/// The byte values are a compatibility contract. There is no version field on
/// the wire, so changing one breaks every deployed device.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    /// Client looking for a controller (broadcast).
    PairingRequest = b'P',
    /// Controller accepted the client into its roster.
    PairingAccepted = b'A',
    /// Either side dropping the pairing.
    PairingRemove = b'X',
    /// Client woke on its timer and asks to stay awake.
    WakeupRequest = b'W',
    /// Controller lets the client stay awake.
    WakeupAccepted = b'K',
    /// Client button went down.
    BuzzerPressed = b'B',
    /// Client keep-alive.
    Ping = b'H',
    /// Controller sets a client's indicator, payload `[r, g, b]`.
    SetColor = b'N',
    /// Controller blanks a client's indicator.
    ResetColor = b'R',
}

impl MessageType {
    /// Converts a raw type byte, returning `None` for unknown types.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            b'P' => MessageType::PairingRequest,
            b'A' => MessageType::PairingAccepted,
            b'X' => MessageType::PairingRemove,
            b'W' => MessageType::WakeupRequest,
            b'K' => MessageType::WakeupAccepted,
            b'B' => MessageType::BuzzerPressed,
            b'H' => MessageType::Ping,
            b'N' => MessageType::SetColor,
            b'R' => MessageType::ResetColor,
            _ => return None,
        })
    }

    /// The wire byte of this type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Reasons an envelope or frame cannot be encoded.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CodecError {
    /// The payload does not fit the one-byte length field.
    #[error("payload of {0} bytes exceeds the envelope limit")]
    PayloadTooLong(usize),
    /// The output buffer or frame has no room for the envelope.
    #[error("no room left in the frame")]
    FrameFull,
}

/// One addressed unit inside a frame.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Envelope<'a> {
    /// Id of the device the envelope is for.
    pub recipient: DeviceId,
    /// Raw type byte.
    pub kind: u8,
    /// Bytes following the type byte.
    pub payload: &'a [u8],
}

impl Envelope<'_> {
    /// The decoded message type, if known.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.kind)
    }

    /// Encoded size of this envelope.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_LEN + 1 + self.payload.len()
    }
}

/// Writes one envelope into `output`.
///
/// # Arguments
/// - `output`: Destination buffer
/// - `recipient`: Id of the addressed device
/// - `kind`: Message type
/// - `payload`: Bytes following the type byte (at most 249)
///
/// # Returns
/// The number of bytes written.
pub fn encode_into(
    output: &mut [u8],
    recipient: DeviceId,
    kind: MessageType,
    payload: &[u8],
) -> Result<usize, CodecError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLong(payload.len()));
    }
    let total = ENVELOPE_HEADER_LEN + 1 + payload.len();
    if output.len() < total {
        return Err(CodecError::FrameFull);
    }
    output[0] = recipient;
    output[1] = (payload.len() + 1) as u8;
    output[2] = kind.as_u8();
    output[3..total].copy_from_slice(payload);
    Ok(total)
}

/// Encodes a single envelope.
pub fn encode(
    recipient: DeviceId,
    kind: MessageType,
    payload: &[u8],
) -> Result<Vec<u8, MAX_ENVELOPE_LEN>, CodecError> {
    let mut buf = [0u8; MAX_ENVELOPE_LEN];
    let len = encode_into(&mut buf, recipient, kind, payload)?;
    Vec::from_slice(&buf[..len]).map_err(|_| CodecError::FrameFull)
}

/// Walks the envelopes of a received frame.
pub fn decode(frame: &[u8]) -> Envelopes<'_> {
    Envelopes {
        frame,
        pos: 0,
        truncated: false,
    }
}

/// Returns the first envelope addressed to `id`, skipping all others.
///
/// Returns `None` if no envelope matches or the frame is malformed before a
/// match is reached.
pub fn find_addressed(frame: &[u8], id: DeviceId) -> Option<Envelope<'_>> {
    decode(frame).find(|envelope| envelope.recipient == id)
}

/// Iterator over the envelopes of a frame. See [`decode`].
#[derive(Clone, Debug)]
pub struct Envelopes<'a> {
    frame: &'a [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> Envelopes<'a> {
    /// Whether decoding stopped on a malformed length field.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn fail(&mut self) -> Option<Envelope<'a>> {
        self.truncated = true;
        self.pos = self.frame.len();
        None
    }
}

impl<'a> Iterator for Envelopes<'a> {
    type Item = Envelope<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.frame[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < ENVELOPE_HEADER_LEN {
            return self.fail();
        }
        let len = rest[1] as usize;
        // A zero length has no type byte to read
        if len == 0 || ENVELOPE_HEADER_LEN + len > rest.len() {
            return self.fail();
        }
        let envelope = Envelope {
            recipient: rest[0],
            kind: rest[2],
            payload: &rest[3..ENVELOPE_HEADER_LEN + len],
        };
        self.pos += ENVELOPE_HEADER_LEN + len;
        Some(envelope)
    }
}

/// A frame under construction, holding one or more envelopes.
///
/// Used for fan-out: one envelope per recipient, sent as a single broadcast.
#[derive(Clone, Default, Debug)]
pub struct Frame {
    buf: Vec<u8, MAX_FRAME_LEN>,
    envelopes: usize,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frame holding a single envelope.
    pub fn single(
        recipient: DeviceId,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<Self, CodecError> {
        let mut frame = Self::new();
        frame.push(recipient, kind, payload)?;
        Ok(frame)
    }

    /// Appends an envelope. The frame is left unchanged on error.
    pub fn push(
        &mut self,
        recipient: DeviceId,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<(), CodecError> {
        let mut buf = [0u8; MAX_ENVELOPE_LEN];
        let len = encode_into(&mut buf, recipient, kind, payload)?;
        self.buf
            .extend_from_slice(&buf[..len])
            .map_err(|_| CodecError::FrameFull)?;
        self.envelopes += 1;
        Ok(())
    }

    /// Encoded bytes, ready for the radio.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of envelopes in the frame.
    pub fn envelope_count(&self) -> usize {
        self.envelopes
    }

    /// Whether the frame holds no envelope.
    pub fn is_empty(&self) -> bool {
        self.envelopes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_envelope_round_trip() {
        let payload = [1u8, 2, 3];
        let bytes = encode(0x42, MessageType::SetColor, &payload).unwrap();
        assert_eq!(&bytes[..], &[0x42, 4, b'N', 1, 2, 3]);

        let mut envelopes = decode(&bytes);
        let envelope = envelopes.next().unwrap();
        assert_eq!(envelope.recipient, 0x42);
        assert_eq!(envelope.message_type(), Some(MessageType::SetColor));
        assert_eq!(envelope.payload, &payload);
        assert!(envelopes.next().is_none());
        assert!(!envelopes.is_truncated());
    }

    #[test]
    fn test_round_trip_at_payload_limits() {
        for len in [0usize, 1, 248, MAX_PAYLOAD_LEN] {
            let payload: std::vec::Vec<u8> = (0..len).map(|i| i as u8).collect();
            let bytes = encode(7, MessageType::Ping, &payload).unwrap();
            let decoded: std::vec::Vec<_> = decode(&bytes).collect();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].recipient, 7);
            assert_eq!(decoded[0].kind, b'H');
            assert_eq!(decoded[0].payload, &payload[..]);
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode(1, MessageType::Ping, &payload),
            Err(CodecError::PayloadTooLong(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn test_fan_out_lookup_per_recipient() {
        let ids = [3u8, 9, 27, 81];
        let mut frame = Frame::new();
        for (i, id) in ids.iter().enumerate() {
            frame
                .push(*id, MessageType::SetColor, &[i as u8, 0, 0])
                .unwrap();
        }
        assert_eq!(frame.envelope_count(), 4);

        for (i, id) in ids.iter().enumerate() {
            let envelope = find_addressed(frame.as_bytes(), *id).unwrap();
            assert_eq!(envelope.recipient, *id);
            assert_eq!(envelope.payload, &[i as u8, 0, 0]);
        }
        assert!(find_addressed(frame.as_bytes(), 4).is_none());
        assert!(find_addressed(frame.as_bytes(), 0).is_none());
    }

    #[test]
    fn test_lookup_stops_at_first_match() {
        let mut frame = Frame::new();
        frame.push(5, MessageType::SetColor, &[1, 1, 1]).unwrap();
        frame.push(5, MessageType::ResetColor, &[]).unwrap();
        let envelope = find_addressed(frame.as_bytes(), 5).unwrap();
        assert_eq!(envelope.message_type(), Some(MessageType::SetColor));
    }

    #[test]
    fn test_truncated_envelope_fails_closed() {
        // Length claims 10 bytes but only 2 follow the header
        let frame = [0x11, 10, b'N', 0xff];
        let mut envelopes = decode(&frame);
        assert!(envelopes.next().is_none());
        assert!(envelopes.is_truncated());
        assert!(find_addressed(&frame, 0x11).is_none());
    }

    #[test]
    fn test_truncation_drops_rest_of_frame() {
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(&encode(1, MessageType::Ping, &[]).unwrap());
        bytes.extend_from_slice(&[2, 200, b'N']);
        let decoded: std::vec::Vec<_> = decode(&bytes).collect();
        assert_eq!(decoded.len(), 1);
        assert!(find_addressed(&bytes, 2).is_none());
    }

    #[test]
    fn test_zero_length_and_lone_byte_are_malformed() {
        assert!(find_addressed(&[4, 0, b'P'], 4).is_none());
        let mut envelopes = decode(&[4]);
        assert!(envelopes.next().is_none());
        assert!(envelopes.is_truncated());
    }

    #[test]
    fn test_unknown_type_is_skipped_not_rejected() {
        let frame = [1, 1, 0xEE, 2, 1, b'A'];
        let decoded: std::vec::Vec<_> = decode(&frame).collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].message_type(), None);
        assert_eq!(decoded[1].message_type(), Some(MessageType::PairingAccepted));
    }

    #[test]
    fn test_frame_push_respects_transport_limit() {
        let mut frame = Frame::new();
        let mut pushed = 0;
        while frame.push(1, MessageType::SetColor, &[0, 0, 0]).is_ok() {
            pushed += 1;
        }
        assert_eq!(pushed, MAX_FRAME_LEN / 6);
        assert_eq!(frame.envelope_count(), pushed);
        assert!(frame.as_bytes().len() <= MAX_FRAME_LEN);
    }

    #[test]
    fn test_type_bytes_are_stable() {
        let all = [
            (MessageType::PairingRequest, b'P'),
            (MessageType::PairingAccepted, b'A'),
            (MessageType::PairingRemove, b'X'),
            (MessageType::WakeupRequest, b'W'),
            (MessageType::WakeupAccepted, b'K'),
            (MessageType::BuzzerPressed, b'B'),
            (MessageType::Ping, b'H'),
            (MessageType::SetColor, b'N'),
            (MessageType::ResetColor, b'R'),
        ];
        for (kind, byte) in all {
            assert_eq!(kind.as_u8(), byte);
            assert_eq!(MessageType::from_u8(byte), Some(kind));
        }
    }
}
