//! Constants used across the buzzer protocol implementation.
//!
//! This module defines the wire limits, the timing budgets of both roles and
//! the persistent storage keys.
//!
//! ## Key Concepts
//!
//! - **Frames**: One radio transmission. Limited by the transport to
//!   [`MAX_FRAME_LEN`] bytes and made of one or more envelopes.
//! - **Envelopes**: `[recipient_id, payload_len, type, payload...]`, where
//!   `payload_len` counts the type byte plus the payload bytes.
//! - **Timing**: Every delay is expressed in milliseconds of the device's
//!   monotonic clock. Clients and controller never share a clock.
//! - **Storage**: Pairing state lives in one namespace so the platform can
//!   wipe it in one call.
//!
//! The timing values are the defaults of [`ClientConfig`](crate::config::ClientConfig)
//! and [`ControllerConfig`](crate::config::ControllerConfig).

use crate::identity::MacAddress;

/// Maximum number of bytes the radio transport carries in a single frame.
pub const MAX_FRAME_LEN: usize = 250;

/// Length (in bytes) of the envelope header: recipient id and payload length.
pub const ENVELOPE_HEADER_LEN: usize = 2;

/// Maximum number of payload bytes following the type byte of one envelope.
///
/// `payload_len` is a `u8` that also counts the type byte, so 249 payload
/// bytes is the largest envelope the header can describe.
pub const MAX_PAYLOAD_LEN: usize = 249;

/// Maximum size (in bytes) of one encoded envelope.
pub const MAX_ENVELOPE_LEN: usize = ENVELOPE_HEADER_LEN + 1 + MAX_PAYLOAD_LEN;

/// Size (in bytes) of one `SET_COLOR` envelope: header, type and `[r, g, b]`.
pub const COLOR_ENVELOPE_LEN: usize = ENVELOPE_HEADER_LEN + 1 + 3;

/// Default roster capacity of a controller.
///
/// Bounded by how many `SET_COLOR` envelopes fit in one broadcast frame.
pub const MAX_CLIENTS: usize = MAX_FRAME_LEN / COLOR_ENVELOPE_LEN;

/// The radio broadcast address.
pub const BROADCAST_ADDRESS: MacAddress = MacAddress::BROADCAST;

/// Interval between `PAIRING_REQUEST` broadcasts while in pairing mode.
pub const PAIRING_BROADCAST_MS: u32 = 1_000;

/// Time a client stays in pairing mode before giving up and sleeping.
pub const PAIRING_TIMEOUT_MS: u32 = 10_000;

/// Interval between keep-alive `PING`s while paired and awake.
pub const PING_INTERVAL_MS: u32 = 2_000;

/// How long the button must be held to enter pairing mode.
pub const HOLD_TO_PAIR_MS: u32 = 3_000;

/// Debounce window applied to both press and release edges.
pub const DEBOUNCE_MS: u32 = 10;

/// Idle time after the last press before a client goes to deep sleep.
pub const IDLE_SLEEP_MS: u32 = 1_000;

/// Period of the timer wake armed while paired.
pub const TIMER_WAKE_MS: u32 = 5_000;

/// Budget for the `WAKEUP_ACCEPTED` reply after a timer wake.
pub const WAKEUP_BUDGET_MS: u32 = 100;

/// Bounded wait of the tick path for the context lock.
pub const TICK_LOCK_BUDGET_MS: u32 = 10;

/// Frames a context guard holds for the receive path while the tick path
/// owns the context.
pub const RECEIVE_QUEUE_DEPTH: usize = 4;

/// Blink period of the controller indicator while accepting pairings.
pub const PAIRING_BLINK_MS: u32 = 500;

/// Interval of the controller liveness sweep, when enabled.
pub const LIVENESS_SWEEP_MS: u32 = 1_000;

/// Storage namespace holding the pairing record.
pub const STORAGE_NAMESPACE: &str = "buzzlink";

/// Storage key of the `paired` flag (bool).
pub const KEY_PAIRED: &str = "paired";

/// Storage key of the controller hardware address (6 bytes).
pub const KEY_CONTROLLER_MAC: &str = "controller_mac";
