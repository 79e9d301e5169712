//! # buzzlink
//!
//! A portable, no_std core for wireless game-show buzzers: battery-powered
//! hand-held clients pair with a single controller over a broadcast radio
//! link (ESP-NOW class), report button presses with low latency and deep
//! sleep between interactions.
//!
//! The crate implements the pairing and session protocol, the per-device
//! state machines and the power coordination. Hardware is reached through
//! traits:
//! - [`hal::Radio`] for the broadcast transport and its peer table
//! - [`hal::Storage`] for the persistent pairing record
//! - [`hal::Indicator`] for the LED strip
//! - [`hal::Power`] for wake causes and deep sleep
//! - `embedded_hal::digital::InputPin` for buttons
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Builds against `std` for host use |
//! | `log`       | Uses `log` logging |
//! | `defmt-0-3` | Uses `defmt` logging |
//!
//! ## Software Features
//!
//! - **Multi-envelope frames**: one broadcast carries a color for every client
//! - **Pairing** with persisted state, re-pairing and orphan recovery
//! - **Debounced button** with hold-to-pair and idle sleep
//! - **Timer-wake handshake** bounded to a short reply window
//! - **Cooperative scheduler** and a context lock shared with the radio callback
//!
//! ## Usage
//!
//! ```ignore
//! use buzzlink::client::{Client, await_wakeup};
//! use buzzlink::config::ClientConfig;
//! use buzzlink::consts::TICK_LOCK_BUDGET_MS;
//! use buzzlink::power::BootPlan;
//!
//! buzzlink::declare_context!(CLIENT, Client<EspNow, Nvs, Strip, Sleep, ButtonPin>);
//!
//! fn main() {
//!     let client = Client::new(mac, radio, nvs, strip, sleep, pin, ClientConfig::default(), now_ms());
//!     let _ = CLIENT.install(client);
//!     esp_now_register_recv_cb(on_receive);
//!
//!     if CLIENT.lock(|c| c.boot(now_ms())) == Ok(BootPlan::WakeupHandshake) {
//!         let _ = await_wakeup(&CLIENT, &mut delay, now_ms);
//!     }
//!     buzzlink::scheduler::run_tick_loop(&CLIENT, &mut delay, now_ms, TICK_LOCK_BUDGET_MS, 1_000);
//! }
//!
//! fn on_receive(mac: &[u8; 6], data: &[u8]) {
//!     // Never waits: a busy context gets the frame queued
//!     let _ = CLIENT.deliver(MacAddress(*mac), data, now_ms());
//! }
//! ```
//!
//! The controller is driven the same way with a [`controller::Controller`].
//!
//! ## Integration Notes
//!
//! - Every timing value is in milliseconds of a monotonic clock passed in by
//!   the caller; the crate never reads a clock itself.
//! - Install the context in its guard before registering the receive callback.
//! - There is no link encryption or authentication. Device ids are a one-byte
//!   checksum of the hardware address and may collide.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub use critical_section;
pub use heapless;

pub mod client;
pub mod color;
pub mod config;
pub mod consts;
pub mod controller;
pub mod error;
pub mod hal;
pub mod identity;
pub mod input;
pub mod message;
pub mod pairing;
pub mod power;
pub mod roster;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use identity::{DeviceId, MacAddress};
