//! In-memory fakes of the hardware traits, for host tests.

#![allow(dead_code, missing_docs)]

use core::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::{ErrorType, InputPin};

use crate::color::Color;
use crate::hal::{Indicator, Power, Radio, Storage, WakeCause};
use crate::identity::MacAddress;
use crate::message::{self, Envelope};

/// Failure injected by the fakes.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Injected;

/// Radio that records every frame and keeps a peer table.
#[derive(Default, Debug)]
pub struct MockRadio {
    pub sent: Vec<(MacAddress, Vec<u8>)>,
    pub peers: Vec<MacAddress>,
    pub peer_adds: usize,
    pub fail_send: bool,
}

impl MockRadio {
    /// Envelopes of every recorded frame, with their destination.
    pub fn envelopes(&self) -> Vec<(MacAddress, Envelope<'_>)> {
        self.sent
            .iter()
            .flat_map(|(dest, frame)| message::decode(frame).map(move |e| (*dest, e)))
            .collect()
    }

    /// Recorded envelopes of type `kind`.
    pub fn count(&self, kind: message::MessageType) -> usize {
        self.envelopes()
            .iter()
            .filter(|(_, e)| e.message_type() == Some(kind))
            .count()
    }
}

impl Radio for MockRadio {
    type Error = Injected;

    fn send(&mut self, destination: &MacAddress, frame: &[u8]) -> Result<(), Self::Error> {
        if self.fail_send {
            return Err(Injected);
        }
        self.sent.push((*destination, frame.to_vec()));
        Ok(())
    }

    fn add_peer(&mut self, address: &MacAddress) -> Result<(), Self::Error> {
        self.peer_adds += 1;
        if !self.peers.contains(address) {
            self.peers.push(*address);
        }
        Ok(())
    }

    fn remove_peer(&mut self, address: &MacAddress) -> Result<(), Self::Error> {
        self.peers.retain(|peer| peer != address);
        Ok(())
    }

    fn peer_exists(&self, address: &MacAddress) -> bool {
        self.peers.contains(address)
    }
}

/// Key-value store counting writes, with a failure switch.
#[derive(Default, Debug)]
pub struct MemoryStorage {
    pub bools: Vec<(String, bool)>,
    pub blobs: Vec<(String, Vec<u8>)>,
    pub writes: usize,
    pub fail: bool,
}

impl Storage for MemoryStorage {
    type Error = Injected;

    fn get_bool(&mut self, key: &str) -> Result<Option<bool>, Self::Error> {
        if self.fail {
            return Err(Injected);
        }
        Ok(self.bools.iter().find(|(k, _)| k == key).map(|(_, v)| *v))
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), Self::Error> {
        if self.fail {
            return Err(Injected);
        }
        self.writes += 1;
        self.bools.retain(|(k, _)| k != key);
        self.bools.push((key.to_string(), value));
        Ok(())
    }

    fn get_blob(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        if self.fail {
            return Err(Injected);
        }
        match self.blobs.iter().find(|(k, _)| k == key) {
            Some((_, value)) if value.len() <= buf.len() => {
                buf[..value.len()].copy_from_slice(value);
                Ok(Some(value.len()))
            }
            Some(_) => Err(Injected),
            None => Ok(None),
        }
    }

    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(Injected);
        }
        self.writes += 1;
        self.blobs.retain(|(k, _)| k != key);
        self.blobs.push((key.to_string(), value.to_vec()));
        Ok(())
    }
}

/// Indicator remembering every color it was set to.
#[derive(Default, Debug)]
pub struct MockIndicator {
    pub history: Vec<Color>,
}

impl MockIndicator {
    pub fn current(&self) -> Color {
        self.history.last().copied().unwrap_or_default()
    }
}

impl Indicator for MockIndicator {
    fn set_all(&mut self, color: Color) {
        self.history.push(color);
    }
}

/// Calls made on [`MockPower`], in order.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum PowerCall {
    TimerWake(u32),
    ExternalWake(u8, bool),
    Flush,
    PowerDown,
    Sleep,
}

/// Power controller recording its calls. `enter_deep_sleep` returns.
#[derive(Debug)]
pub struct MockPower {
    pub cause: WakeCause,
    pub calls: Vec<PowerCall>,
}

impl MockPower {
    pub fn waking_from(cause: WakeCause) -> Self {
        Self {
            cause,
            calls: Vec::new(),
        }
    }

    pub fn slept(&self) -> bool {
        self.calls.contains(&PowerCall::Sleep)
    }
}

impl Default for MockPower {
    fn default() -> Self {
        Self::waking_from(WakeCause::PowerOn)
    }
}

impl Power for MockPower {
    fn wake_cause(&mut self) -> WakeCause {
        self.cause
    }

    fn arm_timer_wake(&mut self, duration_ms: u32) {
        self.calls.push(PowerCall::TimerWake(duration_ms));
    }

    fn arm_external_wake(&mut self, pin: u8, level: bool) {
        self.calls.push(PowerCall::ExternalWake(pin, level));
    }

    fn flush(&mut self) {
        self.calls.push(PowerCall::Flush);
    }

    fn power_down_peripherals(&mut self) {
        self.calls.push(PowerCall::PowerDown);
    }

    fn enter_deep_sleep(&mut self) {
        self.calls.push(PowerCall::Sleep);
    }
}

/// Active-low button input whose level the test flips, shareable across
/// threads.
#[derive(Clone, Debug)]
pub struct TestPin {
    high: Arc<AtomicBool>,
}

impl TestPin {
    pub fn released() -> Self {
        Self {
            high: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn press(&self) {
        self.high.store(false, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.high.store(true, Ordering::SeqCst);
    }
}

impl ErrorType for TestPin {
    type Error = Infallible;
}

impl InputPin for TestPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high.load(Ordering::SeqCst))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high.load(Ordering::SeqCst))
    }
}
