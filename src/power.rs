//! Client power coordination: what to do after a wake, how to go back to
//! sleep, and the bounded post-wake handshake.
//!
//! A paired client wakes on its timer every few seconds, asks the controller
//! whether it should stay up (`WAKEUP_REQUEST`) and goes straight back to
//! sleep unless a `WAKEUP_ACCEPTED` arrives within a short budget. An unpaired
//! client has nobody to ask and never arms the timer, but a stale timer wake
//! is handled anyway by sleeping again without bringing the radio up.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;

use crate::color::Color;
use crate::hal::{Indicator, Power, WakeCause};
use crate::pairing::PairingState;

/// Step between two polls of the handshake status.
const WAKEUP_POLL_US: u32 = 1_000;

/// What the client does right after boot.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BootPlan {
    /// Bring the radio up and run the interactive loop.
    Interactive,
    /// Sleep again at once, radio untouched.
    Resleep,
    /// Ask the controller whether to stay awake, with a bounded wait.
    WakeupHandshake,
}

impl BootPlan {
    /// Picks the boot plan for a wake `cause` and the restored pairing state.
    pub fn new(cause: WakeCause, state: PairingState) -> Self {
        match (cause, state) {
            (WakeCause::Timer, PairingState::Paired) => BootPlan::WakeupHandshake,
            (WakeCause::Timer, _) => BootPlan::Resleep,
            _ => BootPlan::Interactive,
        }
    }
}

/// The reply window of the post-wake handshake.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum WakeupWindow {
    /// No handshake in progress; replies are ignored.
    #[default]
    Closed,
    /// Waiting for `WAKEUP_ACCEPTED`.
    Open,
    /// The first reply arrived.
    Accepted,
}

impl WakeupWindow {
    /// Opens the window before the request goes out.
    pub fn open(&mut self) {
        *self = WakeupWindow::Open;
    }

    /// Records a `WAKEUP_ACCEPTED`. Returns `true` only for the first reply
    /// inside an open window.
    pub fn accept(&mut self) -> bool {
        match self {
            WakeupWindow::Open => {
                *self = WakeupWindow::Accepted;
                true
            }
            _ => false,
        }
    }

    /// Closes the window; later replies are ignored.
    pub fn close(&mut self) {
        *self = WakeupWindow::Closed;
    }

    /// Non-blocking status: `Ok` once accepted, `WouldBlock` while open.
    ///
    /// A closed window also reports `WouldBlock`: it can only be opened by the
    /// client itself, never by a reply.
    pub fn status(&self) -> nb::Result<(), Infallible> {
        match self {
            WakeupWindow::Accepted => Ok(()),
            _ => Err(nb::Error::WouldBlock),
        }
    }
}

/// Polls `status` until it completes or `budget_ms` has elapsed.
///
/// Returns `true` if `status` completed in time. The last poll happens at
/// the end of the budget, so a reply landing right on the deadline counts.
pub fn wait_bounded<D, E>(
    delay: &mut D,
    budget_ms: u32,
    mut status: impl FnMut() -> nb::Result<(), E>,
) -> bool
where
    D: DelayNs,
{
    let budget_us = budget_ms.saturating_mul(1_000);
    let mut waited_us = 0u32;
    loop {
        match status() {
            Ok(()) => return true,
            Err(nb::Error::Other(_)) => return false,
            Err(nb::Error::WouldBlock) if waited_us >= budget_us => return false,
            Err(nb::Error::WouldBlock) => {
                delay.delay_us(WAKEUP_POLL_US);
                waited_us += WAKEUP_POLL_US;
            }
        }
    }
}

/// Wake sources and timing for one deep sleep.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SleepRequest {
    /// Button GPIO used as external wake source.
    pub button_pin: u8,
    /// Level the button pin reads while pressed.
    pub wake_level: bool,
    /// Timer wake period, armed only while paired.
    pub timer_wake_ms: Option<u32>,
}

/// Runs the deep-sleep entry sequence.
///
/// Blanks the indicator, flushes pending output, cuts the auxiliary rails,
/// arms the wake sources and sleeps. On hardware this does not return.
pub fn enter_deep_sleep<P: Power, I: Indicator>(
    power: &mut P,
    indicator: &mut I,
    request: SleepRequest,
) {
    info!(
        "entering deep sleep, timer wake {:?}",
        request.timer_wake_ms
    );
    indicator.set_all(Color::OFF);
    power.flush();
    power.power_down_peripherals();
    power.arm_external_wake(request.button_pin, request.wake_level);
    if let Some(duration_ms) = request.timer_wake_ms {
        power.arm_timer_wake(duration_ms);
    }
    power.enter_deep_sleep();
}
