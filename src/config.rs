//! Runtime configuration of both roles.
//!
//! Defaults come from [`crate::consts`]. Platforms usually only change the
//! button pins and polarity.
//!
//! The tick-path lock budget is not part of either configuration: it belongs
//! to the caller driving the guard, see
//! [`run_tick_loop`](crate::scheduler::run_tick_loop).

use crate::consts::{
    DEBOUNCE_MS, HOLD_TO_PAIR_MS, IDLE_SLEEP_MS, LIVENESS_SWEEP_MS, PAIRING_BLINK_MS,
    PAIRING_BROADCAST_MS, PAIRING_TIMEOUT_MS, PING_INTERVAL_MS, TIMER_WAKE_MS, WAKEUP_BUDGET_MS,
};

/// Debounce and hold timing of one button.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ButtonConfig {
    /// Debounce window for press and release edges.
    pub debounce_ms: u32,
    /// Whether the pin reads low while pressed (pull-up wiring).
    pub active_low: bool,
}

impl ButtonConfig {
    /// Builds a button configuration.
    ///
    /// # Arguments
    /// - `debounce_ms`: Debounce window, `None` for [`DEBOUNCE_MS`]
    /// - `active_low`: Whether the pin reads low while pressed, `None` for `true`
    pub fn new(debounce_ms: Option<u32>, active_low: Option<bool>) -> Self {
        Self {
            debounce_ms: debounce_ms.unwrap_or(DEBOUNCE_MS),
            active_low: active_low.unwrap_or(true),
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Client (hand-held buzzer) configuration.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ClientConfig {
    /// Buzzer button.
    pub button: ButtonConfig,
    /// GPIO number of the buzzer button, used as external wake source.
    pub button_pin: u8,
    /// Interval between pairing broadcasts.
    pub pairing_broadcast_ms: u32,
    /// Pairing-mode duration before giving up.
    pub pairing_timeout_ms: u32,
    /// Keep-alive interval while paired.
    pub ping_interval_ms: u32,
    /// Hold time that enters pairing mode.
    pub hold_to_pair_ms: u32,
    /// Idle time after the last press before sleeping.
    pub idle_sleep_ms: u32,
    /// Timer wake period while paired.
    pub timer_wake_ms: u32,
    /// Budget for the post-wake `WAKEUP_ACCEPTED` reply.
    pub wakeup_budget_ms: u32,
}

impl ClientConfig {
    /// Default timing with the button on `button_pin`.
    pub fn with_button_pin(button_pin: u8) -> Self {
        Self {
            button_pin,
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            button: ButtonConfig::default(),
            button_pin: 25,
            pairing_broadcast_ms: PAIRING_BROADCAST_MS,
            pairing_timeout_ms: PAIRING_TIMEOUT_MS,
            ping_interval_ms: PING_INTERVAL_MS,
            hold_to_pair_ms: HOLD_TO_PAIR_MS,
            idle_sleep_ms: IDLE_SLEEP_MS,
            timer_wake_ms: TIMER_WAKE_MS,
            wakeup_budget_ms: WAKEUP_BUDGET_MS,
        }
    }
}

/// Controller configuration.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Operator buttons.
    pub button: ButtonConfig,
    /// Blink period of the indicator while accepting pairings.
    pub pairing_blink_ms: u32,
    /// Drop clients unseen for this long, `None` keeps them until removed.
    pub liveness_timeout_ms: Option<u32>,
    /// Interval of the liveness sweep.
    pub liveness_sweep_ms: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            button: ButtonConfig::default(),
            pairing_blink_ms: PAIRING_BLINK_MS,
            liveness_timeout_ms: None,
            liveness_sweep_ms: LIVENESS_SWEEP_MS,
        }
    }
}
