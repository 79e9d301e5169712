//! Debounced push-button state machine.
//!
//! The button is polled once per tick; there are no edge interrupts. Each
//! sample compares the previous logical level `p` with the current raw level
//! `c`:
//!
//! | p | c | Condition                          | New state  | Event            |
//! |---|---|------------------------------------|------------|------------------|
//! | 0 | 1 | debounce window since last edge    | `Pressed`  | [`ButtonEvent::Pressed`] |
//! | 1 | 1 | held for the hold time, once       | `Hold`     | [`ButtonEvent::HoldElapsed`] |
//! | 1 | 0 | debounce window since last edge    | `Released` | [`ButtonEvent::Released`] |
//! | 0 | 0 | none                               | `Unpressed`| none             |
//!
//! An edge inside the debounce window is ignored: the sample continues the
//! previous logical level. The window is measured from the last accepted
//! edge of either kind, so contact bounce on press and on release collapses
//! into a single press.
//!
//! The state is never persisted and starts `Unpressed` on every boot.

use embedded_hal::digital::{Error as _, InputPin};

use crate::config::ButtonConfig;

/// Logical button state after the last sample.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ButtonState {
    /// Up, and was up.
    Unpressed,
    /// Went down on this sample.
    Pressed,
    /// Down, and was down.
    Hold,
    /// Went up on this sample.
    Released,
}

/// Edge events produced by [`Debouncer::sample`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ButtonEvent {
    /// Accepted press edge.
    Pressed,
    /// Accepted release edge.
    Released,
    /// The button has been held for the configured hold time. Fires once per
    /// hold.
    HoldElapsed,
}

/// Pin-independent debounce logic of one button.
#[derive(Clone, Debug)]
pub struct Debouncer {
    debounce_ms: u32,
    hold_ms: Option<u32>,
    state: ButtonState,
    last_edge_ms: Option<u64>,
    pressed_at_ms: u64,
    idle_since_ms: u64,
    hold_fired: bool,
}

impl Debouncer {
    /// Creates a debouncer in the `Unpressed` state.
    ///
    /// # Arguments
    /// - `debounce_ms`: Minimum time between two accepted edges
    /// - `hold_ms`: Hold time reported by [`ButtonEvent::HoldElapsed`], `None` to disable
    /// - `now_ms`: Current time; the idle clock starts here
    pub fn new(debounce_ms: u32, hold_ms: Option<u32>, now_ms: u64) -> Self {
        Self {
            debounce_ms,
            hold_ms,
            state: ButtonState::Unpressed,
            last_edge_ms: None,
            pressed_at_ms: now_ms,
            idle_since_ms: now_ms,
            hold_fired: false,
        }
    }

    /// Logical state after the last sample.
    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Whether the button is logically down.
    pub fn is_pressed(&self) -> bool {
        matches!(self.state, ButtonState::Pressed | ButtonState::Hold)
    }

    /// Time since the last accepted press, or since boot if there was none.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.idle_since_ms)
    }

    fn edge_allowed(&self, now_ms: u64) -> bool {
        match self.last_edge_ms {
            Some(edge) => now_ms.saturating_sub(edge) >= self.debounce_ms as u64,
            None => true,
        }
    }

    /// Feeds one raw sample, `pressed` being the logical (polarity-corrected)
    /// level.
    pub fn sample(&mut self, pressed: bool, now_ms: u64) -> Option<ButtonEvent> {
        match (self.is_pressed(), pressed) {
            (false, true) if self.edge_allowed(now_ms) => {
                self.state = ButtonState::Pressed;
                self.last_edge_ms = Some(now_ms);
                self.pressed_at_ms = now_ms;
                self.idle_since_ms = now_ms;
                self.hold_fired = false;
                Some(ButtonEvent::Pressed)
            }
            (true, false) if self.edge_allowed(now_ms) => {
                self.state = ButtonState::Released;
                self.last_edge_ms = Some(now_ms);
                Some(ButtonEvent::Released)
            }
            (true, _) => {
                self.state = ButtonState::Hold;
                let held_ms = now_ms.saturating_sub(self.pressed_at_ms);
                match self.hold_ms {
                    Some(hold) if !self.hold_fired && held_ms >= hold as u64 => {
                        self.hold_fired = true;
                        Some(ButtonEvent::HoldElapsed)
                    }
                    _ => None,
                }
            }
            (false, _) => {
                self.state = ButtonState::Unpressed;
                None
            }
        }
    }
}

/// A debounced button on an [`InputPin`].
///
/// # Example
/// ```ignore
/// let mut button = Button::new(pin, ButtonConfig::default(), Some(3_000), now_ms());
/// if button.poll(now_ms()) == Some(ButtonEvent::Pressed) {
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct Button<P> {
    pin: P,
    active_low: bool,
    debouncer: Debouncer,
}

impl<P: InputPin> Button<P> {
    /// Wraps `pin`.
    ///
    /// # Arguments
    /// - `pin`: The button input
    /// - `config`: Debounce window and polarity
    /// - `hold_ms`: Hold time, `None` if holding has no meaning for this button
    /// - `now_ms`: Current time
    pub fn new(pin: P, config: ButtonConfig, hold_ms: Option<u32>, now_ms: u64) -> Self {
        Self {
            pin,
            active_low: config.active_low,
            debouncer: Debouncer::new(config.debounce_ms, hold_ms, now_ms),
        }
    }

    /// Samples the pin and advances the state machine.
    ///
    /// A failed pin read is logged and treated as "no change".
    pub fn poll(&mut self, now_ms: u64) -> Option<ButtonEvent> {
        let high = match self.pin.is_high() {
            Ok(high) => high,
            Err(e) => {
                warn!("button read failed: {:?}", e.kind());
                return None;
            }
        };
        self.debouncer.sample(high != self.active_low, now_ms)
    }

    /// Logical state after the last poll.
    pub fn state(&self) -> ButtonState {
        self.debouncer.state()
    }

    /// Time since the last accepted press, or since boot if there was none.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        self.debouncer.idle_ms(now_ms)
    }

    /// Wake level of the pin: the level it reads while pressed.
    pub fn wake_level(&self) -> bool {
        !self.active_low
    }

    /// Releases the pin.
    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    fn events(debouncer: &mut Debouncer, samples: &[(u64, bool)]) -> Vec<ButtonEvent> {
        samples
            .iter()
            .filter_map(|(t, level)| debouncer.sample(*level, *t))
            .collect()
    }

    #[test]
    fn test_bounce_collapses_into_one_press() {
        let mut debouncer = Debouncer::new(10, Some(3_000), 0);
        // Contact toggles at 0, 4, 8 and 12 ms, then stays open
        let samples: Vec<(u64, bool)> = (0..40)
            .map(|t| (t, matches!(t, 0..=3 | 8..=11)))
            .collect();

        let got = events(&mut debouncer, &samples);
        assert_eq!(
            got.iter().filter(|e| **e == ButtonEvent::Pressed).count(),
            1
        );
        assert!(!debouncer.is_pressed());
    }

    #[test]
    fn test_release_after_debounce_window() {
        let mut debouncer = Debouncer::new(10, None, 0);
        assert_eq!(debouncer.sample(true, 100), Some(ButtonEvent::Pressed));
        assert_eq!(debouncer.sample(false, 105), None);
        assert_eq!(debouncer.state(), ButtonState::Hold);
        assert_eq!(debouncer.sample(false, 110), Some(ButtonEvent::Released));
        assert_eq!(debouncer.sample(false, 111), None);
        assert_eq!(debouncer.state(), ButtonState::Unpressed);
    }

    #[test]
    fn test_hold_fires_at_threshold_exactly_once() {
        let mut debouncer = Debouncer::new(10, Some(3_000), 0);
        assert_eq!(debouncer.sample(true, 1_000), Some(ButtonEvent::Pressed));
        assert_eq!(debouncer.sample(true, 3_999), None);
        assert_eq!(debouncer.sample(true, 4_000), Some(ButtonEvent::HoldElapsed));
        assert_eq!(debouncer.sample(true, 4_001), None);
        assert_eq!(debouncer.sample(true, 9_000), None);
    }

    #[test]
    fn test_hold_short_of_threshold_never_fires() {
        let mut debouncer = Debouncer::new(10, Some(3_000), 0);
        let got = events(&mut debouncer, &[(0, true), (2_999, true), (3_010, false)]);
        assert_eq!(got, [ButtonEvent::Pressed, ButtonEvent::Released]);
    }

    #[test]
    fn test_hold_rearms_on_next_press() {
        let mut debouncer = Debouncer::new(10, Some(100), 0);
        let got = events(
            &mut debouncer,
            &[(0, true), (100, true), (200, false), (300, true), (400, true)],
        );
        assert_eq!(
            got,
            [
                ButtonEvent::Pressed,
                ButtonEvent::HoldElapsed,
                ButtonEvent::Released,
                ButtonEvent::Pressed,
                ButtonEvent::HoldElapsed,
            ]
        );
    }

    #[test]
    fn test_idle_clock_starts_at_boot_and_resets_on_press() {
        let mut debouncer = Debouncer::new(10, None, 500);
        assert_eq!(debouncer.idle_ms(1_400), 900);
        let _ = debouncer.sample(true, 1_400);
        let _ = debouncer.sample(false, 1_500);
        assert_eq!(debouncer.idle_ms(2_000), 600);
    }

    #[test]
    fn test_active_low_pin() {
        let pin = PinMock::new(&[
            PinTransaction::get(PinState::High),
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::High),
        ]);
        let mut button = Button::new(pin, ButtonConfig::new(Some(10), Some(true)), None, 0);

        assert_eq!(button.poll(0), None);
        assert_eq!(button.poll(20), Some(ButtonEvent::Pressed));
        assert_eq!(button.poll(25), None);
        assert_eq!(button.state(), ButtonState::Hold);
        assert_eq!(button.poll(40), Some(ButtonEvent::Released));
        assert!(!button.wake_level());

        let mut pin = button.release();
        pin.done();
    }
}
