//! The quiz-master controller.
//!
//! [`Controller`] is the device context of the controller. It keeps the
//! [`Roster`] of paired clients, the buzzer-press lock and the operator panel,
//! and answers client messages:
//!
//! | Received          | Condition                              | Reaction                       |
//! |-------------------|----------------------------------------|--------------------------------|
//! | `BUZZER_PRESSED`  | known client, lock free                | take lock, color fan-out       |
//! | `PAIRING_REQUEST` | accepting pairings                     | add client, `PAIRING_ACCEPTED` |
//! | `WAKEUP_REQUEST`  | accepting pairings, id known           | `WAKEUP_ACCEPTED`              |
//! | `WAKEUP_REQUEST`  | id unknown, sender not broadcast       | `PAIRING_REMOVE`               |
//! | `PAIRING_REMOVE`  | known client                           | drop client and peer           |
//! | `PING`            | known client                           | liveness refresh only          |
//!
//! Any envelope from a known client refreshes its liveness timestamp. Unicast
//! replies go to the sender's address; whole-roster notifications go out as
//! one broadcast frame holding one `SET_COLOR` envelope per client, in
//! roster order.
//!
//! The controller has no id of its own: the address byte of every envelope
//! it receives names the sending client.

use embedded_hal::digital::InputPin;
use heapless::Vec;

use crate::color::Color;
use crate::config::{ButtonConfig, ControllerConfig};
use crate::consts::{BROADCAST_ADDRESS, MAX_CLIENTS};
use crate::error::Error;
use crate::hal::{self, Indicator, Radio};
use crate::identity::{DeviceId, MacAddress};
use crate::input::{Button, ButtonEvent};
use crate::message::{self, Frame, MessageType};
use crate::roster::{Roster, RosterEntry};
use crate::scheduler::{Handle, Receive, Scheduler, Tick};

/// Scheduled actions of the controller.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ControllerTask {
    /// Toggle the indicator while accepting pairings.
    PairingBlink,
    /// Drop clients that went silent.
    LivenessSweep,
}

/// Operator requests, usually from the [`ControlPanel`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum OperatorAction {
    /// Start or stop accepting pairings.
    TogglePairing,
    /// Release the buzzer lock and blank every client.
    ClearBuzzerLock,
    /// Flag the buzzed client's answer as wrong, keeping the lock.
    WrongAnswer,
}

/// The three operator buttons.
#[derive(Debug)]
pub struct ControlPanel<P> {
    pairing: Button<P>,
    reset: Button<P>,
    wrong: Button<P>,
}

impl<P: InputPin> ControlPanel<P> {
    /// Wraps the pairing, reset and wrong-answer buttons.
    pub fn new(pairing: P, reset: P, wrong: P, config: ButtonConfig, now_ms: u64) -> Self {
        Self {
            pairing: Button::new(pairing, config, None, now_ms),
            reset: Button::new(reset, config, None, now_ms),
            wrong: Button::new(wrong, config, None, now_ms),
        }
    }

    /// Polls every button and returns the actions whose button was pressed.
    pub fn poll(&mut self, now_ms: u64) -> Vec<OperatorAction, 3> {
        let mut actions = Vec::new();
        let buttons = [
            (&mut self.pairing, OperatorAction::TogglePairing),
            (&mut self.reset, OperatorAction::ClearBuzzerLock),
            (&mut self.wrong, OperatorAction::WrongAnswer),
        ];
        for (button, action) in buttons {
            if button.poll(now_ms) == Some(ButtonEvent::Pressed) {
                let _ = actions.push(action);
            }
        }
        actions
    }
}

/// Device context of the controller.
///
/// # Type Parameters
/// - `R`: Radio transport
/// - `I`: Indicator
/// - `P`: Operator button pins
/// - `N`: Roster capacity
#[derive(Debug)]
pub struct Controller<R, I, P, const N: usize = MAX_CLIENTS> {
    config: ControllerConfig,
    radio: R,
    indicator: I,
    panel: ControlPanel<P>,
    roster: Roster<N>,
    accepting: bool,
    buzzer_lock: Option<(DeviceId, MacAddress)>,
    scheduler: Scheduler<ControllerTask, 2>,
    blink: Option<Handle>,
    blink_on: bool,
}

impl<R, I, P, const N: usize> Controller<R, I, P, N>
where
    R: Radio,
    I: Indicator,
    P: InputPin,
{
    /// Creates a controller with an empty roster, not accepting pairings.
    pub fn new(radio: R, indicator: I, panel: ControlPanel<P>, config: ControllerConfig) -> Self {
        Self {
            config,
            radio,
            indicator,
            panel,
            roster: Roster::new(),
            accepting: false,
            buzzer_lock: None,
            scheduler: Scheduler::new(),
            blink: None,
            blink_on: false,
        }
    }

    /// Brings the radio up and starts the liveness sweep if configured.
    pub fn start(&mut self, now_ms: u64) {
        let _ = hal::ensure_peer(&mut self.radio, &BROADCAST_ADDRESS);
        self.indicator.set_all(Color::OFF);
        if self.config.liveness_timeout_ms.is_some() {
            if let Err(e) = self.scheduler.on_repeat(
                now_ms,
                self.config.liveness_sweep_ms,
                ControllerTask::LivenessSweep,
            ) {
                warn!("liveness sweep not scheduled: {}", e);
            }
        }
        info!("controller up, roster capacity {}", N);
    }

    /// Paired clients in fan-out order.
    pub fn roster(&self) -> &Roster<N> {
        &self.roster
    }

    /// Whether pairings are being accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Id and address of the client holding the buzzer lock.
    pub fn buzzer_lock(&self) -> Option<(DeviceId, MacAddress)> {
        self.buzzer_lock
    }

    /// Handles one received frame. Every well-formed envelope is processed.
    pub fn on_receive(&mut self, sender: MacAddress, frame: &[u8], now_ms: u64) {
        let mut envelopes = message::decode(frame);
        for envelope in envelopes.by_ref() {
            let id = envelope.recipient;
            let _ = self.roster.touch(id, &sender, now_ms);
            match envelope.message_type() {
                Some(MessageType::BuzzerPressed) => self.on_buzzer_pressed(id, sender),
                Some(MessageType::PairingRequest) => self.on_pairing_request(id, sender, now_ms),
                Some(MessageType::WakeupRequest) => self.on_wakeup_request(id, sender),
                Some(MessageType::PairingRemove) => self.on_pairing_remove(id, sender),
                Some(MessageType::Ping) => trace!("ping from {}", id),
                kind => debug!("ignoring {:?} from {}", kind, sender),
            }
        }
        if envelopes.is_truncated() {
            debug!("malformed frame from {} dropped", sender);
        }
    }

    /// A client pressed its buzzer.
    ///
    /// The first known client to buzz takes the lock; every client is told
    /// who won. Presses while the lock is held are ignored.
    pub fn on_buzzer_pressed(&mut self, id: DeviceId, mac: MacAddress) {
        if self.roster.find(id, &mac).is_none() {
            debug!("buzz from unknown client {} ({})", id, mac);
            return;
        }
        if let Some((holder, _)) = self.buzzer_lock {
            debug!("buzz from {} ignored, {} holds the lock", id, holder);
            return;
        }
        self.buzzer_lock = Some((id, mac));
        info!("client {} buzzed first", id);
        self.broadcast_colors(|entry| {
            if entry.id == id && entry.mac == mac {
                Color::ACTIVE
            } else {
                Color::LOCKED
            }
        });
    }

    /// A client asks to pair.
    ///
    /// Only honoured while accepting pairings. A client already in the roster
    /// gets the reply again without a second entry.
    pub fn on_pairing_request(&mut self, id: DeviceId, mac: MacAddress, now_ms: u64) {
        if !self.accepting {
            debug!("pairing request from {} while not accepting", mac);
            return;
        }
        match self.roster.insert(id, mac, now_ms) {
            Ok(true) => info!("client {} ({}) joined", id, mac),
            Ok(false) => debug!("client {} asked to pair again", id),
            Err(e) => {
                warn!("client {} not added: {}", id, e);
                return;
            }
        }
        let registered = hal::ensure_peer(&mut self.radio, &mac).is_ok();
        self.roster.set_peer_registered(id, &mac, registered);
        let _ = hal::send_envelope(&mut self.radio, &mac, id, MessageType::PairingAccepted, &[]);
    }

    /// A client woke on its timer and asks whether to stay up.
    ///
    /// A client the roster does not know is told to drop its pairing, which
    /// recovers clients orphaned by a controller restart.
    pub fn on_wakeup_request(&mut self, id: DeviceId, mac: MacAddress) {
        let known = self.roster.find_by_id(id).is_some();
        if known {
            if self.accepting {
                let _ =
                    hal::send_envelope(&mut self.radio, &mac, id, MessageType::WakeupAccepted, &[]);
            }
            return;
        }
        if mac.is_broadcast() {
            return;
        }

        info!("orphaned client {} ({}), releasing it", id, mac);
        let was_peer = self.radio.peer_exists(&mac);
        if hal::ensure_peer(&mut self.radio, &mac).is_ok() {
            let _ = hal::send_envelope(&mut self.radio, &mac, id, MessageType::PairingRemove, &[]);
            if !was_peer {
                let _ = hal::drop_peer(&mut self.radio, &mac);
            }
        }
    }

    /// A client dropped its pairing.
    pub fn on_pairing_remove(&mut self, id: DeviceId, mac: MacAddress) {
        match self.roster.remove(id, &mac) {
            Some(entry) => {
                info!("client {} ({}) left", id, mac);
                if entry.peer_registered {
                    let _ = hal::drop_peer(&mut self.radio, &mac);
                }
            }
            None => debug!("remove from unknown client {}", id),
        }
    }

    /// Runs an operator action.
    pub fn operator(&mut self, action: OperatorAction, now_ms: u64) {
        match action {
            OperatorAction::TogglePairing => {
                let _ = self.toggle_pairing(now_ms);
            }
            OperatorAction::ClearBuzzerLock => self.clear_buzzer_lock(),
            OperatorAction::WrongAnswer => self.mark_wrong_answer(),
        }
    }

    /// Starts or stops accepting pairings. Returns the new mode.
    pub fn toggle_pairing(&mut self, now_ms: u64) -> bool {
        self.accepting = !self.accepting;
        let _ = self.scheduler.cancel(&mut self.blink);
        if self.accepting {
            self.blink_on = true;
            self.indicator.set_all(Color::PAIRING);
            match self.scheduler.on_repeat(
                now_ms,
                self.config.pairing_blink_ms,
                ControllerTask::PairingBlink,
            ) {
                Ok(handle) => self.blink = Some(handle),
                Err(e) => warn!("pairing blink not scheduled: {}", e),
            }
        } else {
            self.blink_on = false;
            self.indicator.set_all(Color::OFF);
        }
        info!("accepting pairings: {}", self.accepting);
        self.accepting
    }

    /// Releases the buzzer lock and blanks every client.
    pub fn clear_buzzer_lock(&mut self) {
        self.buzzer_lock = None;
        info!("buzzer lock cleared");
        self.broadcast_colors(|_| Color::OFF);
    }

    /// Shows the buzzed client that its answer was wrong. The lock is kept.
    pub fn mark_wrong_answer(&mut self) {
        let Some((holder, holder_mac)) = self.buzzer_lock else {
            debug!("wrong answer without a buzzed client");
            return;
        };
        info!("client {} answered wrong", holder);
        self.broadcast_colors(|entry| {
            if entry.id == holder && entry.mac == holder_mac {
                Color::WRONG
            } else {
                Color::LOCKED
            }
        });
    }

    /// Broadcasts one `SET_COLOR` per roster entry, in roster order. A roster
    /// too large for one frame is split over several.
    fn broadcast_colors(&mut self, mut color_for: impl FnMut(&RosterEntry) -> Color) {
        let mut frame = Frame::new();
        let mut frames = 0u8;
        for entry in self.roster.iter() {
            let payload = color_for(entry).to_payload();
            if frame.push(entry.id, MessageType::SetColor, &payload).is_err() {
                let _ = hal::send_frame(&mut self.radio, &BROADCAST_ADDRESS, frame.as_bytes());
                frames += 1;
                frame = Frame::new();
                if let Err(e) = frame.push(entry.id, MessageType::SetColor, &payload) {
                    warn!("color for {} not sent: {}", entry.id, Error::from(e));
                }
            }
        }
        if !frame.is_empty() {
            let _ = hal::send_frame(&mut self.radio, &BROADCAST_ADDRESS, frame.as_bytes());
            frames += 1;
        }
        debug!("color fan-out to {} clients in {} frames", self.roster.len(), frames);
    }

    fn run(&mut self, task: ControllerTask, now_ms: u64) {
        match task {
            ControllerTask::PairingBlink => {
                self.blink_on = !self.blink_on;
                self.indicator.set_all(if self.blink_on {
                    Color::PAIRING
                } else {
                    Color::OFF
                });
            }
            ControllerTask::LivenessSweep => {
                let Some(timeout_ms) = self.config.liveness_timeout_ms else {
                    return;
                };
                for entry in self.roster.expire(now_ms, timeout_ms) {
                    info!("client {} ({}) timed out", entry.id, entry.mac);
                    if entry.peer_registered {
                        let _ = hal::drop_peer(&mut self.radio, &entry.mac);
                    }
                }
            }
        }
    }
}

impl<R, I, P, const N: usize> Receive for Controller<R, I, P, N>
where
    R: Radio,
    I: Indicator,
    P: InputPin,
{
    fn receive(&mut self, sender: MacAddress, frame: &[u8], now_ms: u64) {
        self.on_receive(sender, frame, now_ms);
    }
}

impl<R, I, P, const N: usize> Tick for Controller<R, I, P, N>
where
    R: Radio,
    I: Indicator,
    P: InputPin,
{
    fn tick(&mut self, now_ms: u64) {
        while let Some(task) = self.scheduler.pop_due(now_ms) {
            self.run(task, now_ms);
        }
        for action in self.panel.poll(now_ms) {
            self.operator(action, now_ms);
        }
    }
}
