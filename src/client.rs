//! The hand-held buzzer.
//!
//! [`Client`] is the device context of a buzzer: it owns the hardware
//! handles, the pairing session, the debounced button and the scheduler.
//! Platform glue drives it from two places, both through one
//! [`Guard`](crate::scheduler::Guard):
//!
//! - the main loop calls [`Tick::tick`], which runs due scheduled actions and
//!   polls the button;
//! - the radio receive callback calls [`Guard::deliver`] once per frame,
//!   which ends up in [`Client::on_receive`].
//!
//! ## Lifecycle
//!
//! 1. [`Client::new`] restores the pairing session from storage.
//! 2. [`Client::boot`] reads the wake cause and returns a [`BootPlan`]. A
//!    timer wake while unpaired sleeps again right there.
//! 3. After a [`BootPlan::WakeupHandshake`], [`await_wakeup`] waits for the
//!    controller's reply and either resumes or sleeps.
//! 4. The tick loop runs until the client sleeps (idle, pairing timeout).
//!
//! ## Messages sent
//!
//! | Message           | To          | When                                  |
//! |-------------------|-------------|---------------------------------------|
//! | `BUZZER_PRESSED`  | controller  | press edge while paired               |
//! | `PAIRING_REQUEST` | broadcast   | every pairing broadcast period        |
//! | `PING`            | controller  | every ping period while paired        |
//! | `WAKEUP_REQUEST`  | controller  | after a timer wake while paired       |
//! | `PAIRING_REMOVE`  | controller  | entering pairing mode while paired    |
//!
//! Every envelope sent by a client carries the client's own id.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::color::Color;
use crate::config::ClientConfig;
use crate::consts::{BROADCAST_ADDRESS, TICK_LOCK_BUDGET_MS};
use crate::hal::{self, Indicator, Power, Radio, Storage};
use crate::identity::{DeviceId, MacAddress};
use crate::input::{Button, ButtonEvent, ButtonState};
use crate::message::{self, MessageType};
use crate::pairing::{PairingSession, PairingState};
use crate::power::{self, BootPlan, SleepRequest, WakeupWindow};
use crate::scheduler::{Guard, GuardError, Handle, Receive, Scheduler, Tick};

/// Scheduled actions of a client.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ClientTask {
    /// Broadcast a `PAIRING_REQUEST` and toggle the indicator.
    PairingBroadcast,
    /// Give up pairing and sleep.
    PairingTimeout,
    /// Keep-alive to the controller.
    Ping,
}

/// Device context of a buzzer.
///
/// # Type Parameters
/// - `R`: Radio transport
/// - `S`: Persistent storage
/// - `I`: Indicator
/// - `P`: Sleep controller
/// - `B`: Button input pin
#[derive(Debug)]
pub struct Client<R, S, I, P, B> {
    config: ClientConfig,
    mac: MacAddress,
    id: DeviceId,
    radio: R,
    storage: S,
    indicator: I,
    power: P,
    button: Button<B>,
    session: PairingSession,
    scheduler: Scheduler<ClientTask, 4>,
    pairing_broadcast: Option<Handle>,
    pairing_timeout: Option<Handle>,
    ping: Option<Handle>,
    wakeup: WakeupWindow,
    blink_on: bool,
    asleep: bool,
}

impl<R, S, I, P, B> Client<R, S, I, P, B>
where
    R: Radio,
    S: Storage,
    I: Indicator,
    P: Power,
    B: InputPin,
{
    /// Creates the client context and restores its pairing session.
    ///
    /// # Arguments
    /// - `mac`: Own radio hardware address; the device id is derived from it
    /// - `radio`, `storage`, `indicator`, `power`: Hardware handles
    /// - `button_pin`: Buzzer button input
    /// - `config`: Timing and button configuration
    /// - `now_ms`: Current time; the idle clock starts here
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mac: MacAddress,
        radio: R,
        mut storage: S,
        indicator: I,
        power: P,
        button_pin: B,
        config: ClientConfig,
        now_ms: u64,
    ) -> Self {
        let session = PairingSession::load(&mut storage);
        Self {
            config,
            mac,
            id: mac.device_id(),
            radio,
            storage,
            indicator,
            power,
            button: Button::new(
                button_pin,
                config.button,
                Some(config.hold_to_pair_ms),
                now_ms,
            ),
            session,
            scheduler: Scheduler::new(),
            pairing_broadcast: None,
            pairing_timeout: None,
            ping: None,
            wakeup: WakeupWindow::Closed,
            blink_on: false,
            asleep: false,
        }
    }

    /// Own device id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Own hardware address.
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Current pairing state.
    pub fn pairing_state(&self) -> PairingState {
        self.session.state()
    }

    /// Whether the sleep sequence has run. A sleeping client ignores ticks
    /// and frames.
    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    /// Non-blocking status of the post-wake handshake.
    pub fn wakeup_status(&self) -> nb::Result<(), core::convert::Infallible> {
        self.wakeup.status()
    }

    /// Decides what to do after a wake and starts doing it.
    ///
    /// - [`BootPlan::Resleep`]: the client is asleep when this returns.
    /// - [`BootPlan::Interactive`]: the radio is up and the tick loop may run.
    /// - [`BootPlan::WakeupHandshake`]: the timer wake is armed, the
    ///   `WAKEUP_REQUEST` is out; call [`await_wakeup`] next.
    pub fn boot(&mut self, now_ms: u64) -> BootPlan {
        let cause = self.power.wake_cause();
        let plan = BootPlan::new(cause, self.session.state());
        info!(
            "boot as {} (id {}), wake {:?}, {:?}, plan {:?}",
            self.mac,
            self.id,
            cause,
            self.session.state(),
            plan
        );

        match plan {
            BootPlan::Resleep => self.sleep(),
            BootPlan::Interactive => {
                self.bring_up_radio();
                self.resume(now_ms);
            }
            BootPlan::WakeupHandshake => {
                self.power.arm_timer_wake(self.config.timer_wake_ms);
                self.bring_up_radio();
                self.wakeup.open();
                self.send_to_controller(MessageType::WakeupRequest);
            }
        }
        plan
    }

    /// Closes the handshake window and resumes or sleeps depending on
    /// whether the controller replied in time. Returns whether it did.
    pub fn finish_wakeup(&mut self, now_ms: u64) -> bool {
        let accepted = self.wakeup.status().is_ok();
        self.wakeup.close();
        if accepted {
            info!("wakeup accepted, staying awake");
            self.resume(now_ms);
        } else {
            info!("no wakeup reply, back to sleep");
            self.sleep();
        }
        accepted
    }

    fn bring_up_radio(&mut self) {
        let _ = hal::ensure_peer(&mut self.radio, &BROADCAST_ADDRESS);
        let _ = self.session.register_controller(&mut self.radio);
    }

    fn resume(&mut self, now_ms: u64) {
        self.indicator.set_all(Color::OFF);
        if self.session.is_paired() {
            self.start_ping(now_ms);
        }
    }

    /// Handles one received frame.
    ///
    /// Only the first envelope addressed to this client is acted on.
    pub fn on_receive(&mut self, sender: MacAddress, frame: &[u8], now_ms: u64) {
        if self.asleep {
            return;
        }
        let Some(envelope) = message::find_addressed(frame, self.id) else {
            trace!("no envelope for {} in frame from {}", self.id, sender);
            return;
        };

        match envelope.message_type() {
            Some(MessageType::PairingAccepted) => {
                if self
                    .session
                    .on_accepted(sender, &mut self.radio, &mut self.storage)
                {
                    let _ = self.scheduler.cancel(&mut self.pairing_broadcast);
                    let _ = self.scheduler.cancel(&mut self.pairing_timeout);
                    self.indicator.set_all(Color::OFF);
                    self.start_ping(now_ms);
                }
            }
            Some(MessageType::PairingRemove) => {
                if self
                    .session
                    .on_remove(sender, &mut self.radio, &mut self.storage)
                {
                    let _ = self.scheduler.cancel(&mut self.pairing_broadcast);
                    let _ = self.scheduler.cancel(&mut self.pairing_timeout);
                    let _ = self.scheduler.cancel(&mut self.ping);
                    self.indicator.set_all(Color::OFF);
                }
            }
            Some(MessageType::WakeupAccepted) if self.from_controller(sender) => {
                if self.wakeup.accept() {
                    debug!("WAKEUP_ACCEPTED from {}", sender);
                } else {
                    debug!("late WAKEUP_ACCEPTED ignored");
                }
            }
            Some(MessageType::SetColor) if self.from_controller(sender) => {
                match Color::from_payload(envelope.payload) {
                    Some(color) => self.indicator.set_all(color),
                    None => debug!("short SET_COLOR payload dropped"),
                }
            }
            Some(MessageType::ResetColor) if self.from_controller(sender) => {
                self.indicator.set_all(Color::OFF);
            }
            kind => debug!("ignoring {:?} from {}", kind, sender),
        }
    }

    fn from_controller(&self, sender: MacAddress) -> bool {
        self.session.is_paired() && self.session.controller() == Some(sender)
    }

    fn run(&mut self, task: ClientTask, now_ms: u64) {
        match task {
            ClientTask::PairingBroadcast => {
                if !self.session.in_pairing_mode() {
                    return;
                }
                self.blink_on = !self.blink_on;
                self.indicator.set_all(if self.blink_on {
                    Color::PAIRING
                } else {
                    Color::OFF
                });
                let _ = hal::send_envelope(
                    &mut self.radio,
                    &BROADCAST_ADDRESS,
                    self.id,
                    MessageType::PairingRequest,
                    &[],
                );
            }
            ClientTask::PairingTimeout => {
                if self.session.on_timeout(&mut self.storage) {
                    info!("pairing timed out at {} ms", now_ms);
                    self.sleep();
                }
            }
            ClientTask::Ping => self.send_to_controller(MessageType::Ping),
        }
    }

    fn poll_button(&mut self, now_ms: u64) {
        match self.button.poll(now_ms) {
            Some(ButtonEvent::Pressed) if self.session.is_paired() => {
                debug!("buzzer pressed");
                self.send_to_controller(MessageType::BuzzerPressed);
            }
            Some(ButtonEvent::HoldElapsed) if !self.session.in_pairing_mode() => {
                self.enter_pairing(now_ms);
            }
            _ => {}
        }

        if self.button.state() == ButtonState::Unpressed
            && !self.session.in_pairing_mode()
            && self.button.idle_ms(now_ms) >= self.config.idle_sleep_ms as u64
        {
            debug!("idle for {} ms", self.button.idle_ms(now_ms));
            self.sleep();
        }
    }

    fn enter_pairing(&mut self, now_ms: u64) {
        if !self
            .session
            .enter_pairing_mode(self.id, &mut self.radio, &mut self.storage)
        {
            return;
        }
        let _ = self.scheduler.cancel(&mut self.ping);
        let _ = self.scheduler.cancel(&mut self.pairing_broadcast);
        let _ = self.scheduler.cancel(&mut self.pairing_timeout);
        self.blink_on = false;

        match self.scheduler.on_repeat(
            now_ms,
            self.config.pairing_broadcast_ms,
            ClientTask::PairingBroadcast,
        ) {
            Ok(handle) => self.pairing_broadcast = Some(handle),
            Err(e) => warn!("pairing broadcast not scheduled: {}", e),
        }
        match self.scheduler.on_delay(
            now_ms,
            self.config.pairing_timeout_ms,
            ClientTask::PairingTimeout,
        ) {
            Ok(handle) => self.pairing_timeout = Some(handle),
            Err(e) => warn!("pairing timeout not scheduled: {}", e),
        }
    }

    fn start_ping(&mut self, now_ms: u64) {
        if self.scheduler.is_scheduled(&self.ping) {
            return;
        }
        match self
            .scheduler
            .on_repeat(now_ms, self.config.ping_interval_ms, ClientTask::Ping)
        {
            Ok(handle) => self.ping = Some(handle),
            Err(e) => warn!("ping not scheduled: {}", e),
        }
    }

    fn send_to_controller(&mut self, kind: MessageType) {
        match self.session.controller() {
            Some(controller) => {
                let _ = hal::send_envelope(&mut self.radio, &controller, self.id, kind, &[]);
            }
            None => debug!("no controller for {:?}", kind),
        }
    }

    /// Drops all scheduled work and runs the deep-sleep sequence.
    ///
    /// The timer wake is armed only while paired.
    pub fn sleep(&mut self) {
        self.scheduler.clear();
        self.pairing_broadcast = None;
        self.pairing_timeout = None;
        self.ping = None;
        self.wakeup.close();
        let request = SleepRequest {
            button_pin: self.config.button_pin,
            wake_level: self.button.wake_level(),
            timer_wake_ms: self
                .session
                .is_paired()
                .then_some(self.config.timer_wake_ms),
        };
        self.asleep = true;
        power::enter_deep_sleep(&mut self.power, &mut self.indicator, request);
    }
}

impl<R, S, I, P, B> Receive for Client<R, S, I, P, B>
where
    R: Radio,
    S: Storage,
    I: Indicator,
    P: Power,
    B: InputPin,
{
    fn receive(&mut self, sender: MacAddress, frame: &[u8], now_ms: u64) {
        self.on_receive(sender, frame, now_ms);
    }
}

impl<R, S, I, P, B> Tick for Client<R, S, I, P, B>
where
    R: Radio,
    S: Storage,
    I: Indicator,
    P: Power,
    B: InputPin,
{
    fn tick(&mut self, now_ms: u64) {
        if self.asleep {
            return;
        }
        while let Some(task) = self.scheduler.pop_due(now_ms) {
            self.run(task, now_ms);
            if self.asleep {
                return;
            }
        }
        self.poll_button(now_ms);
    }
}

/// Waits, bounded, for the controller to answer a post-wake
/// `WAKEUP_REQUEST`, then resumes or sleeps the client.
///
/// The guard is taken only for each status poll, so the receive path can
/// deliver the reply in between; a reply landing during a poll is drained
/// when that poll lets go. Returns whether the client stays awake.
///
/// # Example
/// ```ignore
/// if CLIENT.lock(|c| c.boot(now_ms())) == Ok(BootPlan::WakeupHandshake) {
///     let _ = await_wakeup(&CLIENT, &mut delay, now_ms);
/// }
/// ```
pub fn await_wakeup<R, S, I, P, B, D>(
    guard: &Guard<Client<R, S, I, P, B>>,
    delay: &mut D,
    mut now_ms: impl FnMut() -> u64,
) -> bool
where
    R: Radio,
    S: Storage,
    I: Indicator,
    P: Power,
    B: InputPin,
    D: DelayNs,
{
    let Ok(budget_ms) = guard.lock(|client| client.config.wakeup_budget_ms) else {
        return false;
    };
    let _ = power::wait_bounded(delay, budget_ms, || {
        match guard.lock(|client| client.wakeup_status()) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(GuardError::Contended) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    });
    match guard.try_lock(delay, TICK_LOCK_BUDGET_MS, |client| {
        client.finish_wakeup(now_ms())
    }) {
        Ok(awake) => awake,
        Err(e) => {
            warn!("wakeup not finished: {}", e);
            false
        }
    }
}
