use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use heapless::{Deque, Vec};
use thiserror::Error;

use super::{Receive, Tick};
use crate::consts::{MAX_FRAME_LEN, RECEIVE_QUEUE_DEPTH};
use crate::identity::MacAddress;

/// Poll step of [`Guard::try_lock`] while the context is held elsewhere.
const POLL_STEP_US: u32 = 100;

/// Reasons a [`Guard`] could not hand out its context.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum GuardError {
    /// No context has been installed yet.
    #[error("no context installed")]
    Uninitialized,
    /// The other execution path kept the context past the wait budget.
    #[error("context held by another path")]
    Contended,
    /// The context was busy and the receive queue had no free slot.
    #[error("receive queue full, frame dropped")]
    QueueFull,
    /// The context was busy and the frame is too long to queue.
    #[error("frame too long to queue")]
    Oversized,
}

enum Slot<T> {
    Empty,
    Idle(T),
    Busy,
}

/// A frame parked until the holder of the context releases it.
struct Inbound {
    sender: MacAddress,
    frame: Vec<u8, MAX_FRAME_LEN>,
    now_ms: u64,
}

struct State<T> {
    slot: Slot<T>,
    inbox: Deque<Inbound, RECEIVE_QUEUE_DEPTH>,
}

/// Mutual exclusion around a device context.
///
/// The tick path and the radio receive callback may run in different
/// execution contexts. Both reach the context only through this guard, so no
/// scheduled action ever interleaves with the handling of a frame.
///
/// The context is moved out of a `critical_section` mutex for the duration of
/// a handler and moved back afterwards: the critical section only covers the
/// hand-over, interrupts stay enabled while the handler runs.
///
/// Nothing here ever waits on the holder of the context, which may be the
/// very execution context it preempted:
/// - [`Guard::deliver`] hands a frame to an idle context, or parks it in a
///   small queue that the holder drains before letting go of the context.
/// - [`Guard::try_lock`] and [`Guard::tick`] retry for a bounded budget, then
///   give up.
/// - [`Guard::lock`] makes a single attempt.
///
/// # Example
/// ```ignore
/// static CLIENT: Guard<MyClient> = Guard::new();
///
/// fn main() {
///     let _ = CLIENT.install(MyClient::new(..));
///     loop {
///         // Skips this round if the receive path holds the context
///         let _ = CLIENT.tick(&mut delay, TICK_LOCK_BUDGET_MS, now_ms());
///     }
/// }
///
/// fn on_receive(mac: &[u8; 6], data: &[u8]) {
///     let _ = CLIENT.deliver(MacAddress(*mac), data, now_ms());
/// }
/// ```
pub struct Guard<T> {
    state: Mutex<RefCell<State<T>>>,
}

impl<T> Guard<T> {
    /// Creates an empty guard, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                slot: Slot::Empty,
                inbox: Deque::new(),
            })),
        }
    }

    /// Installs `context`, returning the previously idle one if any.
    ///
    /// Install before registering the radio receive callback.
    pub fn install(&self, context: T) -> Option<T> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match core::mem::replace(&mut state.slot, Slot::Idle(context)) {
                Slot::Idle(previous) => Some(previous),
                _ => None,
            }
        })
    }

    /// Removes the context if it is idle.
    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match core::mem::replace(&mut state.slot, Slot::Empty) {
                Slot::Idle(context) => Some(context),
                other => {
                    state.slot = other;
                    None
                }
            }
        })
    }

    /// Whether a context is installed, idle or busy.
    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| !matches!(self.state.borrow_ref(cs).slot, Slot::Empty))
    }

    /// Frames parked behind the current holder.
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).inbox.len())
    }
}

impl<T: Receive> Guard<T> {
    fn acquire(&self) -> Result<T, GuardError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match core::mem::replace(&mut state.slot, Slot::Busy) {
                Slot::Idle(context) => Ok(context),
                Slot::Busy => Err(GuardError::Contended),
                Slot::Empty => {
                    state.slot = Slot::Empty;
                    Err(GuardError::Uninitialized)
                }
            }
        })
    }

    /// Hands the context back, first feeding it every frame parked while it
    /// was held. The queue check and the hand-back are one critical section,
    /// so a frame is either drained here or finds the context idle.
    fn release(&self, mut context: T) {
        loop {
            let parked = critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                match state.inbox.pop_front() {
                    Some(inbound) => Some((context, inbound)),
                    None => {
                        state.slot = Slot::Idle(context);
                        None
                    }
                }
            });
            let Some((held, inbound)) = parked else {
                return;
            };
            context = held;
            trace!("draining frame from {}", inbound.sender);
            context.receive(inbound.sender, &inbound.frame, inbound.now_ms);
        }
    }

    fn run<R>(&self, mut context: T, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut context);
        self.release(context);
        result
    }

    /// Hands a received frame to the context.
    ///
    /// Used by the radio receive callback. An idle context handles the frame
    /// right away. A busy one gets it queued, and its holder handles it
    /// before releasing the context. This call never waits.
    ///
    /// Fails only if the frame can be neither handled nor queued.
    pub fn deliver(&self, sender: MacAddress, frame: &[u8], now_ms: u64) -> Result<(), GuardError> {
        let claimed: Result<Option<T>, GuardError> = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match core::mem::replace(&mut state.slot, Slot::Busy) {
                Slot::Idle(context) => Ok(Some(context)),
                Slot::Busy => {
                    let frame = Vec::from_slice(frame).map_err(|_| GuardError::Oversized)?;
                    state
                        .inbox
                        .push_back(Inbound {
                            sender,
                            frame,
                            now_ms,
                        })
                        .map_err(|_| GuardError::QueueFull)?;
                    Ok(None)
                }
                Slot::Empty => {
                    state.slot = Slot::Empty;
                    Err(GuardError::Uninitialized)
                }
            }
        });

        match claimed {
            Ok(Some(mut context)) => {
                context.receive(sender, frame, now_ms);
                self.release(context);
                Ok(())
            }
            Ok(None) => {
                trace!("frame from {} queued behind the holder", sender);
                Ok(())
            }
            Err(e) => {
                warn!("frame from {} dropped: {}", sender, e);
                Err(e)
            }
        }
    }

    /// Runs `f` on the context if no other path holds it. Never waits.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, GuardError> {
        let context = self.acquire()?;
        Ok(self.run(context, f))
    }

    /// Runs `f` on the context, waiting at most `budget_ms` for it.
    ///
    /// Used by the tick path, which must never block the main loop.
    pub fn try_lock<D: DelayNs, R>(
        &self,
        delay: &mut D,
        budget_ms: u32,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, GuardError> {
        let budget_us = budget_ms.saturating_mul(1_000);
        let mut waited_us = 0u32;
        loop {
            match self.acquire() {
                Ok(context) => return Ok(self.run(context, f)),
                Err(GuardError::Contended) if waited_us < budget_us => {
                    delay.delay_us(POLL_STEP_US);
                    waited_us += POLL_STEP_US;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: Tick + Receive> Guard<T> {
    /// Ticks the context, or skips this round if it stays busy for `budget_ms`.
    pub fn tick<D: DelayNs>(
        &self,
        delay: &mut D,
        budget_ms: u32,
        now_ms: u64,
    ) -> Result<(), GuardError> {
        self.try_lock(delay, budget_ms, |context| context.tick(now_ms))
    }
}

impl<T> core::fmt::Debug for Guard<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Guard")
            .field("installed", &self.is_installed())
            .field("queued", &self.queued())
            .finish()
    }
}

impl<T> Default for Guard<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;

    const PEER: MacAddress = MacAddress([2, 0, 0, 0, 0, 7]);

    #[derive(Debug, Default)]
    struct Counter {
        ticks: u32,
        last_ms: u64,
        frames: std::vec::Vec<(u32, std::vec::Vec<u8>)>,
    }

    impl Tick for Counter {
        fn tick(&mut self, now_ms: u64) {
            self.ticks += 1;
            self.last_ms = now_ms;
        }
    }

    impl Receive for Counter {
        fn receive(&mut self, _sender: MacAddress, frame: &[u8], now_ms: u64) {
            self.last_ms = now_ms;
            // Records how many ticks ran before the frame was handled
            self.frames.push((self.ticks, frame.to_vec()));
        }
    }

    #[test]
    fn test_empty_guard_reports_uninitialized() {
        let guard: Guard<Counter> = Guard::new();
        assert!(!guard.is_installed());
        assert_eq!(guard.lock(|_| ()), Err(GuardError::Uninitialized));
        assert_eq!(
            guard.tick(&mut NoopDelay::new(), 10, 0),
            Err(GuardError::Uninitialized)
        );
        assert_eq!(guard.deliver(PEER, &[1], 0), Err(GuardError::Uninitialized));
    }

    #[test]
    fn test_tick_runs_on_installed_context() {
        let guard = Guard::new();
        assert!(guard.install(Counter::default()).is_none());

        guard.tick(&mut NoopDelay::new(), 10, 42).unwrap();
        assert_eq!(guard.lock(|c| (c.ticks, c.last_ms)), Ok((1, 42)));
    }

    #[test]
    fn test_tick_skipped_while_context_is_held() {
        let guard = Guard::new();
        let _ = guard.install(Counter::default());

        let nested = guard.lock(|_| guard.tick(&mut NoopDelay::new(), 1, 5));
        assert_eq!(nested, Ok(Err(GuardError::Contended)));
        assert_eq!(guard.lock(|c| c.ticks), Ok(0));
    }

    #[test]
    fn test_lock_inside_held_context_returns_at_once() {
        let guard = Guard::new();
        let _ = guard.install(Counter::default());

        let nested = guard.try_lock(&mut NoopDelay::new(), 10, |_| guard.lock(|c| c.ticks += 1));
        assert_eq!(nested, Ok(Err(GuardError::Contended)));
        assert_eq!(guard.lock(|c| c.ticks), Ok(0));
    }

    #[test]
    fn test_frame_arriving_during_tick_runs_after_it() {
        let guard = Guard::new();
        let _ = guard.install(Counter::default());

        let during = guard.try_lock(&mut NoopDelay::new(), 10, |c| {
            c.tick(100);
            let delivered = guard.deliver(PEER, &[0xAB], 101);
            (delivered, c.frames.len(), guard.queued())
        });
        assert_eq!(during, Ok((Ok(()), 0, 1)));

        assert_eq!(guard.queued(), 0);
        let frames = guard.lock(|c| c.frames.clone()).unwrap();
        assert_eq!(frames, [(1, vec![0xAB])]);
    }

    #[test]
    fn test_full_queue_drops_extra_frames() {
        let guard = Guard::new();
        let _ = guard.install(Counter::default());

        let results = guard
            .lock(|_| {
                let mut results = std::vec::Vec::new();
                for i in 0..=RECEIVE_QUEUE_DEPTH as u8 {
                    results.push(guard.deliver(PEER, &[i], 0));
                }
                results.push(guard.deliver(PEER, &[0; MAX_FRAME_LEN + 1], 0));
                results
            })
            .unwrap();
        assert!(results[..RECEIVE_QUEUE_DEPTH].iter().all(Result::is_ok));
        assert_eq!(results[RECEIVE_QUEUE_DEPTH], Err(GuardError::QueueFull));
        assert_eq!(results[RECEIVE_QUEUE_DEPTH + 1], Err(GuardError::Oversized));

        let handled: std::vec::Vec<u8> = guard
            .lock(|c| c.frames.iter().map(|(_, f)| f[0]).collect())
            .unwrap();
        assert_eq!(handled, [0, 1, 2, 3]);
    }

    #[test]
    fn test_take_returns_idle_context() {
        let guard = Guard::new();
        let _ = guard.install(Counter {
            ticks: 7,
            ..Counter::default()
        });
        assert_eq!(guard.take().map(|c| c.ticks), Some(7));
        assert!(guard.take().is_none());
    }

    #[test]
    fn test_receive_from_other_thread_never_waits_for_holder() {
        use std::sync::{Arc, mpsc};
        use std::thread;
        use std::time::Duration;

        let guard = Arc::new(Guard::new());
        let _ = guard.install(Counter::default());

        let (held_tx, held_rx) = mpsc::channel();
        let (queued_tx, queued_rx) = mpsc::channel();
        let holder = Arc::clone(&guard);
        let handle = thread::spawn(move || {
            holder
                .try_lock(&mut NoopDelay::new(), 10, |c| {
                    held_tx.send(()).unwrap();
                    // Keeps the context until the frame is parked
                    queued_rx.recv_timeout(Duration::from_secs(5)).unwrap();
                    c.tick(10);
                })
                .unwrap();
        });
        held_rx.recv().unwrap();

        assert_eq!(guard.deliver(PEER, &[9], 11), Ok(()));
        queued_tx.send(()).unwrap();
        handle.join().unwrap();

        let frames = guard.lock(|c| c.frames.clone()).unwrap();
        assert_eq!(frames, [(1, vec![9])]);
    }
}
