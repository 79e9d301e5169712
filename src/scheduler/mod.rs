//! Cooperative scheduler and the lock that serializes it with the radio.
//!
//! Each device runs one [`Scheduler`] inside its context object. Scheduled
//! work is data, not closures: a deadline, an optional period and an action
//! value that the owning context dispatches on its next tick. Nothing runs
//! behind the context's back, so every action sees the same state the receive
//! path does.
//!
//! Contains:
//! - [`Scheduler`]: one-shot and repeating actions, cancellable by [`Handle`]
//! - [`Guard`]: the context lock shared by the tick path and the receive path
//! - [`run_tick_loop`]: blocking loop driving a guarded context
//! - `declare_context!`: declares a static [`Guard`] for platform glue
//!
//! | Path           | Entry point                         | On contention                      |
//! |----------------|-------------------------------------|------------------------------------|
//! | tick           | [`Guard::tick`], bounded wait       | tick skipped                       |
//! | radio receive  | [`Guard::deliver`], never waits     | frame queued, run by the holder    |

mod delay;
pub use delay::*;

mod guard;
pub use guard::*;

mod macros;

use crate::error::{Error, Result};
use crate::identity::MacAddress;

/// A context that advances its scheduled work on every tick.
pub trait Tick {
    /// Runs every action due at `now_ms`, in deadline order.
    fn tick(&mut self, now_ms: u64);
}

/// A context fed with radio frames through [`Guard::deliver`].
pub trait Receive {
    /// Handles one frame received from `sender`.
    fn receive(&mut self, sender: MacAddress, frame: &[u8], now_ms: u64);
}

/// Reference to a scheduled action.
///
/// A handle stays valid until its action is cancelled or, for one-shot
/// actions, fired. Stale handles never match a reused slot.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Handle {
    slot: u8,
    generation: u16,
}

#[derive(Clone, Copy, Debug)]
struct Task<A> {
    action: A,
    due_ms: u64,
    period_ms: Option<u32>,
    generation: u16,
}

/// Fixed-capacity cooperative scheduler.
///
/// `A` is the action type of the owning context, `N` the number of slots.
#[derive(Debug)]
pub struct Scheduler<A: Copy, const N: usize> {
    slots: [Option<Task<A>>; N],
    generation: u16,
}

impl<A: Copy, const N: usize> Scheduler<A, N> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            slots: [None; N],
            generation: 0,
        }
    }

    /// Schedules `action` once, `delay_ms` after `now_ms`.
    pub fn on_delay(&mut self, now_ms: u64, delay_ms: u32, action: A) -> Result<Handle> {
        self.insert(now_ms + delay_ms as u64, None, action)
    }

    /// Schedules `action` every `period_ms`, first run one period after `now_ms`.
    pub fn on_repeat(&mut self, now_ms: u64, period_ms: u32, action: A) -> Result<Handle> {
        let period_ms = period_ms.max(1);
        self.insert(now_ms + period_ms as u64, Some(period_ms), action)
    }

    fn insert(&mut self, due_ms: u64, period_ms: Option<u32>, action: A) -> Result<Handle> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::SchedulerFull)?;
        self.generation = self.generation.wrapping_add(1);
        self.slots[slot] = Some(Task {
            action,
            due_ms,
            period_ms,
            generation: self.generation,
        });
        Ok(Handle {
            slot: slot as u8,
            generation: self.generation,
        })
    }

    fn task_index(&self, handle: Handle) -> Option<usize> {
        let index = handle.slot as usize;
        match self.slots.get(index)? {
            Some(task) if task.generation == handle.generation => Some(index),
            _ => None,
        }
    }

    /// Cancels the action behind `handle` and clears the handle.
    ///
    /// Cancelling an empty, fired or already-cancelled handle is a no-op.
    /// Returns whether an action was actually removed.
    pub fn cancel(&mut self, handle: &mut Option<Handle>) -> bool {
        let Some(h) = handle.take() else {
            return false;
        };
        match self.task_index(h) {
            Some(index) => {
                self.slots[index] = None;
                true
            }
            None => false,
        }
    }

    /// Whether `handle` still refers to a pending action.
    pub fn is_scheduled(&self, handle: &Option<Handle>) -> bool {
        handle.is_some_and(|h| self.task_index(h).is_some())
    }

    /// Number of pending actions.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Earliest deadline among pending actions.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|task| task.due_ms).min()
    }

    /// Removes every pending action.
    pub fn clear(&mut self) {
        self.slots = [None; N];
    }

    /// Takes the earliest action due at `now_ms`.
    ///
    /// Repeating actions are re-armed one period later; if the tick ran late
    /// by more than a period, the next run is one period after `now_ms`
    /// rather than a burst of catch-up runs. One-shot actions are removed.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<A> {
        let (index, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|task| (i, task.due_ms)))
            .filter(|(_, due)| *due <= now_ms)
            .min_by_key(|(_, due)| *due)?;

        let task = self.slots[index]?;
        match task.period_ms {
            Some(period) => {
                let mut next_ms = task.due_ms + period as u64;
                if next_ms <= now_ms {
                    next_ms = now_ms + period as u64;
                }
                self.slots[index] = Some(Task {
                    due_ms: next_ms,
                    ..task
                });
            }
            None => self.slots[index] = None,
        }
        Some(task.action)
    }
}

impl<A: Copy, const N: usize> Default for Scheduler<A, N> {
    fn default() -> Self {
        Self::new()
    }
}
