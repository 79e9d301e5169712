use embedded_hal::delay::DelayNs;

use super::{Guard, GuardError, Receive, Tick};

/// Runs a blocking loop that ticks a guarded context at a fixed period.
///
/// This is the main loop of a device without an RTOS task model. Each round
/// reads the clock, ticks the context through [`Guard::tick`] and sleeps for
/// `period_us`. A round where the receive path keeps the context past
/// `budget_ms` is skipped and retried on the next one.
///
/// # Arguments
/// - `guard`: The guard holding the device context
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL
/// - `now_ms`: Monotonic millisecond clock
/// - `budget_ms`: Bounded wait for the context lock, usually
///   [`TICK_LOCK_BUDGET_MS`](crate::consts::TICK_LOCK_BUDGET_MS)
/// - `period_us`: Pause between rounds, in microseconds
///
/// # Example
/// ```ignore
/// let _ = CLIENT.install(client);
/// buzzlink::scheduler::run_tick_loop(
///     &CLIENT,
///     &mut delay,
///     || clock.now_ms(),
///     TICK_LOCK_BUDGET_MS,
///     1_000,
/// );
/// ```
///
/// # Notes
/// - This loop never returns. A client that enters deep sleep stops inside
///   its tick; hosts whose sleep returns see no further work done by ticks.
/// - An uninstalled guard is ticked anyway: every round reports
///   [`GuardError::Uninitialized`] and is skipped.
pub fn run_tick_loop<T, D, C>(
    guard: &Guard<T>,
    delay: &mut D,
    mut now_ms: C,
    budget_ms: u32,
    period_us: u32,
) -> !
where
    T: Tick + Receive,
    D: DelayNs,
    C: FnMut() -> u64,
{
    loop {
        match guard.tick(delay, budget_ms, now_ms()) {
            Ok(()) => {}
            Err(GuardError::Contended) => trace!("tick skipped, context busy"),
            Err(e) => trace!("tick skipped: {}", e),
        }
        delay.delay_us(period_us);
    }
}
