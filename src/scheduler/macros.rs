/// Declares a static [`Guard`](crate::scheduler::Guard) holding a device context.
///
/// Platform glue needs the context reachable from both the main loop and the
/// radio receive callback, which is usually a plain `fn` without captures.
///
/// # Arguments
/// - `$name`: Name of the static
/// - `$ty`: The concrete context type, e.g. a fully-typed `Client<..>`
///
/// # Example
/// ```ignore
/// declare_context!(CLIENT, Client<EspNow, Nvs, Strip, Sleep, ButtonPin>);
///
/// fn on_receive(mac: &[u8; 6], data: &[u8]) {
///     let _ = CLIENT.deliver(MacAddress(*mac), data, now_ms());
/// }
/// ```
#[macro_export]
macro_rules! declare_context {
    ( $name:ident, $ty:ty ) => {
        pub static $name: $crate::scheduler::Guard<$ty> = $crate::scheduler::Guard::new();
    };
}

/// Ticks a context declared with `declare_context!`, skipping the round on
/// contention.
///
/// Intended for a timer ISR or RTOS task that advances the device at a fixed
/// rate. Evaluates to the [`Result`] of [`Guard::tick`](crate::scheduler::Guard::tick).
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM2() {
///     let _ = tick_context!(CLIENT, &mut delay, TICK_LOCK_BUDGET_MS, now_ms());
/// }
/// ```
#[macro_export]
macro_rules! tick_context {
    ( $name:ident, $delay:expr, $budget_ms:expr, $now_ms:expr ) => {
        $name.tick($delay, $budget_ms, $now_ms)
    };
}
