//! # Kernel
//!
//! Owns the single scheduler instance and exposes the public API. Every
//! access goes through a critical section; task stacks are reachable only
//! through the scheduler.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init(entries)  ← lay out stacks, write initial frames
//!         └─► kernel::start(cp)      ← no return
//!               ├─► SysTick / PendSV priorities
//!               ├─► DWT cycle counter
//!               ├─► SysTick at TICK_HZ
//!               └─► svc 0 → SVCall → first context (task 0)
//! ```
//!
//! Any [`Fault`] reported by the scheduler ends in [`fatal`].

use crate::arch::cortex_m4::{self, CortexM4};
use crate::config::{
    MAX_TASKS, SIZE_SRAM, SIZE_TASK_STACK, SRAM_START, TICK_HZ, TICK_PERIOD_CYCLES,
};
use crate::context::TaskEntry;
use crate::error::{ConfigError, Fault};
use crate::layout::{MemoryRange, SystemLayout};
use crate::port::Port;
use crate::scheduler::{ContextId, Scheduler, SchedulerStats};
use crate::sync::Shared;
use crate::tick::TickClock;

static SCHEDULER: Shared<Scheduler> = Shared::new();
static TICK_CLOCK: Shared<TickClock> = Shared::new();

/// Run a scheduler operation, halting on a fault.
fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> Result<R, Fault>) -> R {
    match SCHEDULER.with(f) {
        Some(Ok(value)) => value,
        Some(Err(fault)) => fatal(fault),
        None => fatal(Fault::NotInitialized),
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Lay out the stack regions and build every context. Call exactly once,
/// before [`start`].
///
/// On `Err` nothing has been written and the tick must not be enabled.
pub fn init(entries: [TaskEntry; MAX_TASKS]) -> Result<(), ConfigError> {
    if SCHEDULER.with(|_| ()).is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }

    let layout = SystemLayout::compute(MemoryRange::new(SRAM_START, SIZE_SRAM), SIZE_TASK_STACK)?;
    for (i, region) in layout.regions().iter().enumerate() {
        debug!(
            "region {}: {:#x}..{:#x}",
            i,
            region.bottom(),
            region.top()
        );
    }

    let scheduler = Scheduler::new(entries, cortex_m4::idle_loop, &layout, &mut CortexM4);
    SCHEDULER
        .install(scheduler)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    info!("kernel initialized: {} tasks, {} byte stacks", MAX_TASKS, SIZE_TASK_STACK);
    Ok(())
}

/// Enable the tick and enter the first task. **Does not return.**
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    if SCHEDULER.with(|_| ()).is_none() {
        fatal(Fault::NotInitialized);
    }
    if TICK_CLOCK.install(TickClock::new(TICK_PERIOD_CYCLES)).is_err() {
        fatal(Fault::AlreadyStarted);
    }

    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);
    cortex_m4::enable_cycle_counter(&mut core_peripherals.DCB, &mut core_peripherals.DWT);
    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    info!("scheduler starting at {} Hz", TICK_HZ);

    cortex_m4::start_first_context()
}

// ---------------------------------------------------------------------------
// Handler entry points
// ---------------------------------------------------------------------------

/// SysTick body: account for the tick, including any periods merged into
/// it, and request a switch.
///
/// `now` is the cycle counter at entry and `since_wrap` how far SysTick has
/// counted since its last reload.
pub(crate) fn on_tick(now: u32, since_wrap: u32) {
    let missed = TICK_CLOCK
        .with(|clock| clock.missed_periods(now, since_wrap))
        .unwrap_or(0);
    SCHEDULER.with(|s| {
        if s.on_tick(missed) {
            CortexM4.pend_switch();
        }
    });
}

/// PendSV body: save `live_sp`, pick the next context, return its stack.
pub(crate) fn switch_context(live_sp: usize) -> usize {
    with_scheduler(|s| s.switch(live_sp))
}

/// SVCall body: stack pointer of the first context.
pub(crate) fn launch() -> usize {
    let sp = with_scheduler(|s| s.launch());
    debug!("launching first context at sp {:#x}", sp);
    sp
}

// ---------------------------------------------------------------------------
// Task API
// ---------------------------------------------------------------------------

// The switch is pended inside the same critical section as the state
// change; PendSV runs the moment the section ends, ahead of any tick.

/// Give up the CPU until the task's next turn in the cycle.
pub fn yield_now() {
    with_scheduler(|s| s.yield_current(&mut CortexM4));
}

/// Block the calling task until another context calls [`unblock`].
pub fn block_current() {
    with_scheduler(|s| s.block_current(&mut CortexM4));
}

/// Sleep for at least `ticks` ticks. `sleep(0)` is a yield.
pub fn sleep(ticks: u32) {
    with_scheduler(|s| s.sleep_current(ticks, &mut CortexM4));
}

/// Block task `id` from outside. Switches away at once if it is the caller.
pub fn block(id: usize) {
    with_scheduler(|s| s.block(id, &mut CortexM4));
}

/// Make task `id` Ready again. Returns whether it was Blocked.
///
/// The task resumes at its own position in the cycle; no switch is forced.
pub fn unblock(id: usize) -> bool {
    with_scheduler(|s| s.unblock(id))
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Snapshot of the scheduler counters (zero before `init`).
pub fn stats() -> SchedulerStats {
    SCHEDULER.with(|s| s.stats()).unwrap_or_default()
}

/// The context currently owning the CPU.
pub fn current() -> Option<ContextId> {
    SCHEDULER.with(|s| s.current()).flatten()
}

/// Report an unrecoverable condition and halt.
pub fn fatal(fault: Fault) -> ! {
    cortex_m::interrupt::disable();
    error!("fatal: {}", fault);
    panic!("{}", fault)
}
