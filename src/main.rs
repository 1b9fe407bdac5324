//! # rrkernel demo firmware
//!
//! Four tasks exercising every path through the scheduler:
//!
//! | Task | Behavior |
//! |------|----------|
//! | `counter_task` | Busy loop preempted by the tick, naps every 200k turns |
//! | `sleeper_task` | Sleeps 500 ticks between reports |
//! | `waiter_task` | Blocks itself until `notifier_task` releases it |
//! | `notifier_task` | Every second: unblocks the waiter, logs statistics |
//!
//! Most ticks find only the counter Ready, so it keeps the CPU. While it
//! naps and every other task is blocked or asleep, the idle context runs
//! `wfi`.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_halt as _;

use rrkernel::kernel;

const WAITER_ID: usize = 2;

static COUNTER: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Never yields between naps. Only the tick takes the CPU away from it.
extern "C" fn counter_task() -> ! {
    loop {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        if n % 200_000 == 0 {
            kernel::sleep(10);
        }
    }
}

extern "C" fn sleeper_task() -> ! {
    let mut wakeups: u32 = 0;
    loop {
        kernel::sleep(500);
        wakeups = wakeups.wrapping_add(1);
        defmt::info!("sleeper: wake-up #{}", wakeups);
    }
}

extern "C" fn waiter_task() -> ! {
    loop {
        kernel::block_current();
        defmt::info!("waiter: released");
    }
}

extern "C" fn notifier_task() -> ! {
    loop {
        kernel::sleep(1000);
        if kernel::unblock(WAITER_ID) {
            defmt::debug!("notifier: released task {}", WAITER_ID);
        }
        let stats = kernel::stats();
        defmt::info!(
            "ticks={} switches={} overruns={} idle={} counter={}",
            stats.ticks,
            stats.switches,
            stats.overruns,
            stats.idle_selections,
            COUNTER.load(Ordering::Relaxed)
        );
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let Some(cp) = cortex_m::Peripherals::take() else {
        defmt::error!("core peripherals already taken");
        halt();
    };

    if let Err(err) = kernel::init([counter_task, sleeper_task, waiter_task, notifier_task]) {
        // The tick is still off: halt before anything runs on a bad layout.
        defmt::error!("kernel init failed: {}", err);
        halt();
    }

    kernel::start(cp)
}

fn halt() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}
