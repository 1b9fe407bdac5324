//! # Scheduler
//!
//! Strict round-robin over the fixed task table, with an idle context as
//! the fallback when every task is Blocked.
//!
//! ## Switch protocol
//!
//! Every tick (and every voluntary yield, block or sleep) requests a switch.
//! The task-facing operations request it through the [`Port`] before they
//! return, so the request and the state change it acts on are made under
//! the same critical section. The trampoline then hands the outgoing context's live stack pointer to
//! [`Scheduler::switch`], which:
//!
//! 1. stores it in the outgoing TCB and marks it Ready, unless the context
//!    blocked itself, in which case it stays Blocked;
//! 2. walks the table in index order, starting after the last task that
//!    ran and wrapping at `MAX_TASKS`, for the first Ready task, falling
//!    back to the idle context;
//! 3. marks the chosen context Running and returns its saved stack pointer.
//!
//! Selection is position-based: an unblocked task rejoins the cycle at its
//! own index, not at the back of a queue.
//!
//! ## Overruns
//!
//! SysTick latches at most one pending tick. Periods that wrap while a tick
//! is already pending are merged into it, and the arch layer reports them
//! to [`Scheduler::on_tick`] as *missed*. The policy is *skip*: missed
//! periods still advance the tick count, so sleep deadlines hold, and are
//! added to `SchedulerStats::overruns`, but only one switch is requested
//! for the whole batch.
//!
//! Nothing here touches hardware. The kernel serializes calls with a
//! critical section, and the trampoline runs with interrupts masked.

use crate::config::MAX_TASKS;
use crate::context::TaskEntry;
use crate::error::Fault;
use crate::layout::SystemLayout;
use crate::port::Port;
use crate::task::{TaskControlBlock, TaskState};

/// Identifies a schedulable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum ContextId {
    /// A user task, by table index.
    Task(usize),
    /// The scheduler's own idle context.
    Idle,
}

/// Counters a diagnostic layer can poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub struct SchedulerStats {
    /// Ticks observed since launch.
    pub ticks: u64,
    /// Completed switch decisions (including a context switching to itself).
    pub switches: u64,
    /// Tick periods merged into an already-pending tick.
    pub overruns: u64,
    /// Times the idle context was selected.
    pub idle_selections: u64,
}

pub struct Scheduler {
    tasks: [TaskControlBlock; MAX_TASKS],
    idle: TaskControlBlock,
    /// Context that owns the CPU; `None` until [`launch`](Self::launch).
    current: Option<ContextId>,
    /// Index of the last task selected; the round-robin walk starts after it.
    cursor: usize,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Build every TCB and write each context's initial frame.
    ///
    /// Task `i` gets stack region `i`; the idle context gets the lowest
    /// region. All tasks start Ready; task 0 is the first to run.
    pub fn new<P: Port>(
        entries: [TaskEntry; MAX_TASKS],
        idle_entry: TaskEntry,
        layout: &SystemLayout,
        port: &mut P,
    ) -> Self {
        let regions = layout.regions();
        let tasks = core::array::from_fn(|i| {
            let mut tcb = TaskControlBlock::new(ContextId::Task(i), regions[i], entries[i]);
            tcb.prepare(port);
            trace!("task {} stack top {:#x} sp {:#x}", i, regions[i].top(), tcb.saved_sp());
            tcb
        });

        let mut idle = TaskControlBlock::new(ContextId::Idle, layout.idle_region(), idle_entry);
        idle.prepare(port);

        Self {
            tasks,
            idle,
            current: None,
            cursor: MAX_TASKS - 1,
            stats: SchedulerStats::default(),
        }
    }

    /// Select the first context and return its saved stack pointer.
    ///
    /// Nothing is saved: the code calling this never resumes.
    pub fn launch(&mut self) -> Result<usize, Fault> {
        if self.current.is_some() {
            return Err(Fault::AlreadyStarted);
        }
        let next = self.select_next();
        self.activate(next)
    }

    /// Account for one tick handler entry. Returns whether a switch should
    /// be requested.
    ///
    /// `missed` is the number of periods the hardware merged into this one.
    /// They count as ticks and as overruns. Sleepers whose wake tick has
    /// arrived become Ready first, so they take part in this tick's
    /// selection.
    pub fn on_tick(&mut self, missed: u32) -> bool {
        if self.current.is_none() {
            return false;
        }

        let elapsed = 1 + u64::from(missed);
        self.stats.ticks = self.stats.ticks.wrapping_add(elapsed);
        let now = self.stats.ticks;
        if missed > 0 {
            self.stats.overruns = self.stats.overruns.wrapping_add(u64::from(missed));
            warn!("tick {}: {} period(s) overrun ({} total)", now, missed, self.stats.overruns);
        }

        for tcb in self.tasks.iter_mut() {
            if tcb.wake_if_due(now) {
                trace!("task {:?} woke at tick {}", tcb.id, now);
            }
        }
        true
    }

    /// Perform one switch decision.
    ///
    /// `live_sp` is where the trampoline left the outgoing context's saved
    /// registers. Returns the stack pointer of the context to restore.
    pub fn switch(&mut self, live_sp: usize) -> Result<usize, Fault> {
        let prev = self.current.ok_or(Fault::NotStarted)?;
        self.context_mut(prev).suspend(live_sp)?;

        let next = self.select_next();
        self.activate(next)
    }

    /// Round-robin walk: first Ready task after `cursor`, else idle.
    fn select_next(&self) -> ContextId {
        (1..=MAX_TASKS)
            .map(|step| (self.cursor + step) % MAX_TASKS)
            .find(|&i| self.tasks[i].is_ready())
            .map_or(ContextId::Idle, ContextId::Task)
    }

    fn activate(&mut self, next: ContextId) -> Result<usize, Fault> {
        let sp = self.context_mut(next).resume()?;
        match next {
            ContextId::Task(i) => self.cursor = i,
            ContextId::Idle => {
                self.stats.idle_selections = self.stats.idle_selections.wrapping_add(1)
            }
        }
        self.current = Some(next);
        self.stats.switches = self.stats.switches.wrapping_add(1);
        Ok(sp)
    }

    fn context_mut(&mut self, id: ContextId) -> &mut TaskControlBlock {
        match id {
            ContextId::Task(i) => &mut self.tasks[i],
            ContextId::Idle => &mut self.idle,
        }
    }

    fn task_mut(&mut self, id: usize) -> Result<&mut TaskControlBlock, Fault> {
        self.tasks.get_mut(id).ok_or(Fault::InvalidTask(id))
    }

    fn current_task(&self) -> Result<usize, Fault> {
        match self.current {
            Some(ContextId::Task(i)) => Ok(i),
            Some(ContextId::Idle) => Err(Fault::IdleCannotBlock),
            None => Err(Fault::NotStarted),
        }
    }

    // -----------------------------------------------------------------------
    // Task-facing operations. Those that give up the CPU pend the switch on
    // `port` before returning.
    // -----------------------------------------------------------------------

    /// Voluntary yield. The running task stays eligible; the next switch
    /// marks it Ready and moves on to the following index.
    pub fn yield_current<P: Port>(&mut self, port: &mut P) -> Result<(), Fault> {
        self.current.ok_or(Fault::NotStarted)?;
        port.pend_switch();
        Ok(())
    }

    /// The running task blocks itself until [`unblock`](Self::unblock).
    pub fn block_current<P: Port>(&mut self, port: &mut P) -> Result<usize, Fault> {
        let id = self.current_task()?;
        self.tasks[id].block(None);
        port.pend_switch();
        debug!("task {} blocked", id);
        Ok(id)
    }

    /// The running task sleeps for `ticks` ticks. `0` is a plain yield.
    pub fn sleep_current<P: Port>(&mut self, ticks: u32, port: &mut P) -> Result<(), Fault> {
        let id = self.current_task()?;
        if ticks > 0 {
            let wake_at = self.stats.ticks.wrapping_add(u64::from(ticks));
            self.tasks[id].block(Some(wake_at));
            trace!("task {} sleeping until tick {}", id, wake_at);
        }
        port.pend_switch();
        Ok(())
    }

    /// Block task `id` on behalf of an external event source.
    ///
    /// Returns whether `id` is the running task, in which case a switch has
    /// been pended.
    pub fn block<P: Port>(&mut self, id: usize, port: &mut P) -> Result<bool, Fault> {
        self.task_mut(id)?.block(None);
        debug!("task {} blocked externally", id);
        let is_current = self.current == Some(ContextId::Task(id));
        if is_current {
            port.pend_switch();
        }
        Ok(is_current)
    }

    /// Make a Blocked task Ready again, cancelling any pending wake-up.
    /// Returns whether the state changed.
    pub fn unblock(&mut self, id: usize) -> Result<bool, Fault> {
        let changed = self.task_mut(id)?.unblock();
        if changed {
            debug!("task {} unblocked", id);
        }
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn current(&self) -> Option<ContextId> {
        self.current
    }

    pub fn task(&self, id: usize) -> Option<&TaskControlBlock> {
        self.tasks.get(id)
    }

    pub fn idle(&self) -> &TaskControlBlock {
        &self.idle
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// State of every task, in index order.
    pub fn states(&self) -> [TaskState; MAX_TASKS] {
        core::array::from_fn(|i| self.tasks[i].state)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
