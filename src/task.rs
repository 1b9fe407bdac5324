//! # Task Control Block
//!
//! Per-context metadata owned by the scheduler. TCBs are created once by
//! [`Scheduler::new`](crate::scheduler::Scheduler::new) and live for the
//! lifetime of the system; only `state`, the saved stack pointer and the
//! wake-up tick change afterwards, and only inside the scheduler.

use crate::context::{init_context, TaskEntry};
use crate::error::Fault;
use crate::layout::StackRegion;
use crate::port::Port;
use crate::scheduler::ContextId;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a context.
///
/// ```text
///   ┌──────────┐    selected     ┌─────────┐
///   │  Ready   │ ──────────────► │ Running │
///   └──────────┘ ◄────────────── └─────────┘
///      ▲    │        preempted        │
///      │    │ block()                 │ block() / sleep()
///      │    ▼                         │
///      │  ┌──────────┐                │
///      └──│ Blocked  │ ◄──────────────┘
///  unblock└──────────┘
///  / wake
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum TaskState {
    /// Eligible for selection.
    Ready,
    /// Currently owns the CPU. At most one context is Running.
    Running,
    /// Not eligible until unblocked or its wake tick passes.
    Blocked,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

pub struct TaskControlBlock {
    /// Which table slot this block describes.
    pub id: ContextId,

    pub state: TaskState,

    /// Lowest address of the saved context. Meaningful only while the
    /// context is not Running.
    saved_sp: usize,

    /// Private stack. Never shared, never moved.
    region: StackRegion,

    /// Where the initial frame starts execution.
    entry: TaskEntry,

    /// Tick at which a sleeping task becomes Ready again.
    wake_at: Option<u64>,
}

impl TaskControlBlock {
    /// A context with no frame yet. It cannot be resumed until
    /// [`prepare`](Self::prepare) has run.
    pub(crate) fn new(id: ContextId, region: StackRegion, entry: TaskEntry) -> Self {
        Self {
            id,
            state: TaskState::Ready,
            saved_sp: 0,
            region,
            entry,
            wake_at: None,
        }
    }

    /// Write the initial frame for `entry` at the top of the region and
    /// make the context Ready to start from it.
    pub(crate) fn prepare<P: Port>(&mut self, port: &mut P) {
        self.saved_sp = init_context(port, &self.region, self.entry);
        self.state = TaskState::Ready;
        self.wake_at = None;
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    pub fn region(&self) -> &StackRegion {
        &self.region
    }

    pub fn saved_sp(&self) -> usize {
        self.saved_sp
    }

    pub fn wake_at(&self) -> Option<u64> {
        self.wake_at
    }

    /// Check that `sp` could be the saved stack pointer of this context.
    fn validate(&self, sp: usize) -> Result<usize, Fault> {
        if sp % 4 == 0 && self.region.holds_context_at(sp) {
            Ok(sp)
        } else {
            Err(Fault::StackCorrupted {
                context: self.id,
                sp,
            })
        }
    }

    /// Record the live stack pointer of a context being switched out.
    /// A pointer outside the region means the task overflowed its stack.
    pub(crate) fn suspend(&mut self, sp: usize) -> Result<(), Fault> {
        self.saved_sp = self.validate(sp)?;
        if self.state == TaskState::Running {
            self.state = TaskState::Ready;
        }
        Ok(())
    }

    /// Mark this context Running and return the stack pointer to restore.
    pub(crate) fn resume(&mut self) -> Result<usize, Fault> {
        let sp = self.validate(self.saved_sp)?;
        self.state = TaskState::Running;
        Ok(sp)
    }

    pub(crate) fn block(&mut self, wake_at: Option<u64>) {
        self.state = TaskState::Blocked;
        self.wake_at = wake_at;
    }

    /// Blocked → Ready. Returns whether the state changed.
    pub(crate) fn unblock(&mut self) -> bool {
        self.wake_at = None;
        if self.state == TaskState::Blocked {
            self.state = TaskState::Ready;
            true
        } else {
            false
        }
    }

    /// Wake a sleeper whose deadline has arrived.
    pub(crate) fn wake_if_due(&mut self, now: u64) -> bool {
        match self.wake_at {
            Some(at) if self.state == TaskState::Blocked && now >= at => self.unblock(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DUMMY_XPSR;
    use crate::layout::SYSTEM_LAYOUT;
    use crate::port::sim::SimPort;

    extern "C" fn spin() -> ! {
        loop {}
    }

    fn tcb(index: usize) -> TaskControlBlock {
        let region = SYSTEM_LAYOUT.region(index).unwrap();
        let mut t = TaskControlBlock::new(ContextId::Task(index), region, spin);
        t.prepare(&mut SimPort::new(SYSTEM_LAYOUT.reserved()));
        t
    }

    #[test]
    fn test_new_tcb_is_ready() {
        let t = tcb(0);
        assert_eq!(t.state, TaskState::Ready);
        assert!(t.is_ready());
        assert_eq!(t.wake_at(), None);
        assert_eq!(t.saved_sp(), t.region().top() - 64);
    }

    #[test]
    fn test_prepare_starts_frame_at_entry() {
        let region = SYSTEM_LAYOUT.region(2).unwrap();
        let mut port = SimPort::new(SYSTEM_LAYOUT.reserved());
        let mut t = TaskControlBlock::new(ContextId::Task(2), region, spin);
        // No frame yet: nothing to resume from.
        assert!(matches!(t.resume(), Err(Fault::StackCorrupted { sp: 0, .. })));

        t.prepare(&mut port);
        let frame = port.read_context(t.saved_sp());
        assert_eq!(frame.hardware.pc, spin as *const () as usize as u32 & !1);
        assert_eq!(frame.hardware.xpsr, DUMMY_XPSR);
        assert_eq!(t.resume(), Ok(region.top() - 64));
    }

    #[test]
    fn test_resume_then_suspend() {
        let mut t = tcb(1);
        let sp = t.resume().unwrap();
        assert_eq!(t.state, TaskState::Running);
        assert_eq!(sp, t.region().top() - 64);

        let live = sp - 40;
        t.suspend(live).unwrap();
        assert_eq!(t.state, TaskState::Ready);
        assert_eq!(t.saved_sp(), live);
    }

    #[test]
    fn test_suspend_keeps_blocked_state() {
        let mut t = tcb(2);
        t.resume().unwrap();
        t.block(None);
        t.suspend(t.region().top() - 128).unwrap();
        assert_eq!(t.state, TaskState::Blocked);
    }

    #[test]
    fn test_suspend_rejects_overflowed_stack() {
        let mut t = tcb(1);
        t.resume().unwrap();
        let below = t.region().bottom() - 8;
        assert_eq!(
            t.suspend(below),
            Err(Fault::StackCorrupted {
                context: ContextId::Task(1),
                sp: below
            })
        );
        // Left untouched on failure.
        assert_eq!(t.state, TaskState::Running);
    }

    #[test]
    fn test_resume_rejects_unaligned_sp() {
        let mut t = tcb(3);
        t.saved_sp = t.region().top() - 66;
        assert!(matches!(t.resume(), Err(Fault::StackCorrupted { .. })));
        assert_eq!(t.state, TaskState::Ready);
    }

    #[test]
    fn test_sleep_and_wake() {
        let mut t = tcb(0);
        t.block(Some(10));
        assert!(!t.wake_if_due(9));
        assert_eq!(t.state, TaskState::Blocked);
        assert!(t.wake_if_due(10));
        assert_eq!(t.state, TaskState::Ready);
        assert_eq!(t.wake_at(), None);
    }

    #[test]
    fn test_unblock_is_noop_when_ready() {
        let mut t = tcb(0);
        assert!(!t.unblock());
        assert_eq!(t.state, TaskState::Ready);
    }
}
