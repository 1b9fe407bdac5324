//! # Port Capability
//!
//! The few hardware operations the scheduler depends on. The Cortex-M4
//! implementation lives in `arch::cortex_m4`; host tests use [`sim::SimPort`],
//! which backs the reserved stack range with ordinary memory.

use crate::context::SavedContext;

pub trait Port {
    /// Serialize `ctx` into stack memory starting at `sp`.
    ///
    /// # Safety
    /// `sp..sp + SavedContext::SIZE` must be word aligned and lie inside a
    /// stack region that no running context is currently using.
    unsafe fn write_context(&mut self, sp: usize, ctx: &SavedContext);

    /// Request a context switch at the next opportunity.
    fn pend_switch(&mut self);

    /// Address placed in LR of every fresh frame: where a task lands if its
    /// entry point ever returns.
    fn exit_address(&self) -> usize;
}

#[cfg(test)]
pub(crate) mod sim {
    use super::*;
    use crate::layout::MemoryRange;

    pub(crate) const SIM_EXIT_ADDRESS: usize = 0x0800_0F01;

    /// In-memory port. Addresses are translated into offsets of `memory`.
    pub(crate) struct SimPort {
        range: MemoryRange,
        memory: Vec<u32>,
        pending: bool,
        pub(crate) pends: u32,
    }

    impl SimPort {
        pub(crate) fn new(range: MemoryRange) -> Self {
            Self {
                range,
                memory: vec![0; range.size / 4],
                pending: false,
                pends: 0,
            }
        }

        fn word_index(&self, addr: usize) -> usize {
            assert!(addr % 4 == 0, "unaligned access at {:#x}", addr);
            assert!(
                addr >= self.range.base && addr < self.range.end(),
                "access at {:#x} outside simulated memory",
                addr
            );
            (addr - self.range.base) / 4
        }

        pub(crate) fn read_context(&self, sp: usize) -> SavedContext {
            let start = self.word_index(sp);
            let mut words = [0u32; SavedContext::WORDS];
            words.copy_from_slice(&self.memory[start..start + SavedContext::WORDS]);
            SavedContext::from_words(&words)
        }

        /// Whether a requested switch has not been serviced yet.
        pub(crate) fn switch_pending(&self) -> bool {
            self.pending
        }

        /// Model the hardware servicing the pending switch request.
        pub(crate) fn service_switch(&mut self) {
            self.pending = false;
        }
    }

    impl Port for SimPort {
        unsafe fn write_context(&mut self, sp: usize, ctx: &SavedContext) {
            let start = self.word_index(sp);
            self.memory[start..start + SavedContext::WORDS].copy_from_slice(&ctx.to_words());
        }

        fn pend_switch(&mut self) {
            self.pending = true;
            self.pends += 1;
        }

        fn exit_address(&self) -> usize {
            SIM_EXIT_ADDRESS
        }
    }
}
