//! # Stack Region Allocator
//!
//! Partitions the reserved SRAM range into `MAX_TASKS + 1` equal, disjoint
//! stack regions: one per task, plus one for the scheduler's idle context.
//!
//! Regions are handed out top-down. Region 0 ends at the top of the reserved
//! range, region 1 directly below it, and so on; the idle region is the
//! lowest. Stacks grow downward inside their region.
//!
//! ```text
//! SRAM_END ─────────►┌────────────┐
//!                    │  task 0    │
//!                    ├────────────┤
//!                    │  task 1    │
//!                    ├────────────┤
//!                    │   ...      │
//!                    ├────────────┤
//!                    │  idle      │
//!                    ├────────────┤
//!                    │  unused    │
//! SRAM_START ───────►└────────────┘
//! ```
//!
//! The computation is a `const fn`, so the system layout is checked when the
//! crate is compiled and is identical on every call.

use crate::config::{MAX_TASKS, SIZE_SRAM, SIZE_TASK_STACK, SRAM_START};
use crate::context::SavedContext;
use crate::error::ConfigError;

/// AAPCS requires 8-byte stack alignment at public interfaces.
pub const STACK_ALIGN: usize = 8;

/// A contiguous address range `[base, base + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub base: usize,
    pub size: usize,
}

impl MemoryRange {
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// One past the highest address in the range.
    #[inline]
    pub const fn end(&self) -> usize {
        self.base + self.size
    }
}

/// A task's private stack: `[bottom, top)`, growing down from `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub struct StackRegion {
    top: usize,
    size: usize,
}

impl StackRegion {
    const EMPTY: Self = Self { top: 0, size: 0 };

    /// Initial stack pointer value (one past the highest usable word).
    #[inline]
    pub const fn top(&self) -> usize {
        self.top
    }

    /// Lowest address belonging to this region.
    #[inline]
    pub const fn bottom(&self) -> usize {
        self.top - self.size
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether a full saved context starting at `sp` lies inside the region.
    #[inline]
    pub const fn holds_context_at(&self, sp: usize) -> bool {
        sp >= self.bottom() && sp <= self.top - SavedContext::SIZE
    }

    /// Whether this region and `other` share any byte.
    pub const fn overlaps(&self, other: &StackRegion) -> bool {
        self.bottom() < other.top && other.bottom() < self.top
    }
}

/// `REGIONS` stack regions carved top-down from a reserved range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout<const REGIONS: usize> {
    reserved: MemoryRange,
    regions: [StackRegion; REGIONS],
}

/// Layout for the configured system: every task plus the idle context.
pub type SystemLayout = StackLayout<{ MAX_TASKS + 1 }>;

/// The system layout, evaluated at compile time.
pub const SYSTEM_LAYOUT: SystemLayout =
    match StackLayout::compute(MemoryRange::new(SRAM_START, SIZE_SRAM), SIZE_TASK_STACK) {
        Ok(layout) => layout,
        Err(_) => panic!("invalid stack layout configuration"),
    };

impl<const REGIONS: usize> StackLayout<REGIONS> {
    /// Smallest region that can hold the initial saved context.
    pub const MIN_STACK_SIZE: usize = SavedContext::SIZE;

    /// Compute `REGIONS` regions of `stack_size` bytes, highest first.
    pub const fn compute(reserved: MemoryRange, stack_size: usize) -> Result<Self, ConfigError> {
        if stack_size == 0 {
            return Err(ConfigError::ZeroStackSize);
        }
        if stack_size % STACK_ALIGN != 0 {
            return Err(ConfigError::MisalignedStackSize(stack_size));
        }
        if stack_size < Self::MIN_STACK_SIZE {
            return Err(ConfigError::StackTooSmall {
                size: stack_size,
                min: Self::MIN_STACK_SIZE,
            });
        }
        if reserved.base % STACK_ALIGN != 0 || reserved.size % STACK_ALIGN != 0 {
            return Err(ConfigError::MisalignedReservedRange);
        }
        let end = match reserved.base.checked_add(reserved.size) {
            Some(end) => end,
            None => return Err(ConfigError::AddressOverflow),
        };
        let required = match stack_size.checked_mul(REGIONS) {
            Some(required) => required,
            None => return Err(ConfigError::AddressOverflow),
        };
        if required > reserved.size {
            return Err(ConfigError::ReservedRangeTooSmall {
                required,
                available: reserved.size,
            });
        }

        let mut regions = [StackRegion::EMPTY; REGIONS];
        let mut i = 0;
        while i < REGIONS {
            regions[i] = StackRegion {
                top: end - i * stack_size,
                size: stack_size,
            };
            i += 1;
        }

        Ok(Self { reserved, regions })
    }

    pub const fn reserved(&self) -> MemoryRange {
        self.reserved
    }

    pub const fn regions(&self) -> &[StackRegion; REGIONS] {
        &self.regions
    }

    /// Region `index`, or `None` past the end.
    pub const fn region(&self, index: usize) -> Option<StackRegion> {
        if index < REGIONS {
            Some(self.regions[index])
        } else {
            None
        }
    }

    /// The lowest region, reserved for the idle context.
    pub const fn idle_region(&self) -> StackRegion {
        self.regions[REGIONS - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed<const N: usize>(layout: &StackLayout<N>) {
        let reserved = layout.reserved();
        for (i, a) in layout.regions().iter().enumerate() {
            assert!(a.bottom() >= reserved.base, "region {} below range", i);
            assert!(a.top() <= reserved.end(), "region {} above range", i);
            assert_eq!(a.top() % STACK_ALIGN, 0);
            for b in layout.regions().iter().skip(i + 1) {
                assert!(!a.overlaps(b), "regions {:?} and {:?} overlap", a, b);
            }
        }
    }

    #[test]
    fn test_system_layout_matches_reserved_map() {
        let regions = SYSTEM_LAYOUT.regions();
        assert_eq!(regions.len(), MAX_TASKS + 1);
        assert_eq!(regions[0].top(), 0x2000_4000);
        assert_eq!(regions[1].top(), 0x2000_4000 - 512);
        assert_eq!(regions[2].top(), 0x2000_4000 - 2 * 512);
        assert_eq!(regions[3].top(), 0x2000_4000 - 3 * 512);
        assert_eq!(SYSTEM_LAYOUT.idle_region().top(), 0x2000_4000 - 4 * 512);
        assert_well_formed(&SYSTEM_LAYOUT);
    }

    #[test]
    fn test_regions_disjoint_for_varied_configs() {
        let reserved = MemoryRange::new(0x2000_0000, 16 * 1024);
        for &size in &[64usize, 72, 256, 512, 1024, 3272] {
            let layout = StackLayout::<5>::compute(reserved, size).unwrap();
            assert_well_formed(&layout);
            assert!(layout.regions().windows(2).all(|w| w[0].top() > w[1].top()));
        }

        let exact = StackLayout::<4>::compute(MemoryRange::new(0x1000, 4 * 128), 128).unwrap();
        assert_well_formed(&exact);
        assert_eq!(exact.region(3).unwrap().bottom(), 0x1000);
        assert_eq!(exact.region(4), None);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let reserved = MemoryRange::new(SRAM_START, SIZE_SRAM);
        let a = SystemLayout::compute(reserved, SIZE_TASK_STACK).unwrap();
        let b = SystemLayout::compute(reserved, SIZE_TASK_STACK).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, SYSTEM_LAYOUT);
    }

    #[test]
    fn test_rejects_bad_configs() {
        let reserved = MemoryRange::new(0x2000_0000, 1024);
        assert_eq!(
            StackLayout::<4>::compute(reserved, 0),
            Err(ConfigError::ZeroStackSize)
        );
        assert_eq!(
            StackLayout::<4>::compute(reserved, 100),
            Err(ConfigError::MisalignedStackSize(100))
        );
        assert_eq!(
            StackLayout::<4>::compute(reserved, 32),
            Err(ConfigError::StackTooSmall { size: 32, min: 64 })
        );
        assert_eq!(
            StackLayout::<5>::compute(reserved, 256),
            Err(ConfigError::ReservedRangeTooSmall {
                required: 1280,
                available: 1024
            })
        );
        assert_eq!(
            StackLayout::<4>::compute(MemoryRange::new(0x2000_0004, 1024), 256),
            Err(ConfigError::MisalignedReservedRange)
        );
        assert_eq!(
            StackLayout::<4>::compute(MemoryRange::new(usize::MAX - 7, 1024), 256),
            Err(ConfigError::AddressOverflow)
        );
    }

    #[test]
    fn test_holds_context_at() {
        let region = SYSTEM_LAYOUT.region(0).unwrap();
        assert!(region.holds_context_at(region.top() - SavedContext::SIZE));
        assert!(region.holds_context_at(region.bottom()));
        assert!(!region.holds_context_at(region.top() - SavedContext::SIZE + 4));
        assert!(!region.holds_context_at(region.bottom() - 4));
    }
}
