//! # Missed-Tick Accounting
//!
//! SysTick keeps a single pending bit. A tick that wraps while the previous
//! one is still pending (a long critical section, a higher-priority ISR) is
//! merged into it by the hardware, and the handler runs once for both.
//!
//! [`TickClock`] recovers the merged periods. At every handler entry the
//! caller samples a free-running cycle counter and how far SysTick has
//! counted down since its last reload. Their difference is the instant of
//! the most recent wrap, and wraps are an exact number of periods apart, so
//! the gap between two consecutive wraps says how many ticks went by.

/// Tracks SysTick wrap instants on a free-running 32-bit cycle counter.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    /// Cycles per tick.
    period: u32,
    /// Cycle count of the wrap accounted for last. `None` until the first tick.
    last_wrap: Option<u32>,
}

impl TickClock {
    pub const fn new(period: u32) -> Self {
        assert!(period > 0);
        Self {
            period,
            last_wrap: None,
        }
    }

    /// Account for one handler entry.
    ///
    /// `now` is the cycle counter and `since_wrap` the cycles SysTick has
    /// counted since it last reloaded. Returns the number of periods that
    /// elapsed on top of the one this entry stands for.
    ///
    /// The two samples are taken a few cycles apart, so the gap is rounded
    /// to the nearest whole period. The counter may wrap between entries.
    pub fn missed_periods(&mut self, now: u32, since_wrap: u32) -> u32 {
        let wrap = now.wrapping_sub(since_wrap);
        let missed = match self.last_wrap {
            Some(last) => {
                let gap = wrap.wrapping_sub(last);
                let periods = gap.saturating_add(self.period / 2) / self.period;
                periods.saturating_sub(1)
            }
            None => 0,
        };
        self.last_wrap = Some(wrap);
        missed
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICK_PERIOD_CYCLES;

    const PERIOD: u32 = TICK_PERIOD_CYCLES;
    /// Exception entry latency plus the instructions before sampling.
    const LATENCY: u32 = 30;

    #[test]
    fn test_first_tick_has_nothing_missed() {
        let mut clock = TickClock::new(PERIOD);
        assert_eq!(clock.missed_periods(PERIOD + LATENCY, LATENCY), 0);
    }

    #[test]
    fn test_on_time_ticks_miss_nothing() {
        let mut clock = TickClock::new(PERIOD);
        for k in 1..=100u32 {
            // Latency varies from entry to entry.
            let latency = LATENCY + (k % 7) * 5;
            assert_eq!(clock.missed_periods(k * PERIOD + latency, latency), 0);
        }
    }

    #[test]
    fn test_long_critical_section_reports_merged_tick() {
        let mut clock = TickClock::new(PERIOD);
        clock.missed_periods(PERIOD + LATENCY, LATENCY);

        // Interrupts masked from 1.1 to 3.6 periods: the wrap at 2 is
        // pended, the wrap at 3 merges into it, and the handler enters at
        // 3.6 with SysTick 0.6 periods into its current count.
        let now = 3 * PERIOD + PERIOD * 6 / 10;
        assert_eq!(clock.missed_periods(now, PERIOD * 6 / 10), 1);

        // Back on schedule at 4.
        assert_eq!(clock.missed_periods(4 * PERIOD + LATENCY, LATENCY), 0);
    }

    #[test]
    fn test_late_tick_without_merge_is_not_an_overrun() {
        let mut clock = TickClock::new(PERIOD);
        clock.missed_periods(PERIOD + LATENCY, LATENCY);

        // The tick from 2 is taken at 2.9: late, but nothing merged.
        let late = PERIOD * 9 / 10;
        assert_eq!(clock.missed_periods(2 * PERIOD + late, late), 0);
        assert_eq!(clock.missed_periods(3 * PERIOD + LATENCY, LATENCY), 0);
    }

    #[test]
    fn test_cycle_counter_wraparound() {
        let mut clock = TickClock::new(PERIOD);
        let start = u32::MAX - PERIOD / 2;
        clock.missed_periods(start.wrapping_add(LATENCY), LATENCY);

        let now = start.wrapping_add(3 * PERIOD + LATENCY);
        assert_eq!(clock.missed_periods(now, LATENCY), 2);
    }
}
