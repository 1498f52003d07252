//! Per-phase tick timing
//!
//! A tick is split into [`TickPhase`]s. Opening a phase closes the one
//! before it, and [`TickTimer::finish_tick`] records the tick's total as
//! the sum of its phases.

use super::ring_buffer::RingBuffer;
use crate::phase::TickPhase;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TickTimer {
    phases: [RingBuffer<Duration>; TickPhase::COUNT],
    totals: RingBuffer<Duration>,
    open: Option<(TickPhase, Instant)>,
    tick_elapsed: Duration,
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl TickTimer {
    /// Keep the last `capacity` samples per phase.
    pub fn new(capacity: usize) -> Self {
        Self {
            phases: std::array::from_fn(|_| RingBuffer::new(capacity)),
            totals: RingBuffer::new(capacity),
            open: None,
            tick_elapsed: Duration::ZERO,
        }
    }

    /// Start timing `phase`, closing any phase still open.
    pub fn begin(&mut self, phase: TickPhase) {
        self.end();
        self.open = Some((phase, Instant::now()));
    }

    /// Close the open phase, if any.
    pub fn end(&mut self) {
        if let Some((phase, start)) = self.open.take() {
            let elapsed = start.elapsed();
            self.phases[phase.index()].push(elapsed);
            self.tick_elapsed += elapsed;
        }
    }

    /// Close the open phase and record the tick total.
    pub fn finish_tick(&mut self) {
        self.end();
        let total = std::mem::take(&mut self.tick_elapsed);
        self.totals.push(total);
    }

    pub fn ticks_recorded(&self) -> usize {
        self.totals.len()
    }

    /// Average whole-tick time.
    pub fn tick_time_ms(&self) -> f64 {
        as_ms(self.totals.average())
    }

    pub fn phase_time_ms(&self, phase: TickPhase) -> f64 {
        as_ms(self.phases[phase.index()].average())
    }

    pub fn phase_range_ms(&self, phase: TickPhase) -> (f64, f64) {
        let (min, max) = self.phases[phase.index()].min_max();
        (as_ms(min), as_ms(max))
    }

    /// Phase with the highest average, once any phase has samples.
    pub fn slowest_phase(&self) -> Option<TickPhase> {
        TickPhase::ALL
            .into_iter()
            .filter(|phase| !self.phases[phase.index()].is_empty())
            .max_by_key(|phase| self.phases[phase.index()].average())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn phases_close_each_other_and_sum_into_the_tick() {
        let mut timer = TickTimer::new(8);
        for _ in 0..3 {
            timer.begin(TickPhase::Allocate);
            timer.begin(TickPhase::Simulate);
            thread::sleep(Duration::from_millis(4));
            timer.begin(TickPhase::Rotate);
            timer.finish_tick();
        }

        assert_eq!(timer.ticks_recorded(), 3);
        assert_eq!(timer.slowest_phase(), Some(TickPhase::Simulate));
        assert!(timer.phase_time_ms(TickPhase::Simulate) >= 4.0);
        assert!(timer.tick_time_ms() >= timer.phase_time_ms(TickPhase::Simulate));
        // Spawn never ran
        assert_eq!(timer.phase_time_ms(TickPhase::Spawn), 0.0);
        assert_eq!(timer.phase_range_ms(TickPhase::Spawn), (0.0, 0.0));
    }

    #[test]
    fn ending_without_an_open_phase_records_nothing() {
        let mut timer = TickTimer::new(4);
        timer.end();
        assert_eq!(timer.slowest_phase(), None);
        timer.finish_tick();
        assert_eq!(timer.ticks_recorded(), 1);
        assert_eq!(timer.tick_time_ms(), 0.0);
    }
}
