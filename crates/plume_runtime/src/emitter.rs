//! CPU emitter demo
//!
//! Drives one particle data set through the spawn / age / kill / tick cycle
//! with persistent IDs, the way a CPU simulated emitter would.

use crate::settings::RuntimeSettings;
use glam::Vec3;
use plume_core::{
    Accessor, AccessorError, AccessorMut, CpuDataSet, DataSetId, DataSetKind, ParticleId, SimLane,
    TypeDef, Variable,
};
use plume_metrics::{TickPhase, TickTimer};

const TIME_STEP: f32 = 1.0 / 60.0;
const GRAVITY: Vec3 = Vec3::new(0.0, -9.8, 0.0);
const GOLDEN_ANGLE: f32 = 2.399_963;
const TIMER_SAMPLES: usize = 60;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u32,
    pub survived: usize,
    pub spawned: usize,
    pub killed: usize,
}

impl TickReport {
    pub fn alive(&self) -> usize {
        self.survived + self.spawned
    }
}

pub struct Emitter {
    particles: CpuDataSet,
    spawn_per_tick: usize,
    lifetime_ticks: i32,
    tick: u32,
    total_spawned: usize,
    timer: TickTimer,
}

impl Emitter {
    pub fn new(settings: &RuntimeSettings) -> Self {
        let mut particles = CpuDataSet::with_settings(
            DataSetId::new("fountain", DataSetKind::Particle),
            settings.data_set.clone(),
        );
        particles.add_variables([
            Variable::new("ID", TypeDef::particle_id()),
            Variable::new("Position", TypeDef::vec3()),
            Variable::new("Velocity", TypeDef::vec3()),
            Variable::new("Age", TypeDef::Int32),
        ]);
        particles.set_needs_persistent_ids(true);
        particles.finalize();

        Self {
            particles,
            spawn_per_tick: settings.spawn_per_tick,
            lifetime_ticks: settings.lifetime_ticks,
            tick: 0,
            total_spawned: 0,
            timer: TickTimer::new(TIMER_SAMPLES),
        }
    }

    pub fn particles(&self) -> &CpuDataSet {
        &self.particles
    }

    /// Per-phase timings of recent ticks.
    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    /// Age survivors, drop the expired, spawn new particles, then rotate buffers.
    pub fn step(&mut self, lane: &SimLane) -> Result<TickReport, AccessorError> {
        self.timer.begin(TickPhase::Allocate);
        let tag = self.tick as i32;
        self.particles.set_id_acquire_tag(lane, tag);

        let previous = self.particles.prev_num_instances();
        self.particles
            .allocate(lane, previous + self.spawn_per_tick, false);

        self.timer.begin(TickPhase::Simulate);
        let (survivors, expired) = self.carry_survivors(lane)?;
        for (instance, id) in survivors.iter().enumerate() {
            self.particles.update_id(lane, *id, instance);
        }
        for id in &expired {
            self.particles.release_id(lane, *id);
        }

        self.timer.begin(TickPhase::Spawn);
        let first = survivors.len();
        self.spawn(lane, first)?;

        let report = TickReport {
            tick: self.tick,
            survived: survivors.len(),
            spawned: self.spawn_per_tick,
            killed: expired.len(),
        };
        self.timer.begin(TickPhase::Rotate);
        self.particles.tick(lane);
        self.timer.finish_tick();
        self.tick += 1;
        Ok(report)
    }

    /// Copy live particles from the previous buffer into the current one and
    /// integrate them. Returns the IDs kept (in their new order) and the IDs
    /// that expired.
    fn carry_survivors(
        &mut self,
        lane: &SimLane,
    ) -> Result<(Vec<ParticleId>, Vec<ParticleId>), AccessorError> {
        let lifetime = self.lifetime_ticks;
        let (prev, curr) = self.particles.prev_and_curr_mut(lane);
        curr.set_num_instances(0);

        let ages = Accessor::<i32>::new(prev, "Age")?;
        let ids = Accessor::<ParticleId>::new(prev, "ID")?;
        let mut kept = Vec::with_capacity(prev.num_instances());
        let mut expired = Vec::new();
        for instance in 0..prev.num_instances() {
            if ages.get(instance) + 1 >= lifetime {
                expired.push(ids.get(instance));
            } else if curr.transfer_instance(prev, instance).is_some() {
                kept.push(ids.get(instance));
            }
        }

        {
            let mut age = AccessorMut::<i32>::new(curr, "Age")?;
            for instance in 0..kept.len() {
                let next = age.get(instance) + 1;
                age.set(instance, next);
            }
        }

        let velocities: Vec<Vec3> = {
            let mut velocity = AccessorMut::<Vec3>::new(curr, "Velocity")?;
            (0..kept.len())
                .map(|instance| {
                    let next = velocity.get(instance) + GRAVITY * TIME_STEP;
                    velocity.set(instance, next);
                    next
                })
                .collect()
        };

        let mut position = AccessorMut::<Vec3>::new(curr, "Position")?;
        for (instance, v) in velocities.iter().enumerate() {
            let next = position.get(instance) + *v * TIME_STEP;
            position.set(instance, next);
        }

        Ok((kept, expired))
    }

    fn spawn(&mut self, lane: &SimLane, first: usize) -> Result<(), AccessorError> {
        let count = self.spawn_per_tick;
        self.particles.set_num_instances(lane, first + count);

        let ids: Vec<ParticleId> = (first..first + count)
            .map(|instance| self.particles.acquire_id(lane, instance))
            .collect();
        let velocities: Vec<Vec3> = (0..count)
            .map(|n| {
                let angle = (self.total_spawned + n) as f32 * GOLDEN_ANGLE;
                Vec3::new(angle.cos(), 4.0, angle.sin())
            })
            .collect();
        self.total_spawned += count;

        let curr = self.particles.curr_data_mut(lane);
        {
            let mut id = AccessorMut::<ParticleId>::new(curr, "ID")?;
            for (n, value) in ids.into_iter().enumerate() {
                id.set(first + n, value);
            }
        }
        {
            let mut velocity = AccessorMut::<Vec3>::new(curr, "Velocity")?;
            for (n, value) in velocities.into_iter().enumerate() {
                velocity.set(first + n, value);
            }
        }
        {
            let mut position = AccessorMut::<Vec3>::new(curr, "Position")?;
            for n in 0..count {
                position.set(first + n, Vec3::ZERO);
            }
        }
        let mut age = AccessorMut::<i32>::new(curr, "Age")?;
        for n in 0..count {
            age.set(first + n, 0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn run(settings: RuntimeSettings) -> (Vec<TickReport>, Vec<ParticleId>) {
        std::thread::spawn(move || {
            let lane = SimLane::enter();
            let mut emitter = Emitter::new(&settings);
            let reports = (0..settings.ticks)
                .map(|_| emitter.step(&lane).unwrap())
                .collect();
            assert_eq!(
                emitter.timer().ticks_recorded(),
                (settings.ticks as usize).min(TIMER_SAMPLES)
            );
            let ids = Accessor::<ParticleId>::new(emitter.particles().prev_data(), "ID")
                .unwrap()
                .iter()
                .collect();
            (reports, ids)
        })
        .join()
        .unwrap()
    }

    #[test]
    fn population_reaches_steady_state() {
        let (reports, _) = run(RuntimeSettings {
            ticks: 20,
            spawn_per_tick: 4,
            lifetime_ticks: 5,
            ..RuntimeSettings::default()
        });
        assert_eq!(reports[0].alive(), 4);
        assert_eq!(reports[0].killed, 0);
        // Each particle lives for five ticks
        let last = reports[19];
        assert_eq!(last.alive(), 20);
        assert_eq!(last.killed, 4);
    }

    #[test]
    fn live_ids_stay_unique_and_recycle_indices() {
        let (_, ids) = run(RuntimeSettings {
            ticks: 50,
            spawn_per_tick: 3,
            lifetime_ticks: 4,
            ..RuntimeSettings::default()
        });
        let indices: HashSet<i32> = ids.iter().map(|id| id.index).collect();
        assert_eq!(indices.len(), ids.len());
        // 50 ticks of spawning never needs more than the peak population of IDs
        assert!(indices.iter().all(|index| *index < 12));
    }

    #[test]
    fn every_phase_of_a_tick_is_timed() {
        std::thread::spawn(|| {
            let lane = SimLane::enter();
            let mut emitter = Emitter::new(&RuntimeSettings {
                spawn_per_tick: 64,
                ..RuntimeSettings::default()
            });
            for _ in 0..3 {
                emitter.step(&lane).unwrap();
            }
            let timer = emitter.timer();
            assert_eq!(timer.ticks_recorded(), 3);
            let phases: f64 = TickPhase::ALL
                .into_iter()
                .map(|phase| timer.phase_time_ms(phase))
                .sum();
            assert!(phases > 0.0);
            assert!(timer.slowest_phase().is_some());
        })
        .join()
        .unwrap();
    }
}
