//! Plume Runtime
//!
//! Demo binary: runs a CPU emitter over a particle data set and reports
//! population, ID table and buffer footprint as it goes.
//!
//! Usage: `plume [settings.json]`

mod emitter;
mod settings;

use anyhow::{Context, Result};
use emitter::Emitter;
use plume_core::{BufferRole, SimLane};
use plume_metrics::TickPhase;
use settings::RuntimeSettings;

const REPORT_INTERVAL: u32 = 30;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Plume v{}", plume_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => RuntimeSettings::load(&path)
            .with_context(|| format!("loading settings from {path}"))?,
        None => RuntimeSettings::default(),
    };
    tracing::info!(?settings, "settings loaded");

    let lane = SimLane::enter();
    let mut emitter = Emitter::new(&settings);

    for _ in 0..settings.ticks {
        let report = emitter.step(&lane).context("emitter tick failed")?;

        if report.tick % REPORT_INTERVAL == 0 {
            let particles = emitter.particles();
            tracing::info!(
                tick = report.tick,
                alive = report.alive(),
                spawned = report.spawned,
                killed = report.killed,
                id_table = particles.prev_id_table().len(),
                free_ids = particles.num_free_ids(),
                bytes = particles.size_bytes(),
                tick_ms = %format!("{:.3}", emitter.timer().tick_time_ms()),
                "tick"
            );
        }
    }

    let particles = emitter.particles();
    let timer = emitter.timer();
    tracing::info!(
        ticks = settings.ticks,
        tick_ms = %format!("{:.3}", timer.tick_time_ms()),
        slowest = ?timer.slowest_phase(),
        peak_bytes = particles.stats().footprint.peak(),
        "run complete"
    );
    for phase in TickPhase::ALL {
        let (min_ms, max_ms) = timer.phase_range_ms(phase);
        tracing::info!(
            %phase,
            avg_ms = %format!("{:.3}", timer.phase_time_ms(phase)),
            min_ms = %format!("{min_ms:.3}"),
            max_ms = %format!("{max_ms:.3}"),
            "tick phase"
        );
    }
    for (name, value) in particles.stats().counters.iter() {
        tracing::info!(counter = name, value, "data set counter");
    }

    particles.log_dump(BufferRole::Previous, 0, 4);

    Ok(())
}
