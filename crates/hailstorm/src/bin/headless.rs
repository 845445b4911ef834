//! # HAILSTORM Headless Runner
//!
//! Runs the simulation with no window at a fixed 60 Hz frame time, as fast
//! as the machine allows, and reports throughput.
//!
//! ```bash
//! hailstorm-headless                       # defaults, 600 frames
//! hailstorm-headless storm.toml 3600       # custom config, one minute of sim time
//! ```
//!
//! The simulation runs on its own thread and streams progress to the main
//! thread over a bounded channel; a slow console never stalls the physics.

use crossbeam_channel::{bounded, Receiver, TrySendError};
use hailstorm::culling::{Frustum, VisibilityCuller};
use hailstorm::instance::{as_bytes, pack_instances, SphereInstance};
use hailstorm::prelude::{Mat4, Vec3};
use hailstorm::{Simulation, SimulationConfig, SimulationStats};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

/// Simulated frame time.
const FRAME_TIME: f64 = 1.0 / 60.0;

/// Frames between progress messages.
const REPORT_INTERVAL: u64 = 60;

/// Default frame count when none is given.
const DEFAULT_FRAMES: u64 = 600;

/// Progress sent from the simulation thread.
#[derive(Debug, Clone, Copy)]
struct Progress {
    frame: u64,
    substeps: u64,
    near_wall: usize,
    visible: usize,
    upload_bytes: usize,
    kinetic_energy: f64,
    elapsed: Duration,
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config_path = args.next();
    let frames = match args.next().map(|s| s.parse::<u64>()) {
        None => DEFAULT_FRAMES,
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            eprintln!("usage: hailstorm-headless [config.toml] [frames > 0]");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_path.as_deref() {
        Some(path) => match SimulationConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("   ✗ FATAL: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => SimulationConfig::default(),
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    HAILSTORM v{}", env!("CARGO_PKG_VERSION"));
    println!("                         HEADLESS MODE");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("  Spheres:    {}", config.count);
    println!("  Radius:     {}", config.radius);
    println!("  Cell size:  {}", config.effective_cell_size());
    println!("  Substep:    {:.3} ms (max {} per frame)", config.fixed_dt * 1000.0, config.max_substeps);
    println!("  Strategy:   {:?}", config.pair_strategy);
    println!("  Frames:     {frames}");
    println!();

    let sim = match Simulation::new(config) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("   ✓ {} worker threads ready", sim.pool().thread_count());
    println!();

    let (tx, rx) = bounded::<Progress>(16);
    let runner = thread::Builder::new()
        .name("hailstorm-sim".into())
        .spawn(move || {
            run(sim, frames, |progress| {
                // A full channel drops the update; the physics never waits on the console.
                if let Err(TrySendError::Disconnected(_)) = tx.try_send(progress) {
                    tracing::debug!("progress receiver gone");
                }
            })
        });
    let runner = match runner {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("   ✗ FATAL: failed to start simulation thread: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_progress(&rx);

    match runner.join() {
        Ok(stats) => {
            print_summary(&stats);
            ExitCode::SUCCESS
        }
        Err(_) => {
            eprintln!("   ✗ FATAL: simulation thread panicked");
            ExitCode::FAILURE
        }
    }
}

/// Steps `frames` frames, culling and packing instances each frame the way
/// a renderer would.
fn run(mut sim: Simulation, frames: u64, mut report: impl FnMut(Progress)) -> SimulationStats {
    let bounds = sim.bounds();
    let eye = bounds.center() + Vec3::new(0.0, bounds.extent().y * 0.25, bounds.extent().z);
    let view = Mat4::look_at(eye, bounds.center(), Vec3::Y);
    let projection = Mat4::perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0);
    let frustum = Frustum::from_view_projection(&projection.mul_mat(&view));

    let mut culler = VisibilityCuller::new();
    let mut instances: Vec<SphereInstance> = Vec::with_capacity(sim.spheres().len());
    let started = Instant::now();

    for frame in 1..=frames {
        sim.advance(FRAME_TIME);

        let visible = culler.cull(sim.pool(), sim.spheres(), &frustum);
        pack_instances(sim.spheres(), Some(visible), &mut instances);

        if frame % REPORT_INTERVAL == 0 || frame == frames {
            report(Progress {
                frame,
                substeps: sim.stats().substeps,
                near_wall: sim.near_wall().len(),
                visible: instances.len(),
                upload_bytes: as_bytes(&instances).len(),
                kinetic_energy: sim.kinetic_energy(),
                elapsed: started.elapsed(),
            });
        }
    }
    sim.stats()
}

fn print_progress(rx: &Receiver<Progress>) {
    for p in rx {
        let sim_seconds = p.frame as f64 * FRAME_TIME;
        let rate = p.substeps as f64 / p.elapsed.as_secs_f64().max(1e-9);
        println!(
            "   frame {:>6} | sim {:>7.2}s | {:>8.0} substeps/s | near wall {:>6} | visible {:>6} ({} KiB) | KE {:.2}",
            p.frame,
            sim_seconds,
            rate,
            p.near_wall,
            p.visible,
            p.upload_bytes / 1024,
            p.kinetic_energy,
        );
    }
}

fn print_summary(stats: &SimulationStats) {
    println!();
    println!("┌─ SUMMARY ──────────────────────────────────────────────────────┐");
    println!("│ Frames:             {}", stats.frames);
    println!("│ Substeps:           {}", stats.substeps);
    println!("│ Capped frames:      {}", stats.capped_frames);
    println!("│ Avg frame:          {:.3} ms", stats.avg_frame().as_secs_f64() * 1000.0);
    println!("│ Avg substep:        {:.3} ms", stats.avg_substep().as_secs_f64() * 1000.0);
    println!("│ Physics time:       {:.2} s", stats.physics_time.as_secs_f64());
    println!("└──────────────────────────────────────────────────────────────────┘");
}
