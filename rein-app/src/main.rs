//! Headless rein2d demo runner.
//!
//! Builds a scene, drives it with a fixed timestep from simulated frame
//! times and logs a summary once per simulated second.

mod scene;
mod stepper;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rein2d::{StepConf, World};

use crate::scene::{CountingListener, EventCounter, Scene};
use crate::stepper::{FixedStepper, StepperConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Scene to simulate
    #[clap(short, long, value_enum, default_value_t = Scene::Pyramid)]
    scene: Scene,

    /// Simulated seconds to run
    #[clap(short = 't', long, default_value_t = 10.0)]
    seconds: f64,

    /// Physics steps per second
    #[clap(long, default_value_t = 60.0)]
    hz: f64,

    /// Simulated frame time in milliseconds
    #[clap(long, default_value_t = 16.7)]
    frame_ms: f64,

    /// Velocity iterations per step
    #[clap(long, default_value_t = 8)]
    velocity_iterations: u32,

    /// Position iterations per step
    #[clap(long, default_value_t = 3)]
    position_iterations: u32,

    /// Disable continuous collision
    #[clap(long)]
    no_toi: bool,

    /// Stop continuous collision after one impact per step
    #[clap(long)]
    sub_stepping: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if args.hz <= 0.0 || args.frame_ms <= 0.0 {
        anyhow::bail!("--hz and --frame-ms must be positive");
    }

    let mut world = World::default();
    let tracked = args.scene.build(&mut world)?;
    let events = Rc::new(RefCell::new(EventCounter::default()));
    world.set_contact_listener(CountingListener(Rc::clone(&events)));
    world.set_sub_stepping(args.sub_stepping);
    info!(
        "Scene {:?}: {} bodies, {} joints",
        args.scene,
        world.body_count(),
        world.joint_count()
    );

    let step_conf = StepConf {
        reg_velocity_iterations: args.velocity_iterations,
        reg_position_iterations: args.position_iterations,
        do_toi: !args.no_toi,
        ..StepConf::default()
    };
    let mut stepper = FixedStepper::new(
        StepperConfig {
            fixed_timestep: 1.0 / args.hz,
            ..StepperConfig::default()
        },
        step_conf,
    );

    let frame = args.frame_ms / 1000.0;
    let mut elapsed = 0.0;
    let mut next_report = 1.0;
    let mut toi_events = 0u64;
    while elapsed < args.seconds {
        for stats in stepper.advance(&mut world, frame)? {
            debug!(pre = ?stats.pre, reg = ?stats.reg, toi = ?stats.toi, "step stats");
            toi_events += u64::from(stats.toi.contacts_found);
        }
        elapsed += frame;

        if elapsed >= next_report {
            next_report += 1.0;
            let awake = world.bodies().filter(|(_, b)| b.is_awake()).count();
            info!(
                "t = {:.1}s: {} contacts, {} awake, tree height {}",
                elapsed,
                world.contact_count(),
                awake,
                world.tree_height()
            );
        }
    }

    let events = events.borrow();
    info!(
        "Done: {} steps, {} begin / {} end events, {} TOI events",
        stepper.steps_taken(),
        events.begins,
        events.ends,
        toi_events
    );
    for id in tracked.iter().take(4) {
        let body = world.body(*id)?;
        info!(
            "Body {}: position ({:.3}, {:.3}), angle {:.3}, awake {}",
            id.index(),
            body.position().x,
            body.position().y,
            body.angle(),
            body.is_awake()
        );
    }
    Ok(())
}
