//! Scene builders shared by the criterion and callgrind benchmarks.

use anyhow::{Context, Result};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rein2d::physics::collider::{Aabb, DiskShape, PolygonShape};
use rein2d::physics::step::StepStats;
use rein2d::{BodyConf, FixtureConf, StepConf, World};

fn dense() -> FixtureConf {
    FixtureConf {
        density: 1.0,
        friction: 0.6,
        ..FixtureConf::default()
    }
}

/// Static ground with its top face at y = 0, `half_width` to each side.
pub fn add_ground(world: &mut World, half_width: f32) -> Result<()> {
    let ground = world.create_body(&BodyConf::default().with_position(Vec2::new(0.0, -0.5)))?;
    world.create_fixture(ground, PolygonShape::new_box(half_width, 0.5)?, &dense())?;
    Ok(())
}

/// A pyramid of unit boxes with `rows` boxes in its bottom row.
pub fn setup_pyramid(rows: usize) -> Result<World> {
    let mut world = World::default();
    add_ground(&mut world, 40.0)?;
    let shape = PolygonShape::new_box(0.5, 0.5)?;
    for row in 0..rows {
        let count = rows - row;
        let x0 = -(count as f32 - 1.0) * 0.5;
        for i in 0..count {
            let position = Vec2::new(x0 + i as f32, 0.5 + row as f32);
            let body = world.create_body(&BodyConf::dynamic().with_position(position))?;
            world.create_fixture(body, shape.clone(), &dense())?;
        }
    }
    Ok(world)
}

/// `n` disks on a loose grid above the ground, falling onto it.
pub fn setup_disk_rain(n: usize) -> Result<World> {
    let mut world = World::default();
    add_ground(&mut world, 60.0)?;
    let columns = (n as f32).sqrt().ceil().max(1.0) as usize;
    for i in 0..n {
        let (col, row) = (i % columns, i / columns);
        let position = Vec2::new(col as f32 * 1.1 - columns as f32 * 0.55, 1.0 + row as f32 * 1.1);
        let body = world.create_body(&BodyConf::dynamic().with_position(position))?;
        world.create_fixture(body, DiskShape::new(0.5), &dense())?;
    }
    Ok(world)
}

/// `n` small bullets fired down at a thin floor, exercising time of impact.
pub fn setup_bullets(n: usize) -> Result<World> {
    let mut world = World::default();
    add_ground(&mut world, 60.0)?;
    for i in 0..n {
        let conf = BodyConf::dynamic()
            .with_position(Vec2::new(i as f32 * 0.5 - n as f32 * 0.25, 5.0))
            .with_velocity(Vec2::new(0.0, -150.0), 0.0)
            .with_bullet(true);
        let body = world.create_body(&conf)?;
        world.create_fixture(body, DiskShape::new(0.05), &dense())?;
    }
    Ok(world)
}

/// Seeded pseudo-random boxes for tree benchmarks. The same `n` and
/// `extent` always give the same boxes.
pub fn scattered_aabbs(n: usize, extent: f32) -> Vec<Aabb> {
    let mut rng = StdRng::seed_from_u64(0x2545_f491);
    (0..n)
        .map(|_| {
            let center = Vec2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent));
            let half = Vec2::new(rng.gen_range(0.2..1.2), rng.gen_range(0.2..1.2));
            Aabb::new(center - half, center + half)
        })
        .collect()
}

/// Step `world` `steps` times and return the stats of the last step.
pub fn run_steps(world: &mut World, conf: &StepConf, steps: usize) -> Result<StepStats> {
    let mut last = StepStats::default();
    for i in 0..steps {
        last = world
            .step(conf)
            .with_context(|| format!("step {i} failed"))?;
    }
    Ok(last)
}
