//! Demo scenes.

use anyhow::Result;
use clap::ValueEnum;
use glam::Vec2;
use rein2d::physics::collider::{ChainShape, DiskShape, EdgeShape, PolygonShape};
use rein2d::physics::contact::{ContactId, ContactListener};
use rein2d::physics::joint::{PrismaticJointConf, RevoluteJointConf};
use rein2d::{BodyConf, BodyId, FixtureConf, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scene {
    /// Box pyramid settling on the ground
    Pyramid,
    /// Fast bullets fired at a thin floor
    Bullets,
    /// Chain of links hanging from a pivot
    Bridge,
    /// Disk rolling down a terrain chain onto a piston
    Terrain,
}

fn dense() -> FixtureConf {
    FixtureConf {
        density: 1.0,
        friction: 0.6,
        ..FixtureConf::default()
    }
}

impl Scene {
    pub fn build(self, world: &mut World) -> Result<Vec<BodyId>> {
        match self {
            Scene::Pyramid => pyramid(world, 12),
            Scene::Bullets => bullets(world, 20),
            Scene::Bridge => bridge(world, 16),
            Scene::Terrain => terrain(world),
        }
    }
}

fn ground(world: &mut World) -> Result<BodyId> {
    let ground = world.create_body(&BodyConf::default())?;
    world.create_fixture(
        ground,
        EdgeShape::new(Vec2::new(-40.0, 0.0), Vec2::new(40.0, 0.0))?,
        &dense(),
    )?;
    Ok(ground)
}

fn pyramid(world: &mut World, rows: usize) -> Result<Vec<BodyId>> {
    ground(world)?;
    let shape = PolygonShape::new_box(0.5, 0.5)?;
    let mut bodies = Vec::new();
    for row in 0..rows {
        let count = rows - row;
        let x0 = -(count as f32 - 1.0) * 0.5;
        for i in 0..count {
            let position = Vec2::new(x0 + i as f32, 0.5 + row as f32);
            let body = world.create_body(&BodyConf::dynamic().with_position(position))?;
            world.create_fixture(body, shape.clone(), &dense())?;
            bodies.push(body);
        }
    }
    Ok(bodies)
}

fn bullets(world: &mut World, n: usize) -> Result<Vec<BodyId>> {
    let floor = world.create_body(&BodyConf::default())?;
    world.create_fixture(floor, PolygonShape::new_box(20.0, 0.05)?, &dense())?;

    let mut bodies = Vec::new();
    for i in 0..n {
        let conf = BodyConf::dynamic()
            .with_position(Vec2::new(i as f32 - n as f32 * 0.5, 4.0))
            .with_velocity(Vec2::new(0.0, -200.0), 0.0)
            .with_bullet(true);
        let body = world.create_body(&conf)?;
        world.create_fixture(body, DiskShape::new(0.1), &dense())?;
        bodies.push(body);
    }
    Ok(bodies)
}

fn bridge(world: &mut World, links: usize) -> Result<Vec<BodyId>> {
    let anchor = ground(world)?;
    let shape = PolygonShape::new_box(0.5, 0.125)?;
    let top = 20.0;

    let mut bodies = Vec::new();
    let mut previous = anchor;
    for i in 0..links {
        let body = world.create_body(
            &BodyConf::dynamic().with_position(Vec2::new(0.5 + i as f32, top)),
        )?;
        world.create_fixture(body, shape.clone(), &dense())?;
        let pivot = Vec2::new(i as f32, top);
        let hinge = RevoluteJointConf::at_anchor(world, previous, body, pivot)?;
        world.create_joint(hinge)?;
        bodies.push(body);
        previous = body;
    }
    Ok(bodies)
}

fn terrain(world: &mut World) -> Result<Vec<BodyId>> {
    let ground = world.create_body(&BodyConf::default())?;
    let points: Vec<Vec2> = (0..=20)
        .map(|i| {
            let x = -20.0 + 2.0 * i as f32;
            Vec2::new(x, 0.02 * x * x + 0.3 * (x * 0.7).sin())
        })
        .collect();
    world.create_fixture(ground, ChainShape::new(&points)?, &dense())?;

    let disk = world.create_body(&BodyConf::dynamic().with_position(Vec2::new(-15.0, 8.0)))?;
    world.create_fixture(disk, DiskShape::new(0.5), &dense())?;

    let piston = world.create_body(&BodyConf::dynamic().with_position(Vec2::new(0.0, 2.0)))?;
    world.create_fixture(piston, PolygonShape::new_box(1.0, 0.25)?, &dense())?;
    let mut slider =
        PrismaticJointConf::along_axis(world, ground, piston, Vec2::new(0.0, 2.0), Vec2::Y)?;
    slider.enable_limit = true;
    slider.lower_translation = -1.0;
    slider.upper_translation = 1.0;
    world.create_joint(slider)?;

    Ok(vec![disk, piston])
}

/// Counts contact events for the run summary.
#[derive(Debug, Default)]
pub struct EventCounter {
    pub begins: u64,
    pub ends: u64,
}

/// Listener forwarding into a shared [`EventCounter`].
pub struct CountingListener(pub std::rc::Rc<std::cell::RefCell<EventCounter>>);

impl ContactListener for CountingListener {
    fn begin_contact(&mut self, _world: &mut World, contact: ContactId) {
        tracing::trace!(contact = contact.index(), "begin contact");
        self.0.borrow_mut().begins += 1;
    }

    fn end_contact(&mut self, _world: &mut World, contact: ContactId) {
        tracing::trace!(contact = contact.index(), "end contact");
        self.0.borrow_mut().ends += 1;
    }
}
