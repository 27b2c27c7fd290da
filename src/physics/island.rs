//! Islands: connected groups of bodies solved together.
//!
//! # Architecture
//!
//! A regular island is grown depth first from an awake, enabled, non-static
//! seed body:
//!
//! 1. Touching, enabled, non-sensor contacts and joints whose bodies are all
//!    enabled join the island and pull in the bodies they connect
//! 2. Static bodies join but never extend the island, so they can take part
//!    in several islands in one step
//! 3. The island integrates velocities, solves joints and contacts,
//!    integrates positions, corrects positions and finally goes to sleep if
//!    every body in it has been still for long enough
//!
//! A TOI island holds the two bodies of a time of impact event plus the
//! static, kinematic and bullet bodies touching them at that time. Joints are
//! not solved in TOI islands.

use super::contact::ContactId;
use super::math::Position;
use super::rigid_body::BodyType;
use super::settings::MAX_TOI_CONTACTS;
use super::solver::{BodyConstraint, ContactSolver, ContactSolverDef, SolverStep};
use super::step::{StepConf, ToiStepStats};
use super::world::{BodyId, JointId, World};

/// Growable set of visited flags indexed by entity slot.
#[derive(Debug, Clone, Default)]
pub(crate) struct Marks(Vec<bool>);

impl Marks {
    pub fn with_len(len: usize) -> Self {
        Self(vec![false; len])
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.0.len() {
            self.0.resize(index + 1, false);
        }
        self.0[index] = value;
    }
}

/// Visited flags for one island pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct IslandMarks {
    pub bodies: Marks,
    pub contacts: Marks,
    pub joints: Marks,
}

impl IslandMarks {
    pub fn for_world(world: &World) -> Self {
        Self {
            bodies: Marks::with_len(world.bodies.capacity()),
            contacts: Marks::with_len(world.contacts.capacity()),
            joints: Marks::with_len(world.joints.capacity()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<ContactId>,
    pub joints: Vec<JointId>,
}

/// What solving one island produced.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IslandOutcome {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    /// Whether position correction converged.
    pub solved: bool,
    pub position_iterations: u32,
    pub velocity_iterations: u32,
    pub bodies_slept: u32,
}

/// Integrate positions, clamping motion per step.
fn integrate_positions(bodies: &[BodyId], slots: &mut [BodyConstraint], h: f32, conf: &StepConf) {
    for id in bodies {
        let slot = &mut slots[id.index()];
        let mut v = slot.velocity;

        let translation = h * v.v;
        if translation.length_squared() > conf.max_translation * conf.max_translation {
            v.v *= conf.max_translation / translation.length();
        }
        let rotation = h * v.w;
        if rotation * rotation > conf.max_rotation * conf.max_rotation {
            v.w *= conf.max_rotation / rotation.abs();
        }

        slot.position.c += h * v.v;
        slot.position.a += h * v.w;
        slot.velocity = v;
    }
}

impl World {
    /// Grow a regular island from `seed`. Bodies are woken as they are
    /// reached, without resetting their sleep timers.
    pub(crate) fn build_island(
        &mut self,
        seed: BodyId,
        marks: &mut IslandMarks,
        stack: &mut Vec<BodyId>,
    ) -> Island {
        let mut island = Island::default();
        stack.clear();
        stack.push(seed);
        marks.bodies.set(seed.index(), true);

        while let Some(id) = stack.pop() {
            island.bodies.push(id);
            let Some(body) = self.bodies.get_mut(id) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }
            body.awake = true;

            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            for &contact_id in &body.contacts {
                let index = contact_id.index();
                if marks.contacts.get(index) {
                    continue;
                }
                let Some(contact) = self.contacts.get(contact_id) else {
                    continue;
                };
                if !contact.enabled || !contact.touching {
                    continue;
                }
                let sensor = [contact.proxy_a.fixture, contact.proxy_b.fixture]
                    .iter()
                    .any(|f| self.fixtures.get(*f).map_or(true, |f| f.is_sensor));
                if sensor {
                    continue;
                }
                marks.contacts.set(index, true);
                island.contacts.push(contact_id);

                let other = contact.other_body(id);
                if !marks.bodies.get(other.index()) {
                    marks.bodies.set(other.index(), true);
                    stack.push(other);
                }
            }

            for &joint_id in &body.joints {
                let index = joint_id.index();
                if marks.joints.get(index) {
                    continue;
                }
                let Some(joint) = self.joints.get(joint_id) else {
                    continue;
                };
                let all_enabled = joint
                    .bodies()
                    .all(|b| self.bodies.get(b).is_some_and(|b| b.enabled));
                if !all_enabled {
                    continue;
                }
                marks.joints.set(index, true);
                island.joints.push(joint_id);

                for other in joint.bodies() {
                    if !marks.bodies.get(other.index()) {
                        marks.bodies.set(other.index(), true);
                        stack.push(other);
                    }
                }
            }
        }
        island
    }

    /// Grow the island of a TOI event between `a` and `b`, advancing the
    /// bodies it pulls in to `alpha`.
    pub(crate) fn build_toi_island(
        &mut self,
        contact: ContactId,
        a: BodyId,
        b: BodyId,
        alpha: f32,
        marks: &mut IslandMarks,
        stats: &mut ToiStepStats,
    ) -> Island {
        let mut island = Island {
            bodies: vec![a, b],
            contacts: vec![contact],
            joints: Vec::new(),
        };
        marks.bodies.set(a.index(), true);
        marks.bodies.set(b.index(), true);
        marks.contacts.set(contact.index(), true);

        for id in [a, b] {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            if body.body_type != BodyType::Dynamic {
                continue;
            }
            let bullet = body.bullet;
            let contacts = body.contacts.clone();

            for contact_id in contacts {
                if island.bodies.len() == 2 * MAX_TOI_CONTACTS
                    || island.contacts.len() == MAX_TOI_CONTACTS
                {
                    break;
                }
                let index = contact_id.index();
                if marks.contacts.get(index) {
                    continue;
                }
                let Some(c) = self.contacts.get(contact_id) else {
                    continue;
                };
                let other = c.other_body(id);
                let Some(other_body) = self.bodies.get(other) else {
                    continue;
                };
                // Only static, kinematic and bullet bodies join.
                if other_body.body_type == BodyType::Dynamic && !bullet && !other_body.bullet {
                    continue;
                }
                let sensor = [c.proxy_a.fixture, c.proxy_b.fixture]
                    .iter()
                    .any(|f| self.fixtures.get(*f).map_or(true, |f| f.is_sensor));
                if sensor {
                    continue;
                }

                // Tentatively advance the other body to the time of impact.
                let backup = other_body.sweep;
                let other_marked = marks.bodies.get(other.index());
                if !other_marked {
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        other_body.advance(alpha);
                    }
                }

                self.update_contact(contact_id);
                stats.contacts_updated += 1;

                let solid = self
                    .contacts
                    .get(contact_id)
                    .is_some_and(|c| c.enabled && c.touching);
                if !solid {
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        other_body.sweep = backup;
                        other_body.synchronize_transform();
                    }
                    continue;
                }

                marks.contacts.set(index, true);
                island.contacts.push(contact_id);

                if other_marked {
                    continue;
                }
                marks.bodies.set(other.index(), true);
                if let Some(other_body) = self.bodies.get_mut(other) {
                    other_body.set_awake(true);
                }
                island.bodies.push(other);
            }
        }
        island
    }

    fn contact_defs(&self, contacts: &[ContactId]) -> Vec<ContactSolverDef> {
        contacts
            .iter()
            .filter_map(|&id| {
                let c = self.contacts.get(id)?;
                let fixture_a = self.fixtures.get(c.proxy_a.fixture)?;
                let fixture_b = self.fixtures.get(c.proxy_b.fixture)?;
                Some(ContactSolverDef {
                    contact: id,
                    body_a: c.body_a,
                    body_b: c.body_b,
                    manifold: c.manifold,
                    radius_a: fixture_a.shape.vertex_radius(),
                    radius_b: fixture_b.shape.vertex_radius(),
                    friction: c.friction,
                    restitution: c.restitution,
                    tangent_speed: c.tangent_speed,
                })
            })
            .collect()
    }

    /// Load the island's bodies into their solver slots.
    fn load_slots(&self, island: &Island, slots: &mut [BodyConstraint]) {
        for id in &island.bodies {
            if let Some(body) = self.bodies.get(*id) {
                slots[id.index()] = BodyConstraint {
                    inv_mass: body.inv_mass,
                    inv_i: body.inv_i,
                    local_center: body.sweep.local_center,
                    position: Position {
                        c: body.sweep.c,
                        a: body.sweep.a,
                    },
                    velocity: body.velocity,
                };
            }
        }
    }

    /// Write solver positions and velocities back into the bodies.
    fn store_slots(&mut self, island: &Island, slots: &[BodyConstraint]) {
        for id in &island.bodies {
            let Some(body) = self.bodies.get_mut(*id) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }
            let slot = &slots[id.index()];
            body.sweep.c = slot.position.c;
            body.sweep.a = slot.position.a;
            body.velocity = slot.velocity;
            body.synchronize_transform();
        }
    }

    /// Keep the solver's accumulated impulses for warm starting.
    fn store_impulses(&mut self, solver: &ContactSolver) {
        for (id, impulses) in solver.impulses() {
            if let Some(contact) = self.contacts.get_mut(id) {
                for (j, point) in contact
                    .manifold
                    .points_mut()
                    .iter_mut()
                    .take(impulses.count)
                    .enumerate()
                {
                    point.normal_impulse = impulses.normal[j];
                    point.tangent_impulse = impulses.tangent[j];
                }
            }
        }
    }

    fn report_post_solve(&mut self, solver: &ContactSolver, iterations: u32) {
        if self.listener.is_none() {
            return;
        }
        for (id, impulses) in solver.impulses() {
            self.notify(|listener, world| listener.post_solve(world, id, &impulses, iterations));
        }
    }

    /// Solve a regular island over a full step.
    pub(crate) fn solve_island(
        &mut self,
        island: &Island,
        step: &SolverStep,
        conf: &StepConf,
        slots: &mut [BodyConstraint],
    ) -> IslandOutcome {
        let h = step.dt;
        let gravity = self.gravity;

        // Integrate velocities and start the sweeps at the current pose.
        for id in &island.bodies {
            let Some(body) = self.bodies.get_mut(*id) else {
                continue;
            };
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            if body.body_type == BodyType::Dynamic {
                let mut v = body.velocity;
                v.v += h * body.inv_mass * (body.gravity_scale * body.mass * gravity + body.force);
                v.w += h * body.inv_i * body.torque;
                // Pade approximation of exp(-h * damping), stable for large damping.
                v.v *= 1.0 / (1.0 + h * body.linear_damping);
                v.w *= 1.0 / (1.0 + h * body.angular_damping);
                body.velocity = v;
            }
        }
        self.load_slots(island, slots);

        let reg = conf.reg_solver_conf();
        let mut solver = ContactSolver::new(step, self.contact_defs(&island.contacts), slots);
        solver.initialize_velocity_constraints(step, slots);
        if step.do_warm_start {
            solver.warm_start(slots);
        }
        for id in &island.joints {
            if let Some(joint) = self.joints.get_mut(*id) {
                joint.constraint_mut().init_velocity(slots, step, &reg);
            }
        }

        let mut max_inc_impulse = 0.0f32;
        for _ in 0..conf.reg_velocity_iterations {
            for id in &island.joints {
                if let Some(joint) = self.joints.get_mut(*id) {
                    joint.constraint_mut().solve_velocity(slots, step);
                }
            }
            max_inc_impulse = max_inc_impulse.max(solver.solve_velocity_constraints(slots));
        }
        self.store_impulses(&solver);

        integrate_positions(&island.bodies, slots, h, conf);

        let mut min_separation = f32::INFINITY;
        let mut solved = false;
        let mut position_iterations = 0;
        for i in 0..conf.reg_position_iterations {
            let separation = solver.solve_position_constraints(slots, &reg);
            min_separation = min_separation.min(separation);
            let contacts_okay = separation >= reg.min_separation;

            let mut joints_okay = true;
            for id in &island.joints {
                if let Some(joint) = self.joints.get_mut(*id) {
                    let okay = joint.constraint_mut().solve_position(slots, &reg);
                    joints_okay = joints_okay && okay;
                }
            }
            position_iterations = i + 1;
            if contacts_okay && joints_okay {
                solved = true;
                break;
            }
        }

        self.store_slots(island, slots);
        self.report_post_solve(&solver, conf.reg_velocity_iterations);

        let bodies_slept = self.update_sleep(island, h, conf, solved);

        IslandOutcome {
            min_separation,
            max_inc_impulse,
            solved,
            position_iterations,
            velocity_iterations: conf.reg_velocity_iterations,
            bodies_slept,
        }
    }

    /// Advance sleep timers and put the island to sleep once every body has
    /// been still for long enough. Returns the number of bodies put to sleep.
    fn update_sleep(&mut self, island: &Island, h: f32, conf: &StepConf, solved: bool) -> u32 {
        let linear_tolerance_sq = conf.linear_sleep_tolerance * conf.linear_sleep_tolerance;
        let angular_tolerance_sq = conf.angular_sleep_tolerance * conf.angular_sleep_tolerance;

        let mut min_sleep_time = f32::MAX;
        for id in &island.bodies {
            let Some(body) = self.bodies.get_mut(*id) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }
            let v = body.velocity;
            if !body.allow_sleep
                || v.w * v.w > angular_tolerance_sq
                || v.v.length_squared() > linear_tolerance_sq
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time < conf.min_still_time_to_sleep || !solved {
            return 0;
        }
        let mut slept = 0;
        for id in &island.bodies {
            if let Some(body) = self.bodies.get_mut(*id) {
                if body.body_type != BodyType::Static {
                    body.set_awake(false);
                    slept += 1;
                }
            }
        }
        slept
    }

    /// Solve a TOI island over the rest of the step. Only `toi_a` and
    /// `toi_b` are moved by position correction.
    pub(crate) fn solve_toi_island(
        &mut self,
        island: &Island,
        toi_a: BodyId,
        toi_b: BodyId,
        step: &SolverStep,
        conf: &StepConf,
        slots: &mut [BodyConstraint],
    ) -> IslandOutcome {
        self.load_slots(island, slots);

        let toi = conf.toi_solver_conf();
        let mut solver = ContactSolver::new(step, self.contact_defs(&island.contacts), slots);

        let mut min_separation = f32::INFINITY;
        let mut solved = false;
        let mut position_iterations = 0;
        for i in 0..conf.toi_position_iterations {
            let separation = solver.solve_toi_position_constraints(slots, &toi, toi_a, toi_b);
            min_separation = min_separation.min(separation);
            position_iterations = i + 1;
            if separation >= toi.min_separation {
                solved = true;
                break;
            }
        }

        // The corrected poses become the start of the remaining sweep.
        for id in [toi_a, toi_b] {
            if let Some(body) = self.bodies.get_mut(id) {
                let position = slots[id.index()].position;
                body.sweep.c0 = position.c;
                body.sweep.a0 = position.a;
            }
        }

        // Warm starting was done by the regular solve.
        solver.initialize_velocity_constraints(step, slots);
        let mut max_inc_impulse = 0.0f32;
        for _ in 0..conf.toi_velocity_iterations {
            max_inc_impulse = max_inc_impulse.max(solver.solve_velocity_constraints(slots));
        }

        // TOI impulses can be large, so they are not kept for warm starting.
        integrate_positions(&island.bodies, slots, step.dt, conf);
        self.store_slots(island, slots);
        self.report_post_solve(&solver, conf.toi_velocity_iterations);

        IslandOutcome {
            min_separation,
            max_inc_impulse,
            solved,
            position_iterations,
            velocity_iterations: conf.toi_velocity_iterations,
            bodies_slept: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::physics::collider::PolygonShape;
    use crate::physics::fixture::FixtureConf;
    use crate::physics::joint::RevoluteJointConf;
    use crate::physics::rigid_body::BodyConf;

    fn dense() -> FixtureConf {
        FixtureConf {
            density: 1.0,
            ..FixtureConf::default()
        }
    }

    fn square(world: &mut World, conf: BodyConf) -> BodyId {
        let body = world.create_body(&conf).unwrap();
        world
            .create_fixture(body, PolygonShape::new_box(0.5, 0.5).unwrap(), &dense())
            .unwrap();
        body
    }

    /// Find pairs and refresh every manifold, as the start of a step does.
    fn touch_all(world: &mut World) {
        world.find_new_contacts();
        for id in world.contacts.ids() {
            world.update_contact(id);
        }
    }

    #[test]
    fn test_marks_grow_on_demand() {
        let mut marks = Marks::with_len(2);
        assert!(!marks.get(5));
        marks.set(5, true);
        assert!(marks.get(5));
        assert!(!marks.get(4));
    }

    #[test]
    fn test_island_stops_at_static_bodies() {
        let mut world = World::default();
        let ground = world.create_body(&BodyConf::default()).unwrap();
        world
            .create_fixture(ground, PolygonShape::new_box(10.0, 0.5).unwrap(), &dense())
            .unwrap();
        let left = square(&mut world, BodyConf::dynamic().with_position(Vec2::new(-3.0, 0.95)));
        let right = square(&mut world, BodyConf::dynamic().with_position(Vec2::new(3.0, 0.95)));
        touch_all(&mut world);
        assert_eq!(world.contact_count(), 2);

        let mut marks = IslandMarks::for_world(&world);
        let mut stack = Vec::new();
        let island = world.build_island(left, &mut marks, &mut stack);
        assert_eq!(island.bodies.len(), 2, "left box and the ground");
        assert!(island.bodies.contains(&ground));
        assert!(!island.bodies.contains(&right), "islands never grow through static bodies");
        assert_eq!(island.contacts.len(), 1);
    }

    #[test]
    fn test_island_follows_joints() {
        let mut world = World::default();
        let a = square(&mut world, BodyConf::dynamic());
        let b = square(&mut world, BodyConf::dynamic().with_position(Vec2::new(5.0, 0.0)));
        let c = square(&mut world, BodyConf::dynamic().with_position(Vec2::new(10.0, 0.0)));
        world
            .create_joint(RevoluteJointConf::at_anchor(&world, a, b, Vec2::new(2.5, 0.0)).unwrap())
            .unwrap();

        let mut marks = IslandMarks::for_world(&world);
        let mut stack = Vec::new();
        let island = world.build_island(b, &mut marks, &mut stack);
        assert_eq!(island.joints.len(), 1);
        assert!(island.bodies.contains(&a) && island.bodies.contains(&b));
        assert!(!island.bodies.contains(&c));
    }

    #[test]
    fn test_sensor_contacts_stay_out_of_islands() {
        let mut world = World::default();
        let a = square(&mut world, BodyConf::dynamic());
        let b = world
            .create_body(&BodyConf::dynamic().with_position(Vec2::new(0.5, 0.0)))
            .unwrap();
        world
            .create_fixture(
                b,
                PolygonShape::new_box(0.5, 0.5).unwrap(),
                &FixtureConf {
                    is_sensor: true,
                    ..dense()
                },
            )
            .unwrap();
        touch_all(&mut world);
        assert!(world.contacts().all(|(_, c)| c.is_touching()));

        let mut marks = IslandMarks::for_world(&world);
        let island = world.build_island(a, &mut marks, &mut Vec::new());
        assert_eq!(island.bodies, vec![a]);
        assert!(island.contacts.is_empty());
    }

    #[test]
    fn test_integrate_positions_clamps_translation() {
        let conf = StepConf::default();
        let mut slots = vec![BodyConstraint::default()];
        slots[0].velocity.v = Vec2::new(600.0, 0.0);
        integrate_positions(&[BodyId::new(0, 0)], &mut slots, 1.0 / 60.0, &conf);
        assert!(
            (slots[0].position.c.x - conf.max_translation).abs() < 1e-4,
            "x = {}",
            slots[0].position.c.x
        );
        assert!((slots[0].velocity.v.x - conf.max_translation * 60.0).abs() < 1e-2);
    }

    #[test]
    fn test_free_island_integrates_gravity() {
        let mut world = World::default();
        let body = square(&mut world, BodyConf::dynamic());
        let conf = StepConf::default();
        let step = conf.solver_step();
        let mut marks = IslandMarks::for_world(&world);
        let island = world.build_island(body, &mut marks, &mut Vec::new());
        let mut slots = vec![BodyConstraint::default(); 1];
        let outcome = world.solve_island(&island, &step, &conf, &mut slots);

        assert!(outcome.solved, "nothing to correct");
        assert_eq!(outcome.position_iterations, 1);
        let b = world.body(body).unwrap();
        let h = conf.dt;
        assert!((b.linear_velocity().y + 9.8 * h).abs() < 1e-5);
        assert!((b.position().y + 9.8 * h * h).abs() < 1e-6);
        assert_eq!(b.sweep().c0, Vec2::ZERO, "sweep starts at the old pose");
    }
}
