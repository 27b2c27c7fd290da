//! Stepping the world forward in time.
//!
//! # Architecture
//!
//! [`World::step`] runs three phases with the world locked:
//!
//! 1. Collide: pair newly moved proxies, re-filter flagged contacts, destroy
//!    contacts whose fat boxes separated and refresh every other manifold
//! 2. Regular solve: build islands of awake bodies, solve velocities and
//!    positions over the full step, put still islands to sleep and
//!    re-synchronize the broad phase
//! 3. TOI solve: repeatedly find the earliest time of impact among contacts
//!    involving fast or bullet bodies, rewind both bodies to it and solve a
//!    small island over the rest of the step
//!
//! With sub-stepping enabled the TOI phase stops after one event and the
//! next call resumes it before starting a new regular step.

use glam::Vec2;
use tracing::{debug, trace};

use super::contact::ContactId;
use super::island::IslandMarks;
use super::rigid_body::BodyType;
use super::settings::{
    ANGULAR_SLEEP_TOLERANCE, ANGULAR_SLOP, AABB_EXTENSION, AABB_MULTIPLIER, BAUMGARTE,
    LINEAR_SLEEP_TOLERANCE, LINEAR_SLOP, MAX_ANGULAR_CORRECTION, MAX_LINEAR_CORRECTION,
    MAX_ROTATION, MAX_SUB_STEPS, MAX_TRANSLATION, TIME_TO_SLEEP, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};
use super::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use super::toi::{time_of_impact, ToiConf, ToiState};
use super::world::{BodyId, World};
use crate::error::Result;

/// Per-step configuration.
#[derive(Debug, Clone)]
pub struct StepConf {
    /// Time step in seconds. Zero or less only runs collision.
    /// Default: 1/60.
    pub dt: f32,
    /// Ratio of this step's `dt` to the previous one, used to scale warm
    /// starting impulses. Overwritten by [`World::step`]. Default: 1.
    pub dt_ratio: f32,
    /// Default: 8.
    pub reg_velocity_iterations: u32,
    /// Default: 3.
    pub reg_position_iterations: u32,
    /// Default: 8.
    pub toi_velocity_iterations: u32,
    /// Default: 20.
    pub toi_position_iterations: u32,
    /// Largest distance a body may travel per step. Default: 2.
    pub max_translation: f32,
    /// Largest angle a body may turn per step. Default: pi/2.
    pub max_rotation: f32,
    /// TOI events a contact may take part in per step. Default: 8.
    pub max_sub_steps: u32,
    /// Default: 0.005.
    pub linear_slop: f32,
    /// Default: 2 degrees.
    pub angular_slop: f32,
    /// Depth TOI targets below touching. Default: 3 * linear slop.
    pub target_depth: f32,
    /// TOI target tolerance. Default: linear slop / 4.
    pub tolerance: f32,
    /// Baumgarte factor of the regular solve. Default: 0.2.
    pub reg_resolution_rate: f32,
    /// Baumgarte factor of TOI solves. Default: 0.75.
    pub toi_resolution_rate: f32,
    /// Separation at which regular position correction stops.
    /// Default: -3 * linear slop.
    pub reg_min_separation: f32,
    /// Separation at which TOI position correction stops.
    /// Default: -1.5 * linear slop.
    pub toi_min_separation: f32,
    /// Default: 0.2.
    pub max_linear_correction: f32,
    /// Default: 8 degrees.
    pub max_angular_correction: f32,
    /// Relative normal speed below which restitution is ignored. Default: 1.
    pub velocity_threshold: f32,
    /// Fat box margin in the broad phase. Default: 0.1.
    pub aabb_extension: f32,
    /// Fat box displacement multiplier. Default: 2.
    pub displace_multiplier: f32,
    /// Default: 20.
    pub max_distance_iters: u32,
    /// Default: 20.
    pub max_toi_iters: u32,
    /// Default: 50.
    pub max_toi_root_iters: u32,
    /// Seconds an island must stay still before it sleeps. Default: 0.5.
    pub min_still_time_to_sleep: f32,
    /// Default: 0.01.
    pub linear_sleep_tolerance: f32,
    /// Default: 2 degrees.
    pub angular_sleep_tolerance: f32,
    /// Default: true.
    pub do_warm_start: bool,
    /// Run continuous collision. Default: true.
    pub do_toi: bool,
}

impl Default for StepConf {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            dt_ratio: 1.0,
            reg_velocity_iterations: 8,
            reg_position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            max_translation: MAX_TRANSLATION,
            max_rotation: MAX_ROTATION,
            max_sub_steps: MAX_SUB_STEPS,
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            target_depth: 3.0 * LINEAR_SLOP,
            tolerance: LINEAR_SLOP / 4.0,
            reg_resolution_rate: BAUMGARTE,
            toi_resolution_rate: TOI_BAUMGARTE,
            reg_min_separation: -3.0 * LINEAR_SLOP,
            toi_min_separation: -1.5 * LINEAR_SLOP,
            max_linear_correction: MAX_LINEAR_CORRECTION,
            max_angular_correction: MAX_ANGULAR_CORRECTION,
            velocity_threshold: VELOCITY_THRESHOLD,
            aabb_extension: AABB_EXTENSION,
            displace_multiplier: AABB_MULTIPLIER,
            max_distance_iters: 20,
            max_toi_iters: 20,
            max_toi_root_iters: 50,
            min_still_time_to_sleep: TIME_TO_SLEEP,
            linear_sleep_tolerance: LINEAR_SLEEP_TOLERANCE,
            angular_sleep_tolerance: ANGULAR_SLEEP_TOLERANCE,
            do_warm_start: true,
            do_toi: true,
        }
    }
}

impl StepConf {
    /// A default configuration with the given time step.
    pub fn with_dt(dt: f32) -> Self {
        Self {
            dt,
            ..Self::default()
        }
    }

    pub fn solver_step(&self) -> SolverStep {
        SolverStep {
            dt: self.dt,
            inv_dt: if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 },
            dt_ratio: self.dt_ratio,
            do_warm_start: self.do_warm_start,
            velocity_threshold: self.velocity_threshold,
        }
    }

    pub fn reg_solver_conf(&self) -> ConstraintSolverConf {
        ConstraintSolverConf {
            resolution_rate: self.reg_resolution_rate,
            linear_slop: self.linear_slop,
            angular_slop: self.angular_slop,
            max_linear_correction: self.max_linear_correction,
            max_angular_correction: self.max_angular_correction,
            min_separation: self.reg_min_separation,
        }
    }

    pub fn toi_solver_conf(&self) -> ConstraintSolverConf {
        ConstraintSolverConf {
            resolution_rate: self.toi_resolution_rate,
            min_separation: self.toi_min_separation,
            ..self.reg_solver_conf()
        }
    }

    pub fn toi_conf(&self) -> ToiConf {
        ToiConf {
            t_max: 1.0,
            linear_slop: self.linear_slop,
            target_depth: self.target_depth,
            tolerance: self.tolerance,
            max_toi_iters: self.max_toi_iters,
            max_root_iters: self.max_toi_root_iters,
            max_dist_iters: self.max_distance_iters,
        }
    }
}

/// Collision phase counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PreStepStats {
    /// Proxies waiting to be paired when the step began.
    pub proxies_moved: u32,
    /// Contacts destroyed because their fat boxes stopped overlapping.
    pub destroyed: u32,
    pub added: u32,
    /// Contacts destroyed by re-filtering.
    pub ignored: u32,
    /// Manifolds refreshed.
    pub updated: u32,
    /// Contacts left alone because neither body could move.
    pub skipped: u32,
}

/// Regular solve counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegStepStats {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    pub islands_found: u32,
    pub islands_solved: u32,
    pub contacts_added: u32,
    pub bodies_slept: u32,
    pub proxies_moved: u32,
    pub sum_pos_iters: u32,
    pub sum_vel_iters: u32,
}

impl Default for RegStepStats {
    fn default() -> Self {
        Self {
            min_separation: f32::INFINITY,
            max_inc_impulse: 0.0,
            islands_found: 0,
            islands_solved: 0,
            contacts_added: 0,
            bodies_slept: 0,
            proxies_moved: 0,
            sum_pos_iters: 0,
            sum_vel_iters: 0,
        }
    }
}

/// TOI solve counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiStepStats {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    pub islands_found: u32,
    pub islands_solved: u32,
    /// TOI events handled.
    pub contacts_found: u32,
    /// Events on contacts that used up their sub-steps.
    pub contacts_at_max_sub_steps: u32,
    pub contacts_updated: u32,
    pub contacts_added: u32,
    pub proxies_moved: u32,
    pub sum_pos_iters: u32,
    pub sum_vel_iters: u32,
    pub max_dist_iters: u32,
    pub max_toi_iters: u32,
    pub max_root_iters: u32,
}

impl Default for ToiStepStats {
    fn default() -> Self {
        Self {
            min_separation: f32::INFINITY,
            max_inc_impulse: 0.0,
            islands_found: 0,
            islands_solved: 0,
            contacts_found: 0,
            contacts_at_max_sub_steps: 0,
            contacts_updated: 0,
            contacts_added: 0,
            proxies_moved: 0,
            sum_pos_iters: 0,
            sum_vel_iters: 0,
            max_dist_iters: 0,
            max_toi_iters: 0,
            max_root_iters: 0,
        }
    }
}

/// Everything one call to [`World::step`] counted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepStats {
    pub pre: PreStepStats,
    pub reg: RegStepStats,
    pub toi: ToiStepStats,
}

impl World {
    /// Advance the world by `conf.dt`.
    ///
    /// Fails with [`WrongState`](crate::error::PhysicsError::WrongState) when
    /// called from a contact listener.
    pub fn step(&mut self, conf: &StepConf) -> Result<StepStats> {
        self.check_unlocked("step")?;

        let conf = StepConf {
            dt_ratio: conf.dt * self.inv_dt0,
            ..conf.clone()
        };
        self.broad_phase
            .set_margins(conf.aabb_extension, conf.displace_multiplier);

        self.locked = true;
        let stats = self.step_locked(&conf);
        self.locked = false;

        debug!(
            dt = conf.dt,
            contacts = self.contact_count(),
            added = stats.pre.added,
            destroyed = stats.pre.destroyed,
            islands = stats.reg.islands_found,
            slept = stats.reg.bodies_slept,
            toi_events = stats.toi.contacts_found,
            "World step"
        );
        Ok(stats)
    }

    fn step_locked(&mut self, conf: &StepConf) -> StepStats {
        let mut stats = StepStats::default();

        stats.pre.proxies_moved = self.broad_phase.move_count() as u32;
        stats.pre.added = self.find_new_contacts();
        self.collide(&mut stats.pre);

        if conf.dt > 0.0 {
            if self.step_complete {
                stats.reg = self.solve_regular(conf);
            }
            if conf.do_toi {
                stats.toi = self.solve_toi(conf);
            } else {
                self.step_complete = true;
            }
            self.inv_dt0 = 1.0 / conf.dt;
        }

        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
        stats
    }

    /// Re-filter, cull and update every contact.
    fn collide(&mut self, stats: &mut PreStepStats) {
        for id in self.contacts.ids() {
            let Some(contact) = self.contacts.get(id) else {
                continue;
            };
            let (proxy_a, proxy_b) = (contact.proxy_a, contact.proxy_b);
            let (body_a, body_b) = (contact.body_a, contact.body_b);

            if contact.needs_filtering {
                let keep = match (
                    self.fixtures.get(proxy_a.fixture),
                    self.fixtures.get(proxy_b.fixture),
                ) {
                    (Some(a), Some(b)) => self.should_collide(a, b),
                    _ => false,
                };
                if !keep {
                    self.destroy_contact(id);
                    stats.ignored += 1;
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(id) {
                    contact.needs_filtering = false;
                }
            }

            let active = |id: BodyId| {
                self.bodies
                    .get(id)
                    .is_some_and(|b| b.awake && b.body_type != BodyType::Static)
            };
            if !active(body_a) && !active(body_b) {
                stats.skipped += 1;
                continue;
            }

            let (Some(fixture_a), Some(fixture_b)) = (
                self.fixtures.get(proxy_a.fixture),
                self.fixtures.get(proxy_b.fixture),
            ) else {
                continue;
            };
            let overlap = match (
                fixture_a.proxies.get(proxy_a.child as usize),
                fixture_b.proxies.get(proxy_b.child as usize),
            ) {
                (Some(&a), Some(&b)) => self.broad_phase.test_overlap(a, b),
                _ => false,
            };
            if !overlap {
                self.destroy_contact(id);
                stats.destroyed += 1;
                continue;
            }

            self.update_contact(id);
            stats.updated += 1;
        }
    }

    /// Solve every awake island over the full step.
    fn solve_regular(&mut self, conf: &StepConf) -> RegStepStats {
        let mut stats = RegStepStats::default();
        let step = conf.solver_step();
        let mut marks = IslandMarks::for_world(self);
        let mut slots = vec![BodyConstraint::default(); self.bodies.capacity()];
        let mut stack = Vec::new();

        for seed in self.bodies.ids() {
            if marks.bodies.get(seed.index()) {
                continue;
            }
            let Some(body) = self.bodies.get(seed) else {
                continue;
            };
            if !body.awake || !body.enabled || body.body_type == BodyType::Static {
                continue;
            }

            let island = self.build_island(seed, &mut marks, &mut stack);
            stats.islands_found += 1;

            let outcome = self.solve_island(&island, &step, conf, &mut slots);
            stats.min_separation = stats.min_separation.min(outcome.min_separation);
            stats.max_inc_impulse = stats.max_inc_impulse.max(outcome.max_inc_impulse);
            stats.sum_pos_iters += outcome.position_iterations;
            stats.sum_vel_iters += outcome.velocity_iterations;
            stats.bodies_slept += outcome.bodies_slept;
            if outcome.solved {
                stats.islands_solved += 1;
            }

            // Static bodies may take part in other islands.
            for id in &island.bodies {
                if self
                    .bodies
                    .get(*id)
                    .is_some_and(|b| b.body_type == BodyType::Static)
                {
                    marks.bodies.set(id.index(), false);
                }
            }
        }

        // Bodies outside every island did not move.
        for id in self.bodies.ids() {
            if !marks.bodies.get(id.index()) {
                continue;
            }
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }
            let (xf0, xf) = (body.transform0(), body.xf);
            stats.proxies_moved += self.synchronize_fixtures(id, &xf0, &xf);
        }

        stats.contacts_added = self.find_new_contacts();
        stats
    }

    /// Handle time of impact events, earliest first, until none is left
    /// before the end of the step.
    fn solve_toi(&mut self, conf: &StepConf) -> ToiStepStats {
        let mut stats = ToiStepStats::default();
        let toi_conf = conf.toi_conf();

        if self.step_complete {
            for (_, body) in self.bodies.iter_mut() {
                body.sweep.alpha0 = 0.0;
            }
            for (_, contact) in self.contacts.iter_mut() {
                contact.toi = None;
                contact.toi_count = 0;
            }
        }

        let mut marks = IslandMarks::for_world(self);
        let mut slots = vec![BodyConstraint::default(); self.bodies.capacity()];

        loop {
            let mut min_contact = None;
            let mut min_alpha = 1.0f32;
            for id in self.contacts.ids() {
                let Some(alpha) = self.contact_toi(id, conf, &toi_conf, &mut stats) else {
                    continue;
                };
                if alpha < min_alpha {
                    min_contact = Some(id);
                    min_alpha = alpha;
                }
            }

            let Some(contact_id) = min_contact else {
                self.step_complete = true;
                break;
            };
            if 1.0 - 10.0 * f32::EPSILON < min_alpha {
                self.step_complete = true;
                break;
            }
            let Some(contact) = self.contacts.get(contact_id) else {
                self.step_complete = true;
                break;
            };
            let (a, b) = (contact.body_a, contact.body_b);
            stats.contacts_found += 1;

            // Advance both bodies to the impact and see if they really touch.
            let (Some(backup_a), Some(backup_b)) = (
                self.bodies.get(a).map(|b| b.sweep),
                self.bodies.get(b).map(|b| b.sweep),
            ) else {
                break;
            };
            for id in [a, b] {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.advance(min_alpha);
                }
            }

            self.update_contact(contact_id);
            stats.contacts_updated += 1;

            let Some(contact) = self.contacts.get_mut(contact_id) else {
                continue;
            };
            contact.toi = None;
            contact.toi_count += 1;
            if contact.toi_count >= conf.max_sub_steps {
                stats.contacts_at_max_sub_steps += 1;
            }

            if !contact.enabled || !contact.touching {
                // Ignore this contact for the rest of the step.
                contact.enabled = false;
                for (id, backup) in [(a, backup_a), (b, backup_b)] {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.sweep = backup;
                        body.synchronize_transform();
                    }
                }
                continue;
            }

            for id in [a, b] {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.set_awake(true);
                }
            }

            trace!(contact = contact_id.index(), alpha = min_alpha, "TOI event");

            let island = self.build_toi_island(contact_id, a, b, min_alpha, &mut marks, &mut stats);
            stats.islands_found += 1;

            let sub_step = SolverStep {
                dt: (1.0 - min_alpha) * conf.dt,
                inv_dt: 1.0 / ((1.0 - min_alpha) * conf.dt),
                dt_ratio: 1.0,
                do_warm_start: false,
                velocity_threshold: conf.velocity_threshold,
            };
            let outcome = self.solve_toi_island(&island, a, b, &sub_step, conf, &mut slots);
            stats.min_separation = stats.min_separation.min(outcome.min_separation);
            stats.max_inc_impulse = stats.max_inc_impulse.max(outcome.max_inc_impulse);
            stats.sum_pos_iters += outcome.position_iterations;
            stats.sum_vel_iters += outcome.velocity_iterations;
            if outcome.solved {
                stats.islands_solved += 1;
            }

            // Moved bodies need new proxies and fresh TOIs.
            for id in &island.bodies {
                marks.bodies.set(id.index(), false);
                let Some(body) = self.bodies.get(*id) else {
                    continue;
                };
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                let (xf0, xf) = (body.transform0(), body.xf);
                let contacts = body.contacts.clone();
                stats.proxies_moved += self.synchronize_fixtures(*id, &xf0, &xf);
                for c in contacts {
                    if let Some(contact) = self.contacts.get_mut(c) {
                        contact.toi = None;
                    }
                    marks.contacts.set(c.index(), false);
                }
            }
            for c in &island.contacts {
                marks.contacts.set(c.index(), false);
            }

            stats.contacts_added += self.find_new_contacts();

            if self.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
        stats
    }

    /// The cached or freshly computed impact fraction of a contact, or
    /// `None` when it takes no part in continuous collision.
    fn contact_toi(
        &mut self,
        id: ContactId,
        conf: &StepConf,
        toi_conf: &ToiConf,
        stats: &mut ToiStepStats,
    ) -> Option<f32> {
        let contact = self.contacts.get(id)?;
        if !contact.enabled || contact.toi_count > conf.max_sub_steps {
            return None;
        }
        if let Some(alpha) = contact.toi {
            return Some(alpha);
        }

        let fixture_a = self.fixtures.get(contact.proxy_a.fixture)?;
        let fixture_b = self.fixtures.get(contact.proxy_b.fixture)?;
        if fixture_a.is_sensor || fixture_b.is_sensor {
            return None;
        }
        let (a, b) = (contact.body_a, contact.body_b);
        let body_a = self.bodies.get(a)?;
        let body_b = self.bodies.get(b)?;

        let active_a = body_a.awake && body_a.body_type != BodyType::Static;
        let active_b = body_b.awake && body_b.body_type != BodyType::Static;
        if !active_a && !active_b {
            return None;
        }
        // Dynamic bodies only sweep against each other when one is a bullet.
        let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
        let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;
        if !collide_a && !collide_b {
            return None;
        }

        // Put both sweeps on the same start time.
        let mut sweep_a = body_a.sweep;
        let mut sweep_b = body_b.sweep;
        let alpha0 = sweep_a.alpha0.max(sweep_b.alpha0);
        if sweep_a.alpha0 < alpha0 {
            sweep_a.advance(alpha0);
        } else if sweep_b.alpha0 < alpha0 {
            sweep_b.advance(alpha0);
        }

        let output = {
            let proxy_a = fixture_a.shape.child(contact.proxy_a.child as usize).ok()?;
            let proxy_b = fixture_b.shape.child(contact.proxy_b.child as usize).ok()?;
            time_of_impact(&proxy_a, sweep_a, &proxy_b, sweep_b, toi_conf)
        };
        stats.max_dist_iters = stats.max_dist_iters.max(output.stats.max_dist_iters);
        stats.max_toi_iters = stats.max_toi_iters.max(output.stats.toi_iters);
        stats.max_root_iters = stats.max_root_iters.max(output.stats.max_root_iters);

        let alpha = if output.state == ToiState::Touching {
            (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
        } else {
            1.0
        };

        if let Some(body) = self.bodies.get_mut(a) {
            body.sweep = sweep_a;
        }
        if let Some(body) = self.bodies.get_mut(b) {
            body.sweep = sweep_b;
        }
        if let Some(contact) = self.contacts.get_mut(id) {
            contact.toi = Some(alpha);
        }
        Some(alpha)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::f32::consts::PI;
    use std::rc::Rc;

    use super::*;
    use crate::error::PhysicsError;
    use crate::physics::collider::{DiskShape, PolygonShape};
    use crate::physics::contact::ContactListener;
    use crate::physics::fixture::FixtureConf;
    use crate::physics::joint::RevoluteJointConf;
    use crate::physics::rigid_body::BodyConf;

    fn dense() -> FixtureConf {
        FixtureConf {
            density: 1.0,
            ..FixtureConf::default()
        }
    }

    /// Static ground whose top face is at y = 0.
    fn ground(world: &mut World) -> BodyId {
        let ground = world
            .create_body(&BodyConf::default().with_position(Vec2::new(0.0, -0.5)))
            .unwrap();
        world
            .create_fixture(ground, PolygonShape::new_box(20.0, 0.5).unwrap(), &dense())
            .unwrap();
        ground
    }

    fn dynamic_box(world: &mut World, position: Vec2) -> BodyId {
        let body = world
            .create_body(&BodyConf::dynamic().with_position(position))
            .unwrap();
        world
            .create_fixture(body, PolygonShape::new_box(0.5, 0.5).unwrap(), &dense())
            .unwrap();
        body
    }

    #[test]
    fn test_defaults_match_settings() {
        let conf = StepConf::default();
        assert_eq!(conf.reg_velocity_iterations, 8);
        assert_eq!(conf.toi_position_iterations, 20);
        assert!((conf.target_depth - 0.015).abs() < 1e-7);
        assert!((conf.max_rotation - PI / 2.0).abs() < 1e-6);
        assert!((conf.angular_sleep_tolerance.to_degrees() - 2.0).abs() < 1e-4);

        let step = StepConf::with_dt(0.0).solver_step();
        assert_eq!(step.inv_dt, 0.0);

        let toi = conf.toi_solver_conf();
        assert_eq!(toi.resolution_rate, 0.75);
        assert_eq!(toi.linear_slop, conf.linear_slop);
    }

    #[test]
    fn test_falling_body() {
        let mut world = World::default();
        let body = dynamic_box(&mut world, Vec2::new(0.0, 10.0));
        let conf = StepConf::default();
        for _ in 0..60 {
            world.step(&conf).unwrap();
        }
        let y = world.body(body).unwrap().position().y;
        // Semi-implicit Euler: 10 - g * h^2 * n (n + 1) / 2.
        assert!(y < 5.5 && y > 4.5, "Body should have fallen: y = {}", y);
        assert!(!world.is_locked());
    }

    #[test]
    fn test_zero_dt_only_collides() {
        let mut world = World::default();
        let body = world
            .create_body(&BodyConf::dynamic().with_velocity(Vec2::new(1.0, 0.0), 0.0))
            .unwrap();
        world
            .create_fixture(body, DiskShape::new(0.5), &dense())
            .unwrap();
        world
            .body_mut(body)
            .unwrap()
            .apply_force_to_center(Vec2::new(5.0, 0.0), true);

        let stats = world.step(&StepConf::with_dt(0.0)).unwrap();
        let b = world.body(body).unwrap();
        assert_eq!(b.position(), Vec2::ZERO);
        assert_eq!(b.force(), Vec2::ZERO, "forces are cleared every step");
        assert_eq!(stats.reg.islands_found, 0);
    }

    #[test]
    fn test_box_comes_to_rest_and_sleeps() {
        let mut world = World::default();
        ground(&mut world);
        let body = dynamic_box(&mut world, Vec2::new(0.0, 0.5));
        let conf = StepConf::default();

        let mut slept = 0;
        for _ in 0..240 {
            slept += world.step(&conf).unwrap().reg.bodies_slept;
        }

        let b = world.body(body).unwrap();
        assert!(
            (b.position().y - 0.5).abs() < 0.05,
            "Box should rest on the ground: y = {}",
            b.position().y
        );
        assert!(!b.is_awake(), "Box should be asleep");
        assert_eq!(slept, 1);
        assert_eq!(world.contact_count(), 1);
    }

    #[test]
    fn test_fast_disk_does_not_tunnel() {
        let mut world = World::default();
        ground(&mut world);
        let disk = world
            .create_body(
                &BodyConf::dynamic()
                    .with_position(Vec2::new(0.0, 3.0))
                    .with_velocity(Vec2::new(0.0, -200.0), 0.0),
            )
            .unwrap();
        world
            .create_fixture(disk, DiskShape::new(0.1), &dense())
            .unwrap();

        let conf = StepConf::default();
        let mut events = 0;
        for _ in 0..30 {
            events += world.step(&conf).unwrap().toi.contacts_found;
            let y = world.body(disk).unwrap().position().y;
            assert!(y > 0.0, "Disk should stay above the ground: y = {}", y);
        }
        assert!(events >= 1, "the impact is handled as a TOI event");
    }

    #[test]
    fn test_sub_stepping_stops_after_one_event() {
        let mut world = World::default();
        ground(&mut world);
        let disk = world
            .create_body(
                &BodyConf::dynamic()
                    .with_position(Vec2::new(0.0, 1.0))
                    .with_velocity(Vec2::new(0.0, -120.0), 0.0),
            )
            .unwrap();
        world
            .create_fixture(disk, DiskShape::new(0.1), &dense())
            .unwrap();
        world.set_sub_stepping(true);

        let conf = StepConf::default();
        let stats = world.step(&conf).unwrap();
        assert_eq!(stats.toi.contacts_found, 1);
        assert!(!world.is_step_complete());

        let mut calls = 0;
        while !world.is_step_complete() && calls < 20 {
            let stats = world.step(&conf).unwrap();
            assert_eq!(stats.reg.islands_found, 0, "regular solve waits for the step to finish");
            calls += 1;
        }
        assert!(world.is_step_complete());
        assert!(world.body(disk).unwrap().position().y > 0.0);
    }

    #[derive(Default)]
    struct Events {
        begins: u32,
        ends: u32,
        create_error: Option<PhysicsError>,
    }

    struct Recorder(Rc<RefCell<Events>>);

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, world: &mut World, _contact: ContactId) {
            let mut events = self.0.borrow_mut();
            events.begins += 1;
            if let Err(err) = world.create_body(&BodyConf::dynamic()) {
                events.create_error = Some(err);
            }
        }

        fn end_contact(&mut self, _world: &mut World, _contact: ContactId) {
            self.0.borrow_mut().ends += 1;
        }
    }

    #[test]
    fn test_begin_and_end_events() {
        let mut world = World::default();
        world.set_gravity(Vec2::ZERO);
        dynamic_box(&mut world, Vec2::ZERO);
        let b = dynamic_box(&mut world, Vec2::new(0.5, 0.0));
        let events = Rc::new(RefCell::new(Events::default()));
        world.set_contact_listener(Recorder(Rc::clone(&events)));

        world.step(&StepConf::default()).unwrap();
        assert_eq!(events.borrow().begins, 1);
        assert_eq!(
            events.borrow().create_error,
            Some(PhysicsError::WrongState {
                operation: "create body"
            }),
            "listeners run with the world locked"
        );
        assert_eq!(world.body_count(), 2);

        world.set_transform(b, Vec2::new(50.0, 0.0), 0.0).unwrap();
        let stats = world.step(&StepConf::default()).unwrap();
        assert_eq!(stats.pre.destroyed, 1);
        assert_eq!(events.borrow().ends, 1);
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn test_pendulum_keeps_its_length() {
        let mut world = World::default();
        let pivot = world.create_body(&BodyConf::default()).unwrap();
        let bob = world
            .create_body(&BodyConf::dynamic().with_position(Vec2::new(2.0, 0.0)))
            .unwrap();
        world
            .create_fixture(bob, DiskShape::new(0.25), &dense())
            .unwrap();
        world
            .create_joint(RevoluteJointConf::at_anchor(&world, pivot, bob, Vec2::ZERO).unwrap())
            .unwrap();

        let conf = StepConf::default();
        let mut lowest = f32::MAX;
        for _ in 0..120 {
            world.step(&conf).unwrap();
            let p = world.body(bob).unwrap().position();
            lowest = lowest.min(p.y);
            assert!((p.length() - 2.0).abs() < 0.05, "Pendulum stretched: |p| = {}", p.length());
        }
        assert!(lowest < -1.5, "Pendulum should swing down: lowest y = {}", lowest);
    }
}
