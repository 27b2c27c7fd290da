//! Rigid bodies: configuration, mass, forces and sleep state.
//!
//! A body owns its transform and motion sweep. The world keeps the lists of
//! fixtures, joints and contacts attached to it so island building can walk
//! the constraint graph.

use glam::Vec2;

use super::collider::MassData;
use super::contact::ContactId;
use super::fixture::FixtureId;
use super::math::{cross, cross_sv, Rot, Sweep, Transformation, Velocity};
use super::world::JointId;

/// How a body responds to forces and constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Zero velocity, infinite mass. Moved only by the user.
    #[default]
    Static,
    /// Moves with its velocity but ignores forces. Infinite mass.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Configuration for creating a body.
#[derive(Debug, Clone)]
pub struct BodyConf {
    /// Default: static.
    pub body_type: BodyType,
    /// World position of the body origin. Default: (0, 0).
    pub position: Vec2,
    /// Default: 0.
    pub angle: f32,
    /// Linear velocity of the body origin. Default: (0, 0).
    pub linear_velocity: Vec2,
    /// Default: 0.
    pub angular_velocity: f32,
    /// Default: 0.
    pub linear_damping: f32,
    /// Default: 0.
    pub angular_damping: f32,
    /// Multiplier on world gravity. Default: 1.
    pub gravity_scale: f32,
    /// Default: true.
    pub allow_sleep: bool,
    /// Default: true.
    pub awake: bool,
    /// Prevent rotation. Default: false.
    pub fixed_rotation: bool,
    /// Treat as a fast mover for continuous collision against dynamic
    /// bodies. Default: false.
    pub bullet: bool,
    /// Default: true.
    pub enabled: bool,
}

impl Default for BodyConf {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
        }
    }
}

impl BodyConf {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyType::Kinematic)
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }
}

/// A rigid body.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,
    /// Transform of the body origin.
    pub(crate) xf: Transformation,
    /// Motion of the center of mass over the current step.
    pub(crate) sweep: Sweep,
    /// Velocity of the center of mass.
    pub(crate) velocity: Velocity,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_i: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,
    pub(crate) sleep_time: f32,
    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) bullet: bool,
    pub(crate) enabled: bool,
    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joints: Vec<JointId>,
    pub(crate) contacts: Vec<ContactId>,
}

impl Body {
    pub(crate) fn new(conf: &BodyConf) -> Self {
        let q = Rot::from_angle(conf.angle);
        let xf = Transformation::new(conf.position, q);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: conf.position,
            c: conf.position,
            a0: conf.angle,
            a: conf.angle,
            alpha0: 0.0,
        };
        let (mass, inv_mass) = if conf.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        let mut body = Self {
            body_type: conf.body_type,
            xf,
            sweep,
            velocity: Velocity::default(),
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_i: 0.0,
            linear_damping: conf.linear_damping,
            angular_damping: conf.angular_damping,
            gravity_scale: conf.gravity_scale,
            sleep_time: 0.0,
            awake: conf.awake,
            allow_sleep: conf.allow_sleep,
            fixed_rotation: conf.fixed_rotation,
            bullet: conf.bullet,
            enabled: conf.enabled,
            fixtures: Vec::new(),
            joints: Vec::new(),
            contacts: Vec::new(),
        };
        if body.body_type != BodyType::Static {
            body.velocity = Velocity {
                v: conf.linear_velocity,
                w: conf.angular_velocity,
            };
        }
        // A body that can never sleep starts awake.
        if !body.allow_sleep {
            body.awake = true;
        }
        body
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Transform of the body origin.
    pub fn transform(&self) -> &Transformation {
        &self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Linear velocity of the center of mass.
    pub fn linear_velocity(&self) -> Vec2 {
        self.velocity.v
    }

    pub fn angular_velocity(&self) -> f32 {
        self.velocity.w
    }

    /// Set the velocity of the center of mass. Ignored for static bodies;
    /// a non-zero velocity wakes the body.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        if self.body_type == BodyType::Static {
            return;
        }
        if velocity.v.length_squared() > 0.0 || velocity.w != 0.0 {
            self.set_awake(true);
        }
        self.velocity = velocity;
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Wake the body, or put it to sleep. Sleeping zeroes the velocity and
    /// any accumulated force. Static bodies never wake.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if !self.awake && self.body_type != BodyType::Static {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.velocity = Velocity::default();
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    pub fn set_sleeping_allowed(&mut self, allowed: bool) {
        self.allow_sleep = allowed;
        if !allowed {
            self.set_awake(true);
        }
    }

    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn set_bullet(&mut self, bullet: bool) {
        self.bullet = bullet;
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the body can have a non-zero velocity.
    pub fn is_speedable(&self) -> bool {
        self.body_type != BodyType::Static
    }

    /// Whether forces and contacts change the body's velocity.
    pub fn is_accelerable(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    pub fn contacts(&self) -> &[ContactId] {
        &self.contacts
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    /// Apply a force at a world point. Forces only act on dynamic bodies and
    /// are cleared at the end of every step. Sleeping bodies ignore the
    /// force unless `wake` is set.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if !self.prepare_to_accelerate(wake) {
            return;
        }
        self.force += force;
        self.torque += cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if !self.prepare_to_accelerate(wake) {
            return;
        }
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32, wake: bool) {
        if !self.prepare_to_accelerate(wake) {
            return;
        }
        self.torque += torque;
    }

    /// Apply an impulse at a world point, changing the velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if !self.prepare_to_accelerate(wake) {
            return;
        }
        self.velocity.v += self.inv_mass * impulse;
        self.velocity.w += self.inv_i * cross(point - self.sweep.c, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32, wake: bool) {
        if !self.prepare_to_accelerate(wake) {
            return;
        }
        self.velocity.w += self.inv_i * impulse;
    }

    fn prepare_to_accelerate(&mut self, wake: bool) -> bool {
        if self.body_type != BodyType::Dynamic {
            return false;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        self.awake
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.xf.apply(local)
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.xf.apply_inv(world)
    }

    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.xf.q.rotate(local)
    }

    pub fn local_vector(&self, world: Vec2) -> Vec2 {
        self.xf.q.inv_rotate(world)
    }

    /// Velocity of the material point currently at `world`.
    pub fn linear_velocity_from_world_point(&self, world: Vec2) -> Vec2 {
        self.velocity.v + cross_sv(self.velocity.w, world - self.sweep.c)
    }

    /// Recompute mass properties from the given per-fixture mass data.
    ///
    /// Static and kinematic bodies get zero mass. A dynamic body with no
    /// mass gets a mass of one so it still responds to gravity.
    pub(crate) fn reset_mass_data(&mut self, parts: impl IntoIterator<Item = MassData>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_i = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        let mut inertia = 0.0;
        for md in parts {
            if md.mass == 0.0 {
                continue;
            }
            self.mass += md.mass;
            local_center += md.mass * md.center;
            inertia += md.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if inertia > 0.0 && !self.fixed_rotation {
            // Center the inertia about the center of mass.
            self.inertia = inertia - self.mass * local_center.length_squared();
            debug_assert!(self.inertia > 0.0, "non-positive central inertia");
            self.inv_i = 1.0 / self.inertia;
        }

        self.move_center(local_center);
    }

    /// Override the mass properties of a dynamic body.
    pub fn set_mass_data(&mut self, data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.inv_i = 0.0;
        self.inertia = 0.0;
        self.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if data.inertia > 0.0 && !self.fixed_rotation {
            self.inertia = data.inertia - self.mass * data.center.length_squared();
            if self.inertia > 0.0 {
                self.inv_i = 1.0 / self.inertia;
            } else {
                self.inertia = 0.0;
            }
        }

        self.move_center(data.center);
    }

    /// Move the center of mass, keeping the velocity of the body origin.
    fn move_center(&mut self, local_center: Vec2) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;
        self.velocity.v += cross_sv(self.velocity.w, self.sweep.c - old_center);
    }

    /// Rebuild the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let q = Rot::from_angle(self.sweep.a);
        self.xf = Transformation::new(self.sweep.c - q.rotate(self.sweep.local_center), q);
    }

    /// Move the start of the sweep to `alpha` and snap the body there.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Teleport the body origin.
    pub(crate) fn set_transform(&mut self, position: Vec2, angle: f32) {
        self.xf = Transformation::new(position, Rot::from_angle(angle));
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Transform at the start of the sweep.
    pub(crate) fn transform0(&self) -> Transformation {
        self.sweep.transform_at(0.0)
    }
}
