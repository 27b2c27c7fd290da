//! Friction joint: top-down friction resisting relative motion with bounded
//! force and torque.

use glam::{Mat2, Vec2};

use super::motor::point_mass;
use super::{Constraint, JointBase, JointBody};
use crate::physics::math::{cross, cross_sv, inverse22, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::BodyId;

/// Configuration for a [`FrictionJoint`].
#[derive(Debug, Clone)]
pub struct FrictionJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Default: 0.
    pub max_force: f32,
    /// Default: 0.
    pub max_torque: f32,
}

impl FrictionJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force: 0.0,
            max_torque: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_force: f32,
    pub(crate) max_torque: f32,
    linear_impulse: Vec2,
    angular_impulse: f32,

    a: JointBody,
    b: JointBody,
    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat2,
    pub(crate) angular_mass: f32,
}

impl FrictionJoint {
    pub fn new(conf: &FrictionJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            max_force: conf.max_force,
            max_torque: conf.max_torque,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        }
    }
}

impl Constraint for FrictionJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn init_velocity(
        &mut self,
        bodies: &mut [BodyConstraint],
        step: &SolverStep,
        _conf: &ConstraintSolverConf,
    ) {
        self.a = JointBody::load(bodies, self.base.body_a);
        self.b = JointBody::load(bodies, self.base.body_b);
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);

        let pos_a = self.a.position(bodies);
        let pos_b = self.b.position(bodies);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);

        self.r_a = self.a.arm(Rot::from_angle(pos_a.a), self.local_anchor_a);
        self.r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);

        self.linear_mass = inverse22(point_mass(m_a, i_a, self.r_a, m_b, i_b, self.r_b));
        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if step.do_warm_start {
            self.linear_impulse *= step.dt_ratio;
            self.angular_impulse *= step.dt_ratio;
            let p = self.linear_impulse;
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(self.r_a, p) + self.angular_impulse);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(self.r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);
        let h = step.dt;

        // Angular friction.
        let cdot = vel_b.w - vel_a.w;
        let impulse = -self.angular_mass * cdot;
        let old = self.angular_impulse;
        let max_impulse = h * self.max_torque;
        self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
        let angular = self.angular_impulse - old;

        vel_a.w -= i_a * angular;
        vel_b.w += i_b * angular;

        // Linear friction.
        let cdot = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a);
        let impulse = -(self.linear_mass * cdot);
        let old = self.linear_impulse;
        self.linear_impulse += impulse;

        let max_impulse = h * self.max_force;
        if self.linear_impulse.length_squared() > max_impulse * max_impulse {
            self.linear_impulse = self.linear_impulse.normalize_or_zero() * max_impulse;
        }
        let linear = self.linear_impulse - old;

        vel_a.v -= m_a * linear;
        vel_a.w -= i_a * cross(r_a, linear);
        vel_b.v += m_b * linear;
        vel_b.w += i_b * cross(r_b, linear);

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        angular == 0.0 && linear == Vec2::ZERO
    }

    fn solve_position(
        &mut self,
        _bodies: &mut [BodyConstraint],
        _conf: &ConstraintSolverConf,
    ) -> bool {
        true
    }

    fn linear_reaction(&self) -> Vec2 {
        self.linear_impulse
    }

    fn angular_reaction(&self) -> f32 {
        self.angular_impulse
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    #[test]
    fn test_friction_decelerates_at_bounded_rate() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::ZERO);
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;
        bodies[1].velocity.v = Vec2::new(3.0, 0.0);
        bodies[1].velocity.w = 2.0;
        let mut conf = FrictionJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.max_force = 6.0;
        conf.max_torque = 6.0;
        let mut joint = FrictionJoint::new(&conf);

        solve(&mut joint, &mut bodies, 1);
        let b = bodies[1];
        assert!((b.velocity.v.x - 2.9).abs() < 1e-4, "vx = {}", b.velocity.v.x);
        assert!((b.velocity.w - 1.9).abs() < 1e-4, "w = {}", b.velocity.w);

        solve(&mut joint, &mut bodies, 40);
        assert!(bodies[1].velocity.v.length() < 1e-3, "Friction should stop the body");
    }
}
