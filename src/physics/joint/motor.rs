//! Motor joint: drives B toward a target offset from A with bounded force
//! and torque.

use glam::{Mat2, Vec2};

use super::{Constraint, JointBase, JointBody};
use crate::physics::math::{cross, cross_sv, inverse22, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::BodyId;

/// Configuration for a [`MotorJoint`].
#[derive(Debug, Clone)]
pub struct MotorJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Target position of B's origin in A's frame. Default: (0, 0).
    pub linear_offset: Vec2,
    /// Target angle of B relative to A. Default: 0.
    pub angular_offset: f32,
    /// Default: 1.
    pub max_force: f32,
    /// Default: 1.
    pub max_torque: f32,
    /// Fraction of the position error removed per step, in [0, 1].
    /// Default: 0.3.
    pub correction_factor: f32,
}

impl MotorJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            linear_offset: Vec2::ZERO,
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MotorJoint {
    base: JointBase,
    pub(crate) linear_offset: Vec2,
    pub(crate) angular_offset: f32,
    pub(crate) max_force: f32,
    pub(crate) max_torque: f32,
    correction_factor: f32,
    linear_impulse: Vec2,
    angular_impulse: f32,

    a: JointBody,
    b: JointBody,
    r_a: Vec2,
    r_b: Vec2,
    linear_error: Vec2,
    angular_error: f32,
    linear_mass: Mat2,
    pub(crate) angular_mass: f32,
}

impl MotorJoint {
    pub fn new(conf: &MotorJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            linear_offset: conf.linear_offset,
            angular_offset: conf.angular_offset,
            max_force: conf.max_force,
            max_torque: conf.max_torque,
            correction_factor: conf.correction_factor.clamp(0.0, 1.0),
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_error: Vec2::ZERO,
            angular_error: 0.0,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        }
    }
}

/// Point effective mass matrix shared by the motor and friction joints.
pub(super) fn point_mass(m_a: f32, i_a: f32, r_a: Vec2, m_b: f32, i_b: f32, r_b: Vec2) -> Mat2 {
    let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
    Mat2::from_cols(
        Vec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, k12),
        Vec2::new(k12, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
    )
}

impl Constraint for MotorJoint {
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

        let q_a = Rot::from_angle(pos_a.a);
        // Anchors sit at the body origins.
        self.r_a = self.a.arm(q_a, Vec2::ZERO);
        self.r_b = self.b.arm(Rot::from_angle(pos_b.a), Vec2::ZERO);

        self.linear_mass = inverse22(point_mass(m_a, i_a, self.r_a, m_b, i_b, self.r_b));
        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        self.linear_error =
            pos_b.c + self.r_b - pos_a.c - self.r_a - q_a.rotate(self.linear_offset);
        self.angular_error = pos_b.a - pos_a.a - self.angular_offset;

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
        let inv_h = step.inv_dt;

        // Angular.
        let cdot = vel_b.w - vel_a.w + inv_h * self.correction_factor * self.angular_error;
        let impulse = -self.angular_mass * cdot;
        let old = self.angular_impulse;
        let max_impulse = h * self.max_torque;
        self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
        let angular = self.angular_impulse - old;

        vel_a.w -= i_a * angular;
        vel_b.w += i_b * angular;

        // Linear.
        let cdot = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a)
            + inv_h * self.correction_factor * self.linear_error;
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
    fn test_motor_pulls_toward_offset() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::ZERO);
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;
        let mut conf = MotorJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.linear_offset = Vec2::new(2.0, 0.0);
        conf.angular_offset = 0.5;
        conf.max_force = 500.0;
        conf.max_torque = 500.0;
        let mut joint = MotorJoint::new(&conf);

        solve(&mut joint, &mut bodies, 120);

        let b = bodies[1];
        assert!((b.position.c.x - 2.0).abs() < 0.05, "Body should reach the offset: {:?}", b.position.c);
        assert!((b.position.a - 0.5).abs() < 0.05, "Body should reach the angle: {}", b.position.a);
    }

    #[test]
    fn test_force_limit_caps_impulse() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::ZERO);
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;
        let mut conf = MotorJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.linear_offset = Vec2::new(100.0, 0.0);
        conf.max_force = 3.0;
        let mut joint = MotorJoint::new(&conf);

        solve(&mut joint, &mut bodies, 1);
        assert!((joint.linear_reaction().length() - 3.0 / 60.0).abs() < 1e-5);
    }
}
