//! Target joint: a soft spring pulling a point on body B toward a world
//! target. Body A only anchors the joint in the graph and is not solved.

use glam::{Mat2, Vec2};

use super::motor::point_mass;
use super::{soft_coefficients, Constraint, JointBase, JointBody};
use crate::physics::math::{cross, cross_sv, inverse22, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::BodyId;

/// Angular velocity kept per step by the target joint's built-in damping.
const ANGULAR_DAMPING: f32 = 0.98;

/// Configuration for a [`TargetJoint`].
#[derive(Debug, Clone)]
pub struct TargetJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// World point to pull toward. Default: (0, 0).
    pub target: Vec2,
    /// Point on body B that is pulled. Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Default: 0.
    pub max_force: f32,
    /// Default: 5.
    pub frequency: f32,
    /// Default: 0.7.
    pub damping_ratio: f32,
}

impl TargetJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            target: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force: 0.0,
            frequency: 5.0,
            damping_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetJoint {
    base: JointBase,
    pub(crate) target: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_force: f32,
    pub(crate) frequency: f32,
    pub(crate) damping_ratio: f32,
    impulse: Vec2,

    b: JointBody,
    r_b: Vec2,
    mass: Mat2,
    c: Vec2,
    gamma: f32,
}

impl TargetJoint {
    pub fn new(conf: &TargetJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            target: conf.target,
            local_anchor_b: conf.local_anchor_b,
            max_force: conf.max_force,
            frequency: conf.frequency,
            damping_ratio: conf.damping_ratio,
            impulse: Vec2::ZERO,
            b: JointBody::default(),
            r_b: Vec2::ZERO,
            mass: Mat2::ZERO,
            c: Vec2::ZERO,
            gamma: 0.0,
        }
    }
}

impl Constraint for TargetJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn init_velocity(
        &mut self,
        bodies: &mut [BodyConstraint],
        step: &SolverStep,
        _conf: &ConstraintSolverConf,
    ) {
        self.b = JointBody::load(bodies, self.base.body_b);
        let (m_b, i_b) = (self.b.inv_mass, self.b.inv_i);

        let pos_b = self.b.position(bodies);
        let mut vel_b = self.b.velocity(bodies);

        let mass = if m_b > 0.0 { 1.0 / m_b } else { 0.0 };
        let (gamma, beta) = soft_coefficients(mass, self.frequency, self.damping_ratio, step.dt);
        self.gamma = gamma;

        self.r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);

        let mut k = point_mass(0.0, 0.0, Vec2::ZERO, m_b, i_b, self.r_b);
        k.x_axis.x += self.gamma;
        k.y_axis.y += self.gamma;
        self.mass = inverse22(k);

        self.c = (pos_b.c + self.r_b - self.target) * beta;

        vel_b.w *= ANGULAR_DAMPING;

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            vel_b.v += m_b * self.impulse;
            vel_b.w += i_b * cross(self.r_b, self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_b, i_b) = (self.b.inv_mass, self.b.inv_i);
        let mut vel_b = self.b.velocity(bodies);

        let cdot = vel_b.v + cross_sv(vel_b.w, self.r_b);
        let impulse = self.mass * (-(cdot + self.c + self.gamma * self.impulse));

        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        let impulse = self.impulse - old;

        vel_b.v += m_b * impulse;
        vel_b.w += i_b * cross(self.r_b, impulse);

        self.b.set_velocity(bodies, vel_b);
        impulse == Vec2::ZERO
    }

    fn solve_position(
        &mut self,
        _bodies: &mut [BodyConstraint],
        _conf: &ConstraintSolverConf,
    ) -> bool {
        true
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse
    }

    fn angular_reaction(&self) -> f32 {
        0.0
    }

    fn shift_origin(&mut self, new_origin: Vec2) {
        self.target -= new_origin;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    #[test]
    fn test_body_is_dragged_to_target() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::ZERO);
        let mut conf = TargetJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.target = Vec2::new(1.0, 1.0);
        conf.max_force = 1000.0;
        let mut joint = TargetJoint::new(&conf);

        solve(&mut joint, &mut bodies, 180);

        let b = bodies[1].position.c;
        assert!(b.distance(Vec2::new(1.0, 1.0)) < 0.05, "Body should reach the target: {:?}", b);
        assert_eq!(bodies[0].position.c, Vec2::ZERO, "Body A is never moved");
    }

    #[test]
    fn test_shift_origin_moves_target() {
        let mut conf = TargetJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.target = Vec2::new(5.0, 5.0);
        let mut joint = TargetJoint::new(&conf);
        joint.shift_origin(Vec2::new(2.0, 3.0));
        assert_eq!(joint.target, Vec2::new(3.0, 2.0));
    }
}
