//! Pulley joint: `length_a + ratio * length_b` stays constant, with each
//! length measured from a fixed ground anchor.

use glam::Vec2;

use super::{Constraint, JointBase, JointBody};
use crate::error::{PhysicsError, Result};
use crate::physics::math::{cross, cross_sv, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`PulleyJoint`].
#[derive(Debug, Clone)]
pub struct PulleyJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: true.
    pub collide_connected: bool,
    /// World point the rope of A hangs from. Default: (-1, 1).
    pub ground_anchor_a: Vec2,
    /// Default: (1, 1).
    pub ground_anchor_b: Vec2,
    /// Default: (-1, 0).
    pub local_anchor_a: Vec2,
    /// Default: (1, 0).
    pub local_anchor_b: Vec2,
    /// Default: 0.
    pub length_a: f32,
    /// Default: 0.
    pub length_b: f32,
    /// Must be positive. Default: 1.
    pub ratio: f32,
}

impl PulleyJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            ground_anchor_a: Vec2::new(-1.0, 1.0),
            ground_anchor_b: Vec2::new(1.0, 1.0),
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
        }
    }

    /// Hang both bodies from ground anchors, taking the current rope lengths.
    #[allow(clippy::too_many_arguments)]
    pub fn hanging(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    ) -> Result<Self> {
        Ok(Self {
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: world.body(body_a)?.local_point(anchor_a),
            local_anchor_b: world.body(body_b)?.local_point(anchor_b),
            length_a: anchor_a.distance(ground_anchor_a),
            length_b: anchor_b.distance(ground_anchor_b),
            ratio,
            ..Self::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone)]
pub struct PulleyJoint {
    base: JointBase,
    pub(crate) ground_anchor_a: Vec2,
    pub(crate) ground_anchor_b: Vec2,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length_a: f32,
    length_b: f32,
    pub(crate) ratio: f32,
    constant: f32,
    impulse: f32,

    a: JointBody,
    b: JointBody,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl PulleyJoint {
    pub fn new(conf: &PulleyJointConf) -> Result<Self> {
        if conf.ratio.is_nan() || conf.ratio <= f32::EPSILON {
            return Err(PhysicsError::invalid_argument(format!(
                "pulley ratio must be positive, got {}",
                conf.ratio
            )));
        }
        Ok(Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            ground_anchor_a: conf.ground_anchor_a,
            ground_anchor_b: conf.ground_anchor_b,
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            length_a: conf.length_a,
            length_b: conf.length_b,
            ratio: conf.ratio,
            constant: conf.length_a + conf.ratio * conf.length_b,
            impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn length_a(&self) -> f32 {
        self.length_a
    }

    pub fn length_b(&self) -> f32 {
        self.length_b
    }

    /// Unit direction from the ground anchor and length of one rope side.
    fn rope(anchor_point: Vec2, ground: Vec2, slop: f32) -> (Vec2, f32) {
        let u = anchor_point - ground;
        let length = u.length();
        if length > 10.0 * slop {
            (u / length, length)
        } else {
            (Vec2::ZERO, length)
        }
    }

    fn effective_mass(&self, r_a: Vec2, u_a: Vec2, r_b: Vec2, u_b: Vec2) -> f32 {
        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);
        let m_a = self.a.inv_mass + self.a.inv_i * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_i * ru_b * ru_b;
        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            1.0 / mass
        } else {
            mass
        }
    }
}

impl Constraint for PulleyJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn init_velocity(
        &mut self,
        bodies: &mut [BodyConstraint],
        step: &SolverStep,
        conf: &ConstraintSolverConf,
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

        let (u_a, length_a) = Self::rope(pos_a.c + self.r_a, self.ground_anchor_a, conf.linear_slop);
        let (u_b, length_b) = Self::rope(pos_b.c + self.r_b, self.ground_anchor_b, conf.linear_slop);
        self.u_a = u_a;
        self.u_b = u_b;
        self.length_a = length_a;
        self.length_b = length_b;
        self.mass = self.effective_mass(self.r_a, u_a, self.r_b, u_b);

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            let p_a = -self.impulse * self.u_a;
            let p_b = -self.ratio * self.impulse * self.u_b;
            vel_a.v += m_a * p_a;
            vel_a.w += i_a * cross(self.r_a, p_a);
            vel_b.v += m_b * p_b;
            vel_b.w += i_b * cross(self.r_b, p_b);
        } else {
            self.impulse = 0.0;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], _step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);

        let vp_a = vel_a.v + cross_sv(vel_a.w, self.r_a);
        let vp_b = vel_b.v + cross_sv(vel_b.w, self.r_b);

        let cdot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        let p_a = -impulse * self.u_a;
        let p_b = -self.ratio * impulse * self.u_b;
        vel_a.v += m_a * p_a;
        vel_a.w += i_a * cross(self.r_a, p_a);
        vel_b.v += m_b * p_b;
        vel_b.w += i_b * cross(self.r_b, p_b);

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        impulse == 0.0
    }

    fn solve_position(
        &mut self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
    ) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut pos_a = self.a.position(bodies);
        let mut pos_b = self.b.position(bodies);

        let r_a = self.a.arm(Rot::from_angle(pos_a.a), self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let (u_a, length_a) = Self::rope(pos_a.c + r_a, self.ground_anchor_a, conf.linear_slop);
        let (u_b, length_b) = Self::rope(pos_b.c + r_b, self.ground_anchor_b, conf.linear_slop);
        let mass = self.effective_mass(r_a, u_a, r_b, u_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();
        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = -self.ratio * impulse * u_b;
        pos_a.c += m_a * p_a;
        pos_a.a += i_a * cross(r_a, p_a);
        pos_b.c += m_b * p_b;
        pos_b.a += i_b * cross(r_b, p_b);

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        linear_error < conf.linear_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse * self.u_b
    }

    fn angular_reaction(&self) -> f32 {
        0.0
    }

    fn shift_origin(&mut self, new_origin: Vec2) {
        self.ground_anchor_a -= new_origin;
        self.ground_anchor_b -= new_origin;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    fn pulley(ratio: f32) -> (PulleyJoint, Vec<BodyConstraint>) {
        let bodies = two_bodies(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0));
        let mut conf = PulleyJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.ground_anchor_a = Vec2::new(-2.0, 4.0);
        conf.ground_anchor_b = Vec2::new(2.0, 4.0);
        conf.local_anchor_a = Vec2::ZERO;
        conf.local_anchor_b = Vec2::ZERO;
        conf.length_a = 4.0;
        conf.length_b = 4.0;
        conf.ratio = ratio;
        (PulleyJoint::new(&conf).unwrap(), bodies)
    }

    #[test]
    fn test_pulling_one_side_lifts_the_other() {
        let (mut joint, mut bodies) = pulley(1.0);
        bodies[0].velocity.v = Vec2::new(0.0, -2.0);
        solve(&mut joint, &mut bodies, 10);
        let (a, b) = (bodies[0].position.c, bodies[1].position.c);
        assert!(a.y < 0.0 && b.y > 0.0, "B should rise as A falls: a = {:?}, b = {:?}", a, b);
        let total = (4.0 - a.y) + (4.0 - b.y);
        assert!((total - 8.0).abs() < 0.02, "Rope length changed: {}", total);
    }

    #[test]
    fn test_zero_ratio_is_rejected() {
        let mut conf = PulleyJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.ratio = 0.0;
        assert!(PulleyJoint::new(&conf).is_err());
    }

    #[test]
    fn test_shift_origin_moves_ground_anchors() {
        let (mut joint, _) = pulley(1.0);
        joint.shift_origin(Vec2::new(1.0, 1.0));
        assert_eq!(joint.ground_anchor_a, Vec2::new(-3.0, 3.0));
        assert_eq!(joint.ground_anchor_b, Vec2::new(1.0, 3.0));
    }
}
