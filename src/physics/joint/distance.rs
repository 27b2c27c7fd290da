//! Distance joint: keeps two anchor points at a fixed distance, optionally
//! as a soft spring.

use glam::Vec2;

use super::{soft_coefficients, Constraint, JointBase, JointBody};
use crate::error::Result;
use crate::physics::math::{cross, cross_sv, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`DistanceJoint`].
#[derive(Debug, Clone)]
pub struct DistanceJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Rest length. Default: 1.
    pub length: f32,
    /// Spring frequency in Hz; zero makes the joint rigid. Default: 0.
    pub frequency: f32,
    /// Default: 0.
    pub damping_ratio: f32,
}

impl DistanceJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Join two world anchors, using their current distance as the rest length.
    pub fn between(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Result<Self> {
        Ok(Self {
            local_anchor_a: world.body(body_a)?.local_point(anchor_a),
            local_anchor_b: world.body(body_b)?.local_point(anchor_b),
            length: anchor_b.distance(anchor_a),
            ..Self::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) length: f32,
    pub(crate) frequency: f32,
    pub(crate) damping_ratio: f32,
    impulse: f32,

    a: JointBody,
    b: JointBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    gamma: f32,
    bias: f32,
}

impl DistanceJoint {
    pub fn new(conf: &DistanceJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            length: conf.length,
            frequency: conf.frequency,
            damping_ratio: conf.damping_ratio,
            impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }
}

impl Constraint for DistanceJoint {
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
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        let current = self.u.length();
        if current > conf.linear_slop {
            self.u /= current;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        let mut inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency > 0.0 {
            let (gamma, bias_factor) =
                soft_coefficients(self.mass, self.frequency, self.damping_ratio, step.dt);
            self.gamma = gamma;
            self.bias = (current - self.length) * bias_factor;
            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            let p = self.impulse * self.u;
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * cross(self.r_a, p);
            vel_b.v += m_b * p;
            vel_b.w += i_b * cross(self.r_b, p);
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
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        vel_a.v -= m_a * p;
        vel_a.w -= i_a * cross(self.r_a, p);
        vel_b.v += m_b * p;
        vel_b.w += i_b * cross(self.r_b, p);

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        impulse == 0.0
    }

    fn solve_position(
        &mut self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
    ) -> bool {
        if self.frequency > 0.0 {
            // Springs do not correct position.
            return true;
        }
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut pos_a = self.a.position(bodies);
        let mut pos_b = self.b.position(bodies);

        let r_a = self.a.arm(Rot::from_angle(pos_a.a), self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let d = pos_b.c + r_b - pos_a.c - r_a;
        let current = d.length();
        let u = if current > 0.0 { d / current } else { Vec2::ZERO };

        let c = (current - self.length)
            .clamp(-conf.max_linear_correction, conf.max_linear_correction);
        let impulse = -self.mass * c;
        let p = impulse * u;

        pos_a.c -= m_a * p;
        pos_a.a -= i_a * cross(r_a, p);
        pos_b.c += m_b * p;
        pos_b.a += i_b * cross(r_b, p);

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        c.abs() < conf.linear_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse * self.u
    }

    fn angular_reaction(&self) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    #[test]
    fn test_rigid_distance_is_restored() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(3.0, 0.0));
        bodies[1].velocity.v = Vec2::new(2.0, 0.0);
        let mut conf = DistanceJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.length = 2.0;
        let mut joint = DistanceJoint::new(&conf);

        solve(&mut joint, &mut bodies, 60);

        let dist = bodies[1].position.c.distance(bodies[0].position.c);
        assert!((dist - 2.0).abs() < 0.01, "Distance should settle at rest length: {}", dist);
        let dv = bodies[1].velocity.v - bodies[0].velocity.v;
        assert!(dv.x.abs() < 1e-4, "Bodies should move together: dv = {:?}", dv);
    }

    #[test]
    fn test_spring_skips_position_correction() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(3.0, 0.0));
        let mut conf = DistanceJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.frequency = 2.0;
        conf.damping_ratio = 0.5;
        let mut joint = DistanceJoint::new(&conf);
        assert!(joint.solve_position(&mut bodies, &ConstraintSolverConf::default()));
        assert_eq!(bodies[1].position.c, Vec2::new(3.0, 0.0));
    }
}
