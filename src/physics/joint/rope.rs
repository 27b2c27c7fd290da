//! Rope joint: an upper bound on the distance between two anchors.

use glam::Vec2;

use super::{Constraint, JointBase, JointBody, LimitState};
use crate::physics::math::{cross, cross_sv, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::BodyId;

/// Configuration for a [`RopeJoint`].
#[derive(Debug, Clone)]
pub struct RopeJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (-1, 0).
    pub local_anchor_a: Vec2,
    /// Default: (1, 0).
    pub local_anchor_b: Vec2,
    /// Default: 0.
    pub max_length: f32,
}

impl RopeJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            max_length: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RopeJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_length: f32,
    impulse: f32,
    state: LimitState,

    a: JointBody,
    b: JointBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    length: f32,
    mass: f32,
}

impl RopeJoint {
    pub fn new(conf: &RopeJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            max_length: conf.max_length,
            impulse: 0.0,
            state: LimitState::Inactive,
            a: JointBody::default(),
            b: JointBody::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            length: 0.0,
            mass: 0.0,
        }
    }

    /// Whether the rope was taut at the start of the step.
    pub fn is_taut(&self) -> bool {
        self.state == LimitState::AtUpper
    }
}

impl Constraint for RopeJoint {
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
        self.length = self.u.length();

        self.state = if self.length - self.max_length > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > conf.linear_slop {
            self.u /= self.length;
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        let inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

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

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);

        let vp_a = vel_a.v + cross_sv(vel_a.w, self.r_a);
        let vp_b = vel_b.v + cross_sv(vel_b.w, self.r_b);
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(vp_b - vp_a);

        // Predictive: only stop what would overshoot within this step.
        if c < 0.0 {
            cdot += step.inv_dt * c;
        }

        let impulse = -self.mass * cdot;
        let old = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old;

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
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut pos_a = self.a.position(bodies);
        let mut pos_b = self.b.position(bodies);

        let r_a = self.a.arm(Rot::from_angle(pos_a.a), self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let d = pos_b.c + r_b - pos_a.c - r_a;
        let length = d.length();
        let u = if length > 0.0 { d / length } else { Vec2::ZERO };

        let c = (length - self.max_length).clamp(0.0, conf.max_linear_correction);
        let impulse = -self.mass * c;
        let p = impulse * u;

        pos_a.c -= m_a * p;
        pos_a.a -= i_a * cross(r_a, p);
        pos_b.c += m_b * p;
        pos_b.a += i_b * cross(r_b, p);

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        length - self.max_length < conf.linear_slop
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

    fn rope(max_length: f32) -> RopeJoint {
        let mut conf = RopeJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.local_anchor_a = Vec2::ZERO;
        conf.local_anchor_b = Vec2::ZERO;
        conf.max_length = max_length;
        RopeJoint::new(&conf)
    }

    #[test]
    fn test_slack_rope_applies_nothing() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(1.0, 0.0));
        bodies[1].velocity.v = Vec2::new(1.0, 0.0);
        let mut joint = rope(3.0);
        solve(&mut joint, &mut bodies, 1);
        assert_eq!(bodies[0].velocity.v, Vec2::ZERO, "Slack rope should not pull");
        assert!(!joint.is_taut());
    }

    #[test]
    fn test_rope_stops_separation() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(2.0, 0.0));
        bodies[1].velocity.v = Vec2::new(5.0, 0.0);
        let mut joint = rope(2.0);
        solve(&mut joint, &mut bodies, 30);
        let dist = bodies[1].position.c.distance(bodies[0].position.c);
        assert!(dist <= 2.0 + 0.01, "Rope should hold: dist = {}", dist);
    }
}
