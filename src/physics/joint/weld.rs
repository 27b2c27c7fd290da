//! Weld joint: glues two bodies together, optionally with a soft angular
//! spring.

use glam::{Mat3, Vec2, Vec3};

use super::{soft_coefficients, Constraint, JointBase, JointBody};
use crate::error::Result;
use crate::physics::math::{
    cross, cross_sv, inverse22_of33, mul33_22, solve33, solve33_22, sym_inverse33, Rot,
};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`WeldJoint`].
#[derive(Debug, Clone)]
pub struct WeldJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Default: 0.
    pub reference_angle: f32,
    /// Angular spring frequency in Hz; zero makes the weld rigid. Default: 0.
    pub frequency: f32,
    /// Default: 0.
    pub damping_ratio: f32,
}

impl WeldJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Weld two bodies at a world anchor in their current relative pose.
    pub fn at_anchor(world: &World, body_a: BodyId, body_b: BodyId, anchor: Vec2) -> Result<Self> {
        let a = world.body(body_a)?;
        let b = world.body(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            reference_angle: b.angle() - a.angle(),
            ..Self::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone)]
pub struct WeldJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) frequency: f32,
    pub(crate) damping_ratio: f32,
    impulse: Vec3,

    a: JointBody,
    b: JointBody,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
    gamma: f32,
    bias: f32,
}

/// Point-and-angle effective mass matrix.
fn weld_matrix(m_a: f32, i_a: f32, r_a: Vec2, m_b: f32, i_b: f32, r_b: Vec2) -> Mat3 {
    let ex = Vec3::new(
        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        -r_a.y * i_a - r_b.y * i_b,
    );
    let ey = Vec3::new(
        ex.y,
        m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
        r_a.x * i_a + r_b.x * i_b,
    );
    let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
    Mat3::from_cols(ex, ey, ez)
}

impl WeldJoint {
    pub fn new(conf: &WeldJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            reference_angle: conf.reference_angle,
            frequency: conf.frequency,
            damping_ratio: conf.damping_ratio,
            impulse: Vec3::ZERO,
            a: JointBody::default(),
            b: JointBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
            gamma: 0.0,
            bias: 0.0,
        }
    }
}

impl Constraint for WeldJoint {
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
        let k = weld_matrix(m_a, i_a, self.r_a, m_b, i_b, self.r_b);

        if self.frequency > 0.0 {
            self.mass = inverse22_of33(k);

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = pos_b.a - pos_a.a - self.reference_angle;
            let (gamma, bias_factor) = soft_coefficients(m, self.frequency, self.damping_ratio, step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += self.gamma;
            self.mass.z_axis.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.z_axis.z == 0.0 {
            self.mass = inverse22_of33(k);
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = sym_inverse33(k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            let p = self.impulse.truncate();
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(self.r_a, p) + self.impulse.z);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], _step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);

        let applied = if self.frequency > 0.0 {
            let cdot2 = vel_b.w - vel_a.w;
            let impulse2 = -self.mass.z_axis.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            vel_a.w -= i_a * impulse2;
            vel_b.w += i_b * impulse2;

            let cdot1 = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a);
            let impulse1 = -mul33_22(self.mass, cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            vel_a.v -= m_a * impulse1;
            vel_a.w -= i_a * cross(r_a, impulse1);
            vel_b.v += m_b * impulse1;
            vel_b.w += i_b * cross(r_b, impulse1);
            impulse1.extend(impulse2)
        } else {
            let cdot1 = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a);
            let cdot2 = vel_b.w - vel_a.w;
            let impulse = -(self.mass * cdot1.extend(cdot2));
            self.impulse += impulse;

            let p = impulse.truncate();
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(r_a, p) + impulse.z);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(r_b, p) + impulse.z);
            impulse
        };

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        applied == Vec3::ZERO
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
        let k = weld_matrix(m_a, i_a, r_a, m_b, i_b, r_b);

        let c1 = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c1.length();
        let mut angular_error = 0.0;

        if self.frequency > 0.0 {
            let p = -solve33_22(k, c1);
            pos_a.c -= m_a * p;
            pos_a.a -= i_a * cross(r_a, p);
            pos_b.c += m_b * p;
            pos_b.a += i_b * cross(r_b, p);
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = if k.z_axis.z > 0.0 {
                -solve33(k, c1.extend(c2))
            } else {
                (-solve33_22(k, c1)).extend(0.0)
            };

            let p = impulse.truncate();
            pos_a.c -= m_a * p;
            pos_a.a -= i_a * (cross(r_a, p) + impulse.z);
            pos_b.c += m_b * p;
            pos_b.a += i_b * (cross(r_b, p) + impulse.z);
        }

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        position_error <= conf.linear_slop && angular_error <= conf.angular_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse.truncate()
    }

    fn angular_reaction(&self) -> f32 {
        self.impulse.z
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    #[test]
    fn test_welded_bodies_move_as_one() {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(1.0, 0.0));
        bodies[1].velocity.v = Vec2::new(0.0, 2.0);
        let mut conf = WeldJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.local_anchor_a = Vec2::new(0.5, 0.0);
        conf.local_anchor_b = Vec2::new(-0.5, 0.0);
        let mut joint = WeldJoint::new(&conf);

        solve(&mut joint, &mut bodies, 30);

        let (a, b) = (bodies[0], bodies[1]);
        let rel_angle = b.position.a - a.position.a;
        assert!(rel_angle.abs() < 0.01, "Relative angle should stay zero: {}", rel_angle);
        let gap = b.transform().apply(Vec2::new(-0.5, 0.0)) - a.transform().apply(Vec2::new(0.5, 0.0));
        assert!(gap.length() < 0.01, "Anchors separated: {:?}", gap);
        assert!(a.position.c.y > 0.1, "Body A should be dragged along: {:?}", a.position.c);
    }
}
