//! Gear joint: couples the coordinates of two revolute or prismatic joints
//! so that `coordinate1 + ratio * coordinate2` stays constant.
//!
//! The geometry of both input joints is copied when the gear is created.
//! Body A is the second body of joint 1 and body C its first; body B is the
//! second body of joint 2 and body D its first.

use glam::Vec2;

use super::{Constraint, Joint, JointBase, JointBody, JointKind};
use crate::error::{PhysicsError, Result};
use crate::physics::math::{cross, Rot, Transformation};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, JointId};

/// Configuration for a [`GearJoint`].
#[derive(Debug, Clone)]
pub struct GearJointConf {
    /// A revolute or prismatic joint.
    pub joint1: JointId,
    /// A revolute or prismatic joint.
    pub joint2: JointId,
    /// Default: 1.
    pub ratio: f32,
    /// Default: false.
    pub collide_connected: bool,
}

impl GearJointConf {
    pub fn new(joint1: JointId, joint2: JointId) -> Self {
        Self {
            joint1,
            joint2,
            ratio: 1.0,
            collide_connected: false,
        }
    }
}

/// Geometry of one input joint, seen from the gear.
#[derive(Debug, Clone, Copy)]
struct GearSide {
    kind: JointKind,
    /// The input joint's first body (C or D).
    ground: BodyId,
    local_anchor_ground: Vec2,
    local_anchor_body: Vec2,
    local_axis_ground: Vec2,
    reference_angle: f32,
}

impl GearSide {
    fn from_joint(joint: &Joint) -> Result<Self> {
        match joint {
            Joint::Revolute(j) => Ok(Self {
                kind: JointKind::Revolute,
                ground: j.base().body_a,
                local_anchor_ground: j.local_anchor_a,
                local_anchor_body: j.local_anchor_b,
                local_axis_ground: Vec2::ZERO,
                reference_angle: j.reference_angle,
            }),
            Joint::Prismatic(j) => Ok(Self {
                kind: JointKind::Prismatic,
                ground: j.base().body_a,
                local_anchor_ground: j.local_anchor_a,
                local_anchor_body: j.local_anchor_b,
                local_axis_ground: j.local_x_axis_a,
                reference_angle: j.reference_angle,
            }),
            other => Err(PhysicsError::invalid_argument(format!(
                "gear joints need revolute or prismatic joints, got {}",
                other.kind()
            ))),
        }
    }

    /// Joint coordinate from the body and ground transforms and angles.
    fn coordinate(&self, xf: &Transformation, angle: f32, xf_g: &Transformation, angle_g: f32) -> f32 {
        match self.kind {
            JointKind::Revolute => angle - angle_g - self.reference_angle,
            _ => {
                let p_g = self.local_anchor_ground;
                let p = xf_g.q.inv_rotate(xf.q.rotate(self.local_anchor_body) + (xf.p - xf_g.p));
                (p - p_g).dot(self.local_axis_ground)
            }
        }
    }
}

/// Jacobian of one side: linear part and the angular parts for the body
/// and its ground.
#[derive(Debug, Clone, Copy, Default)]
struct Jacobian {
    linear: Vec2,
    angular_body: f32,
    angular_ground: f32,
}

#[derive(Debug, Clone)]
pub struct GearJoint {
    base: JointBase,
    joint1: JointId,
    joint2: JointId,
    side1: GearSide,
    side2: GearSide,
    pub(crate) ratio: f32,
    constant: f32,
    impulse: f32,

    a: JointBody,
    b: JointBody,
    c: JointBody,
    d: JointBody,
    j_ac: Jacobian,
    j_bd: Jacobian,
    mass: f32,
}

impl GearJoint {
    /// Build a gear over two existing joints. `pose` returns the transform
    /// and angle of a body.
    pub(crate) fn new(
        conf: &GearJointConf,
        joint1: &Joint,
        joint2: &Joint,
        pose: impl Fn(BodyId) -> Result<(Transformation, f32)>,
    ) -> Result<Self> {
        let side1 = GearSide::from_joint(joint1)?;
        let side2 = GearSide::from_joint(joint2)?;
        let body_a = joint1.body_b();
        let body_b = joint2.body_b();

        let (xf_a, angle_a) = pose(body_a)?;
        let (xf_c, angle_c) = pose(side1.ground)?;
        let (xf_b, angle_b) = pose(body_b)?;
        let (xf_d, angle_d) = pose(side2.ground)?;

        let coordinate1 = side1.coordinate(&xf_a, angle_a, &xf_c, angle_c);
        let coordinate2 = side2.coordinate(&xf_b, angle_b, &xf_d, angle_d);

        Ok(Self {
            base: JointBase {
                body_a,
                body_b,
                collide_connected: conf.collide_connected,
            },
            joint1: conf.joint1,
            joint2: conf.joint2,
            side1,
            side2,
            ratio: conf.ratio,
            constant: coordinate1 + conf.ratio * coordinate2,
            impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            c: JointBody::default(),
            d: JointBody::default(),
            j_ac: Jacobian::default(),
            j_bd: Jacobian::default(),
            mass: 0.0,
        })
    }

    pub fn joint1(&self) -> JointId {
        self.joint1
    }

    pub fn joint2(&self) -> JointId {
        self.joint2
    }

    /// Jacobian of one side and its contribution to the inverse mass.
    fn jacobian(
        side: &GearSide,
        scale: f32,
        body: &JointBody,
        ground: &JointBody,
        q_body: Rot,
        q_ground: Rot,
    ) -> (Jacobian, f32) {
        match side.kind {
            JointKind::Revolute => (
                Jacobian {
                    linear: Vec2::ZERO,
                    angular_body: scale,
                    angular_ground: scale,
                },
                scale * scale * (body.inv_i + ground.inv_i),
            ),
            _ => {
                let u = q_ground.rotate(side.local_axis_ground);
                let r_g = ground.arm(q_ground, side.local_anchor_ground);
                let r = body.arm(q_body, side.local_anchor_body);
                let jw_g = scale * cross(r_g, u);
                let jw = scale * cross(r, u);
                let inv_mass = scale * scale * (ground.inv_mass + body.inv_mass)
                    + ground.inv_i * jw_g * jw_g
                    + body.inv_i * jw * jw;
                (
                    Jacobian {
                        linear: scale * u,
                        angular_body: jw,
                        angular_ground: jw_g,
                    },
                    inv_mass,
                )
            }
        }
    }

    /// Apply `impulse` along the Jacobian. C and D may be the same body, so
    /// each body is read and written back in turn.
    fn apply(&self, bodies: &mut [BodyConstraint], impulse: f32) {
        let kick = |bodies: &mut [BodyConstraint], body: &JointBody, linear: Vec2, angular: f32| {
            let mut v = body.velocity(bodies);
            v.v += body.inv_mass * linear;
            v.w += body.inv_i * angular;
            body.set_velocity(bodies, v);
        };
        let (j_ac, j_bd) = (self.j_ac, self.j_bd);
        kick(bodies, &self.a, impulse * j_ac.linear, impulse * j_ac.angular_body);
        kick(bodies, &self.b, impulse * j_bd.linear, impulse * j_bd.angular_body);
        kick(bodies, &self.c, -impulse * j_ac.linear, -impulse * j_ac.angular_ground);
        kick(bodies, &self.d, -impulse * j_bd.linear, -impulse * j_bd.angular_ground);
    }
}

impl Constraint for GearJoint {
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
        self.c = JointBody::load(bodies, self.side1.ground);
        self.d = JointBody::load(bodies, self.side2.ground);

        let q = |body: &JointBody| Rot::from_angle(body.position(bodies).a);
        let (q_a, q_b, q_c, q_d) = (q(&self.a), q(&self.b), q(&self.c), q(&self.d));

        let (j_ac, mass_ac) = Self::jacobian(&self.side1, 1.0, &self.a, &self.c, q_a, q_c);
        let (j_bd, mass_bd) = Self::jacobian(&self.side2, self.ratio, &self.b, &self.d, q_b, q_d);
        self.j_ac = j_ac;
        self.j_bd = j_bd;
        let mass = mass_ac + mass_bd;
        self.mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            self.apply(bodies, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], _step: &SolverStep) -> bool {
        let vel_a = self.a.velocity(bodies);
        let vel_b = self.b.velocity(bodies);
        let vel_c = self.c.velocity(bodies);
        let vel_d = self.d.velocity(bodies);

        let cdot = self.j_ac.linear.dot(vel_a.v - vel_c.v)
            + self.j_bd.linear.dot(vel_b.v - vel_d.v)
            + (self.j_ac.angular_body * vel_a.w - self.j_ac.angular_ground * vel_c.w)
            + (self.j_bd.angular_body * vel_b.w - self.j_bd.angular_ground * vel_d.w);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply(bodies, impulse);
        impulse == 0.0
    }

    fn solve_position(
        &mut self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
    ) -> bool {
        let pos_a = self.a.position(bodies);
        let pos_b = self.b.position(bodies);
        let pos_c = self.c.position(bodies);
        let pos_d = self.d.position(bodies);

        let xf = |body: &JointBody, c: Vec2, angle: f32| {
            let q = Rot::from_angle(angle);
            Transformation::new(c - q.rotate(body.local_center), q)
        };
        let xf_a = xf(&self.a, pos_a.c, pos_a.a);
        let xf_b = xf(&self.b, pos_b.c, pos_b.a);
        let xf_c = xf(&self.c, pos_c.c, pos_c.a);
        let xf_d = xf(&self.d, pos_d.c, pos_d.a);

        let (j_ac, mass_ac) = Self::jacobian(&self.side1, 1.0, &self.a, &self.c, xf_a.q, xf_c.q);
        let (j_bd, mass_bd) =
            Self::jacobian(&self.side2, self.ratio, &self.b, &self.d, xf_b.q, xf_d.q);
        let mass = mass_ac + mass_bd;

        let coordinate1 = self.side1.coordinate(&xf_a, pos_a.a, &xf_c, pos_c.a);
        let coordinate2 = self.side2.coordinate(&xf_b, pos_b.a, &xf_d, pos_d.a);
        let c = coordinate1 + self.ratio * coordinate2 - self.constant;

        let impulse = if mass > 0.0 { -c / mass } else { 0.0 };

        let nudge = |bodies: &mut [BodyConstraint], body: &JointBody, linear: Vec2, angular: f32| {
            let mut p = body.position(bodies);
            p.c += body.inv_mass * linear;
            p.a += body.inv_i * angular;
            body.set_position(bodies, p);
        };
        nudge(bodies, &self.a, impulse * j_ac.linear, impulse * j_ac.angular_body);
        nudge(bodies, &self.b, impulse * j_bd.linear, impulse * j_bd.angular_body);
        nudge(bodies, &self.c, -impulse * j_ac.linear, -impulse * j_ac.angular_ground);
        nudge(bodies, &self.d, -impulse * j_bd.linear, -impulse * j_bd.angular_ground);
        c.abs() < conf.linear_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse * self.j_ac.linear
    }

    fn angular_reaction(&self) -> f32 {
        self.impulse * self.j_ac.angular_body
    }

    fn extra_bodies(&self) -> [Option<BodyId>; 2] {
        [Some(self.side1.ground), Some(self.side2.ground)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::joint::test_util::{bodies_at, step};
    use crate::physics::joint::{DistanceJoint, DistanceJointConf, RevoluteJoint, RevoluteJointConf};

    /// Ground at index 0 and two wheels at 1 and 2, each on a revolute joint.
    fn gear_rig(ratio: f32) -> (GearJoint, Vec<BodyConstraint>) {
        let mut bodies = bodies_at(&[Vec2::ZERO, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)]);
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;

        let mut j1 = RevoluteJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        j1.local_anchor_a = Vec2::new(-1.0, 0.0);
        let mut j2 = RevoluteJointConf::new(BodyId::new(0, 0), BodyId::new(2, 0));
        j2.local_anchor_a = Vec2::new(1.0, 0.0);
        let joint1 = Joint::Revolute(RevoluteJoint::new(&j1));
        let joint2 = Joint::Revolute(RevoluteJoint::new(&j2));

        let mut conf = GearJointConf::new(JointId::new(0, 0), JointId::new(1, 0));
        conf.ratio = ratio;
        let poses = bodies.clone();
        let gear = GearJoint::new(&conf, &joint1, &joint2, |id| {
            let b = poses[id.index()];
            Ok((b.transform(), b.position.a))
        })
        .unwrap();
        (gear, bodies)
    }

    #[test]
    fn test_gear_couples_wheel_speeds() {
        let (mut gear, mut bodies) = gear_rig(2.0);
        bodies[1].velocity.w = 3.0;
        let conf = ConstraintSolverConf::default();
        gear.init_velocity(&mut bodies, &step(), &conf);
        for _ in 0..10 {
            gear.solve_velocity(&mut bodies, &step());
        }
        let (w1, w2) = (bodies[1].velocity.w, bodies[2].velocity.w);
        assert!((w1 + 2.0 * w2).abs() < 1e-4, "Gear constraint violated: w1 = {}, w2 = {}", w1, w2);
        assert_eq!(bodies[0].velocity.w, 0.0, "Static ground should not turn");
        assert_eq!(gear.extra_bodies(), [Some(BodyId::new(0, 0)), Some(BodyId::new(0, 0))]);
    }

    #[test]
    fn test_gear_rejects_other_kinds() {
        let joint = Joint::Distance(DistanceJoint::new(&DistanceJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0))));
        let conf = GearJointConf::new(JointId::new(0, 0), JointId::new(1, 0));
        let result = GearJoint::new(&conf, &joint, &joint, |_| Ok((Transformation::IDENTITY, 0.0)));
        assert!(matches!(result, Err(PhysicsError::InvalidArgument(_))));
    }
}
