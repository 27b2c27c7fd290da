//! Prismatic joint: one translational degree of freedom along an axis fixed
//! in body A, with optional translation limits and a motor.

use glam::{Mat2, Mat3, Vec2, Vec3};

use super::{Constraint, JointBase, JointBody, LimitState};
use crate::error::{PhysicsError, Result};
use crate::physics::math::{cross, cross_sv, solve22, solve33, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`PrismaticJoint`].
#[derive(Debug, Clone)]
pub struct PrismaticJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's frame. Normalized on creation.
    /// Default: (1, 0).
    pub local_axis_a: Vec2,
    /// Default: 0.
    pub reference_angle: f32,
    /// Default: false.
    pub enable_limit: bool,
    /// Default: 0.
    pub lower_translation: f32,
    /// Default: 0.
    pub upper_translation: f32,
    /// Default: false.
    pub enable_motor: bool,
    /// Default: 0.
    pub motor_speed: f32,
    /// Default: 0.
    pub max_motor_force: f32,
}

impl PrismaticJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
        }
    }

    /// Slide B along a world axis through a world anchor.
    pub fn along_axis(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        anchor: Vec2,
        axis: Vec2,
    ) -> Result<Self> {
        let a = world.body(body_a)?;
        let b = world.body(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            local_axis_a: a.local_vector(axis),
            reference_angle: b.angle() - a.angle(),
            ..Self::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    pub(crate) local_y_axis_a: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) enable_limit: bool,
    pub(crate) lower_translation: f32,
    pub(crate) upper_translation: f32,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f32,
    pub(crate) max_motor_force: f32,
    pub(crate) limit_state: LimitState,
    impulse: Vec3,
    pub(crate) motor_impulse: f32,

    a: JointBody,
    b: JointBody,
    axis: Vec2,
    perp: Vec2,
    s1: f32,
    s2: f32,
    a1: f32,
    a2: f32,
    k: Mat3,
    motor_mass: f32,
}

impl PrismaticJoint {
    pub fn new(conf: &PrismaticJointConf) -> Self {
        let x_axis = conf.local_axis_a.normalize_or_zero();
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            local_x_axis_a: x_axis,
            local_y_axis_a: cross_sv(1.0, x_axis),
            reference_angle: conf.reference_angle,
            enable_limit: conf.enable_limit,
            lower_translation: conf.lower_translation,
            upper_translation: conf.upper_translation,
            enable_motor: conf.enable_motor,
            motor_speed: conf.motor_speed,
            max_motor_force: conf.max_motor_force,
            limit_state: LimitState::Inactive,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat3::ZERO,
            motor_mass: 0.0,
        }
    }

    pub(crate) fn set_limits(&mut self, lower: f32, upper: f32) -> Result<()> {
        if lower > upper {
            return Err(PhysicsError::invalid_argument(format!(
                "lower translation {} above upper translation {}",
                lower, upper
            )));
        }
        if lower != self.lower_translation || upper != self.upper_translation {
            self.impulse.z = 0.0;
            self.lower_translation = lower;
            self.upper_translation = upper;
        }
        Ok(())
    }

    pub(crate) fn set_limit_enabled(&mut self, enabled: bool) {
        if enabled != self.enable_limit {
            self.enable_limit = enabled;
            self.impulse.z = 0.0;
        }
    }

    /// Effective mass matrix for the perpendicular, angular and axial rows.
    fn mass_matrix(&self, s1: f32, s2: f32, a1: f32, a2: f32) -> Mat3 {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let k13 = i_a * s1 * a1 + i_b * s2 * a2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // For bodies with fixed rotation.
            k22 = 1.0;
        }
        let k23 = i_a * a1 + i_b * a2;
        let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
        Mat3::from_cols(
            Vec3::new(k11, k12, k13),
            Vec3::new(k12, k22, k23),
            Vec3::new(k13, k23, k33),
        )
    }
}

fn upper_left(k: Mat3) -> Mat2 {
    Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate())
}

impl Constraint for PrismaticJoint {
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

        let q_a = Rot::from_angle(pos_a.a);
        let r_a = self.a.arm(q_a, self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let d = pos_b.c - pos_a.c + r_b - r_a;

        self.axis = q_a.rotate(self.local_x_axis_a);
        self.a1 = cross(d + r_a, self.axis);
        self.a2 = cross(r_b, self.axis);
        self.motor_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        self.perp = q_a.rotate(self.local_y_axis_a);
        self.s1 = cross(d + r_a, self.perp);
        self.s2 = cross(r_b, self.perp);

        self.k = self.mass_matrix(self.s1, self.s2, self.a1, self.a2);

        if self.enable_limit {
            let translation = self.axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * conf.linear_slop {
                self.limit_state = LimitState::Equal;
            } else if translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.impulse.x * self.perp + axial * self.axis;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;

            vel_a.v -= m_a * p;
            vel_a.w -= i_a * l_a;
            vel_b.v += m_b * p;
            vel_b.w += i_b * l_b;
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);
        let mut solved = true;

        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = self.axis.dot(vel_b.v - vel_a.v) + self.a2 * vel_b.w - self.a1 * vel_a.w;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_force;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;
            if impulse != 0.0 {
                solved = false;
            }

            let p = impulse * self.axis;
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * impulse * self.a1;
            vel_b.v += m_b * p;
            vel_b.w += i_b * impulse * self.a2;
        }

        let cdot1 = Vec2::new(
            self.perp.dot(vel_b.v - vel_a.v) + self.s2 * vel_b.w - self.s1 * vel_a.w,
            vel_b.w - vel_a.w,
        );

        let df = if self.enable_limit && self.limit_state != LimitState::Inactive {
            let cdot2 = self.axis.dot(vel_b.v - vel_a.v) + self.a2 * vel_b.w - self.a1 * vel_a.w;
            let cdot = cdot1.extend(cdot2);

            let f1 = self.impulse;
            self.impulse += solve33(self.k, -cdot);

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                _ => {}
            }

            // Re-solve the first two rows with the clamped axial impulse.
            let b = -cdot1 - (self.impulse.z - f1.z) * self.k.z_axis.truncate();
            let f2r = solve22(upper_left(self.k), b) + f1.truncate();
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            self.impulse - f1
        } else {
            let df = solve22(upper_left(self.k), -cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;
            df.extend(0.0)
        };
        if df != Vec3::ZERO {
            solved = false;
        }

        let p = df.x * self.perp + df.z * self.axis;
        let l_a = df.x * self.s1 + df.y + df.z * self.a1;
        let l_b = df.x * self.s2 + df.y + df.z * self.a2;

        vel_a.v -= m_a * p;
        vel_a.w -= i_a * l_a;
        vel_b.v += m_b * p;
        vel_b.w += i_b * l_b;

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        solved
    }

    fn solve_position(
        &mut self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
    ) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut pos_a = self.a.position(bodies);
        let mut pos_b = self.b.position(bodies);

        let q_a = Rot::from_angle(pos_a.a);
        let r_a = self.a.arm(q_a, self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        let axis = q_a.rotate(self.local_x_axis_a);
        let a1 = cross(d + r_a, axis);
        let a2 = cross(r_b, axis);
        let perp = q_a.rotate(self.local_y_axis_a);
        let s1 = cross(d + r_a, perp);
        let s2 = cross(r_b, perp);

        let c1 = Vec2::new(perp.dot(d), pos_b.a - pos_a.a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let max = conf.max_linear_correction;
        let mut c2 = None;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * conf.linear_slop {
                let c = translation - self.lower_translation;
                c2 = Some(c.clamp(-max, max));
                linear_error = linear_error.max(c.abs());
            } else if translation <= self.lower_translation {
                c2 = Some((translation - self.lower_translation + conf.linear_slop).clamp(-max, 0.0));
                linear_error = linear_error.max(self.lower_translation - translation);
            } else if translation >= self.upper_translation {
                c2 = Some((translation - self.upper_translation - conf.linear_slop).clamp(0.0, max));
                linear_error = linear_error.max(translation - self.upper_translation);
            }
        }

        let k = self.mass_matrix(s1, s2, a1, a2);
        let impulse = match c2 {
            Some(c2) => solve33(k, -c1.extend(c2)),
            None => solve22(upper_left(k), -c1).extend(0.0),
        };

        let p = impulse.x * perp + impulse.z * axis;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.c -= m_a * p;
        pos_a.a -= i_a * l_a;
        pos_b.c += m_b * p;
        pos_b.a += i_b * l_b;

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        linear_error <= conf.linear_slop && angular_error <= conf.angular_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse.x * self.perp + (self.motor_impulse + self.impulse.z) * self.axis
    }

    fn angular_reaction(&self) -> f32 {
        self.impulse.y
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    fn slider(conf_fn: impl FnOnce(&mut PrismaticJointConf)) -> (PrismaticJoint, Vec<BodyConstraint>) {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::ZERO);
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;
        let mut conf = PrismaticJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf_fn(&mut conf);
        (PrismaticJoint::new(&conf), bodies)
    }

    #[test]
    fn test_motion_is_confined_to_axis() {
        let (mut joint, mut bodies) = slider(|_| {});
        bodies[1].velocity.v = Vec2::new(2.0, 3.0);
        bodies[1].velocity.w = 1.0;
        solve(&mut joint, &mut bodies, 10);
        let b = bodies[1];
        assert!(b.position.c.y.abs() < 0.01, "Off-axis drift: {:?}", b.position.c);
        assert!(b.position.a.abs() < 0.01, "Rotation should be locked: {}", b.position.a);
        assert!(b.position.c.x > 0.2, "Axial motion should be free: {:?}", b.position.c);
    }

    #[test]
    fn test_lower_limit_holds() {
        let (mut joint, mut bodies) = slider(|c| {
            c.enable_limit = true;
            c.lower_translation = -0.5;
            c.upper_translation = 0.5;
        });
        bodies[1].velocity.v = Vec2::new(-4.0, 0.0);
        solve(&mut joint, &mut bodies, 40);
        let x = bodies[1].position.c.x;
        assert!(x >= -0.5 - 0.02, "Lower limit should hold: x = {}", x);
        assert_eq!(joint.limit_state, LimitState::AtLower);
    }

    #[test]
    fn test_motor_force_is_bounded() {
        let (mut joint, mut bodies) = slider(|c| {
            c.enable_motor = true;
            c.motor_speed = 10.0;
            c.max_motor_force = 6.0;
        });
        solve(&mut joint, &mut bodies, 1);
        // One step of 6 N on a unit mass.
        let vx = bodies[1].velocity.v.x;
        assert!((vx - 0.1).abs() < 1e-4, "Motor force should cap the speed gain: {}", vx);
    }
}
