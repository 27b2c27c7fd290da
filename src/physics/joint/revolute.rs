//! Revolute joint: a shared anchor point with optional angle limits and a
//! motor.

use glam::{Mat2, Mat3, Vec2, Vec3};

use super::{Constraint, JointBase, JointBody, LimitState};
use crate::error::{PhysicsError, Result};
use crate::physics::math::{cross, cross_sv, solve22, solve33, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`RevoluteJoint`].
#[derive(Debug, Clone)]
pub struct RevoluteJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Angle of B relative to A that counts as zero. Default: 0.
    pub reference_angle: f32,
    /// Default: false.
    pub enable_limit: bool,
    /// Radians. Default: 0.
    pub lower_angle: f32,
    /// Radians. Default: 0.
    pub upper_angle: f32,
    /// Default: false.
    pub enable_motor: bool,
    /// Radians per second. Default: 0.
    pub motor_speed: f32,
    /// Default: 0.
    pub max_motor_torque: f32,
}

impl RevoluteJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    /// Pin two bodies together at a world anchor, keeping their current
    /// relative angle as the reference.
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
pub struct RevoluteJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) enable_limit: bool,
    pub(crate) lower_angle: f32,
    pub(crate) upper_angle: f32,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f32,
    pub(crate) max_motor_torque: f32,
    pub(crate) limit_state: LimitState,
    impulse: Vec3,
    pub(crate) motor_impulse: f32,

    a: JointBody,
    b: JointBody,
    r_a: Vec2,
    r_b: Vec2,
    k: Mat3,
    /// Effective mass for the motor and the angle limit.
    pub(crate) motor_mass: f32,
}

impl RevoluteJoint {
    pub fn new(conf: &RevoluteJointConf) -> Self {
        Self {
            base: JointBase {
                body_a: conf.body_a,
                body_b: conf.body_b,
                collide_connected: conf.collide_connected,
            },
            local_anchor_a: conf.local_anchor_a,
            local_anchor_b: conf.local_anchor_b,
            reference_angle: conf.reference_angle,
            enable_limit: conf.enable_limit,
            lower_angle: conf.lower_angle,
            upper_angle: conf.upper_angle,
            enable_motor: conf.enable_motor,
            motor_speed: conf.motor_speed,
            max_motor_torque: conf.max_motor_torque,
            limit_state: LimitState::Inactive,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            k: Mat3::ZERO,
            motor_mass: 0.0,
        }
    }

    pub(crate) fn set_limits(&mut self, lower: f32, upper: f32) -> Result<()> {
        if lower > upper {
            return Err(PhysicsError::invalid_argument(format!(
                "lower angle {} above upper angle {}",
                lower, upper
            )));
        }
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
        Ok(())
    }

    pub(crate) fn set_limit_enabled(&mut self, enabled: bool) {
        if enabled != self.enable_limit {
            self.enable_limit = enabled;
            self.impulse.z = 0.0;
        }
    }
}

impl Constraint for RevoluteJoint {
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
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = i_a + i_b == 0.0;

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
        self.k = Mat3::from_cols(ex, ey, ez);

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = pos_b.a - pos_a.a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * conf.angular_slop {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;

            let p = self.impulse.truncate();
            let angular = self.motor_impulse + self.impulse.z;
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(r_a, p) + angular);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(r_b, p) + angular);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);
        let mut solved = true;

        let fixed_rotation = i_a + i_b == 0.0;

        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = vel_b.w - vel_a.w - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;
            if impulse != 0.0 {
                solved = false;
            }

            vel_a.w -= i_a * impulse;
            vel_b.w += i_b * impulse;
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a);
            let cdot2 = vel_b.w - vel_a.w;
            let cdot = cdot1.extend(cdot2);

            let mut impulse = -solve33(self.k, cdot);

            match self.limit_state {
                LimitState::AtLower if self.impulse.z + impulse.z < 0.0 => {
                    impulse = self.reduced_impulse(cdot1);
                }
                LimitState::AtUpper if self.impulse.z + impulse.z > 0.0 => {
                    impulse = self.reduced_impulse(cdot1);
                }
                _ => self.impulse += impulse,
            }
            if impulse != Vec3::ZERO {
                solved = false;
            }

            let p = impulse.truncate();
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(r_a, p) + impulse.z);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(r_b, p) + impulse.z);
        } else {
            let cdot = vel_b.v + cross_sv(vel_b.w, r_b) - vel_a.v - cross_sv(vel_a.w, r_a);
            let k = Mat2::from_cols(self.k.x_axis.truncate(), self.k.y_axis.truncate());
            let impulse = solve22(k, -cdot);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;
            if impulse != Vec2::ZERO {
                solved = false;
            }

            vel_a.v -= m_a * impulse;
            vel_a.w -= i_a * cross(r_a, impulse);
            vel_b.v += m_b * impulse;
            vel_b.w += i_b * cross(r_b, impulse);
        }

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

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let max = conf.max_angular_correction;
            let c = match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle).clamp(-max, max);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    (c + conf.angular_slop).clamp(-max, 0.0)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - conf.angular_slop).clamp(0.0, max)
                }
                LimitState::Inactive => 0.0,
            };
            let limit_impulse = -self.motor_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
        }

        // Point to point.
        let r_a = self.a.arm(Rot::from_angle(pos_a.a), self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.length();

        let k = Mat2::from_cols(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        let impulse = -solve22(k, c);

        pos_a.c -= m_a * impulse;
        pos_a.a -= i_a * cross(r_a, impulse);
        pos_b.c += m_b * impulse;
        pos_b.a += i_b * cross(r_b, impulse);

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

impl RevoluteJoint {
    /// Solve the point constraint alone after clamping the limit impulse to
    /// zero. Returns the incremental impulse.
    fn reduced_impulse(&mut self, cdot1: Vec2) -> Vec3 {
        let ez = self.k.z_axis.truncate();
        let rhs = -cdot1 + self.impulse.z * ez;
        let k = Mat2::from_cols(self.k.x_axis.truncate(), self.k.y_axis.truncate());
        let reduced = solve22(k, rhs);
        let impulse = Vec3::new(reduced.x, reduced.y, -self.impulse.z);
        self.impulse.x += reduced.x;
        self.impulse.y += reduced.y;
        self.impulse.z = 0.0;
        impulse
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{solve, two_bodies};
    use super::*;

    fn pinned(conf_fn: impl FnOnce(&mut RevoluteJointConf)) -> (RevoluteJoint, Vec<BodyConstraint>) {
        let mut bodies = two_bodies(Vec2::ZERO, Vec2::new(1.0, 0.0));
        // Body A is fixed.
        bodies[0].inv_mass = 0.0;
        bodies[0].inv_i = 0.0;
        let mut conf = RevoluteJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        conf.local_anchor_b = Vec2::new(-1.0, 0.0);
        conf_fn(&mut conf);
        (RevoluteJoint::new(&conf), bodies)
    }

    #[test]
    fn test_anchor_stays_pinned() {
        let (mut joint, mut bodies) = pinned(|_| {});
        bodies[1].velocity.v = Vec2::new(3.0, 1.0);
        solve(&mut joint, &mut bodies, 30);
        let anchor = bodies[1].transform().apply(Vec2::new(-1.0, 0.0));
        assert!(anchor.length() < 0.01, "Anchor drifted: {:?}", anchor);
    }

    #[test]
    fn test_motor_drives_relative_speed() {
        let (mut joint, mut bodies) = pinned(|c| {
            c.enable_motor = true;
            c.motor_speed = 1.5;
            c.max_motor_torque = 1000.0;
        });
        solve(&mut joint, &mut bodies, 5);
        assert!(
            (bodies[1].velocity.w - 1.5).abs() < 0.05,
            "Motor should reach its speed: w = {}",
            bodies[1].velocity.w
        );
    }

    #[test]
    fn test_upper_limit_stops_rotation() {
        let (mut joint, mut bodies) = pinned(|c| {
            c.enable_limit = true;
            c.lower_angle = -0.25;
            c.upper_angle = 0.25;
        });
        bodies[1].velocity.w = 3.0;
        solve(&mut joint, &mut bodies, 60);
        let angle = bodies[1].position.a;
        assert!(angle <= 0.25 + 0.05, "Limit should hold: angle = {}", angle);
        assert_eq!(joint.limit_state, LimitState::AtUpper);
    }
}
