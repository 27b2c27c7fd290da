//! Wheel joint: B slides along an axis of A on a spring and rotates freely,
//! optionally driven by a motor.

use glam::Vec2;

use super::{soft_coefficients, Constraint, JointBase, JointBody};
use crate::error::Result;
use crate::physics::math::{cross, cross_sv, Rot};
use crate::physics::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use crate::physics::world::{BodyId, World};

/// Configuration for a [`WheelJoint`].
#[derive(Debug, Clone)]
pub struct WheelJointConf {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Default: false.
    pub collide_connected: bool,
    /// Default: (0, 0).
    pub local_anchor_a: Vec2,
    /// Default: (0, 0).
    pub local_anchor_b: Vec2,
    /// Suspension axis in body A's frame. Normalized on creation.
    /// Default: (1, 0).
    pub local_axis_a: Vec2,
    /// Default: false.
    pub enable_motor: bool,
    /// Default: 0.
    pub max_motor_torque: f32,
    /// Default: 0.
    pub motor_speed: f32,
    /// Suspension frequency in Hz. Default: 2.
    pub frequency: f32,
    /// Default: 0.7.
    pub damping_ratio: f32,
}

impl WheelJointConf {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            enable_motor: false,
            max_motor_torque: 0.0,
            motor_speed: 0.0,
            frequency: 2.0,
            damping_ratio: 0.7,
        }
    }

    /// Mount wheel B on chassis A at a world anchor with a world suspension axis.
    pub fn at_anchor(
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
            ..Self::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone)]
pub struct WheelJoint {
    base: JointBase,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    pub(crate) local_y_axis_a: Vec2,
    pub(crate) enable_motor: bool,
    pub(crate) max_motor_torque: f32,
    pub(crate) motor_speed: f32,
    pub(crate) frequency: f32,
    pub(crate) damping_ratio: f32,
    impulse: f32,
    pub(crate) motor_impulse: f32,
    spring_impulse: f32,

    a: JointBody,
    b: JointBody,
    ax: Vec2,
    ay: Vec2,
    s_ax: f32,
    s_bx: f32,
    s_ay: f32,
    s_by: f32,
    mass: f32,
    pub(crate) motor_mass: f32,
    spring_mass: f32,
    bias: f32,
    gamma: f32,
}

impl WheelJoint {
    pub fn new(conf: &WheelJointConf) -> Self {
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
            enable_motor: conf.enable_motor,
            max_motor_torque: conf.max_motor_torque,
            motor_speed: conf.motor_speed,
            frequency: conf.frequency,
            damping_ratio: conf.damping_ratio,
            impulse: 0.0,
            motor_impulse: 0.0,
            spring_impulse: 0.0,
            a: JointBody::default(),
            b: JointBody::default(),
            ax: Vec2::ZERO,
            ay: Vec2::ZERO,
            s_ax: 0.0,
            s_bx: 0.0,
            s_ay: 0.0,
            s_by: 0.0,
            mass: 0.0,
            motor_mass: 0.0,
            spring_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
        }
    }
}

impl Constraint for WheelJoint {
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
        let r_a = self.a.arm(q_a, self.local_anchor_a);
        let r_b = self.b.arm(Rot::from_angle(pos_b.a), self.local_anchor_b);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        // Point to line constraint.
        self.ay = q_a.rotate(self.local_y_axis_a);
        self.s_ay = cross(d + r_a, self.ay);
        self.s_by = cross(r_b, self.ay);
        self.mass = m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        // Spring along the suspension axis.
        self.ax = q_a.rotate(self.local_x_axis_a);
        self.s_ax = cross(d + r_a, self.ax);
        self.s_bx = cross(r_b, self.ax);
        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;
        if self.frequency > 0.0 {
            let inv_mass = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
            if inv_mass > 0.0 {
                let spring_mass = 1.0 / inv_mass;
                let c = d.dot(self.ax);
                let (gamma, bias_factor) =
                    soft_coefficients(spring_mass, self.frequency, self.damping_ratio, step.dt);
                self.gamma = gamma;
                self.bias = c * bias_factor;
                let soft = inv_mass + self.gamma;
                self.spring_mass = if soft > 0.0 { 1.0 / soft } else { 0.0 };
            }
        } else {
            self.spring_impulse = 0.0;
        }

        if self.enable_motor {
            self.motor_mass = i_a + i_b;
            if self.motor_mass > 0.0 {
                self.motor_mass = 1.0 / self.motor_mass;
            }
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if step.do_warm_start {
            self.impulse *= step.dt_ratio;
            self.spring_impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;

            let p = self.impulse * self.ay + self.spring_impulse * self.ax;
            let l_a = self.impulse * self.s_ay + self.spring_impulse * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + self.spring_impulse * self.s_bx + self.motor_impulse;

            vel_a.v -= m_a * p;
            vel_a.w -= i_a * l_a;
            vel_b.v += m_b * p;
            vel_b.w += i_b * l_b;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
            self.motor_impulse = 0.0;
        }

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
    }

    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool {
        let (m_a, i_a, m_b, i_b) = (self.a.inv_mass, self.a.inv_i, self.b.inv_mass, self.b.inv_i);
        let mut vel_a = self.a.velocity(bodies);
        let mut vel_b = self.b.velocity(bodies);

        // Spring.
        let cdot = self.ax.dot(vel_b.v - vel_a.v) + self.s_bx * vel_b.w - self.s_ax * vel_a.w;
        let spring = -self.spring_mass * (cdot + self.bias + self.gamma * self.spring_impulse);
        self.spring_impulse += spring;

        let p = spring * self.ax;
        vel_a.v -= m_a * p;
        vel_a.w -= i_a * spring * self.s_ax;
        vel_b.v += m_b * p;
        vel_b.w += i_b * spring * self.s_bx;

        // Motor.
        let cdot = vel_b.w - vel_a.w - self.motor_speed;
        let impulse = -self.motor_mass * cdot;
        let old = self.motor_impulse;
        let max_impulse = step.dt * self.max_motor_torque;
        self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
        let motor = self.motor_impulse - old;

        vel_a.w -= i_a * motor;
        vel_b.w += i_b * motor;

        // Point to line.
        let cdot = self.ay.dot(vel_b.v - vel_a.v) + self.s_by * vel_b.w - self.s_ay * vel_a.w;
        let point = -self.mass * cdot;
        self.impulse += point;

        let p = point * self.ay;
        vel_a.v -= m_a * p;
        vel_a.w -= i_a * point * self.s_ay;
        vel_b.v += m_b * p;
        vel_b.w += i_b * point * self.s_by;

        self.a.set_velocity(bodies, vel_a);
        self.b.set_velocity(bodies, vel_b);
        spring == 0.0 && motor == 0.0 && point == 0.0
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
        let d = pos_b.c - pos_a.c + r_b - r_a;

        let ay = q_a.rotate(self.local_y_axis_a);
        let s_ay = cross(d + r_a, ay);
        let s_by = cross(r_b, ay);

        let c = d.dot(ay);
        let k = m_a + m_b + i_a * s_ay * s_ay + i_b * s_by * s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = impulse * ay;
        pos_a.c -= m_a * p;
        pos_a.a -= i_a * impulse * s_ay;
        pos_b.c += m_b * p;
        pos_b.a += i_b * impulse * s_by;

        self.a.set_position(bodies, pos_a);
        self.b.set_position(bodies, pos_b);
        c.abs() <= conf.linear_slop
    }

    fn linear_reaction(&self) -> Vec2 {
        self.impulse * self.ay + self.spring_impulse * self.ax
    }

    fn angular_reaction(&self) -> f32 {
        self.motor_impulse
    }
}
