//! Joint constraints.
//!
//! # Architecture
//!
//! Every joint kind implements [`Constraint`], the protocol the island solver
//! drives:
//!
//! 1. `init_velocity` computes anchors, effective masses and soft-constraint
//!    coefficients for the current positions and applies warm-start impulses
//! 2. `solve_velocity` runs once per velocity iteration, in joint order
//! 3. `solve_position` runs once per position iteration until every
//!    constraint reports solved
//!
//! Bodies are addressed through the solver's [`BodyConstraint`] slots.
//! [`Joint`] is the closed set of kinds and carries the kind-specific
//! accessors, which fail with [`PhysicsError::UnsupportedOperation`] on
//! kinds that do not define them.

use std::fmt;

use glam::Vec2;

use super::math::{Position, Rot, Velocity};
use super::solver::{BodyConstraint, ConstraintSolverConf, SolverStep};
use super::world::BodyId;
use crate::error::{PhysicsError, Result};

mod distance;
mod friction;
mod gear;
mod motor;
mod prismatic;
mod pulley;
mod revolute;
mod rope;
mod target;
mod weld;
mod wheel;

pub use distance::{DistanceJoint, DistanceJointConf};
pub use friction::{FrictionJoint, FrictionJointConf};
pub use gear::{GearJoint, GearJointConf};
pub use motor::{MotorJoint, MotorJointConf};
pub use prismatic::{PrismaticJoint, PrismaticJointConf};
pub use pulley::{PulleyJoint, PulleyJointConf};
pub use revolute::{RevoluteJoint, RevoluteJointConf};
pub use rope::{RopeJoint, RopeJointConf};
pub use target::{TargetJoint, TargetJointConf};
pub use weld::{WeldJoint, WeldJointConf};
pub use wheel::{WheelJoint, WheelJointConf};

/// The kinds of joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    Distance,
    Revolute,
    Prismatic,
    Weld,
    Wheel,
    Motor,
    Pulley,
    Target,
    Friction,
    Gear,
    Rope,
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JointKind::Distance => "distance",
            JointKind::Revolute => "revolute",
            JointKind::Prismatic => "prismatic",
            JointKind::Weld => "weld",
            JointKind::Wheel => "wheel",
            JointKind::Motor => "motor",
            JointKind::Pulley => "pulley",
            JointKind::Target => "target",
            JointKind::Friction => "friction",
            JointKind::Gear => "gear",
            JointKind::Rope => "rope",
        };
        f.write_str(name)
    }
}

/// State shared by every joint kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointBase {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Whether the two bodies keep colliding with each other.
    pub collide_connected: bool,
}

/// State of a one-sided or two-sided limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

/// Solver protocol implemented by every joint kind.
pub trait Constraint {
    fn base(&self) -> &JointBase;

    /// Prepare for the velocity iterations and apply warm-start impulses.
    fn init_velocity(
        &mut self,
        bodies: &mut [BodyConstraint],
        step: &SolverStep,
        conf: &ConstraintSolverConf,
    );

    /// One velocity iteration. Returns true when no impulse was applied.
    fn solve_velocity(&mut self, bodies: &mut [BodyConstraint], step: &SolverStep) -> bool;

    /// One position iteration. Returns true when the error is within slop.
    fn solve_position(&mut self, bodies: &mut [BodyConstraint], conf: &ConstraintSolverConf)
        -> bool;

    /// Accumulated linear impulse applied to body B.
    fn linear_reaction(&self) -> Vec2;

    /// Accumulated angular impulse applied to body B.
    fn angular_reaction(&self) -> f32;

    /// Move world-space data by `-new_origin`.
    fn shift_origin(&mut self, _new_origin: Vec2) {}

    /// Bodies beyond A and B that the constraint moves.
    fn extra_bodies(&self) -> [Option<BodyId>; 2] {
        [None, None]
    }
}

/// Mass properties of one body, cached by a joint for the current step.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JointBody {
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_i: f32,
}

impl JointBody {
    pub fn load(bodies: &[BodyConstraint], id: BodyId) -> Self {
        let b = &bodies[id.index()];
        Self {
            index: id.index(),
            local_center: b.local_center,
            inv_mass: b.inv_mass,
            inv_i: b.inv_i,
        }
    }

    #[inline]
    pub fn position(&self, bodies: &[BodyConstraint]) -> Position {
        bodies[self.index].position
    }

    #[inline]
    pub fn velocity(&self, bodies: &[BodyConstraint]) -> Velocity {
        bodies[self.index].velocity
    }

    #[inline]
    pub fn set_position(&self, bodies: &mut [BodyConstraint], position: Position) {
        bodies[self.index].position = position;
    }

    #[inline]
    pub fn set_velocity(&self, bodies: &mut [BodyConstraint], velocity: Velocity) {
        bodies[self.index].velocity = velocity;
    }

    /// Vector from the center of mass to a local anchor, in world frame.
    #[inline]
    pub fn arm(&self, q: Rot, local_anchor: Vec2) -> Vec2 {
        q.rotate(local_anchor - self.local_center)
    }
}

/// Soft constraint coefficients `(gamma, bias_factor)` for a spring with
/// the given effective mass, frequency in Hz and damping ratio.
///
/// The bias for an error `C` is `C * bias_factor`.
pub(crate) fn soft_coefficients(mass: f32, frequency: f32, damping_ratio: f32, dt: f32) -> (f32, f32) {
    let omega = std::f32::consts::TAU * frequency;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let gamma = dt * (d + dt * k);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, dt * k * gamma)
}

/// Configuration for creating any kind of joint.
#[derive(Debug, Clone)]
pub enum JointConf {
    Distance(DistanceJointConf),
    Revolute(RevoluteJointConf),
    Prismatic(PrismaticJointConf),
    Weld(WeldJointConf),
    Wheel(WheelJointConf),
    Motor(MotorJointConf),
    Pulley(PulleyJointConf),
    Target(TargetJointConf),
    Friction(FrictionJointConf),
    Gear(GearJointConf),
    Rope(RopeJointConf),
}

impl JointConf {
    pub fn kind(&self) -> JointKind {
        match self {
            JointConf::Distance(_) => JointKind::Distance,
            JointConf::Revolute(_) => JointKind::Revolute,
            JointConf::Prismatic(_) => JointKind::Prismatic,
            JointConf::Weld(_) => JointKind::Weld,
            JointConf::Wheel(_) => JointKind::Wheel,
            JointConf::Motor(_) => JointKind::Motor,
            JointConf::Pulley(_) => JointKind::Pulley,
            JointConf::Target(_) => JointKind::Target,
            JointConf::Friction(_) => JointKind::Friction,
            JointConf::Gear(_) => JointKind::Gear,
            JointConf::Rope(_) => JointKind::Rope,
        }
    }
}

macro_rules! impl_from_conf {
    ($($conf:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$conf> for JointConf {
                fn from(conf: $conf) -> Self {
                    JointConf::$variant(conf)
                }
            }
        )*
    };
}

impl_from_conf!(
    DistanceJointConf => Distance,
    RevoluteJointConf => Revolute,
    PrismaticJointConf => Prismatic,
    WeldJointConf => Weld,
    WheelJointConf => Wheel,
    MotorJointConf => Motor,
    PulleyJointConf => Pulley,
    TargetJointConf => Target,
    FrictionJointConf => Friction,
    GearJointConf => Gear,
    RopeJointConf => Rope,
);

/// A joint of any kind.
#[derive(Debug, Clone)]
pub enum Joint {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Wheel(WheelJoint),
    Motor(MotorJoint),
    Pulley(PulleyJoint),
    Target(TargetJoint),
    Friction(FrictionJoint),
    Gear(GearJoint),
    Rope(RopeJoint),
}

impl Joint {
    pub fn kind(&self) -> JointKind {
        match self {
            Joint::Distance(_) => JointKind::Distance,
            Joint::Revolute(_) => JointKind::Revolute,
            Joint::Prismatic(_) => JointKind::Prismatic,
            Joint::Weld(_) => JointKind::Weld,
            Joint::Wheel(_) => JointKind::Wheel,
            Joint::Motor(_) => JointKind::Motor,
            Joint::Pulley(_) => JointKind::Pulley,
            Joint::Target(_) => JointKind::Target,
            Joint::Friction(_) => JointKind::Friction,
            Joint::Gear(_) => JointKind::Gear,
            Joint::Rope(_) => JointKind::Rope,
        }
    }

    pub fn constraint(&self) -> &dyn Constraint {
        match self {
            Joint::Distance(j) => j,
            Joint::Revolute(j) => j,
            Joint::Prismatic(j) => j,
            Joint::Weld(j) => j,
            Joint::Wheel(j) => j,
            Joint::Motor(j) => j,
            Joint::Pulley(j) => j,
            Joint::Target(j) => j,
            Joint::Friction(j) => j,
            Joint::Gear(j) => j,
            Joint::Rope(j) => j,
        }
    }

    pub fn constraint_mut(&mut self) -> &mut dyn Constraint {
        match self {
            Joint::Distance(j) => j,
            Joint::Revolute(j) => j,
            Joint::Prismatic(j) => j,
            Joint::Weld(j) => j,
            Joint::Wheel(j) => j,
            Joint::Motor(j) => j,
            Joint::Pulley(j) => j,
            Joint::Target(j) => j,
            Joint::Friction(j) => j,
            Joint::Gear(j) => j,
            Joint::Rope(j) => j,
        }
    }

    pub fn body_a(&self) -> BodyId {
        self.constraint().base().body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.constraint().base().body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.constraint().base().collide_connected
    }

    /// Every body the joint moves: A, B, then any extras.
    pub fn bodies(&self) -> impl Iterator<Item = BodyId> {
        let c = self.constraint();
        let base = c.base();
        [Some(base.body_a), Some(base.body_b)]
            .into_iter()
            .chain(c.extra_bodies())
            .flatten()
    }

    /// Whether the joint moves the given body.
    pub fn involves(&self, body: BodyId) -> bool {
        self.bodies().any(|b| b == body)
    }

    pub fn linear_reaction(&self) -> Vec2 {
        self.constraint().linear_reaction()
    }

    pub fn angular_reaction(&self) -> f32 {
        self.constraint().angular_reaction()
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T> {
        Err(PhysicsError::UnsupportedOperation {
            operation,
            kind: self.kind(),
        })
    }

    pub fn local_anchor_a(&self) -> Result<Vec2> {
        match self {
            Joint::Distance(j) => Ok(j.local_anchor_a),
            Joint::Revolute(j) => Ok(j.local_anchor_a),
            Joint::Prismatic(j) => Ok(j.local_anchor_a),
            Joint::Weld(j) => Ok(j.local_anchor_a),
            Joint::Wheel(j) => Ok(j.local_anchor_a),
            Joint::Pulley(j) => Ok(j.local_anchor_a),
            Joint::Friction(j) => Ok(j.local_anchor_a),
            Joint::Rope(j) => Ok(j.local_anchor_a),
            Joint::Motor(_) | Joint::Target(_) | Joint::Gear(_) => {
                self.unsupported("local_anchor_a")
            }
        }
    }

    pub fn local_anchor_b(&self) -> Result<Vec2> {
        match self {
            Joint::Distance(j) => Ok(j.local_anchor_b),
            Joint::Revolute(j) => Ok(j.local_anchor_b),
            Joint::Prismatic(j) => Ok(j.local_anchor_b),
            Joint::Weld(j) => Ok(j.local_anchor_b),
            Joint::Wheel(j) => Ok(j.local_anchor_b),
            Joint::Pulley(j) => Ok(j.local_anchor_b),
            Joint::Target(j) => Ok(j.local_anchor_b),
            Joint::Friction(j) => Ok(j.local_anchor_b),
            Joint::Rope(j) => Ok(j.local_anchor_b),
            Joint::Motor(_) | Joint::Gear(_) => self.unsupported("local_anchor_b"),
        }
    }

    pub fn reference_angle(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.reference_angle),
            Joint::Prismatic(j) => Ok(j.reference_angle),
            Joint::Weld(j) => Ok(j.reference_angle),
            _ => self.unsupported("reference_angle"),
        }
    }

    pub fn local_x_axis_a(&self) -> Result<Vec2> {
        match self {
            Joint::Prismatic(j) => Ok(j.local_x_axis_a),
            Joint::Wheel(j) => Ok(j.local_x_axis_a),
            _ => self.unsupported("local_x_axis_a"),
        }
    }

    pub fn local_y_axis_a(&self) -> Result<Vec2> {
        match self {
            Joint::Prismatic(j) => Ok(j.local_y_axis_a),
            Joint::Wheel(j) => Ok(j.local_y_axis_a),
            _ => self.unsupported("local_y_axis_a"),
        }
    }

    pub fn is_motor_enabled(&self) -> Result<bool> {
        match self {
            Joint::Revolute(j) => Ok(j.enable_motor),
            Joint::Prismatic(j) => Ok(j.enable_motor),
            Joint::Wheel(j) => Ok(j.enable_motor),
            _ => self.unsupported("is_motor_enabled"),
        }
    }

    pub fn enable_motor(&mut self, enabled: bool) -> Result<()> {
        match self {
            Joint::Revolute(j) => j.enable_motor = enabled,
            Joint::Prismatic(j) => j.enable_motor = enabled,
            Joint::Wheel(j) => j.enable_motor = enabled,
            _ => return self.unsupported("enable_motor"),
        }
        Ok(())
    }

    pub fn motor_speed(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.motor_speed),
            Joint::Prismatic(j) => Ok(j.motor_speed),
            Joint::Wheel(j) => Ok(j.motor_speed),
            _ => self.unsupported("motor_speed"),
        }
    }

    pub fn set_motor_speed(&mut self, speed: f32) -> Result<()> {
        match self {
            Joint::Revolute(j) => j.motor_speed = speed,
            Joint::Prismatic(j) => j.motor_speed = speed,
            Joint::Wheel(j) => j.motor_speed = speed,
            _ => return self.unsupported("set_motor_speed"),
        }
        Ok(())
    }

    pub fn max_motor_torque(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.max_motor_torque),
            Joint::Wheel(j) => Ok(j.max_motor_torque),
            _ => self.unsupported("max_motor_torque"),
        }
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) -> Result<()> {
        match self {
            Joint::Revolute(j) => j.max_motor_torque = torque,
            Joint::Wheel(j) => j.max_motor_torque = torque,
            _ => return self.unsupported("set_max_motor_torque"),
        }
        Ok(())
    }

    pub fn max_motor_force(&self) -> Result<f32> {
        match self {
            Joint::Prismatic(j) => Ok(j.max_motor_force),
            _ => self.unsupported("max_motor_force"),
        }
    }

    pub fn set_max_motor_force(&mut self, force: f32) -> Result<()> {
        match self {
            Joint::Prismatic(j) => j.max_motor_force = force,
            _ => return self.unsupported("set_max_motor_force"),
        }
        Ok(())
    }

    /// Effective angular mass computed by the last `init_velocity`.
    pub fn angular_mass(&self) -> Result<f32> {
        match self {
            Joint::Friction(j) => Ok(j.angular_mass),
            Joint::Motor(j) => Ok(j.angular_mass),
            Joint::Revolute(j) => Ok(j.motor_mass),
            Joint::Wheel(j) => Ok(j.motor_mass),
            _ => self.unsupported("angular_mass"),
        }
    }

    pub fn ratio(&self) -> Result<f32> {
        match self {
            Joint::Gear(j) => Ok(j.ratio),
            Joint::Pulley(j) => Ok(j.ratio),
            _ => self.unsupported("ratio"),
        }
    }

    /// Spring frequency in Hz.
    pub fn frequency(&self) -> Result<f32> {
        match self {
            Joint::Distance(j) => Ok(j.frequency),
            Joint::Target(j) => Ok(j.frequency),
            Joint::Weld(j) => Ok(j.frequency),
            Joint::Wheel(j) => Ok(j.frequency),
            _ => self.unsupported("frequency"),
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) -> Result<()> {
        match self {
            Joint::Distance(j) => j.frequency = frequency,
            Joint::Target(j) => j.frequency = frequency,
            Joint::Weld(j) => j.frequency = frequency,
            Joint::Wheel(j) => j.frequency = frequency,
            _ => return self.unsupported("set_frequency"),
        }
        Ok(())
    }

    pub fn damping_ratio(&self) -> Result<f32> {
        match self {
            Joint::Distance(j) => Ok(j.damping_ratio),
            Joint::Target(j) => Ok(j.damping_ratio),
            Joint::Weld(j) => Ok(j.damping_ratio),
            Joint::Wheel(j) => Ok(j.damping_ratio),
            _ => self.unsupported("damping_ratio"),
        }
    }

    pub fn set_damping_ratio(&mut self, ratio: f32) -> Result<()> {
        match self {
            Joint::Distance(j) => j.damping_ratio = ratio,
            Joint::Target(j) => j.damping_ratio = ratio,
            Joint::Weld(j) => j.damping_ratio = ratio,
            Joint::Wheel(j) => j.damping_ratio = ratio,
            _ => return self.unsupported("set_damping_ratio"),
        }
        Ok(())
    }

    pub fn target(&self) -> Result<Vec2> {
        match self {
            Joint::Target(j) => Ok(j.target),
            _ => self.unsupported("target"),
        }
    }

    pub fn set_target(&mut self, target: Vec2) -> Result<()> {
        match self {
            Joint::Target(j) => j.target = target,
            _ => return self.unsupported("set_target"),
        }
        Ok(())
    }

    pub fn angular_lower_limit(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.lower_angle),
            _ => self.unsupported("angular_lower_limit"),
        }
    }

    pub fn angular_upper_limit(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.upper_angle),
            _ => self.unsupported("angular_upper_limit"),
        }
    }

    pub fn set_angular_limits(&mut self, lower: f32, upper: f32) -> Result<()> {
        match self {
            Joint::Revolute(j) => j.set_limits(lower, upper),
            _ => self.unsupported("set_angular_limits"),
        }
    }

    pub fn linear_lower_limit(&self) -> Result<f32> {
        match self {
            Joint::Prismatic(j) => Ok(j.lower_translation),
            _ => self.unsupported("linear_lower_limit"),
        }
    }

    pub fn linear_upper_limit(&self) -> Result<f32> {
        match self {
            Joint::Prismatic(j) => Ok(j.upper_translation),
            _ => self.unsupported("linear_upper_limit"),
        }
    }

    pub fn set_linear_limits(&mut self, lower: f32, upper: f32) -> Result<()> {
        match self {
            Joint::Prismatic(j) => j.set_limits(lower, upper),
            _ => self.unsupported("set_linear_limits"),
        }
    }

    pub fn is_limit_enabled(&self) -> Result<bool> {
        match self {
            Joint::Revolute(j) => Ok(j.enable_limit),
            Joint::Prismatic(j) => Ok(j.enable_limit),
            _ => self.unsupported("is_limit_enabled"),
        }
    }

    pub fn enable_limit(&mut self, enabled: bool) -> Result<()> {
        match self {
            Joint::Revolute(j) => j.set_limit_enabled(enabled),
            Joint::Prismatic(j) => j.set_limit_enabled(enabled),
            _ => return self.unsupported("enable_limit"),
        }
        Ok(())
    }

    pub fn limit_state(&self) -> Result<LimitState> {
        match self {
            Joint::Revolute(j) => Ok(j.limit_state),
            Joint::Prismatic(j) => Ok(j.limit_state),
            _ => self.unsupported("limit_state"),
        }
    }

    pub fn linear_offset(&self) -> Result<Vec2> {
        match self {
            Joint::Motor(j) => Ok(j.linear_offset),
            _ => self.unsupported("linear_offset"),
        }
    }

    pub fn set_linear_offset(&mut self, offset: Vec2) -> Result<()> {
        match self {
            Joint::Motor(j) => j.linear_offset = offset,
            _ => return self.unsupported("set_linear_offset"),
        }
        Ok(())
    }

    pub fn angular_offset(&self) -> Result<f32> {
        match self {
            Joint::Motor(j) => Ok(j.angular_offset),
            _ => self.unsupported("angular_offset"),
        }
    }

    pub fn set_angular_offset(&mut self, offset: f32) -> Result<()> {
        match self {
            Joint::Motor(j) => j.angular_offset = offset,
            _ => return self.unsupported("set_angular_offset"),
        }
        Ok(())
    }

    pub fn ground_anchor_a(&self) -> Result<Vec2> {
        match self {
            Joint::Pulley(j) => Ok(j.ground_anchor_a),
            _ => self.unsupported("ground_anchor_a"),
        }
    }

    pub fn ground_anchor_b(&self) -> Result<Vec2> {
        match self {
            Joint::Pulley(j) => Ok(j.ground_anchor_b),
            _ => self.unsupported("ground_anchor_b"),
        }
    }

    pub fn linear_motor_impulse(&self) -> Result<f32> {
        match self {
            Joint::Prismatic(j) => Ok(j.motor_impulse),
            _ => self.unsupported("linear_motor_impulse"),
        }
    }

    pub fn angular_motor_impulse(&self) -> Result<f32> {
        match self {
            Joint::Revolute(j) => Ok(j.motor_impulse),
            Joint::Wheel(j) => Ok(j.motor_impulse),
            _ => self.unsupported("angular_motor_impulse"),
        }
    }

    pub fn max_force(&self) -> Result<f32> {
        match self {
            Joint::Friction(j) => Ok(j.max_force),
            Joint::Motor(j) => Ok(j.max_force),
            Joint::Target(j) => Ok(j.max_force),
            _ => self.unsupported("max_force"),
        }
    }

    pub fn set_max_force(&mut self, force: f32) -> Result<()> {
        match self {
            Joint::Friction(j) => j.max_force = force,
            Joint::Motor(j) => j.max_force = force,
            Joint::Target(j) => j.max_force = force,
            _ => return self.unsupported("set_max_force"),
        }
        Ok(())
    }

    pub fn max_torque(&self) -> Result<f32> {
        match self {
            Joint::Friction(j) => Ok(j.max_torque),
            Joint::Motor(j) => Ok(j.max_torque),
            _ => self.unsupported("max_torque"),
        }
    }

    pub fn set_max_torque(&mut self, torque: f32) -> Result<()> {
        match self {
            Joint::Friction(j) => j.max_torque = torque,
            Joint::Motor(j) => j.max_torque = torque,
            _ => return self.unsupported("set_max_torque"),
        }
        Ok(())
    }

    /// Rest length of a distance joint or maximum length of a rope joint.
    pub fn length(&self) -> Result<f32> {
        match self {
            Joint::Distance(j) => Ok(j.length),
            Joint::Rope(j) => Ok(j.max_length),
            _ => self.unsupported("length"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Two unit-mass disks with unit inertia, at `a` and `b`.
    pub fn two_bodies(a: Vec2, b: Vec2) -> Vec<BodyConstraint> {
        bodies_at(&[a, b])
    }

    /// Unit-mass disks with unit inertia, one per center.
    pub fn bodies_at(centers: &[Vec2]) -> Vec<BodyConstraint> {
        centers
            .iter()
            .map(|&c| BodyConstraint {
                inv_mass: 1.0,
                inv_i: 1.0,
                local_center: Vec2::ZERO,
                position: Position { c, a: 0.0 },
                velocity: Velocity::default(),
            })
            .collect()
    }

    pub fn step() -> SolverStep {
        SolverStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            do_warm_start: true,
            velocity_threshold: 1.0,
        }
    }

    /// Run the velocity and position iterations the way an island does.
    pub fn solve(joint: &mut dyn Constraint, bodies: &mut [BodyConstraint], iterations: usize) {
        let step = step();
        let conf = ConstraintSolverConf::default();
        for _ in 0..iterations {
            joint.init_velocity(bodies, &step, &conf);
            for _ in 0..8 {
                joint.solve_velocity(bodies, &step);
            }
            for body in bodies.iter_mut() {
                body.position.c += step.dt * body.velocity.v;
                body.position.a += step.dt * body.velocity.w;
            }
            for _ in 0..3 {
                if joint.solve_position(bodies, &conf) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::math::Transformation;
    use crate::physics::world::JointId;

    #[test]
    fn test_kind_names_are_lowercase() {
        assert_eq!(JointKind::Revolute.to_string(), "revolute");
        assert_eq!(JointKind::Target.to_string(), "target");
    }

    /// One joint of every kind between bodies 0 and 1.
    fn every_kind() -> Vec<Joint> {
        let (a, b) = (BodyId::new(0, 0), BodyId::new(1, 0));
        let hinge1 = Joint::Revolute(RevoluteJoint::new(&RevoluteJointConf::new(a, b)));
        let hinge2 = Joint::Revolute(RevoluteJoint::new(&RevoluteJointConf::new(a, b)));
        let gear_conf = GearJointConf::new(JointId::new(0, 0), JointId::new(1, 0));
        let gear = GearJoint::new(&gear_conf, &hinge1, &hinge2, |_| {
            Ok((Transformation::IDENTITY, 0.0))
        })
        .unwrap();
        vec![
            Joint::Distance(DistanceJoint::new(&DistanceJointConf::new(a, b))),
            hinge1,
            Joint::Prismatic(PrismaticJoint::new(&PrismaticJointConf::new(a, b))),
            Joint::Weld(WeldJoint::new(&WeldJointConf::new(a, b))),
            Joint::Wheel(WheelJoint::new(&WheelJointConf::new(a, b))),
            Joint::Motor(MotorJoint::new(&MotorJointConf::new(a, b))),
            Joint::Pulley(PulleyJoint::new(&PulleyJointConf::new(a, b)).unwrap()),
            Joint::Target(TargetJoint::new(&TargetJointConf::new(a, b))),
            Joint::Friction(FrictionJoint::new(&FrictionJointConf::new(a, b))),
            Joint::Gear(gear),
            Joint::Rope(RopeJoint::new(&RopeJointConf::new(a, b))),
        ]
    }

    #[test]
    fn test_accessor_on_wrong_kind_is_unsupported() {
        let joint = Joint::Distance(DistanceJoint::new(&DistanceJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0))));
        assert_eq!(
            joint.motor_speed(),
            Err(PhysicsError::UnsupportedOperation {
                operation: "motor_speed",
                kind: JointKind::Distance,
            })
        );
        assert!(joint.frequency().is_ok());
        assert!(joint.local_anchor_a().is_ok());
    }

    #[test]
    fn test_accessor_support_matrix() {
        use JointKind::*;

        type Accessor = fn(&Joint) -> bool;
        let table: [(&str, Accessor, &[JointKind]); 13] = [
            ("local_anchor_a", |j| j.local_anchor_a().is_ok(), &[Distance, Revolute, Prismatic, Weld, Wheel, Pulley, Friction, Rope]),
            ("local_anchor_b", |j| j.local_anchor_b().is_ok(), &[Distance, Revolute, Prismatic, Weld, Wheel, Pulley, Target, Friction, Rope]),
            ("reference_angle", |j| j.reference_angle().is_ok(), &[Revolute, Prismatic, Weld]),
            ("local_x_axis_a", |j| j.local_x_axis_a().is_ok(), &[Prismatic, Wheel]),
            ("local_y_axis_a", |j| j.local_y_axis_a().is_ok(), &[Prismatic, Wheel]),
            ("motor_speed", |j| j.motor_speed().is_ok(), &[Revolute, Prismatic, Wheel]),
            ("max_motor_torque", |j| j.max_motor_torque().is_ok(), &[Revolute, Wheel]),
            ("angular_mass", |j| j.angular_mass().is_ok(), &[Friction, Motor, Revolute, Wheel]),
            ("ratio", |j| j.ratio().is_ok(), &[Gear, Pulley]),
            ("frequency", |j| j.frequency().is_ok(), &[Distance, Target, Weld, Wheel]),
            ("target", |j| j.target().is_ok(), &[Target]),
            ("linear_offset", |j| j.linear_offset().is_ok(), &[Motor]),
            ("angular_motor_impulse", |j| j.angular_motor_impulse().is_ok(), &[Revolute, Wheel]),
        ];

        let joints = every_kind();
        assert_eq!(joints.len(), 11, "one joint per kind");
        for (name, supported, kinds) in table {
            for joint in &joints {
                assert_eq!(
                    supported(joint),
                    kinds.contains(&joint.kind()),
                    "{} on {} joints",
                    name,
                    joint.kind()
                );
            }
        }
    }

    #[test]
    fn test_unsupported_error_names_accessor_and_kind() {
        for joint in every_kind() {
            if let Err(err) = joint.ratio() {
                assert_eq!(
                    err,
                    PhysicsError::UnsupportedOperation {
                        operation: "ratio",
                        kind: joint.kind(),
                    }
                );
            }
        }
    }

    #[test]
    fn test_setters_reach_the_kind() {
        let conf = RevoluteJointConf::new(BodyId::new(0, 0), BodyId::new(1, 0));
        let mut joint = Joint::Revolute(RevoluteJoint::new(&conf));
        joint.set_motor_speed(2.0).unwrap();
        joint.enable_motor(true).unwrap();
        joint.set_angular_limits(-0.5, 0.5).unwrap();
        assert_eq!(joint.motor_speed().unwrap(), 2.0);
        assert!(joint.is_motor_enabled().unwrap());
        assert_eq!(joint.angular_upper_limit().unwrap(), 0.5);
        assert!(joint.set_angular_limits(1.0, -1.0).is_err(), "lower above upper must be rejected");
        assert!(joint.set_target(Vec2::ONE).is_err());
    }

    #[test]
    fn test_soft_coefficients_vanish_without_stiffness() {
        let (gamma, bias) = soft_coefficients(1.0, 0.0, 0.0, 1.0 / 60.0);
        assert_eq!(gamma, 0.0);
        assert_eq!(bias, 0.0);
    }
}
