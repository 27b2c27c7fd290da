//! Global tuning constants.
//!
//! Per-step values that a caller may want to change live on
//! [`StepConf`](super::step::StepConf); these are the defaults it is built
//! from plus the hard structural limits of the core.

use std::f32::consts::PI;

/// Collision and constraint tolerance in meters.
pub const LINEAR_SLOP: f32 = 0.005;
/// Angular counterpart of [`LINEAR_SLOP`] in radians.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;
/// Skin radius given to polygons and edges by default.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of points in a contact manifold.
pub const MAX_MANIFOLD_POINTS: usize = 2;
/// Maximum number of vertices of a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;
/// Maximum number of vertices in a GJK simplex.
pub const MAX_SIMPLEX_VERTICES: usize = 3;

/// Fattening margin applied to broad-phase proxies.
pub const AABB_EXTENSION: f32 = 0.1;
/// Multiplier on displacement used to predict proxy motion.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Largest position correction applied in one position iteration.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;
/// Largest angular correction applied in one position iteration.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;
/// Largest translation of a body in one step.
pub const MAX_TRANSLATION: f32 = 2.0;
/// Largest rotation of a body in one step.
pub const MAX_ROTATION: f32 = 0.5 * PI;

/// Position correction rate for the regular solver.
pub const BAUMGARTE: f32 = 0.2;
/// Position correction rate for TOI sub-steps.
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Relative normal speed below which collisions are inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Maximum number of TOI sub-steps per contact in one step.
pub const MAX_SUB_STEPS: u32 = 8;
/// Maximum number of TOI contacts gathered into one TOI island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Time a body must be still before it may sleep.
pub const TIME_TO_SLEEP: f32 = 0.5;
/// Linear speed below which a body counts as still.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;
/// Angular speed below which a body counts as still.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Smallest vertex radius a fixture may be created with by default.
pub const DEFAULT_MIN_VERTEX_RADIUS: f32 = LINEAR_SLOP * 2.0;
/// Largest vertex radius a fixture may be created with by default.
pub const DEFAULT_MAX_VERTEX_RADIUS: f32 = 255.0;
