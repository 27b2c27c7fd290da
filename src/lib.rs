//! rein2d: a 2D rigid body physics engine.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **physics::math** - Rotations, transforms, sweeps and small linear solves
//! 2. **physics::collider** - Shapes, bounding boxes and mass properties
//! 3. **physics::distance / toi / manifold** - GJK distance, time of impact
//!    and contact manifolds
//! 4. **physics::dynamic_tree / broadphase** - AABB tree and pair finding
//! 5. **physics::solver / joint** - Contact and joint constraints
//! 6. **physics::world / step** - Entities, events and the step pipeline
//! 7. **error** - Error type returned at the public boundary

pub mod error;
pub mod physics;

pub use error::{PhysicsError, Result};

pub use physics::{
    Body, BodyConf, BodyId, BodyType, ContactListener, DestructionListener, Fixture, FixtureConf,
    FixtureId, Joint, JointConf, JointId, Shape, StepConf, StepStats, World, WorldConf,
};

// Re-export glam for convenience
pub use glam;
