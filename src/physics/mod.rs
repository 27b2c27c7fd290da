//! 2D rigid body dynamics: collision detection, contacts, joints and a
//! sequential impulse solver with continuous collision.
//!
//! # Architecture
//!
//! A [`World`] owns everything and runs each step as:
//!
//! 1. Broad phase: fat boxes in a dynamic AABB tree pair up fixtures
//! 2. Narrow phase: contacts refresh their manifolds and report begin, end
//!    and pre-solve events to the [`ContactListener`]
//! 3. Islands: awake bodies connected by touching contacts and joints are
//!    solved together and go to sleep together
//! 4. Solver: velocity constraints, position integration, then position
//!    correction
//! 5. Continuous collision: time of impact sub-steps keep fast and bullet
//!    bodies from tunnelling
//!
//! The lower layers ([`distance()`], [`time_of_impact`], [`collide_shapes`],
//! [`DynamicTree`]) are usable on their own.

mod arena;
pub mod broadphase;
pub mod collider;
pub mod contact;
pub mod distance;
pub mod dynamic_tree;
pub mod fixture;
mod island;
pub mod joint;
pub mod manifold;
pub mod math;
pub mod rigid_body;
pub mod settings;
pub mod solver;
pub mod step;
pub mod toi;
pub mod world;

pub use broadphase::{BroadPhase, BroadPhaseConf};
pub use collider::{
    Aabb, ChainShape, DiskShape, DistanceProxy, EdgeShape, MassData, PolygonShape, Shape,
};
pub use contact::{Contact, ContactId, ContactImpulses, ContactListener};
pub use distance::{distance, DistanceConf, DistanceOutput, DistanceState, SimplexCache};
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use fixture::{Filter, Fixture, FixtureConf, FixtureId};
pub use joint::{Joint, JointConf, JointKind, LimitState};
pub use manifold::{collide_shapes, Manifold, ManifoldKind, ManifoldPoint, WorldManifold};
pub use math::{Rot, Sweep, Transformation, Velocity};
pub use rigid_body::{Body, BodyConf, BodyType};
pub use step::{PreStepStats, RegStepStats, StepConf, StepStats, ToiStepStats};
pub use toi::{time_of_impact, ToiConf, ToiOutput, ToiState};
pub use world::{BodyId, DestructionListener, JointId, World, WorldConf};
