//! Contacts between pairs of fixture children.
//!
//! A contact exists while the fat boxes of its two proxies overlap. It owns
//! the persistent manifold (with the impulses carried between steps) and the
//! GJK simplex cache for the pair. Whether the shapes actually touch is
//! tracked separately by the `touching` flag.

use super::collider::Shape;
use super::distance::{distance, SimplexCache};
use super::fixture::{FixtureId, FixtureProxy};
use super::manifold::{collide_shapes, Manifold};
use super::math::Transformation;
use super::settings::MAX_MANIFOLD_POINTS;
use super::world::{BodyId, World};

pub use super::arena::ContactId;

/// Friction mixing: geometric mean, so a frictionless fixture slides on anything.
#[inline]
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: anything bounces off a bouncy fixture.
#[inline]
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

/// Normal and tangent impulses applied to each manifold point by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulses {
    pub normal: [f32; MAX_MANIFOLD_POINTS],
    pub tangent: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Contact between one child of each of two fixtures.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) proxy_a: FixtureProxy,
    pub(crate) proxy_b: FixtureProxy,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) manifold: Manifold,
    pub(crate) cache: SimplexCache,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
    /// Cleared by a listener in `pre_solve` to skip the contact for one step.
    pub(crate) enabled: bool,
    pub(crate) touching: bool,
    /// Set when a filter changed and the pair must be re-checked.
    pub(crate) needs_filtering: bool,
    /// Cached time of impact for the current sub-step, if computed.
    pub(crate) toi: Option<f32>,
    pub(crate) toi_count: u32,
}

/// What changed in a call to [`Contact::update`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContactUpdate {
    pub was_touching: bool,
    pub touching: bool,
    pub old_manifold: Manifold,
    pub sensor: bool,
}

impl ContactUpdate {
    pub fn began(&self) -> bool {
        !self.was_touching && self.touching
    }

    pub fn ended(&self) -> bool {
        self.was_touching && !self.touching
    }
}

impl Contact {
    pub(crate) fn new(
        proxy_a: FixtureProxy,
        body_a: BodyId,
        proxy_b: FixtureProxy,
        body_b: BodyId,
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            proxy_a,
            proxy_b,
            body_a,
            body_b,
            manifold: Manifold::default(),
            cache: SimplexCache::default(),
            friction,
            restitution,
            tangent_speed: 0.0,
            enabled: true,
            touching: false,
            needs_filtering: false,
            toi: None,
            toi_count: 0,
        }
    }

    /// Recompute the manifold for the given shapes and transforms.
    ///
    /// Impulses are carried over for points whose features persisted.
    /// Sensors only test for overlap and keep an empty manifold.
    pub(crate) fn update(
        &mut self,
        shape_a: &Shape,
        xf_a: &Transformation,
        shape_b: &Shape,
        xf_b: &Transformation,
        sensor: bool,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;
        let was_touching = self.touching;

        // Re-enable so a listener has to disable it again every step.
        self.enabled = true;

        let (Ok(child_a), Ok(child_b)) = (
            shape_a.child(self.proxy_a.child as usize),
            shape_b.child(self.proxy_b.child as usize),
        ) else {
            debug_assert!(false, "contact refers to a missing shape child");
            self.manifold = Manifold::default();
            self.touching = false;
            return ContactUpdate {
                was_touching,
                touching: false,
                old_manifold,
                sensor,
            };
        };

        let touching = if sensor {
            let output = distance(&mut self.cache, &child_a, xf_a, &child_b, xf_b);
            let separation =
                output.core_distance() - child_a.vertex_radius() - child_b.vertex_radius();
            self.manifold = Manifold::default();
            separation < 10.0 * f32::EPSILON
        } else {
            let mut manifold = collide_shapes(&child_a, xf_a, &child_b, xf_b);
            for new_point in manifold.points_mut() {
                new_point.normal_impulse = 0.0;
                new_point.tangent_impulse = 0.0;
                if let Some(old_point) = old_manifold
                    .points()
                    .iter()
                    .find(|p| p.feature == new_point.feature)
                {
                    new_point.normal_impulse = old_point.normal_impulse;
                    new_point.tangent_impulse = old_point.tangent_impulse;
                }
            }
            self.manifold = manifold;
            manifold.point_count() > 0
        };

        self.touching = touching;
        ContactUpdate {
            was_touching,
            touching,
            old_manifold,
            sensor,
        }
    }

    pub fn fixture_a(&self) -> FixtureId {
        self.proxy_a.fixture
    }

    pub fn fixture_b(&self) -> FixtureId {
        self.proxy_b.fixture
    }

    pub fn child_a(&self) -> u32 {
        self.proxy_a.child
    }

    pub fn child_b(&self) -> u32 {
        self.proxy_b.child
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn simplex_cache(&self) -> &SimplexCache {
        &self.cache
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disable the contact for the current step. Only meaningful from
    /// [`ContactListener::pre_solve`]; the next update re-enables it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Override the mixed friction. Persists until the contact is destroyed.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    /// Number of TOI sub-steps this contact took part in during the current step.
    pub fn toi_count(&self) -> u32 {
        self.toi_count
    }

    /// Accumulated impulses of the current manifold points.
    pub fn impulses(&self) -> ContactImpulses {
        let mut out = ContactImpulses {
            count: self.manifold.point_count(),
            ..ContactImpulses::default()
        };
        for (i, p) in self.manifold.points().iter().enumerate() {
            out.normal[i] = p.normal_impulse;
            out.tangent[i] = p.tangent_impulse;
        }
        out
    }

    /// Whether this contact involves the given body.
    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// The body on the other side of the contact from `body`.
    pub fn other_body(&self, body: BodyId) -> BodyId {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }
}

/// Receives contact events during a step.
///
/// Every callback gets the world mutably. The world is locked while a
/// callback runs, so creating or destroying bodies, fixtures or joints fails
/// with [`PhysicsError::WrongState`](crate::error::PhysicsError::WrongState).
/// Contacts can be tweaked through [`World::contact_mut`].
pub trait ContactListener {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, _world: &mut World, _contact: ContactId) {}

    /// Two fixtures stopped touching, or their contact was destroyed while
    /// touching.
    fn end_contact(&mut self, _world: &mut World, _contact: ContactId) {}

    /// Called after a manifold update and before solving, for touching
    /// non-sensor contacts.
    fn pre_solve(&mut self, _world: &mut World, _contact: ContactId, _old_manifold: &Manifold) {}

    /// Called after the solver with the impulses it applied.
    fn post_solve(
        &mut self,
        _world: &mut World,
        _contact: ContactId,
        _impulses: &ContactImpulses,
        _solver_iterations: u32,
    ) {
    }
}
