//! Fixtures attach shapes to bodies.

use super::collider::Shape;
use super::dynamic_tree::ProxyId;
use super::world::BodyId;

pub use super::arena::FixtureId;

/// Collision filtering data.
///
/// Two fixtures collide when they share a positive group index, or when
/// neither has a negative shared group index and each one's category is in
/// the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Category bits of this fixture. Default: 0x0001.
    pub category_bits: u16,
    /// Categories this fixture accepts collisions with. Default: 0xFFFF.
    pub mask_bits: u16,
    /// Shared group override. Default: 0.
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

/// Whether two filters allow a collision.
pub fn should_collide(a: &Filter, b: &Filter) -> bool {
    if a.group_index == b.group_index && a.group_index != 0 {
        return a.group_index > 0;
    }
    (a.mask_bits & b.category_bits) != 0 && (a.category_bits & b.mask_bits) != 0
}

/// Configuration for creating a fixture.
#[derive(Debug, Clone)]
pub struct FixtureConf {
    /// Mass per unit area. Default: 0.
    pub density: f32,
    /// Coulomb friction coefficient. Default: 0.2.
    pub friction: f32,
    /// Bounciness in [0, 1]. Default: 0.
    pub restitution: f32,
    /// Sensors detect overlap but never generate contact response. Default: false.
    pub is_sensor: bool,
    pub filter: Filter,
}

impl Default for FixtureConf {
    fn default() -> Self {
        Self {
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
        }
    }
}

/// Broad-phase user data: which child of which fixture a proxy stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureProxy {
    pub fixture: FixtureId,
    pub child: u32,
}

/// A shape attached to a body.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyId,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    /// One proxy per child while the body is enabled.
    pub(crate) proxies: Vec<ProxyId>,
}

impl Fixture {
    pub(crate) fn new(body: BodyId, shape: Shape, conf: &FixtureConf) -> Self {
        Self {
            body,
            shape,
            density: conf.density,
            friction: conf.friction,
            restitution: conf.restitution,
            is_sensor: conf.is_sensor,
            filter: conf.filter,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn proxies(&self) -> &[ProxyId] {
        &self.proxies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_groups_override_masks() {
        let a = Filter {
            group_index: 3,
            mask_bits: 0,
            ..Filter::default()
        };
        assert!(should_collide(&a, &a), "positive group should always collide");

        let b = Filter {
            group_index: -3,
            ..Filter::default()
        };
        assert!(!should_collide(&b, &b), "negative group should never collide");
    }

    #[test]
    fn test_filter_category_mask() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0001,
            group_index: 0,
        };
        let ground = Filter::default();
        let other_player = player;
        assert!(should_collide(&player, &ground));
        assert!(!should_collide(&player, &other_player));
    }
}
