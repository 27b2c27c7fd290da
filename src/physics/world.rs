//! The world: arenas of bodies, fixtures, joints and contacts around one
//! broad phase.
//!
//! Entities are addressed by small copyable generational handles. A handle
//! kept after its entity is destroyed fails every lookup with
//! [`PhysicsError::InvalidId`], even once the slot has been reused.
//!
//! Structural mutations (creating or destroying bodies, fixtures and joints,
//! changing a body's type or enabled state, teleporting bodies, shifting the
//! origin) fail with [`PhysicsError::WrongState`] while the world is locked,
//! which is the case for the whole of [`World::step`] including every
//! [`ContactListener`] callback.

use std::collections::HashMap;

use glam::Vec2;
use tracing::trace;

use super::arena::{Arena, ArenaKey};
use super::broadphase::{BroadPhase, BroadPhaseConf};
use super::collider::{Aabb, MassData, Shape};
use super::contact::{Contact, ContactId, ContactListener};
use super::fixture::{should_collide, Filter, Fixture, FixtureConf, FixtureId, FixtureProxy};
use super::joint::{
    DistanceJoint, FrictionJoint, GearJoint, Joint, JointConf, MotorJoint, PrismaticJoint,
    PulleyJoint, RevoluteJoint, RopeJoint, TargetJoint, WeldJoint, WheelJoint,
};
use super::math::{Transformation, Velocity};
use super::rigid_body::{Body, BodyConf, BodyType};
use super::settings::{DEFAULT_MAX_VERTEX_RADIUS, DEFAULT_MIN_VERTEX_RADIUS};
use crate::error::{PhysicsError, Result};

pub use super::arena::{BodyId, JointId};

/// Configuration for a [`World`].
#[derive(Debug, Clone)]
pub struct WorldConf {
    /// Default: (0, -9.8).
    pub gravity: Vec2,
    /// Smallest vertex radius accepted by [`World::create_fixture`].
    /// Default: 2 * linear slop.
    pub min_vertex_radius: f32,
    /// Largest vertex radius accepted by [`World::create_fixture`].
    /// Default: 255.
    pub max_vertex_radius: f32,
    pub broad_phase: BroadPhaseConf,
}

impl Default for WorldConf {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.8),
            min_vertex_radius: DEFAULT_MIN_VERTEX_RADIUS,
            max_vertex_radius: DEFAULT_MAX_VERTEX_RADIUS,
            broad_phase: BroadPhaseConf::default(),
        }
    }
}

/// Told about joints and fixtures the world destroys on its own: those of
/// a destroyed body and gear joints built on a destroyed joint.
///
/// Called before the entity goes, so the handle still resolves in the
/// callback's caller but must be dropped afterwards.
pub trait DestructionListener {
    fn joint_destroyed(&mut self, _joint: JointId) {}

    fn fixture_destroyed(&mut self, _fixture: FixtureId) {}
}

/// Key of the contact map: the two proxies in ascending order.
#[inline]
pub(crate) fn pair_key(a: FixtureProxy, b: FixtureProxy) -> (FixtureProxy, FixtureProxy) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn invalid_id(entity: &'static str, key: impl ArenaKey) -> PhysicsError {
    let (index, generation) = key.parts();
    PhysicsError::InvalidId {
        entity,
        index,
        generation,
    }
}

/// A physics world.
pub struct World {
    pub(crate) bodies: Arena<BodyId, Body>,
    pub(crate) fixtures: Arena<FixtureId, Fixture>,
    pub(crate) joints: Arena<JointId, Joint>,
    pub(crate) contacts: Arena<ContactId, Contact>,
    pub(crate) broad_phase: BroadPhase<FixtureProxy>,
    pub(crate) contact_map: HashMap<(FixtureProxy, FixtureProxy), ContactId>,
    pub(crate) listener: Option<Box<dyn ContactListener>>,
    destruction_listener: Option<Box<dyn DestructionListener>>,
    pub(crate) gravity: Vec2,
    min_vertex_radius: f32,
    max_vertex_radius: f32,
    pub(crate) locked: bool,
    pub(crate) sub_stepping: bool,
    pub(crate) step_complete: bool,
    /// Inverse of the last positive time step, 0 before the first one.
    pub(crate) inv_dt0: f32,
}

impl Default for World {
    fn default() -> Self {
        Self::new(&WorldConf::default())
    }
}

impl World {
    pub fn new(conf: &WorldConf) -> Self {
        Self {
            bodies: Arena::default(),
            fixtures: Arena::default(),
            joints: Arena::default(),
            contacts: Arena::default(),
            broad_phase: BroadPhase::new(&conf.broad_phase),
            contact_map: HashMap::new(),
            listener: None,
            destruction_listener: None,
            gravity: conf.gravity,
            min_vertex_radius: conf.min_vertex_radius,
            max_vertex_radius: conf.max_vertex_radius,
            locked: false,
            sub_stepping: false,
            step_complete: true,
            inv_dt0: 0.0,
        }
    }

    pub(crate) fn check_unlocked(&self, operation: &'static str) -> Result<()> {
        if self.locked {
            Err(PhysicsError::WrongState { operation })
        } else {
            Ok(())
        }
    }

    // Entity lookup.

    pub fn body(&self, id: BodyId) -> Result<&Body> {
        self.bodies.get(id).ok_or_else(|| invalid_id("body", id))
    }

    /// Mutable access to a body's non-structural state (velocity, forces,
    /// damping, sleep).
    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut Body> {
        self.bodies.get_mut(id).ok_or_else(|| invalid_id("body", id))
    }

    pub fn fixture(&self, id: FixtureId) -> Result<&Fixture> {
        self.fixtures.get(id).ok_or_else(|| invalid_id("fixture", id))
    }

    fn fixture_mut(&mut self, id: FixtureId) -> Result<&mut Fixture> {
        self.fixtures.get_mut(id).ok_or_else(|| invalid_id("fixture", id))
    }

    pub fn joint(&self, id: JointId) -> Result<&Joint> {
        self.joints.get(id).ok_or_else(|| invalid_id("joint", id))
    }

    /// Mutable access to a joint. Wakes every body the joint moves, since
    /// changing a motor or limit should take effect on sleeping bodies.
    pub fn joint_mut(&mut self, id: JointId) -> Result<&mut Joint> {
        let bodies: Vec<BodyId> = self.joint(id)?.bodies().collect();
        for body in bodies {
            if let Some(body) = self.bodies.get_mut(body) {
                body.set_awake(true);
            }
        }
        self.joints.get_mut(id).ok_or_else(|| invalid_id("joint", id))
    }

    pub fn contact(&self, id: ContactId) -> Result<&Contact> {
        self.contacts.get(id).ok_or_else(|| invalid_id("contact", id))
    }

    /// Mutable access to a contact, for tweaking friction, restitution,
    /// tangent speed or disabling it from a listener.
    pub fn contact_mut(&mut self, id: ContactId) -> Result<&mut Contact> {
        self.contacts.get_mut(id).ok_or_else(|| invalid_id("contact", id))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter()
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter()
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contacts.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.broad_phase.tree().height()
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// In sub-stepping mode each step resolves at most one TOI event.
    pub fn set_sub_stepping(&mut self, enabled: bool) {
        self.sub_stepping = enabled;
    }

    pub fn is_sub_stepping(&self) -> bool {
        self.sub_stepping
    }

    /// False while sub-stepping has TOI events left over from the last step.
    pub fn is_step_complete(&self) -> bool {
        self.step_complete
    }

    pub fn set_contact_listener(&mut self, listener: impl ContactListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_contact_listener(&mut self) {
        self.listener = None;
    }

    pub fn set_destruction_listener(&mut self, listener: impl DestructionListener + 'static) {
        self.destruction_listener = Some(Box::new(listener));
    }

    pub fn clear_destruction_listener(&mut self) {
        self.destruction_listener = None;
    }

    /// Visit every fixture child whose fat box overlaps `aabb`. The callback
    /// returns false to stop the query.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(FixtureId, u32) -> bool) {
        let broad_phase = &self.broad_phase;
        broad_phase.query(aabb, |proxy| match broad_phase.user_data(proxy) {
            Some(data) => callback(data.fixture, data.child),
            None => true,
        });
    }

    // Bodies.

    pub fn create_body(&mut self, conf: &BodyConf) -> Result<BodyId> {
        self.check_unlocked("create body")?;
        if !conf.position.is_finite() || !conf.angle.is_finite() {
            return Err(PhysicsError::invalid_argument("body pose must be finite"));
        }
        if !conf.linear_velocity.is_finite() || !conf.angular_velocity.is_finite() {
            return Err(PhysicsError::invalid_argument("body velocity must be finite"));
        }
        if !(conf.linear_damping >= 0.0 && conf.angular_damping >= 0.0) {
            return Err(PhysicsError::invalid_argument(
                "body damping must be non-negative",
            ));
        }
        let id = self.bodies.insert(Body::new(conf));
        trace!(body = id.index(), "created body");
        Ok(id)
    }

    /// Destroy a body with its fixtures, joints and contacts.
    ///
    /// Touching contacts report `end_contact` before they go. The
    /// destruction listener hears about every joint and fixture removed.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        self.check_unlocked("destroy body")?;
        self.body(id)?;

        let joints: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.involves(id))
            .map(|(i, _)| i)
            .collect();
        for joint in joints {
            self.destroy_joint_unchecked(joint, true);
        }

        let contacts = self.body(id)?.contacts.clone();
        for contact in contacts {
            self.destroy_contact(contact);
        }

        let fixtures = self.body(id)?.fixtures.clone();
        for fixture in fixtures {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.fixture_destroyed(fixture);
            }
            self.remove_fixture(fixture);
        }

        self.bodies.remove(id);
        trace!(body = id.index(), "destroyed body");
        Ok(())
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f32) -> Result<()> {
        self.check_unlocked("set transform")?;
        if !position.is_finite() || !angle.is_finite() {
            return Err(PhysicsError::invalid_argument("body pose must be finite"));
        }
        let body = self.body_mut(id)?;
        body.set_transform(position, angle);
        let xf = body.xf;
        self.synchronize_fixtures(id, &xf, &xf);
        Ok(())
    }

    pub fn set_awake(&mut self, id: BodyId, awake: bool) -> Result<()> {
        self.body_mut(id)?.set_awake(awake);
        Ok(())
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<()> {
        self.body_mut(id)?.set_velocity(velocity);
        Ok(())
    }

    /// Enable or disable a body. Disabled bodies have no proxies and no
    /// contacts and are ignored by the solver.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        self.check_unlocked("set enabled")?;
        let body = self.body_mut(id)?;
        if body.enabled == enabled {
            return Ok(());
        }
        body.enabled = enabled;
        let xf = body.xf;
        let fixtures = body.fixtures.clone();

        if enabled {
            for fixture in fixtures {
                self.create_proxies(fixture, &xf);
            }
        } else {
            for fixture in &fixtures {
                self.destroy_proxies(*fixture);
            }
            let contacts = self.body(id)?.contacts.clone();
            for contact in contacts {
                self.destroy_contact(contact);
            }
        }
        Ok(())
    }

    /// Change a body's type. Mass is recomputed and its contacts are rebuilt.
    pub fn set_type(&mut self, id: BodyId, body_type: BodyType) -> Result<()> {
        self.check_unlocked("set body type")?;
        if self.body(id)?.body_type == body_type {
            return Ok(());
        }
        self.body_mut(id)?.body_type = body_type;
        self.reset_mass_data(id)?;

        let body = self.body_mut(id)?;
        if body_type == BodyType::Static {
            body.velocity = Velocity::default();
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            body.awake = false;
            let xf = body.xf;
            self.synchronize_fixtures(id, &xf, &xf);
        }
        let body = self.body_mut(id)?;
        body.set_awake(true);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        let contacts = body.contacts.clone();
        for contact in contacts {
            self.destroy_contact(contact);
        }
        self.touch_body_proxies(id);
        Ok(())
    }

    /// Recompute a body's mass, center and inertia from its fixtures.
    pub fn reset_mass_data(&mut self, id: BodyId) -> Result<()> {
        let body = self.body(id)?;
        let parts: Vec<MassData> = body
            .fixtures
            .iter()
            .filter_map(|f| self.fixtures.get(*f))
            .filter(|f| f.density > 0.0)
            .map(|f| f.shape.mass_data(f.density))
            .collect();
        self.body_mut(id)?.reset_mass_data(parts);
        Ok(())
    }

    // Fixtures.

    /// Attach a shape to a body.
    ///
    /// Fails with `InvalidArgument` when the shape's vertex radius lies
    /// outside the world's accepted range or the material is malformed.
    pub fn create_fixture(
        &mut self,
        body: BodyId,
        shape: impl Into<Shape>,
        conf: &FixtureConf,
    ) -> Result<FixtureId> {
        self.check_unlocked("create fixture")?;
        let shape = shape.into();

        let radius = shape.vertex_radius();
        if !(radius >= self.min_vertex_radius && radius <= self.max_vertex_radius) {
            return Err(PhysicsError::invalid_argument(format!(
                "vertex radius {radius} outside [{}, {}]",
                self.min_vertex_radius, self.max_vertex_radius
            )));
        }
        if !(conf.density >= 0.0 && conf.density.is_finite()) {
            return Err(PhysicsError::invalid_argument("density must be non-negative"));
        }
        if !(conf.friction >= 0.0 && conf.friction.is_finite()) {
            return Err(PhysicsError::invalid_argument("friction must be non-negative"));
        }
        if !conf.restitution.is_finite() {
            return Err(PhysicsError::invalid_argument("restitution must be finite"));
        }

        let owner = self.body(body)?;
        let enabled = owner.enabled;
        let xf = owner.xf;
        let density = conf.density;

        let id = self.fixtures.insert(Fixture::new(body, shape, conf));
        self.body_mut(body)?.fixtures.push(id);
        if enabled {
            self.create_proxies(id, &xf);
        }
        if density > 0.0 {
            self.reset_mass_data(body)?;
        }
        Ok(id)
    }

    /// Detach and destroy a fixture, with its contacts.
    pub fn destroy_fixture(&mut self, id: FixtureId) -> Result<()> {
        self.check_unlocked("destroy fixture")?;
        let body = self.fixture(id)?.body;

        let contacts: Vec<ContactId> = self
            .body(body)?
            .contacts
            .iter()
            .copied()
            .filter(|c| {
                self.contacts
                    .get(*c)
                    .is_some_and(|c| c.fixture_a() == id || c.fixture_b() == id)
            })
            .collect();
        for contact in contacts {
            self.destroy_contact(contact);
        }

        self.remove_fixture(id);
        self.reset_mass_data(body)
    }

    /// Replace a fixture's filter and re-check its contacts on the next step.
    pub fn set_filter(&mut self, id: FixtureId, filter: Filter) -> Result<()> {
        self.fixture_mut(id)?.filter = filter;
        self.refilter(id);
        Ok(())
    }

    pub fn set_sensor(&mut self, id: FixtureId, sensor: bool) -> Result<()> {
        let fixture = self.fixture_mut(id)?;
        if fixture.is_sensor != sensor {
            fixture.is_sensor = sensor;
            let body = fixture.body;
            self.body_mut(body)?.set_awake(true);
        }
        Ok(())
    }

    pub fn set_friction(&mut self, id: FixtureId, friction: f32) -> Result<()> {
        if !(friction >= 0.0 && friction.is_finite()) {
            return Err(PhysicsError::invalid_argument("friction must be non-negative"));
        }
        self.fixture_mut(id)?.friction = friction;
        Ok(())
    }

    pub fn set_restitution(&mut self, id: FixtureId, restitution: f32) -> Result<()> {
        if !restitution.is_finite() {
            return Err(PhysicsError::invalid_argument("restitution must be finite"));
        }
        self.fixture_mut(id)?.restitution = restitution;
        Ok(())
    }

    /// Change a fixture's density. Call [`World::reset_mass_data`] to apply it.
    pub fn set_density(&mut self, id: FixtureId, density: f32) -> Result<()> {
        if !(density >= 0.0 && density.is_finite()) {
            return Err(PhysicsError::invalid_argument("density must be non-negative"));
        }
        self.fixture_mut(id)?.density = density;
        Ok(())
    }

    fn create_proxies(&mut self, id: FixtureId, xf: &Transformation) {
        let Some(fixture) = self.fixtures.get_mut(id) else {
            return;
        };
        debug_assert!(fixture.proxies.is_empty(), "fixture already has proxies");
        for child in 0..fixture.shape.child_count() {
            let Ok(aabb) = fixture.shape.compute_aabb(xf, child) else {
                continue;
            };
            let proxy = self.broad_phase.create_proxy(
                aabb,
                FixtureProxy {
                    fixture: id,
                    child: child as u32,
                },
            );
            fixture.proxies.push(proxy);
        }
    }

    fn destroy_proxies(&mut self, id: FixtureId) {
        let Some(fixture) = self.fixtures.get_mut(id) else {
            return;
        };
        for proxy in fixture.proxies.drain(..) {
            self.broad_phase.destroy_proxy(proxy);
        }
    }

    /// Remove a fixture whose contacts are already gone.
    fn remove_fixture(&mut self, id: FixtureId) {
        self.destroy_proxies(id);
        if let Some(fixture) = self.fixtures.remove(id) {
            if let Some(body) = self.bodies.get_mut(fixture.body) {
                body.fixtures.retain(|f| *f != id);
            }
        }
    }

    /// Flag a fixture's contacts for filtering and re-pair its proxies.
    fn refilter(&mut self, id: FixtureId) {
        let Some(fixture) = self.fixtures.get(id) else {
            return;
        };
        if let Some(body) = self.bodies.get(fixture.body) {
            for contact in &body.contacts {
                if let Some(c) = self.contacts.get_mut(*contact) {
                    if c.fixture_a() == id || c.fixture_b() == id {
                        c.needs_filtering = true;
                    }
                }
            }
        }
        for proxy in &fixture.proxies {
            self.broad_phase.touch_proxy(*proxy);
        }
    }

    fn touch_body_proxies(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        for fixture in &body.fixtures {
            if let Some(fixture) = self.fixtures.get(*fixture) {
                for proxy in &fixture.proxies {
                    self.broad_phase.touch_proxy(*proxy);
                }
            }
        }
    }

    /// Move a body's proxies to cover its motion from `xf0` to `xf`.
    /// Returns the number of proxies the tree had to reinsert.
    pub(crate) fn synchronize_fixtures(
        &mut self,
        id: BodyId,
        xf0: &Transformation,
        xf: &Transformation,
    ) -> u32 {
        let Some(body) = self.bodies.get(id) else {
            return 0;
        };
        let displacement = xf.p - xf0.p;
        let mut moved = 0;
        for fixture in &body.fixtures {
            let Some(fixture) = self.fixtures.get(*fixture) else {
                continue;
            };
            for (child, proxy) in fixture.proxies.iter().enumerate() {
                let (Ok(aabb0), Ok(aabb1)) = (
                    fixture.shape.compute_aabb(xf0, child),
                    fixture.shape.compute_aabb(xf, child),
                ) else {
                    continue;
                };
                if self
                    .broad_phase
                    .move_proxy(*proxy, aabb0.combine(&aabb1), displacement)
                {
                    moved += 1;
                }
            }
        }
        moved
    }

    // Joints.

    /// Create a joint. Bodies joined with `collide_connected == false` stop
    /// colliding with each other.
    pub fn create_joint(&mut self, conf: impl Into<JointConf>) -> Result<JointId> {
        self.check_unlocked("create joint")?;
        let joint = self.build_joint(conf.into())?;

        for body in joint.bodies() {
            self.body(body)?;
        }
        let (body_a, body_b) = (joint.body_a(), joint.body_b());
        if body_a == body_b {
            return Err(PhysicsError::invalid_argument(
                "a joint needs two different bodies",
            ));
        }
        let collide_connected = joint.collide_connected();

        let id = self.joints.insert(joint);
        self.body_mut(body_a)?.joints.push(id);
        self.body_mut(body_b)?.joints.push(id);

        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }
        trace!(joint = id.index(), "created joint");
        Ok(id)
    }

    fn build_joint(&self, conf: JointConf) -> Result<Joint> {
        Ok(match conf {
            JointConf::Distance(c) => Joint::Distance(DistanceJoint::new(&c)),
            JointConf::Revolute(c) => Joint::Revolute(RevoluteJoint::new(&c)),
            JointConf::Prismatic(c) => Joint::Prismatic(PrismaticJoint::new(&c)),
            JointConf::Weld(c) => Joint::Weld(WeldJoint::new(&c)),
            JointConf::Wheel(c) => Joint::Wheel(WheelJoint::new(&c)),
            JointConf::Motor(c) => Joint::Motor(MotorJoint::new(&c)),
            JointConf::Pulley(c) => Joint::Pulley(PulleyJoint::new(&c)?),
            JointConf::Target(c) => Joint::Target(TargetJoint::new(&c)),
            JointConf::Friction(c) => Joint::Friction(FrictionJoint::new(&c)),
            JointConf::Rope(c) => Joint::Rope(RopeJoint::new(&c)),
            JointConf::Gear(c) => {
                let joint1 = self.joint(c.joint1)?;
                let joint2 = self.joint(c.joint2)?;
                Joint::Gear(GearJoint::new(&c, joint1, joint2, |id| {
                    self.body(id).map(|b| (b.xf, b.sweep.a))
                })?)
            }
        })
    }

    /// Destroy a joint and wake the bodies it connected. Gear joints built
    /// on this joint are destroyed with it and reported to the destruction
    /// listener.
    pub fn destroy_joint(&mut self, id: JointId) -> Result<()> {
        self.check_unlocked("destroy joint")?;
        self.joint(id)?;
        self.destroy_joint_unchecked(id, false);
        Ok(())
    }

    fn destroy_joint_unchecked(&mut self, id: JointId, implicit: bool) {
        if self.joints.get(id).is_none() {
            return;
        }
        let gears: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, joint)| match joint {
                Joint::Gear(gear) => gear.joint1() == id || gear.joint2() == id,
                _ => false,
            })
            .map(|(i, _)| i)
            .collect();
        for gear in gears {
            self.destroy_joint_unchecked(gear, true);
        }

        if implicit {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.joint_destroyed(id);
            }
        }
        let Some(joint) = self.joints.remove(id) else {
            return;
        };
        let (body_a, body_b) = (joint.body_a(), joint.body_b());
        for body in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joints.retain(|j| *j != id);
                body.set_awake(true);
            }
        }
        if !joint.collide_connected() {
            self.flag_contacts_between(body_a, body_b);
            self.touch_body_proxies(body_a);
        }
        trace!(joint = id.index(), "destroyed joint");
    }

    fn flag_contacts_between(&mut self, a: BodyId, b: BodyId) {
        let Some(body) = self.bodies.get(b) else {
            return;
        };
        for contact in &body.contacts {
            if let Some(c) = self.contacts.get_mut(*contact) {
                if c.other_body(b) == a {
                    c.needs_filtering = true;
                }
            }
        }
    }

    /// Whether a joint that disables collision directly connects `a` and `b`.
    fn joined_without_collision(&self, a: BodyId, b: BodyId) -> bool {
        let Some(body) = self.bodies.get(a) else {
            return false;
        };
        body.joints.iter().filter_map(|j| self.joints.get(*j)).any(|joint| {
            let (ja, jb) = (joint.body_a(), joint.body_b());
            ((ja == a && jb == b) || (ja == b && jb == a)) && !joint.collide_connected()
        })
    }

    // Contacts.

    /// Whether two fixtures on different bodies may have a contact.
    pub(crate) fn should_collide(&self, a: &Fixture, b: &Fixture) -> bool {
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a.body), self.bodies.get(b.body))
        else {
            return false;
        };
        if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
            return false;
        }
        if self.joined_without_collision(a.body, b.body) {
            return false;
        }
        should_collide(&a.filter, &b.filter)
    }

    /// Create a contact for a new broad-phase pair. Returns whether one was
    /// created.
    pub(crate) fn add_pair(&mut self, proxy_a: FixtureProxy, proxy_b: FixtureProxy) -> bool {
        let (Some(fixture_a), Some(fixture_b)) = (
            self.fixtures.get(proxy_a.fixture),
            self.fixtures.get(proxy_b.fixture),
        ) else {
            return false;
        };
        let (body_a, body_b) = (fixture_a.body, fixture_b.body);
        if body_a == body_b {
            return false;
        }
        let key = pair_key(proxy_a, proxy_b);
        if self.contact_map.contains_key(&key) {
            return false;
        }
        if !self.should_collide(fixture_a, fixture_b) {
            return false;
        }

        let contact = Contact::new(
            proxy_a,
            body_a,
            proxy_b,
            body_b,
            super::contact::mix_friction(fixture_a.friction, fixture_b.friction),
            super::contact::mix_restitution(fixture_a.restitution, fixture_b.restitution),
        );
        let id = self.contacts.insert(contact);
        self.contact_map.insert(key, id);
        for body in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.contacts.push(id);
            }
        }
        true
    }

    /// Pair every proxy buffered in the broad phase. Returns the number of
    /// contacts created.
    pub(crate) fn find_new_contacts(&mut self) -> u32 {
        let mut pairs = Vec::new();
        self.broad_phase.update_pairs(|a, b| {
            pairs.push((a, b));
            true
        });
        let mut added = 0;
        for (a, b) in pairs {
            if self.add_pair(a, b) {
                added += 1;
            }
        }
        added
    }

    /// Destroy a contact, reporting `end_contact` first if it was touching.
    pub(crate) fn destroy_contact(&mut self, id: ContactId) {
        if self.contacts.get(id).is_some_and(|c| c.touching) {
            self.notify(|listener, world| listener.end_contact(world, id));
        }
        let Some(contact) = self.contacts.remove(id) else {
            return;
        };
        self.contact_map
            .remove(&pair_key(contact.proxy_a, contact.proxy_b));
        for body in [contact.body_a, contact.body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.contacts.retain(|c| *c != id);
            }
        }
    }

    /// Refresh a contact's manifold at the bodies' current transforms and
    /// report begin, end and pre-solve events.
    pub(crate) fn update_contact(&mut self, id: ContactId) {
        let Some(contact) = self.contacts.get_mut(id) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) = (
            self.fixtures.get(contact.proxy_a.fixture),
            self.fixtures.get(contact.proxy_b.fixture),
        ) else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (
            self.bodies.get(contact.body_a),
            self.bodies.get(contact.body_b),
        ) else {
            return;
        };
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        let update = contact.update(
            &fixture_a.shape,
            &body_a.xf,
            &fixture_b.shape,
            &body_b.xf,
            sensor,
        );
        let (a, b) = (contact.body_a, contact.body_b);

        if update.was_touching != update.touching {
            for body in [a, b] {
                if let Some(body) = self.bodies.get_mut(body) {
                    body.set_awake(true);
                }
            }
        }
        if update.began() {
            self.notify(|listener, world| listener.begin_contact(world, id));
        }
        if update.ended() {
            self.notify(|listener, world| listener.end_contact(world, id));
        }
        if !update.sensor && update.touching {
            let old_manifold = update.old_manifold;
            self.notify(|listener, world| listener.pre_solve(world, id, &old_manifold));
        }
    }

    /// Run a listener callback with the world locked.
    pub(crate) fn notify(&mut self, f: impl FnOnce(&mut dyn ContactListener, &mut World)) {
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        let was_locked = std::mem::replace(&mut self.locked, true);
        f(listener.as_mut(), self);
        self.locked = was_locked;
        // A callback may have installed a replacement.
        if self.listener.is_none() {
            self.listener = Some(listener);
        }
    }

    /// Move the world origin. Every position is reduced by `new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2) -> Result<()> {
        self.check_unlocked("shift origin")?;
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.constraint_mut().shift_origin(new_origin);
        }
        self.broad_phase.shift_origin(new_origin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::physics::collider::{DiskShape, PolygonShape};
    use crate::physics::joint::{DistanceJointConf, GearJointConf, JointKind, RevoluteJointConf};

    fn dense() -> FixtureConf {
        FixtureConf {
            density: 1.0,
            ..FixtureConf::default()
        }
    }

    fn box_body(world: &mut World, conf: BodyConf) -> (BodyId, FixtureId) {
        let body = world.create_body(&conf).unwrap();
        let fixture = world
            .create_fixture(body, PolygonShape::new_box(0.5, 0.5).unwrap(), &dense())
            .unwrap();
        (body, fixture)
    }

    /// Static ground box with a block resting on it and one off to the side.
    fn ground_and_two_blocks(world: &mut World) -> (BodyId, FixtureId, BodyId, BodyId) {
        let (ground, ground_fixture) = box_body(world, BodyConf::default());
        let (a, _) = box_body(world, BodyConf::dynamic().with_position(Vec2::new(0.0, 0.9)));
        let (b, _) = box_body(world, BodyConf::dynamic().with_position(Vec2::new(3.0, 0.0)));
        (ground, ground_fixture, a, b)
    }

    fn hinge(world: &mut World, a: BodyId, b: BodyId, anchor: Vec2) -> JointId {
        let conf = RevoluteJointConf::at_anchor(world, a, b, anchor).unwrap();
        world.create_joint(conf).unwrap()
    }

    #[test]
    fn test_fixture_sets_mass_and_proxies() {
        let mut world = World::default();
        let (body, _) = box_body(&mut world, BodyConf::dynamic());
        let b = world.body(body).unwrap();
        assert!((b.mass() - 1.0).abs() < 1e-5, "1x1 box of density 1: {}", b.mass());
        assert_eq!(world.proxy_count(), 1);
        assert_eq!(world.fixture_count(), 1);
    }

    #[test]
    fn test_vertex_radius_out_of_range_is_rejected() {
        let mut world = World::default();
        let body = world.create_body(&BodyConf::dynamic()).unwrap();
        let err = world
            .create_fixture(body, DiskShape::new(0.001), &FixtureConf::default())
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidArgument(_)));
        let err = world
            .create_fixture(body, DiskShape::new(1000.0), &FixtureConf::default())
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidArgument(_)));
        assert_eq!(world.fixture_count(), 0);
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let mut world = World::default();
        assert_eq!(
            world.body(BodyId::new(7, 0)).unwrap_err(),
            PhysicsError::InvalidId {
                entity: "body",
                index: 7,
                generation: 0,
            }
        );
        assert!(world.destroy_body(BodyId::new(0, 0)).is_err());
        assert!(world.destroy_joint(JointId::new(3, 0)).is_err());
        assert!(world.destroy_fixture(FixtureId::new(1, 0)).is_err());
    }

    #[test]
    fn test_mutations_fail_while_locked() {
        let mut world = World::default();
        let body = world.create_body(&BodyConf::dynamic()).unwrap();
        world.locked = true;
        assert_eq!(
            world.create_body(&BodyConf::dynamic()).unwrap_err(),
            PhysicsError::WrongState {
                operation: "create body"
            }
        );
        assert!(matches!(
            world.destroy_body(body),
            Err(PhysicsError::WrongState { .. })
        ));
        assert!(matches!(
            world.create_fixture(body, DiskShape::new(0.5), &FixtureConf::default()),
            Err(PhysicsError::WrongState { .. })
        ));
        assert!(matches!(
            world.shift_origin(Vec2::ONE),
            Err(PhysicsError::WrongState { .. })
        ));
        world.locked = false;
        assert!(world.destroy_body(body).is_ok());
    }

    #[test]
    fn test_overlapping_fixtures_get_one_contact() {
        let mut world = World::default();
        let (ground, _) = box_body(&mut world, BodyConf::default());
        box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(0.0, 0.9)));
        box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(5.0, 0.0)));

        assert_eq!(world.find_new_contacts(), 1);
        assert_eq!(world.find_new_contacts(), 0, "pairs are only reported once");
        let (_, contact) = world.contacts().next().unwrap();
        assert!(contact.involves(ground));
        assert_eq!(world.body(ground).unwrap().contacts().len(), 1);
    }

    #[test]
    fn test_static_pairs_get_no_contact() {
        let mut world = World::default();
        box_body(&mut world, BodyConf::default());
        box_body(&mut world, BodyConf::kinematic().with_position(Vec2::new(0.0, 0.5)));
        assert_eq!(world.find_new_contacts(), 0);
    }

    #[test]
    fn test_filter_rejects_pair() {
        let mut world = World::default();
        let (_, fa) = box_body(&mut world, BodyConf::dynamic());
        let (_, fb) = box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(0.5, 0.0)));
        let group = Filter {
            group_index: -1,
            ..Filter::default()
        };
        world.set_filter(fa, group).unwrap();
        world.set_filter(fb, group).unwrap();
        assert_eq!(world.find_new_contacts(), 0);

        world.set_filter(fb, Filter::default()).unwrap();
        assert_eq!(world.find_new_contacts(), 1, "touched proxies should be re-paired");
    }

    #[test]
    fn test_joint_disables_collision_between_its_bodies() {
        let mut world = World::default();
        let (a, _) = box_body(&mut world, BodyConf::dynamic());
        let (b, _) = box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(0.5, 0.0)));
        let joint = hinge(&mut world, a, b, Vec2::new(0.25, 0.0));
        assert_eq!(world.find_new_contacts(), 0);
        assert_eq!(world.body(a).unwrap().joints(), &[joint]);

        world.destroy_joint(joint).unwrap();
        assert!(world.body(a).unwrap().joints().is_empty());
        assert_eq!(world.find_new_contacts(), 1);
    }

    #[test]
    fn test_joint_needs_two_bodies() {
        let mut world = World::default();
        let a = world.create_body(&BodyConf::dynamic()).unwrap();
        let err = world
            .create_joint(RevoluteJointConf::new(a, a))
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidArgument(_)));
        let err = world
            .create_joint(RevoluteJointConf::new(a, BodyId::new(9, 0)))
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidId { .. }));
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn test_destroy_body_cascades() {
        let mut world = World::default();
        let (ground, _, a, b) = ground_and_two_blocks(&mut world);
        let j1 = hinge(&mut world, ground, a, Vec2::ZERO);
        let j2 = hinge(&mut world, ground, b, Vec2::new(3.0, 0.0));
        world.create_joint(GearJointConf::new(j1, j2)).unwrap();
        let mut conf = RevoluteJointConf::at_anchor(&world, a, b, Vec2::new(1.0, 0.0)).unwrap();
        conf.collide_connected = true;
        world.create_joint(conf).unwrap();
        world.find_new_contacts();
        assert_eq!(world.joint_count(), 4);

        world.destroy_body(ground).unwrap();
        assert_eq!(world.joint_count(), 1, "ground joints and the gear on them should go");
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.body_count(), 2);
        assert_eq!(world.proxy_count(), 2);
        assert!(world.body(a).unwrap().joints().len() == 1);
    }

    #[test]
    fn test_destroying_a_touching_contact_reports_end() {
        struct Ends(Rc<RefCell<u32>>);
        impl ContactListener for Ends {
            fn end_contact(&mut self, world: &mut World, _contact: ContactId) {
                assert!(world.is_locked(), "listeners run with the world locked");
                *self.0.borrow_mut() += 1;
            }
        }

        let mut world = World::default();
        let ends = Rc::new(RefCell::new(0));
        world.set_contact_listener(Ends(ends.clone()));
        box_body(&mut world, BodyConf::default());
        let (block, fixture) = box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(0.0, 0.9)));
        world.find_new_contacts();
        let (id, _) = world.contacts().next().unwrap();
        world.update_contact(id);
        assert!(world.contact(id).unwrap().is_touching());

        world.destroy_fixture(fixture).unwrap();
        assert_eq!(*ends.borrow(), 1);
        assert!(!world.is_locked());
        assert!(world.body(block).unwrap().contacts().is_empty());
    }

    #[test]
    fn test_disable_removes_proxies_and_contacts() {
        let mut world = World::default();
        box_body(&mut world, BodyConf::default());
        let (block, _) = box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(0.0, 0.9)));
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 1);

        world.set_enabled(block, false).unwrap();
        assert_eq!(world.proxy_count(), 1);
        assert_eq!(world.contact_count(), 0);

        world.set_enabled(block, true).unwrap();
        assert_eq!(world.proxy_count(), 2);
        assert_eq!(world.find_new_contacts(), 1);
    }

    #[test]
    fn test_set_type_to_static_stops_body() {
        let mut world = World::default();
        let (body, _) = box_body(
            &mut world,
            BodyConf::dynamic().with_velocity(Vec2::new(1.0, 0.0), 1.0),
        );
        world.set_type(body, BodyType::Static).unwrap();
        let b = world.body(body).unwrap();
        assert_eq!(b.mass(), 0.0);
        assert_eq!(b.linear_velocity(), Vec2::ZERO);
        assert!(!b.is_awake());
    }

    #[test]
    fn test_query_aabb_finds_fixture_children() {
        let mut world = World::default();
        let (_, near) = box_body(&mut world, BodyConf::default());
        box_body(&mut world, BodyConf::default().with_position(Vec2::new(10.0, 0.0)));
        let mut found = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::splat(-1.0), Vec2::splat(1.0)), |f, child| {
            found.push((f, child));
            true
        });
        assert_eq!(found, vec![(near, 0)]);
    }

    #[test]
    fn test_shift_origin_moves_bodies_and_proxies() {
        let mut world = World::default();
        let (body, fixture) = box_body(&mut world, BodyConf::dynamic().with_position(Vec2::new(10.0, 5.0)));
        world.shift_origin(Vec2::new(10.0, 0.0)).unwrap();
        let b = world.body(body).unwrap();
        assert!((b.position() - Vec2::new(0.0, 5.0)).length() < 1e-6);
        assert!((b.world_center() - Vec2::new(0.0, 5.0)).length() < 1e-6);
        let proxy = world.fixture(fixture).unwrap().proxies()[0];
        let fat = world.broad_phase.fat_aabb(proxy);
        assert!(fat.contains(&Aabb::new(Vec2::new(-0.5, 4.5), Vec2::new(0.5, 5.5))));
    }

    #[test]
    fn test_set_transform_moves_proxy() {
        let mut world = World::default();
        let (body, fixture) = box_body(&mut world, BodyConf::dynamic());
        world.set_transform(body, Vec2::new(20.0, 0.0), 0.0).unwrap();
        let proxy = world.fixture(fixture).unwrap().proxies()[0];
        assert!(world.broad_phase.fat_aabb(proxy).center().x > 19.0);
    }

    #[test]
    fn test_stale_handles_do_not_alias_reused_slots() {
        let mut world = World::default();
        let (ground, _, a, b) = ground_and_two_blocks(&mut world);
        let old = hinge(&mut world, ground, a, Vec2::ZERO);
        world.destroy_body(a).unwrap();

        let rope = world.create_joint(DistanceJointConf::new(ground, b)).unwrap();
        assert_eq!(rope.index(), old.index(), "the slot is reused");
        assert!(matches!(
            world.joint(old),
            Err(PhysicsError::InvalidId { entity: "joint", .. })
        ));
        assert!(world.destroy_joint(old).is_err());
        assert_eq!(world.joint(rope).unwrap().kind(), JointKind::Distance);

        let (c, _) = box_body(&mut world, BodyConf::dynamic());
        assert_eq!(c.index(), a.index());
        assert!(world.body(a).is_err());
        assert!(world.body(c).is_ok());
    }

    #[test]
    fn test_destruction_listener_hears_implicit_removals() {
        #[derive(Default)]
        struct Goodbyes {
            joints: Vec<JointId>,
            fixtures: Vec<FixtureId>,
        }
        struct Recorder(Rc<RefCell<Goodbyes>>);
        impl DestructionListener for Recorder {
            fn joint_destroyed(&mut self, joint: JointId) {
                self.0.borrow_mut().joints.push(joint);
            }
            fn fixture_destroyed(&mut self, fixture: FixtureId) {
                self.0.borrow_mut().fixtures.push(fixture);
            }
        }

        let mut world = World::default();
        let goodbyes = Rc::new(RefCell::new(Goodbyes::default()));
        world.set_destruction_listener(Recorder(goodbyes.clone()));
        let (ground, ground_fixture, a, b) = ground_and_two_blocks(&mut world);
        let j1 = hinge(&mut world, ground, a, Vec2::ZERO);
        let j2 = hinge(&mut world, ground, b, Vec2::new(3.0, 0.0));
        let gear = world.create_joint(GearJointConf::new(j1, j2)).unwrap();
        let rope = world.create_joint(DistanceJointConf::new(a, b)).unwrap();

        world.destroy_joint(j2).unwrap();
        assert_eq!(goodbyes.borrow().joints, vec![gear], "explicit destruction is not reported");

        world.destroy_body(ground).unwrap();
        assert_eq!(goodbyes.borrow().joints, vec![gear, j1]);
        assert_eq!(goodbyes.borrow().fixtures, vec![ground_fixture]);
        assert!(world.joint(rope).is_ok());
    }
}
