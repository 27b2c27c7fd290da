//! Sequential impulse contact solver.
//!
//! # Architecture
//!
//! Per island, for each touching contact:
//!
//! 1. Copy the manifold and the warm-start impulses into constraints
//! 2. Compute effective masses and restitution bias from the world manifold
//! 3. Apply the warm-start impulses
//! 4. Iterate velocity constraints (friction first, then normal impulses,
//!    with a 2x2 block solve for two-point manifolds)
//! 5. Push positions apart with a Baumgarte-scaled pseudo impulse
//!
//! Bodies are addressed through [`BodyConstraint`] slots indexed by body id.

use glam::{Mat2, Vec2};

use super::contact::{ContactId, ContactImpulses};
use super::manifold::{Manifold, ManifoldKind, WorldManifold};
use super::math::{cross, cross_sv, cross_vs, Position, Rot, Transformation, Velocity};
use super::settings::{
    ANGULAR_SLOP, BAUMGARTE, LINEAR_SLOP, MAX_ANGULAR_CORRECTION, MAX_LINEAR_CORRECTION,
    MAX_MANIFOLD_POINTS,
};
use super::world::BodyId;

/// Upper bound on the condition number of the two-point block matrix.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

/// Solver-side copy of the body state touched by constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyConstraint {
    pub inv_mass: f32,
    pub inv_i: f32,
    pub local_center: Vec2,
    /// Center of mass position and angle.
    pub position: Position,
    pub velocity: Velocity,
}

impl BodyConstraint {
    /// Transform of the body origin for the current solver position.
    #[inline]
    pub fn transform(&self) -> Transformation {
        let q = Rot::from_angle(self.position.a);
        Transformation::new(self.position.c - q.rotate(self.local_center), q)
    }
}

/// Fetch two body slots at once.
#[inline]
pub(crate) fn pair(bodies: &[BodyConstraint], a: BodyId, b: BodyId) -> (BodyConstraint, BodyConstraint) {
    (bodies[a.index()], bodies[b.index()])
}

/// Tunables for one position-correction pass.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintSolverConf {
    /// Fraction of the error removed per iteration. Default: 0.2.
    pub resolution_rate: f32,
    pub linear_slop: f32,
    pub angular_slop: f32,
    /// Largest linear correction per iteration. Default: 0.2.
    pub max_linear_correction: f32,
    /// Largest angular correction per iteration. Default: 8 degrees.
    pub max_angular_correction: f32,
    /// Contacts count as solved once no separation is below this.
    /// Default: -3 * linear slop.
    pub min_separation: f32,
}

impl Default for ConstraintSolverConf {
    fn default() -> Self {
        Self {
            resolution_rate: BAUMGARTE,
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            max_linear_correction: MAX_LINEAR_CORRECTION,
            max_angular_correction: MAX_ANGULAR_CORRECTION,
            min_separation: -3.0 * LINEAR_SLOP,
        }
    }
}

/// Per-step quantities shared by every constraint.
#[derive(Debug, Clone, Copy)]
pub struct SolverStep {
    pub dt: f32,
    pub inv_dt: f32,
    /// `dt * inv_dt0`, scales warm-start impulses after a change in `dt`.
    pub dt_ratio: f32,
    pub do_warm_start: bool,
    /// Relative normal speed above which restitution applies.
    pub velocity_threshold: f32,
}

/// Everything the solver needs to know about one contact.
#[derive(Debug, Clone, Copy)]
pub struct ContactSolverDef {
    pub contact: ContactId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub manifold: Manifold,
    pub radius_a: f32,
    pub radius_b: f32,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy)]
struct VelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    body_a: BodyId,
    body_b: BodyId,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct PositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    kind: ManifoldKind,
    body_a: BodyId,
    body_b: BodyId,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

/// Contact constraints for one island.
#[derive(Debug, Default)]
pub struct ContactSolver {
    defs: Vec<ContactSolverDef>,
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Build constraints, seeding accumulated impulses from the manifolds
    /// when warm starting.
    pub fn new(step: &SolverStep, defs: Vec<ContactSolverDef>, bodies: &[BodyConstraint]) -> Self {
        let mut velocity_constraints = Vec::with_capacity(defs.len());
        let mut position_constraints = Vec::with_capacity(defs.len());

        for def in &defs {
            let manifold = &def.manifold;
            let point_count = manifold.point_count();
            debug_assert!(point_count > 0, "solving a contact without points");
            let (a, b) = pair(bodies, def.body_a, def.body_b);

            let mut vc = VelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                body_a: def.body_a,
                body_b: def.body_b,
                inv_mass_a: a.inv_mass,
                inv_mass_b: b.inv_mass,
                inv_i_a: a.inv_i,
                inv_i_b: b.inv_i,
                friction: def.friction,
                restitution: def.restitution,
                tangent_speed: def.tangent_speed,
                point_count,
            };
            let mut pc = PositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                kind: manifold.kind,
                body_a: def.body_a,
                body_b: def.body_b,
                radius_a: def.radius_a,
                radius_b: def.radius_b,
                point_count,
            };

            for (j, mp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.do_warm_start {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
                pc.local_points[j] = mp.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            defs,
            velocity_constraints,
            position_constraints,
        }
    }

    pub fn len(&self) -> usize {
        self.velocity_constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocity_constraints.is_empty()
    }

    /// Anchors, effective masses and restitution bias for the current positions.
    pub fn initialize_velocity_constraints(&mut self, step: &SolverStep, bodies: &[BodyConstraint]) {
        for (vc, def) in self.velocity_constraints.iter_mut().zip(&self.defs) {
            let (a, b) = pair(bodies, vc.body_a, vc.body_b);
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let wm = WorldManifold::new(
                &def.manifold,
                &a.transform(),
                def.radius_a,
                &b.transform(),
                def.radius_b,
            );
            vc.normal = wm.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for (j, vcp) in vc.points[..vc.point_count].iter_mut().enumerate() {
                vcp.r_a = wm.points[j] - a.position.c;
                vcp.r_b = wm.points[j] - b.position.c;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Velocity bias for restitution.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    b.velocity.v + cross_sv(b.velocity.w, vcp.r_b)
                        - a.velocity.v
                        - cross_sv(a.velocity.w, vcp.r_a),
                );
                if v_rel < -step.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 {
                let p1 = vc.points[0];
                let p2 = vc.points[1];
                let rn1_a = cross(p1.r_a, vc.normal);
                let rn1_b = cross(p1.r_b, vc.normal);
                let rn2_a = cross(p2.r_a, vc.normal);
                let rn2_b = cross(p2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // The points are redundant; drop to a single point.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub fn warm_start(&self, bodies: &mut [BodyConstraint]) {
        for vc in &self.velocity_constraints {
            let tangent = cross_vs(vc.normal, 1.0);
            let mut a = bodies[vc.body_a.index()].velocity;
            let mut b = bodies[vc.body_b.index()].velocity;
            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * vc.normal + vcp.tangent_impulse * tangent;
                a.w -= vc.inv_i_a * cross(vcp.r_a, p);
                a.v -= vc.inv_mass_a * p;
                b.w += vc.inv_i_b * cross(vcp.r_b, p);
                b.v += vc.inv_mass_b * p;
            }
            bodies[vc.body_a.index()].velocity = a;
            bodies[vc.body_b.index()].velocity = b;
        }
    }

    /// One velocity iteration. Returns the largest incremental impulse applied.
    pub fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint]) -> f32 {
        let mut max_incremental = 0.0f32;
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let mut a = bodies[vc.body_a.index()].velocity;
            let mut b = bodies[vc.body_b.index()].velocity;
            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);

            // Friction first; non-penetration matters more.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = b.v + cross_sv(b.w, vcp.r_b) - a.v - cross_sv(a.w, vcp.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * (-vt);

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;
                max_incremental = max_incremental.max(lambda.abs());

                let p = lambda * tangent;
                a.v -= m_a * p;
                a.w -= i_a * cross(vcp.r_a, p);
                b.v += m_b * p;
                b.w += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = b.v + cross_sv(b.w, vcp.r_b) - a.v - cross_sv(a.w, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;
                max_incremental = max_incremental.max(lambda.abs());

                let p = lambda * normal;
                a.v -= m_a * p;
                a.w -= i_a * cross(vcp.r_a, p);
                b.v += m_b * p;
                b.w += i_b * cross(vcp.r_b, p);
            } else {
                let incremental = solve_block(vc, &mut a, &mut b);
                max_incremental = max_incremental.max(incremental);
            }

            bodies[vc.body_a.index()].velocity = a;
            bodies[vc.body_b.index()].velocity = b;
        }
        max_incremental
    }

    /// Accumulated impulses per contact, for writing back into the manifolds.
    pub fn impulses(&self) -> impl Iterator<Item = (ContactId, ContactImpulses)> + '_ {
        self.velocity_constraints
            .iter()
            .zip(&self.defs)
            .map(|(vc, def)| {
                let mut out = ContactImpulses {
                    count: def.manifold.point_count(),
                    ..ContactImpulses::default()
                };
                for j in 0..out.count {
                    out.normal[j] = vc.points[j].normal_impulse;
                    out.tangent[j] = vc.points[j].tangent_impulse;
                }
                (def.contact, out)
            })
    }

    /// One position iteration. Returns the smallest separation seen.
    pub fn solve_position_constraints(
        &self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
    ) -> f32 {
        self.solve_positions(bodies, conf, None)
    }

    /// Position iteration for a TOI sub-step. Only the two TOI bodies move.
    pub fn solve_toi_position_constraints(
        &self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
        toi_a: BodyId,
        toi_b: BodyId,
    ) -> f32 {
        self.solve_positions(bodies, conf, Some((toi_a, toi_b)))
    }

    fn solve_positions(
        &self,
        bodies: &mut [BodyConstraint],
        conf: &ConstraintSolverConf,
        toi: Option<(BodyId, BodyId)>,
    ) -> f32 {
        let mut min_separation = 0.0f32;

        for pc in &self.position_constraints {
            let a = bodies[pc.body_a.index()];
            let b = bodies[pc.body_b.index()];

            let movable = |id: BodyId| match toi {
                Some((toi_a, toi_b)) => id == toi_a || id == toi_b,
                None => true,
            };
            let (m_a, i_a) = if movable(pc.body_a) {
                (a.inv_mass, a.inv_i)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if movable(pc.body_b) {
                (b.inv_mass, b.inv_i)
            } else {
                (0.0, 0.0)
            };

            let mut pos_a = a.position;
            let mut pos_b = b.position;

            for j in 0..pc.point_count {
                let q_a = Rot::from_angle(pos_a.a);
                let q_b = Rot::from_angle(pos_b.a);
                let xf_a = Transformation::new(pos_a.c - q_a.rotate(a.local_center), q_a);
                let xf_b = Transformation::new(pos_b.c - q_b.rotate(b.local_center), q_b);

                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);
                let r_a = point - pos_a.c;
                let r_b = point - pos_b.c;

                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop.
                let c = (conf.resolution_rate * (separation + conf.linear_slop))
                    .clamp(-conf.max_linear_correction, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };

                let p = impulse * normal;
                pos_a.c -= m_a * p;
                pos_a.a -= i_a * cross(r_a, p);
                pos_b.c += m_b * p;
                pos_b.a += i_b * cross(r_b, p);
            }

            bodies[pc.body_a.index()].position = pos_a;
            bodies[pc.body_b.index()].position = pos_b;
        }

        min_separation
    }
}

/// Block solver for two-point manifolds.
///
/// Solves the linear complementarity problem `vn = A * x + b`, `vn >= 0`,
/// `x >= 0`, `vn_i * x_i = 0` by enumerating the four cases. Returns the
/// largest incremental impulse.
fn solve_block(vc: &mut VelocityConstraint, a: &mut Velocity, b: &mut Velocity) -> f32 {
    let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
    let normal = vc.normal;
    let cp1 = vc.points[0];
    let cp2 = vc.points[1];

    let old = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
    debug_assert!(old.x >= 0.0 && old.y >= 0.0);

    let dv1 = b.v + cross_sv(b.w, cp1.r_b) - a.v - cross_sv(a.w, cp1.r_a);
    let dv2 = b.v + cross_sv(b.w, cp2.r_b) - a.v - cross_sv(a.w, cp2.r_a);
    let vn1 = dv1.dot(normal);
    let vn2 = dv2.dot(normal);

    let mut rhs = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
    rhs -= vc.k * old;

    let k12 = vc.k.x_axis.y;
    let candidates = [
        // Both points active.
        {
            let x = -(vc.normal_mass * rhs);
            (x, x.x >= 0.0 && x.y >= 0.0)
        },
        // Only the first point.
        {
            let x1 = -cp1.normal_mass * rhs.x;
            let vn2 = k12 * x1 + rhs.y;
            (Vec2::new(x1, 0.0), x1 >= 0.0 && vn2 >= 0.0)
        },
        // Only the second point.
        {
            let x2 = -cp2.normal_mass * rhs.y;
            let vn1 = k12 * x2 + rhs.x;
            (Vec2::new(0.0, x2), x2 >= 0.0 && vn1 >= 0.0)
        },
        // Neither point.
        (Vec2::ZERO, rhs.x >= 0.0 && rhs.y >= 0.0),
    ];

    // No solution means the constraint is rare enough to skip this iteration.
    let Some(&(x, _)) = candidates.iter().find(|(_, ok)| *ok) else {
        return 0.0;
    };

    let d = x - old;
    let p1 = d.x * normal;
    let p2 = d.y * normal;
    a.v -= m_a * (p1 + p2);
    a.w -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
    b.v += m_b * (p1 + p2);
    b.w += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));

    vc.points[0].normal_impulse = x.x;
    vc.points[1].normal_impulse = x.y;
    d.x.abs().max(d.y.abs())
}

/// World normal, contact point and separation of manifold point `index` for
/// the given transforms.
fn position_manifold(
    pc: &PositionConstraint,
    xf_a: &Transformation,
    xf_b: &Transformation,
    index: usize,
) -> (Vec2, Vec2, f32) {
    let radii = pc.radius_a + pc.radius_b;
    match pc.kind {
        ManifoldKind::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize_or_zero();
            let point = 0.5 * (point_a + point_b);
            (normal, point, (point_b - point_a).dot(normal) - radii)
        }
        ManifoldKind::FaceA => {
            let normal = xf_a.q.rotate(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            (normal, clip_point, (clip_point - plane_point).dot(normal) - radii)
        }
        ManifoldKind::FaceB => {
            let normal = xf_b.q.rotate(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            // Keep the normal pointing from A to B.
            (-normal, clip_point, (clip_point - plane_point).dot(normal) - radii)
        }
        ManifoldKind::Unset => {
            debug_assert!(false, "position constraint without a manifold");
            (Vec2::ZERO, Vec2::ZERO, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collider::{PolygonShape, Shape};
    use crate::physics::manifold::collide_shapes;

    fn body(inv_mass: f32, inv_i: f32, c: Vec2, v: Vec2) -> BodyConstraint {
        BodyConstraint {
            inv_mass,
            inv_i,
            local_center: Vec2::ZERO,
            position: Position { c, a: 0.0 },
            velocity: Velocity { v, w: 0.0 },
        }
    }

    fn step() -> SolverStep {
        SolverStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            do_warm_start: true,
            velocity_threshold: 1.0,
        }
    }

    fn box_on_ground(
        y: f32,
        v: Vec2,
        restitution: f32,
    ) -> (ContactSolver, Vec<BodyConstraint>) {
        let ground = Shape::from(PolygonShape::new_box(5.0, 0.5).unwrap());
        let block = Shape::from(PolygonShape::new_box(0.5, 0.5).unwrap());
        let xf_b = Transformation::from_translation(Vec2::new(0.0, y));
        let manifold = collide_shapes(
            &ground.child(0).unwrap(),
            &Transformation::IDENTITY,
            &block.child(0).unwrap(),
            &xf_b,
        );
        let bodies = vec![
            body(0.0, 0.0, Vec2::ZERO, Vec2::ZERO),
            body(1.0, 6.0, Vec2::new(0.0, y), v),
        ];
        let def = ContactSolverDef {
            contact: ContactId::new(0, 0),
            body_a: BodyId::new(0, 0),
            body_b: BodyId::new(1, 0),
            manifold,
            radius_a: ground.vertex_radius(),
            radius_b: block.vertex_radius(),
            friction: 0.6,
            restitution,
            tangent_speed: 0.0,
        };
        let solver = ContactSolver::new(&step(), vec![def], &bodies);
        (solver, bodies)
    }

    #[test]
    fn test_normal_impulse_stops_approach() {
        let (mut solver, mut bodies) = box_on_ground(0.99, Vec2::new(0.0, -0.5), 0.0);
        solver.initialize_velocity_constraints(&step(), &bodies);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut bodies);
        }
        let v = bodies[1].velocity.v;
        assert!(v.y.abs() < 1e-4, "Block should stop: vy = {}", v.y);
        let (_, impulses) = solver.impulses().next().unwrap();
        assert_eq!(impulses.count, 2);
        let total: f32 = impulses.normal.iter().sum();
        assert!((total - 0.5).abs() < 1e-3, "impulse should cancel momentum: {}", total);
    }

    #[test]
    fn test_restitution_bounces_fast_impacts() {
        let (mut solver, mut bodies) = box_on_ground(0.99, Vec2::new(0.0, -4.0), 0.5);
        solver.initialize_velocity_constraints(&step(), &bodies);
        for _ in 0..10 {
            solver.solve_velocity_constraints(&mut bodies);
        }
        let vy = bodies[1].velocity.v.y;
        assert!((vy - 2.0).abs() < 1e-2, "Block should bounce at half speed: vy = {}", vy);
    }

    #[test]
    fn test_friction_slows_sliding_block() {
        let (mut solver, mut bodies) = box_on_ground(0.99, Vec2::new(3.0, -0.1), 0.0);
        solver.initialize_velocity_constraints(&step(), &bodies);
        // The first pass has no normal impulse to bound friction with.
        solver.solve_velocity_constraints(&mut bodies);
        assert_eq!(bodies[1].velocity.v.x, 3.0);
        solver.solve_velocity_constraints(&mut bodies);
        let vx = bodies[1].velocity.v.x;
        assert!(vx < 3.0 && vx > 2.9, "friction should slow the block a little: vx = {}", vx);
    }

    #[test]
    fn test_position_correction_separates_overlap() {
        let (solver, mut bodies) = box_on_ground(0.9, Vec2::ZERO, 0.0);
        let conf = ConstraintSolverConf::default();
        let first = solver.solve_position_constraints(&mut bodies, &conf);
        assert!(first < conf.min_separation, "initial overlap should be reported: {}", first);
        let mut last = first;
        for _ in 0..20 {
            last = solver.solve_position_constraints(&mut bodies, &conf);
        }
        assert!(last > first, "separation should improve: {} -> {}", first, last);
        assert!(bodies[1].position.c.y > 0.9, "block should be pushed up");
        assert_eq!(bodies[0].position.c, Vec2::ZERO, "static body must not move");
    }

    #[test]
    fn test_toi_position_solve_moves_only_toi_bodies() {
        let (solver, mut bodies) = box_on_ground(0.9, Vec2::ZERO, 0.0);
        // Give the ground mass; only body 1 is a TOI body.
        bodies[0].inv_mass = 1.0;
        bodies[0].inv_i = 1.0;
        let conf = ConstraintSolverConf {
            resolution_rate: 0.75,
            min_separation: -1.5 * LINEAR_SLOP,
            ..ConstraintSolverConf::default()
        };
        solver.solve_toi_position_constraints(&mut bodies, &conf, BodyId::new(2, 0), BodyId::new(1, 0));
        assert_eq!(bodies[0].position.c, Vec2::ZERO);
        assert!(bodies[1].position.c.y > 0.9);
    }
}
