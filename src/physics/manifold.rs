//! Contact manifolds between convex shape children.
//!
//! A manifold stores its geometry in the local frame of one of the two
//! shapes so it stays valid while the bodies move a little. The solver
//! converts it to world space every iteration through [`WorldManifold`].
//!
//! Every proxy is handled as a polygon: a disk is a one-vertex polygon and an
//! edge a two-vertex polygon with two opposite faces. That leaves three
//! cases: two points, a face and a point, two faces (clipped).

use glam::Vec2;

use super::collider::DistanceProxy;
use super::math::{cross_vs, Transformation};
use super::settings::{LINEAR_SLOP, MAX_MANIFOLD_POINTS};

/// Whether a feature index names a vertex or a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Identifies the pair of features that produced a manifold point.
///
/// Used to carry accumulated impulses from one step to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactFeature {
    pub type_a: FeatureType,
    pub index_a: u8,
    pub type_b: FeatureType,
    pub index_b: u8,
}

impl ContactFeature {
    pub const fn new(type_a: FeatureType, index_a: u8, type_b: FeatureType, index_b: u8) -> Self {
        Self {
            type_a,
            index_a,
            type_b,
            index_b,
        }
    }

    /// Same feature seen from the other shape.
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            type_a: self.type_b,
            index_a: self.index_b,
            type_b: self.type_a,
            index_b: self.index_a,
        }
    }
}

/// How to interpret a manifold's local point and normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldKind {
    /// No contact.
    #[default]
    Unset,
    /// Point to point. `local_point` is the vertex on A.
    Circles,
    /// Face of A against B. `local_point` and `local_normal` are in A's frame,
    /// point positions in B's frame.
    FaceA,
    /// Face of B against A. `local_point` and `local_normal` are in B's frame,
    /// point positions in A's frame.
    FaceB,
}

/// A manifold point with its accumulated solver impulses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// Meaning depends on [`ManifoldKind`].
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub feature: ContactFeature,
}

/// Up to two contact points between two convex children.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub kind: ManifoldKind,
    /// Unused for [`ManifoldKind::Circles`].
    pub local_normal: Vec2,
    pub local_point: Vec2,
    points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

impl Manifold {
    fn new(kind: ManifoldKind, local_normal: Vec2, local_point: Vec2) -> Self {
        Self {
            kind,
            local_normal,
            local_point,
            ..Self::default()
        }
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    #[inline]
    pub fn point(&self, index: usize) -> &ManifoldPoint {
        &self.points()[index]
    }

    fn push(&mut self, local_point: Vec2, feature: ContactFeature) {
        debug_assert!(self.point_count < MAX_MANIFOLD_POINTS, "manifold is full");
        self.points[self.point_count] = ManifoldPoint {
            local_point,
            feature,
            ..ManifoldPoint::default()
        };
        self.point_count += 1;
    }

    /// Swap the roles of A and B on a manifold computed with the shapes
    /// exchanged.
    fn flipped(mut self) -> Self {
        self.kind = match self.kind {
            ManifoldKind::FaceA => ManifoldKind::FaceB,
            ManifoldKind::FaceB => ManifoldKind::FaceA,
            other => other,
        };
        for p in self.points_mut() {
            p.feature = p.feature.flipped();
        }
        self
    }
}

/// Compute the manifold between two convex children.
///
/// Proxies with two or more vertices must carry their edge normals.
pub fn collide_shapes(
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> Manifold {
    match (proxy_a.vertex_count(), proxy_b.vertex_count()) {
        (1, 1) => collide_points(proxy_a, xf_a, proxy_b, xf_b),
        (_, 1) => collide_face_point(proxy_a, xf_a, proxy_b, xf_b),
        (1, _) => collide_face_point(proxy_b, xf_b, proxy_a, xf_a).flipped(),
        _ => collide_faces(proxy_a, xf_a, proxy_b, xf_b),
    }
}

fn collide_points(
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> Manifold {
    let local_a = proxy_a.vertex(0);
    let local_b = proxy_b.vertex(0);
    let total_radius = proxy_a.vertex_radius() + proxy_b.vertex_radius();
    if xf_a.apply(local_a).distance_squared(xf_b.apply(local_b)) > total_radius * total_radius {
        return Manifold::default();
    }
    let mut m = Manifold::new(ManifoldKind::Circles, Vec2::ZERO, local_a);
    m.push(
        local_b,
        ContactFeature::new(FeatureType::Vertex, 0, FeatureType::Vertex, 0),
    );
    m
}

/// Polygon A against the single vertex of B.
fn collide_face_point(
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> Manifold {
    let vertices = proxy_a.vertices();
    let normals = proxy_a.normals();
    let count = vertices.len();
    let total_radius = proxy_a.vertex_radius() + proxy_b.vertex_radius();

    let local_b = proxy_b.vertex(0);
    // Vertex of B in A's frame.
    let c_local = xf_a.apply_inv(xf_b.apply(local_b));

    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > total_radius {
            return Manifold::default();
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let i1 = normal_index;
    let i2 = (i1 + 1) % count;
    let v1 = vertices[i1];
    let v2 = vertices[i2];

    if separation < f32::EPSILON {
        // Center inside the polygon core.
        let mut m = Manifold::new(ManifoldKind::FaceA, normals[i1], 0.5 * (v1 + v2));
        m.push(
            local_b,
            ContactFeature::new(FeatureType::Face, i1 as u8, FeatureType::Vertex, 0),
        );
        return m;
    }

    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    let (kind_point, normal, feature) = if u1 <= 0.0 {
        if c_local.distance_squared(v1) > total_radius * total_radius {
            return Manifold::default();
        }
        (
            v1,
            (c_local - v1).normalize_or_zero(),
            ContactFeature::new(FeatureType::Vertex, i1 as u8, FeatureType::Vertex, 0),
        )
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > total_radius * total_radius {
            return Manifold::default();
        }
        (
            v2,
            (c_local - v2).normalize_or_zero(),
            ContactFeature::new(FeatureType::Vertex, i2 as u8, FeatureType::Vertex, 0),
        )
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c_local - face_center).dot(normals[i1]) > total_radius {
            return Manifold::default();
        }
        (
            face_center,
            normals[i1],
            ContactFeature::new(FeatureType::Face, i1 as u8, FeatureType::Vertex, 0),
        )
    };

    let mut m = Manifold::new(ManifoldKind::FaceA, normal, kind_point);
    m.push(local_b, feature);
    m
}

/// Face of `poly1` with the largest separation against `poly2`.
fn find_max_separation(
    poly1: &DistanceProxy<'_>,
    xf1: &Transformation,
    poly2: &DistanceProxy<'_>,
    xf2: &Transformation,
) -> (usize, f32) {
    // Work in poly2's frame.
    let xf = xf2.mul_t(xf1);
    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (&n1, &v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        let n = xf.q.rotate(n1);
        let v1 = xf.apply(v1);
        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

#[derive(Debug, Clone, Copy, Default)]
struct ClipVertex {
    v: Vec2,
    feature: ContactFeature,
}

/// Edge of `poly2` most anti-parallel to face `edge1` of `poly1`, in world space.
fn find_incident_edge(
    poly1: &DistanceProxy<'_>,
    xf1: &Transformation,
    edge1: usize,
    poly2: &DistanceProxy<'_>,
    xf2: &Transformation,
) -> [ClipVertex; 2] {
    let normal1 = xf2.q.inv_rotate(xf1.q.rotate(poly1.normal(edge1)));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertex_count();
    [
        ClipVertex {
            v: xf2.apply(poly2.vertex(i1)),
            feature: ContactFeature::new(FeatureType::Face, edge1 as u8, FeatureType::Vertex, i1 as u8),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertex(i2)),
            feature: ContactFeature::new(FeatureType::Face, edge1 as u8, FeatureType::Vertex, i2 as u8),
        },
    ]
}

/// Sutherland-Hodgman clipping of a segment against the half plane
/// `dot(normal, x) <= offset`.
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let d0 = normal.dot(v_in[0].v) - offset;
    let d1 = normal.dot(v_in[1].v) - offset;

    if d0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if d1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    if d0 * d1 < 0.0 {
        // Points are on opposite sides; the intersection replaces the clipped one.
        let interp = d0 / (d0 - d1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            feature: ContactFeature::new(
                FeatureType::Vertex,
                vertex_index_a as u8,
                FeatureType::Face,
                v_in[0].feature.index_b,
            ),
        };
        count += 1;
    }

    (v_out, count)
}

fn collide_faces(
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> Manifold {
    let total_radius = proxy_a.vertex_radius() + proxy_b.vertex_radius();

    let (edge_a, separation_a) = find_max_separation(proxy_a, xf_a, proxy_b, xf_b);
    if separation_a > total_radius {
        return Manifold::default();
    }
    let (edge_b, separation_b) = find_max_separation(proxy_b, xf_b, proxy_a, xf_a);
    if separation_b > total_radius {
        return Manifold::default();
    }

    // Prefer A's face unless B's is clearly better, so the reference face
    // does not flip back and forth between frames.
    let k_tol = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, kind, flip) = if separation_b > separation_a + k_tol {
        (proxy_b, xf_b, proxy_a, xf_a, edge_b, ManifoldKind::FaceB, true)
    } else {
        (proxy_a, xf_a, proxy_b, xf_b, edge_a, ManifoldKind::FaceA, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertex_count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;
    let v11 = poly1.vertex(iv1);
    let v12 = poly1.vertex(iv2);

    let local_tangent = (v12 - v11).normalize_or_zero();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.rotate(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    let v11 = xf1.apply(v11);
    let v12 = xf1.apply(v12);

    // Face offset and side planes, widened by the rounding radius.
    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip1, n1) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if n1 < 2 {
        return Manifold::default();
    }
    let (clip2, n2) = clip_segment_to_line(&clip1, tangent, side_offset2, iv2);
    if n2 < 2 {
        return Manifold::default();
    }

    let mut m = Manifold::new(kind, local_normal, plane_point);
    for cv in &clip2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            let feature = if flip { cv.feature.flipped() } else { cv.feature };
            m.push(xf2.apply_inv(cv.v), feature);
        }
    }
    m
}

/// Lifecycle of a manifold point between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Compare the features of two manifolds.
///
/// Returns the states of `old`'s points (persist or remove) and of `new`'s
/// points (add or persist).
pub fn get_point_states(
    old: &Manifold,
    new: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in old.points().iter().enumerate() {
        state1[i] = if new.points().iter().any(|q| q.feature == p.feature) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, p) in new.points().iter().enumerate() {
        state2[i] = if old.points().iter().any(|q| q.feature == p.feature) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }
    (state1, state2)
}

/// A manifold evaluated in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Unit normal pointing from A to B.
    pub normal: Vec2,
    /// Midpoints between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [f32; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transformation,
        radius_a: f32,
        xf_b: &Transformation,
        radius_b: f32,
    ) -> Self {
        let mut out = Self {
            point_count: manifold.point_count(),
            ..Self::default()
        };
        match manifold.kind {
            ManifoldKind::Unset => {}
            ManifoldKind::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.point(0).local_point);
                let normal = if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    (point_b - point_a).normalize()
                } else {
                    Vec2::X
                };
                let c_a = point_a + radius_a * normal;
                let c_b = point_b - radius_b * normal;
                out.normal = normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldKind::FaceA => {
                let normal = xf_a.q.rotate(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, p) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.apply(p.local_point);
                    let c_a = clip_point + (radius_a - (clip_point - plane_point).dot(normal)) * normal;
                    let c_b = clip_point - radius_b * normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(normal);
                }
                out.normal = normal;
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.q.rotate(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, p) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.apply(p.local_point);
                    let c_b = clip_point + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Keep the normal pointing from A to B.
                out.normal = -normal;
            }
        }
        out
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.point_count]
    }

    pub fn separations(&self) -> &[f32] {
        &self.separations[..self.point_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collider::{DiskShape, EdgeShape, PolygonShape, Shape};
    use crate::physics::math::Rot;

    fn manifold(a: &Shape, xf_a: &Transformation, b: &Shape, xf_b: &Transformation) -> Manifold {
        collide_shapes(&a.child(0).unwrap(), xf_a, &b.child(0).unwrap(), xf_b)
    }

    fn world(
        m: &Manifold,
        a: &Shape,
        xf_a: &Transformation,
        b: &Shape,
        xf_b: &Transformation,
    ) -> WorldManifold {
        WorldManifold::new(m, xf_a, a.vertex_radius(), xf_b, b.vertex_radius())
    }

    #[test]
    fn test_disks_touching() {
        let disk = Shape::from(DiskShape::new(1.0));
        let xf_a = Transformation::IDENTITY;
        let xf_b = Transformation::from_translation(Vec2::new(1.5, 0.0));
        let m = manifold(&disk, &xf_a, &disk, &xf_b);
        assert_eq!(m.kind, ManifoldKind::Circles);
        assert_eq!(m.point_count(), 1);

        let wm = world(&m, &disk, &xf_a, &disk, &xf_b);
        assert!((wm.normal - Vec2::X).length() < 1e-6);
        assert!((wm.separations()[0] + 0.5).abs() < 1e-5, "sep = {}", wm.separations()[0]);
        assert!((wm.points()[0] - Vec2::new(0.75, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_disks_apart_have_no_points() {
        let disk = Shape::from(DiskShape::new(1.0));
        let m = manifold(
            &disk,
            &Transformation::IDENTITY,
            &disk,
            &Transformation::from_translation(Vec2::new(2.5, 0.0)),
        );
        assert_eq!(m.point_count(), 0);
        assert_eq!(m.kind, ManifoldKind::Unset);
    }

    #[test]
    fn test_box_on_box_face_contact() {
        let ground = Shape::from(PolygonShape::new_box(5.0, 0.5).unwrap());
        let crate_box = Shape::from(PolygonShape::new_box(0.5, 0.5).unwrap());
        let xf_a = Transformation::IDENTITY;
        // Resting slightly overlapped.
        let xf_b = Transformation::from_translation(Vec2::new(0.0, 0.99));
        let m = manifold(&ground, &xf_a, &crate_box, &xf_b);
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.point_count(), 2, "face contact should clip to two points");

        let wm = world(&m, &ground, &xf_a, &crate_box, &xf_b);
        assert!((wm.normal - Vec2::Y).length() < 1e-5, "normal = {:?}", wm.normal);
        for s in wm.separations() {
            // Core overlap of 0.01 plus both polygon radii.
            assert!((s + 0.01 + 0.02).abs() < 1e-4, "separation = {}", s);
        }
    }

    #[test]
    fn test_disk_against_polygon_is_flipped() {
        let disk = Shape::from(DiskShape::new(0.5));
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0).unwrap());
        let xf_a = Transformation::from_translation(Vec2::new(0.0, 1.4));
        let xf_b = Transformation::IDENTITY;
        let m = manifold(&disk, &xf_a, &square, &xf_b);
        assert_eq!(m.kind, ManifoldKind::FaceB);
        assert_eq!(m.point_count(), 1);
        assert_eq!(m.point(0).feature.type_b, FeatureType::Face);

        let wm = world(&m, &disk, &xf_a, &square, &xf_b);
        // Normal points from the disk down into the square.
        assert!((wm.normal + Vec2::Y).length() < 1e-5, "normal = {:?}", wm.normal);
        assert!(wm.separations()[0] < 0.0);
    }

    #[test]
    fn test_disk_near_polygon_corner() {
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0).unwrap());
        let disk = Shape::from(DiskShape::new(0.5));
        let xf_a = Transformation::IDENTITY;
        let xf_b = Transformation::from_translation(Vec2::new(1.3, 1.3));
        let m = manifold(&square, &xf_a, &disk, &xf_b);
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.point(0).feature.type_a, FeatureType::Vertex);
        let wm = world(&m, &square, &xf_a, &disk, &xf_b);
        let diagonal = Vec2::new(1.0, 1.0).normalize();
        assert!((wm.normal - diagonal).length() < 1e-4, "normal = {:?}", wm.normal);
    }

    #[test]
    fn test_box_on_edge() {
        let edge = Shape::from(EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).unwrap());
        let crate_box = Shape::from(PolygonShape::new_box(0.5, 0.5).unwrap());
        let xf_a = Transformation::IDENTITY;
        let xf_b = Transformation::from_translation(Vec2::new(1.0, 0.51));
        let m = manifold(&edge, &xf_a, &crate_box, &xf_b);
        assert_eq!(m.point_count(), 2);
        let wm = world(&m, &edge, &xf_a, &crate_box, &xf_b);
        assert!(wm.normal.y > 0.99, "normal = {:?}", wm.normal);
    }

    #[test]
    fn test_features_persist_without_relative_motion() {
        let ground = Shape::from(PolygonShape::new_box(5.0, 0.5).unwrap());
        let crate_box = Shape::from(PolygonShape::new_box(0.5, 0.5).unwrap());
        let xf_a = Transformation::IDENTITY;
        let xf_b = Transformation::new(Vec2::new(0.3, 0.99), Rot::from_angle(0.01));

        let old = manifold(&ground, &xf_a, &crate_box, &xf_b);
        // The pair moves together, so the relative pose is unchanged.
        let shift = Transformation::new(Vec2::new(2.0, -1.0), Rot::IDENTITY);
        let moved_a = Transformation::new(xf_a.p + shift.p, xf_a.q);
        let moved_b = Transformation::new(xf_b.p + shift.p, xf_b.q);
        let new = manifold(&ground, &moved_a, &crate_box, &moved_b);

        let (s1, s2) = get_point_states(&old, &new);
        assert_eq!(old.point_count(), 2);
        for i in 0..new.point_count() {
            assert_eq!(s1[i], PointState::Persist);
            assert_eq!(s2[i], PointState::Persist);
        }
    }

    #[test]
    fn test_point_states_after_separation() {
        let disk = Shape::from(DiskShape::new(1.0));
        let xf = Transformation::IDENTITY;
        let touching = manifold(&disk, &xf, &disk, &Transformation::from_translation(Vec2::X));
        let apart = manifold(&disk, &xf, &disk, &Transformation::from_translation(Vec2::new(5.0, 0.0)));

        let (s1, s2) = get_point_states(&touching, &apart);
        assert_eq!(s1, [PointState::Remove, PointState::Null]);
        assert_eq!(s2, [PointState::Null, PointState::Null]);

        let (s1, s2) = get_point_states(&apart, &touching);
        assert_eq!(s1, [PointState::Null, PointState::Null]);
        assert_eq!(s2, [PointState::Add, PointState::Null]);
    }
}
