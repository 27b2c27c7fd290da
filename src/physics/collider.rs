//! Collision shapes, their bounding boxes and mass properties.
//!
//! Every shape is a union of convex children. Each child is exposed to the
//! narrow phase as a [`DistanceProxy`]: one vertex for a disk, two for an
//! edge, up to [`MAX_POLYGON_VERTICES`] for a polygon, always with a vertex
//! radius that rounds the core geometry.

use std::f32::consts::PI;

use glam::Vec2;

use crate::error::{PhysicsError, Result};

use super::math::{cross, cross_vs, Transformation};
use super::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y, "inverted AABB");
        Self { min, max }
    }

    /// Box spanning two arbitrary corners.
    #[inline]
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Test whether two AABBs overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Whether `other` lies entirely inside this box.
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    #[inline]
    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn perimeter(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        0.5 * (self.min + self.max)
    }

    /// Grow the box by `margin` on every side.
    #[inline]
    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::splat(margin);
        Aabb {
            min: self.min - r,
            max: self.max + r,
        }
    }

    /// Stretch the box in the direction of `d` only.
    #[inline]
    pub fn displaced(&self, d: Vec2) -> Aabb {
        let mut out = *self;
        if d.x < 0.0 {
            out.min.x += d.x;
        } else {
            out.max.x += d.x;
        }
        if d.y < 0.0 {
            out.min.y += d.y;
        } else {
            out.max.y += d.y;
        }
        out
    }

    #[inline]
    pub fn translated(&self, v: Vec2) -> Aabb {
        Aabb {
            min: self.min + v,
            max: self.max + v,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && self.min.is_finite() && self.max.is_finite()
    }
}

/// Mass properties of a shape relative to the body origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f32,
    /// Centroid relative to the body origin.
    pub center: Vec2,
    /// Rotational inertia about the body origin.
    pub inertia: f32,
}

/// Immutable view over one convex child of a shape.
#[derive(Debug, Clone, Copy)]
pub struct DistanceProxy<'a> {
    vertices: &'a [Vec2],
    normals: &'a [Vec2],
    vertex_radius: f32,
}

impl<'a> DistanceProxy<'a> {
    /// Build a proxy over a convex point set.
    ///
    /// `normals` holds one outward normal per edge (`vertices[i]` to
    /// `vertices[i + 1]`) and may be empty when only distance queries are
    /// needed.
    pub fn new(vertex_radius: f32, vertices: &'a [Vec2], normals: &'a [Vec2]) -> Self {
        debug_assert!(!vertices.is_empty(), "distance proxy needs a vertex");
        debug_assert!(vertex_radius >= 0.0, "negative vertex radius");
        debug_assert!(normals.is_empty() || normals.len() == vertices.len());
        Self {
            vertices,
            normals,
            vertex_radius,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    #[inline]
    pub fn normal(&self, index: usize) -> Vec2 {
        self.normals[index]
    }

    #[inline]
    pub fn vertices(&self) -> &'a [Vec2] {
        self.vertices
    }

    #[inline]
    pub fn normals(&self) -> &'a [Vec2] {
        self.normals
    }

    #[inline]
    pub fn vertex_radius(&self) -> f32 {
        self.vertex_radius
    }

    /// Index of the vertex furthest along `d`. Ties go to the lowest index.
    pub fn support_index(&self, d: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }

    /// Bounding box of the rounded child under `xf`.
    pub fn compute_aabb(&self, xf: &Transformation) -> Aabb {
        let first = xf.apply(self.vertices[0]);
        let (min, max) = self.vertices[1..]
            .iter()
            .map(|v| xf.apply(*v))
            .fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Aabb { min, max }.fattened(self.vertex_radius)
    }
}

/// A solid disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskShape {
    center: [Vec2; 1],
    radius: f32,
}

impl DiskShape {
    pub fn new(radius: f32) -> Self {
        Self::with_center(Vec2::ZERO, radius)
    }

    pub fn with_center(center: Vec2, radius: f32) -> Self {
        Self {
            center: [center],
            radius,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.center[0]
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    fn mass_data(&self, density: f32) -> MassData {
        let r2 = self.radius * self.radius;
        let mass = density * PI * r2;
        let p = self.center[0];
        MassData {
            mass,
            center: p,
            inertia: mass * (0.5 * r2 + p.dot(p)),
        }
    }
}

/// A line segment with rounded ends.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeShape {
    vertices: [Vec2; 2],
    normals: [Vec2; 2],
    vertex_radius: f32,
}

impl EdgeShape {
    pub fn new(v1: Vec2, v2: Vec2) -> Result<Self> {
        Self::with_radius(v1, v2, POLYGON_RADIUS)
    }

    pub fn with_radius(v1: Vec2, v2: Vec2, vertex_radius: f32) -> Result<Self> {
        if v1.distance_squared(v2) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::invalid_argument(format!(
                "edge from {v1} to {v2} is too short"
            )));
        }
        let n = cross_vs(v2 - v1, 1.0).normalize();
        Ok(Self {
            vertices: [v1, v2],
            normals: [n, -n],
            vertex_radius,
        })
    }

    pub fn vertices(&self) -> [Vec2; 2] {
        self.vertices
    }
}

/// A convex polygon with a small rounding radius.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonShape {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    centroid: Vec2,
    vertex_radius: f32,
}

impl PolygonShape {
    /// Build the convex hull of `points`.
    ///
    /// Points closer than half the linear slop are welded. Fails if fewer
    /// than three points survive or the hull is degenerate.
    pub fn new(points: &[Vec2]) -> Result<Self> {
        Self::with_radius(points, POLYGON_RADIUS)
    }

    pub fn with_radius(points: &[Vec2], vertex_radius: f32) -> Result<Self> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::invalid_argument(format!(
                "polygon has {} vertices, at most {MAX_POLYGON_VERTICES} are supported",
                points.len()
            )));
        }

        let weld = 0.5 * LINEAR_SLOP;
        let mut ps: Vec<Vec2> = Vec::with_capacity(points.len());
        for &p in points {
            if !p.is_finite() {
                return Err(PhysicsError::invalid_argument("polygon vertex is not finite"));
            }
            if ps.iter().all(|q| p.distance_squared(*q) >= weld * weld) {
                ps.push(p);
            }
        }
        if ps.len() < 3 {
            return Err(PhysicsError::invalid_argument(
                "polygon needs at least three distinct vertices",
            ));
        }

        let hull = gift_wrap(&ps);
        if hull.len() < 3 {
            return Err(PhysicsError::invalid_argument("polygon vertices are collinear"));
        }

        let vertices: Vec<Vec2> = hull.into_iter().map(|i| ps[i]).collect();
        let count = vertices.len();
        let mut normals = Vec::with_capacity(count);
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return Err(PhysicsError::invalid_argument("polygon has a zero-length edge"));
            }
            normals.push(cross_vs(edge, 1.0).normalize());
        }
        let centroid = polygon_centroid(&vertices);

        Ok(Self {
            vertices,
            normals,
            centroid,
            vertex_radius,
        })
    }

    /// Axis-aligned box with the given half extents centered on the origin.
    pub fn new_box(hx: f32, hy: f32) -> Result<Self> {
        Self::new(&[
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ])
    }

    /// Box with the given half extents placed at `center` and rotated by `angle`.
    pub fn new_oriented_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> Result<Self> {
        let xf = Transformation::new(center, super::math::Rot::from_angle(angle));
        let corners = [
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let points: Vec<Vec2> = corners.iter().map(|c| xf.apply(*c)).collect();
        Self::new(&points)
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    fn mass_data(&self, density: f32) -> MassData {
        const INV3: f32 = 1.0 / 3.0;
        let s = self.vertices[0];
        let count = self.vertices.len();

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;
        for i in 0..count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % count] - s;
            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * INV3 * (e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        center /= area;
        let world_center = center + s;
        // Shift the inertia from the reference vertex to the body origin.
        let inertia = density * inertia + mass * (world_center.dot(world_center) - center.dot(center));
        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }
}

/// A chain of edges, either open or closed into a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    /// For loops the first vertex is repeated at the end.
    vertices: Vec<Vec2>,
    /// Two normals per edge: the outward one and its negation.
    normals: Vec<Vec2>,
    vertex_radius: f32,
    looped: bool,
}

impl ChainShape {
    /// Open chain through `vertices`.
    pub fn new(vertices: &[Vec2]) -> Result<Self> {
        if vertices.len() < 2 {
            return Err(PhysicsError::invalid_argument("chain needs at least two vertices"));
        }
        Self::build(vertices.to_vec(), false)
    }

    /// Closed loop through `vertices`.
    pub fn new_loop(vertices: &[Vec2]) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::invalid_argument("loop needs at least three vertices"));
        }
        let mut closed = vertices.to_vec();
        closed.push(vertices[0]);
        Self::build(closed, true)
    }

    fn build(vertices: Vec<Vec2>, looped: bool) -> Result<Self> {
        let mut normals = Vec::with_capacity(2 * (vertices.len() - 1));
        for w in vertices.windows(2) {
            if w[0].distance_squared(w[1]) <= LINEAR_SLOP * LINEAR_SLOP {
                return Err(PhysicsError::invalid_argument(format!(
                    "chain vertices {} and {} are too close",
                    w[0], w[1]
                )));
            }
            let n = cross_vs(w[1] - w[0], 1.0).normalize();
            normals.push(n);
            normals.push(-n);
        }
        Ok(Self {
            vertices,
            normals,
            vertex_radius: POLYGON_RADIUS,
            looped,
        })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn is_loop(&self) -> bool {
        self.looped
    }

    pub fn edge_count(&self) -> usize {
        self.vertices.len() - 1
    }
}

/// A collision shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Disk(DiskShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl From<DiskShape> for Shape {
    fn from(s: DiskShape) -> Self {
        Shape::Disk(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Shape::Edge(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Shape::Polygon(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Shape::Chain(s)
    }
}

impl Shape {
    /// Number of convex children.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(chain) => chain.edge_count(),
            _ => 1,
        }
    }

    /// Rounding radius shared by all children.
    pub fn vertex_radius(&self) -> f32 {
        match self {
            Shape::Disk(disk) => disk.radius,
            Shape::Edge(edge) => edge.vertex_radius,
            Shape::Polygon(poly) => poly.vertex_radius,
            Shape::Chain(chain) => chain.vertex_radius,
        }
    }

    /// Distance proxy for child `index`.
    pub fn child(&self, index: usize) -> Result<DistanceProxy<'_>> {
        if index >= self.child_count() {
            return Err(PhysicsError::invalid_argument(format!(
                "child index {index} out of range for a shape with {} children",
                self.child_count()
            )));
        }
        Ok(match self {
            Shape::Disk(disk) => DistanceProxy::new(disk.radius, &disk.center, &[]),
            Shape::Edge(edge) => DistanceProxy::new(edge.vertex_radius, &edge.vertices, &edge.normals),
            Shape::Polygon(poly) => DistanceProxy::new(poly.vertex_radius, &poly.vertices, &poly.normals),
            Shape::Chain(chain) => DistanceProxy::new(
                chain.vertex_radius,
                &chain.vertices[index..index + 2],
                &chain.normals[2 * index..2 * index + 2],
            ),
        })
    }

    /// World bounding box of child `index` under `xf`.
    pub fn compute_aabb(&self, xf: &Transformation, index: usize) -> Result<Aabb> {
        Ok(self.child(index)?.compute_aabb(xf))
    }

    /// Mass properties for the given density.
    ///
    /// Edges and chains are massless.
    pub fn mass_data(&self, density: f32) -> MassData {
        match self {
            Shape::Disk(disk) => disk.mass_data(density),
            Shape::Polygon(poly) => poly.mass_data(density),
            Shape::Edge(edge) => MassData {
                center: 0.5 * (edge.vertices[0] + edge.vertices[1]),
                ..MassData::default()
            },
            Shape::Chain(_) => MassData::default(),
        }
    }

    /// Copy of this shape with the vertex radius replaced.
    pub fn with_vertex_radius(mut self, radius: f32) -> Self {
        match &mut self {
            Shape::Disk(disk) => disk.radius = radius,
            Shape::Edge(edge) => edge.vertex_radius = radius,
            Shape::Polygon(poly) => poly.vertex_radius = radius,
            Shape::Chain(chain) => chain.vertex_radius = radius,
        }
        self
    }
}

/// Gift-wrapping convex hull. Returns indices into `ps` in CCW order.
fn gift_wrap(ps: &[Vec2]) -> Vec<usize> {
    let n = ps.len();

    // Right-most point, lowest on ties.
    let mut i0 = 0;
    for i in 1..n {
        let (x, x0) = (ps[i].x, ps[i0].x);
        if x > x0 || (x == x0 && ps[i].y < ps[i0].y) {
            i0 = i;
        }
    }

    let mut hull = Vec::with_capacity(n);
    let mut ih = i0;
    loop {
        hull.push(ih);
        let mut ie = 0;
        for j in 1..n {
            if ie == ih {
                ie = j;
                continue;
            }
            let r = ps[ie] - ps[ih];
            let v = ps[j] - ps[ih];
            let c = cross(r, v);
            if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                ie = j;
            }
        }
        ih = ie;
        if ie == i0 || hull.len() > n {
            break;
        }
    }
    hull
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    const INV3: f32 = 1.0 / 3.0;
    let s = vertices[0];
    let count = vertices.len();
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    for i in 0..count {
        let e1 = vertices[i] - s;
        let e2 = vertices[(i + 1) % count] - s;
        let a = 0.5 * cross(e1, e2);
        area += a;
        c += a * INV3 * (e1 + e2);
    }
    c / area + s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::math::Rot;

    #[test]
    fn test_aabb_overlap_and_contains() {
        let a = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.5, 0.5), Vec2::new(2.0, 2.0));
        let c = Aabb::new(Vec2::new(2.5, 2.5), Vec2::new(3.0, 3.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(a.fattened(0.1).contains(&a));
        assert!(!a.contains(&b));
    }

    #[test]
    fn test_aabb_displaced_stretches_one_side() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let d = a.displaced(Vec2::new(-2.0, 3.0));
        assert_eq!(d.min, Vec2::new(-2.0, 0.0));
        assert_eq!(d.max, Vec2::new(1.0, 4.0));
    }

    #[test]
    fn test_polygon_hull_is_ccw_and_drops_interior_points() {
        let poly = PolygonShape::new(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(0.0, 2.0),
        ])
        .unwrap();
        assert_eq!(poly.vertices().len(), 4, "interior point should be dropped");
        for (i, n) in poly.normals().iter().enumerate() {
            let v = poly.vertices()[i];
            let c = poly.centroid();
            assert!(n.dot(v - c) > 0.0, "normal {} should point outward", i);
        }
    }

    #[test]
    fn test_degenerate_polygons_are_rejected() {
        assert!(PolygonShape::new(&[Vec2::ZERO, Vec2::X]).is_err());
        let collinear = [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(matches!(
            PolygonShape::new(&collinear),
            Err(PhysicsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_box_mass_data() {
        let shape = Shape::from(PolygonShape::new_box(1.0, 0.5).unwrap());
        let md = shape.mass_data(2.0);
        assert!((md.mass - 4.0).abs() < 1e-5, "mass = {}", md.mass);
        assert!(md.center.length() < 1e-5);
        // I = m * (w^2 + h^2) / 12 with w = 2, h = 1
        let expected = 4.0 * (4.0 + 1.0) / 12.0;
        assert!((md.inertia - expected).abs() < 1e-4, "inertia = {}", md.inertia);
    }

    #[test]
    fn test_offset_disk_inertia_uses_parallel_axis() {
        let shape = Shape::from(DiskShape::with_center(Vec2::new(2.0, 0.0), 1.0));
        let md = shape.mass_data(1.0);
        let expected = md.mass * (0.5 + 4.0);
        assert!((md.inertia - expected).abs() < 1e-4);
    }

    #[test]
    fn test_chain_children_and_bad_index() {
        let chain = Shape::from(
            ChainShape::new_loop(&[Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)]).unwrap(),
        );
        assert_eq!(chain.child_count(), 3);
        let last = chain.child(2).unwrap();
        assert_eq!(last.vertex(1), Vec2::ZERO, "loop should close on the first vertex");
        assert!(matches!(chain.child(3), Err(PhysicsError::InvalidArgument(_))));
    }

    #[test]
    fn test_rotated_box_aabb() {
        let shape = Shape::from(PolygonShape::new_box(1.0, 1.0).unwrap()).with_vertex_radius(0.0);
        let xf = Transformation::new(Vec2::new(0.0, 5.0), Rot::from_angle(std::f32::consts::FRAC_PI_4));
        let aabb = shape.compute_aabb(&xf, 0).unwrap();
        let h = std::f32::consts::SQRT_2;
        assert!((aabb.max.x - h).abs() < 1e-5);
        assert!((aabb.min.y - (5.0 - h)).abs() < 1e-5);
    }

    #[test]
    fn test_support_index_prefers_first_on_ties() {
        let verts = [Vec2::new(0.0, 2.0), Vec2::new(4.0, 2.0)];
        let proxy = DistanceProxy::new(0.1, &verts, &[]);
        assert_eq!(proxy.support_index(Vec2::new(0.0, -1.0)), 0);
        assert_eq!(proxy.support_index(Vec2::new(1.0, 0.0)), 1);
    }
}
