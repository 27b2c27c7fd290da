//! GJK distance between two convex distance proxies.
//!
//! # Architecture
//!
//! The solver works in the Minkowski difference `B - A`:
//!
//! 1. Seed the simplex from the [`SimplexCache`] (or vertex 0 of each proxy)
//! 2. Reduce the simplex to the feature closest to the origin
//! 3. Search along the direction from that feature to the origin
//! 4. Add the new support pair, or stop when it is already in the simplex
//!
//! The resulting simplex is written back to the cache so the next query for
//! the same pair starts where this one ended.

use glam::Vec2;

use super::collider::{DistanceProxy, Shape};
use super::math::{cross, cross_sv, cross_vs, Transformation};
use super::settings::MAX_SIMPLEX_VERTICES;

/// Default iteration cap.
pub const DEFAULT_MAX_DISTANCE_ITERS: u32 = 20;

/// Indices of one support vertex on each proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexPair {
    pub a: u8,
    pub b: u8,
}

/// Simplex state carried between distance queries for one shape pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    count: u8,
    indices: [IndexPair; MAX_SIMPLEX_VERTICES],
    metric: f32,
    metric_set: bool,
}

impl SimplexCache {
    /// Number of index pairs held (0 to 3).
    #[inline]
    pub fn count(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub fn index_pair(&self, i: usize) -> IndexPair {
        debug_assert!(i < self.count(), "cache index {i} out of range");
        self.indices[i]
    }

    pub fn index_pairs(&self) -> &[IndexPair] {
        &self.indices[..self.count()]
    }

    /// Length of the segment or signed area of the triangle last cached.
    #[inline]
    pub fn metric(&self) -> f32 {
        self.metric
    }

    #[inline]
    pub fn is_metric_set(&self) -> bool {
        self.metric_set
    }

    /// Forget the cached simplex.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Closest points between the core geometry of two proxies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WitnessPoints {
    pub a: Vec2,
    pub b: Vec2,
}

/// Why the GJK loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceState {
    #[default]
    Unknown,
    /// The simplex grew to a triangle enclosing the origin.
    MaxPoints,
    /// The search direction was too small to trust.
    UnfitSearchDir,
    /// The new support pair was already in the simplex.
    DupIndexPair,
    /// The iteration cap was reached; the witness points are a best effort.
    HitMaxIters,
}

/// Result of [`distance`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceOutput {
    pub witness_points: WitnessPoints,
    /// Number of support point evaluations.
    pub iterations: u32,
    pub state: DistanceState,
}

impl DistanceOutput {
    /// Distance between the core point sets.
    #[inline]
    pub fn core_distance(&self) -> f32 {
        self.witness_points.a.distance(self.witness_points.b)
    }
}

/// Tunables for [`distance_with`].
#[derive(Debug, Clone, Copy)]
pub struct DistanceConf {
    /// Iteration cap. Default: 20.
    pub max_iterations: u32,
}

impl Default for DistanceConf {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_DISTANCE_ITERS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point on A in world space.
    w_a: Vec2,
    /// Support point on B in world space.
    w_b: Vec2,
    /// `w_b - w_a`.
    w: Vec2,
    /// Barycentric coefficient of the closest point.
    a: f32,
    index_a: u8,
    index_b: u8,
}

impl SimplexVertex {
    fn new(
        proxy_a: &DistanceProxy<'_>,
        xf_a: &Transformation,
        index_a: usize,
        proxy_b: &DistanceProxy<'_>,
        xf_b: &Transformation,
        index_b: usize,
    ) -> Self {
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));
        Self {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a: index_a as u8,
            index_b: index_b as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; MAX_SIMPLEX_VERTICES],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy<'_>,
        xf_a: &Transformation,
        proxy_b: &DistanceProxy<'_>,
        xf_b: &Transformation,
    ) -> Self {
        let mut s = Simplex::default();
        for (i, pair) in cache.index_pairs().iter().enumerate() {
            s.v[i] = SimplexVertex::new(
                proxy_a,
                xf_a,
                pair.a as usize,
                proxy_b,
                xf_b,
                pair.b as usize,
            );
        }
        s.count = cache.count();

        // Flush the cache if the simplex changed size or degenerated.
        if s.count > 1 && cache.is_metric_set() {
            let metric1 = cache.metric;
            let metric2 = s.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                s.count = 0;
            }
        }

        if s.count == 0 {
            s.v[0] = SimplexVertex::new(proxy_a, xf_a, 0, proxy_b, xf_b, 0);
            s.count = 1;
        }
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.metric_set = true;
        cache.count = self.count as u8;
        for i in 0..self.count {
            cache.indices[i] = IndexPair {
                a: self.v[i].index_a,
                b: self.v[i].index_b,
            };
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => {
                debug_assert!(false, "search direction for a full simplex");
                Vec2::ZERO
            }
        }
    }

    fn witness_points(&self) -> WitnessPoints {
        match self.count {
            1 => WitnessPoints {
                a: self.v[0].w_a,
                b: self.v[0].w_b,
            },
            2 => WitnessPoints {
                a: self.v[0].a * self.v[0].w_a + self.v[1].a * self.v[1].w_a,
                b: self.v[0].a * self.v[0].w_b + self.v[1].a * self.v[1].w_b,
            },
            3 => {
                let a = self.v[0].a * self.v[0].w_a
                    + self.v[1].a * self.v[1].w_a
                    + self.v[2].a * self.v[2].w_a;
                WitnessPoints { a, b: a }
            }
            _ => {
                debug_assert!(false, "empty simplex");
                WitnessPoints::default()
            }
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, by barycentric regions.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest point on a triangle to the origin. Vertex regions, then edge
    /// regions, then the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in the triangle.
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two proxies with the default iteration cap.
///
/// `cache` seeds the simplex and receives the final one.
pub fn distance(
    cache: &mut SimplexCache,
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> DistanceOutput {
    distance_with(&DistanceConf::default(), cache, proxy_a, xf_a, proxy_b, xf_b)
}

/// Closest points between two proxies.
pub fn distance_with(
    conf: &DistanceConf,
    cache: &mut SimplexCache,
    proxy_a: &DistanceProxy<'_>,
    xf_a: &Transformation,
    proxy_b: &DistanceProxy<'_>,
    xf_b: &Transformation,
) -> DistanceOutput {
    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);
    let mut iterations = 0;
    let mut state = DistanceState::Unknown;

    while iterations < conf.max_iterations {
        // Save the simplex so duplicates can be spotted.
        let save_count = simplex.count;
        let mut saved = [(0u8, 0u8); MAX_SIMPLEX_VERTICES];
        for (slot, v) in saved.iter_mut().zip(&simplex.v[..save_count]) {
            *slot = (v.index_a, v.index_b);
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        if simplex.count == MAX_SIMPLEX_VERTICES {
            state = DistanceState::MaxPoints;
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // The origin is probably on the simplex; the direction is not
            // reliable enough to continue.
            state = DistanceState::UnfitSearchDir;
            break;
        }

        let index_a = proxy_a.support_index(xf_a.q.inv_rotate(-d));
        let index_b = proxy_b.support_index(xf_b.q.inv_rotate(d));
        iterations += 1;

        let candidate = (index_a as u8, index_b as u8);
        if saved[..save_count].contains(&candidate) {
            state = DistanceState::DupIndexPair;
            break;
        }

        simplex.v[simplex.count] =
            SimplexVertex::new(proxy_a, xf_a, index_a, proxy_b, xf_b, index_b);
        simplex.count += 1;
    }

    if state == DistanceState::Unknown {
        state = DistanceState::HitMaxIters;
    }

    simplex.write_cache(cache);

    DistanceOutput {
        witness_points: simplex.witness_points(),
        iterations,
        state,
    }
}

/// Whether two shape children overlap, radii included.
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    xf_a: &Transformation,
    shape_b: &Shape,
    index_b: usize,
    xf_b: &Transformation,
) -> crate::error::Result<bool> {
    let proxy_a = shape_a.child(index_a)?;
    let proxy_b = shape_b.child(index_b)?;
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &proxy_a, xf_a, &proxy_b, xf_b);
    let separation =
        output.core_distance() - proxy_a.vertex_radius() - proxy_b.vertex_radius();
    Ok(separation < 10.0 * f32::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::math::Rot;
    use proptest::prelude::*;

    const EPS: f32 = 1e-5;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < EPS
    }

    #[test]
    fn test_matching_disks() {
        let pos = [Vec2::new(2.0, 2.0)];
        let proxy = DistanceProxy::new(1.0, &pos, &[]);
        let mut cache = SimplexCache::default();
        let out = distance(
            &mut cache,
            &proxy,
            &Transformation::IDENTITY,
            &proxy,
            &Transformation::IDENTITY,
        );
        assert_eq!(out.iterations, 0);
        assert_eq!(out.witness_points.a, pos[0]);
        assert_eq!(out.witness_points.b, pos[0]);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.index_pair(0), IndexPair { a: 0, b: 0 });
        assert_eq!(out.state, DistanceState::UnfitSearchDir);
    }

    #[test]
    fn test_opposing_disks() {
        let pa = [Vec2::new(2.0, 2.0)];
        let pb = [Vec2::new(-2.0, -2.0)];
        let a = DistanceProxy::new(1.0, &pa, &[]);
        let b = DistanceProxy::new(1.0, &pb, &[]);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &a, &Transformation::IDENTITY, &b, &Transformation::IDENTITY);
        assert_eq!(out.iterations, 1);
        assert_eq!(out.witness_points.a, pa[0]);
        assert_eq!(out.witness_points.b, pb[0]);
        assert_eq!(cache.count(), 1);
        assert_eq!(out.state, DistanceState::DupIndexPair);
    }

    #[test]
    fn test_edge_over_disk_center() {
        let edge = [Vec2::new(0.0, 2.0), Vec2::new(4.0, 2.0)];
        let disk = [Vec2::new(2.0, 2.0)];
        let a = DistanceProxy::new(0.1, &edge, &[]);
        let b = DistanceProxy::new(1.0, &disk, &[]);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &a, &Transformation::IDENTITY, &b, &Transformation::IDENTITY);
        assert_eq!(out.iterations, 2);
        assert!(approx(out.witness_points.a, Vec2::new(2.0, 2.0)), "{:?}", out.witness_points);
        assert!(approx(out.witness_points.b, Vec2::new(2.0, 2.0)), "{:?}", out.witness_points);
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.index_pair(0), IndexPair { a: 0, b: 0 });
        assert_eq!(cache.index_pair(1), IndexPair { a: 1, b: 0 });
        assert!((cache.metric() - 4.0).abs() < EPS);
    }

    #[test]
    fn test_square_over_segment() {
        let square = [
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 1.0),
        ];
        let segment = [Vec2::new(-2.0, 0.0), Vec2::new(6.0, 0.0)];
        let a = DistanceProxy::new(0.5, &square, &[]);
        let b = DistanceProxy::new(0.5, &segment, &[]);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &a, &Transformation::IDENTITY, &b, &Transformation::IDENTITY);
        assert!(approx(out.witness_points.a, Vec2::new(1.0, 1.0)), "{:?}", out.witness_points);
        assert!(approx(out.witness_points.b, Vec2::new(1.0, 0.0)), "{:?}", out.witness_points);
        assert_eq!(out.iterations, 2);
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.index_pair(0), IndexPair { a: 0, b: 0 });
        assert_eq!(cache.index_pair(1), IndexPair { a: 0, b: 1 });
        assert!((cache.metric() - 8.0).abs() < EPS);
    }

    #[test]
    fn test_overlapping_squares_fill_the_simplex() {
        let square = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let proxy = DistanceProxy::new(0.0, &square, &[]);
        let xf_b = Transformation::new(Vec2::new(0.5, 0.25), Rot::from_angle(0.3));
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &proxy, &Transformation::IDENTITY, &proxy, &xf_b);
        assert_eq!(out.state, DistanceState::MaxPoints);
        assert_eq!(cache.count(), 3);
        assert!(out.core_distance() < EPS);
    }

    #[test]
    fn test_warm_start_adds_no_vertices() {
        let square = [
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 1.0),
        ];
        let segment = [Vec2::new(-2.0, 0.0), Vec2::new(6.0, 0.0)];
        let a = DistanceProxy::new(0.5, &square, &[]);
        let b = DistanceProxy::new(0.5, &segment, &[]);
        let xf = Transformation::IDENTITY;

        let mut cache = SimplexCache::default();
        let first = distance(&mut cache, &a, &xf, &b, &xf);
        let after_first = cache;
        let second = distance(&mut cache, &a, &xf, &b, &xf);

        assert_eq!(cache, after_first, "cache should be unchanged");
        assert_eq!(second.witness_points, first.witness_points);
        // The only support evaluation is the one confirming convergence.
        assert_eq!(second.iterations, 1);
        assert_eq!(second.state, DistanceState::DupIndexPair);
    }

    #[test]
    fn test_iteration_cap_is_reported_not_fatal() {
        let square = [
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 1.0),
        ];
        let segment = [Vec2::new(-2.0, 0.0), Vec2::new(6.0, 0.0)];
        let a = DistanceProxy::new(0.5, &square, &[]);
        let b = DistanceProxy::new(0.5, &segment, &[]);
        let conf = DistanceConf { max_iterations: 1 };
        let mut cache = SimplexCache::default();
        let out = distance_with(&conf, &mut cache, &a, &Transformation::IDENTITY, &b, &Transformation::IDENTITY);
        assert_eq!(out.iterations, 1);
        assert_eq!(out.state, DistanceState::HitMaxIters);
    }

    fn regular_polygon(n: usize, radius: f32) -> Vec<Vec2> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec2::new(t.cos(), t.sin()) * radius
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric_and_bounded(
            na in 1usize..8, nb in 1usize..8,
            x in -10.0f32..10.0, y in -10.0f32..10.0, angle in -3.0f32..3.0,
        ) {
            let va = regular_polygon(na, 1.0);
            let vb = regular_polygon(nb, 0.7);
            let a = DistanceProxy::new(0.0, &va, &[]);
            let b = DistanceProxy::new(0.0, &vb, &[]);
            let xf_a = Transformation::IDENTITY;
            let xf_b = Transformation::new(Vec2::new(x, y), Rot::from_angle(angle));

            let mut cache_ab = SimplexCache::default();
            let ab = distance(&mut cache_ab, &a, &xf_a, &b, &xf_b);
            let mut cache_ba = SimplexCache::default();
            let ba = distance(&mut cache_ba, &b, &xf_b, &a, &xf_a);

            prop_assert!(ab.iterations <= DEFAULT_MAX_DISTANCE_ITERS);
            prop_assert!(ab.state != DistanceState::HitMaxIters);
            prop_assert!((ab.core_distance() - ba.core_distance()).abs() < 1e-3,
                "ab = {}, ba = {}", ab.core_distance(), ba.core_distance());
            if ab.core_distance() > 1e-2 {
                let (wa, wb) = (ab.witness_points, ba.witness_points);
                prop_assert!(wa.a.distance(wb.b) < 1e-2, "ab = {:?}, ba = {:?}", wa, wb);
                prop_assert!(wa.b.distance(wb.a) < 1e-2, "ab = {:?}, ba = {:?}", wa, wb);
            }
        }
    }
}
