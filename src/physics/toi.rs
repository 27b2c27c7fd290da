//! Time of impact by conservative advancement.
//!
//! # Architecture
//!
//! 1. Run GJK at the current time `t1` to get the closest features
//! 2. Build a separating axis from those features
//! 3. Push `t2` back until the deepest point along that axis sits at the
//!    target separation, using a mixed bisection/secant root finder
//! 4. Advance `t1` to `t2` and repeat until touching, separated or stuck
//!
//! The target separation keeps shapes slightly overlapped so the regular
//! solver still sees a contact after the sub-step.

use glam::Vec2;
use tracing::warn;

use super::collider::DistanceProxy;
use super::distance::{distance_with, DistanceConf, DistanceState, SimplexCache};
use super::math::{cross_vs, Sweep, Transformation};
use super::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

/// Tunables for [`time_of_impact`].
#[derive(Debug, Clone, Copy)]
pub struct ToiConf {
    /// Upper bound of the sweep interval. Default: 1.
    pub t_max: f32,
    /// Minimum separation below which shapes are never targeted. Default: 0.005.
    pub linear_slop: f32,
    /// Depth the target separation sits below the summed vertex radii.
    /// Default: 3 * linear slop.
    pub target_depth: f32,
    /// Accepted distance from the target. Default: linear slop / 4.
    pub tolerance: f32,
    /// Outer iteration cap. Default: 20.
    pub max_toi_iters: u32,
    /// Root finder iteration cap. Default: 50.
    pub max_root_iters: u32,
    /// GJK iteration cap. Default: 20.
    pub max_dist_iters: u32,
}

impl Default for ToiConf {
    fn default() -> Self {
        Self {
            t_max: 1.0,
            linear_slop: LINEAR_SLOP,
            target_depth: 3.0 * LINEAR_SLOP,
            tolerance: 0.25 * LINEAR_SLOP,
            max_toi_iters: 20,
            max_root_iters: 50,
            max_dist_iters: 20,
        }
    }
}

/// Outcome of a time of impact query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToiState {
    #[default]
    Unknown,
    /// Iteration caps hit or the separation went below target unexpectedly.
    Failed,
    /// Already overlapping at the start of the interval.
    Overlapped,
    /// Within tolerance of the target separation at `t`.
    Touching,
    /// Never within the target separation over the interval.
    Separated,
}

/// Iteration counters of a time of impact query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToiStats {
    pub toi_iters: u32,
    pub max_dist_iters: u32,
    pub max_root_iters: u32,
    pub sum_dist_iters: u32,
    pub sum_root_iters: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Fraction of the sweep interval at which `state` holds.
    pub t: f32,
    pub stats: ToiStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separating axis derived from the GJK simplex, evaluated over the sweeps.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy<'a>,
    proxy_b: &'a DistanceProxy<'a>,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy<'a>,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy<'a>,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        debug_assert!((1..3).contains(&cache.count()), "separation needs one or two pairs");
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);
        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        let p0 = cache.index_pair(0);
        if cache.count() == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(p0.a as usize));
            let point_b = xf_b.apply(proxy_b.vertex(p0.b as usize));
            f.axis = (point_b - point_a).normalize_or_zero();
            return f;
        }

        let p1 = cache.index_pair(1);
        if p0.a == p1.a {
            // Two points on B, one on A.
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(p0.b as usize);
            let b2 = proxy_b.vertex(p1.b as usize);
            f.axis = cross_vs(b2 - b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.rotate(f.axis);
            f.local_point = 0.5 * (b1 + b2);
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(p0.a as usize));
            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A, one or two on B.
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(p0.a as usize);
            let a2 = proxy_a.vertex(p1.a as usize);
            f.axis = cross_vs(a2 - a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.rotate(f.axis);
            f.local_point = 0.5 * (a1 + a2);
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(p0.b as usize));
            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn transforms(&self, t: f32) -> (Transformation, Transformation) {
        (self.sweep_a.transform_at(t), self.sweep_b.transform_at(t))
    }

    /// Deepest points along the axis at `t` and their separation.
    fn find_min_separation(&self, t: f32) -> (usize, usize, f32) {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support_index(xf_a.q.inv_rotate(self.axis));
                let index_b = self.proxy_b.support_index(xf_b.q.inv_rotate(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support_index(xf_b.q.inv_rotate(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support_index(xf_a.q.inv_rotate(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given points along the axis at `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Earliest time in `[0, t_max]` at which two swept proxies come within the
/// target separation.
///
/// The sweeps should share the same `alpha0`.
pub fn time_of_impact(
    proxy_a: &DistanceProxy<'_>,
    sweep_a: Sweep,
    proxy_b: &DistanceProxy<'_>,
    sweep_b: Sweep,
    conf: &ToiConf,
) -> ToiOutput {
    let mut out = ToiOutput {
        state: ToiState::Unknown,
        t: conf.t_max,
        stats: ToiStats::default(),
    };

    let mut sweep_a = sweep_a;
    let mut sweep_b = sweep_b;
    // Large rotations make the root finder hard, so keep angles small.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = conf.t_max;
    let total_radius = proxy_a.vertex_radius() + proxy_b.vertex_radius();
    let target = conf.linear_slop.max(total_radius - conf.target_depth);
    let tolerance = conf.tolerance;
    debug_assert!(target > tolerance, "target separation {target} within tolerance");

    let dist_conf = DistanceConf {
        max_iterations: conf.max_dist_iters,
    };
    let mut t1 = 0.0;
    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let output = distance_with(&dist_conf, &mut cache, proxy_a, &xf_a, proxy_b, &xf_b);
        out.stats.max_dist_iters = out.stats.max_dist_iters.max(output.iterations);
        out.stats.sum_dist_iters += output.iterations;
        if output.state == DistanceState::HitMaxIters {
            warn!(
                iterations = output.iterations,
                "distance iteration cap hit during time of impact"
            );
        }

        let dist = output.core_distance();

        // Cores overlap; no useful time can be computed.
        if dist <= 0.0 || cache.count() == 3 {
            out.state = ToiState::Overlapped;
            out.t = 0.0;
            break;
        }

        if dist < target + tolerance {
            out.state = ToiState::Touching;
            out.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest points along the axis. A polygon may need a
        // push back per vertex before the axis settles.
        let mut done = false;
        let mut t2 = t_max;
        for _ in 0..MAX_POLYGON_VERTICES {
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                out.state = ToiState::Separated;
                out.t = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                // Advance the sweeps.
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // The initial separation can dip below target when the
            // separation function is not convex over the interval.
            if s1 < target - tolerance {
                out.state = ToiState::Failed;
                out.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                // Touching at t1.
                out.state = ToiState::Touching;
                out.t = t1;
                done = true;
                break;
            }

            let mut root_iters = 0;
            let (mut a1, mut a2) = (t1, t2);
            loop {
                // Alternate secant and bisection for guaranteed progress.
                let t = if root_iters & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iters += 1;

                let s = fcn.evaluate(index_a, index_b, t);
                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iters == conf.max_root_iters {
                    warn!(root_iters, t1, t2, "time of impact root finder hit its cap");
                    break;
                }
            }
            out.stats.max_root_iters = out.stats.max_root_iters.max(root_iters);
            out.stats.sum_root_iters += root_iters;
        }

        out.stats.toi_iters += 1;
        if done {
            break;
        }

        if out.stats.toi_iters == conf.max_toi_iters {
            // Root finder got stuck. Semi-victory.
            out.state = ToiState::Failed;
            out.t = t1;
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collider::{DiskShape, PolygonShape, Shape};

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_approaching_disks_touch() {
        let disk = Shape::from(DiskShape::new(0.5));
        let proxy = disk.child(0).unwrap();
        let out = time_of_impact(
            &proxy,
            linear_sweep(Vec2::ZERO, Vec2::ZERO),
            &proxy,
            linear_sweep(Vec2::new(10.0, 0.0), Vec2::new(-10.0, 0.0)),
            &ToiConf::default(),
        );
        assert_eq!(out.state, ToiState::Touching);
        // Core distance 10 - 20t hits the target 1 - 3 * slop.
        let expected = (10.0 - (1.0 - 3.0 * LINEAR_SLOP)) / 20.0;
        assert!((out.t - expected).abs() < 1e-3, "t = {}, expected {}", out.t, expected);
        assert!(out.stats.toi_iters >= 1);
    }

    #[test]
    fn test_receding_disks_stay_separated() {
        let disk = Shape::from(DiskShape::new(0.5));
        let proxy = disk.child(0).unwrap();
        let out = time_of_impact(
            &proxy,
            linear_sweep(Vec2::ZERO, Vec2::ZERO),
            &proxy,
            linear_sweep(Vec2::new(10.0, 0.0), Vec2::new(5.0, 0.0)),
            &ToiConf::default(),
        );
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn test_initial_overlap() {
        let disk = Shape::from(DiskShape::new(0.5));
        let proxy = disk.child(0).unwrap();
        let sweep = linear_sweep(Vec2::ZERO, Vec2::new(1.0, 0.0));
        let out = time_of_impact(&proxy, sweep, &proxy, sweep, &ToiConf::default());
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn test_fast_box_does_not_tunnel_through_wall() {
        let wall = Shape::from(PolygonShape::new_box(0.1, 5.0).unwrap());
        let bullet = Shape::from(PolygonShape::new_box(0.25, 0.25).unwrap());
        let out = time_of_impact(
            &wall.child(0).unwrap(),
            linear_sweep(Vec2::ZERO, Vec2::ZERO),
            &bullet.child(0).unwrap(),
            linear_sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            &ToiConf::default(),
        );
        assert_eq!(out.state, ToiState::Touching);
        // Faces meet when the bullet's center reaches x = -0.35.
        let contact_t = (10.0 - 0.35) / 20.0;
        assert!((out.t - contact_t).abs() < 1e-3, "t = {}", out.t);
    }
}
