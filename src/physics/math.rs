//! 2D math helpers layered on top of `glam`.
//!
//! `glam` supplies the vector and matrix types. This module adds the rigid
//! transform, the motion sweep used for continuous collision and the
//! scalar/vector cross products that 2D constraint code leans on.

use std::f32::consts::TAU;

use glam::{Mat2, Mat3, Vec2, Vec3};

/// 2D cross product of two vectors (a scalar).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// Cross product of a vector and a scalar: `(s * v.y, -s * v.x)`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `(-s * v.y, s * v.x)`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Solve `K * x = b` for a 2x2 matrix, returning zero when `K` is singular.
#[inline]
pub fn solve22(k: Mat2, b: Vec2) -> Vec2 {
    let det = k.determinant();
    if det == 0.0 {
        return Vec2::ZERO;
    }
    let inv_det = 1.0 / det;
    let (a11, a21) = (k.x_axis.x, k.x_axis.y);
    let (a12, a22) = (k.y_axis.x, k.y_axis.y);
    Vec2::new(
        inv_det * (a22 * b.x - a12 * b.y),
        inv_det * (a11 * b.y - a21 * b.x),
    )
}

/// Inverse of a 2x2 matrix, or zero when singular.
#[inline]
pub fn inverse22(k: Mat2) -> Mat2 {
    let det = k.determinant();
    if det == 0.0 {
        return Mat2::ZERO;
    }
    k.inverse()
}

/// Solve `K * x = b` for a 3x3 matrix, returning zero when `K` is singular.
pub fn solve33(k: Mat3, b: Vec3) -> Vec3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(ey.cross(ez)),
        det * ex.dot(b.cross(ez)),
        det * ex.dot(ey.cross(b)),
    )
}

/// Solve only the upper-left 2x2 block of a 3x3 matrix.
pub fn solve33_22(k: Mat3, b: Vec2) -> Vec2 {
    let k2 = Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate());
    solve22(k2, b)
}

/// Inverse of the upper-left 2x2 block, embedded in a 3x3 matrix with a zero
/// third row and column.
pub fn inverse22_of33(k: Mat3) -> Mat3 {
    let inv = inverse22(Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate()));
    Mat3::from_cols(
        inv.x_axis.extend(0.0),
        inv.y_axis.extend(0.0),
        Vec3::ZERO,
    )
}

/// Symmetric inverse of a 3x3 matrix, or zero when singular.
pub fn sym_inverse33(k: Mat3) -> Mat3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    let (a11, a12, a13) = (ex.x, ey.x, ez.x);
    let (a22, a23) = (ey.y, ez.y);
    let a33 = ez.z;

    let m_ex = Vec3::new(
        det * (a22 * a33 - a23 * a23),
        det * (a13 * a23 - a12 * a33),
        det * (a12 * a23 - a13 * a22),
    );
    let m_ey = Vec3::new(m_ex.y, det * (a11 * a33 - a13 * a13), det * (a13 * a12 - a11 * a23));
    let m_ez = Vec3::new(m_ex.z, m_ey.z, det * (a11 * a22 - a12 * a12));
    Mat3::from_cols(m_ex, m_ey, m_ez)
}

/// Multiply only the upper-left 2x2 block of a 3x3 matrix by a vector.
#[inline]
pub fn mul33_22(k: Mat3, v: Vec2) -> Vec2 {
    Vec2::new(
        k.x_axis.x * v.x + k.y_axis.x * v.y,
        k.x_axis.y * v.x + k.y_axis.y * v.y,
    )
}

/// A rotation stored as sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    pub sin: f32,
    pub cos: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { sin: 0.0, cos: 1.0 };

    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { sin, cos }
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.sin.atan2(self.cos)
    }

    /// Rotate a vector.
    #[inline]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    /// Rotate a vector by the inverse of this rotation.
    #[inline]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    /// `self * other`.
    #[inline]
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            sin: self.sin * other.cos + self.cos * other.sin,
            cos: self.cos * other.cos - self.sin * other.sin,
        }
    }

    /// `inverse(self) * other`.
    #[inline]
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            sin: self.cos * other.sin - self.sin * other.cos,
            cos: self.cos * other.cos + self.sin * other.sin,
        }
    }
}

/// A rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transformation {
    pub p: Vec2,
    pub q: Rot,
}

impl Transformation {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    #[inline]
    pub fn new(p: Vec2, q: Rot) -> Self {
        Self { p, q }
    }

    #[inline]
    pub fn from_translation(p: Vec2) -> Self {
        Self { p, q: Rot::IDENTITY }
    }

    /// Transform a point from local to world space.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    /// Transform a point from world to local space.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// `inverse(self) * other`.
    #[inline]
    pub fn mul_t(&self, other: &Transformation) -> Transformation {
        Transformation {
            q: self.q.mul_t(other.q),
            p: self.q.inv_rotate(other.p - self.p),
        }
    }
}

/// Position of a body's center of mass and its angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Motion of a body over a time step, used for continuous collision.
///
/// The sweep interpolates the center of mass from `c0` to `c` and the
/// angle from `a0` to `a`. `alpha0` is the fraction of the step already
/// consumed at `c0`/`a0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    pub fn transform_at(&self, beta: f32) -> Transformation {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = self.a0 * (1.0 - beta) + self.a * beta;
        let q = Rot::from_angle(angle);
        Transformation {
            p: c - q.rotate(self.local_center),
            q,
        }
    }

    /// Advance the start of the sweep forward to `alpha`.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0, "sweep already at end of step");
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += (self.a - self.a0) * beta;
        self.alpha0 = alpha;
    }

    /// Normalize the angles into `[0, 2pi)` keeping their difference.
    pub fn normalize(&mut self) {
        let d = TAU * (self.a0 / TAU).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_round_trip() {
        let xf = Transformation::new(Vec2::new(1.0, -2.0), Rot::from_angle(0.7));
        let p = Vec2::new(3.0, 4.0);
        let back = xf.apply_inv(xf.apply(p));
        assert!((back - p).length() < 1e-5, "round trip drifted: {:?}", back);
    }

    #[test]
    fn test_sweep_advance_and_transform() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let mid = sweep.transform_at(0.5);
        assert!((mid.p.x - 5.0).abs() < 1e-5);

        sweep.advance(0.5);
        assert!((sweep.c0.x - 5.0).abs() < 1e-5);
        assert!((sweep.a0 - 0.5).abs() < 1e-5);
        assert_eq!(sweep.alpha0, 0.5);
    }

    #[test]
    fn test_solve22_singular_returns_zero() {
        let k = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(solve22(k, Vec2::ONE), Vec2::ZERO);

        let k = Mat2::from_cols(Vec2::new(2.0, 0.0), Vec2::new(0.0, 4.0));
        assert_eq!(solve22(k, Vec2::new(2.0, 2.0)), Vec2::new(1.0, 0.5));
    }

    #[test]
    fn test_solve33_matches_inverse() {
        let k = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.2),
            Vec3::new(0.5, 0.2, 2.0),
        );
        let b = Vec3::new(1.0, 2.0, 3.0);
        let x = solve33(k, b);
        assert!((k * x - b).length() < 1e-4);
        let inv = sym_inverse33(k);
        assert!((inv * b - x).length() < 1e-4);
    }
}
