//! 3x3 tensor helpers on top of `nalgebra`. Addition, scaling, products, transposes and the vector
//! operations (dot, cross, norm) come straight from `nalgebra`; this module only adds what it
//! lacks: a checked inverse that treats singular tensors as a programming error, integer powers,
//! and rotation constructors.

use crate::math::Mat;
use crate::{Scalar, Vec3};

pub trait TensorExt: Sized {
    /// Inverse by cofactors.
    ///
    /// # Panics
    /// Panics when the determinant is exactly zero. A non-invertible transform is a bug in the
    /// caller, not a data condition.
    fn inv(&self) -> Self;

    /// Integer power. Negative exponents are powers of the inverse and `power(0)` is the identity.
    ///
    /// nalgebra's inherent `Matrix::pow` shadows any trait method called `pow`.
    fn power(&self, n: i32) -> Self;
}

impl TensorExt for Mat {
    fn inv(&self) -> Self {
        let det = self.determinant();
        if det == 0. {
            panic!("Determinant is zero: {:?}", self);
        }

        let t = self;
        Mat::new(
            t[(1, 1)] * t[(2, 2)] - t[(1, 2)] * t[(2, 1)],
            t[(0, 2)] * t[(2, 1)] - t[(0, 1)] * t[(2, 2)],
            t[(0, 1)] * t[(1, 2)] - t[(0, 2)] * t[(1, 1)],
            t[(1, 2)] * t[(2, 0)] - t[(1, 0)] * t[(2, 2)],
            t[(0, 0)] * t[(2, 2)] - t[(0, 2)] * t[(2, 0)],
            t[(0, 2)] * t[(1, 0)] - t[(0, 0)] * t[(1, 2)],
            t[(1, 0)] * t[(2, 1)] - t[(1, 1)] * t[(2, 0)],
            t[(0, 1)] * t[(2, 0)] - t[(0, 0)] * t[(2, 1)],
            t[(0, 0)] * t[(1, 1)] - t[(0, 1)] * t[(1, 0)],
        ) / det
    }

    fn power(&self, n: i32) -> Self {
        let base = if n >= 0 { *self } else { self.inv() };

        (0..n.unsigned_abs()).fold(Mat::identity(), |acc, _| acc * base)
    }
}

/// Rotation by `angle` radians about the x axis.
pub fn so3_x(angle: Scalar) -> Mat {
    let (s, c) = angle.sin_cos();
    Mat::new(1., 0., 0., 0., c, -s, 0., s, c)
}

/// Rotation by `angle` radians about the y axis.
pub fn so3_y(angle: Scalar) -> Mat {
    let (s, c) = angle.sin_cos();
    Mat::new(c, 0., s, 0., 1., 0., -s, 0., c)
}

/// Rotation by `angle` radians about the z axis.
pub fn so3_z(angle: Scalar) -> Mat {
    let (s, c) = angle.sin_cos();
    Mat::new(c, -s, 0., s, c, 0., 0., 0., 1.)
}

/// Composes the three axis rotations as `Rx(angles.x) * Ry(angles.y) * Rz(angles.z)`.
pub fn euler_rotation(angles: Vec3) -> Mat {
    so3_x(angles.x) * so3_y(angles.y) * so3_z(angles.z)
}
