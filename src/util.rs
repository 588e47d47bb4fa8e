use crate::{Scalar, Vec3};
use std::ops::Range;

/// Checks that `df` is the gradient of `f` by comparing finite differences against the average
/// of `df` at both ends of a small random step. Returns the number of failed samples.
#[cfg(test)]
pub fn diff_test<F, DF>(f: F, df: DF, domain: Range<Vec3>, eps: Scalar) -> usize
where
    F: Fn(Vec3) -> Scalar,
    DF: Fn(Vec3) -> Vec3,
{
    let mut failures = 0;
    for _ in 0..1000 {
        let x0 = Vec3::new_random().component_mul(&domain.size()) + domain.start;
        let dx = (2. * Vec3::new_random() - Vec3::ones()) * eps;

        let x1 = x0 + dx;

        let a0 = f(x0);
        let a1 = f(x1);

        let d0 = df(x0);
        let d1 = df(x1);

        let u = (a1 - a0) / eps;
        let v = (d0 + d1).dot(&dx) / (2. * eps);

        let err = (u - v).abs();
        let rel_err = err / (Scalar::max(u.abs(), v.abs())).max(Scalar::EPSILON);

        if rel_err > 100. * eps && err > eps {
            eprintln!(
                "Diff Test Failed: {:?} -- {:?} vs {:?} at {:?}",
                err, u, v, x0
            );
            failures += 1;
        }
    }
    failures
}

/// Shortest periodic image of a displacement in a cubic box of side `length`: any component
/// beyond half a box is shifted by one box length.
pub fn minimum_image(mut d: Vec3, length: Scalar) -> Vec3 {
    let half = 0.5 * length;
    for c in d.iter_mut() {
        if *c > half {
            *c -= length;
        } else if *c < -half {
            *c += length;
        }
    }
    d
}

/// Wraps a coordinate into `[-L/2, L/2)` for a periodic box of side `length`.
pub fn wrap_coordinate(x: Scalar, length: Scalar) -> Scalar {
    let half = 0.5 * length;
    let wrapped = (x + half).rem_euclid(length) - half;
    // rem_euclid can round up to exactly `length`
    if wrapped >= half {
        wrapped - length
    } else {
        wrapped
    }
}

pub trait RangeExt {
    fn size(&self) -> Vec3;

    fn contains_point(&self, x: &Vec3) -> bool;
}

impl RangeExt for Range<Vec3> {
    fn size(&self) -> Vec3 {
        self.end - self.start
    }

    /// Strict containment: points on the boundary are outside.
    fn contains_point(&self, x: &Vec3) -> bool {
        self.start.all_lt(x) && self.end.all_gt(x)
    }
}

pub trait VecExt {
    fn all_lt(&self, other: &Self) -> bool;

    fn all_gt(&self, other: &Self) -> bool;

    fn ones() -> Self;
}

impl VecExt for Vec3 {
    fn all_lt(&self, other: &Self) -> bool {
        self.x < other.x && self.y < other.y && self.z < other.z
    }

    fn all_gt(&self, other: &Self) -> bool {
        self.x > other.x && self.y > other.y && self.z > other.z
    }

    fn ones() -> Self {
        Self::from_element(1.)
    }
}
