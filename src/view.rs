//! What a renderer needs from the simulation: the camera rotation and a back-to-front drawing
//! order.

use crate::math::Mat;
use crate::tensor::{euler_rotation, so3_x, so3_y, so3_z};
use crate::{Scalar, Vec3};
use std::cmp::Ordering;

/// Camera rotation for Euler angles, composed as `Rx * Ry * Rz`.
pub fn rotation(angles: Vec3) -> Mat {
    if angles == Vec3::zeros() {
        return Mat::identity();
    }
    euler_rotation(angles)
}

/// Undoes [`rotation`]: `Rz(-z) * Ry(-y) * Rx(-x)`. Rotating a world-space vector by it keeps the
/// vector fixed on screen while the camera turns, which is how gravity follows the view.
pub fn inverse_rotation(angles: Vec3) -> Mat {
    if angles == Vec3::zeros() {
        return Mat::identity();
    }
    so3_z(-angles.z) * so3_y(-angles.y) * so3_x(-angles.x)
}

/// Particle indices ordered for the painter's algorithm: by the projection of each position onto
/// the rotated view axis `R * y`, farthest first.
pub fn depth_sorted_indices(positions: &[Vec3], angles: Vec3) -> Vec<usize> {
    let view = rotation(angles) * Vec3::y();
    let depth: Vec<Scalar> = positions.iter().map(|p| p.dot(&view)).collect();

    let mut indices: Vec<usize> = (0..positions.len()).collect();
    indices.sort_by(|&a, &b| {
        depth[b]
            .partial_cmp(&depth[a])
            .unwrap_or(Ordering::Equal)
    });
    indices
}
