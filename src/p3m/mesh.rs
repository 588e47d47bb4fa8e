use crate::math::IV;
use crate::{Scalar, Vec3};

/// A periodic `ng x ng x ng` mesh covering the box `[-L/2, L/2)^3`. Fields on the mesh are flat
/// arrays indexed by `ix + iy*ng + iz*ng^2`.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub ng: usize,
    pub box_length: Scalar,
}

impl Mesh {
    pub fn new(ng: usize, box_length: Scalar) -> Self {
        Mesh { ng, box_length }
    }

    /// Total number of mesh points.
    pub fn len(&self) -> usize {
        self.ng * self.ng * self.ng
    }

    pub fn spacing(&self) -> Scalar {
        self.box_length / self.ng as Scalar
    }

    /// Flat index of a mesh coordinate, wrapping every axis periodically.
    pub fn wrap_index(&self, i: IV) -> usize {
        let ng = self.ng as isize;
        let i = i.map(|c| c.rem_euclid(ng));
        (i.x + i.y * ng + i.z * ng * ng) as usize
    }

    pub fn index_to_coord(&self, i: usize) -> IV {
        let ng = self.ng;
        IV::new((i % ng) as isize, ((i / ng) % ng) as isize, (i / (ng * ng)) as isize)
    }

    /// Continuous mesh coordinates of a position. Mesh point `i` sits at the center of PM cell
    /// `i`, hence the half-cell shift.
    fn mesh_space(&self, p: Vec3) -> Vec3 {
        let ng = self.ng as Scalar;
        p.map(|x| (x / self.box_length + 0.5) * ng - 0.5)
    }

    /// The eight mesh points surrounding `p` together with their Cloud-In-Cell (trilinear)
    /// weights. The weights always sum to one.
    pub fn particle_mesh_iterator(&self, p: Vec3) -> impl Iterator<Item = (usize, Scalar)> + '_ {
        let g = self.mesh_space(p);
        let base = g.map(|x| x.floor());
        let t = g - base;
        let base = base.map(|x| x as isize);

        (0..8).map(move |corner| {
            let offset = IV::new(corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
            let weight: Scalar = (0..3)
                .map(|axis| if offset[axis] == 0 { 1. - t[axis] } else { t[axis] })
                .product();
            (self.wrap_index(base + offset), weight)
        })
    }
}

/// `sin(x)/x`, with the removable singularity filled in.
pub fn sinc(x: Scalar) -> Scalar {
    if x.abs() < 1e-10 {
        1.
    } else {
        x.sin() / x
    }
}
