//! A PIC/FLIP fluid on a staggered (MAC) grid, with pairwise collisions between nearby particles
//! and reflecting walls.

use crate::error::SimulationError;
use crate::grid::SpatialGrid;
use crate::math::IV;
use crate::simulator::Simulator;
use crate::{Scalar, Simulation, Vec3};
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info_span};

/// How grid velocities are transferred back to the particles.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferScheme {
    /// Particles take the grid velocity. Stable but dissipative.
    Pic,
    /// Particles keep their velocity plus the change the grid went through.
    Flip,
    /// `(1 - r) PIC + r FLIP`.
    PicFlip(Scalar),
}

impl TransferScheme {
    /// The weight of the FLIP velocity in the blend.
    pub fn flip_ratio(&self) -> Scalar {
        match *self {
            TransferScheme::Pic => 0.,
            TransferScheme::Flip => 1.,
            TransferScheme::PicFlip(r) => r,
        }
    }
}

impl Default for TransferScheme {
    fn default() -> Self {
        TransferScheme::PicFlip(0.9)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipParameters {
    /// Side of the cube covered by the grid. Must contain the walls.
    pub region_size: Scalar,
    /// Grid spacing, shared by the neighbor grid and the velocity grid.
    pub cell_size: Scalar,
    /// Side of the reflecting box, centered on the origin.
    pub wall_size: Scalar,
    /// Particles per cell the fluid settles at.
    pub rest_density: Scalar,
    /// How strongly over-full cells push particles out.
    pub drift_stiffness: Scalar,
    /// Over-relaxation of the incompressibility iterations.
    pub over_relaxation: Scalar,
    pub iterations: usize,
    pub transfer_scheme: TransferScheme,
    /// Approaching particles closer than this exchange their normal velocities.
    pub collision_radius: Scalar,
}

impl Default for FlipParameters {
    fn default() -> Self {
        FlipParameters {
            region_size: 110.,
            cell_size: 5.,
            wall_size: 100.,
            rest_density: 8.,
            drift_stiffness: 1.,
            over_relaxation: 1.9,
            iterations: 20,
            transfer_scheme: TransferScheme::default(),
            collision_radius: 5.,
        }
    }
}

impl FlipParameters {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.cell_size > 0.) || !(self.region_size > 0.) {
            return Err(SimulationError::config(format!(
                "region size and cell size must be positive, got {} and {}",
                self.region_size, self.cell_size
            )));
        }
        if !(self.wall_size > 0.) || self.wall_size > self.region_size {
            return Err(SimulationError::config(format!(
                "walls of size {} do not fit in a region of size {}",
                self.wall_size, self.region_size
            )));
        }
        let r = self.transfer_scheme.flip_ratio();
        if !(0. ..=1.).contains(&r) {
            return Err(SimulationError::config(format!(
                "flip ratio must lie in [0, 1], got {}",
                r
            )));
        }
        Ok(())
    }
}

/// Velocity grid with one component stored on each face of the cell grid. Component `a` of face
/// `c` sits at `-L/2 + h * c` along axis `a` and at cell centers along the other two axes, so
/// faces `c` and `c + e_a` bound cell `c`.
#[derive(Debug, Clone)]
struct MacGrid {
    /// Cells per axis. There are `n + 1` faces per axis.
    n: usize,
    cell_size: Scalar,
    region_size: Scalar,
    velocity: [Vec<Scalar>; 3],
    previous: [Vec<Scalar>; 3],
    weight: [Vec<Scalar>; 3],
}

impl MacGrid {
    fn new(region_size: Scalar, cell_size: Scalar) -> Self {
        let n = SpatialGrid::cells_per_axis(region_size, cell_size);
        let faces = (n + 1) * (n + 1) * (n + 1);
        let zeros = || [vec![0.; faces], vec![0.; faces], vec![0.; faces]];
        MacGrid {
            n,
            cell_size,
            region_size,
            velocity: zeros(),
            previous: zeros(),
            weight: zeros(),
        }
    }

    fn face_index(&self, c: IV) -> Option<usize> {
        let m = self.n as isize + 1;
        if (0..3).any(|axis| c[axis] < 0 || c[axis] >= m) {
            return None;
        }
        Some((c.x + m * c.y + m * m * c.z) as usize)
    }

    /// The in-bounds faces carrying component `axis` around `p`, with trilinear weights.
    fn face_stencil(&self, p: Vec3, axis: usize) -> impl Iterator<Item = (usize, Scalar)> + '_ {
        let mut g = (p + Vec3::from_element(0.5 * self.region_size)) / self.cell_size;
        for other in (0..3).filter(|&other| other != axis) {
            g[other] -= 0.5;
        }
        let base = g.map(|x| x.floor());
        let t = g - base;
        let base = base.map(|x| x as isize);

        iproduct!(0..2isize, 0..2isize, 0..2isize).filter_map(move |(i, j, k)| {
            let offset = IV::new(i, j, k);
            let weight: Scalar = (0..3)
                .map(|a| if offset[a] == 0 { 1. - t[a] } else { t[a] })
                .product();
            self.face_index(base + offset).map(|index| (index, weight))
        })
    }

    /// Weighted average of the particle velocities on every face. Faces no particle reaches are
    /// zero.
    fn particle_to_grid(&mut self, pos: &[Vec3], vel: &[Vec3]) {
        for axis in 0..3 {
            self.velocity[axis].fill(0.);
            self.weight[axis].fill(0.);
        }

        for (&p, v) in pos.iter().zip(vel) {
            for axis in 0..3 {
                let stencil: SmallVec<[(usize, Scalar); 8]> = self.face_stencil(p, axis).collect();
                for (index, w) in stencil {
                    self.velocity[axis][index] += w * v[axis];
                    self.weight[axis][index] += w;
                }
            }
        }

        for axis in 0..3 {
            for (u, &w) in self.velocity[axis].iter_mut().zip(&self.weight[axis]) {
                if w > 0. {
                    *u /= w;
                }
            }
        }
        self.previous = self.velocity.clone();
    }

    /// Net outflow of cell `c`.
    fn divergence(&self, c: IV) -> Scalar {
        (0..3)
            .map(|axis| {
                let mut upper = c;
                upper[axis] += 1;
                self.face(axis, upper) - self.face(axis, c)
            })
            .sum()
    }

    fn face(&self, axis: usize, c: IV) -> Scalar {
        self.face_index(c)
            .map_or(0., |index| self.velocity[axis][index])
    }

    /// Gauss-Seidel sweeps over the cells holding particles, driving their divergence towards
    /// zero and pushing particles out of over-full cells.
    fn make_incompressible(&mut self, grid: &SpatialGrid, params: &FlipParameters) {
        let n = self.n as isize;
        for _ in 0..params.iterations {
            for (z, y, x) in iproduct!(0..n, 0..n, 0..n) {
                let cell = IV::new(x, y, z);
                let count = grid[cell].len();
                if count == 0 {
                    continue;
                }

                let compression = (count as Scalar - params.rest_density).max(0.);
                let d = params.over_relaxation * self.divergence(cell)
                    - params.drift_stiffness * compression;

                for axis in 0..3 {
                    let mut upper = cell;
                    upper[axis] += 1;
                    if let Some(lower) = self.face_index(cell) {
                        self.velocity[axis][lower] += d / 6.;
                    }
                    if let Some(upper) = self.face_index(upper) {
                        self.velocity[axis][upper] -= d / 6.;
                    }
                }
            }
        }
    }

    /// The new grid velocity at `p` and the change since the transfer to the grid, or `None` if
    /// no face around `p` was reached by any particle.
    fn sample(&self, p: Vec3) -> Option<(Vec3, Vec3)> {
        let mut pic = Vec3::zeros();
        let mut delta = Vec3::zeros();
        for axis in 0..3 {
            let mut total = 0.;
            for (index, w) in self.face_stencil(p, axis) {
                if self.weight[axis][index] == 0. {
                    continue;
                }
                pic[axis] += w * self.velocity[axis][index];
                delta[axis] += w * (self.velocity[axis][index] - self.previous[axis][index]);
                total += w;
            }
            if total == 0. {
                return None;
            }
            pic[axis] /= total;
            delta[axis] /= total;
        }
        Some((pic, delta))
    }
}

/// Exchanges the velocity components along the separation of two particles closer than
/// `radius` that are approaching each other.
pub fn collide(x1: Vec3, x2: Vec3, v1: &mut Vec3, v2: &mut Vec3, radius: Scalar) {
    let d = x1 - x2;
    let dd = d.dot(&d);
    if dd == 0. || dd >= radius * radius {
        return;
    }

    let n1 = d * (v1.dot(&d) / dd);
    let n2 = d * (v2.dot(&d) / dd);
    if d.dot(&(n1 - n2)) < 0. {
        *v1 += n2 - n1;
        *v2 += n1 - n2;
    }
}

#[derive(Debug, Clone)]
pub struct FlipSimulator {
    base: Simulator,
    params: FlipParameters,
    mac: MacGrid,
}

impl FlipSimulator {
    pub fn new(mut base: Simulator, params: FlipParameters) -> Result<Self, SimulationError> {
        params.validate()?;
        base.region_size = params.region_size;
        base.cell_size = params.cell_size;
        let mac = MacGrid::new(params.region_size, params.cell_size);
        Ok(FlipSimulator { base, params, mac })
    }

    pub fn params(&self) -> &FlipParameters {
        &self.params
    }

    pub fn base_mut(&mut self) -> &mut Simulator {
        &mut self.base
    }

    fn transfer_velocities(&mut self) {
        let _s = info_span!("transfer_velocities").entered();

        self.mac.particle_to_grid(&self.base.pos, &self.base.vel);
        self.mac.make_incompressible(self.base.grid(), &self.params);

        let r = self.params.transfer_scheme.flip_ratio();
        let mac = &self.mac;
        self.base
            .vel
            .par_iter_mut()
            .zip(self.base.pos.par_iter())
            .for_each(|(v, &p)| {
                if let Some((pic, delta)) = mac.sample(p) {
                    *v = (1. - r) * pic + r * (*v + delta);
                }
            });
    }

    /// Resolves collisions once per close pair, in index order.
    fn collide_neighbors(&mut self) {
        let _s = info_span!("collide_neighbors").entered();

        let radius = self.params.collision_radius;
        let mut collisions = 0;
        for i in 0..self.base.num_particles() {
            for j in self.base.near_particles(i, false) {
                if j <= i {
                    continue;
                }
                let (x1, x2) = (self.base.pos[i], self.base.pos[j]);
                let (mut v1, mut v2) = (self.base.vel[i], self.base.vel[j]);
                collide(x1, x2, &mut v1, &mut v2, radius);
                if v1 != self.base.vel[i] {
                    collisions += 1;
                }
                self.base.vel[i] = v1;
                self.base.vel[j] = v2;
            }
        }
        debug!(collisions, "resolved particle collisions");
    }

    fn advance(&mut self) -> Result<(), SimulationError> {
        let _span = info_span!("FlipSimulator::step", count = self.base.count).entered();

        self.base.make_grid()?;
        self.transfer_velocities();
        self.collide_neighbors();
        self.base.step();
        self.base.solid_boundary(self.params.wall_size);
        Ok(())
    }
}

impl Simulation for FlipSimulator {
    fn step(&mut self) -> Result<(), SimulationError> {
        self.advance()
    }

    fn add_particle(&mut self, position: Vec3, velocity: Vec3) {
        self.base.add_particle(position, velocity);
    }

    fn base(&self) -> &Simulator {
        &self.base
    }
}
