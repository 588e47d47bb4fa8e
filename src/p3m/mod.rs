//! Periodic P³M gravity: a long-range particle-mesh (PM) solve in Fourier space combined with a
//! short-range particle-particle (PP) correction summed over cell-list neighbors.

mod fft;
pub mod mesh;
mod parameters;

pub use mesh::Mesh;
pub use parameters::P3mParameters;

use crate::error::SimulationError;
use crate::grid::SpatialGrid;
use crate::math::IV;
use crate::util::minimum_image;
use crate::{Scalar, Vec3};
use fft::Fft3;
use mesh::sinc;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use tracing::{debug, info_span};

/// Smallest squared CIC window the deconvolution divides by.
const WINDOW_FLOOR: Scalar = 1e-10;

#[derive(Debug)]
pub struct P3mSolver {
    params: P3mParameters,
    mesh: Mesh,
    fft: Fft3,
    /// Ewald-filtered Green's function divided by the squared CIC window, one entry per mode.
    influence: Vec<Scalar>,
}

impl P3mSolver {
    pub fn new(params: P3mParameters) -> Result<Self, SimulationError> {
        params.validate()?;
        let mesh = Mesh::new(params.ng, params.box_length);
        let influence = influence_function(&params, &mesh);
        debug!(
            ng = params.ng,
            box_length = params.box_length,
            alpha = params.alpha,
            r_cut = params.r_cut,
            "created P3M solver"
        );
        Ok(P3mSolver {
            fft: Fft3::new(params.ng),
            params,
            mesh,
            influence,
        })
    }

    pub fn params(&self) -> &P3mParameters {
        &self.params
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Particle count per PM cell, spread with CIC weights. Sums to the number of particles.
    pub fn assign_density(&self, positions: &[Vec3]) -> Vec<Scalar> {
        let mut rho = vec![0.; self.mesh.len()];
        for &p in positions {
            for (i, w) in self.mesh.particle_mesh_iterator(p) {
                rho[i] += w;
            }
        }
        rho
    }

    /// Solves the long-range half of the Poisson equation for a count density.
    ///
    /// The forward transform is multiplied by the Ewald Green's function
    /// `-4 pi G (ng/L)^3 exp(-k^2 / 4 alpha^2) / k^2` and deconvolved by the squared CIC window,
    /// with the `k = 0` mode set to zero. The inverse transform is scaled by `1/ng^3`.
    pub fn solve_potential(&self, rho: &[Scalar]) -> Vec<Scalar> {
        assert_eq!(rho.len(), self.mesh.len(), "density has the wrong length");

        let mut data: Vec<Complex<Scalar>> = rho.iter().map(|&r| Complex::new(r, 0.)).collect();
        self.fft.forward(&mut data);
        data.par_iter_mut()
            .zip(self.influence.par_iter())
            .for_each(|(c, &g)| *c = c.scale(g));
        self.fft.inverse(&mut data);

        let norm = 1. / self.mesh.len() as Scalar;
        data.iter().map(|c| c.re * norm).collect()
    }

    /// `-grad(phi)` on the mesh by periodic central differences.
    pub fn force_mesh(&self, phi: &[Scalar]) -> Vec<Vec3> {
        let dx = self.mesh.spacing();
        (0..self.mesh.len())
            .into_par_iter()
            .map(|i| {
                let coord = self.mesh.index_to_coord(i);
                let mut force = Vec3::zeros();
                for axis in 0..3 {
                    let mut step = IV::zeros();
                    step[axis] = 1;
                    let ahead = phi[self.mesh.wrap_index(coord + step)];
                    let behind = phi[self.mesh.wrap_index(coord - step)];
                    force[axis] = -(ahead - behind) / (2. * dx);
                }
                force
            })
            .collect()
    }

    /// Interpolates a mesh vector field back to the particles with the same CIC weights used for
    /// assignment.
    pub fn interpolate(&self, field: &[Vec3], positions: &[Vec3]) -> Vec<Vec3> {
        positions
            .par_iter()
            .map(|&p| {
                self.mesh
                    .particle_mesh_iterator(p)
                    .map(|(i, w)| w * field[i])
                    .sum()
            })
            .collect()
    }

    /// Long-range acceleration on every particle: assign, solve, differentiate, interpolate.
    pub fn pm_forces(&self, positions: &[Vec3]) -> Vec<Vec3> {
        let _span = info_span!("P3mSolver::pm_forces", n = positions.len()).entered();

        let rho = {
            let _s = info_span!("assign_density").entered();
            self.assign_density(positions)
        };
        let phi = {
            let _s = info_span!("solve_potential").entered();
            self.solve_potential(&rho)
        };
        let _s = info_span!("interpolate").entered();
        let field = self.force_mesh(&phi);
        self.interpolate(&field, positions)
    }

    /// Short-range force of a particle at displacement `d` (with `r = |d|`) on the particle at
    /// the origin: `G [erf(alpha r) - (2 alpha r / sqrt(pi)) exp(-alpha^2 r^2)] / r^3 * d`.
    ///
    /// The bracket vanishes like `r^3` as `r -> 0`, so the kernel stays finite near the origin.
    /// `r` must be nonzero.
    pub fn pair_force(&self, d: Vec3, r: Scalar) -> Vec3 {
        let ar = self.params.alpha * r;
        let bracket = libm::erf(ar) - 2. * ar / PI.sqrt() * (-ar * ar).exp();
        d * (self.params.g * bracket / (r * r * r))
    }

    /// Short-range correction on every particle, summed over the periodic grid neighbors closer
    /// than `r_cut`.
    ///
    /// `grid` must have been rebuilt against `positions` over the same periodic box, with cells no
    /// larger than `r_cut`.
    pub fn pp_corrections(
        &self,
        positions: &[Vec3],
        grid: &SpatialGrid,
    ) -> Result<Vec<Vec3>, SimulationError> {
        if grid.num_particles() != positions.len() {
            return Err(SimulationError::config(format!(
                "neighbor grid holds {} particles but {} positions were given",
                grid.num_particles(),
                positions.len()
            )));
        }
        if (grid.region_size() - self.params.box_length).abs() > 1e-9 * self.params.box_length {
            return Err(SimulationError::config(format!(
                "neighbor grid covers a region of {} but the periodic box is {}",
                grid.region_size(),
                self.params.box_length
            )));
        }
        self.params.validate_cell_size(grid.cell_size())?;

        let _span = info_span!("P3mSolver::pp_corrections", n = positions.len()).entered();
        let length = self.params.box_length;
        let r_cut = self.params.r_cut;

        Ok((0..positions.len())
            .into_par_iter()
            .map(|i| {
                grid.neighbors(i, true)
                    .into_iter()
                    .filter_map(|j| {
                        let d = minimum_image(positions[j] - positions[i], length);
                        let r = d.norm();
                        (r > 0. && r < r_cut).then(|| self.pair_force(d, r))
                    })
                    .sum()
            })
            .collect())
    }

    /// Total acceleration per particle: PM followed by PP, added component-wise.
    pub fn compute_forces(
        &self,
        positions: &[Vec3],
        grid: &SpatialGrid,
    ) -> Result<Vec<Vec3>, SimulationError> {
        let pm = self.pm_forces(positions);
        let pp = self.pp_corrections(positions, grid)?;
        Ok(pm.into_iter().zip(pp).map(|(a, b)| a + b).collect())
    }
}

/// Mesh index along one axis folded to a signed frequency in `(-ng/2, ng/2]`.
fn fold_frequency(i: isize, ng: usize) -> isize {
    let ng = ng as isize;
    if i > ng / 2 {
        i - ng
    } else {
        i
    }
}

fn influence_function(params: &P3mParameters, mesh: &Mesh) -> Vec<Scalar> {
    let ng = params.ng;
    let dk = 2. * PI / params.box_length;
    let half_dx = 0.5 * params.dx();
    let prefactor = -4. * PI * params.g * (ng as Scalar / params.box_length).powi(3);
    let four_alpha2 = 4. * params.alpha * params.alpha;

    (0..mesh.len())
        .map(|i| {
            let k = mesh
                .index_to_coord(i)
                .map(|c| fold_frequency(c, ng) as Scalar * dk);
            let k2 = k.norm_squared();
            if k2 == 0. {
                return 0.;
            }
            let window: Scalar = k.iter().map(|&kc| sinc(kc * half_dx)).product();
            let window2 = (window * window).max(WINDOW_FLOOR);
            prefactor * (-k2 / four_alpha2).exp() / k2 / window2
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::diff_test;
    use proptest::prelude::*;

    fn two_body_solver(ng: usize) -> P3mSolver {
        let params = P3mParameters::new(ng, 400., 1.)
            .with_r_cut(50.)
            .with_alpha(0.5);
        P3mSolver::new(params).unwrap()
    }

    proptest! {
        #[test]
        fn density_sums_to_particle_count(
            coords in proptest::collection::vec((-50.0..50.0f64, -50.0..50.0f64, -50.0..50.0f64), 1..40)
        ) {
            let positions: Vec<Vec3> = coords.iter().map(|&(x, y, z)| Vec3::new(x, y, z)).collect();
            let solver = P3mSolver::new(P3mParameters::new(8, 100., 1.)).unwrap();
            let total: Scalar = solver.assign_density(&positions).iter().sum();
            prop_assert!((total - positions.len() as Scalar).abs() < 1e-9);
        }
    }

    #[test]
    fn uniform_density_has_zero_potential() {
        let solver = P3mSolver::new(P3mParameters::new(8, 100., 1.)).unwrap();
        let phi = solver.solve_potential(&vec![3.; solver.mesh().len()]);
        assert!(phi.iter().all(|p| p.abs() < 1e-12));
    }

    #[test]
    fn potential_is_linear_in_density() {
        let solver = P3mSolver::new(P3mParameters::new(8, 100., 1.)).unwrap();
        let rho: Vec<Scalar> = (0..solver.mesh().len())
            .map(|i| ((i * 13) % 7) as Scalar)
            .collect();
        let scaled: Vec<Scalar> = rho.iter().map(|r| 2.5 * r).collect();

        let phi = solver.solve_potential(&rho);
        let phi_scaled = solver.solve_potential(&scaled);
        let largest = phi.iter().fold(0., |m: Scalar, p| m.max(p.abs()));
        assert!(largest > 0.);
        for (a, b) in phi.iter().zip(&phi_scaled) {
            assert!((2.5 * a - b).abs() < 1e-9 * largest);
        }
    }

    #[test]
    fn plane_wave_is_scaled_by_the_influence_function() {
        let params = P3mParameters::new(16, 100., 2.);
        let solver = P3mSolver::new(params.clone()).unwrap();
        let ng = params.ng;
        let rho: Vec<Scalar> = (0..solver.mesh().len())
            .map(|i| (2. * PI * (i % ng) as Scalar / ng as Scalar).cos())
            .collect();

        let phi = solver.solve_potential(&rho);

        let k = 2. * PI / params.box_length;
        let window = sinc(0.5 * k * params.dx());
        let expected = -4. * PI * params.g * (ng as Scalar / params.box_length).powi(3)
            * (-k * k / (4. * params.alpha * params.alpha)).exp()
            / (k * k)
            / (window * window);
        for (r, p) in rho.iter().zip(&phi) {
            assert!((p - expected * r).abs() < 1e-9 * expected.abs());
        }
    }

    #[test]
    fn frequencies_fold_to_the_symmetric_range() {
        let folded: Vec<_> = (0..8).map(|i| fold_frequency(i, 8)).collect();
        assert_eq!(folded, vec![0, 1, 2, 3, 4, -3, -2, -1]);
    }

    #[test]
    fn single_particle_feels_no_mesh_force() {
        let solver = P3mSolver::new(P3mParameters::new(8, 100., 1.).with_alpha(0.3)).unwrap();
        let force = solver.pm_forces(&[Vec3::new(13.7, -21.2, 4.4)]);
        assert!(force[0].norm() < 1e-12);
    }

    #[test]
    fn mesh_forces_conserve_momentum() {
        let solver = P3mSolver::new(P3mParameters::new(8, 100., 1.).with_alpha(0.3)).unwrap();
        let forces = solver.pm_forces(&[Vec3::new(13.7, -21.2, 4.4), Vec3::new(-30.1, 10.5, 22.)]);
        assert!(forces[0].norm() > 1e-6);
        assert!((forces[0] + forces[1]).norm() < 1e-12);
    }

    #[test]
    fn pair_kernel_is_the_gradient_of_the_screened_potential() {
        let solver = two_body_solver(8);
        let alpha = solver.params().alpha;
        let failures = diff_test(
            |d| -libm::erf(alpha * d.norm()) / d.norm(),
            |d| solver.pair_force(d, d.norm()),
            Vec3::from_element(1.)..Vec3::from_element(4.),
            1e-6,
        );
        assert_eq!(failures, 0);
    }

    #[test]
    fn pair_kernel_is_finite_near_the_origin() {
        let solver = two_body_solver(8);
        let d = Vec3::new(1e-6, 0., 0.);
        let f = solver.pair_force(d, d.norm());
        assert!(f.iter().all(|c| c.is_finite()));
        assert!(f.norm() < 1e-3);
    }

    #[test]
    fn two_body_scenario() {
        let positions = vec![Vec3::new(-5., 0., 0.), Vec3::new(5., 0., 0.)];
        for ng in [4, 8] {
            let solver = two_body_solver(ng);
            let grid = SpatialGrid::build(&positions, 400., 50.).unwrap();

            let pp = solver.pp_corrections(&positions, &grid).unwrap();
            // erf(alpha * 10) is 1 to machine precision, so this is plain Newtonian gravity
            assert!((pp[0] - Vec3::new(0.01, 0., 0.)).norm() < 1e-9);
            assert!((pp[0] + pp[1]).norm() < 1e-15);

            let pm = solver.pm_forces(&positions);
            assert!(pm[0].norm() < 0.05 * pp[0].norm());
            assert!((pm[0] + pm[1]).norm() < 1e-12);

            let total = solver.compute_forces(&positions, &grid).unwrap();
            assert!(total[0].x > 0. && total[1].x < 0.);
            assert!((total[0] + total[1]).norm() < 1e-12);
        }
    }

    #[test]
    fn pp_pairs_across_the_periodic_seam() {
        let solver = two_body_solver(8);
        let positions = vec![Vec3::new(-198., 0., 0.), Vec3::new(192., 0., 0.)];
        let grid = SpatialGrid::build(&positions, 400., 50.).unwrap();

        let pp = solver.pp_corrections(&positions, &grid).unwrap();
        // the minimum image of particle 1 sits 10 to the left of particle 0
        assert!((pp[0] - Vec3::new(-0.01, 0., 0.)).norm() < 1e-9);
        assert!((pp[0] + pp[1]).norm() < 1e-15);
    }

    #[test]
    fn pp_rejects_mismatched_grids() {
        let solver = two_body_solver(8);
        let positions = vec![Vec3::new(-5., 0., 0.), Vec3::new(5., 0., 0.)];

        let fine = SpatialGrid::build(&positions, 400., 25.).unwrap();
        assert!(matches!(
            solver.pp_corrections(&positions, &fine),
            Err(SimulationError::InvalidConfiguration { .. })
        ));

        let coarse = SpatialGrid::build(&positions, 400., 60.).unwrap();
        assert!(solver.pp_corrections(&positions, &coarse).is_ok());

        let stale = SpatialGrid::build(&positions[..1], 400., 50.).unwrap();
        assert!(solver.pp_corrections(&positions, &stale).is_err());

        let wrong_box = SpatialGrid::build(&positions, 200., 50.).unwrap();
        assert!(solver.pp_corrections(&positions, &wrong_box).is_err());
    }
}
