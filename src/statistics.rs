use crate::p3m::P3mSolver;
use crate::simulator::Simulator;
use crate::{Scalar, Vec3};
use itertools::izip;

/// Conserved quantities and summary numbers of a particle state. Every particle has unit mass.
pub trait SimulationStatistics {
    fn total_time(&self) -> Scalar;
    fn total_linear_momentum(&self) -> Vec3;
    fn total_angular_momentum(&self) -> Vec3;
    /// Kinetic energy, `sum |v|^2 / 2`.
    fn total_energy(&self) -> Scalar;
    fn rms_velocity(&self) -> Scalar;
}

impl SimulationStatistics for Simulator {
    fn total_time(&self) -> Scalar {
        self.t
    }

    fn total_linear_momentum(&self) -> Vec3 {
        self.vel.iter().sum()
    }

    fn total_angular_momentum(&self) -> Vec3 {
        izip!(&self.pos, &self.vel).map(|(x, v)| x.cross(v)).sum()
    }

    fn total_energy(&self) -> Scalar {
        self.vel.iter().map(|v| 0.5 * v.dot(v)).sum()
    }

    fn rms_velocity(&self) -> Scalar {
        if self.vel.is_empty() {
            return 0.;
        }
        let sum: Scalar = self.vel.iter().map(|v| v.norm_squared()).sum();
        (sum / self.vel.len() as Scalar).sqrt()
    }
}

/// `max(rho) / mean(rho) - 1` for the CIC density of `positions` on the solver's mesh. Zero for a
/// perfectly uniform distribution.
pub fn max_density_contrast(solver: &P3mSolver, positions: &[Vec3]) -> Scalar {
    if positions.is_empty() {
        return 0.;
    }
    let rho = solver.assign_density(positions);
    let mean = positions.len() as Scalar / rho.len() as Scalar;
    let max = rho.iter().cloned().fold(Scalar::NEG_INFINITY, Scalar::max);
    max / mean - 1.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p3m::P3mParameters;
    use crate::Simulation;
    use itertools::iproduct;

    #[test]
    fn two_particle_statistics() {
        let mut sim = Simulator::new(0.1, Vec3::zeros());
        sim.add_particle(Vec3::new(1., 0., 0.), Vec3::new(0., 2., 0.));
        sim.add_particle(Vec3::new(-1., 0., 0.), Vec3::new(0., -2., 0.));

        assert_eq!(sim.total_linear_momentum(), Vec3::zeros());
        assert_eq!(sim.total_angular_momentum(), Vec3::new(0., 0., 4.));
        assert_eq!(sim.total_energy(), 4.);
        assert_eq!(sim.rms_velocity(), 2.);

        sim.step();
        assert_eq!(sim.total_time(), 0.1);
    }

    #[test]
    fn lattice_has_no_density_contrast() {
        let solver = P3mSolver::new(P3mParameters::new(4, 100., 1.)).unwrap();
        let lattice: Vec<Vec3> = iproduct!(0..4, 0..4, 0..4)
            .map(|(i, j, k)| Vec3::new(i as Scalar, j as Scalar, k as Scalar) * 25. - Vec3::from_element(37.5))
            .collect();
        assert!(max_density_contrast(&solver, &lattice).abs() < 1e-9);

        let clump = vec![Vec3::new(12.5, 12.5, 12.5); 64];
        // all the mass on one of 64 mesh points
        assert!((max_density_contrast(&solver, &clump) - 63.).abs() < 1e-9);
    }
}
