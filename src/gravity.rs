use crate::error::SimulationError;
use crate::p3m::{P3mParameters, P3mSolver};
use crate::simulator::Simulator;
use crate::{Simulation, Vec3};
use tracing::info_span;

/// Self-gravitating particles in a static periodic box, with P³M forces (PM + PP) and a flat
/// leapfrog.
#[derive(Debug)]
pub struct GravitySimulator {
    base: Simulator,
    solver: P3mSolver,
}

impl GravitySimulator {
    /// Takes over `base`: its grid region becomes the periodic box and its cells are exactly
    /// `r_cut` wide. Particles are wrapped into the box.
    pub fn new(mut base: Simulator, params: P3mParameters) -> Result<Self, SimulationError> {
        base.region_size = params.box_length;
        base.cell_size = params.r_cut;
        base.periodic_boundary(params.box_length);
        let solver = P3mSolver::new(params)?;
        Ok(GravitySimulator { base, solver })
    }

    pub fn solver(&self) -> &P3mSolver {
        &self.solver
    }

    pub fn base_mut(&mut self) -> &mut Simulator {
        &mut self.base
    }

    fn advance(&mut self) -> Result<(), SimulationError> {
        let _span = info_span!("GravitySimulator::step", count = self.base.count).entered();

        self.base.make_grid()?;
        let forces = self.solver.compute_forces(&self.base.pos, self.base.grid())?;

        self.base.advance_clock();
        let gravity = self.base.gravity;
        self.base.kick_drift(|i| forces[i] + gravity);
        self.base.periodic_boundary(self.solver.params().box_length);
        Ok(())
    }
}

impl Simulation for GravitySimulator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::SimulationStatistics;

    fn two_body() -> GravitySimulator {
        let params = P3mParameters::new(8, 400., 1.)
            .with_r_cut(50.)
            .with_alpha(0.5);
        let mut base = Simulator::new(1., Vec3::zeros());
        base.add_particle(Vec3::new(-5., 0., 0.), Vec3::zeros());
        base.add_particle(Vec3::new(5., 0., 0.), Vec3::zeros());
        GravitySimulator::new(base, params).unwrap()
    }

    #[test]
    fn pair_falls_together() {
        let mut sim = two_body();
        for _ in 0..10 {
            sim.step().unwrap();
        }

        let pos = &sim.base().pos;
        assert!(pos[0].x > -5. && pos[1].x < 5.);
        assert!(pos[0].x < pos[1].x);
        assert!(sim.base().total_linear_momentum().norm() < 1e-12);
        assert_eq!(sim.base().count, 10);
    }

    #[test]
    fn grid_cells_match_the_cutoff() {
        for cell_size in [500., 3.] {
            let base = Simulator::new(1., Vec3::zeros()).with_region(10., cell_size);
            let sim = GravitySimulator::new(base, P3mParameters::new(8, 400., 1.)).unwrap();
            assert_eq!(sim.base().cell_size, sim.solver().params().r_cut);
            assert_eq!(sim.base().region_size, 400.);
        }
    }

    #[test]
    fn pairs_just_inside_the_cutoff_attract() {
        let params = P3mParameters::new(32, 100., 1.);
        let separation = 0.9 * params.r_cut;
        // a requested cell of one mesh spacing would only see pairs closer than 3.125
        let mut base = Simulator::new(0.1, Vec3::zeros()).with_region(100., params.dx());
        base.add_particle(Vec3::new(-0.5 * separation, 0., 0.), Vec3::zeros());
        base.add_particle(Vec3::new(0.5 * separation, 0., 0.), Vec3::zeros());
        let mut sim = GravitySimulator::new(base, params).unwrap();

        sim.base.make_grid().unwrap();
        let pp = sim
            .solver
            .pp_corrections(&sim.base.pos, sim.base.grid())
            .unwrap();
        assert!(pp[0].x > 0. && pp[1].x < 0.);
        assert!((pp[0] + pp[1]).norm() < 1e-15);
    }
}
