use crate::error::SimulationError;
use crate::grid::SpatialGrid;
use crate::util::{minimum_image, wrap_coordinate};
use crate::{Scalar, Simulation, Vec3};
use rayon::prelude::*;

/// Particle state shared by every driver: ids, positions and velocities (index-aligned), the
/// clock, a uniform gravity vector, and the cell list used for neighbor queries.
///
/// The richer drivers ([`crate::FlipSimulator`], [`crate::GravitySimulator`] and
/// [`crate::CosmologicalSimulator`]) own a `Simulator` and add their own step on top of it.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub dt: Scalar,
    pub t: Scalar,
    pub count: usize,
    pub id: Vec<usize>,
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    pub gravity: Vec3,
    /// Side of the cube covered by the neighbor grid.
    pub region_size: Scalar,
    /// Side of a neighbor grid cell.
    pub cell_size: Scalar,
    grid: SpatialGrid,
}

impl Simulator {
    /// A simulator with no particles.
    pub fn new(dt: Scalar, gravity: Vec3) -> Self {
        Simulator {
            dt,
            t: 0.,
            count: 0,
            id: Vec::new(),
            pos: Vec::new(),
            vel: Vec::new(),
            gravity,
            region_size: 0.,
            cell_size: 0.,
            grid: SpatialGrid::default(),
        }
    }

    pub fn with_particles(
        dt: Scalar,
        id: Vec<usize>,
        pos: Vec<Vec3>,
        vel: Vec<Vec3>,
        gravity: Vec3,
    ) -> Result<Self, SimulationError> {
        if id.len() != pos.len() || vel.len() != pos.len() {
            return Err(SimulationError::config(format!(
                "particle arrays disagree in length: {} ids, {} positions, {} velocities",
                id.len(),
                pos.len(),
                vel.len()
            )));
        }
        Ok(Simulator {
            id,
            pos,
            vel,
            ..Simulator::new(dt, gravity)
        })
    }

    /// Sets the cube covered by the neighbor grid and its cell size.
    pub fn with_region(mut self, region_size: Scalar, cell_size: Scalar) -> Self {
        self.region_size = region_size;
        self.cell_size = cell_size;
        self
    }

    pub fn num_particles(&self) -> usize {
        self.pos.len()
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Rebuilds the neighbor grid from the current positions.
    pub fn make_grid(&mut self) -> Result<(), SimulationError> {
        self.grid
            .rebuild(&self.pos, self.region_size, self.cell_size)
    }

    /// Particles in the cells around particle `i`, as of the last [`Simulator::make_grid`].
    pub fn near_particles(&self, i: usize, periodic: bool) -> Vec<usize> {
        self.grid.neighbors(i, periodic)
    }

    /// Vector from particle `i` to particle `j`, using the minimum image when `periodic`.
    pub fn displacement(&self, i: usize, j: usize, periodic: bool) -> Vec3 {
        let d = self.pos[j] - self.pos[i];
        if periodic {
            minimum_image(d, self.region_size)
        } else {
            d
        }
    }

    /// Increments the step counter and sets `t = count * dt`.
    pub fn advance_clock(&mut self) {
        self.count += 1;
        self.t = self.count as Scalar * self.dt;
    }

    /// Flat leapfrog under uniform gravity: `v += g dt`, then `x += v dt`.
    pub fn step(&mut self) {
        self.advance_clock();
        let gravity = self.gravity;
        self.kick_drift(|_| gravity);
    }

    /// Applies one kick-drift with a per-particle acceleration.
    pub fn kick_drift<F>(&mut self, acceleration: F)
    where
        F: Fn(usize) -> Vec3 + Sync,
    {
        let dt = self.dt;
        self.pos
            .par_iter_mut()
            .zip(self.vel.par_iter_mut())
            .enumerate()
            .for_each(|(i, (x, v))| {
                *v += acceleration(i) * dt;
                *x += *v * dt;
            });
    }

    /// Reflects particles that crossed a wall of the cube `[-L/2, L/2]^3` during the last step.
    ///
    /// For a wall crossed, `t_cross = (x - wall) / (v dt)` is the fraction of the step spent
    /// beyond it. The crossing is accepted when `0 < t_cross <= 1` and the other two coordinates
    /// at the crossing lie inside the wall. The normal velocity is negated and the position is
    /// mirrored back inside. Each particle is checked again until a pass finds no crossing, which
    /// takes care of edges and corners.
    pub fn solid_boundary(&mut self, length: Scalar) {
        let half = 0.5 * length;
        let dt = self.dt;
        self.pos
            .par_iter_mut()
            .zip(self.vel.par_iter_mut())
            .for_each(|(x, v)| while reflect(x, v, half, dt) {});
    }

    /// Shifts every coordinate back into `[-L/2, L/2)`.
    pub fn periodic_boundary(&mut self, length: Scalar) {
        self.pos
            .par_iter_mut()
            .for_each(|x| {
                for c in x.iter_mut() {
                    *c = wrap_coordinate(*c, length);
                }
            });
    }
}

/// One reflection pass over the six walls. Returns whether anything was reflected.
fn reflect(x: &mut Vec3, v: &mut Vec3, half: Scalar, dt: Scalar) -> bool {
    let mut reflected = false;
    for axis in 0..3 {
        for wall in [-half, half] {
            let outside = if wall < 0. {
                x[axis] < wall
            } else {
                x[axis] > wall
            };
            if !outside {
                continue;
            }

            let t_cross = (x[axis] - wall) / (v[axis] * dt);
            if !(t_cross > 0. && t_cross <= 1.) {
                continue;
            }

            let on_wall = (0..3)
                .filter(|&other| other != axis)
                .all(|other| (x[other] - v[other] * dt * t_cross).abs() < half);
            if on_wall {
                v[axis] = -v[axis];
                x[axis] = wall + v[axis] * dt * t_cross;
                reflected = true;
            }
        }
    }
    reflected
}

impl Simulation for Simulator {
    fn step(&mut self) -> Result<(), SimulationError> {
        Simulator::step(self);
        Ok(())
    }

    fn add_particle(&mut self, position: Vec3, velocity: Vec3) {
        self.id.push(self.pos.len());
        self.pos.push(position);
        self.vel.push(velocity);
    }

    fn base(&self) -> &Simulator {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(position: Vec3, velocity: Vec3, dt: Scalar) -> Simulator {
        Simulator::with_particles(dt, vec![0], vec![position], vec![velocity], Vec3::zeros())
            .unwrap()
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let result = Simulator::with_particles(
            0.1,
            vec![0, 1],
            vec![Vec3::zeros()],
            vec![Vec3::zeros()],
            Vec3::zeros(),
        );
        assert!(matches!(
            result,
            Err(SimulationError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn leapfrog_under_gravity() {
        let mut sim = Simulator::new(0.5, Vec3::new(0., 0., -2.));
        sim.add_particle(Vec3::zeros(), Vec3::new(1., 0., 0.));
        sim.step();
        sim.step();

        assert_eq!(sim.count, 2);
        assert_eq!(sim.t, 1.);
        assert_eq!(sim.vel[0], Vec3::new(1., 0., -2.));
        // velocities after each kick: -1 then -2, each drifting for half a unit
        assert_eq!(sim.pos[0], Vec3::new(1., 0., -1.5));
    }

    #[test]
    fn head_on_reflection_keeps_speed() {
        for (start, velocity) in [
            (Vec3::new(45., 3., -2.), Vec3::new(10., 0., 0.)),
            (Vec3::new(3., -46., 1.), Vec3::new(0., -12., 0.)),
            (Vec3::new(0., 0., 49.), Vec3::new(0., 0., 7.)),
        ] {
            let mut sim = single(start, velocity, 1.);
            sim.step();
            sim.solid_boundary(100.);

            assert_eq!(sim.vel[0], -velocity);
            assert!(sim.pos[0].iter().all(|c| c.abs() < 50.));
        }

        let mut sim = single(Vec3::new(45., 0., 0.), Vec3::new(10., 0., 0.), 1.);
        sim.step();
        sim.solid_boundary(100.);
        assert_eq!(sim.pos[0], Vec3::new(45., 0., 0.));
    }

    #[test]
    fn corner_reflects_twice() {
        let mut sim = single(Vec3::new(48., 47., 0.), Vec3::new(5., 5., 0.), 1.);
        sim.step();
        sim.solid_boundary(100.);

        assert_eq!(sim.vel[0], Vec3::new(-5., -5., 0.));
        assert!((sim.pos[0] - Vec3::new(47., 48., 0.)).norm() < 1e-12);
    }

    #[test]
    fn particles_inside_are_untouched() {
        let mut sim = single(Vec3::new(10., 0., 0.), Vec3::new(1., 2., 3.), 1.);
        sim.step();
        let before = (sim.pos[0], sim.vel[0]);
        sim.solid_boundary(100.);
        assert_eq!((sim.pos[0], sim.vel[0]), before);
    }

    #[test]
    fn periodic_boundary_wraps_into_the_box() {
        let mut sim = single(Vec3::new(48., -49., 0.), Vec3::new(4., -3., 0.), 1.);
        sim.step();
        sim.periodic_boundary(100.);
        assert_eq!(sim.pos[0], Vec3::new(-48., 48., 0.));
        assert_eq!(sim.vel[0], Vec3::new(4., -3., 0.));
    }

    #[test]
    fn periodic_displacement_uses_the_nearest_image() {
        let mut sim = Simulator::new(1., Vec3::zeros()).with_region(100., 10.);
        sim.add_particle(Vec3::new(-48., 0., 0.), Vec3::zeros());
        sim.add_particle(Vec3::new(47., 10., 0.), Vec3::zeros());

        assert_eq!(sim.displacement(0, 1, false), Vec3::new(95., 10., 0.));
        assert_eq!(sim.displacement(0, 1, true), Vec3::new(-5., 10., 0.));
        assert_eq!(sim.displacement(1, 0, true), Vec3::new(5., -10., 0.));
    }

    #[test]
    fn near_particles_follow_the_grid() {
        let mut sim = Simulator::new(1., Vec3::zeros()).with_region(100., 10.);
        sim.add_particle(Vec3::new(-49., 0., 0.), Vec3::zeros());
        sim.add_particle(Vec3::new(49., 0., 0.), Vec3::zeros());
        sim.add_particle(Vec3::new(-40., 5., 0.), Vec3::zeros());
        sim.make_grid().unwrap();

        let mut closed = sim.near_particles(0, false);
        closed.sort_unstable();
        assert_eq!(closed, vec![2]);

        let mut periodic = sim.near_particles(0, true);
        periodic.sort_unstable();
        assert_eq!(periodic, vec![1, 2]);
    }
}
