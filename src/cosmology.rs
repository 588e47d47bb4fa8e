//! Expanding-universe gravity in comoving coordinates, in units where `H0 = 1`.

use crate::error::SimulationError;
use crate::p3m::{P3mParameters, P3mSolver};
use crate::simulator::Simulator;
use crate::{Scalar, Simulation, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info_span};

/// Background cosmology: scale factor `a` and the matter and vacuum density parameters. The
/// redshift is always derived from `a`.
///
/// Deserializes from either `a` or `z` (or both, if they agree).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CosmologySettings")]
pub struct Cosmology {
    pub a: Scalar,
    pub omega_m: Scalar,
    pub omega_l: Scalar,
}

impl Cosmology {
    pub fn from_scale_factor(a: Scalar, omega_m: Scalar, omega_l: Scalar) -> Self {
        Cosmology {
            a,
            omega_m,
            omega_l,
        }
    }

    pub fn from_redshift(z: Scalar, omega_m: Scalar, omega_l: Scalar) -> Self {
        Self::from_scale_factor(1. / (1. + z), omega_m, omega_l)
    }

    /// `z = 1/a - 1`.
    pub fn z(&self) -> Scalar {
        1. / self.a - 1.
    }

    /// `H(a)/H0 = sqrt(omega_m / a^3 + omega_l)`.
    pub fn hubble(&self) -> Scalar {
        (self.omega_m / (self.a * self.a * self.a) + self.omega_l).sqrt()
    }

    /// Explicit update `a <- a (1 + H dt)`.
    pub fn advance(&mut self, dt: Scalar) {
        self.a *= 1. + self.hubble() * dt;
    }

    /// `G m` of one particle when `n` particles carry the matter density of a box of side
    /// `box_length`: `3 omega_m / (8 pi) * L^3 / N`.
    pub fn particle_gravity(omega_m: Scalar, box_length: Scalar, n: usize) -> Scalar {
        3. * omega_m / (8. * PI) * box_length.powi(3) / n as Scalar
    }
}

impl Default for Cosmology {
    fn default() -> Self {
        Cosmology::from_redshift(49., 0.3, 0.7)
    }
}

#[derive(Deserialize)]
struct CosmologySettings {
    a: Option<Scalar>,
    z: Option<Scalar>,
    omega_m: Scalar,
    omega_l: Scalar,
}

impl TryFrom<CosmologySettings> for Cosmology {
    type Error = String;

    fn try_from(settings: CosmologySettings) -> Result<Self, Self::Error> {
        let a = match (settings.a, settings.z) {
            (Some(a), None) => a,
            (None, Some(z)) => 1. / (1. + z),
            (Some(a), Some(z)) => {
                let from_z = 1. / (1. + z);
                if (a - from_z).abs() > 1e-9 * a.abs().max(from_z.abs()) {
                    return Err(format!(
                        "scale factor {} and redshift {} disagree (a = {} for that redshift)",
                        a, z, from_z
                    ));
                }
                a
            }
            (None, None) => return Err("either a scale factor or a redshift is required".into()),
        };
        if !(a > 0.) {
            return Err(format!("scale factor must be positive, got {}", a));
        }
        Ok(Cosmology::from_scale_factor(
            a,
            settings.omega_m,
            settings.omega_l,
        ))
    }
}

/// Implicit Hubble drag: `(v + F dt / a^2) / (1 + H dt)`.
///
/// Stable for any `H dt`, and tends to the terminal velocity `F / (a^2 H)` as `dt` grows.
pub fn drag_kick(v: Vec3, force: Vec3, a: Scalar, hubble: Scalar, dt: Scalar) -> Vec3 {
    (v + force * (dt / (a * a))) / (1. + hubble * dt)
}

/// Comoving leapfrog driven by the PM stage of a [`P3mSolver`].
///
/// Positions are comoving and wrap periodically in `[-L/2, L/2)`. Velocities are peculiar
/// velocities `u = a dx/dt`. The PP correction is not applied here.
#[derive(Debug)]
pub struct CosmologicalSimulator {
    base: Simulator,
    cosmology: Cosmology,
    solver: P3mSolver,
}

impl CosmologicalSimulator {
    /// Takes over `base`, pointing its neighbor grid at the periodic box with cells of `r_cut`,
    /// and wraps every particle into the box.
    pub fn new(
        mut base: Simulator,
        cosmology: Cosmology,
        params: P3mParameters,
    ) -> Result<Self, SimulationError> {
        if !(base.dt > 0.) {
            return Err(SimulationError::config(format!(
                "time step must be positive, got {}",
                base.dt
            )));
        }
        base.region_size = params.box_length;
        base.cell_size = params.r_cut;
        base.periodic_boundary(params.box_length);
        let solver = P3mSolver::new(params)?;
        Ok(CosmologicalSimulator {
            base,
            cosmology,
            solver,
        })
    }

    pub fn cosmology(&self) -> &Cosmology {
        &self.cosmology
    }

    pub fn solver(&self) -> &P3mSolver {
        &self.solver
    }

    pub fn base_mut(&mut self) -> &mut Simulator {
        &mut self.base
    }

    fn advance(&mut self) -> Result<(), SimulationError> {
        let _span = info_span!("CosmologicalSimulator::step", count = self.base.count).entered();

        self.base.make_grid()?;
        let forces = self.solver.pm_forces(&self.base.pos);

        let a = self.cosmology.a;
        let hubble = self.cosmology.hubble();
        let dt = self.base.dt;
        self.base
            .vel
            .par_iter_mut()
            .zip(self.base.pos.par_iter_mut())
            .zip(forces.par_iter())
            .for_each(|((v, x), &f)| {
                *v = drag_kick(*v, f, a, hubble, dt);
                *x += *v * (dt / a);
            });

        self.cosmology.advance(dt);
        self.base.advance_clock();
        self.base.periodic_boundary(self.solver.params().box_length);

        debug!(z = self.cosmology.z(), a = self.cosmology.a, "advanced cosmology");
        Ok(())
    }
}

impl Simulation for CosmologicalSimulator {
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
