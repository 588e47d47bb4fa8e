use crate::cosmology::Cosmology;
use crate::{Scalar, Simulation, Vec3};
use itertools::iproduct;
use na::Vector3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::Range;

pub trait InitialCondition {
    fn add_particles<S: Simulation>(&self, s: &mut S);
}

/// A jittered lattice filling a box, at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub size: Range<Vec3>,
    pub spacing: Scalar,
    pub jitter: Vec3,
}

impl Default for Block {
    fn default() -> Self {
        Block {
            size: Vec3::new(-50., -50., 0.)..Vec3::new(0., 50., 50.),
            spacing: 2.5,
            jitter: Vec3::from_element(0.1),
        }
    }
}

impl InitialCondition for Block {
    fn add_particles<S: Simulation>(&self, s: &mut S) {
        let mut rng = StdRng::from_seed([0; 32]);

        let min = self.size.start;
        let max = self.size.end;

        let counts = ((max - min) / self.spacing).map(|x| x.ceil() as usize);

        for (i, j, k) in iproduct!(0..counts.x, 0..counts.y, 0..counts.z) {
            let idx = Vector3::new(i, j, k);
            let pos = idx.cast::<Scalar>() * self.spacing + min;

            let rand: Vec3 = rng.gen::<[Scalar; 3]>().into();
            let jitter = rand.component_mul(&self.jitter) - self.jitter / 2.;

            s.add_particle(pos + jitter, Vector3::zeros());
        }
    }
}

/// Particles scattered uniformly through a ball, at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub num_particles: usize,
    pub center: Vec3,
    pub radius: Scalar,
}

impl Default for Sphere {
    fn default() -> Self {
        Sphere {
            num_particles: 5000,
            center: Vec3::zeros(),
            radius: 20.,
        }
    }
}

impl InitialCondition for Sphere {
    fn add_particles<S: Simulation>(&self, s: &mut S) {
        let mut rng = StdRng::from_seed([0; 32]);

        for _ in 0..self.num_particles {
            let offset = loop {
                let rand: Vec3 = rng.gen::<[Scalar; 3]>().into();
                let offset = rand * 2. - Vec3::from_element(1.);

                if offset.magnitude_squared() < 1. {
                    break offset * self.radius;
                }
            };

            s.add_particle(self.center + offset, Vec3::zeros());
        }
    }
}

/// A cubic lattice of `n^3` particles at the PM cell centers of a periodic box, displaced by a
/// smooth random field and given Zel'dovich velocities `u = a H (x - q)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeldovichLattice {
    pub n: usize,
    pub box_length: Scalar,
    pub cosmology: Cosmology,
    /// Amplitude of each displacement mode.
    pub amplitude: Scalar,
    /// Number of plane-wave modes in the displacement field.
    pub modes: usize,
    pub seed: u64,
}

impl Default for ZeldovichLattice {
    fn default() -> Self {
        ZeldovichLattice {
            n: 32,
            box_length: 100.,
            cosmology: Cosmology::default(),
            amplitude: 0.3,
            modes: 16,
            seed: 0,
        }
    }
}

impl ZeldovichLattice {
    fn spacing(&self) -> Scalar {
        self.box_length / self.n as Scalar
    }

    /// The lattice point nearest to `x`, with indices clamped to the lattice.
    pub fn nearest_lattice_point(&self, x: Vec3) -> Vec3 {
        let dx = self.spacing();
        let half = 0.5 * self.box_length;
        x.map(|c| {
            let i = ((c + half) / dx - 0.5).round();
            let i = i.max(0.).min(self.n as Scalar - 1.);
            (i + 0.5) * dx - half
        })
    }

    /// `a H (x - q)` for the nearest lattice point `q`.
    pub fn velocity(&self, x: Vec3) -> Vec3 {
        let factor = self.cosmology.a * self.cosmology.hubble();
        factor * (x - self.nearest_lattice_point(x))
    }

    /// Curl-free displacement field: a sum of longitudinal plane waves with wavelengths that fit
    /// the box, so it stays periodic.
    fn displacement_field(&self) -> Vec<(Vec3, Scalar)> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let k0 = 2. * PI / self.box_length;
        (0..self.modes)
            .map(|_| {
                let wave = loop {
                    let m = Vec3::new(
                        rng.gen_range(-3..=3) as Scalar,
                        rng.gen_range(-3..=3) as Scalar,
                        rng.gen_range(-3..=3) as Scalar,
                    );
                    if m != Vec3::zeros() {
                        break m * k0;
                    }
                };
                (wave, rng.gen_range(0. ..2. * PI))
            })
            .collect()
    }
}

impl InitialCondition for ZeldovichLattice {
    fn add_particles<S: Simulation>(&self, s: &mut S) {
        let dx = self.spacing();
        let half = 0.5 * self.box_length;
        let modes = self.displacement_field();

        for (i, j, k) in iproduct!(0..self.n, 0..self.n, 0..self.n) {
            let q = (Vector3::new(i, j, k).cast::<Scalar>() + Vec3::from_element(0.5)) * dx
                - Vec3::from_element(half);
            let psi: Vec3 = modes
                .iter()
                .map(|(wave, phase)| wave.normalize() * (self.amplitude * (wave.dot(&q) + phase).sin()))
                .sum();
            let x = q + psi;
            s.add_particle(x, self.cosmology.a * self.cosmology.hubble() * psi);
        }
    }
}
