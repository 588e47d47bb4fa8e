//! Run configuration read by the binary: which driver to build, how to seed it with particles,
//! and how long to run.

use crate::cosmology::{CosmologicalSimulator, Cosmology};
use crate::error::SimulationError;
use crate::flip::{FlipParameters, FlipSimulator};
use crate::gravity::GravitySimulator;
use crate::initial_condition::{Block, InitialCondition, Sphere, ZeldovichLattice};
use crate::p3m::{P3mParameters, P3mSolver};
use crate::simulator::Simulator;
use crate::snapshot::Snapshot;
use crate::view::inverse_rotation;
use crate::{Scalar, Simulation, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scenario {
    Flip(FlipParameters),
    Gravity(P3mParameters),
    Cosmological {
        p3m: P3mParameters,
        cosmology: Cosmology,
    },
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::Flip(FlipParameters::default())
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Flip(_) => write!(f, "Flip"),
            Scenario::Gravity(_) => write!(f, "Gravity"),
            Scenario::Cosmological { .. } => write!(f, "Cosmological"),
        }
    }
}

/// Where the particles come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParticleSource {
    Block(Block),
    Sphere(Sphere),
    Zeldovich(ZeldovichLattice),
    /// Restart from a saved snapshot, clock included.
    Snapshot(PathBuf),
}

impl Default for ParticleSource {
    fn default() -> Self {
        ParticleSource::Block(Block::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scenario: Scenario,
    pub initial_condition: ParticleSource,
    pub dt: Scalar,
    pub gravity: Vec3,
    pub steps: usize,
    /// Steps between snapshots. Zero disables them.
    pub save_interval: usize,
    pub output_dir: Option<PathBuf>,
    /// Worker threads. `None` uses one per hardware thread.
    pub threads: Option<usize>,
    /// Angular velocity of the camera, in radians per unit time. Gravity turns against it so it
    /// stays fixed on screen.
    pub view_spin: Vec3,
    /// Cosmological runs end once the redshift has fallen to this value, even if steps remain.
    pub stop_redshift: Scalar,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            scenario: Scenario::default(),
            initial_condition: ParticleSource::default(),
            dt: 0.01,
            gravity: Vec3::new(0., 0., -100.),
            steps: 600,
            save_interval: 10,
            output_dir: None,
            threads: None,
            view_spin: Vec3::zeros(),
            stop_redshift: 0.,
        }
    }
}

impl SimulationConfig {
    pub fn from_json(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.dt > 0.) {
            return Err(SimulationError::config(format!(
                "time step must be positive, got {}",
                self.dt
            )));
        }
        if self.threads == Some(0) {
            return Err(SimulationError::config("thread count must be at least 1"));
        }
        match &self.scenario {
            Scenario::Flip(params) => params.validate(),
            Scenario::Gravity(p3m) | Scenario::Cosmological { p3m, .. } => p3m.validate(),
        }
    }

    /// The gravity vector at time `t`, rotated with the camera.
    pub fn gravity_at(&self, t: Scalar) -> Vec3 {
        inverse_rotation(self.view_spin * t) * self.gravity
    }

    /// Whether `driver` has run its course before the step budget: a cosmological run that has
    /// reached `stop_redshift`.
    pub fn is_finished(&self, driver: &Driver) -> bool {
        driver
            .cosmology()
            .map_or(false, |cosmology| cosmology.z() <= self.stop_redshift)
    }

    /// Builds the driver named by the scenario and fills it with particles.
    pub fn build(&self) -> Result<Driver, SimulationError> {
        self.validate()?;

        let mut base = Simulator::new(self.dt, self.gravity);
        match &self.initial_condition {
            ParticleSource::Block(block) => block.add_particles(&mut base),
            ParticleSource::Sphere(sphere) => sphere.add_particles(&mut base),
            ParticleSource::Zeldovich(lattice) => lattice.add_particles(&mut base),
            ParticleSource::Snapshot(path) => Snapshot::load(path)?.restore(&mut base),
        }

        Ok(match &self.scenario {
            Scenario::Flip(params) => Driver::Flip(FlipSimulator::new(base, params.clone())?),
            Scenario::Gravity(p3m) => Driver::Gravity(GravitySimulator::new(base, p3m.clone())?),
            Scenario::Cosmological { p3m, cosmology } => Driver::Cosmological(
                CosmologicalSimulator::new(base, *cosmology, p3m.clone())?,
            ),
        })
    }
}

/// One of the time-stepping drivers, as built from a [`SimulationConfig`].
#[derive(Debug)]
pub enum Driver {
    Flip(FlipSimulator),
    Gravity(GravitySimulator),
    Cosmological(CosmologicalSimulator),
}

impl Driver {
    pub fn simulation(&self) -> &dyn Simulation {
        match self {
            Driver::Flip(s) => s,
            Driver::Gravity(s) => s,
            Driver::Cosmological(s) => s,
        }
    }

    pub fn simulation_mut(&mut self) -> &mut dyn Simulation {
        match self {
            Driver::Flip(s) => s,
            Driver::Gravity(s) => s,
            Driver::Cosmological(s) => s,
        }
    }

    pub fn base_mut(&mut self) -> &mut Simulator {
        match self {
            Driver::Flip(s) => s.base_mut(),
            Driver::Gravity(s) => s.base_mut(),
            Driver::Cosmological(s) => s.base_mut(),
        }
    }

    pub fn solver(&self) -> Option<&P3mSolver> {
        match self {
            Driver::Flip(_) => None,
            Driver::Gravity(s) => Some(s.solver()),
            Driver::Cosmological(s) => Some(s.solver()),
        }
    }

    pub fn cosmology(&self) -> Option<&Cosmology> {
        match self {
            Driver::Cosmological(s) => Some(s.cosmology()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn empty_json_gives_the_defaults() {
        let config = SimulationConfig::from_json(b"{}").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.scenario.to_string(), "Flip");
    }

    #[test]
    fn parses_a_cosmological_run() {
        let json = br#"{
            "scenario": {
                "Cosmological": {
                    "p3m": { "ng": 8, "box_length": 100.0, "g": 1.0, "alpha": 0.12, "r_cut": 25.0 },
                    "cosmology": { "a": 0.02, "z": 49.0, "omega_m": 0.3, "omega_l": 0.7 }
                }
            },
            "initial_condition": {
                "Zeldovich": {
                    "n": 4, "box_length": 100.0, "amplitude": 0.5, "modes": 3, "seed": 7,
                    "cosmology": { "a": 0.02, "z": 49.0, "omega_m": 0.3, "omega_l": 0.7 }
                }
            },
            "dt": 0.001,
            "gravity": [0.0, 0.0, 0.0],
            "steps": 3,
            "threads": 2
        }"#;
        let config = SimulationConfig::from_json(json).unwrap();
        assert_eq!(config.steps, 3);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.save_interval, 10);

        let mut driver = config.build().unwrap();
        assert_eq!(driver.simulation().base().num_particles(), 64);
        assert_eq!(driver.cosmology().map(|c| c.a), Some(0.02));
        assert!(driver.solver().is_some());

        driver.simulation_mut().step().unwrap();
        assert_eq!(driver.simulation().base().count, 1);
        assert!(driver.cosmology().unwrap().a > 0.02);
    }

    fn cosmological_config(cosmology: Cosmology, stop_redshift: Scalar) -> SimulationConfig {
        SimulationConfig {
            scenario: Scenario::Cosmological {
                p3m: P3mParameters::new(4, 100., 1.),
                cosmology,
            },
            initial_condition: ParticleSource::Zeldovich(ZeldovichLattice {
                n: 2,
                modes: 2,
                ..ZeldovichLattice::default()
            }),
            dt: 1e-3,
            gravity: Vec3::zeros(),
            stop_redshift,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn cosmological_runs_stop_at_the_final_redshift() {
        let today = cosmological_config(Cosmology::from_redshift(0., 0.3, 0.7), 0.);
        assert!(today.is_finished(&today.build().unwrap()));

        let config = cosmological_config(Cosmology::default(), 45.);
        let mut driver = config.build().unwrap();
        assert!(!config.is_finished(&driver));

        let mut steps = 0;
        while !config.is_finished(&driver) {
            driver.simulation_mut().step().unwrap();
            steps += 1;
            assert!(steps < 100);
        }
        let z = driver.cosmology().unwrap().z();
        assert!(z <= 45. && z > 30.);
    }

    #[test]
    fn only_cosmological_runs_finish_early() {
        let config = SimulationConfig {
            stop_redshift: 1e9,
            initial_condition: ParticleSource::Sphere(Sphere {
                num_particles: 10,
                ..Sphere::default()
            }),
            ..SimulationConfig::default()
        };
        assert!(!config.is_finished(&config.build().unwrap()));
    }

    #[test]
    fn builds_a_gravity_run_from_a_sphere() {
        let config = SimulationConfig {
            scenario: Scenario::Gravity(P3mParameters::new(8, 100., 1.)),
            initial_condition: ParticleSource::Sphere(Sphere {
                num_particles: 50,
                center: Vec3::zeros(),
                radius: 10.,
            }),
            gravity: Vec3::zeros(),
            ..SimulationConfig::default()
        };
        let mut driver = config.build().unwrap();
        assert!(driver.cosmology().is_none());
        driver.simulation_mut().step().unwrap();
        assert_eq!(driver.base_mut().num_particles(), 50);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let zero_dt = SimulationConfig {
            dt: 0.,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            zero_dt.build(),
            Err(SimulationError::InvalidConfiguration { .. })
        ));

        let no_threads = SimulationConfig {
            threads: Some(0),
            ..SimulationConfig::default()
        };
        assert!(no_threads.validate().is_err());

        let tiny_mesh = SimulationConfig {
            scenario: Scenario::Gravity(P3mParameters::new(1, 100., 1.)),
            ..SimulationConfig::default()
        };
        assert!(tiny_mesh.validate().is_err());
    }

    #[test]
    fn gravity_turns_against_the_camera() {
        let config = SimulationConfig {
            gravity: Vec3::new(0., 0., -1.),
            view_spin: Vec3::new(PI / 2., 0., 0.),
            ..SimulationConfig::default()
        };
        assert_eq!(config.gravity_at(0.), Vec3::new(0., 0., -1.));
        // Rx(-pi/2) takes -z to -y
        assert!((config.gravity_at(1.) - Vec3::new(0., -1., 0.)).norm() < 1e-12);
    }
}
