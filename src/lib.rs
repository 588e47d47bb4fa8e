//! Particle simulators built around a uniform cell list: a flat leapfrog with solid walls, a
//! PIC/FLIP fluid, and periodic P³M gravity (static and cosmological).

extern crate nalgebra as na;

pub mod config;
pub mod cosmology;
pub mod error;
pub mod flip;
pub mod gravity;
pub mod grid;
pub mod initial_condition;
pub mod p3m;
pub mod simulator;
pub mod snapshot;
pub mod statistics;
pub mod tensor;
pub mod util;
pub mod view;

pub use config::SimulationConfig;
pub use cosmology::{CosmologicalSimulator, Cosmology};
pub use error::SimulationError;
pub use flip::{FlipParameters, FlipSimulator, TransferScheme};
pub use gravity::GravitySimulator;
pub use grid::SpatialGrid;
pub use p3m::{P3mParameters, P3mSolver};
pub use simulator::Simulator;
pub use snapshot::Snapshot;

pub mod math {
    pub const DIM: usize = 3;

    pub type T = f64;
    pub type TV = na::SVector<T, DIM>;
    pub type IV = na::SVector<isize, DIM>;

    pub type Mat = na::SMatrix<T, DIM, DIM>;
}

pub type Scalar = math::T;
pub type Vec3 = math::TV;

/// Common interface of every time-stepping driver in the crate.
pub trait Simulation: Send {
    /// Advances the state by one time step.
    fn step(&mut self) -> Result<(), SimulationError>;

    /// Appends a particle. The new particle's id is its index.
    fn add_particle(&mut self, position: Vec3, velocity: Vec3);

    /// The shared particle state.
    fn base(&self) -> &Simulator;
}
