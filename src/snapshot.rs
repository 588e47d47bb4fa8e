use crate::error::SimulationError;
use crate::simulator::Simulator;
use crate::{Scalar, Vec3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything needed to restart a [`Simulator`]: the clock, the gravity vector and the particle
/// arrays. Stored as MessagePack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub dt: Scalar,
    pub t: Scalar,
    pub count: usize,
    pub n: usize,
    pub gravity: Vec3,
    pub id: Vec<usize>,
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
}

impl Snapshot {
    pub fn capture(sim: &Simulator) -> Self {
        Snapshot {
            dt: sim.dt,
            t: sim.t,
            count: sim.count,
            n: sim.num_particles(),
            gravity: sim.gravity,
            id: sim.id.clone(),
            pos: sim.pos.clone(),
            vel: sim.vel.clone(),
        }
    }

    /// `snapshot_{count:010}.dat`, so that snapshots sort by step.
    pub fn file_name(count: usize) -> String {
        format!("snapshot_{:010}.dat", count)
    }

    /// Writes the snapshot into `directory`, creating it if needed, and returns the file path.
    pub fn save(&self, directory: &Path) -> Result<PathBuf, SimulationError> {
        std::fs::create_dir_all(directory).map_err(|source| SimulationError::Io {
            path: directory.to_owned(),
            source,
        })?;

        let path = directory.join(Self::file_name(self.count));
        let file = File::create(&path).map_err(|source| SimulationError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        rmp_serde::encode::write(&mut writer, self)?;
        writer.flush().map_err(|source| SimulationError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(?path, n = self.n, "saved snapshot");
        Ok(path)
    }

    /// Reads a snapshot, rejecting one whose arrays disagree with its particle count.
    pub fn load(path: &Path) -> Result<Self, SimulationError> {
        let file = File::open(path).map_err(|source| SimulationError::Io {
            path: path.to_owned(),
            source,
        })?;
        let snapshot: Snapshot = rmp_serde::decode::from_read(BufReader::new(file))?;

        if snapshot.id.len() != snapshot.n
            || snapshot.pos.len() != snapshot.n
            || snapshot.vel.len() != snapshot.n
        {
            return Err(SimulationError::CorruptSnapshot {
                reason: format!(
                    "{:?} declares {} particles but holds {} ids, {} positions and {} velocities",
                    path,
                    snapshot.n,
                    snapshot.id.len(),
                    snapshot.pos.len(),
                    snapshot.vel.len()
                ),
            });
        }
        Ok(snapshot)
    }

    /// Overwrites the clock, gravity and particles of `sim`. The grid is left to the next rebuild.
    pub fn restore(self, sim: &mut Simulator) {
        sim.dt = self.dt;
        sim.t = self.t;
        sim.count = self.count;
        sim.gravity = self.gravity;
        sim.id = self.id;
        sim.pos = self.pos;
        sim.vel = self.vel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Simulation;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("particle_sim_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sample() -> Simulator {
        let mut sim = Simulator::new(0.01, Vec3::new(0., 0., -100.));
        sim.add_particle(Vec3::new(1., 2., 3.), Vec3::new(-0.5, 0.25, 0.));
        sim.add_particle(Vec3::new(-4., 5.5, 6.), Vec3::new(0., 0., 1e-3));
        sim.step();
        sim.step();
        sim
    }

    #[test]
    fn save_then_load() {
        let dir = scratch_dir("round_trip");
        let sim = sample();
        let snapshot = Snapshot::capture(&sim);

        let path = snapshot.save(&dir.join("nested")).unwrap();
        assert!(path.ends_with("snapshot_0000000002.dat"));

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);

        let mut restored = Simulator::new(1., Vec3::zeros());
        loaded.restore(&mut restored);
        assert_eq!(restored.pos, sim.pos);
        assert_eq!(restored.vel, sim.vel);
        assert_eq!((restored.count, restored.t, restored.dt), (2, sim.t, 0.01));
        assert_eq!(restored.gravity, sim.gravity);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn inconsistent_lengths_are_rejected() {
        let dir = scratch_dir("corrupt");
        let mut snapshot = Snapshot::capture(&sample());
        snapshot.n = 3;
        let path = snapshot.save(&dir).unwrap();

        assert!(matches!(
            Snapshot::load(&path),
            Err(SimulationError::CorruptSnapshot { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = scratch_dir("missing");
        match Snapshot::load(&dir.join("nothing.dat")) {
            Err(SimulationError::Io { path, .. }) => assert!(path.ends_with("nothing.dat")),
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }
}
