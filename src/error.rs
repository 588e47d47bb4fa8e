use crate::Vec3;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum SimulationError {
    /// A solver or simulator was configured with parameters it cannot work with.
    InvalidConfiguration { reason: String },
    /// A particle left the bounded region covered by the spatial grid.
    OutOfRegion { index: usize, position: Vec3 },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
    CorruptSnapshot { reason: String },
}

impl SimulationError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        SimulationError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {}", reason)
            }
            SimulationError::OutOfRegion { index, position } => write!(
                f,
                "particle {} at ({}, {}, {}) is outside the grid region",
                index, position.x, position.y, position.z
            ),
            SimulationError::Io { path, .. } => write!(f, "I/O error on {:?}", path),
            SimulationError::Encode(_) => write!(f, "failed to encode snapshot"),
            SimulationError::Decode(_) => write!(f, "failed to decode snapshot"),
            SimulationError::CorruptSnapshot { reason } => {
                write!(f, "corrupt snapshot: {}", reason)
            }
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Io { source, .. } => Some(source),
            SimulationError::Encode(e) => Some(e),
            SimulationError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rmp_serde::encode::Error> for SimulationError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SimulationError::Encode(e)
    }
}

impl From<rmp_serde::decode::Error> for SimulationError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SimulationError::Decode(e)
    }
}
