use crate::error::SimulationError;
use crate::Scalar;
use serde::{Deserialize, Serialize};

/// Configuration of the P³M gravity solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P3mParameters {
    /// Mesh resolution: number of PM cells along each axis.
    pub ng: usize,
    /// Side length of the periodic box.
    pub box_length: Scalar,
    /// Gravitational constant.
    pub g: Scalar,
    /// Ewald splitting parameter, in units of 1/length. Larger values move more of the force
    /// into the mesh.
    pub alpha: Scalar,
    /// Cutoff radius of the pairwise short-range correction.
    pub r_cut: Scalar,
}

impl P3mParameters {
    /// Derives the split from the mesh spacing `dx = L/ng`: the cutoff is `2.5 dx`, and
    /// `alpha = 3/r_cut` makes `erfc(alpha * r_cut)` about 0.001.
    pub fn new(ng: usize, box_length: Scalar, g: Scalar) -> Self {
        let dx = box_length / ng as Scalar;
        let r_cut = 2.5 * dx;
        let alpha = 3.0 / r_cut;
        P3mParameters {
            ng,
            box_length,
            g,
            alpha,
            r_cut,
        }
    }

    pub fn with_alpha(mut self, alpha: Scalar) -> Self {
        self.alpha = alpha;
        self
    }

    /// Overrides the cutoff. `alpha` is left alone.
    pub fn with_r_cut(mut self, r_cut: Scalar) -> Self {
        self.r_cut = r_cut;
        self
    }

    /// PM mesh spacing.
    pub fn dx(&self) -> Scalar {
        self.box_length / self.ng as Scalar
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.ng < 2 {
            return Err(SimulationError::config(format!(
                "mesh resolution must be at least 2, got {}",
                self.ng
            )));
        }
        if !(self.box_length > 0.) {
            return Err(SimulationError::config(format!(
                "box length must be positive, got {}",
                self.box_length
            )));
        }
        if !(self.alpha > 0.) || !(self.r_cut > 0.) {
            return Err(SimulationError::config(format!(
                "alpha and r_cut must be positive, got alpha = {} and r_cut = {}",
                self.alpha, self.r_cut
            )));
        }
        Ok(())
    }

    /// The PP stage only looks one cell around each particle, so that shell must reach `r_cut`:
    /// cells smaller than the cutoff would silently drop pairs between `h` and `r_cut`.
    pub fn validate_cell_size(&self, cell_size: Scalar) -> Result<(), SimulationError> {
        if !(cell_size >= self.r_cut) {
            return Err(SimulationError::config(format!(
                "neighbor grid cell size {} is smaller than the PP cutoff {}",
                cell_size, self.r_cut
            )));
        }
        Ok(())
    }
}

impl Default for P3mParameters {
    fn default() -> Self {
        Self::new(32, 100., 1.)
    }
}
