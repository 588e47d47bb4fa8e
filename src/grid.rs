use crate::error::SimulationError;
use crate::math::IV;
use crate::{Scalar, Vec3};
use itertools::iproduct;
use num::ToPrimitive;
use smallvec::SmallVec;
use std::ops::Index;

/// Represents a single grid cell. A grid cell contains the indices of the particles within it.
///
/// A `SmallVec` is used to prevent unnecessary allocation.
type GridCell = SmallVec<[usize; 4]>;

/// A uniform cell list over the cube `[-L/2, L/2]^3`, used to find the particles within one
/// cell of each other.
///
/// The grid stores particle *indices*, never references, so it can be rebuilt or dropped
/// independently of the particle arrays it was built from.
#[derive(Debug, Clone, Default)]
pub struct SpatialGrid {
    pub(crate) cells: Vec<GridCell>,
    /// The cell coordinate of every particle at the last rebuild.
    particle_cells: Vec<IV>,
    /// Number of cells along each axis.
    n: usize,
    region_size: Scalar,
    cell_size: Scalar,
}

impl SpatialGrid {
    /// Cells per axis for a region of side `region_size`: `floor(L/h) + 1`, so that a particle
    /// sitting exactly on the upper face still has a cell.
    pub fn cells_per_axis(region_size: Scalar, cell_size: Scalar) -> usize {
        (region_size / cell_size).floor() as usize + 1
    }

    /// Builds a grid from scratch. See [`SpatialGrid::rebuild`].
    pub fn build(
        positions: &[Vec3],
        region_size: Scalar,
        cell_size: Scalar,
    ) -> Result<Self, SimulationError> {
        let mut grid = SpatialGrid::default();
        grid.rebuild(positions, region_size, cell_size)?;
        Ok(grid)
    }

    /// Discards the previous contents and bins every particle into the cell
    /// `floor((x + L/2) / h)` along each axis.
    pub fn rebuild(
        &mut self,
        positions: &[Vec3],
        region_size: Scalar,
        cell_size: Scalar,
    ) -> Result<(), SimulationError> {
        if !(region_size > 0.) || !(cell_size > 0.) {
            return Err(SimulationError::config(format!(
                "grid needs a positive region size and cell size, got L = {} and h = {}",
                region_size, cell_size
            )));
        }

        let n = Self::cells_per_axis(region_size, cell_size);
        if self.n != n || self.cells.len() != n * n * n {
            self.cells = vec![GridCell::new(); n * n * n];
        } else {
            self.cells.iter_mut().for_each(|cell| cell.clear());
        }

        self.n = n;
        self.region_size = region_size;
        self.cell_size = cell_size;
        self.particle_cells.clear();
        self.particle_cells.reserve(positions.len());

        for (index, &position) in positions.iter().enumerate() {
            let coord = self
                .position_to_coord(position)
                .ok_or(SimulationError::OutOfRegion { index, position })?;
            let cell = self.coord_to_index(coord);
            self.cells[cell].push(index);
            self.particle_cells.push(coord);
        }

        Ok(())
    }

    /// Converts a position to its cell coordinate, or `None` if it falls outside the grid.
    pub fn position_to_coord(&self, position: Vec3) -> Option<IV> {
        let half = 0.5 * self.region_size;
        let mut coord = IV::zeros();
        for axis in 0..3 {
            let c = ((position[axis] + half) / self.cell_size).floor().to_isize()?;
            if c < 0 || c >= self.n as isize {
                return None;
            }
            coord[axis] = c;
        }
        Some(coord)
    }

    fn coord_to_index(&self, i: IV) -> usize {
        let n = self.n as isize;
        (i.x + n * i.y + n * n * i.z) as usize
    }

    /// Number of cells along each axis.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn cell_size(&self) -> Scalar {
        self.cell_size
    }

    pub fn region_size(&self) -> Scalar {
        self.region_size
    }

    /// Number of particles binned at the last rebuild.
    pub fn num_particles(&self) -> usize {
        self.particle_cells.len()
    }

    /// The cell coordinate particle `i` was binned into.
    pub fn particle_cell(&self, i: usize) -> IV {
        self.particle_cells[i]
    }

    /// All particles in the 3x3x3 block of cells around particle `i`, excluding `i` itself.
    ///
    /// Without `periodic`, cells outside the grid are skipped. With `periodic`, cell coordinates
    /// wrap around. Because the last cell along each axis is a partial one (the grid has
    /// `floor(L/h) + 1` cells), a particle in the first cell or the second to last cell looks one
    /// extra cell further across the wrap so that it still sees a full cell width of neighbors
    /// on that side. Each wrapped cell is visited once even if the window covers it twice.
    pub fn neighbors(&self, i: usize, periodic: bool) -> Vec<usize> {
        let coord = self.particle_cells[i];
        let mut indices: Vec<usize> = if periodic {
            let [xs, ys, zs] = [0, 1, 2].map(|axis| self.periodic_window(coord[axis]));
            iproduct!(xs.iter(), ys.iter(), zs.iter())
                .flat_map(|(&x, &y, &z)| self.cells[self.coord_to_index(IV::new(x, y, z))].iter())
                .copied()
                .collect()
        } else {
            let n = self.n as isize;
            iproduct!(
                coord.x - 1..=coord.x + 1,
                coord.y - 1..=coord.y + 1,
                coord.z - 1..=coord.z + 1
            )
            .filter(|&(x, y, z)| (0..n).contains(&x) && (0..n).contains(&y) && (0..n).contains(&z))
            .flat_map(|(x, y, z)| self.cells[self.coord_to_index(IV::new(x, y, z))].iter())
            .copied()
            .collect()
        };

        if let Some(position) = indices.iter().position(|&j| j == i) {
            indices.remove(position);
        }
        indices
    }

    /// The wrapped, de-duplicated cell coordinates along one axis searched for a particle in
    /// cell `c`.
    fn periodic_window(&self, c: isize) -> SmallVec<[isize; 4]> {
        let n = self.n as isize;
        let lower = if c == 0 { 2 } else { 1 };
        let upper = if c == n - 2 { 2 } else { 1 };

        let mut window = SmallVec::new();
        for offset in c - lower..=c + upper {
            let wrapped = offset.rem_euclid(n);
            if !window.contains(&wrapped) {
                window.push(wrapped);
            }
        }
        window
    }
}

impl Index<IV> for SpatialGrid {
    type Output = GridCell;

    fn index(&self, i: IV) -> &Self::Output {
        let n = self.n as isize;
        if (0..3).any(|axis| i[axis] < 0 || i[axis] >= n) {
            panic!("Attempted to get index out of bounds: {:?}", i);
        }
        &self.cells[self.coord_to_index(i)]
    }
}
