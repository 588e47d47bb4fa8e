use crate::Scalar;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Separable 3D transform over an `ng^3` periodic mesh stored x-fastest. Each pass runs a 1D
/// transform of length `ng` over every line along one axis.
///
/// Neither direction is normalized: a forward transform followed by an inverse one scales the
/// data by `ng^3`.
pub struct Fft3 {
    ng: usize,
    forward: Arc<dyn Fft<Scalar>>,
    inverse: Arc<dyn Fft<Scalar>>,
}

impl std::fmt::Debug for Fft3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft3").field("ng", &self.ng).finish()
    }
}

impl Fft3 {
    pub fn new(ng: usize) -> Self {
        let mut planner = FftPlanner::new();
        Fft3 {
            ng,
            forward: planner.plan_fft_forward(ng),
            inverse: planner.plan_fft_inverse(ng),
        }
    }

    pub fn forward(&self, data: &mut [Complex<Scalar>]) {
        self.transform(data, self.forward.as_ref());
    }

    pub fn inverse(&self, data: &mut [Complex<Scalar>]) {
        self.transform(data, self.inverse.as_ref());
    }

    fn transform(&self, data: &mut [Complex<Scalar>], fft: &dyn Fft<Scalar>) {
        let ng = self.ng;
        let plane = ng * ng;
        assert_eq!(data.len(), plane * ng, "mesh data has the wrong length");

        // x lines are contiguous
        data.par_chunks_mut(ng).for_each(|line| fft.process(line));

        // y lines have stride ng and never leave their z slab
        data.par_chunks_mut(plane).for_each(|slab| {
            let mut line = vec![Complex::new(0., 0.); ng];
            for x in 0..ng {
                for (y, value) in line.iter_mut().enumerate() {
                    *value = slab[x + y * ng];
                }
                fft.process(&mut line);
                for (y, value) in line.iter().enumerate() {
                    slab[x + y * ng] = *value;
                }
            }
        });

        // z lines have stride ng^2: gather every column, transform in parallel, scatter back
        let mut columns: Vec<Complex<Scalar>> = (0..plane)
            .flat_map(|xy| (0..ng).map(move |z| xy + z * plane))
            .map(|i| data[i])
            .collect();
        columns
            .par_chunks_mut(ng)
            .for_each(|column| fft.process(column));
        for (xy, column) in columns.chunks(ng).enumerate() {
            for (z, value) in column.iter().enumerate() {
                data[xy + z * plane] = *value;
            }
        }
    }
}
