use cascore::algorithm::sinus_fit::{Contrast, MinimizerSettings};
use cascore::layout::pad::Region;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::data::tof::TofData;

/// Contrast and phase per pixel block of one foil.
#[derive(Clone, Debug)]
pub struct ContrastMap {
    pub foil: i32,
    pub block: [usize; 2],
    pub columns: usize,
    pub rows: usize,
    /// Row-major, `None` where the block could not be summed or the fit failed.
    pub values: Vec<Option<Contrast>>,
}

impl ContrastMap {
    pub fn get(&self, column: usize, row: usize) -> Option<&Contrast> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.values[row * self.columns + column].as_ref()
    }

    /// Number of blocks with a successful fit.
    pub fn fitted(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Mean contrast over all successful fits.
    pub fn mean_contrast(&self) -> Option<f64> {
        let fitted = self.fitted();
        if fitted == 0 {
            return None;
        }
        let sum: f64 = self.values.iter().flatten().map(|c| c.contrast).sum();
        Some(sum / fitted as f64)
    }
}

/// Fits every `block[0] x block[1]` pixel block of a foil in parallel.
///
/// Blocks at the right and bottom border are cut at the frame edge, a block size of 0 is
/// treated as 1.
///
/// # Arguments
///
/// * `data` - TOF block to evaluate
/// * `foil` - foil index, clamped into range
/// * `block` - block size `[x, y]` in pixels
/// * `settings` - minimizer tuning
/// * `num_threads` - size of the worker pool
///
/// # Returns
///
/// * a `ContrastMap` with one entry per block
pub fn contrast_map(
    data: &TofData,
    foil: i32,
    block: [usize; 2],
    settings: &MinimizerSettings,
    num_threads: usize,
) -> ContrastMap {
    let block = [block[0].max(1), block[1].max(1)];
    let columns = data.layout().image_width().div_ceil(block[0]);
    let rows = data.layout().image_height().div_ceil(block[1]);

    let compute = || {
        (0..columns * rows)
            .into_par_iter()
            .map(|index| {
                let (column, row) = (index % columns, index / columns);
                let region = Region::new(
                    (column * block[0]) as i32,
                    ((column + 1) * block[0]) as i32,
                    (row * block[1]) as i32,
                    ((row + 1) * block[1]) as i32,
                );
                data.roi_histogram(foil, region).and_then(|histogram| histogram.contrast(settings)).ok()
            })
            .collect::<Vec<_>>()
    };

    let values = match ThreadPoolBuilder::new().num_threads(num_threads).build() {
        Ok(pool) => pool.install(compute),
        Err(_) => compute(),
    };

    ContrastMap { foil, block, columns, rows, values }
}
