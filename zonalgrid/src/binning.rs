//! Classification binning over ascending hazard-intensity thresholds
//!
//! `n` finite edges define `n + 1` right-open bins: values below the first
//! edge land in bin 0, values at or above the last edge in bin `n`.
//! Missing (NaN) cells belong to no bin.

use ndarray::Array2;

use crate::error::GridError;
use crate::grid::Grid;

/// Sentinel bin index for missing cells in an index grid.
pub const NO_BIN: i32 = -1;

/// Validated ascending class edges.
#[derive(Debug, Clone)]
pub struct ClassBins {
    edges: Vec<f64>,
}

impl ClassBins {
    /// Validates that `edges` is non-empty and strictly ascending.
    pub fn new(edges: Vec<f64>) -> Result<Self, GridError> {
        if edges.is_empty() || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GridError::NonAscendingEdges(edges));
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins, i.e. `edges.len() + 1` (the implicit upper bin is
    /// unbounded above).
    pub fn num_bins(&self) -> usize {
        self.edges.len() + 1
    }

    /// Bin index for a single value: the first `k` with `value < edges[k]`,
    /// or the top bin when no edge exceeds it. `None` for NaN.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        match self.edges.iter().position(|&e| value < e) {
            Some(k) => Some(k),
            None => Some(self.edges.len()),
        }
    }

    /// Bin every cell of a hazard grid, producing an index grid on the same
    /// georeferencing with [`NO_BIN`] for missing cells.
    pub fn bin_grid(&self, hazard: &Grid<f32>) -> Grid<i32> {
        let data: Array2<i32> = hazard.data().mapv(|v| {
            self.bin_index(v as f64)
                .map(|k| k as i32)
                .unwrap_or(NO_BIN)
        });
        // same_shape cannot fail: data was shaped by mapv over hazard
        hazard
            .same_shape(data)
            .unwrap_or_else(|_| unreachable!("mapv preserves shape"))
    }
}

/// Indicator grid for one class: 1.0 where the index grid equals `k`, NaN
/// elsewhere. Multiplying an exposure grid by the indicator keeps only the
/// cells falling in that class.
pub fn class_indicator(bins: &Grid<i32>, k: usize) -> Grid<f32> {
    let data: Array2<f32> = bins
        .data()
        .mapv(|b| if b == k as i32 { 1.0 } else { f32::NAN });
    bins.same_shape(data)
        .unwrap_or_else(|_| unreachable!("mapv preserves shape"))
}
