//! Georeferenced 2-D grid backed by `ndarray`

use ndarray::Array2;

use crate::error::GridError;
use crate::transform::GeoTransform;

/// A single-band raster grid with georeferencing metadata.
///
/// Cell values are stored row-major, row 0 being the northern edge for
/// north-up transforms. Missing cells are `NaN` for floating grids; an
/// explicit sentinel for integer grids is the caller's concern.
#[derive(Debug, Clone)]
pub struct Grid<T> {
    data: Array2<T>,
    transform: GeoTransform,
    epsg: u32,
    nodata: Option<f64>,
}

impl<T> Grid<T> {
    pub fn new(data: Array2<T>, transform: GeoTransform, epsg: u32) -> Result<Self, GridError> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(GridError::EmptyGrid);
        }
        Ok(Self {
            data,
            transform,
            epsg,
            nodata: None,
        })
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn into_data(self) -> Array2<T> {
        self.data
    }

    /// True when `other` shares this grid's shape, transform and CRS, so
    /// cellwise operations between the two are meaningful.
    pub fn is_aligned_with<U>(&self, other: &Grid<U>) -> bool {
        self.rows() == other.rows()
            && self.cols() == other.cols()
            && self.epsg == other.epsg
            && self.transform.approx_eq(&other.transform)
    }

    /// Build a new grid on the same georeferencing with different cell data.
    pub fn same_shape<U>(&self, data: Array2<U>) -> Result<Grid<U>, GridError> {
        if data.nrows() != self.rows() || data.ncols() != self.cols() {
            return Err(GridError::ShapeMismatch {
                expected_rows: self.rows(),
                expected_cols: self.cols(),
                rows: data.nrows(),
                cols: data.ncols(),
            });
        }
        Ok(Grid {
            data,
            transform: self.transform,
            epsg: self.epsg,
            nodata: None,
        })
    }
}

impl Grid<f32> {
    /// Replace the declared nodata value (and any negative cell) with `fill`,
    /// clearing the nodata marker. Used to normalise exposure rasters where
    /// "no people" and "nodata" both mean zero contribution.
    pub fn normalize_nodata(&mut self, fill: f32) {
        if let Some(nd) = self.nodata {
            let nd = nd as f32;
            for v in self.data.iter_mut() {
                if *v == nd || v.is_nan() || *v < 0.0 {
                    *v = fill;
                }
            }
        } else {
            for v in self.data.iter_mut() {
                if v.is_nan() || *v < 0.0 {
                    *v = fill;
                }
            }
        }
        self.nodata = None;
    }

    /// Set every cell at or below `threshold` (and every declared-nodata
    /// cell) to NaN. Hazard grids use NaN as the single missing marker
    /// downstream.
    pub fn mask_at_or_below(&mut self, threshold: f32) {
        let nd = self.nodata.map(|v| v as f32);
        for v in self.data.iter_mut() {
            if v.is_nan() || *v <= threshold || Some(*v) == nd {
                *v = f32::NAN;
            }
        }
        self.nodata = None;
    }

    /// Apply `f` to every valid cell, leaving NaN cells NaN.
    pub fn map_valid(&self, f: impl Fn(f32) -> f32) -> Grid<f32> {
        let data = self.data.mapv(|v| if v.is_nan() { f32::NAN } else { f(v) });
        Grid {
            data,
            transform: self.transform,
            epsg: self.epsg,
            nodata: None,
        }
    }

    /// Cellwise product where `mask` is valid (> 0 and not NaN), NaN elsewhere.
    ///
    /// This is the "affected exposure" operation: exposure cells count only
    /// where the (already thresholded) hazard grid has a positive value.
    pub fn where_positive(&self, mask: &Grid<f32>) -> Result<Grid<f32>, GridError> {
        if self.rows() != mask.rows() || self.cols() != mask.cols() {
            return Err(GridError::ShapeMismatch {
                expected_rows: self.rows(),
                expected_cols: self.cols(),
                rows: mask.rows(),
                cols: mask.cols(),
            });
        }
        let mut data = self.data.clone();
        for (v, m) in data.iter_mut().zip(mask.data.iter()) {
            if !(*m > 0.0) {
                *v = f32::NAN;
            }
        }
        Ok(Grid {
            data,
            transform: self.transform,
            epsg: self.epsg,
            nodata: None,
        })
    }

    /// Cellwise product, NaN-propagating.
    pub fn multiply(&self, other: &Grid<f32>) -> Result<Grid<f32>, GridError> {
        if self.rows() != other.rows() || self.cols() != other.cols() {
            return Err(GridError::ShapeMismatch {
                expected_rows: self.rows(),
                expected_cols: self.cols(),
                rows: other.rows(),
                cols: other.cols(),
            });
        }
        let mut data = self.data.clone();
        for (v, o) in data.iter_mut().zip(other.data.iter()) {
            *v *= *o;
        }
        Ok(Grid {
            data,
            transform: self.transform,
            epsg: self.epsg,
            nodata: None,
        })
    }

    /// Count of non-NaN cells.
    pub fn valid_cells(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid(data: Array2<f32>) -> Grid<f32> {
        Grid::new(data, GeoTransform::north_up(0.0, 2.0, 1.0, -1.0), 4326).unwrap()
    }

    #[test]
    fn test_empty_grid_rejected() {
        let r = Grid::new(Array2::<f32>::zeros((0, 4)), GeoTransform::north_up(0.0, 0.0, 1.0, -1.0), 4326);
        assert!(matches!(r, Err(GridError::EmptyGrid)));
    }

    #[test]
    fn test_normalize_nodata_fills_negatives_and_sentinel() {
        let mut g = grid(array![[-9999.0, 1.0], [-0.5, f32::NAN]]).with_nodata(Some(-9999.0));
        g.normalize_nodata(0.0);
        assert_eq!(g.data()[[0, 0]], 0.0);
        assert_eq!(g.data()[[0, 1]], 1.0);
        assert_eq!(g.data()[[1, 0]], 0.0);
        assert_eq!(g.data()[[1, 1]], 0.0);
        assert_eq!(g.nodata(), None);
    }

    #[test]
    fn test_mask_at_or_below_is_inclusive() {
        let mut g = grid(array![[0.5, 0.51], [0.0, 2.0]]);
        g.mask_at_or_below(0.5);
        assert!(g.data()[[0, 0]].is_nan());
        assert_eq!(g.data()[[0, 1]], 0.51);
        assert!(g.data()[[1, 0]].is_nan());
        assert_eq!(g.data()[[1, 1]], 2.0);
    }

    #[test]
    fn test_where_positive_masks_nan_and_nonpositive() {
        let exp = grid(array![[10.0, 20.0], [30.0, 40.0]]);
        let haz = grid(array![[1.0, f32::NAN], [0.0, 2.0]]);
        let affected = exp.where_positive(&haz).unwrap();
        assert_eq!(affected.data()[[0, 0]], 10.0);
        assert!(affected.data()[[0, 1]].is_nan());
        assert!(affected.data()[[1, 0]].is_nan());
        assert_eq!(affected.data()[[1, 1]], 40.0);
    }

    #[test]
    fn test_map_valid_propagates_nan() {
        let g = grid(array![[1.0, f32::NAN]]);
        let h = g.map_valid(|v| v * 2.0);
        assert_eq!(h.data()[[0, 0]], 2.0);
        assert!(h.data()[[0, 1]].is_nan());
    }

    #[test]
    fn test_alignment_predicate() {
        let a = grid(array![[1.0, 2.0], [3.0, 4.0]]);
        let b = a.map_valid(|v| v);
        assert!(a.is_aligned_with(&b));

        let shifted = Grid::new(
            array![[1.0f32, 2.0], [3.0, 4.0]],
            GeoTransform::north_up(5.0, 2.0, 1.0, -1.0),
            4326,
        )
        .unwrap();
        assert!(!a.is_aligned_with(&shifted));
    }
}
