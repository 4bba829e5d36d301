//! Grid alignment by nearest-neighbour resampling
//!
//! Hazard rasters rarely share the exposure raster's gridding; before any
//! cellwise combination the hazard grid is resampled onto the target
//! transform and shape. Cross-CRS sources are rejected here; coordinate
//! reprojection is a separate concern layered on top by the caller.

use ndarray::Array2;

use crate::error::GridError;
use crate::grid::Grid;
use crate::transform::GeoTransform;

/// Resample `source` onto the target georeferencing (transform, shape, CRS)
/// by nearest-neighbour lookup. Target cells falling outside the source
/// extent become NaN. Declared-nodata source cells become NaN.
pub fn align_to(
    source: &Grid<f32>,
    target_transform: &GeoTransform,
    target_rows: usize,
    target_cols: usize,
    target_epsg: u32,
) -> Result<Grid<f32>, GridError> {
    if source.epsg() != target_epsg {
        return Err(GridError::CrsMismatch {
            source_epsg: source.epsg(),
            target: target_epsg,
        });
    }
    if !source.transform().is_north_up() || !target_transform.is_north_up() {
        return Err(GridError::RotatedTransform);
    }

    // Fast path: identical gridding, no resampling needed.
    if source.rows() == target_rows
        && source.cols() == target_cols
        && source.transform().approx_eq(target_transform)
    {
        let mut out = source.clone();
        if let Some(nd) = out.nodata() {
            let nd = nd as f32;
            for v in out.data_mut().iter_mut() {
                if *v == nd {
                    *v = f32::NAN;
                }
            }
        }
        return Ok(out.with_nodata(None));
    }

    let nodata = source.nodata().map(|v| v as f32);
    let src = source.data();
    let (src_rows, src_cols) = (source.rows() as i64, source.cols() as i64);

    let mut data = Array2::<f32>::from_elem((target_rows, target_cols), f32::NAN);
    for row in 0..target_rows {
        for col in 0..target_cols {
            let (x, y) = target_transform.cell_center(row, col);
            let (src_row, src_col) = source.transform().world_to_pixel(x, y);
            let (src_row, src_col) = (src_row.floor() as i64, src_col.floor() as i64);
            if src_row < 0 || src_col < 0 || src_row >= src_rows || src_col >= src_cols {
                continue;
            }
            let v = src[[src_row as usize, src_col as usize]];
            if v.is_nan() || Some(v) == nodata {
                continue;
            }
            data[[row, col]] = v;
        }
    }

    Grid::new(data, *target_transform, target_epsg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_fast_path_masks_nodata() {
        let g = Grid::new(
            array![[1.0f32, -9.0], [3.0, 4.0]],
            GeoTransform::north_up(0.0, 2.0, 1.0, -1.0),
            4326,
        )
        .unwrap()
        .with_nodata(Some(-9.0));
        let out = align_to(&g, g.transform(), 2, 2, 4326).unwrap();
        assert_eq!(out.data()[[0, 0]], 1.0);
        assert!(out.data()[[0, 1]].is_nan());
        assert_eq!(out.nodata(), None);
    }

    #[test]
    fn test_crs_mismatch_rejected() {
        let g = Grid::new(
            array![[1.0f32]],
            GeoTransform::north_up(0.0, 1.0, 1.0, -1.0),
            3857,
        )
        .unwrap();
        let gt = GeoTransform::north_up(0.0, 1.0, 1.0, -1.0);
        let err = align_to(&g, &gt, 1, 1, 4326).unwrap_err();
        assert!(matches!(err, GridError::CrsMismatch { source_epsg: 3857, target: 4326 }));
    }

    #[test]
    fn test_downsample_nearest() {
        // 4x4 source at cell size 1, target 2x2 at cell size 2: target cell
        // centres land on source cells (1,1), (1,3), (3,1), (3,3).
        let src = Grid::new(
            Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32),
            GeoTransform::north_up(0.0, 4.0, 1.0, -1.0),
            4326,
        )
        .unwrap();
        let target = GeoTransform::north_up(0.0, 4.0, 2.0, -2.0);
        let out = align_to(&src, &target, 2, 2, 4326).unwrap();
        assert_eq!(out.data()[[0, 0]], 5.0);
        assert_eq!(out.data()[[0, 1]], 7.0);
        assert_eq!(out.data()[[1, 0]], 13.0);
        assert_eq!(out.data()[[1, 1]], 15.0);
    }

    #[test]
    fn test_out_of_extent_cells_are_nan() {
        let src = Grid::new(
            array![[1.0f32]],
            GeoTransform::north_up(0.0, 1.0, 1.0, -1.0),
            4326,
        )
        .unwrap();
        // Target extends east of the source.
        let target = GeoTransform::north_up(0.0, 1.0, 1.0, -1.0);
        let out = align_to(&src, &target, 1, 3, 4326).unwrap();
        assert_eq!(out.data()[[0, 0]], 1.0);
        assert!(out.data()[[0, 1]].is_nan());
        assert!(out.data()[[0, 2]].is_nan());
    }
}
