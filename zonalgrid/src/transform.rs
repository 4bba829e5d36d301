//! Affine georeferencing between pixel and world coordinates
//!
//! Only axis-aligned (north-up) transforms are supported by the scanline
//! rasterizer; rotated grids are rejected at load time.

/// Affine transform mapping pixel (col, row) to world (x, y).
///
/// Same parameter layout as a GDAL geotransform:
/// `x = origin_x + col * pixel_width + row * rot_x`
/// `y = origin_y + col * rot_y + row * pixel_height`
/// with `pixel_height` negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub rot_x: f64,
    pub rot_y: f64,
}

impl GeoTransform {
    /// North-up transform from an origin (top-left corner) and cell sizes.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            rot_x: 0.0,
            rot_y: 0.0,
        }
    }

    /// True when the rotation/shear terms are zero.
    pub fn is_north_up(&self) -> bool {
        self.rot_x == 0.0 && self.rot_y == 0.0
    }

    /// World coordinates of the top-left corner of cell (row, col).
    pub fn pixel_to_world(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.rot_x;
        let y = self.origin_y + col * self.rot_y + row * self.pixel_height;
        (x, y)
    }

    /// World coordinates of the centre of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.pixel_to_world(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Fractional pixel coordinates (row, col) of a world point.
    ///
    /// Assumes a north-up transform; callers must check [`is_north_up`]
    /// before relying on the result.
    ///
    /// [`is_north_up`]: GeoTransform::is_north_up
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (y - self.origin_y) / self.pixel_height;
        (row, col)
    }

    /// True when two transforms describe the same gridding within a
    /// half-cell tolerance (used to skip resampling for aligned rasters).
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol_x = self.pixel_width.abs() * 0.5;
        let tol_y = self.pixel_height.abs() * 0.5;
        (self.origin_x - other.origin_x).abs() < tol_x
            && (self.origin_y - other.origin_y).abs() < tol_y
            && (self.pixel_width - other.pixel_width).abs() < 1e-9
            && (self.pixel_height - other.pixel_height).abs() < 1e-9
            && self.is_north_up()
            && other.is_north_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_world_roundtrip() {
        let gt = GeoTransform::north_up(10.0, 50.0, 0.1, -0.1);
        let (x, y) = gt.pixel_to_world(0.0, 0.0);
        assert_eq!((x, y), (10.0, 50.0));

        let (x, y) = gt.cell_center(0, 0);
        assert!((x - 10.05).abs() < 1e-12);
        assert!((y - 49.95).abs() < 1e-12);

        let (row, col) = gt.world_to_pixel(x, y);
        assert!((row - 0.5).abs() < 1e-9);
        assert!((col - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_approx_eq_tolerates_subcell_offsets() {
        let a = GeoTransform::north_up(0.0, 0.0, 1.0, -1.0);
        let b = GeoTransform::north_up(0.01, -0.01, 1.0, -1.0);
        let c = GeoTransform::north_up(0.9, 0.0, 1.0, -1.0);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }
}
