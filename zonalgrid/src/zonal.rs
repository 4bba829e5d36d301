//! Zonal statistics: aggregate grid cells inside each polygon of a zone set
//!
//! Cells are selected by an even-odd scanline fill at cell centres; with
//! `all_touched` every cell crossed by a ring segment is included as well,
//! matching the inclusive rule used for coarse exposure grids where border
//! cells carry real population. NaN cells never contribute.

use geo::{BoundingRect, MultiPolygon, Polygon};

use crate::error::GridError;
use crate::grid::Grid;
use crate::transform::GeoTransform;

/// Statistic computed per zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonalStat {
    Sum,
    Mean,
    Max,
}

impl std::str::FromStr for ZonalStat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown zonal statistic: {other}")),
        }
    }
}

/// Boolean cell mask over a rectangular window of a grid.
struct CellMask {
    row0: usize,
    col0: usize,
    rows: usize,
    cols: usize,
    bits: Vec<bool>,
}

impl CellMask {
    fn new(row0: usize, col0: usize, rows: usize, cols: usize) -> Self {
        Self {
            row0,
            col0,
            rows,
            cols,
            bits: vec![false; rows * cols],
        }
    }

    fn set(&mut self, row: i64, col: i64) {
        let (r0, c0) = (self.row0 as i64, self.col0 as i64);
        if row >= r0 && col >= c0 {
            let (r, c) = ((row - r0) as usize, (col - c0) as usize);
            if r < self.rows && c < self.cols {
                self.bits[r * self.cols + c] = true;
            }
        }
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (row0, col0, cols) = (self.row0, self.col0, self.cols);
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(move |(i, _)| (row0 + i / cols, col0 + i % cols))
    }
}

/// One statistic per polygon. `None` when a polygon covers no valid cell.
pub fn zonal_stats(
    zones: &[MultiPolygon],
    grid: &Grid<f32>,
    stat: ZonalStat,
    all_touched: bool,
) -> Result<Vec<Option<f64>>, GridError> {
    if !grid.transform().is_north_up() {
        return Err(GridError::RotatedTransform);
    }
    zones
        .iter()
        .map(|zone| zone_stat(zone, grid, stat, all_touched))
        .collect()
}

fn zone_stat(
    zone: &MultiPolygon,
    grid: &Grid<f32>,
    stat: ZonalStat,
    all_touched: bool,
) -> Result<Option<f64>, GridError> {
    let nodata = grid.nodata().map(|v| v as f32);
    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut max = f64::NEG_INFINITY;

    for polygon in &zone.0 {
        let Some(mask) = rasterize_polygon(polygon, grid.transform(), grid.rows(), grid.cols(), all_touched)
        else {
            continue;
        };
        for (row, col) in mask.cells() {
            let v = grid.data()[[row, col]];
            if v.is_nan() || Some(v) == nodata {
                continue;
            }
            let v = v as f64;
            sum += v;
            count += 1;
            if v > max {
                max = v;
            }
        }
    }

    if count == 0 {
        return Ok(None);
    }
    Ok(Some(match stat {
        ZonalStat::Sum => sum,
        ZonalStat::Mean => sum / count as f64,
        ZonalStat::Max => max,
    }))
}

/// Rasterize one polygon onto the grid, returning the touched-cell mask, or
/// `None` when its bounding box misses the grid entirely.
fn rasterize_polygon(
    polygon: &Polygon,
    gt: &GeoTransform,
    grid_rows: usize,
    grid_cols: usize,
    all_touched: bool,
) -> Option<CellMask> {
    let bbox = polygon.bounding_rect()?;

    // Pixel-space window of the bounding box, clamped to the grid and
    // padded one cell so ring segments lying exactly on a cell edge still
    // land inside the mask.
    let (r_a, c_a) = gt.world_to_pixel(bbox.min().x, bbox.min().y);
    let (r_b, c_b) = gt.world_to_pixel(bbox.max().x, bbox.max().y);
    let row_min = (r_a.min(r_b).floor() - 1.0).max(0.0) as usize;
    let col_min = (c_a.min(c_b).floor() - 1.0).max(0.0) as usize;
    let row_max = (r_a.max(r_b).ceil() as i64 + 1).min(grid_rows as i64) as usize;
    let col_max = (c_a.max(c_b).ceil() as i64 + 1).min(grid_cols as i64) as usize;
    if row_min >= row_max || col_min >= col_max {
        return None;
    }

    let mut mask = CellMask::new(row_min, col_min, row_max - row_min, col_max - col_min);

    let rings: Vec<&geo::LineString> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .collect();

    // Even-odd fill at cell-centre scanlines. Interior rings toggle parity,
    // so holes fall out of the fill without special casing.
    for row in row_min..row_max {
        let (_, y) = gt.cell_center(row, 0);
        let mut crossings: Vec<f64> = Vec::new();
        for ring in &rings {
            let coords = &ring.0;
            for w in coords.windows(2) {
                let (p, q) = (w[0], w[1]);
                if (p.y <= y) != (q.y <= y) {
                    let x = p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y);
                    crossings.push(x);
                }
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks(2) {
            if pair.len() < 2 {
                break;
            }
            let (_, c_start) = gt.world_to_pixel(pair[0], y);
            let (_, c_end) = gt.world_to_pixel(pair[1], y);
            let (c_start, c_end) = (c_start.min(c_end), c_start.max(c_end));
            // A cell is inside when its centre (col + 0.5) lies between the
            // crossing columns.
            let first = (c_start - 0.5).ceil().max(col_min as f64) as i64;
            let last = (c_end - 0.5).floor().min((col_max - 1) as f64) as i64;
            for col in first..=last {
                mask.set(row as i64, col);
            }
        }
    }

    if all_touched {
        for ring in &rings {
            for w in ring.0.windows(2) {
                let (r0, c0) = gt.world_to_pixel(w[0].x, w[0].y);
                let (r1, c1) = gt.world_to_pixel(w[1].x, w[1].y);
                supercover(r0, c0, r1, c1, |row, col| mask.set(row, col));
            }
        }
    }

    Some(mask)
}

/// Visit every cell a segment passes through (grid traversal in fractional
/// pixel coordinates).
fn supercover(r0: f64, c0: f64, r1: f64, c1: f64, mut visit: impl FnMut(i64, i64)) {
    let mut row = r0.floor() as i64;
    let mut col = c0.floor() as i64;
    let row_end = r1.floor() as i64;
    let col_end = c1.floor() as i64;

    let dr = r1 - r0;
    let dc = c1 - c0;
    let step_r: i64 = if dr > 0.0 { 1 } else { -1 };
    let step_c: i64 = if dc > 0.0 { 1 } else { -1 };

    // Parametric distance along the segment to the next row/col boundary.
    let mut t_max_r = if dr != 0.0 {
        let next = if dr > 0.0 { row as f64 + 1.0 } else { row as f64 };
        (next - r0) / dr
    } else {
        f64::INFINITY
    };
    let mut t_max_c = if dc != 0.0 {
        let next = if dc > 0.0 { col as f64 + 1.0 } else { col as f64 };
        (next - c0) / dc
    } else {
        f64::INFINITY
    };
    let t_delta_r = if dr != 0.0 { (1.0 / dr).abs() } else { f64::INFINITY };
    let t_delta_c = if dc != 0.0 { (1.0 / dc).abs() } else { f64::INFINITY };

    // Bounded by the cell count of the segment's bbox; guards against
    // floating-point stalls on degenerate segments.
    let max_steps = ((row - row_end).abs() + (col - col_end).abs() + 2) as usize;
    visit(row, col);
    for _ in 0..max_steps {
        if row == row_end && col == col_end {
            break;
        }
        if t_max_r < t_max_c {
            t_max_r += t_delta_r;
            row += step_r;
        } else {
            t_max_c += t_delta_c;
            col += step_c;
        }
        visit(row, col);
    }
}
