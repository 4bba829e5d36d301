//! Single-band GeoTIFF reading and writing
//!
//! Only the tags the engine needs are handled: ModelPixelScale (33550) +
//! ModelTiepoint (33922) or ModelTransformation (34264) for the transform,
//! the GeoKey directory (34735) for the EPSG code, and GDAL_NODATA (42113).
//! Sample data of any integer or float format is normalised to `f32`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::GridError;
use crate::grid::Grid;
use crate::transform::GeoTransform;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_GEOGRAPHIC_TYPE: u64 = 2048;
const KEY_PROJECTED_CS_TYPE: u64 = 3072;

/// Read a single-band GeoTIFF into a `Grid<f32>`.
pub fn read(path: &Path) -> Result<Grid<f32>, GridError> {
    let name = path.display().to_string();
    let file = File::open(path)?;
    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| GridError::tiff(&name, e))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| GridError::tiff(&name, e))?;

    let transform = read_transform(&mut decoder)
        .ok_or_else(|| GridError::MissingGeoreference(name.clone()))?;
    let epsg = read_epsg(&mut decoder).unwrap_or_else(|| {
        debug!(file = %name, "no GeoKey directory, assuming EPSG:4326");
        4326
    });
    let nodata = read_nodata(&mut decoder);

    let image = decoder
        .read_image()
        .map_err(|e| GridError::tiff(&name, e))?;
    let values = decode_to_f32(image, &name)?;
    if values.len() != (width as usize) * (height as usize) {
        return Err(GridError::UnsupportedSampleFormat {
            file: name,
            format: "multi-band images are not supported".to_string(),
        });
    }

    let data = Array2::from_shape_vec((height as usize, width as usize), values)
        .map_err(|e| GridError::tiff(&name, e))?;
    Ok(Grid::new(data, transform, epsg)?.with_nodata(nodata))
}

/// Write a `Grid<f32>` as a Gray32Float GeoTIFF with georeferencing tags.
pub fn write(path: &Path, grid: &Grid<f32>) -> Result<(), GridError> {
    let name = path.display().to_string();
    let file = File::create(path)?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(|e| GridError::tiff(&name, e))?;

    let gt = grid.transform();
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(grid.cols() as u32, grid.rows() as u32)
        .map_err(|e| GridError::tiff(&name, e))?;

    let scale = [gt.pixel_width.abs(), gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    // Minimal GeoKey directory: version 1.1.0, one key carrying the EPSG code.
    let key = if grid.epsg() == 4326 {
        KEY_GEOGRAPHIC_TYPE as u16
    } else {
        KEY_PROJECTED_CS_TYPE as u16
    };
    let geokeys: [u16; 8] = [1, 1, 0, 1, key, 0, 1, grid.epsg() as u16];

    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| GridError::tiff(&name, e))?;
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| GridError::tiff(&name, e))?;
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| GridError::tiff(&name, e))?;
    if let Some(nd) = grid.nodata() {
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_GDAL_NODATA), format!("{nd}").as_str())
            .map_err(|e| GridError::tiff(&name, e))?;
    }

    let flat: Vec<f32> = grid.data().iter().copied().collect();
    image
        .write_data(&flat)
        .map_err(|e| GridError::tiff(&name, e))?;
    Ok(())
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder
        .find_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok());
    let tiepoint = decoder
        .find_tag(Tag::Unknown(TAG_MODEL_TIEPOINT))
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok());

    if let (Some(scale), Some(tie)) = (scale, tiepoint) {
        if scale.len() >= 2 && tie.len() >= 6 {
            let (sx, sy) = (scale[0], scale[1]);
            // Tiepoint maps raster (i, j) onto world (x, y).
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            return Some(GeoTransform::north_up(x - i * sx, y + j * sy, sx, -sy));
        }
    }

    let matrix = decoder
        .find_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION))
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok())?;
    if matrix.len() >= 8 {
        return Some(GeoTransform {
            origin_x: matrix[3],
            origin_y: matrix[7],
            pixel_width: matrix[0],
            pixel_height: matrix[5],
            rot_x: matrix[1],
            rot_y: matrix[4],
        });
    }
    None
}

fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let dir = decoder
        .find_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY))
        .ok()
        .flatten()
        .and_then(|v| v.into_u64_vec().ok())?;
    // Entries of 4 shorts after the 4-short header: (key, location, count, value).
    let mut geographic = None;
    for entry in dir[4..].chunks(4) {
        if entry.len() < 4 || entry[1] != 0 {
            continue;
        }
        match entry[0] {
            KEY_PROJECTED_CS_TYPE => return Some(entry[3] as u32),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(entry[3] as u32),
            _ => {}
        }
    }
    geographic
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
}

fn decode_to_f32(image: DecodingResult, name: &str) -> Result<Vec<f32>, GridError> {
    Ok(match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(GridError::UnsupportedSampleFormat {
                file: name.to_string(),
                format: "sample type not representable as f32".to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = std::env::temp_dir();
        let path = dir.join("zonalgrid_roundtrip.tif");

        let grid = Grid::new(
            array![[1.5f32, 2.5, f32::NAN], [4.0, 5.0, 6.0]],
            GeoTransform::north_up(10.0, 48.0, 0.25, -0.25),
            4326,
        )
        .unwrap()
        .with_nodata(Some(-9999.0));

        write(&path, &grid).unwrap();
        let back = read(&path).unwrap();

        assert_eq!(back.rows(), 2);
        assert_eq!(back.cols(), 3);
        assert_eq!(back.epsg(), 4326);
        assert_eq!(back.nodata(), Some(-9999.0));
        assert!(back.transform().approx_eq(grid.transform()));
        assert_eq!(back.data()[[0, 0]], 1.5);
        assert_eq!(back.data()[[1, 2]], 6.0);
        assert!(back.data()[[0, 2]].is_nan());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read(Path::new("/nonexistent/zonalgrid.tif")).unwrap_err();
        assert!(matches!(err, GridError::Io(_)));
    }
}
