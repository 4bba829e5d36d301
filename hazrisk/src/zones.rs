//! Administrative zone sets
//!
//! A `ZoneSet` is the immutable polygon collection a run aggregates into:
//! one code/name pair per zone at the requested administrative level, plus
//! any parent-level code/name columns carried through to the outputs.
//! Sources: a per-country GeoPackage (layer `ADM{level}`) or a
//! user-supplied GeoJSON file with explicit code/name fields.

use std::path::Path;

use geo::MultiPolygon;
use geozero::ToGeo;
use regex::Regex;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Column, ConnectOptions, Row};
use tracing::{debug, warn};

use crate::config::adm_field_names;
use crate::error::AnalysisError;

/// One administrative zone.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Code values parallel to `ZoneSet::code_fields`.
    pub codes: Vec<String>,
    /// Name values parallel to `ZoneSet::name_fields`.
    pub names: Vec<String>,
    pub geometry: MultiPolygon,
}

impl Zone {
    /// Code at the requested administrative level.
    pub fn code(&self) -> &str {
        self.codes.last().map(String::as_str).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or("")
    }
}

/// Immutable zone collection sharing one CRS; row order is the output
/// row order for every result table.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    pub level: u8,
    pub code_fields: Vec<String>,
    pub name_fields: Vec<String>,
    pub zones: Vec<Zone>,
    pub epsg: u32,
    /// World Bank region code of the country, when the source carries it.
    pub wb_region: Option<String>,
}

impl ZoneSet {
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn geometries(&self) -> Vec<MultiPolygon> {
        self.zones.iter().map(|z| z.geometry.clone()).collect()
    }

    /// Invariant check: every zone carries a non-empty code and name at the
    /// requested level.
    fn validate(self) -> Result<Self, AnalysisError> {
        let level = self.level;
        for (index, zone) in self.zones.iter().enumerate() {
            if zone.code().is_empty() {
                return Err(AnalysisError::ZoneFieldMissing {
                    index,
                    field: self.code_fields.last().cloned().unwrap_or_default(),
                    level,
                });
            }
            if zone.name().is_empty() {
                return Err(AnalysisError::ZoneFieldMissing {
                    index,
                    field: self.name_fields.last().cloned().unwrap_or_default(),
                    level,
                });
            }
        }
        Ok(self)
    }
}

fn to_multipolygon(geometry: geo::Geometry) -> Option<MultiPolygon> {
    match geometry {
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::GeometryCollection(gc) => {
            let polys: Vec<_> = gc
                .into_iter()
                .filter_map(|g| to_multipolygon(g).map(|mp| mp.0))
                .flatten()
                .collect();
            if polys.is_empty() {
                None
            } else {
                Some(MultiPolygon(polys))
            }
        }
        _ => None,
    }
}

/// Load a zone set from a GeoJSON boundaries file with explicit code/name
/// fields (custom boundaries path). GeoJSON coordinates are WGS84.
pub fn from_geojson(
    path: &Path,
    code_field: &str,
    name_field: &str,
    level: u8,
) -> Result<ZoneSet, AnalysisError> {
    let text = std::fs::read_to_string(path).map_err(|_| AnalysisError::BoundariesUnavailable {
        country: String::new(),
        level,
        origin: path.display().to_string(),
    })?;
    let geojson: geojson::GeoJson = text.parse().map_err(|e| AnalysisError::BoundariesUnavailable {
        country: String::new(),
        level,
        origin: format!("{} ({e})", path.display()),
    })?;
    let collection = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(AnalysisError::BoundariesUnavailable {
                country: String::new(),
                level,
                origin: format!("{} (not a FeatureCollection)", path.display()),
            })
        }
    };

    let mut zones = Vec::new();
    let mut wb_region = None;
    for feature in collection.features {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let geom = geo::Geometry::<f64>::try_from(geometry.value.clone()).ok();
        let Some(multi) = geom.and_then(to_multipolygon) else {
            warn!("skipping non-polygon feature in {}", path.display());
            continue;
        };

        let prop = |field: &str| -> String {
            feature
                .properties
                .as_ref()
                .and_then(|p| p.get(field))
                .map(json_to_string)
                .unwrap_or_default()
        };
        if wb_region.is_none() {
            let region = prop("WB_REGION");
            if !region.is_empty() {
                wb_region = Some(region);
            }
        }
        zones.push(Zone {
            codes: vec![prop(code_field)],
            names: vec![prop(name_field)],
            geometry: multi,
        });
    }

    if zones.is_empty() {
        return Err(AnalysisError::EmptyZoneSet {
            layer: path.display().to_string(),
        });
    }
    ZoneSet {
        level,
        code_fields: vec![code_field.to_string()],
        name_fields: vec![name_field.to_string()],
        zones,
        epsg: 4326,
        wb_region,
    }
    .validate()
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Load a zone set from a country GeoPackage, layer `ADM{level}` (a
/// `WB_GAD_` prefix is accepted). Parent-level `HASC_d`/`NAM_d` columns
/// are carried along when present.
pub async fn from_geopackage(path: &Path, country: &str, level: u8) -> Result<ZoneSet, AnalysisError> {
    let (code_field, name_field) = adm_field_names(level)?;
    if !path.exists() {
        return Err(AnalysisError::BoundariesUnavailable {
            country: country.to_string(),
            level,
            origin: path.display().to_string(),
        });
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await?;

    // Locate the feature layer and its geometry column.
    let layers = sqlx::query(
        "SELECT c.table_name, g.column_name, g.srs_id \
         FROM gpkg_contents c \
         JOIN gpkg_geometry_columns g ON g.table_name = c.table_name \
         WHERE c.data_type = 'features'",
    )
    .fetch_all(&mut conn)
    .await?;

    let layer_re = Regex::new(&format!("^(?i)(WB_GAD_)?ADM{level}$"))
        .unwrap_or_else(|_| unreachable!("static pattern"));
    let mut table: Option<(String, String, i64)> = None;
    for row in &layers {
        let name: String = row.try_get("table_name")?;
        if layer_re.is_match(&name) {
            table = Some((
                name,
                row.try_get("column_name")?,
                row.try_get::<i64, _>("srs_id").unwrap_or(4326),
            ));
            break;
        }
    }
    let Some((table, geom_column, srs_id)) = table else {
        return Err(AnalysisError::BoundariesUnavailable {
            country: country.to_string(),
            level,
            origin: format!("{} (no ADM{level} layer)", path.display()),
        });
    };
    debug!(table, geom_column, srs_id, "reading boundary layer");

    let rows = sqlx::query(&format!("SELECT * FROM \"{table}\""))
        .fetch_all(&mut conn)
        .await?;
    if rows.is_empty() {
        return Err(AnalysisError::EmptyZoneSet { layer: table });
    }

    // Collect every HASC_d/NAM_d column up to the requested level, in
    // level order, the requested level last.
    let columns: Vec<String> = rows[0].columns().iter().map(|c| c.name().to_string()).collect();
    let mut code_fields = Vec::new();
    let mut name_fields = Vec::new();
    for l in 0..=level {
        let code = format!("HASC_{l}");
        let name = format!("NAM_{l}");
        if columns.iter().any(|c| c == &code) {
            code_fields.push(code);
        }
        if columns.iter().any(|c| c == &name) {
            name_fields.push(name);
        }
    }
    if code_fields.last() != Some(&code_field) || name_fields.last() != Some(&name_field) {
        return Err(AnalysisError::ZoneFieldMissing {
            index: 0,
            field: code_field,
            level,
        });
    }
    let has_region = columns.iter().any(|c| c == "WB_REGION");

    let mut zones = Vec::with_capacity(rows.len());
    let mut wb_region = None;
    for row in &rows {
        let blob: Vec<u8> = row.try_get(geom_column.as_str())?;
        let Some(multi) = decode_gpkg_geometry(&blob) else {
            warn!(table, "skipping undecodable geometry");
            continue;
        };
        let text = |field: &str| -> String {
            row.try_get::<String, _>(field)
                .or_else(|_| row.try_get::<i64, _>(field).map(|v| v.to_string()))
                .unwrap_or_default()
        };
        if has_region && wb_region.is_none() {
            let region = text("WB_REGION");
            if !region.is_empty() {
                wb_region = Some(region);
            }
        }
        zones.push(Zone {
            codes: code_fields.iter().map(|f| text(f)).collect(),
            names: name_fields.iter().map(|f| text(f)).collect(),
            geometry: multi,
        });
    }
    if zones.is_empty() {
        return Err(AnalysisError::EmptyZoneSet { layer: table });
    }

    ZoneSet {
        level,
        code_fields,
        name_fields,
        zones,
        epsg: srs_id as u32,
        wb_region,
    }
    .validate()
}

/// Strip the GeoPackage binary header and decode the WKB payload.
pub fn decode_gpkg_geometry(blob: &[u8]) -> Option<MultiPolygon> {
    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return None;
    }
    let flags = blob[3];
    let envelope_len = match (flags >> 1) & 0x07 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        _ => return None,
    };
    let offset = 8 + envelope_len;
    if blob.len() <= offset {
        return None;
    }
    let geom = geozero::wkb::Wkb(blob[offset..].to_vec()).to_geo().ok()?;
    to_multipolygon(geom)
}

/// GeoPackage binary header for a WKB payload (no envelope, little-endian
/// srs_id), the writer-side counterpart of [`decode_gpkg_geometry`].
pub fn encode_gpkg_header(srs_id: i32) -> [u8; 8] {
    let mut header = [0u8; 8];
    header[0] = b'G';
    header[1] = b'P';
    header[2] = 0; // version 1
    header[3] = 0b0000_0001; // little-endian, no envelope
    header[4..8].copy_from_slice(&srs_id.to_le_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use geozero::{CoordDimensions, ToWkb};

    fn feature(code: &str, name: &str) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"ZONE":"{code}","LABEL":"{name}","WB_REGION":"EAP"}},
               "geometry":{{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}}}"#
        )
    }

    fn write_collection(features: &[String]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            format!(
                r#"{{"type":"FeatureCollection","features":[{}]}}"#,
                features.join(",")
            ),
        )
        .unwrap();
        file
    }

    #[test]
    fn test_geojson_zone_set() {
        let file = write_collection(&[feature("KH.A", "Alpha"), feature("KH.B", "Beta")]);
        let zones = from_geojson(file.path(), "ZONE", "LABEL", 1).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.zones[0].code(), "KH.A");
        assert_eq!(zones.zones[1].name(), "Beta");
        assert_eq!(zones.wb_region.as_deref(), Some("EAP"));
        assert_eq!(zones.epsg, 4326);
    }

    #[test]
    fn test_geojson_missing_code_field_rejected() {
        let file = write_collection(&[feature("KH.A", "Alpha")]);
        let err = from_geojson(file.path(), "NOPE", "LABEL", 1).unwrap_err();
        assert!(matches!(err, AnalysisError::ZoneFieldMissing { .. }));
    }

    #[test]
    fn test_missing_file_is_data_unavailable() {
        let err = from_geojson(Path::new("/nonexistent.geojson"), "a", "b", 1).unwrap_err();
        assert!(matches!(err, AnalysisError::BoundariesUnavailable { .. }));
    }

    #[test]
    fn test_gpkg_geometry_roundtrip() {
        let poly: geo::Geometry = geo::Geometry::MultiPolygon(MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]));
        let wkb = poly.to_wkb(CoordDimensions::xy()).unwrap();
        let mut blob = encode_gpkg_header(4326).to_vec();
        blob.extend_from_slice(&wkb);

        let decoded = decode_gpkg_geometry(&blob).unwrap();
        assert_eq!(decoded.0.len(), 1);
        assert_eq!(decoded.0[0].exterior().0.len(), 4);
    }

    #[test]
    fn test_gpkg_header_rejects_garbage() {
        assert!(decode_gpkg_geometry(b"not a geopackage blob").is_none());
        assert!(decode_gpkg_geometry(b"GP").is_none());
    }
}
