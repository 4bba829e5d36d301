//! Streaming GeoJSON export of the result table (optional artifact)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use crate::analysis::table::ResultTable;
use crate::error::AnalysisError;
use crate::export::partial_path;
use crate::zones::ZoneSet;

/// Write the table + geometries as a GeoJSON FeatureCollection, streaming
/// one feature at a time.
pub fn write_geojson(table: &ResultTable, zones: &ZoneSet, path: &Path) -> Result<(), AnalysisError> {
    let staging = partial_path(path);
    {
        let file = File::create(&staging)?;
        let mut out = BufWriter::new(file);

        write!(
            out,
            r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
            zones.epsg
        )?;

        let labels = table.label_columns();
        let values = table.value_columns();
        for (row, zone) in zones.zones.iter().enumerate() {
            if row > 0 {
                write!(out, ",")?;
            }
            write!(out, r#"{{"type":"Feature","id":"{}","#, escape_json(zone.code()))?;

            write!(out, r#""geometry":"#)?;
            let mut geom_buf = Vec::new();
            let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
            Geometry::MultiPolygon(zone.geometry.clone())
                .process_geom(&mut geom_writer)
                .map_err(|e| AnalysisError::Export(format!("GeoJSON geometry for zone {row}: {e}")))?;
            out.write_all(&geom_buf)?;

            write!(out, r#","properties":{{"#)?;
            let mut first = true;
            for (name, column) in &labels {
                if !first {
                    write!(out, ",")?;
                }
                first = false;
                write!(
                    out,
                    r#""{}":"{}""#,
                    escape_json(name),
                    escape_json(column.get(row).copied().unwrap_or(""))
                )?;
            }
            for (name, column) in &values {
                if !first {
                    write!(out, ",")?;
                }
                first = false;
                let v = column.get(row).copied().unwrap_or(0.0);
                let v = if v.is_finite() { v } else { 0.0 };
                write!(out, r#""{}":{v}"#, escape_json(name))?;
            }
            write!(out, "}}}}")?;
        }

        write!(out, "]}}")?;
        out.flush()?;
    }
    std::fs::rename(&staging, path)?;
    Ok(())
}

/// Escape a string for embedding in JSON.
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::table::{MetricColumn, MetricKind, ZoneLabels};
    use crate::config::ExposureCategory;
    use crate::zones::Zone;
    use geo::polygon;

    #[test]
    fn test_geojson_export() {
        let zones = ZoneSet {
            level: 1,
            code_fields: vec!["HASC_1".to_string()],
            name_fields: vec!["NAM_1".to_string()],
            zones: vec![Zone {
                codes: vec!["KH.A".to_string()],
                names: vec!["Alpha".to_string()],
                geometry: geo::MultiPolygon(vec![polygon![
                    (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0),
                ]]),
            }],
            epsg: 4326,
            wb_region: None,
        };
        let table = ResultTable {
            exposure: ExposureCategory::Population,
            admin_level: 1,
            labels: ZoneLabels {
                code_fields: vec!["HASC_1".to_string()],
                name_fields: vec!["NAM_1".to_string()],
                codes: vec![vec!["KH.A".to_string()]],
                names: vec![vec!["Alpha".to_string()]],
            },
            total_exposure: vec![1000.0],
            metrics: vec![MetricColumn {
                rp: 10,
                kind: MetricKind::AffectedExposure,
                values: vec![120.5],
            }],
            annual: vec![],
            single_rp: false,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.geojson");
        write_geojson(&table, &zones, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#""type":"FeatureCollection""#));
        assert!(text.contains("EPSG::4326"));
        assert!(text.contains(r#""HASC_1":"KH.A""#));
        assert!(text.contains(r#""RP10_POP_exp":120.5"#));
        assert!(text.contains("MultiPolygon"));
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("plain"), "plain");
        assert_eq!(escape_json("a\"b"), "a\\\"b");
        assert_eq!(escape_json("line\nbreak"), "line\\nbreak");
    }
}
