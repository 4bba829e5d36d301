//! GeoPackage export of the result table with zone geometries
//!
//! Writes a minimal standard-conformant GeoPackage: the three required
//! metadata tables plus one feature layer whose rows mirror the result
//! table, geometry as GP-header + WKB blobs.

use std::path::Path;

use geo::Geometry;
use geozero::{CoordDimensions, ToWkb};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, ConnectOptions, SqliteConnection};
use tracing::info;

use crate::analysis::table::ResultTable;
use crate::error::AnalysisError;
use crate::export::partial_path;
use crate::zones::{encode_gpkg_header, ZoneSet};

const GPKG_APPLICATION_ID: i64 = 0x4750_4B47; // "GPKG"
const GPKG_USER_VERSION: i64 = 10300;

/// Write `table` + zone geometries to `path` as a single-layer GeoPackage.
pub async fn write_gpkg(
    table: &ResultTable,
    zones: &ZoneSet,
    path: &Path,
    layer: &str,
) -> Result<(), AnalysisError> {
    let staging = partial_path(path);
    if staging.exists() {
        std::fs::remove_file(&staging)?;
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(&staging)
        .create_if_missing(true)
        .connect()
        .await?;

    sqlx::query(&format!("PRAGMA application_id = {GPKG_APPLICATION_ID}"))
        .execute(&mut conn)
        .await?;
    sqlx::query(&format!("PRAGMA user_version = {GPKG_USER_VERSION}"))
        .execute(&mut conn)
        .await?;

    create_metadata_tables(&mut conn, zones.epsg as i64).await?;
    create_feature_table(&mut conn, table, layer, zones.epsg as i64).await?;
    insert_rows(&mut conn, table, zones, layer).await?;

    conn.close().await?;
    std::fs::rename(&staging, path)?;
    info!(file = %path.display(), layer, rows = table.num_rows(), "geopackage written");
    Ok(())
}

async fn create_metadata_tables(conn: &mut SqliteConnection, srs_id: i64) -> Result<(), AnalysisError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
            srs_name TEXT NOT NULL,
            srs_id INTEGER PRIMARY KEY,
            organization TEXT NOT NULL,
            organization_coordsys_id INTEGER NOT NULL,
            definition TEXT NOT NULL,
            description TEXT
        )",
    )
    .execute(&mut *conn)
    .await?;

    // The two mandatory entries plus the layer SRS (WGS84 in practice).
    sqlx::query(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES
         ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL),
         ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL)",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES
         ('WGS 84 geodetic', ?, 'EPSG', ?,
          'GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433]]',
          NULL)",
    )
    .bind(srs_id)
    .bind(srs_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS gpkg_contents (
            table_name TEXT NOT NULL PRIMARY KEY,
            data_type TEXT NOT NULL,
            identifier TEXT UNIQUE,
            description TEXT DEFAULT '',
            last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,
            srs_id INTEGER
        )",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
            table_name TEXT NOT NULL,
            column_name TEXT NOT NULL,
            geometry_type_name TEXT NOT NULL,
            srs_id INTEGER NOT NULL,
            z TINYINT NOT NULL,
            m TINYINT NOT NULL,
            CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name)
        )",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_feature_table(
    conn: &mut SqliteConnection,
    table: &ResultTable,
    layer: &str,
    srs_id: i64,
) -> Result<(), AnalysisError> {
    let mut ddl = format!("CREATE TABLE \"{layer}\" (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB");
    for (name, _) in table.label_columns() {
        ddl.push_str(&format!(", \"{name}\" TEXT"));
    }
    for (name, _) in table.value_columns() {
        ddl.push_str(&format!(", \"{name}\" REAL"));
    }
    ddl.push(')');
    sqlx::query(&ddl).execute(&mut *conn).await?;

    sqlx::query("INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) VALUES (?, 'features', ?, ?)")
        .bind(layer)
        .bind(layer)
        .bind(srs_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO gpkg_geometry_columns VALUES (?, 'geom', 'MULTIPOLYGON', ?, 0, 0)",
    )
    .bind(layer)
    .bind(srs_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    table: &ResultTable,
    zones: &ZoneSet,
    layer: &str,
) -> Result<(), AnalysisError> {
    let labels = table.label_columns();
    let values = table.value_columns();
    let column_count = 1 + labels.len() + values.len();
    let placeholders = vec!["?"; column_count].join(", ");
    let mut names = vec!["geom".to_string()];
    names.extend(labels.iter().map(|(n, _)| format!("\"{n}\"")));
    names.extend(values.iter().map(|(n, _)| format!("\"{n}\"")));
    let sql = format!(
        "INSERT INTO \"{layer}\" ({}) VALUES ({placeholders})",
        names.join(", ")
    );

    let header = encode_gpkg_header(zones.epsg as i32);
    let mut tx = conn.begin().await?;
    for (row, zone) in zones.zones.iter().enumerate() {
        let wkb = Geometry::MultiPolygon(zone.geometry.clone())
            .to_wkb(CoordDimensions::xy())
            .map_err(|e| AnalysisError::Export(format!("WKB encoding failed for zone {row}: {e}")))?;
        let mut blob = header.to_vec();
        blob.extend_from_slice(&wkb);

        let mut query = sqlx::query(&sql).bind(blob);
        for (_, column) in &labels {
            query = query.bind(column.get(row).copied().unwrap_or("").to_string());
        }
        for (_, column) in &values {
            query = query.bind(column.get(row).copied().unwrap_or(0.0));
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
