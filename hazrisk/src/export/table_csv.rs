//! Flat CSV export of the result table (no geometry)

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::table::ResultTable;
use crate::error::AnalysisError;
use crate::export::partial_path;

/// Write the table as CSV: label columns first, then every value column in
/// export order, one row per zone.
pub fn write_csv(table: &ResultTable, path: &Path) -> Result<(), AnalysisError> {
    let staging = partial_path(path);
    {
        let file = std::fs::File::create(&staging)?;
        let mut out = BufWriter::new(file);

        let labels = table.label_columns();
        let values = table.value_columns();

        let header: Vec<String> = labels
            .iter()
            .map(|(name, _)| escape_csv(name))
            .chain(values.iter().map(|(name, _)| escape_csv(name)))
            .collect();
        writeln!(out, "{}", header.join(","))?;

        for row in 0..table.num_rows() {
            let mut fields: Vec<String> = Vec::with_capacity(header.len());
            for (_, column) in &labels {
                fields.push(escape_csv(column.get(row).copied().unwrap_or("")));
            }
            for (_, column) in &values {
                fields.push(format_value(column.get(row).copied().unwrap_or(0.0)));
            }
            writeln!(out, "{}", fields.join(","))?;
        }
        out.flush()?;
    }
    std::fs::rename(&staging, path)?;
    Ok(())
}

fn format_value(v: f64) -> String {
    if v.is_finite() {
        format!("{v}")
    } else {
        "0".to_string()
    }
}

/// Quote a field when it contains a delimiter, quote or newline.
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
