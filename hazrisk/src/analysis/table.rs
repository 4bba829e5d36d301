//! Typed result columns
//!
//! Partial results carry `{rp, metric kind, class index}` records instead of
//! name-encoded columns; display strings are derived only at export time.
//! Multi-RP runs keep `RP{n}_` prefixes and strip the `Mean` method suffix
//! (the bracketing `LB`/`UB` stay tagged); single-RP runs skip annualization
//! entirely and drop the RP prefix.

use crate::config::ExposureCategory;
use crate::probability::Method;
use crate::zones::ZoneSet;

/// Per-return-period metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Exposure within the hazard footprint: `{RP}_{exp}_exp`.
    AffectedExposure,
    /// Affected exposure scaled by the impact fraction: `{RP}_{exp}_imp`.
    ImpactedExposure,
    /// Cumulative exposure at or above class `k`: `{RP}_{exp}_C{k}_exp`.
    ClassExposure(usize),
}

/// One zone-aligned column of per-RP values.
#[derive(Debug, Clone)]
pub struct MetricColumn {
    pub rp: u32,
    pub kind: MetricKind,
    pub values: Vec<f64>,
}

impl MetricColumn {
    pub fn display_name(&self, exposure: ExposureCategory, single_rp: bool) -> String {
        let prefix = if single_rp {
            String::new()
        } else {
            format!("RP{}_", self.rp)
        };
        let exp = exposure.code();
        match self.kind {
            MetricKind::AffectedExposure => format!("{prefix}{exp}_exp"),
            MetricKind::ImpactedExposure => format!("{prefix}{exp}_imp"),
            MetricKind::ClassExposure(k) => format!("{prefix}{exp}_C{k}_exp"),
        }
    }
}

/// Partial result of one return period: zone-aligned columns in the same
/// row order as the `ZoneSet`.
#[derive(Debug, Clone)]
pub struct RpPartial {
    pub rp: u32,
    pub columns: Vec<MetricColumn>,
    /// Valid hazard cells after thresholding (reported, not exported).
    pub affected_cells: usize,
}

/// Annualized metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnualKind {
    /// Expected annual impact (Function mode).
    Eai,
    /// Expected annual exposure at or above class `k` (Classes mode).
    ClassEae(usize),
}

/// One annualized column (absolute or percent-of-total) for one method.
#[derive(Debug, Clone)]
pub struct AnnualColumn {
    pub kind: AnnualKind,
    pub method: Method,
    pub percent: bool,
    pub values: Vec<f64>,
}

impl AnnualColumn {
    pub fn display_name(&self, exposure: ExposureCategory) -> String {
        let exp = exposure.code();
        let base = match self.kind {
            AnnualKind::Eai => format!("{exp}_EAI"),
            AnnualKind::ClassEae(k) => format!("{exp}_C{k}_EAE"),
        };
        let pct = if self.percent { "%" } else { "" };
        // Mean is the headline estimate and loses its suffix; the LB/UB
        // bracket keeps its tags.
        match self.method {
            Method::Mean => format!("{base}{pct}"),
            other => format!("{base}{pct}_{}", other.label()),
        }
    }
}

/// Display name of the total-exposure column, e.g. `ADM1_POP`.
pub fn total_exposure_name(admin_level: u8, exposure: ExposureCategory) -> String {
    format!("ADM{admin_level}_{}", exposure.code())
}

/// Zone labels copied out of the `ZoneSet` (the table outlives the run's
/// working state).
#[derive(Debug, Clone)]
pub struct ZoneLabels {
    pub code_fields: Vec<String>,
    pub name_fields: Vec<String>,
    /// Per zone, values parallel to `code_fields`.
    pub codes: Vec<Vec<String>>,
    /// Per zone, values parallel to `name_fields`.
    pub names: Vec<Vec<String>>,
}

impl ZoneLabels {
    pub fn from_zone_set(zones: &ZoneSet) -> Self {
        Self {
            code_fields: zones.code_fields.clone(),
            name_fields: zones.name_fields.clone(),
            codes: zones.zones.iter().map(|z| z.codes.clone()).collect(),
            names: zones.zones.iter().map(|z| z.names.clone()).collect(),
        }
    }
}

/// The assembled, annualized, rounded result of a run.
#[derive(Debug, Clone)]
pub struct ResultTable {
    pub exposure: ExposureCategory,
    pub admin_level: u8,
    pub labels: ZoneLabels,
    /// Total exposure per zone (startup zonal sum over the raw exposure
    /// grid); denominator of every percent column.
    pub total_exposure: Vec<f64>,
    pub metrics: Vec<MetricColumn>,
    pub annual: Vec<AnnualColumn>,
    pub single_rp: bool,
}

impl ResultTable {
    pub fn num_rows(&self) -> usize {
        self.total_exposure.len()
    }

    /// All value columns with display names, in export order: total
    /// exposure, per-RP metrics, annualized columns.
    pub fn value_columns(&self) -> Vec<(String, &[f64])> {
        let mut cols: Vec<(String, &[f64])> = Vec::new();
        cols.push((
            total_exposure_name(self.admin_level, self.exposure),
            &self.total_exposure,
        ));
        for m in &self.metrics {
            cols.push((m.display_name(self.exposure, self.single_rp), &m.values));
        }
        for a in &self.annual {
            cols.push((a.display_name(self.exposure), &a.values));
        }
        cols
    }

    /// Label columns (codes then names) with field names, per export order.
    pub fn label_columns(&self) -> Vec<(String, Vec<&str>)> {
        let mut cols = Vec::new();
        for (i, field) in self.labels.code_fields.iter().enumerate() {
            let values = self
                .labels
                .codes
                .iter()
                .map(|row| row.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            cols.push((field.clone(), values));
        }
        for (i, field) in self.labels.name_fields.iter().enumerate() {
            let values = self
                .labels
                .names
                .iter()
                .map(|row| row.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            cols.push((field.clone(), values));
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_multi_rp() {
        let col = MetricColumn {
            rp: 10,
            kind: MetricKind::AffectedExposure,
            values: vec![],
        };
        assert_eq!(col.display_name(ExposureCategory::Population, false), "RP10_POP_exp");

        let col = MetricColumn {
            rp: 100,
            kind: MetricKind::ClassExposure(2),
            values: vec![],
        };
        assert_eq!(col.display_name(ExposureCategory::Agriculture, false), "RP100_AGR_C2_exp");
    }

    #[test]
    fn test_metric_names_single_rp_drop_prefix() {
        let col = MetricColumn {
            rp: 100,
            kind: MetricKind::ImpactedExposure,
            values: vec![],
        };
        assert_eq!(col.display_name(ExposureCategory::BuiltUp, true), "BU_imp");
    }

    #[test]
    fn test_annual_names_strip_mean_suffix_only() {
        let eai = |method, percent| AnnualColumn {
            kind: AnnualKind::Eai,
            method,
            percent,
            values: vec![],
        };
        assert_eq!(
            eai(Method::LowerBound, false).display_name(ExposureCategory::Population),
            "POP_EAI_LB"
        );
        assert_eq!(
            eai(Method::UpperBound, true).display_name(ExposureCategory::Population),
            "POP_EAI%_UB"
        );
        assert_eq!(eai(Method::Mean, false).display_name(ExposureCategory::Population), "POP_EAI");
        assert_eq!(
            eai(Method::Mean, true).display_name(ExposureCategory::Population),
            "POP_EAI%"
        );

        let eae = AnnualColumn {
            kind: AnnualKind::ClassEae(1),
            method: Method::Mean,
            percent: false,
            values: vec![],
        };
        assert_eq!(eae.display_name(ExposureCategory::Population), "POP_C1_EAE");
    }

    #[test]
    fn test_total_exposure_name() {
        assert_eq!(total_exposure_name(2, ExposureCategory::Population), "ADM2_POP");
    }
}
