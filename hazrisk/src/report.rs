//! Run report
//!
//! Collects per-phase timings, per-RP statistics, input fingerprints and
//! warnings for one analysis run, and serialises them next to the output
//! tables. Input fingerprints make reruns auditable: identical fingerprints
//! mean the exported tables are reproducible byte for byte.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Completed and exported.
    Success,
    /// Aborted; no outputs were written.
    Failed,
}

/// Duration of one orchestrator phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming {
    pub phase: String,
    pub seconds: f64,
}

/// Per-return-period worker statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RpStats {
    pub rp: u32,
    /// Hazard cells above the threshold after alignment.
    pub affected_cells: usize,
    pub seconds: f64,
}

/// blake3 fingerprint of one input file.
#[derive(Debug, Clone, Serialize)]
pub struct InputFingerprint {
    pub role: String,
    pub path: PathBuf,
    pub blake3: String,
}

/// Complete report of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub country: String,
    pub hazard_category: String,
    pub exposure: String,
    pub admin_level: u8,
    pub mode: String,
    pub return_periods: Vec<u32>,
    /// Unix timestamp of run start.
    pub started_at: u64,
    pub duration_secs: f64,
    pub zones: usize,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub phases: Vec<PhaseTiming>,
    pub rp_stats: Vec<RpStats>,
    pub inputs: Vec<InputFingerprint>,
    pub warnings: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(
        country: &str,
        hazard_category: &str,
        exposure: &str,
        admin_level: u8,
        mode: &str,
        return_periods: &[u32],
    ) -> Self {
        Self {
            status: RunStatus::Failed,
            country: country.to_string(),
            hazard_category: hazard_category.to_string(),
            exposure: exposure.to_string(),
            admin_level,
            mode: mode.to_string(),
            return_periods: return_periods.to_vec(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            duration_secs: 0.0,
            zones: 0,
            grid_rows: 0,
            grid_cols: 0,
            phases: Vec::new(),
            rp_stats: Vec::new(),
            inputs: Vec::new(),
            warnings: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record_phase(&mut self, phase: &str, seconds: f64) {
        self.phases.push(PhaseTiming {
            phase: phase.to_string(),
            seconds,
        });
    }

    pub fn record_input(&mut self, role: &str, path: &Path) {
        match file_fingerprint(path) {
            Ok(fingerprint) => self.inputs.push(InputFingerprint {
                role: role.to_string(),
                path: path.to_path_buf(),
                blake3: fingerprint,
            }),
            Err(e) => self
                .warnings
                .push(format!("could not fingerprint {}: {e}", path.display())),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }

    /// Human-readable summary printed at the end of a run.
    pub fn print_summary(&self) {
        println!("=== Run summary ===");
        println!("Status: {:?}", self.status);
        println!(
            "{} / {} / {} / ADM{} ({})",
            self.country, self.hazard_category, self.exposure, self.admin_level, self.mode
        );
        println!("Zones: {}", self.zones);
        println!("Grid: {}x{}", self.grid_rows, self.grid_cols);
        println!("Duration: {:.2}s", self.duration_secs);
        for stats in &self.rp_stats {
            println!(
                "  RP{:<5} {:>10} affected cells  {:>7.2}s",
                stats.rp, stats.affected_cells, stats.seconds
            );
        }
        if !self.warnings.is_empty() {
            println!("Warnings:");
            for warning in &self.warnings {
                println!("  - {warning}");
            }
        }
        for output in &self.outputs {
            println!("Wrote {}", output.display());
        }
    }
}

/// Streaming blake3 fingerprint of a file.
pub fn file_fingerprint(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"hazard data").unwrap();
        std::fs::write(&b, b"hazard data").unwrap();

        let fa = file_fingerprint(&a).unwrap();
        let fb = file_fingerprint(&b).unwrap();
        assert_eq!(fa, fb);
        assert_eq!(fa.len(), 64);

        std::fs::write(&b, b"hazard data!").unwrap();
        assert_ne!(fa, file_fingerprint(&b).unwrap());
    }

    #[test]
    fn test_report_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = RunReport::new("KHM", "FLUVIAL_UNDEFENDED", "POP", 1, "Function", &[10, 100]);
        report.status = RunStatus::Success;
        report.zones = 25;
        report.record_phase("LoadingZones", 0.5);
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Success\""));
        assert!(text.contains("LoadingZones"));
        assert!(text.contains("FLUVIAL_UNDEFENDED"));
    }
}
