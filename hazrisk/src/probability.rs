//! Return-period exceedance probabilities and annualization weights
//!
//! Each return period RP has annual exceedance probability `1/RP`. Sorting
//! by ascending RP gives descending probabilities; the width of the band
//! between adjacent probabilities is how much of a year the RP's impact
//! represents. Two conventions bracket the estimate (assign the band below
//! or above each RP), plus their mean:
//!
//! - lower bound: `p_i - p_{i+1}`, the last RP keeping its own probability
//! - upper bound: `p_{i-1} - p_i`, zero for the first (most frequent) RP
//! - mean: arithmetic average of the two
//!
//! Weights are computed once per run, before any aggregation, and reported
//! in the caller's original RP order.

use std::io::Write;
use std::path::Path;

use crate::error::AnalysisError;

/// Annualization weight triple for one return period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExceedanceWeights {
    /// Annual exceedance probability, `1/RP`.
    pub probability: f64,
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
}

/// Annualization convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    LowerBound,
    UpperBound,
    Mean,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::LowerBound, Method::UpperBound, Method::Mean];

    /// Column-suffix label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LowerBound => "LB",
            Self::UpperBound => "UB",
            Self::Mean => "Mean",
        }
    }

    pub fn weight(&self, w: &ExceedanceWeights) -> f64 {
        match self {
            Self::LowerBound => w.lower,
            Self::UpperBound => w.upper,
            Self::Mean => w.mean,
        }
    }
}

/// Weight triples for a set of return periods, keyed by RP value and kept
/// in the caller's original order.
#[derive(Debug, Clone)]
pub struct ProbabilityModel {
    entries: Vec<(u32, ExceedanceWeights)>,
}

impl ProbabilityModel {
    pub fn from_return_periods(return_periods: &[u32]) -> Result<Self, AnalysisError> {
        if return_periods.is_empty() {
            return Err(AnalysisError::NoReturnPeriods);
        }
        if let Some(&rp) = return_periods.iter().find(|&&rp| rp == 0) {
            return Err(AnalysisError::ZeroReturnPeriod(rp));
        }

        // Weight derivation assumes ascending RPs; sort internally and keep
        // the original order for output.
        let mut order: Vec<usize> = (0..return_periods.len()).collect();
        order.sort_by_key(|&i| return_periods[i]);
        for w in order.windows(2) {
            if return_periods[w[0]] == return_periods[w[1]] {
                return Err(AnalysisError::DuplicateReturnPeriod(return_periods[w[0]]));
            }
        }

        let sorted_probs: Vec<f64> = order
            .iter()
            .map(|&i| 1.0 / return_periods[i] as f64)
            .collect();
        let n = sorted_probs.len();

        let mut weights = vec![
            ExceedanceWeights {
                probability: 0.0,
                lower: 0.0,
                upper: 0.0,
                mean: 0.0,
            };
            n
        ];
        for k in 0..n {
            let p = sorted_probs[k];
            let lower = if k + 1 < n { p - sorted_probs[k + 1] } else { p };
            let upper = if k > 0 { sorted_probs[k - 1] - p } else { 0.0 };
            weights[k] = ExceedanceWeights {
                probability: p,
                lower,
                upper,
                mean: (lower + upper) / 2.0,
            };
        }

        let mut entries = vec![(0u32, weights[0]); n];
        for (k, &i) in order.iter().enumerate() {
            entries[i] = (return_periods[i], weights[k]);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, rp: u32) -> Option<&ExceedanceWeights> {
        self.entries
            .iter()
            .find(|(entry_rp, _)| *entry_rp == rp)
            .map(|(_, w)| w)
    }

    /// Entries in the caller's original RP order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ExceedanceWeights)> {
        self.entries.iter().map(|(rp, w)| (*rp, w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the probability table (`RPs, prob_RPs, prob_RPs_LB,
    /// prob_RPs_UB, prob_RPs_Mean`) as CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), AnalysisError> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(out, "RPs,prob_RPs,prob_RPs_LB,prob_RPs_UB,prob_RPs_Mean")?;
        for (rp, w) in self.iter() {
            writeln!(out, "{},{},{},{},{}", rp, w.probability, w.lower, w.upper, w.mean)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_rp_weights() {
        let model = ProbabilityModel::from_return_periods(&[10, 50]).unwrap();
        let w10 = model.get(10).unwrap();
        let w50 = model.get(50).unwrap();

        assert!((w10.probability - 0.1).abs() < 1e-12);
        assert!((w50.probability - 0.02).abs() < 1e-12);

        assert!((w10.lower - 0.08).abs() < 1e-12);
        assert!((w50.lower - 0.02).abs() < 1e-12);

        assert_eq!(w10.upper, 0.0);
        assert!((w50.upper - 0.08).abs() < 1e-12);

        assert!((w10.mean - 0.04).abs() < 1e-12);
        assert!((w50.mean - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_invariants_for_any_ascending_list() {
        let rps = [5u32, 10, 25, 50, 100, 250, 1000];
        let model = ProbabilityModel::from_return_periods(&rps).unwrap();

        // First (most frequent) RP: upper bound is zero.
        assert_eq!(model.get(5).unwrap().upper, 0.0);
        // Last (rarest) RP: lower bound equals its own probability.
        let last = model.get(1000).unwrap();
        assert!((last.lower - last.probability).abs() < 1e-15);

        // Band widths are non-negative everywhere.
        for (_, w) in model.iter() {
            assert!(w.lower >= 0.0);
            assert!(w.upper >= 0.0);
        }
    }

    #[test]
    fn test_unsorted_input_keeps_caller_order() {
        let model = ProbabilityModel::from_return_periods(&[100, 10]).unwrap();
        let order: Vec<u32> = model.iter().map(|(rp, _)| rp).collect();
        assert_eq!(order, vec![100, 10]);

        // Weights still follow the sorted derivation.
        assert_eq!(model.get(10).unwrap().upper, 0.0);
        let w100 = model.get(100).unwrap();
        assert!((w100.lower - 0.01).abs() < 1e-12);
        assert!((w100.upper - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_single_rp() {
        let model = ProbabilityModel::from_return_periods(&[100]).unwrap();
        let w = model.get(100).unwrap();
        assert!((w.probability - 0.01).abs() < 1e-12);
        assert!((w.lower - 0.01).abs() < 1e-12);
        assert_eq!(w.upper, 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            ProbabilityModel::from_return_periods(&[]),
            Err(AnalysisError::NoReturnPeriods)
        ));
        assert!(matches!(
            ProbabilityModel::from_return_periods(&[10, 0]),
            Err(AnalysisError::ZeroReturnPeriod(0))
        ));
        assert!(matches!(
            ProbabilityModel::from_return_periods(&[10, 10]),
            Err(AnalysisError::DuplicateReturnPeriod(10))
        ));
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(Method::LowerBound.label(), "LB");
        assert_eq!(Method::UpperBound.label(), "UB");
        assert_eq!(Method::Mean.label(), "Mean");
    }
}
