//! Vulnerability functions: hazard intensity -> impact fraction in [0, 1]
//!
//! Functions are registered per (hazard kind, exposure category) pair and
//! resolved once at run start; an unmapped pair is a configuration error,
//! not a fallthrough. Every function honours the same contract: scalar
//! evaluation for previews, whole-grid application for analysis, missing
//! values propagated as missing.

pub mod expr;
pub mod functions;

use std::collections::HashMap;

use zonalgrid::Grid;

use crate::config::{ExposureCategory, HazardKind, Region, RunConfig};
use crate::error::AnalysisError;
use self::expr::Expression;

/// A hazard-intensity to impact-fraction mapping.
pub trait VulnerabilityFn: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Impact fraction at a scalar intensity, clamped to [0, 1], NaN for NaN.
    fn factor(&self, intensity: f64) -> f64;

    /// Vectorized application to a hazard grid; NaN cells stay NaN.
    fn apply(&self, hazard: &Grid<f32>) -> Grid<f32> {
        hazard.map_valid(|v| self.factor(v as f64) as f32)
    }
}

/// Flood mortality over population.
pub struct MortalityFunction;

impl VulnerabilityFn for MortalityFunction {
    fn name(&self) -> &str {
        "flood_mortality"
    }

    fn factor(&self, intensity: f64) -> f64 {
        functions::flood_mortality(intensity)
    }
}

/// Flood depth-damage over built-up area.
pub struct BuiltupDamageFunction {
    pub region: Region,
}

impl VulnerabilityFn for BuiltupDamageFunction {
    fn name(&self) -> &str {
        "flood_damage_builtup"
    }

    fn factor(&self, intensity: f64) -> f64 {
        functions::flood_damage_builtup(intensity, self.region)
    }
}

/// Flood depth-damage over agricultural land.
pub struct AgriDamageFunction {
    pub region: Region,
}

impl VulnerabilityFn for AgriDamageFunction {
    fn name(&self) -> &str {
        "flood_damage_agri"
    }

    fn factor(&self, intensity: f64) -> f64 {
        functions::flood_damage_agri(intensity, self.region)
    }
}

/// Cyclone wind damage over built-up area.
pub struct WindDamageFunction {
    pub region: Region,
}

impl VulnerabilityFn for WindDamageFunction {
    fn name(&self) -> &str {
        "wind_damage_builtup"
    }

    fn factor(&self, intensity: f64) -> f64 {
        functions::wind_damage_builtup(intensity, self.region)
    }
}

/// User-supplied expression over the free variable `x`.
#[derive(Debug)]
pub struct CustomFunction {
    expression: Expression,
}

impl CustomFunction {
    /// Parse an expression; malformed input fails here, before any raster
    /// is touched.
    pub fn parse(source: &str) -> Result<Self, AnalysisError> {
        Ok(Self {
            expression: Expression::parse(source)?,
        })
    }

    /// Documented preview fallback: `min(1, x / 10)`.
    pub fn preview_default() -> Self {
        Self {
            expression: Expression::parse("min(1, x / 10)")
                .unwrap_or_else(|_| unreachable!("default expression is well-formed")),
        }
    }

    pub fn source(&self) -> &str {
        self.expression.source()
    }
}

impl VulnerabilityFn for CustomFunction {
    fn name(&self) -> &str {
        "custom_expression"
    }

    fn factor(&self, intensity: f64) -> f64 {
        self.expression.eval(intensity).clamp(0.0, 1.0)
    }
}

type Builder = fn(Region) -> Box<dyn VulnerabilityFn>;

/// Registry mapping (hazard kind, exposure category) to a curve builder,
/// populated at startup.
pub struct FunctionRegistry {
    builders: HashMap<(HazardKind, ExposureCategory), Builder>,
}

impl FunctionRegistry {
    pub fn with_builtins() -> Self {
        let mut builders: HashMap<(HazardKind, ExposureCategory), Builder> = HashMap::new();
        builders.insert(
            (HazardKind::Flood, ExposureCategory::Population),
            |_| Box::new(MortalityFunction),
        );
        builders.insert(
            (HazardKind::Flood, ExposureCategory::BuiltUp),
            |region| Box::new(BuiltupDamageFunction { region }),
        );
        builders.insert(
            (HazardKind::Flood, ExposureCategory::Agriculture),
            |region| Box::new(AgriDamageFunction { region }),
        );
        builders.insert(
            (HazardKind::TropicalCyclone, ExposureCategory::BuiltUp),
            |region| Box::new(WindDamageFunction { region }),
        );
        Self { builders }
    }

    /// Look up the built-in curve for a pair.
    pub fn resolve(
        &self,
        hazard: HazardKind,
        exposure: ExposureCategory,
        region: Region,
    ) -> Result<Box<dyn VulnerabilityFn>, AnalysisError> {
        self.builders
            .get(&(hazard, exposure))
            .map(|build| build(region))
            .ok_or_else(|| AnalysisError::NoDamageFunction {
                hazard: hazard.to_string(),
                exposure: exposure.to_string(),
            })
    }
}

/// Resolve the impact function for a run: an explicit expression wins,
/// otherwise the registry decides. Classes-mode callers never get here.
pub fn resolve_for_run(
    cfg: &RunConfig,
    registry: &FunctionRegistry,
    region: Region,
) -> Result<Box<dyn VulnerabilityFn>, AnalysisError> {
    if let Some(source) = &cfg.custom_expression {
        return Ok(Box::new(CustomFunction::parse(source)?));
    }
    registry.resolve(cfg.hazard_kind, cfg.exposure, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use zonalgrid::GeoTransform;

    #[test]
    fn test_registry_resolves_flood_set() {
        let reg = FunctionRegistry::with_builtins();
        for exposure in [
            ExposureCategory::Population,
            ExposureCategory::BuiltUp,
            ExposureCategory::Agriculture,
        ] {
            assert!(reg.resolve(HazardKind::Flood, exposure, Region::Global).is_ok());
        }
    }

    #[test]
    fn test_registry_rejects_unmapped_pairs() {
        let reg = FunctionRegistry::with_builtins();
        let err = reg
            .resolve(HazardKind::TropicalCyclone, ExposureCategory::Population, Region::Asia)
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::NoDamageFunction { .. }));
    }

    #[test]
    fn test_apply_preserves_missing_cells() {
        let hazard = Grid::new(
            array![[600.0f32, f32::NAN], [0.0, 50.0]],
            GeoTransform::north_up(0.0, 2.0, 1.0, -1.0),
            4326,
        )
        .unwrap();
        let factor = MortalityFunction.apply(&hazard);
        assert!(factor.data()[[0, 0]] > 0.5);
        assert!(factor.data()[[0, 1]].is_nan());
        assert!(factor.data()[[1, 0]] >= 0.0);
        assert!(factor.data()[[1, 1]] <= 1.0);
    }

    #[test]
    fn test_custom_function_is_clamped() {
        let f = CustomFunction::parse("x / 10").unwrap();
        assert_eq!(f.factor(5.0), 0.5);
        assert_eq!(f.factor(1000.0), 1.0);
        assert_eq!(f.factor(-5.0), 0.0);
        assert!(f.factor(f64::NAN).is_nan());
    }

    #[test]
    fn test_custom_parse_error_is_configuration() {
        let err = CustomFunction::parse("x +").unwrap_err();
        assert!(err.is_configuration());
    }
}
