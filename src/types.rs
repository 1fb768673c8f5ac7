use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{Feature, FeatureRow};
use crate::pipeline::{PredictionRecord, StressSummary};

/// Manual-entry form. Omitted fields take the form's default values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManualEntry {
    pub hectares: f64,
    pub seed_rate_kg: f64,
    pub dap_20days: f64,
    pub urea_40days: f64,
    pub potash_50days: f64,
    pub rainfall_30d_mm: f64,
}

impl Default for ManualEntry {
    fn default() -> Self {
        Self {
            hectares: 3.0,
            seed_rate_kg: 100.0,
            dap_20days: 150.0,
            urea_40days: 100.0,
            potash_50days: 40.0,
            rainfall_30d_mm: 120.0,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("{field} must be between {min} and {max}, got {value}")]
pub struct ValidationError {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

/// Accepted input range per field on the manual-entry form.
pub fn entry_range(feature: Feature) -> (f64, f64) {
    match feature {
        Feature::Hectares => (1.0, 10.0),
        Feature::SeedRateKg => (50.0, 200.0),
        Feature::Dap20Days => (0.0, 300.0),
        Feature::Urea40Days => (0.0, 300.0),
        Feature::Potash50Days => (0.0, 200.0),
        Feature::Rainfall30dMm => (0.0, 500.0),
    }
}

impl ManualEntry {
    pub fn into_features(self) -> FeatureRow {
        FeatureRow {
            hectares: self.hectares,
            seed_rate_kg: self.seed_rate_kg,
            dap_20days: self.dap_20days,
            urea_40days: self.urea_40days,
            potash_50days: self.potash_50days,
            rainfall_30d_mm: self.rainfall_30d_mm,
        }
    }

    /// Range-check every field, first failure wins (canonical order).
    pub fn validate(self) -> Result<FeatureRow, ValidationError> {
        let row = self.into_features();
        for feature in Feature::ALL {
            let value = row.get(feature);
            let (min, max) = entry_range(feature);
            // NaN fails both comparisons, so check finiteness explicitly
            if !value.is_finite() || value < min || value > max {
                return Err(ValidationError {
                    field: feature.name(),
                    min,
                    max,
                    value,
                });
            }
        }
        Ok(row)
    }
}

/// `/predict` response.
#[derive(Serialize)]
pub struct PredictionOut {
    pub t: i64,
    #[serde(flatten)]
    pub record: PredictionRecord,
    pub severity: &'static str,
}

/// `/predict/batch` response.
#[derive(Serialize)]
pub struct BatchOut {
    pub t: i64,
    pub records: Vec<PredictionRecord>,
    pub summary: StressSummary,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub features: Vec<String>,
    pub advisory_configured: bool,
}
