//! Fixed agronomy thresholds for explaining stress and suggesting fertilizer.
//!
//! Both rule sets check nutrients in the same order (nitrogen, phosphorus,
//! potassium) and never look at the predicted label.

use crate::features::FeatureRow;

/// Urea (kg) at 40 days below this is low nitrogen.
pub const UREA_MIN_KG: f64 = 80.0;
/// DAP (kg) at 20 days below this is low phosphorus.
pub const DAP_MIN_KG: f64 = 100.0;
/// Potash (kg) at 50 days below this is low potassium.
pub const POTASH_MIN_KG: f64 = 40.0;
/// Rainfall (mm) over the first 30 days above this is excess.
pub const RAINFALL_MAX_MM: f64 = 300.0;

pub const BALANCED: &str = "Balanced crop management";
pub const ADEQUATE: &str = "Fertilizer application adequate";

struct Rule {
    fires: fn(&FeatureRow) -> bool,
    cause: Option<&'static str>,
    advice: Option<&'static str>,
}

const RULES: [Rule; 4] = [
    Rule {
        fires: |r| r.urea_40days < UREA_MIN_KG,
        cause: Some("Low nitrogen application"),
        advice: Some("Apply Urea"),
    },
    Rule {
        fires: |r| r.dap_20days < DAP_MIN_KG,
        cause: Some("Low phosphorus supply"),
        advice: Some("Apply DAP"),
    },
    Rule {
        fires: |r| r.potash_50days < POTASH_MIN_KG,
        cause: Some("Low potassium supply"),
        advice: Some("Apply Potash"),
    },
    // rainfall explains stress but is not something to fertilize for
    Rule {
        fires: |r| r.rainfall_30d_mm > RAINFALL_MAX_MM,
        cause: Some("Excess rainfall stress"),
        advice: None,
    },
];

fn evaluate(row: &FeatureRow, pick: fn(&Rule) -> Option<&'static str>, fallback: &str) -> String {
    let hits: Vec<&str> = RULES
        .iter()
        .filter(|rule| (rule.fires)(row))
        .filter_map(pick)
        .collect();
    if hits.is_empty() {
        return fallback.to_string();
    }
    hits.join(", ")
}

/// Likely cause(s) of stress, joined with `", "`.
pub fn stress_cause(row: &FeatureRow) -> String {
    evaluate(row, |r| r.cause, BALANCED)
}

/// Rule-based fertilizer recommendation, joined with `", "`.
pub fn fertilizer_advice(row: &FeatureRow) -> String {
    evaluate(row, |r| r.advice, ADEQUATE)
}
