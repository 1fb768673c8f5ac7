use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::columns::normalize_column;

/// The six inputs the stress model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Hectares,
    SeedRateKg,
    Dap20Days,
    Urea40Days,
    Potash50Days,
    Rainfall30dMm,
}

impl Feature {
    /// Canonical order, matching the trained feature order.
    pub const ALL: [Feature; 6] = [
        Feature::Hectares,
        Feature::SeedRateKg,
        Feature::Dap20Days,
        Feature::Urea40Days,
        Feature::Potash50Days,
        Feature::Rainfall30dMm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Hectares => "hectares",
            Feature::SeedRateKg => "seed_rate_kg",
            Feature::Dap20Days => "dap_20days",
            Feature::Urea40Days => "urea_40days",
            Feature::Potash50Days => "potash_50days",
            Feature::Rainfall30dMm => "rainfall_30d_mm",
        }
    }

    /// Spellings used by the survey dataset the model was fitted on.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Feature::SeedRateKg => &["seedratein_kg"],
            Feature::Potash50Days => &["potassh_50days"],
            Feature::Rainfall30dMm => &["30drain_in_mm"],
            _ => &[],
        }
    }

    /// All accepted spellings, canonical first.
    pub fn spellings(self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name()).chain(self.aliases().iter().copied())
    }

    /// Resolve an already-normalized column name.
    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL
            .into_iter()
            .find(|f| f.spellings().any(|s| s == name))
    }
}

/// One farm record in model units. Absent inputs are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(default)]
    pub hectares: f64,
    #[serde(default)]
    pub seed_rate_kg: f64,
    #[serde(default)]
    pub dap_20days: f64,
    #[serde(default)]
    pub urea_40days: f64,
    #[serde(default)]
    pub potash_50days: f64,
    #[serde(default)]
    pub rainfall_30d_mm: f64,
}

impl FeatureRow {
    /// Build from a loose name → value mapping.
    ///
    /// Keys are normalized first; the canonical spelling wins over a dataset
    /// alias when both are present. When several keys normalize to the same
    /// name, the lexicographically smallest original key wins. Unknown keys
    /// are ignored.
    pub fn from_map(map: &HashMap<String, f64>) -> Self {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        let mut normalized: HashMap<String, f64> = HashMap::with_capacity(keys.len());
        for k in keys {
            normalized.entry(normalize_column(k)).or_insert(map[k]);
        }
        let mut row = FeatureRow::default();
        for feature in Feature::ALL {
            if let Some(v) = feature.spellings().find_map(|s| normalized.get(s)) {
                row.set(feature, *v);
            }
        }
        row
    }

    /// Build from a raw table row; unparseable cells count as missing.
    pub fn from_raw(raw: &RawRow) -> Self {
        let raw = raw.normalized();
        let mut row = FeatureRow::default();
        for feature in Feature::ALL {
            if let Some(v) = feature.spellings().find_map(|s| raw.number(s)) {
                row.set(feature, v);
            }
        }
        row
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Hectares => self.hectares,
            Feature::SeedRateKg => self.seed_rate_kg,
            Feature::Dap20Days => self.dap_20days,
            Feature::Urea40Days => self.urea_40days,
            Feature::Potash50Days => self.potash_50days,
            Feature::Rainfall30dMm => self.rainfall_30d_mm,
        }
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        let slot = match feature {
            Feature::Hectares => &mut self.hectares,
            Feature::SeedRateKg => &mut self.seed_rate_kg,
            Feature::Dap20Days => &mut self.dap_20days,
            Feature::Urea40Days => &mut self.urea_40days,
            Feature::Potash50Days => &mut self.potash_50days,
            Feature::Rainfall30dMm => &mut self.rainfall_30d_mm,
        };
        *slot = value;
    }

    /// Values in canonical order.
    pub fn values(&self) -> [f64; 6] {
        Feature::ALL.map(|f| self.get(f))
    }

    /// Same row as a normalized raw row (canonical names).
    pub fn to_raw(&self) -> RawRow {
        let mut raw = RawRow::default();
        for feature in Feature::ALL {
            raw.push(feature.name(), self.get(feature).to_string());
        }
        raw
    }
}

/// Caller-supplied record with arbitrary column naming, in input order.
///
/// Cells are kept as text so non-feature columns survive export untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cells.push((name.into(), value.into()));
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Copy of this row keyed by canonical column names.
    pub fn normalized(&self) -> RawRow {
        Self {
            cells: self
                .cells
                .iter()
                .map(|(k, v)| (normalize_column(k), v.clone()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// First cell with this exact name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Numeric value of a cell; empty, unparseable, or non-finite cells are `None`.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

/// Maps normalized rows onto the classifier's expected feature order.
#[derive(Debug, Clone)]
pub struct FeatureAligner {
    feat_list: Vec<String>,
}

impl FeatureAligner {
    pub fn new(feat_list: Vec<String>) -> Self {
        Self { feat_list }
    }

    /// Authoritative input order.
    pub fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    pub fn width(&self) -> usize {
        self.feat_list.len()
    }

    /// Ordered vector for one row: exact name first, then any other spelling
    /// of the same feature, else 0. Extra columns are dropped.
    pub fn align(&self, row: &RawRow) -> Vec<f64> {
        let row = row.normalized();
        let mut v = Vec::with_capacity(self.feat_list.len());
        for k in &self.feat_list {
            let value = row.number(k).or_else(|| {
                Feature::from_name(k)
                    .and_then(|f| f.spellings().find_map(|s| row.number(s)))
            });
            v.push(value.unwrap_or(0.0));
        }
        v
    }

    pub fn align_batch(&self, rows: &[RawRow]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.align(r)).collect()
    }

    pub fn align_features(&self, row: &FeatureRow) -> Vec<f64> {
        self.align(&row.to_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical() -> Vec<String> {
        Feature::ALL.iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn test_from_map_defaults_missing_to_zero() {
        let mut map = HashMap::new();
        map.insert("Urea_40days".to_string(), 60.0);
        map.insert("colour".to_string(), 3.0);
        let row = FeatureRow::from_map(&map);
        assert_eq!(row.urea_40days, 60.0);
        assert_eq!(row.dap_20days, 0.0);
        assert_eq!(row.rainfall_30d_mm, 0.0);
    }

    #[test]
    fn test_from_map_prefers_canonical_over_alias() {
        let mut map = HashMap::new();
        map.insert("potassh_50days".to_string(), 10.0);
        map.insert("potash_50days".to_string(), 45.0);
        assert_eq!(FeatureRow::from_map(&map).potash_50days, 45.0);
    }

    #[test]
    fn test_from_map_colliding_keys_are_stable() {
        // " UREA_40DAYS " sorts first byte-wise, so it wins on every run
        for _ in 0..32 {
            let mut map = HashMap::new();
            map.insert("urea_40days".to_string(), 95.0);
            map.insert("Urea 40days".to_string(), 60.0);
            map.insert(" UREA_40DAYS ".to_string(), 10.0);
            assert_eq!(FeatureRow::from_map(&map).urea_40days, 10.0);
        }
    }

    #[test]
    fn test_from_raw_accepts_dataset_spellings() {
        let raw = RawRow::from_pairs([
            ("30drain_in_mm", "320"),
            ("SeedRateIn (kg)", "110"),
            ("hectares", "not a number"),
        ]);
        let row = FeatureRow::from_raw(&raw);
        assert_eq!(row.rainfall_30d_mm, 320.0);
        assert_eq!(row.seed_rate_kg, 110.0);
        assert_eq!(row.hectares, 0.0);
    }

    #[test]
    fn test_align_fills_missing_and_drops_extra() {
        let aligner = FeatureAligner::new(canonical());
        let raw = RawRow::from_pairs([
            ("Farmer", "Ravi"),
            ("DAP_20days", "120"),
            ("urea_40days", "90"),
        ]);
        assert_eq!(aligner.align(&raw), vec![0.0, 0.0, 120.0, 90.0, 0.0, 0.0]);
    }

    #[test]
    fn test_align_follows_feat_list_order() {
        let feat_list = vec![
            "30drain_in_mm".to_string(),
            "urea_40days".to_string(),
            "hectares".to_string(),
        ];
        let aligner = FeatureAligner::new(feat_list);
        let raw = RawRow::from_pairs([
            ("hectares", "3"),
            ("urea_40days", "100"),
            ("rainfall_30d_mm", "150"),
        ]);
        assert_eq!(aligner.align(&raw), vec![150.0, 100.0, 3.0]);
    }

    #[test]
    fn test_align_unknown_expected_feature_is_zero() {
        let aligner = FeatureAligner::new(vec!["soil_ph".to_string()]);
        let raw = RawRow::from_pairs([("soil_ph", "6.5"), ("urea_40days", "1")]);
        assert_eq!(aligner.align(&raw), vec![6.5]);
        assert_eq!(aligner.align(&RawRow::new()), vec![0.0]);
    }

    #[test]
    fn test_feature_row_roundtrips_through_aligner() {
        let row = FeatureRow {
            hectares: 3.0,
            seed_rate_kg: 100.0,
            dap_20days: 150.0,
            urea_40days: 100.0,
            potash_50days: 40.0,
            rainfall_30d_mm: 120.0,
        };
        let aligner = FeatureAligner::new(canonical());
        assert_eq!(aligner.align_features(&row), row.values().to_vec());
    }
}
