use serde::Serialize;
use std::io::{Read, Write};

use crate::advisory::{ai_fertilizer_advice, FertilizerAdvisor};
use crate::csv_io;
use crate::error::{ModelInputError, PipelineError};
use crate::features::{FeatureRow, RawRow};
use crate::model::{StressClassifier, StressLabel};
use crate::rules::{fertilizer_advice, stress_cause};

/// One classified farm record with its explanations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub features: FeatureRow,
    /// Normalized input row, kept for export.
    #[serde(skip)]
    pub source: RawRow,
    #[serde(rename = "Predicted Stress")]
    pub stress: StressLabel,
    #[serde(rename = "Cause")]
    pub cause: String,
    #[serde(rename = "Rule_Based_Advice")]
    pub rule_based_advice: String,
    #[serde(rename = "AI_Fertilizer_Advice")]
    pub ai_fertilizer_advice: String,
}

/// Farm counts per predicted level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StressSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub other: usize,
}

impl StressSummary {
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        let mut s = Self::default();
        for r in records {
            match r.stress {
                StressLabel::High => s.high += 1,
                StressLabel::Medium => s.medium += 1,
                StressLabel::Low => s.low += 1,
                StressLabel::Other(_) => s.other += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low + self.other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<PredictionRecord>,
    pub summary: StressSummary,
}

/// Classification plus the three advisory outputs for each record.
#[derive(Clone)]
pub struct Predictor {
    classifier: StressClassifier,
    advisor: FertilizerAdvisor,
}

impl Predictor {
    pub fn new(classifier: StressClassifier, advisor: FertilizerAdvisor) -> Self {
        Self { classifier, advisor }
    }

    pub fn classifier(&self) -> &StressClassifier {
        &self.classifier
    }

    pub fn advisor(&self) -> &FertilizerAdvisor {
        &self.advisor
    }

    fn assemble(&self, features: FeatureRow, source: RawRow, stress: StressLabel) -> PredictionRecord {
        let cause = stress_cause(&features);
        let rule_based_advice = fertilizer_advice(&features);
        let ai_fertilizer_advice = ai_fertilizer_advice(&self.advisor, &features, &stress);
        PredictionRecord {
            features,
            source,
            stress,
            cause,
            rule_based_advice,
            ai_fertilizer_advice,
        }
    }

    /// Single manual-entry record.
    pub fn predict_one(&self, features: FeatureRow) -> Result<PredictionRecord, PipelineError> {
        let stress = self.classifier.classify_features(&features)?;
        Ok(self.assemble(features, features.to_raw(), stress))
    }

    /// Classify the whole batch first; a classification failure aborts it
    /// before any advisory call is made.
    pub fn predict_batch(&self, rows: &[RawRow]) -> Result<Vec<PredictionRecord>, PipelineError> {
        let labels = self.classifier.classify(rows)?;
        if labels.len() != rows.len() {
            return Err(ModelInputError::Backend(format!(
                "{} labels for {} rows",
                labels.len(),
                rows.len()
            ))
            .into());
        }

        let records: Vec<PredictionRecord> = rows
            .iter()
            .zip(labels)
            .map(|(raw, stress)| {
                let source = raw.normalized();
                self.assemble(FeatureRow::from_raw(&source), source, stress)
            })
            .collect();

        tracing::info!("classified batch of {} rows", records.len());
        Ok(records)
    }

    pub fn predict_csv<R: Read>(&self, reader: R) -> Result<BatchReport, PipelineError> {
        let rows = csv_io::read_rows(reader)?;
        self.report(&rows)
    }

    /// Predict a CSV table and write the augmented table back out. The input
    /// header row is kept even when the table has no data rows.
    pub fn export_csv<R: Read, W: Write>(&self, reader: R, writer: W) -> Result<StressSummary, PipelineError> {
        let (headers, rows) = csv_io::read_table(reader)?;
        let report = self.report(&rows)?;
        csv_io::write_records(writer, &headers, &report.records)?;
        Ok(report.summary)
    }

    fn report(&self, rows: &[RawRow]) -> Result<BatchReport, PipelineError> {
        let records = self.predict_batch(rows)?;
        let summary = StressSummary::from_records(&records);
        tracing::info!(
            "stress summary: high={} medium={} low={} other={}",
            summary.high,
            summary.medium,
            summary.low,
            summary.other
        );
        Ok(BatchReport { records, summary })
    }
}
