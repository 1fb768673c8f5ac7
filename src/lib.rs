//! Paddy crop stress prediction.
//!
//! Raw farm records are normalized and aligned to the classifier's feature
//! order, classified into a stress level, and then explained by two fixed rule
//! sets (cause, fertilizer advice) plus an optional generated advisory.

pub mod advisory;
pub mod columns;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod features;
pub mod forest;
pub mod model;
pub mod pipeline;
pub mod rules;
pub mod types;

#[cfg(feature = "torch")]
pub mod torch_model;

pub use advisory::{ai_fertilizer_advice, FertilizerAdvisor, TextCompletion};
pub use error::{AdvisoryError, CsvError, ModelInputError, ModelLoadError, PipelineError};
pub use features::{Feature, FeatureAligner, FeatureRow, RawRow};
pub use model::{Classifier, LabelDecoder, StressClassifier, StressLabel};
pub use pipeline::{PredictionRecord, Predictor, StressSummary};
