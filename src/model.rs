use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, sync::Arc};

use crate::error::{ModelInputError, ModelLoadError};
use crate::features::{FeatureAligner, FeatureRow, RawRow};
use crate::forest::RandomForest;

/// Predicted crop stress level.
///
/// The label set comes from the fitted decoder; anything beyond the three
/// expected levels is carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StressLabel {
    Low,
    Medium,
    High,
    Other(String),
}

impl StressLabel {
    pub fn as_str(&self) -> &str {
        match self {
            StressLabel::Low => "Low",
            StressLabel::Medium => "Medium",
            StressLabel::High => "High",
            StressLabel::Other(s) => s,
        }
    }

    /// Display severity: `error` for High, `warning` for Medium, `success` otherwise.
    pub fn severity(&self) -> &'static str {
        match self {
            StressLabel::High => "error",
            StressLabel::Medium => "warning",
            _ => "success",
        }
    }
}

impl From<String> for StressLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Low" => StressLabel::Low,
            "Medium" => StressLabel::Medium,
            "High" => StressLabel::High,
            _ => StressLabel::Other(s),
        }
    }
}

impl From<&str> for StressLabel {
    fn from(s: &str) -> Self {
        StressLabel::from(s.to_string())
    }
}

impl From<StressLabel> for String {
    fn from(l: StressLabel) -> Self {
        l.as_str().to_string()
    }
}

impl fmt::Display for StressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally trained classifier: one class index per feature row.
pub trait Classifier: Send + Sync {
    /// Input width the classifier was trained on.
    fn n_features(&self) -> usize;

    /// Number of classes the classifier can emit, when it knows.
    fn n_classes(&self) -> Option<usize> {
        None
    }

    fn predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<usize>, ModelInputError>;
}

/// Maps class indices back to labels.
pub trait LabelDecoder: Send + Sync {
    fn decode(&self, indices: &[usize]) -> Result<Vec<StressLabel>, ModelInputError>;
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        RandomForest::n_features(self)
    }

    fn n_classes(&self) -> Option<usize> {
        Some(RandomForest::n_classes(self))
    }

    fn predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<usize>, ModelInputError> {
        matrix
            .iter()
            .map(|row| -> Result<usize, ModelInputError> {
                check_width(row.len(), RandomForest::n_features(self))?;
                Ok(RandomForest::predict(self, row))
            })
            .collect()
    }
}

pub(crate) fn check_width(got: usize, expected: usize) -> Result<(), ModelInputError> {
    if got != expected {
        return Err(ModelInputError::FeatureCount { expected, got });
    }
    Ok(())
}

/// Decoder backed by the fitted encoder's ordered class list.
#[derive(Debug, Clone)]
pub struct ClassList {
    classes: Vec<String>,
}

impl ClassList {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl LabelDecoder for ClassList {
    fn decode(&self, indices: &[usize]) -> Result<Vec<StressLabel>, ModelInputError> {
        indices
            .iter()
            .map(|&index| {
                self.classes
                    .get(index)
                    .map(|c| StressLabel::from(c.as_str()))
                    .ok_or(ModelInputError::UnknownClass {
                        index,
                        classes: self.classes.len(),
                    })
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct MetaJson {
    feat_list: Vec<String>,
    classes: Vec<String>,
    in_dim: Option<usize>,
}

/// Everything loaded from disk at startup.
pub struct ModelArtifacts {
    pub classifier: Arc<dyn Classifier>,
    pub decoder: ClassList,
    pub feat_list: Vec<String>,
    pub in_dim: usize,
}

impl ModelArtifacts {
    /// Load meta.json (feature order + classes) and the classifier.
    ///
    /// With the `torch` feature, a `.pt` / `.ts` model path is loaded as
    /// TorchScript; otherwise it must be a JSON forest export.
    pub fn load(model_path: &Path, meta_path: &Path) -> Result<Self, ModelLoadError> {
        let meta_txt = read(meta_path)?;
        let meta: MetaJson = serde_json::from_str(&meta_txt).map_err(|source| ModelLoadError::Parse {
            path: meta_path.to_path_buf(),
            source,
        })?;
        if meta.feat_list.is_empty() {
            return Err(invalid(meta_path, "feat_list is empty"));
        }
        if meta.classes.is_empty() {
            return Err(invalid(meta_path, "classes is empty"));
        }
        let in_dim = meta.in_dim.unwrap_or(meta.feat_list.len());
        if in_dim != meta.feat_list.len() {
            return Err(invalid(
                meta_path,
                &format!(
                    "in_dim {} does not match feat_list length {}",
                    in_dim,
                    meta.feat_list.len()
                ),
            ));
        }

        let classifier = load_classifier(model_path, in_dim)?;
        if classifier.n_features() != in_dim {
            return Err(invalid(
                model_path,
                &format!(
                    "model expects {} features, meta declares {}",
                    classifier.n_features(),
                    in_dim
                ),
            ));
        }
        if let Some(n) = classifier.n_classes() {
            if n != meta.classes.len() {
                return Err(invalid(
                    meta_path,
                    &format!(
                        "model emits {} classes, meta lists {}",
                        n,
                        meta.classes.len()
                    ),
                ));
            }
        }

        Ok(Self {
            classifier,
            decoder: ClassList::new(meta.classes),
            feat_list: meta.feat_list,
            in_dim,
        })
    }
}

#[cfg(feature = "torch")]
fn load_classifier(model_path: &Path, in_dim: usize) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    let is_torchscript = matches!(
        model_path.extension().and_then(|e| e.to_str()),
        Some("pt") | Some("ts")
    );
    if is_torchscript {
        let model = crate::torch_model::TorchClassifier::load(model_path, in_dim)?;
        return Ok(Arc::new(model));
    }
    load_forest(model_path)
}

#[cfg(not(feature = "torch"))]
fn load_classifier(model_path: &Path, _in_dim: usize) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    load_forest(model_path)
}

fn load_forest(model_path: &Path) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    let txt = read(model_path)?;
    let forest = RandomForest::from_json_str(&txt).map_err(|reason| invalid(model_path, &reason))?;
    Ok(Arc::new(forest))
}

fn read(path: &Path) -> Result<String, ModelLoadError> {
    fs::read_to_string(path).map_err(|source| ModelLoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn invalid(path: &Path, reason: &str) -> ModelLoadError {
    ModelLoadError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Adapts raw rows to the classifier's exact input shape and decodes labels.
#[derive(Clone)]
pub struct StressClassifier {
    classifier: Arc<dyn Classifier>,
    decoder: Arc<dyn LabelDecoder>,
    aligner: FeatureAligner,
}

impl StressClassifier {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        decoder: Arc<dyn LabelDecoder>,
        feat_list: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            decoder,
            aligner: FeatureAligner::new(feat_list),
        }
    }

    pub fn from_artifacts(artifacts: ModelArtifacts) -> Self {
        Self::new(
            artifacts.classifier,
            Arc::new(artifacts.decoder),
            artifacts.feat_list,
        )
    }

    pub fn aligner(&self) -> &FeatureAligner {
        &self.aligner
    }

    /// Classify an already aligned matrix.
    pub fn classify_matrix(&self, matrix: &[Vec<f64>]) -> Result<Vec<StressLabel>, ModelInputError> {
        let expected = self.classifier.n_features();
        for row in matrix {
            check_width(row.len(), expected)?;
        }
        let indices = self.classifier.predict(matrix)?;
        if indices.len() != matrix.len() {
            return Err(ModelInputError::Backend(format!(
                "classifier returned {} predictions for {} rows",
                indices.len(),
                matrix.len()
            )));
        }
        self.decoder.decode(&indices)
    }

    /// One label per raw row; the whole batch fails together.
    pub fn classify(&self, rows: &[RawRow]) -> Result<Vec<StressLabel>, ModelInputError> {
        let matrix = self.aligner.align_batch(rows);
        self.classify_matrix(&matrix)
    }

    pub fn classify_features(&self, row: &FeatureRow) -> Result<StressLabel, ModelInputError> {
        let matrix = vec![self.aligner.align_features(row)];
        let mut labels = self.classify_matrix(&matrix)?;
        labels
            .pop()
            .ok_or_else(|| ModelInputError::Backend("classifier returned no prediction".into()))
    }

    /// Forward an all-zero row to make sure the loaded model answers.
    pub fn warmup(&self) -> Result<StressLabel, ModelInputError> {
        let matrix = vec![vec![0.0; self.aligner.width()]];
        let mut labels = self.classify_matrix(&matrix)?;
        labels
            .pop()
            .ok_or_else(|| ModelInputError::Backend("classifier returned no prediction".into()))
    }
}
