//! TorchScript classifier backend (`--features torch`).

use parking_lot::Mutex;
use std::path::Path;
use tch::{kind::Kind, CModule, Device, Tensor};

use crate::error::{ModelInputError, ModelLoadError};
use crate::model::{check_width, invalid, Classifier};

pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
    in_dim: usize,
    pub n_classes: i64,
}

impl TorchClassifier {
    pub fn load(model_path: &Path, in_dim: usize) -> Result<Self, ModelLoadError> {
        let device = Device::Cpu;

        let model = CModule::load_on_device(model_path, device)
            .map_err(|e| invalid(model_path, &format!("failed to load TorchScript: {e}")))?;

        // zero input of width in_dim must come back as [1, n_classes]
        let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
        let t = model
            .forward_ts(&[dummy])
            .map_err(|e| invalid(model_path, &format!("dummy forward failed: {e}")))?;
        let sz = t.size();
        if sz.len() != 2 || sz[0] != 1 {
            return Err(invalid(model_path, &format!("unexpected model output size: {sz:?}")));
        }

        Ok(Self {
            model: Mutex::new(model),
            device,
            in_dim,
            n_classes: sz[1],
        })
    }
}

impl Classifier for TorchClassifier {
    fn n_features(&self) -> usize {
        self.in_dim
    }

    fn n_classes(&self) -> Option<usize> {
        usize::try_from(self.n_classes).ok()
    }

    /// Argmax over class scores, one forward for the whole batch.
    fn predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<usize>, ModelInputError> {
        if matrix.is_empty() {
            return Ok(Vec::new());
        }
        let mut flat = Vec::with_capacity(matrix.len() * self.in_dim);
        for row in matrix {
            check_width(row.len(), self.in_dim)?;
            flat.extend(row.iter().map(|v| *v as f32));
        }

        let input = Tensor::from_slice(&flat)
            .reshape([matrix.len() as i64, self.in_dim as i64])
            .to_device(self.device);

        let backend = |e: tch::TchError| ModelInputError::Backend(e.to_string());
        let scores = self.model.lock().forward_ts(&[input]).map_err(backend)?;
        let idx = scores.argmax(-1, false).to_kind(Kind::Int64);
        let idx: Vec<i64> = Vec::<i64>::try_from(&idx).map_err(backend)?;

        idx.into_iter()
            .map(|i| usize::try_from(i).map_err(|_| ModelInputError::Backend(format!("negative class index {i}"))))
            .collect()
    }
}
