use crate::classifier::{ClassProbabilities, ScoreModel};
use crate::error::{Error, Result};
use crate::onnx::{build_session, InferenceProvider, OrtRuntimeConfig};
use crate::preprocess::{ImageTensor, InputLayout};
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The loaded skin lesion model. Owns the ONNX Runtime session; dropping it
/// releases the session.
pub struct SkinModel {
    session: Mutex<Session>,
    provider: InferenceProvider,
    layout: InputLayout,
    model_path: PathBuf,
}

impl SkinModel {
    pub fn load(model_path: &Path, runtime: OrtRuntimeConfig) -> Result<Self> {
        let (session, provider) = build_session(model_path, runtime)?;
        let dims = input_dims(&session);
        if session.outputs.is_empty() {
            return Err(Error::ModelLoad(format!(
                "{} declares no outputs",
                model_path.display()
            )));
        }
        let layout = InputLayout::from_dims(&dims);
        log::info!(
            "Loaded skin model {} on {} (input {:?}, {:?})",
            model_path.display(),
            provider.label(),
            dims,
            layout
        );
        Ok(Self {
            session: Mutex::new(session),
            provider,
            layout,
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn provider(&self) -> InferenceProvider {
        self.provider
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl ScoreModel for SkinModel {
    fn scores(&self, tensor: &ImageTensor) -> Result<ClassProbabilities> {
        let batch = tensor.to_batch(self.layout);
        let input = Tensor::from_array(batch)
            .map_err(|e| Error::Inference(format!("Invalid input tensor: {e}")))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference("model session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| Error::Inference(format!("Failed to run skin model: {e}")))?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| Error::Inference("skin model returned no outputs".into()))?;
        let scores = output
            .try_extract_array::<f32>()
            .map_err(|e| Error::Inference(format!("Unexpected output tensor: {e}")))?;
        let flat: Vec<f32> = scores.iter().copied().collect();
        ClassProbabilities::from_slice(&flat)
    }
}

impl Drop for SkinModel {
    fn drop(&mut self) {
        log::info!("Released skin model {}", self.model_path.display());
    }
}

fn input_dims(session: &Session) -> Vec<i64> {
    session
        .inputs
        .first()
        .and_then(|input| input.input_type.tensor_shape())
        .map(|shape| shape.iter().copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_asset_fails_to_load() {
        let path = std::env::temp_dir().join("dermalyze_no_such_model.onnx");
        let err = SkinModel::load(&path, OrtRuntimeConfig::default()).err().unwrap();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn corrupt_asset_fails_to_load() {
        let path = std::env::temp_dir().join(format!("dermalyze_bad_model_{}.onnx", std::process::id()));
        std::fs::write(&path, [0u8; 64]).unwrap();
        let loaded = std::panic::catch_unwind(|| SkinModel::load(&path, OrtRuntimeConfig::default()));
        let _ = std::fs::remove_file(&path);
        let err = loaded.expect("load must not panic").err().unwrap();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn directory_is_not_a_model() {
        let err = SkinModel::load(&std::env::temp_dir(), OrtRuntimeConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
