use crate::classifier::{Classifier, Diagnosis, ScoreModel};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::inference::SkinModel;
use crate::preprocess::{decode_image, open_image, preprocess};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One analysis session: the model is loaded once when the session opens and
/// released when the session is dropped, on every exit path.
pub struct AnalysisSession<M = SkinModel> {
    classifier: Classifier<M>,
}

impl AnalysisSession<SkinModel> {
    pub fn open(config: &AnalysisConfig) -> Result<Self> {
        let model = SkinModel::load(&config.model_path, config.runtime())?;
        Ok(Self::with_model(model, config))
    }
}

impl<M: ScoreModel> AnalysisSession<M> {
    pub fn with_model(model: M, config: &AnalysisConfig) -> Self {
        let classifier = Classifier::new(model)
            .with_image_size(config.image_size)
            .with_threshold(config.probability_threshold);
        Self { classifier }
    }

    pub fn classifier(&self) -> &Classifier<M> {
        &self.classifier
    }

    pub fn analyze_image(&self, img: &DynamicImage) -> Result<Diagnosis> {
        let tensor = preprocess(img, self.classifier.image_size());
        let diagnosis = self.classifier.classify(&tensor)?;
        match &diagnosis {
            Diagnosis::Confident(result) => log::info!(
                "Classified as {} ({:.1}%)",
                result.label,
                result.confidence * 100.0
            ),
            Diagnosis::Inconclusive { max_confidence } => log::info!(
                "Inconclusive: top score {:.4} below threshold {:.2}",
                max_confidence,
                self.classifier.threshold()
            ),
        }
        Ok(diagnosis)
    }

    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let img = decode_image(bytes)?;
        self.analyze_image(&img)
    }

    pub fn analyze_path(&self, path: &Path) -> Result<Diagnosis> {
        let img = open_image(path)?;
        self.analyze_image(&img)
    }
}

impl<M: ScoreModel + Send + Sync + 'static> AnalysisSession<M> {
    /// Runs [`AnalysisSession::analyze_path`] on the blocking pool so the
    /// calling task is never stalled by inference.
    pub async fn analyze_path_async(self: Arc<Self>, path: PathBuf) -> Result<Diagnosis> {
        tokio::task::spawn_blocking(move || self.analyze_path(&path))
            .await
            .map_err(|e| Error::Inference(format!("Analysis task join error: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::FixedScores;
    use crate::classifier::ClassProbabilities;
    use crate::preprocess::ImageTensor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::conditions::SkinCondition;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn session(scores: &[f32]) -> AnalysisSession<FixedScores> {
        AnalysisSession::with_model(FixedScores::new(scores), &AnalysisConfig::default())
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(32, 48, Rgb([180, 120, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn bytes_flow_through_the_pipeline() {
        let session = session(&[0.02, 0.03, 0.05, 0.05, 0.05, 0.75, 0.05]);
        let diagnosis = session.analyze_bytes(&png_bytes()).unwrap();
        assert_eq!(
            diagnosis.result().map(|r| r.condition),
            Some(SkinCondition::MelanocyticNevi)
        );
    }

    #[test]
    fn undecodable_input_is_decode_error() {
        let session = session(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let err = session.analyze_bytes(&[0xFF, 0xD8, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(
            session
                .classifier()
                .model()
                .calls
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
    }

    /// Counts how often it has been released.
    struct CountedModel {
        drops: Arc<AtomicUsize>,
    }

    impl ScoreModel for CountedModel {
        fn scores(&self, _tensor: &ImageTensor) -> Result<ClassProbabilities> {
            ClassProbabilities::new([0.9, 0.02, 0.02, 0.02, 0.02, 0.01, 0.01])
        }
    }

    impl Drop for CountedModel {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn model_is_released_once_after_failed_analysis() {
        let drops = Arc::new(AtomicUsize::new(0));
        let session = AnalysisSession::with_model(
            CountedModel { drops: drops.clone() },
            &AnalysisConfig::default(),
        );
        assert!(matches!(
            session.analyze_bytes(b"not an image"),
            Err(Error::Decode(_))
        ));
        assert!(session.analyze_bytes(&png_bytes()).is_ok());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_is_released_once_after_async_analysis() {
        let drops = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(AnalysisSession::with_model(
            CountedModel { drops: drops.clone() },
            &AnalysisConfig::default(),
        ));
        let err = session
            .clone()
            .analyze_path_async(PathBuf::from("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Path(_)));
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_file_is_reported() {
        let session = session(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let err = session
            .analyze_path(Path::new("/definitely/not/here.jpg"))
            .unwrap_err();
        assert!(matches!(err, Error::Path(_)));
    }

    #[test]
    fn missing_model_prevents_session() {
        let config = AnalysisConfig {
            model_path: std::env::temp_dir().join("dermalyze_absent.onnx"),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            AnalysisSession::open(&config).err(),
            Some(Error::ModelLoad(_))
        ));
    }

    #[tokio::test]
    async fn async_analysis_runs_off_thread() {
        let path = std::env::temp_dir().join(format!("dermalyze_async_{}.png", std::process::id()));
        std::fs::write(&path, png_bytes()).unwrap();
        let session = Arc::new(session(&[0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2]));
        let diagnosis = session.analyze_path_async(path.clone()).await.unwrap();
        assert_eq!(diagnosis, Diagnosis::Inconclusive { max_confidence: 0.2 });
        let _ = std::fs::remove_file(&path);
    }
}
