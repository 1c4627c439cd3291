use crate::conditions::SkinCondition;
use crate::error::{Error, Result};
use crate::preprocess::{ImageTensor, CHANNELS, IMAGE_SIZE};
use serde::{Deserialize, Serialize};

/// Minimum winning score for a confident result (inclusive).
pub const PROBABILITY_THRESHOLD: f32 = 0.5;

/// Anything that turns a preprocessed image into seven raw class scores.
pub trait ScoreModel {
    fn scores(&self, tensor: &ImageTensor) -> Result<ClassProbabilities>;
}

impl<M: ScoreModel + ?Sized> ScoreModel for &M {
    fn scores(&self, tensor: &ImageTensor) -> Result<ClassProbabilities> {
        (**self).scores(tensor)
    }
}

/// Raw model scores, index-aligned to [`SkinCondition::ALL`]. Used as-is,
/// without renormalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities([f32; SkinCondition::COUNT]);

impl ClassProbabilities {
    pub fn new(scores: [f32; SkinCondition::COUNT]) -> Result<Self> {
        for (i, score) in scores.iter().enumerate() {
            if !score.is_finite() || !(0.0..=1.0).contains(score) {
                return Err(Error::Inference(format!(
                    "score {score} for {} is outside [0, 1]",
                    SkinCondition::ALL[i]
                )));
            }
        }
        Ok(Self(scores))
    }

    pub fn from_slice(scores: &[f32]) -> Result<Self> {
        let array: [f32; SkinCondition::COUNT] = scores.try_into().map_err(|_| {
            Error::Inference(format!(
                "model produced {} scores, expected {}",
                scores.len(),
                SkinCondition::COUNT
            ))
        })?;
        Self::new(array)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Highest score; on exact ties the earlier class wins.
    pub fn top(&self) -> (SkinCondition, f32) {
        let mut best = 0;
        let mut max = self.0[0];
        for (i, score) in self.0.iter().enumerate().skip(1) {
            if *score > max {
                max = *score;
                best = i;
            }
        }
        (SkinCondition::ALL[best], max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub condition: SkinCondition,
    pub label: String,
    pub confidence: f32,
    pub description: String,
    pub recommendation: String,
}

impl DiagnosisResult {
    pub fn for_condition(condition: SkinCondition, confidence: f32) -> Self {
        Self {
            condition,
            label: condition.label().to_string(),
            confidence,
            description: condition.description().to_string(),
            recommendation: condition.recommendation().to_string(),
        }
    }
}

/// Outcome of one analysis. `Inconclusive` is a valid result, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Diagnosis {
    Confident(DiagnosisResult),
    Inconclusive { max_confidence: f32 },
}

impl Diagnosis {
    pub fn result(&self) -> Option<&DiagnosisResult> {
        match self {
            Diagnosis::Confident(result) => Some(result),
            Diagnosis::Inconclusive { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Diagnosis::Inconclusive { .. })
    }
}

/// Applies the confidence gate to the top-scoring class.
pub fn decide(probs: &ClassProbabilities, threshold: f32) -> Diagnosis {
    let (condition, max_confidence) = probs.top();
    if max_confidence >= threshold {
        Diagnosis::Confident(DiagnosisResult::for_condition(condition, max_confidence))
    } else {
        Diagnosis::Inconclusive { max_confidence }
    }
}

pub struct Classifier<M> {
    model: M,
    image_size: u32,
    threshold: f32,
}

impl<M: ScoreModel> Classifier<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            image_size: IMAGE_SIZE,
            threshold: PROBABILITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn classify(&self, tensor: &ImageTensor) -> Result<Diagnosis> {
        let size = self.image_size as usize;
        if tensor.shape() != [size, size, CHANNELS] {
            return Err(Error::Inference(format!(
                "tensor shape {:?} does not match [{size}, {size}, {CHANNELS}]",
                tensor.shape()
            )));
        }
        let probs = self.model.scores(tensor)?;
        log::debug!("Model output: {:?}", probs.as_slice());
        Ok(decide(&probs, self.threshold))
    }
}
