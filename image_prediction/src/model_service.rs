use crate::preprocessing::ImageTensor;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model file not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("Failed to load model from {path:?}: {source}")]
    LoadFailure { path: PathBuf, source: ort::Error },
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Input shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("Invalid output shape: {0}")]
    OutputShape(#[from] ndarray::ShapeError),
    #[error("Classifier returned no scores")]
    EmptyScores,
}

/// A pre-trained image classifier.
///
/// Implementations are loaded once and shared read-only between requests,
/// so `predict` takes `&self` and must not change observable state.
pub trait Classifier: Send + Sync + 'static {
    /// Expected input shape, `[1, height, width, channels]`.
    fn input_shape(&self) -> [usize; 4];

    /// Per-class scores for the single image in `input`.
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError>;
}

/// Index of the largest score. Ties resolve to the lowest index and NaN
/// never wins unless every score is NaN.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, item| {
            if accum.1.is_nan() || item.1 > accum.1 {
                item
            } else {
                accum
            }
        })
}

pub fn classify(
    classifier: &dyn Classifier,
    input: &ImageTensor,
) -> Result<(usize, f32), ClassifierError> {
    let expected = classifier.input_shape();
    if input.shape() != expected.as_slice() {
        return Err(ClassifierError::ShapeMismatch {
            expected: expected.to_vec(),
            got: input.shape().to_vec(),
        });
    }

    let scores = classifier.predict(input)?;
    tracing::debug!("Classifier returned {} scores", scores.len());

    argmax(&scores).ok_or(ClassifierError::EmptyScores)
}
