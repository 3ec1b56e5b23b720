use image_prediction::{
    classify, config::{LabelsConfig, Validatable}, Classifier, ClassifierError, PreprocessError,
    Preprocessor,
};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionServiceError {
    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Classifier failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub score: f32,
    pub label: Option<String>,
    pub duration_ms: u64,
}

/// Decodes an upload, runs it through the shared classifier and names the
/// winning class. Holds no per-request state.
pub struct PredictionService {
    classifier: Arc<dyn Classifier>,
    preprocessor: Preprocessor,
    class_labels: Vec<String>,
}

impl PredictionService {
    pub fn new(classifier: Arc<dyn Classifier>, class_labels: Vec<String>) -> Self {
        let preprocessor = Preprocessor::for_input_shape(classifier.input_shape());
        Self {
            classifier,
            preprocessor,
            class_labels,
        }
    }

    pub fn with_labels_config(
        classifier: Arc<dyn Classifier>,
        labels_config: Option<&LabelsConfig>,
    ) -> Result<Self, PredictionServiceError> {
        let class_labels = match labels_config {
            Some(cfg) => load_labels(&cfg.get_path())?,
            None => Vec::new(),
        };
        tracing::info!("Loaded {} class labels", class_labels.len());

        Ok(Self::new(classifier, class_labels))
    }

    pub fn with_max_image_side(self, max_image_side: u32) -> Self {
        Self {
            preprocessor: self.preprocessor.with_max_image_side(max_image_side),
            ..self
        }
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.preprocessor.output_shape()
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub fn predict(&self, image_data: &[u8]) -> Result<Prediction, PredictionServiceError> {
        let start = Instant::now();
        let input = self.preprocessor.preprocess(image_data)?;
        let (class_index, score) = classify(self.classifier.as_ref(), &input)?;

        let prediction = Prediction {
            class_index,
            score,
            label: self.class_labels.get(class_index).cloned(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            "Predicted class {} with score {:.3} in {}ms",
            prediction.class_index,
            prediction.score,
            prediction.duration_ms
        );

        Ok(prediction)
    }
}

/// Reads one label per line. Trailing blank lines are dropped; a blank line
/// between labels would shift every later class index, so it is an error.
pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = reader
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .collect::<io::Result<Vec<String>>>()?;

    while labels.last().is_some_and(|label| label.is_empty()) {
        labels.pop();
    }

    if let Some(position) = labels.iter().position(|label| label.is_empty()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Empty label on line {}", position + 1),
        ));
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use image_prediction::ImageTensor;
    use std::io::{Cursor, Write};

    struct MockClassifier {
        input_shape: [usize; 4],
    }

    impl Classifier for MockClassifier {
        fn input_shape(&self) -> [usize; 4] {
            self.input_shape
        }

        fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
            // Brightest images land in the highest class.
            let mean = input.mean().unwrap_or(0.0);
            let mut scores = vec![0.0; 10];
            scores[((mean * 9.0).round() as usize).min(9)] = 1.0;
            Ok(scores)
        }
    }

    fn png(color: [u8; 3]) -> Vec<u8> {
        let mut image_data = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, Rgb(color)))
            .write_to(&mut Cursor::new(&mut image_data), ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn service(class_labels: Vec<String>) -> PredictionService {
        let classifier = Arc::new(MockClassifier {
            input_shape: [1, 224, 224, 3],
        });
        PredictionService::new(classifier, class_labels)
    }

    #[test]
    fn test_predict_picks_argmax() {
        let service = service(Vec::new());

        let white = service.predict(&png([255, 255, 255])).unwrap();
        let black = service.predict(&png([0, 0, 0])).unwrap();

        assert_eq!(white.class_index, 9);
        assert_eq!(black.class_index, 0);
        assert_eq!(white.score, 1.0);
        assert_eq!(white.label, None);
    }

    #[test]
    fn test_predict_attaches_label() {
        let labels = (0..10).map(|i| format!("sign_{}", i)).collect();
        let service = service(labels);

        let prediction = service.predict(&png([255, 255, 255])).unwrap();

        assert_eq!(prediction.label.as_deref(), Some("sign_9"));
    }

    #[test]
    fn test_predict_rejects_non_image() {
        let service = service(Vec::new());

        let result = service.predict(b"not an image at all");

        assert!(matches!(
            result,
            Err(PredictionServiceError::Preprocess(
                PreprocessError::UnreadableImage(_)
            ))
        ));
    }

    #[test]
    fn test_preprocessor_follows_classifier_shape() {
        let classifier = Arc::new(MockClassifier {
            input_shape: [1, 64, 32, 3],
        });
        let service = PredictionService::new(classifier, Vec::new());

        assert!(service.predict(&png([10, 20, 30])).is_ok());
    }

    fn labels_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}.txt", name, std::process::id()));
        let mut file = File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    #[test]
    fn test_load_labels() {
        let path = labels_file("labels", "zero\n one \ntwo\n");

        let labels = load_labels(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(labels, vec!["zero", "one", "two"]);
    }

    #[test]
    fn test_load_labels_ignores_trailing_blank_lines() {
        let path = labels_file("labels_trailing", "zero\r\none\n\n  \n");

        let labels = load_labels(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(labels, vec!["zero", "one"]);
    }

    #[test]
    fn test_load_labels_rejects_interior_blank_line() {
        let path = labels_file("labels_gap", "zero\n\ntwo\n");

        let err = load_labels(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_max_image_side_reaches_preprocessor() {
        let service = service(Vec::new()).with_max_image_side(32);

        let result = service.predict(&png([10, 20, 30]));

        assert!(matches!(
            result,
            Err(PredictionServiceError::Preprocess(
                PreprocessError::UnreadableImage(_)
            ))
        ));
    }

    #[test]
    fn test_load_labels_missing_file() {
        assert!(load_labels(Path::new("./missing_labels.txt")).is_err());
    }
}
