mod model_service;
mod ort_service;
mod preprocessing;

pub mod config;

pub use model_service::{argmax, classify, Classifier, ClassifierError};
pub use ort_service::OrtClassifier;
pub use preprocessing::{
    preprocess, ImageTensor, PreprocessError, Preprocessor, CHANNELS, DEFAULT_INPUT_SIDE,
    DEFAULT_MAX_IMAGE_SIDE,
};
