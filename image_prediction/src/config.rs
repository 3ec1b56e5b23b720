use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_onnx_file")]
    pub onnx_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_side")]
    pub input_width: u32,
    #[serde(default = "default_input_side")]
    pub input_height: u32,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_onnx_file() -> String {
    "digit_model.onnx".to_string()
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

fn default_input_side() -> u32 {
    224
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            onnx_file: default_onnx_file(),
            num_instances: default_model_instances(),
            input_width: default_input_side(),
            input_height: default_input_side(),
        }
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

/// Optional class names, one per line; line `n` names class index `n`.
#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_dir: PathBuf,
    pub labels_file: String,
}

impl Validatable for LabelsConfig {
    fn get_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_path_joins_dir_and_file() {
        let config = ModelConfig {
            model_dir: PathBuf::from("./weights"),
            onnx_file: "signs.onnx".to_string(),
            ..ModelConfig::default()
        };

        assert_eq!(config.get_path(), PathBuf::from("./weights/signs.onnx"));
    }

    #[test]
    fn test_defaults_match_classifier_input() {
        let config = ModelConfig::default();

        assert_eq!(config.input_width, 224);
        assert_eq!(config.input_height, 224);
        assert!(config.num_instances >= 1);
        assert_eq!(config.get_path(), PathBuf::from("models/digit_model.onnx"));
    }

    #[test]
    fn test_validate_missing_file() {
        let config = LabelsConfig {
            labels_dir: PathBuf::from("./does_not_exist"),
            labels_file: "labels.txt".to_string(),
        };

        let err = config.validate().unwrap_err();
        assert!(err.contains("labels.txt"));
    }
}
