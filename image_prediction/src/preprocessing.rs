use image::{imageops::FilterType, Limits};
use ndarray::{Array, Array4};
use std::io::Cursor;
use thiserror::Error;

pub const DEFAULT_INPUT_SIDE: u32 = 224;
pub const CHANNELS: usize = 3;
pub const DEFAULT_MAX_IMAGE_SIDE: u32 = 4096;

/// Batch of one image laid out as `[batch, height, width, channel]`.
pub type ImageTensor = Array4<f32>;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Turns encoded image bytes into the tensor the classifier was trained on.
///
/// Images are resized to exactly `width x height` with bilinear resampling
/// (aspect ratio is not kept), converted to 8-bit RGB and scaled to `[0, 1]`.
/// Inputs wider or taller than `max_image_side` are rejected before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    max_image_side: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIDE, DEFAULT_INPUT_SIDE)
    }
}

impl Preprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            max_image_side: DEFAULT_MAX_IMAGE_SIDE,
        }
    }

    pub fn with_max_image_side(self, max_image_side: u32) -> Self {
        Self {
            max_image_side,
            ..self
        }
    }

    /// Builds a preprocessor from an NHWC input shape `[1, height, width, 3]`.
    pub fn for_input_shape(shape: [usize; 4]) -> Self {
        Self::new(shape[2] as u32, shape[1] as u32)
    }

    pub fn output_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, CHANNELS]
    }

    pub fn preprocess(&self, image_data: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let mut image_reader = image::ImageReader::new(Cursor::new(image_data))
            .with_guessed_format()
            .map_err(|e| PreprocessError::UnreadableImage(e.to_string()))?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_image_side);
        limits.max_image_height = Some(self.max_image_side);
        image_reader.limits(limits);

        let decoded = image_reader
            .decode()
            .map_err(|e| PreprocessError::UnreadableImage(e.to_string()))?;

        let img = decoded
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();

        let data: Vec<f32> = img
            .into_raw()
            .into_iter()
            .map(|value| value as f32 / 255.)
            .collect();

        let input = Array::from_shape_vec(self.output_shape(), data)?;

        Ok(input)
    }
}

/// Preprocesses with the default 224x224 input size.
pub fn preprocess(image_data: &[u8]) -> Result<ImageTensor, PreprocessError> {
    Preprocessor::default().preprocess(image_data)
}
