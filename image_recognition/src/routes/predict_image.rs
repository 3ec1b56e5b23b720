use crate::{
    prediction::{Prediction, PredictionServiceError},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use image_prediction::PreprocessError;
use thiserror::Error;
use tracing::instrument;

pub const FILE_ERROR_MESSAGE: &str = "File cannot be processed.";
pub const FALLBACK_MESSAGE: &str = "Something went wrong!";

const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("No `file` field in the upload")]
    MissingFile,
    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),
    #[error("Prediction failed: {0}")]
    Prediction(PredictionServiceError),
    #[error("Prediction worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<PredictionServiceError> for PredictImageError {
    fn from(err: PredictionServiceError) -> Self {
        match err {
            PredictionServiceError::Preprocess(PreprocessError::UnreadableImage(msg)) => {
                PredictImageError::UnreadableImage(msg)
            }
            other => PredictImageError::Prediction(other),
        }
    }
}

impl PredictImageError {
    fn outcome(&self) -> &'static str {
        match self {
            PredictImageError::MissingFile => "missing_file",
            PredictImageError::Upload(_) | PredictImageError::UnreadableImage(_) => {
                "unreadable_image"
            }
            PredictImageError::Prediction(_) | PredictImageError::Worker(_) => "internal_error",
        }
    }
}

// Handled failures still answer 200; the body tells the client what happened.
impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let body = match self {
            PredictImageError::MissingFile
            | PredictImageError::Upload(_)
            | PredictImageError::UnreadableImage(_) => {
                tracing::warn!("Rejected upload: {}", self);
                FILE_ERROR_MESSAGE
            }
            PredictImageError::Prediction(_) | PredictImageError::Worker(_) => {
                tracing::error!("Prediction request failed: {}", self);
                FALLBACK_MESSAGE
            }
        };
        (StatusCode::OK, body).into_response()
    }
}

fn render_prediction(prediction: &Prediction) -> String {
    match &prediction.label {
        Some(label) => format!("Prediction: {} ({})", prediction.class_index, label),
        None => format!("Prediction: {}", prediction.class_index),
    }
}

async fn read_file_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, PredictImageError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Request is not a readable multipart form: {}", e);
        PredictImageError::MissingFile
    })?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!("Ignoring field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        tracing::debug!("Received file {:?}: {} bytes", file_name, data.len());
        return Ok(data);
    }

    Err(PredictImageError::MissingFile)
}

async fn run_prediction(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Prediction, PredictImageError> {
    let image_data = read_file_field(multipart).await?;

    let prediction_service = state.prediction_service.clone();
    let prediction =
        tokio::task::spawn_blocking(move || prediction_service.predict(&image_data)).await??;

    Ok(prediction)
}

#[instrument(skip(state, multipart))]
pub async fn predict_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match run_prediction(&state, multipart).await {
        Ok(prediction) => {
            state.metrics.record_request("success");
            state
                .metrics
                .record_prediction_duration(prediction.duration_ms);
            tracing::info!(
                "Predicted class {} (score {:.3})",
                prediction.class_index,
                prediction.score
            );
            (StatusCode::OK, render_prediction(&prediction)).into_response()
        }
        Err(err) => {
            state.metrics.record_request(err.outcome());
            err.into_response()
        }
    }
}
