mod health;
mod index;
mod metrics;
mod predict_image;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

#[cfg(test)]
pub use predict_image::{FALLBACK_MESSAGE, FILE_ERROR_MESSAGE};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index::index))
        .route("/prediction", post(predict_image::predict_image))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
