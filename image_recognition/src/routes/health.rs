use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    model_input_shape: [usize; 4],
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
        model_input_shape: state.prediction_service.input_shape(),
    })
}
