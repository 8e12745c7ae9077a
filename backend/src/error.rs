use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;

use crate::inference::model::InferenceError;

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) detail: String,
}

/// Everything that can end a `/predict` request early.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Invalid image data: {0}")]
    Decode(String),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Extracted face region is empty")]
    EmptyRegion,
    #[error("Unsupported model: {0}. Use 'CustomCNN' or 'Xception71'.")]
    UnsupportedModel(String),
    #[error("Failed to apply filters: {0}")]
    Filter(String),
    #[error("Failed to preprocess image: {0}")]
    Preprocess(String),
    #[error("Model inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Prediction timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::Decode(_)
            | PredictError::NoFaceDetected
            | PredictError::EmptyRegion
            | PredictError::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
            PredictError::Filter(_)
            | PredictError::Preprocess(_)
            | PredictError::Inference(_)
            | PredictError::Timeout(_)
            | PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

/// Startup failures while loading a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model file {0} not found. Please ensure it exists.")]
    NotFound(String),
    #[error("Failed to load model {path}: {source}")]
    Torch {
        path: String,
        #[source]
        source: tch::TchError,
    },
}
