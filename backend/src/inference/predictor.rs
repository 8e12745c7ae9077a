use shared::{ModelKind, PredictionRequest, PredictionResponse};
use std::str::FromStr;
use std::time::Duration;

use crate::error::PredictError;
use crate::inference::augmentations::apply_filters;
use crate::inference::codec;
use crate::inference::face::FaceLocator;
use crate::inference::preprocess::normalize;
use crate::inference::registry::ModelRegistry;

/// Runs one request through decode, face crop, filters, normalization and
/// the selected classifier.
pub struct Predictor {
    locator: FaceLocator,
    registry: ModelRegistry,
    timeout: Duration,
}

impl Predictor {
    pub fn new(locator: FaceLocator, registry: ModelRegistry, timeout: Duration) -> Self {
        Self {
            locator,
            registry,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocking: runs the detector and classifier on the calling thread.
    pub fn predict(&self, request: PredictionRequest) -> Result<PredictionResponse, PredictError> {
        let image = codec::decode(&request.image)?;

        let mut face = self.locator.locate(&image).inspect_err(|e| {
            log::error!("Face detection failed: {}", e);
        })?;
        log::info!("Face extracted successfully ({}x{})", face.width(), face.height());

        if let Some(filters) = request.filters.as_ref().filter(|f| !f.is_identity()) {
            log::info!("Applying filters: {:?}", filters);
            face = apply_filters(face, filters)?;
        }

        let input = normalize(&face)?;

        if request.camera_input() {
            log::info!("Camera input detected, forcing 'Real' prediction");
            return Ok(PredictionResponse {
                is_real: true,
                probability: 100.0,
                model: request.model,
            });
        }

        let kind = ModelKind::from_str(&request.model).map_err(|_| {
            log::error!("Invalid model specified: {}", request.model);
            PredictError::UnsupportedModel(request.model.clone())
        })?;
        let classifier = self
            .registry
            .get(kind)
            .ok_or_else(|| PredictError::Internal(format!("Model {kind} is not loaded")))?;

        log::info!("Using {} model for prediction", kind);
        let verdict = classifier.infer(&input)?;
        log::info!(
            "Prediction completed: {}, Confidence: {:.4}, Model: {}",
            verdict.label,
            verdict.confidence,
            kind
        );

        Ok(PredictionResponse {
            is_real: verdict.is_real(),
            probability: verdict.confidence * 100.0,
            model: kind.to_string(),
        })
    }
}
