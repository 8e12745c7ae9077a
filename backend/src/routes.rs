use actix_cors::Cors;
use actix_web::error::InternalError;
use actix_web::rt::time;
use actix_web::{HttpResponse, web};
use log::{error, info, warn};
use shared::{FlagRequest, FlagResponse, HealthResponse, PredictionRequest};
use uuid::Uuid;

use crate::config::CorsConfig;
use crate::error::{ErrorResponse, PredictError};
use crate::inference::Predictor;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/flag").route(web::post().to(flag)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// JSON extractor settings: large enough for base64 photos, and body errors
/// reported as `400 {"detail": ...}`.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let detail = err.to_string();
            warn!("Rejected request body: {}", detail);
            InternalError::from_response(err, HttpResponse::BadRequest().json(ErrorResponse { detail }))
                .into()
        })
}

pub fn cors(config: &CorsConfig) -> Cors {
    let cors = if config.allowed_origins.iter().any(|o| o == "*") {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

async fn predict(
    predictor: web::Data<Predictor>,
    body: web::Json<PredictionRequest>,
) -> Result<HttpResponse, PredictError> {
    let request = body.into_inner();
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Received prediction request: model={}, filters={:?}, isCameraInput={}",
        request_id,
        request.model,
        request.filters,
        request.camera_input()
    );

    let timeout = predictor.timeout();
    let worker = predictor.clone();
    let job = web::block(move || worker.predict(request));

    let outcome = match time::timeout(timeout, job).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(PredictError::Internal(e.to_string())),
        Err(_) => Err(PredictError::Timeout(timeout)),
    };

    match outcome {
        Ok(response) => {
            info!(
                "[{}] Responding isReal={} probability={:.2}",
                request_id, response.is_real, response.probability
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            error!("[{}] Error during prediction: {}", request_id, e);
            Err(e)
        }
    }
}

async fn flag(body: web::Json<FlagRequest>) -> HttpResponse {
    let request = body.into_inner();
    info!("Flagged prediction: id={} feedback={:?}", request.id, request.feedback);
    HttpResponse::Ok().json(FlagResponse::recorded())
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::ok())
}
