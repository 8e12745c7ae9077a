mod config;
mod error;
mod inference;
mod routes;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::AppConfig;
use inference::{FaceLocator, ModelRegistry, Predictor, TorchFaceDetector};
use routes::{configure_routes, cors, json_config};
use std::env;
use std::sync::Arc;
use tch::Device;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;
    log::info!("Starting Deepfake Detection API...");

    let device = Device::cuda_if_available();
    log::info!("Running inference on {:?}", device);

    let detector = TorchFaceDetector::load(&config.models.face_detector, config.detector.clone(), device)
        .map_err(|e| startup_error("Failed to load face detector", e))?;
    let registry = ModelRegistry::load(&config.models, device)
        .map_err(|e| startup_error("Failed to initialize models", e))?;
    log::info!("Models initialized successfully ({} classifiers).", registry.len());

    let predictor = web::Data::new(Predictor::new(
        FaceLocator::new(Arc::new(detector)),
        registry,
        config.inference.timeout(),
    ));

    let bind_address = (config.server.host.clone(), config.server.port);
    log::info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    let cors_config = config.cors.clone();
    let max_body_bytes = config.server.max_body_bytes;
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(cors(&cors_config))
            .wrap(Logger::default())
            .app_data(predictor.clone())
            .app_data(json_config(max_body_bytes))
            .configure(configure_routes)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    let result = server.bind(bind_address)?.run().await;
    log::info!("Shutting down Deepfake Detection API...");
    result
}
