pub mod augmentations;
pub mod codec;
pub mod face;
pub mod model;
pub mod predictor;
pub mod preprocess;
pub mod registry;

pub use face::{FaceLocator, TorchFaceDetector};
pub use predictor::Predictor;
pub use registry::ModelRegistry;
