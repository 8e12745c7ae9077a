use shared::ModelKind;
use std::collections::HashMap;
use std::sync::Arc;
use tch::Device;

use crate::config::ModelPaths;
use crate::error::ModelLoadError;
use crate::inference::model::{Classifier, CustomCnn, TorchScriptClassifier};

/// Loaded classifiers, one per `ModelKind`. Built once, read-only afterwards.
#[derive(Clone)]
pub struct ModelRegistry {
    models: HashMap<ModelKind, Arc<dyn Classifier>>,
}

impl ModelRegistry {
    pub fn new<I>(models: I) -> Self
    where
        I: IntoIterator<Item = (ModelKind, Arc<dyn Classifier>)>,
    {
        Self {
            models: models.into_iter().collect(),
        }
    }

    /// Loads every classifier eagerly; any missing artifact aborts.
    pub fn load(paths: &ModelPaths, device: Device) -> Result<Self, ModelLoadError> {
        log::info!("Initializing CustomCNN...");
        let custom_cnn: Arc<dyn Classifier> = Arc::new(CustomCnn::load(&paths.custom_cnn, device)?);

        log::info!("Initializing Xception71...");
        let xception71: Arc<dyn Classifier> = Arc::new(TorchScriptClassifier::load(&paths.xception71, device)?);

        Ok(Self::new([
            (ModelKind::CustomCnn, custom_cnn),
            (ModelKind::Xception71, xception71),
        ]))
    }

    pub fn get(&self, kind: ModelKind) -> Option<Arc<dyn Classifier>> {
        self.models.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
