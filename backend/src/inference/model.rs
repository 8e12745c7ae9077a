use ndarray::Array4;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tch::nn::{self, ModuleT};
use tch::{CModule, Device, Kind, Tensor};

use crate::error::ModelLoadError;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("torch: {0}")]
    Torch(#[from] tch::TchError),
    #[error("expected a single logit, model produced {0} values")]
    OutputShape(usize),
    #[error("model lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Real,
    Fake,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Real => write!(f, "Real"),
            Label::Fake => write!(f, "Fake"),
        }
    }
}

/// A label together with the probability mass assigned to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    pub confidence: f64,
}

impl Verdict {
    /// `p` is the probability of "Real". Exactly 0.5 resolves to Fake.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.5 {
            Self {
                label: Label::Real,
                confidence: p,
            }
        } else {
            Self {
                label: Label::Fake,
                confidence: 1.0 - p,
            }
        }
    }

    pub fn from_logit(logit: f32) -> Self {
        Self::from_probability(sigmoid(logit as f64))
    }

    pub fn is_real(&self) -> bool {
        self.label == Label::Real
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A binary real/fake classifier producing one logit per image.
pub trait Classifier: Send + Sync {
    /// Forward pass without gradient tracking.
    fn logit(&self, input: &Array4<f32>) -> Result<f32, InferenceError>;

    fn infer(&self, input: &Array4<f32>) -> Result<Verdict, InferenceError> {
        Ok(Verdict::from_logit(self.logit(input)?))
    }
}

pub fn array_to_tensor(array: &Array4<f32>, device: Device) -> Result<Tensor, tch::TchError> {
    let shape: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
    let contiguous = array.as_standard_layout();
    let data = contiguous
        .as_slice()
        .ok_or_else(|| tch::TchError::Shape("array is not in standard layout".into()))?;
    Ok(Tensor::from_slice(data).view(shape.as_slice()).to_device(device))
}

fn single_logit(output: &Tensor) -> Result<f32, InferenceError> {
    let flat = output
        .to_kind(Kind::Float)
        .to_device(Device::Cpu)
        .contiguous()
        .view([-1]);
    let values = Vec::<f32>::try_from(&flat)?;
    match values.as_slice() {
        [logit] => Ok(*logit),
        other => Err(InferenceError::OutputShape(other.len())),
    }
}

const STAGE_WIDTHS: [i64; 4] = [64, 128, 256, 512];
const STAGE_DROPOUT: [f64; 4] = [0.3, 0.3, 0.4, 0.4];
/// conv, relu, bn, conv, relu, bn, pool, dropout
const LAYERS_PER_STAGE: usize = 8;

fn same_padding() -> nn::ConvConfig {
    nn::ConvConfig {
        padding: 1,
        ..Default::default()
    }
}

/// The CustomCNN graph. Variable paths follow the PyTorch state-dict keys
/// (`features.N.*`, `classifier.N.*`) so exported weights load unchanged.
pub fn custom_cnn(root: &nn::Path) -> nn::SequentialT {
    let features = root / "features";
    let classifier = root / "classifier";
    let mut net = nn::seq_t();
    let mut in_channels = 3;
    for (stage, (&width, &dropout)) in STAGE_WIDTHS.iter().zip(STAGE_DROPOUT.iter()).enumerate() {
        let base = stage * LAYERS_PER_STAGE;
        net = net
            .add(nn::conv2d(&features / base, in_channels, width, 3, same_padding()))
            .add_fn(|xs| xs.relu())
            .add(nn::batch_norm2d(&features / (base + 2), width, Default::default()))
            .add(nn::conv2d(&features / (base + 3), width, width, 3, same_padding()))
            .add_fn(|xs| xs.relu())
            .add(nn::batch_norm2d(&features / (base + 5), width, Default::default()))
            .add_fn(|xs| xs.max_pool2d_default(2))
            .add_fn_t(move |xs, train| xs.dropout(dropout, train));
        in_channels = width;
    }

    net.add_fn(|xs| xs.adaptive_avg_pool2d([1, 1]).flat_view())
        .add(nn::linear(&classifier / 2, 512, 256, Default::default()))
        .add_fn(|xs| xs.relu())
        .add_fn_t(|xs, train| xs.dropout(0.5, train))
        .add(nn::linear(&classifier / 5, 256, 1, Default::default()))
}

/// CustomCNN evaluated natively with weights from a `VarStore` file.
pub struct CustomCnn {
    net: Mutex<nn::SequentialT>,
    _vs: nn::VarStore,
    device: Device,
}

impl CustomCnn {
    pub fn load(path: &Path, device: Device) -> Result<Self, ModelLoadError> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path_str));
        }

        let mut vs = nn::VarStore::new(device);
        let net = custom_cnn(&vs.root());
        vs.load(path).map_err(|source| ModelLoadError::Torch {
            path: path_str.clone(),
            source,
        })?;
        log::info!("Loaded CustomCNN weights from {}", path_str);

        Ok(Self {
            net: Mutex::new(net),
            _vs: vs,
            device,
        })
    }

    #[cfg(test)]
    fn from_var_store(vs: nn::VarStore, net: nn::SequentialT) -> Self {
        let device = vs.device();
        Self {
            net: Mutex::new(net),
            _vs: vs,
            device,
        }
    }
}

impl Classifier for CustomCnn {
    fn logit(&self, input: &Array4<f32>) -> Result<f32, InferenceError> {
        let xs = array_to_tensor(input, self.device)?;
        let net = self.net.lock().map_err(|_| InferenceError::Poisoned)?;
        let output = tch::no_grad(|| net.forward_t(&xs, false));
        single_logit(&output)
    }
}

/// Any single-logit model exported with TorchScript, e.g. Xception71.
pub struct TorchScriptClassifier {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchScriptClassifier {
    pub fn load(path: &Path, device: Device) -> Result<Self, ModelLoadError> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path_str));
        }

        let mut module = CModule::load_on_device(path, device).map_err(|source| ModelLoadError::Torch {
            path: path_str.clone(),
            source,
        })?;
        module.set_eval();
        log::info!("Loaded TorchScript classifier from {}", path_str);

        Ok(Self {
            module: Mutex::new(module),
            device,
        })
    }
}

impl Classifier for TorchScriptClassifier {
    fn logit(&self, input: &Array4<f32>) -> Result<f32, InferenceError> {
        let xs = array_to_tensor(input, self.device)?;
        let module = self.module.lock().map_err(|_| InferenceError::Poisoned)?;
        let output = tch::no_grad(|| module.forward_ts(&[xs]))?;
        single_logit(&output)
    }
}
