use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::config::{ChannelOrder, DetectorConfig};
use crate::error::{ModelLoadError, PredictError};
use crate::inference::model::array_to_tensor;

/// Gray used to pad the letterboxed detector input.
const LETTERBOX_FILL: u8 = 114;
/// `cx, cy, w, h` precede the class scores in each candidate row.
const BOX_ATTRS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("torch: {0}")]
    Torch(#[from] tch::TchError),
    #[error("unexpected detector output: {0}")]
    OutputShape(String),
    #[error("detector lock poisoned")]
    Poisoned,
}

/// A face box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl Detection {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

pub trait FaceDetector: Send + Sync {
    /// All faces found in `image`, in whatever order the model produces.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Letterbox geometry used to map boxes back to the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub new_width: u32,
    pub new_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        let pad_x = ((size - new_width) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        let pad_y = ((size - new_height) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        Self {
            scale,
            pad_x,
            pad_y,
            new_width,
            new_height,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Letterboxes `image` into a `[1, 3, size, size]` tensor scaled to `[0, 1]`.
pub fn letterbox_input(image: &RgbImage, size: u32, order: ChannelOrder) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let resized = imageops::resize(
        image,
        letterbox.new_width,
        letterbox.new_height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let channels = match order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    };
    let dim = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, dim, dim));
    for (x, y, px) in canvas.enumerate_pixels() {
        for (plane, &src) in channels.iter().enumerate() {
            tensor[[0, plane, y as usize, x as usize]] = px.0[src] as f32 / 255.0;
        }
    }
    (tensor, letterbox)
}

/// Decodes a raw YOLO head of shape `[1, 4 + classes, candidates]` (or its
/// transpose) into boxes above `threshold`, in source-image coordinates.
pub fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    letterbox: &Letterbox,
    threshold: f32,
) -> Result<Vec<Detection>, DetectorError> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        other => {
            return Err(DetectorError::OutputShape(format!(
                "expected [1, attrs, candidates], got {other:?}"
            )));
        }
    };
    if data.len() != rows * cols {
        return Err(DetectorError::OutputShape(format!(
            "shape {shape:?} does not match {} values",
            data.len()
        )));
    }

    let attrs_first = rows <= cols;
    let (attrs, candidates) = if attrs_first { (rows, cols) } else { (cols, rows) };
    if attrs <= BOX_ATTRS {
        return Err(DetectorError::OutputShape(format!(
            "{attrs} attributes per candidate leaves no class scores"
        )));
    }
    let at = |attr: usize, i: usize| {
        if attrs_first {
            data[attr * candidates + i]
        } else {
            data[i * attrs + attr]
        }
    };

    let mut detections = Vec::new();
    for i in 0..candidates {
        let score = (BOX_ATTRS..attrs)
            .map(|k| at(k, i))
            .fold(f32::NEG_INFINITY, f32::max);
        if score.is_nan() || score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        detections.push(Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: score,
        });
    }
    Ok(detections)
}

fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    sort_by_confidence(&mut detections);

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter = Detection {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        confidence: 0.0,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

/// YOLO face detector exported to TorchScript.
pub struct TorchFaceDetector {
    module: Mutex<CModule>,
    device: Device,
    config: DetectorConfig,
}

impl TorchFaceDetector {
    pub fn load(path: &Path, config: DetectorConfig, device: Device) -> Result<Self, ModelLoadError> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path_str));
        }

        let mut module = CModule::load_on_device(path, device).map_err(|source| ModelLoadError::Torch {
            path: path_str.clone(),
            source,
        })?;
        module.set_eval();
        log::info!(
            "Loaded face detector from {} (input {}px, {:?})",
            path_str,
            config.input_size,
            config.channel_order
        );

        Ok(Self {
            module: Mutex::new(module),
            device,
            config,
        })
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, DetectorError> {
        let module = self.module.lock().map_err(|_| DetectorError::Poisoned)?;
        let output = tch::no_grad(|| module.forward_is(&[IValue::Tensor(input)]))?;
        match output {
            IValue::Tensor(t) => Ok(t),
            IValue::Tuple(values) | IValue::GenericList(values) => values
                .into_iter()
                .find_map(|v| match v {
                    IValue::Tensor(t) => Some(t),
                    _ => None,
                })
                .ok_or_else(|| DetectorError::OutputShape("tuple output holds no tensor".into())),
            other => Err(DetectorError::OutputShape(format!(
                "unsupported output value {other:?}"
            ))),
        }
    }
}

impl FaceDetector for TorchFaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = letterbox_input(image, self.config.input_size, self.config.channel_order);
        let input = array_to_tensor(&input, self.device)?;

        let output = self
            .forward(input)?
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .contiguous();
        let shape: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
        let data = Vec::<f32>::try_from(&output.view([-1]))?;

        let detections = decode_predictions(&data, &shape, &letterbox, self.config.confidence_threshold)?;
        let kept = nms(detections, self.config.iou_threshold);
        log::debug!("Face detector kept {} box(es)", kept.len());
        Ok(kept)
    }
}

/// Picks the single most confident face and crops it out.
#[derive(Clone)]
pub struct FaceLocator {
    detector: Arc<dyn FaceDetector>,
}

impl FaceLocator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    pub fn locate(&self, image: &RgbImage) -> Result<RgbImage, PredictError> {
        let mut detections = self
            .detector
            .detect(image)
            .map_err(|e| PredictError::Internal(format!("Face detection failed: {e}")))?;

        sort_by_confidence(&mut detections);
        let face = detections.first().ok_or(PredictError::NoFaceDetected)?;
        crop_region(image, face)
    }
}

/// Crops the box rounded to whole pixels and clamped to the image.
pub fn crop_region(image: &RgbImage, face: &Detection) -> Result<RgbImage, PredictError> {
    let clamp = |v: f32, max: u32| {
        if v.is_nan() {
            0
        } else {
            v.round().clamp(0.0, max as f32) as u32
        }
    };
    let x1 = clamp(face.x1, image.width());
    let y1 = clamp(face.y1, image.height());
    let x2 = clamp(face.x2, image.width());
    let y2 = clamp(face.y2, image.height());

    if x2 <= x1 || y2 <= y1 {
        return Err(PredictError::EmptyRegion);
    }
    Ok(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}
