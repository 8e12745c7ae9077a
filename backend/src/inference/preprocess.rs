use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::error::PredictError;

/// Spatial input size shared by both classifiers.
pub const INPUT_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resizes to 224x224 and standardizes with ImageNet statistics into a
/// `[1, 3, 224, 224]` channel-first tensor.
pub fn normalize(image: &RgbImage) -> Result<Array4<f32>, PredictError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PredictError::Preprocess(format!(
            "cannot resize a {}x{} image",
            image.width(),
            image.height()
        )));
    }

    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = px.0[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn output_is_batched_channel_first() {
        let tensor = normalize(&RgbImage::from_pixel(31, 57, Rgb([0, 0, 0]))).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn channels_use_imagenet_statistics() {
        let tensor = normalize(&RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))).unwrap();
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = -IMAGENET_MEAN[1] / IMAGENET_STD[1];
        let blue = -IMAGENET_MEAN[2] / IMAGENET_STD[2];
        assert!((tensor[[0, 0, 100, 100]] - red).abs() < 1e-5);
        assert!((tensor[[0, 1, 0, 223]] - green).abs() < 1e-5);
        assert!((tensor[[0, 2, 223, 0]] - blue).abs() < 1e-5);
    }

    #[test]
    fn is_deterministic() {
        let image = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 6, y as u8 * 8, 77]));
        assert_eq!(normalize(&image).unwrap(), normalize(&image).unwrap());
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = normalize(&RgbImage::new(0, 12)).unwrap_err();
        assert!(matches!(err, PredictError::Preprocess(_)));
    }
}
