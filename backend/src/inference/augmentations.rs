use image::{Rgb, RgbImage};
use shared::ImageFilters;

use crate::error::PredictError;

/// Integer luminance, ITU-R 601-2 weights in 16.16 fixed point.
fn luma(px: &Rgb<u8>) -> u8 {
    let [r, g, b] = px.0;
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

/// `degenerate + factor * (value - degenerate)`, truncated and clamped.
fn blend(degenerate: u8, value: u8, factor: f32) -> u8 {
    let d = degenerate as f32;
    let out = d + factor * (value as f32 - d);
    out.clamp(0.0, 255.0) as u8
}

pub fn brightness(mut image: RgbImage, factor: f32) -> RgbImage {
    for px in image.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = blend(0, *c, factor);
        }
    }
    image
}

pub fn contrast(mut image: RgbImage, factor: f32) -> RgbImage {
    let pixels = image.pixels().len() as f64;
    let total: u64 = image.pixels().map(|px| luma(px) as u64).sum();
    let mean = (total as f64 / pixels + 0.5) as u8;

    for px in image.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = blend(mean, *c, factor);
        }
    }
    image
}

pub fn saturation(mut image: RgbImage, factor: f32) -> RgbImage {
    for px in image.pixels_mut() {
        let gray = luma(px);
        for c in px.0.iter_mut() {
            *c = blend(gray, *c, factor);
        }
    }
    image
}

/// Applies the non-identity knobs in brightness, contrast, saturation order.
pub fn apply_filters(image: RgbImage, filters: &ImageFilters) -> Result<RgbImage, PredictError> {
    if filters.is_identity() {
        return Ok(image);
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PredictError::Filter("image has no pixels".into()));
    }

    let mut image = image;
    if filters.brightness != ImageFilters::IDENTITY {
        image = brightness(image, factor(filters.brightness));
    }
    if filters.contrast != ImageFilters::IDENTITY {
        image = contrast(image, factor(filters.contrast));
    }
    if filters.saturation != ImageFilters::IDENTITY {
        image = saturation(image, factor(filters.saturation));
    }
    Ok(image)
}

fn factor(percent: i32) -> f32 {
    percent as f32 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 128]))
    }

    fn filters(brightness: i32, contrast: i32, saturation: i32) -> ImageFilters {
        ImageFilters {
            brightness,
            contrast,
            saturation,
        }
    }

    #[test]
    fn identity_filters_return_the_same_pixels() {
        let image = gradient();
        let out = apply_filters(image.clone(), &ImageFilters::default()).unwrap();
        assert_eq!(out.as_raw(), image.as_raw());
    }

    #[test]
    fn zero_brightness_is_black() {
        let out = apply_filters(gradient(), &filters(0, 100, 100)).unwrap();
        assert!(out.pixels().all(|px| px.0 == [0, 0, 0]));
    }

    #[test]
    fn brightness_amplifies_and_clips() {
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 200, 10]));
        let out = apply_filters(image, &filters(150, 100, 100)).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [150, 255, 15]);
    }

    #[test]
    fn zero_contrast_is_flat_mean_gray() {
        let image = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let out = apply_filters(image, &filters(100, 0, 100)).unwrap();
        // mean luminance 127.5 rounds to 128
        assert!(out.pixels().all(|px| px.0 == [128, 128, 128]));
    }

    #[test]
    fn zero_saturation_is_grayscale() {
        let out = apply_filters(gradient(), &filters(100, 100, 0)).unwrap();
        assert!(out.pixels().all(|px| px.0[0] == px.0[1] && px.0[1] == px.0[2]));
        let red = apply_filters(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])), &filters(100, 100, 0)).unwrap();
        assert_eq!(red.get_pixel(0, 0).0, [76, 76, 76]);
    }

    #[test]
    fn order_is_brightness_then_contrast() {
        let image = gradient();
        let applied = apply_filters(image.clone(), &filters(200, 50, 100)).unwrap();
        let manual = contrast(brightness(image.clone(), 2.0), 0.5);
        let reversed = brightness(contrast(image, 0.5), 2.0);
        assert_eq!(applied, manual);
        assert_ne!(applied, reversed);
    }

    #[test]
    fn empty_image_with_active_filter_fails() {
        let err = apply_filters(RgbImage::new(0, 0), &filters(50, 100, 100)).unwrap_err();
        assert!(matches!(err, PredictError::Filter(_)));
        assert!(apply_filters(RgbImage::new(0, 0), &ImageFilters::default()).is_ok());
    }
}
