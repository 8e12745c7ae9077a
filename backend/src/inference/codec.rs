use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::{ImageReader, RgbImage};
use std::io::Cursor;

use crate::error::PredictError;

const DATA_URI_MARKER: &str = "base64,";

const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Strips an optional `data:<mime>;base64,` header.
pub fn strip_data_uri(data: &str) -> &str {
    match data.split_once(DATA_URI_MARKER) {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Decodes a base64 (optionally data-URI) image into 8-bit RGB.
pub fn decode(data: &str) -> Result<RgbImage, PredictError> {
    let payload: String = strip_data_uri(data)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(PredictError::Decode("empty image payload".into()));
    }

    let bytes = LENIENT_STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| PredictError::Decode(format!("malformed base64: {e}")))?;

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PredictError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| PredictError::Decode(format!("cannot identify image file: {e}")))?;

    Ok(image.to_rgb8())
}
