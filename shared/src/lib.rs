use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The classifiers a client may ask for, by their wire identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ModelKind {
    #[strum(serialize = "CustomCNN")]
    #[serde(rename = "CustomCNN")]
    CustomCnn,
    #[strum(serialize = "Xception71")]
    #[serde(rename = "Xception71")]
    Xception71,
}

/// Cosmetic adjustments in percent. 100 leaves the channel untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFilters {
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
}

impl ImageFilters {
    pub const IDENTITY: i32 = 100;

    pub fn is_identity(&self) -> bool {
        self.brightness == Self::IDENTITY
            && self.contrast == Self::IDENTITY
            && self.saturation == Self::IDENTITY
    }
}

impl Default for ImageFilters {
    fn default() -> Self {
        Self {
            brightness: Self::IDENTITY,
            contrast: Self::IDENTITY,
            saturation: Self::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    /// Base64 image, optionally prefixed with a `data:...;base64,` header.
    pub image: String,
    pub model: String,
    #[serde(default)]
    pub filters: Option<ImageFilters>,
    #[serde(default)]
    pub is_camera_input: Option<bool>,
}

impl PredictionRequest {
    pub fn camera_input(&self) -> bool {
        self.is_camera_input.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub is_real: bool,
    /// Confidence in the returned verdict, in percent.
    pub probability: f64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRequest {
    pub id: String,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagResponse {
    pub status: String,
    pub message: String,
}

impl FlagResponse {
    pub fn recorded() -> Self {
        Self {
            status: "success".into(),
            message: "Feedback recorded".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            message: "Backend is running".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn model_kind_uses_wire_identifiers() {
        assert_eq!(ModelKind::from_str("CustomCNN").unwrap(), ModelKind::CustomCnn);
        assert_eq!(ModelKind::from_str("Xception71").unwrap(), ModelKind::Xception71);
        assert_eq!(ModelKind::CustomCnn.to_string(), "CustomCNN");
        assert_eq!(ModelKind::iter().count(), 2);
    }

    #[test]
    fn model_kind_is_case_sensitive() {
        assert!(ModelKind::from_str("customcnn").is_err());
        assert!(ModelKind::from_str("NotAModel").is_err());
    }

    #[test]
    fn request_defaults_missing_fields() {
        let req: PredictionRequest =
            serde_json::from_str(r#"{"image": "abc", "model": "CustomCNN"}"#).unwrap();
        assert!(req.filters.is_none());
        assert!(!req.camera_input());

        let req: PredictionRequest = serde_json::from_str(
            r#"{"image": "abc", "model": "CustomCNN", "filters": null, "isCameraInput": null}"#,
        )
        .unwrap();
        assert!(req.filters.is_none());
        assert!(!req.camera_input());
    }

    #[test]
    fn partial_filters_fall_back_to_identity() {
        let req: PredictionRequest = serde_json::from_str(
            r#"{"image": "abc", "model": "Xception71", "filters": {"contrast": 150}, "isCameraInput": true}"#,
        )
        .unwrap();
        let filters = req.filters.unwrap();
        assert_eq!(filters.brightness, 100);
        assert_eq!(filters.contrast, 150);
        assert_eq!(filters.saturation, 100);
        assert!(!filters.is_identity());
        assert!(req.camera_input());
        assert!(ImageFilters::default().is_identity());
    }

    #[test]
    fn response_serializes_camel_case() {
        let resp = PredictionResponse {
            is_real: true,
            probability: 87.5,
            model: "CustomCNN".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["isReal"], true);
        assert_eq!(json["probability"], 87.5);
        assert_eq!(json["model"], "CustomCNN");
    }
}
