use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/deepfake.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub models: ModelPaths,
    pub detector: DetectorConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            workers: None,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub custom_cnn: PathBuf,
    pub xception71: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_detector: "models/yolov11m-face.torchscript".into(),
            custom_cnn: "models/CustomCNN_best.safetensors".into(),
            xception71: "models/Xception71_best.torchscript.pt".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl FromStr for ChannelOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Channel order the exported detector was traced with.
    pub channel_order: ChannelOrder,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            channel_order: ChannelOrder::Rgb,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Reads the YAML file named by `DEEPFAKE_CONFIG` (or the default path if
    /// it exists), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("DEEPFAKE_CONFIG").ok();
        let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        let mut config = if explicit.is_some() || Path::new(path).exists() {
            log::info!("Loading configuration from {}", path);
            Self::from_file(path)?
        } else {
            log::info!("No config file at {}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Yaml {
            path: path_str,
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// `lookup` resolves an environment key; tests pass a closure over a map.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "PORT", &mut self.server.port)?;
        if let Some(workers) = lookup("WORKERS") {
            self.server.workers = Some(parse_value("WORKERS", workers)?);
        }
        override_parsed(&lookup, "MAX_BODY_BYTES", &mut self.server.max_body_bytes)?;

        if let Some(origins) = lookup("FRONTEND_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(path) = lookup("FACE_DETECTOR_PATH") {
            self.models.face_detector = path.into();
        }
        if let Some(path) = lookup("CUSTOM_CNN_WEIGHTS") {
            self.models.custom_cnn = path.into();
        }
        if let Some(path) = lookup("XCEPTION71_WEIGHTS") {
            self.models.xception71 = path.into();
        }

        override_parsed(&lookup, "DETECTOR_INPUT_SIZE", &mut self.detector.input_size)?;
        override_parsed(&lookup, "DETECTOR_CONFIDENCE", &mut self.detector.confidence_threshold)?;
        override_parsed(&lookup, "DETECTOR_IOU", &mut self.detector.iou_threshold)?;
        override_parsed(&lookup, "DETECTOR_CHANNEL_ORDER", &mut self.detector.channel_order)?;

        override_parsed(&lookup, "INFERENCE_TIMEOUT_SECS", &mut self.inference.timeout_secs)?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_value(key, raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_detector_conventions() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.detector.channel_order, ChannelOrder::Rgb);
        assert!((config.detector.confidence_threshold - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.inference.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9090
cors:
  allowed_origins:
    - https://app.example.com
detector:
  channel_order: bgr
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.cors.allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(config.detector.channel_order, ChannelOrder::Bgr);
        assert!((config.detector.iou_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            config.models.custom_cnn,
            PathBuf::from("models/CustomCNN_best.safetensors")
        );
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("PORT", "8081"),
                ("WORKERS", "4"),
                ("FRONTEND_ORIGINS", "https://a.example, https://b.example ,"),
                ("XCEPTION71_WEIGHTS", "/srv/xception.pt"),
                ("DETECTOR_CHANNEL_ORDER", "BGR"),
                ("INFERENCE_TIMEOUT_SECS", "5"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.models.xception71, PathBuf::from("/srv/xception.pt"));
        assert_eq!(config.detector.channel_order, ChannelOrder::Bgr);
        assert_eq!(config.inference.timeout_secs, 5);
    }

    #[test]
    fn unparseable_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { key: "PORT", .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
