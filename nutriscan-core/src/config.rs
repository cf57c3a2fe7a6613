//! Configuration system for nutriscan.
//!
//! Uses `figment` for layered configuration: defaults -> `nutriscan.toml` ->
//! explicit config file -> environment. Every section is optional in the file;
//! missing keys fall back to the built-in defaults below.

use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-local config file picked up automatically.
pub const LOCAL_CONFIG_FILE: &str = "nutriscan.toml";

/// Environment variable prefix (`NUTRISCAN_GATEWAY__PORT=9000`).
pub const ENV_PREFIX: &str = "NUTRISCAN_";

/// The ingredient classes the bundled model was trained on, in output order.
pub const DEFAULT_VOCABULARY: [&str; 10] = [
    "Brokoli",
    "Cumi",
    "Daging Ayam",
    "Daging Sapi",
    "Ikan",
    "Jagung",
    "Kentang",
    "Tahu",
    "Telur",
    "Wortel",
];

/// Top-level nutriscan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutriscanConfig {
    /// Model artifact provisioning and runtime.
    #[serde(default)]
    pub model: ModelConfig,
    /// Image preprocessing.
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Pipeline variant: vocabulary, nutrition join, image echo.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// HTTP gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NutriscanConfig {
    /// Reject values that would make the service unable to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preprocess.target_width == 0 || self.preprocess.target_height == 0 {
            return Err(ConfigError::invalid(
                "preprocess.target_width/target_height",
                "must be non-zero",
            ));
        }
        if self.preprocess.max_image_dimension == 0 {
            return Err(ConfigError::invalid(
                "preprocess.max_image_dimension",
                "must be non-zero",
            ));
        }
        if self.pipeline.vocabulary.is_empty() {
            return Err(ConfigError::invalid(
                "pipeline.vocabulary",
                "at least one label is required",
            ));
        }
        if !(1..=100).contains(&self.pipeline.echo_quality) {
            return Err(ConfigError::invalid(
                "pipeline.echo_quality",
                "must be between 1 and 100",
            ));
        }
        if self.model.session_pool_size == 0 {
            return Err(ConfigError::invalid(
                "model.session_pool_size",
                "must be at least 1",
            ));
        }
        if self.model.max_fetch_attempts == 0 {
            return Err(ConfigError::invalid(
                "model.max_fetch_attempts",
                "must be at least 1",
            ));
        }
        if self.gateway.max_upload_bytes == 0 {
            return Err(ConfigError::invalid(
                "gateway.max_upload_bytes",
                "must be non-zero",
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "gateway.request_timeout_secs",
                "must be non-zero",
            ));
        }
        if self.gateway.max_concurrent_predictions == 0 {
            return Err(ConfigError::invalid(
                "gateway.max_concurrent_predictions",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Model artifact provisioning and ONNX Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// YAML manifest with the artifact filename and SHA-256 digest.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
    /// Directory the artifact lives in.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Fallback download URL when the manifest carries none.
    #[serde(default)]
    pub source_url: Option<String>,
    /// TCP connect timeout for the artifact download (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total timeout for the artifact download (seconds).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// Attempts per startup; only network failures are retried.
    #[serde(default = "default_fetch_attempts")]
    pub max_fetch_attempts: u32,
    /// Number of ONNX sessions; each serves one forward pass at a time.
    #[serde(default = "default_pool_size")]
    pub session_pool_size: usize,
    /// Intra-op threads per session (ONNX Runtime default if unset).
    #[serde(default)]
    pub intra_threads: Option<usize>,
    /// Input tensor name (first model input if unset).
    #[serde(default)]
    pub input_name: Option<String>,
    /// Output tensor name (first model output if unset).
    #[serde(default)]
    pub output_name: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            model_dir: default_model_dir(),
            source_url: None,
            connect_timeout_secs: default_connect_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_fetch_attempts: default_fetch_attempts(),
            session_pool_size: default_pool_size(),
            intra_threads: None,
            input_name: None,
            output_name: None,
        }
    }
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("data/model.yaml")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    600
}

fn default_fetch_attempts() -> u32 {
    1
}

fn default_pool_size() -> usize {
    1
}

/// Resampling kernel used to resize uploads to the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    /// Bicubic.
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Image preprocessing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_target_side")]
    pub target_width: u32,
    #[serde(default = "default_target_side")]
    pub target_height: u32,
    #[serde(default)]
    pub resize_filter: ResizeFilter,
    /// Largest accepted width or height of a decoded upload (pixels).
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_side(),
            target_height: default_target_side(),
            resize_filter: ResizeFilter::default(),
            max_image_dimension: default_max_image_dimension(),
        }
    }
}

fn default_target_side() -> u32 {
    224
}

fn default_max_image_dimension() -> u32 {
    8192
}

/// Encoding used when echoing the uploaded image back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoFormat {
    /// Lossy JPEG at `echo_quality`.
    #[default]
    Jpeg,
    /// Lossless WebP. Preserves alpha; usually larger than the upload.
    Webp,
}

impl EchoFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Pipeline variant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Class labels in model output order.
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
    /// Attach the nutrition record of the top label to responses.
    #[serde(default = "default_true")]
    pub nutrition_enabled: bool,
    /// YAML mapping of label -> nutrition record.
    #[serde(default = "default_nutrition_path")]
    pub nutrition_path: PathBuf,
    /// Return the upload as a data URI alongside the prediction.
    #[serde(default = "default_true")]
    pub echo_image: bool,
    #[serde(default)]
    pub echo_format: EchoFormat,
    /// JPEG quality (1-100). Lossless WebP has no quality knob.
    #[serde(default = "default_echo_quality")]
    pub echo_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_vocabulary(),
            nutrition_enabled: true,
            nutrition_path: default_nutrition_path(),
            echo_image: true,
            echo_format: EchoFormat::default(),
            echo_quality: default_echo_quality(),
        }
    }
}

fn default_vocabulary() -> Vec<String> {
    DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect()
}

fn default_nutrition_path() -> PathBuf {
    PathBuf::from("data/nutrition.yaml")
}

fn default_echo_quality() -> u8 {
    80
}

fn default_true() -> bool {
    true
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive for stderr when no `-v` flag or `RUST_LOG` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the rolling JSON log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_true")]
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: default_log_dir(),
            file_logging: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `NUTRISCAN_`, nested with `__`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`nutriscan.toml` in `workspace`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<NutriscanConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(NutriscanConfig::default()));

    if let Some(ws) = workspace {
        let local = ws.join(LOCAL_CONFIG_FILE);
        if local.exists() {
            figment = figment.merge(Toml::file(&local));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::invalid(
                "config",
                format!("file {} does not exist", path.display()),
            ));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: NutriscanConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
