//! Sync configuration module.
//!
//! Handles loading and validating the size/variation/format document that
//! drives the variant matrix, plus the encoding and processing knobs.
//!
//! ## Config File
//!
//! Pass `--config <path>`. Files ending in `.json` are read as JSON, anything
//! else as TOML. When no file is given the stock defaults below apply.
//!
//! ```toml
//! formats = ["[original]", "webp", "avif"]
//!
//! [sizes]                   # named width buckets, in pixels
//! xsmall = 300
//! small = 600
//! medium = 768
//! large = 1026
//! xlarge = 1500
//!
//! [variations]              # named aspect ratios (width / height)
//! original = "preserve"     # keep the source aspect ratio
//! square = 1.0
//! standard = 1.5
//!
//! [encoding]
//! avif_quality = 30
//! avif_speed = 2
//! webp_quality = 30
//! original_quality = 80
//!
//! [processing]
//! max_jobs = 20             # images transcoded at the same time
//! threads = 4               # codec threads (omit for auto = CPU cores)
//! job_timeout_secs = 600    # per-image watchdog (omit for none)
//! ```
//!
//! ## Section Semantics
//!
//! Sections are replaced wholesale: a `[sizes]` table in the user file is the
//! complete list of buckets, not an overlay on the stock buckets. Scalar
//! sections (`[encoding]`, `[processing]`) fill missing keys from defaults.
//!
//! TOML has no null, so "preserve the aspect ratio" is spelled `"preserve"`.
//! JSON documents may use `null` as well.
//!
//! Unknown keys are rejected to catch typos early.

use crate::matrix::OutputFormat;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full sync configuration.
///
/// All sections have defaults matching the stock matrix. Unknown keys are
/// rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Named width buckets, in declaration order.
    pub sizes: IndexMap<String, u32>,
    /// Named aspect variations, in declaration order.
    pub variations: IndexMap<String, AspectRatio>,
    /// Output formats, in declaration order.
    pub formats: Vec<OutputFormat>,
    /// Per-format encoder settings.
    pub encoding: EncodingConfig,
    /// Concurrency and watchdog settings.
    pub processing: ProcessingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let sizes = [
            ("xsmall", 300),
            ("small", 600),
            ("medium", 768),
            ("large", 1026),
            ("xlarge", 1500),
        ]
        .into_iter()
        .map(|(name, width)| (name.to_string(), width))
        .collect();

        let variations = [
            ("original", AspectRatio::PRESERVE),
            ("square", AspectRatio::ratio(1.0)),
            ("standard", AspectRatio::ratio(1.5)),
        ]
        .into_iter()
        .map(|(name, ratio)| (name.to_string(), ratio))
        .collect();

        Self {
            sizes,
            variations,
            formats: vec![OutputFormat::Original, OutputFormat::Webp, OutputFormat::Avif],
            encoding: EncodingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.is_empty() {
            return Err(ConfigError::Validation("sizes must not be empty".into()));
        }
        if let Some((name, _)) = self.sizes.iter().find(|(_, w)| **w == 0) {
            return Err(ConfigError::Validation(format!(
                "sizes.{name} must be a positive width"
            )));
        }
        if self.variations.is_empty() {
            return Err(ConfigError::Validation(
                "variations must not be empty".into(),
            ));
        }
        for (name, ratio) in &self.variations {
            if let Some(r) = ratio.value()
                && !(r.is_finite() && r > 0.0)
            {
                return Err(ConfigError::Validation(format!(
                    "variations.{name} must be a positive ratio or \"preserve\""
                )));
            }
        }
        if self.formats.is_empty() {
            return Err(ConfigError::Validation("formats must not be empty".into()));
        }
        for (key, quality) in [
            ("avif_quality", self.encoding.avif_quality),
            ("webp_quality", self.encoding.webp_quality),
            ("original_quality", self.encoding.original_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::Validation(format!(
                    "encoding.{key} must be 1-100"
                )));
            }
        }
        if !(1..=10).contains(&self.encoding.avif_speed) {
            return Err(ConfigError::Validation(
                "encoding.avif_speed must be 1-10".into(),
            ));
        }
        if self.processing.max_jobs == 0 {
            return Err(ConfigError::Validation(
                "processing.max_jobs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Aspect ratio of a variation: `Some(width / height)` or `None` to keep the
/// source proportions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RatioValue")]
pub struct AspectRatio(Option<f64>);

impl AspectRatio {
    pub const PRESERVE: Self = Self(None);

    pub fn ratio(value: f64) -> Self {
        Self(Some(value))
    }

    pub fn value(self) -> Option<f64> {
        self.0
    }
}

/// Wire representation accepted for a variation value.
#[derive(Deserialize)]
#[serde(untagged)]
enum RatioValue {
    Null,
    Number(f64),
    Keyword(String),
}

impl TryFrom<RatioValue> for AspectRatio {
    type Error = String;

    fn try_from(raw: RatioValue) -> Result<Self, Self::Error> {
        match raw {
            RatioValue::Null => Ok(Self::PRESERVE),
            RatioValue::Number(n) => Ok(Self::ratio(n)),
            RatioValue::Keyword(k) if k == "preserve" || k == "original" => Ok(Self::PRESERVE),
            RatioValue::Keyword(k) => Err(format!(
                "expected a number or \"preserve\", found \"{k}\""
            )),
        }
    }
}

/// Encoder settings. Lossy formats are tuned for small files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub avif_quality: u32,
    /// rav1e speed preset, 1 (slowest) to 10 (fastest).
    pub avif_speed: u8,
    pub webp_quality: u32,
    /// JPEG quality used when re-encoding `[original]` JPEG variants. Output
    /// is baseline, not progressive.
    pub original_quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            avif_quality: 30,
            avif_speed: 2,
            webp_quality: 30,
            original_quality: 80,
        }
    }
}

/// Concurrency settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of images transcoded and uploaded at the same time.
    pub max_jobs: usize,
    /// Codec worker threads. When absent, defaults to the number of CPU
    /// cores. Values larger than the core count are clamped down.
    pub threads: Option<usize>,
    /// Per-image watchdog. A job running longer is reported failed.
    pub job_timeout_secs: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_jobs: 20,
            threads: None,
            job_timeout_secs: None,
        }
    }
}

/// Resolve the effective codec thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .threads
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Parse a config document. The format is chosen by the path's extension.
pub fn parse_config(path: &Path, content: &str) -> Result<SyncConfig, ConfigError> {
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let config: SyncConfig = if is_json {
        serde_json::from_str(content)?
    } else {
        toml::from_str(content)?
    };
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or the stock defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            parse_config(path, &content)
        }
        None => {
            let config = SyncConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Returns a fully-commented stock `imgsync.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgsync configuration
# =====================
# Values shown below are the defaults. The sizes, variations and formats
# sections are each replaced as a whole when present.
# Unknown keys will cause an error.

# Output formats, in order. "[original]" re-encodes in the source's own format.
# Available: "[original]", "webp", "avif", "jpeg", "png"
formats = ["[original]", "webp", "avif"]

# ---------------------------------------------------------------------------
# Width buckets (pixels). Every bucket is combined with every variation and
# every format. Images are never enlarged beyond their native size.
# ---------------------------------------------------------------------------
[sizes]
xsmall = 300
small = 600
medium = 768
large = 1026
xlarge = 1500

# ---------------------------------------------------------------------------
# Aspect variations as width / height. "preserve" keeps the source ratio;
# any other value center-crops to that ratio (height = width / ratio).
# ---------------------------------------------------------------------------
[variations]
original = "preserve"
square = 1.0
standard = 1.5

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# AVIF quality (1-100) and rav1e speed (1 = slowest/best, 10 = fastest).
avif_quality = 30
avif_speed = 2

# WebP quality (1-100), lossy.
webp_quality = 30

# JPEG quality used for "[original]" variants of JPEG sources.
original_quality = 80

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of images transcoded and uploaded at once.
max_jobs = 20

# Codec worker threads (omit for auto = number of CPU cores).
# threads = 4

# Fail an image whose job runs longer than this many seconds (omit for none).
# job_timeout_secs = 600
"##
}
