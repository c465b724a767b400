//! Processor configuration module.
//!
//! Handles loading and validating the processor's TOML config. A single file
//! describes where images live, how their URLs are built, which presets exist,
//! and what happens to an upload right after it is stored.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! image_path = "files/img"   # Storage root (alias: imagePath)
//! image_url = "/files/img"   # Public URL base (alias: imageUrl)
//! file_mode = 0o777          # Mode of created directories (alias: fileMode)
//! force_process = false      # Generate missing variants on URL lookup (alias: forceProcess)
//! backend = "lanczos3"       # Resampling: lanczos3 | catmull_rom | triangle | nearest
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//!
//! [presets]
//! small = [{ thumb = { width = 100, height = 100 } }]
//! large = [{ quality = 90 }, { resize = { width = 800, height = 600 } }]
//!
//! [after_upload_process]     # alias: afterUploadProcess
//! condition = { max_width = 1280, max_height = 1280 }
//! actions = [{ resize = { width = 1280, height = 1280 } }]
//! ```
//!
//! Every preset is compiled during [`ProcessorConfig::validate`], so an
//! unknown operation or a missing required parameter is reported at load
//! time rather than on the first request that uses the preset.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Dimensions, ImageBackend, RustBackend};
use crate::preset::{Action, Preset, PresetError, RawAction};
use crate::storage::{ORIGINAL, is_path_segment};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid preset \"{preset}\": {source}")]
    Preset {
        preset: String,
        #[source]
        source: PresetError,
    },
}

/// Processor configuration loaded from TOML.
///
/// All fields have defaults; a config file need only specify what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Storage root for originals and variants.
    #[serde(alias = "imagePath")]
    pub image_path: PathBuf,
    /// Public URL base mirroring `image_path`.
    #[serde(alias = "imageUrl")]
    pub image_url: String,
    /// Permission bits for directories the processor creates.
    #[serde(alias = "fileMode")]
    pub file_mode: u32,
    /// Default for URL lookups: generate the variant when it is missing.
    #[serde(alias = "forceProcess")]
    pub force_process: bool,
    /// Which transform engine to construct.
    pub backend: BackendKind,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Preset name → ordered action list.
    pub presets: BTreeMap<String, Vec<RawAction>>,
    /// Optional transform applied to every new upload.
    #[serde(alias = "afterUploadProcess")]
    pub after_upload_process: Option<AfterUploadConfig>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("files/img"),
            image_url: "/files/img".to_string(),
            file_mode: 0o777,
            force_process: false,
            backend: BackendKind::default(),
            processing: ProcessingConfig::default(),
            presets: BTreeMap::new(),
            after_upload_process: None,
        }
    }
}

impl ProcessorConfig {
    /// Validate values and compile every action list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_mode > 0o7777 {
            return Err(ConfigError::Validation(format!(
                "file_mode {:#o} is not a permission mode",
                self.file_mode
            )));
        }
        for name in self.presets.keys() {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "preset names must be non-empty".into(),
                ));
            }
            if !is_path_segment(name) {
                return Err(ConfigError::Validation(format!(
                    "preset name {name:?} must be a single path segment"
                )));
            }
            if name == ORIGINAL {
                return Err(ConfigError::Validation(format!(
                    "\"{ORIGINAL}\" is reserved for original uploads and cannot be a preset"
                )));
            }
        }
        if let Some(policy) = &self.after_upload_process {
            if let Some(condition) = &policy.condition
                && condition.max_width.is_none()
                && condition.max_height.is_none()
            {
                return Err(ConfigError::Validation(
                    "after_upload_process.condition must set max_width or max_height".into(),
                ));
            }
            policy.compile()?;
        }
        self.compile_presets()?;
        Ok(())
    }

    /// Bind every preset's actions against the operation schema.
    pub fn compile_presets(&self) -> Result<BTreeMap<String, Preset>, ConfigError> {
        self.presets
            .iter()
            .map(|(name, raw)| {
                Preset::compile(name, raw)
                    .map(|preset| (name.clone(), preset))
                    .map_err(|source| ConfigError::Preset {
                        preset: name.clone(),
                        source,
                    })
            })
            .collect()
    }
}

/// Resampling filter of the built-in engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Lanczos3,
    CatmullRom,
    Triangle,
    Nearest,
}

impl BackendKind {
    pub fn filter(self) -> FilterType {
        match self {
            Self::Lanczos3 => FilterType::Lanczos3,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Triangle => FilterType::Triangle,
            Self::Nearest => FilterType::Nearest,
        }
    }

    /// Construct a fresh, unloaded engine.
    pub fn create(self) -> Box<dyn ImageBackend> {
        Box::new(RustBackend::with_filter(self.filter()))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Post-upload transform policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AfterUploadConfig {
    /// When absent, the actions run on every upload.
    #[serde(default)]
    pub condition: Option<SizeCondition>,
    pub actions: Vec<RawAction>,
}

impl AfterUploadConfig {
    pub fn compile(&self) -> Result<Vec<Action>, ConfigError> {
        Preset::compile("after_upload_process", &self.actions)
            .map(|preset| preset.actions)
            .map_err(|source| ConfigError::Preset {
                preset: "after_upload_process".into(),
                source,
            })
    }
}

/// Size thresholds; exceeding either one triggers the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizeCondition {
    #[serde(alias = "maxWidth")]
    pub max_width: Option<u32>,
    #[serde(alias = "maxHeight")]
    pub max_height: Option<u32>,
}

impl SizeCondition {
    pub fn is_exceeded_by(&self, dims: Dimensions) -> bool {
        self.max_width.is_some_and(|max| dims.width > max)
            || self.max_height.is_some_and(|max| dims.height > max)
    }
}

/// Load and validate a config file.
///
/// A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<ProcessorConfig, ConfigError> {
    if !path.exists() {
        return Ok(ProcessorConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let config: ProcessorConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgpreset configuration
# =======================
# All options are optional. Values shown are the defaults unless noted.
# camelCase aliases (imagePath, imageUrl, fileMode, forceProcess,
# afterUploadProcess, maxWidth, maxHeight) are accepted as well.

# Storage root. Layout: <image_path>/<namespace>/<preset|orig>/<shard>/<file>
image_path = "files/img"

# Public URL base, mirroring the storage layout.
image_url = "/files/img"

# Permission bits for directories created by the processor.
file_mode = 0o777

# Generate a missing variant when its URL is requested.
force_process = false

# Resampling filter: lanczos3 | catmull_rom | triangle | nearest
backend = "lanczos3"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Presets
# ---------------------------------------------------------------------------
# Each preset is an ordered list of single-key tables.
#   { name = { ... } }  runs an operation with named parameters
#   { name = value }    sets a property (quality = 1-100, format = "png")
#
# Operations (required parameters marked *):
#   resize         width, height, proportional = true
#   thumb          width, height, proportional = true   (never upscales)
#   adaptiveThumb  width*, height*                      (cover, then crop)
#   crop           width*, height*, startX, startY      (centered by default)
#   rotate         degrees*, backgroundColor = "#000000"
#   flip           mode* = "horizontal" | "vertical" | "both"
#   resizeCanvas   width*, height*, backgroundColor = "#FFFFFF"
#   watermark      file*, offsetX*, offsetY*, corner = "right-bottom"
#   text           text*, fontFile*, size = 12, color = "#000000",
#                  corner = "left-top", offsetX = 0, offsetY = 0, angle = 0
[presets]
# small = [{ thumb = { width = 100, height = 100 } }]
# large = [{ quality = 90 }, { resize = { width = 800, height = 600 } }]

# ---------------------------------------------------------------------------
# After upload
# ---------------------------------------------------------------------------
# Transform new uploads in place, keeping the untouched file as backup_<name>.
# Without a condition the actions run on every upload.
# [after_upload_process]
# condition = { max_width = 1280, max_height = 1280 }
# actions = [{ resize = { width = 1280, height = 1280 } }]
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ProcessorConfig::default();
        assert_eq!(config.image_path, PathBuf::from("files/img"));
        assert_eq!(config.image_url, "/files/img");
        assert_eq!(config.file_mode, 0o777);
        assert!(!config.force_process);
        assert_eq!(config.backend, BackendKind::Lanczos3);
        assert!(config.presets.is_empty());
        assert!(config.after_upload_process.is_none());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
image_path = "/srv/img"
force_process = true
"#;
        let config: ProcessorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.image_path, PathBuf::from("/srv/img"));
        assert!(config.force_process);
        // Unspecified values should be defaults
        assert_eq!(config.image_url, "/files/img");
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let toml = r#"
imagePath = "/srv/img"
imageUrl = "https://cdn.example.com/img"
fileMode = 0o755
forceProcess = true

[afterUploadProcess]
condition = { maxWidth = 1000 }
actions = [{ resize = { width = 1000 } }]
"#;
        let config: ProcessorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.image_url, "https://cdn.example.com/img");
        assert_eq!(config.file_mode, 0o755);
        let policy = config.after_upload_process.unwrap();
        assert_eq!(policy.condition.unwrap().max_width, Some(1000));
    }

    #[test]
    fn parse_presets_preserves_action_order() {
        let toml = r#"
[presets]
card = [
    { quality = 90 },
    { resize = { width = 800, height = 600 } },
    { crop = { width = 400, height = 400 } },
]
"#;
        let config: ProcessorConfig = toml::from_str(toml).unwrap();
        let names: Vec<&str> = config.presets["card"]
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["quality", "resize", "crop"]);

        let compiled = config.compile_presets().unwrap();
        assert_eq!(compiled["card"].actions.len(), 3);
    }

    #[test]
    fn parse_backend_kind() {
        let config: ProcessorConfig = toml::from_str(r#"backend = "catmull_rom""#).unwrap();
        assert_eq!(config.backend, BackendKind::CatmullRom);
        assert_eq!(config.backend.filter(), FilterType::CatmullRom);
        assert!(!config.backend.create().is_loaded());
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("imgpreset.toml")).unwrap();
        assert_eq!(config.image_url, "/files/img");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgpreset.toml");
        fs::write(
            &path,
            r#"
image_url = "/media"

[presets]
small = [{ thumb = { width = 100, height = 100 } }]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.image_url, "/media");
        assert!(config.presets.contains_key("small"));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgpreset.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_rejects_unknown_operation_at_load_time() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgpreset.toml");
        fs::write(
            &path,
            r#"
[presets]
fancy = [{ sepia = { amount = 3 } }]
"#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Preset { ref preset, source: PresetError::UnknownOperation(_) } if preset == "fancy"
        ));
        assert!(err.to_string().contains("fancy"));
    }

    #[test]
    fn load_config_rejects_missing_parameter_at_load_time() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgpreset.toml");
        fs::write(
            &path,
            r#"
[presets]
square = [{ crop = { width = 100 } }]
"#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("crop"));
        assert!(message.contains("height"));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn default_processing_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_processes, None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn parse_processing_config() {
        let toml = r#"
[processing]
max_processes = 4
"#;
        let config: ProcessorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.processing.max_processes, Some(4));
    }

    // =========================================================================
    // After-upload condition tests
    // =========================================================================

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn condition_uses_or_semantics() {
        let condition = SizeCondition {
            max_width: Some(100),
            max_height: Some(100),
        };
        assert!(!condition.is_exceeded_by(dims(100, 100)));
        assert!(condition.is_exceeded_by(dims(101, 50)));
        assert!(condition.is_exceeded_by(dims(50, 101)));
    }

    #[test]
    fn condition_with_single_bound_ignores_other_axis() {
        let condition = SizeCondition {
            max_width: None,
            max_height: Some(100),
        };
        assert!(!condition.is_exceeded_by(dims(5000, 100)));
        assert!(condition.is_exceeded_by(dims(10, 200)));
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<ProcessorConfig, _> = toml::from_str("image_pth = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let toml_str = r#"
[processing]
max_proceses = 4
"#;
        let result: Result<ProcessorConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let result: Result<ProcessorConfig, _> = toml::from_str(r#"backend = "imagick""#);
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(ProcessorConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_file_mode_range() {
        let mut config = ProcessorConfig::default();
        config.file_mode = 0o7777;
        assert!(config.validate().is_ok());
        config.file_mode = 0o10000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_preset_names_with_separators() {
        for name in ["\"..\"", "\"a/b\"", "\".\""] {
            let config: ProcessorConfig =
                toml::from_str(&format!("[presets]\n{name} = [{{ flip = {{ mode = 1 }} }}]"))
                    .unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("single path segment"), "{name}: {err}");
        }
    }

    #[test]
    fn validate_rejects_reserved_preset_name() {
        let config: ProcessorConfig =
            toml::from_str("[presets]\norig = [{ flip = { mode = 1 } }]").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("orig"));
    }

    #[test]
    fn validate_rejects_empty_condition() {
        let config: ProcessorConfig = toml::from_str(
            r#"
[after_upload_process]
condition = {}
actions = [{ flip = { mode = "both" } }]
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_compiles_after_upload_actions() {
        let config: ProcessorConfig = toml::from_str(
            r#"
[after_upload_process]
actions = [{ rotate = {} }]
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Preset { source: PresetError::MissingParameter { .. }, .. }
        ));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let content = stock_config_toml();
        let config: ProcessorConfig = toml::from_str(content).expect("stock config must parse");
        config.validate().unwrap();
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ProcessorConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = ProcessorConfig::default();
        assert_eq!(config.image_path, defaults.image_path);
        assert_eq!(config.image_url, defaults.image_url);
        assert_eq!(config.file_mode, defaults.file_mode);
        assert_eq!(config.force_process, defaults.force_process);
        assert_eq!(config.backend, defaults.backend);
        assert!(config.presets.is_empty());
    }

    #[test]
    fn stock_config_toml_documents_every_operation() {
        let content = stock_config_toml();
        for spec in crate::preset::OPERATIONS {
            assert!(content.contains(spec.name), "missing {}", spec.name);
        }
    }
}
