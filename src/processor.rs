//! Preset processing on top of the storage layout.
//!
//! [`ImageProcessor`] ties the pieces together: it resolves where a
//! (filename, preset, namespace) variant lives, generates it through a fresh
//! transform engine when asked to, and removes variants again.
//!
//! ## Lazy generation
//!
//! ```text
//! image_url("a1b2.jpg", "small", "cache", force)
//!     │
//!     ├─ variant exists, or force is off ──► URL only
//!     │
//!     └─ variant missing and force on
//!            load <root>/cache/orig/<shard>/a1b2.jpg
//!            apply preset "small"
//!            save <root>/cache/small/<shard>/a1b2.jpg ──► URL
//! ```
//!
//! Generation of the same variant is not serialized: two concurrent requests
//! may both render it, and the last rename wins. Each request uses its own
//! engine, so nothing is shared but the filesystem.
//!
//! ## Cache warming
//!
//! [`ImageProcessor::warm`] walks a namespace's originals and renders every
//! missing variant in parallel with rayon, reporting [`WarmStats`].

use crate::config::{BackendKind, ConfigError, ProcessorConfig};
use crate::imaging::{BackendError, ImageBackend, SaveOptions};
use crate::ingest::AfterUploadPolicy;
use crate::preset::{DispatchError, Preset};
use crate::storage::{BACKUP_PREFIX, ORIGINAL, Storage, backup_path, basename, is_path_segment};
use image::ImageFormat;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Preset \"{0}\" is not defined")]
    PresetNotFound(String),
    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },
}

/// Reject a namespace or preset name that is not a single path segment.
pub(crate) fn check_segment(kind: &'static str, name: &str) -> Result<(), ProcessError> {
    if is_path_segment(name) {
        Ok(())
    } else {
        Err(ProcessError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Builds a fresh, unloaded engine for each unit of work.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn ImageBackend> + Send + Sync>;

/// Where [`ImageProcessor::process`] writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// An explicit output file.
    Path(PathBuf),
    /// The preset's variant path for the source under this namespace.
    Namespace(String),
}

/// Output settings for [`ImageProcessor::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub target: SaveTarget,
    /// Keep the source format when `None`.
    pub format: Option<ImageFormat>,
    /// Falls back to the preset's `quality` property, then to 75.
    pub quality: Option<u8>,
    /// Copy the source's modification time onto the output.
    pub touch: bool,
}

impl SaveRequest {
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: SaveTarget::Path(path.into()),
            format: None,
            quality: None,
            touch: false,
        }
    }

    pub fn to_namespace(namespace: impl Into<String>) -> Self {
        Self {
            target: SaveTarget::Namespace(namespace.into()),
            format: None,
            quality: None,
            touch: false,
        }
    }

    fn options(&self) -> SaveOptions {
        SaveOptions {
            format: self.format,
            quality: self.quality,
            touch: self.touch,
        }
    }
}

/// Summary of a [`ImageProcessor::warm`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmStats {
    pub cached: u32,
    pub generated: u32,
    pub failed: u32,
}

impl WarmStats {
    pub fn total(&self) -> u32 {
        self.cached + self.generated + self.failed
    }

    fn merge(self, other: Self) -> Self {
        Self {
            cached: self.cached + other.cached,
            generated: self.generated + other.generated,
            failed: self.failed + other.failed,
        }
    }
}

impl fmt::Display for WarmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "{} cached, {} generated, {} failed ({} total)",
                self.cached,
                self.generated,
                self.failed,
                self.total()
            )
        } else if self.cached > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.cached,
                self.generated,
                self.total()
            )
        } else {
            write!(f, "{} generated", self.generated)
        }
    }
}

/// Resolves, generates and deletes preset variants under one storage root.
pub struct ImageProcessor {
    storage: Storage,
    presets: BTreeMap<String, Preset>,
    force_process: bool,
    engine_factory: EngineFactory,
    pub(crate) after_upload: Option<AfterUploadPolicy>,
}

impl fmt::Debug for ImageProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageProcessor")
            .field("storage", &self.storage)
            .field("presets", &self.presets.keys().collect::<Vec<_>>())
            .field("force_process", &self.force_process)
            .finish_non_exhaustive()
    }
}

impl ImageProcessor {
    /// Validate the config and compile its presets.
    pub fn new(config: &ProcessorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let backend: BackendKind = config.backend;
        let after_upload = config
            .after_upload_process
            .as_ref()
            .map(|policy| {
                policy.compile().map(|actions| AfterUploadPolicy {
                    condition: policy.condition,
                    actions,
                })
            })
            .transpose()?;

        Ok(Self {
            storage: Storage::new(&config.image_path, &config.image_url, config.file_mode),
            presets: config.compile_presets()?,
            force_process: config.force_process,
            engine_factory: Arc::new(move || backend.create()),
            after_upload,
        })
    }

    /// Replace the engine constructor, e.g. with an instrumented backend.
    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = factory;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Names of the configured presets, sorted.
    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn preset(&self, name: &str) -> Result<&Preset, ProcessError> {
        self.presets
            .get(name)
            .ok_or_else(|| ProcessError::PresetNotFound(name.to_string()))
    }

    /// A fresh, unloaded engine.
    pub fn engine(&self) -> Box<dyn ImageBackend> {
        (self.engine_factory)()
    }

    /// Storage path of a variant. Empty when the filename has no basename.
    pub fn image_path(&self, filename: &str, preset: &str, namespace: &str) -> PathBuf {
        self.storage.path_for(filename, preset, namespace)
    }

    /// Public URL of a variant, generating it first when forced and missing.
    ///
    /// `force` overrides the configured `force_process` default. The source
    /// is `filename` itself when it names an existing file, otherwise the
    /// stored original under `namespace`. A filename without a basename
    /// gives an empty URL.
    pub fn image_url(
        &self,
        filename: &str,
        preset: &str,
        namespace: &str,
        force: Option<bool>,
    ) -> Result<String, ProcessError> {
        if basename(filename).is_none() {
            return Ok(String::new());
        }
        check_segment("preset", preset)?;
        check_segment("namespace", namespace)?;
        let target = self.storage.path_for(filename, preset, namespace);
        if force.unwrap_or(self.force_process) && !target.exists() {
            let given = Path::new(filename);
            let source = if given.is_file() {
                given.to_path_buf()
            } else {
                self.storage.path_for(filename, ORIGINAL, namespace)
            };
            self.process(&source, preset, Some(&SaveRequest::to_path(&target)))?;
        } else {
            debug!(variant = %target.display(), "variant lookup without generation");
        }
        Ok(self.storage.url_for(filename, preset, namespace))
    }

    /// Load `source`, apply `preset`, and optionally save the result.
    ///
    /// Returns the engine with the transformed image still loaded.
    pub fn process(
        &self,
        source: &Path,
        preset: &str,
        save: Option<&SaveRequest>,
    ) -> Result<Box<dyn ImageBackend>, ProcessError> {
        if !source.is_file() {
            return Err(ProcessError::SourceNotFound(source.to_path_buf()));
        }
        let compiled = self.preset(preset)?;

        let mut engine = self.engine();
        engine.load(source)?;
        compiled.apply(engine.as_mut())?;

        if let Some(request) = save {
            let output = match &request.target {
                SaveTarget::Path(path) => path.clone(),
                SaveTarget::Namespace(namespace) => {
                    check_segment("namespace", namespace)?;
                    self.storage
                        .path_for(&source.to_string_lossy(), preset, namespace)
                }
            };
            if let Some(dir) = output.parent() {
                self.storage.ensure_dir(dir)?;
            }
            engine.save(&output, &request.options())?;
            info!(
                source = %source.display(),
                preset,
                output = %output.display(),
                "generated variant"
            );
        }
        Ok(engine)
    }

    /// Delete stored files of an image.
    ///
    /// With `presets = None` the original, its backup, and every configured
    /// preset's variant are removed. Otherwise only the listed variants are;
    /// `"orig"` in the list removes the original together with its backup.
    /// Returns `false`, touching nothing, for a filename without a basename or
    /// a namespace that is not a plain segment. Listed presets that are not
    /// plain segments are skipped.
    pub fn delete(&self, filename: &str, namespace: &str, presets: Option<&[&str]>) -> bool {
        if basename(filename).is_none() || !is_path_segment(namespace) {
            return false;
        }
        let names: Vec<&str> = match presets {
            Some(list) => list.to_vec(),
            None => std::iter::once(ORIGINAL)
                .chain(self.preset_names())
                .collect(),
        };
        for name in names {
            if name == ORIGINAL {
                self.remove_original(filename, namespace);
            } else {
                self.storage
                    .remove_and_prune(&self.storage.path_for(filename, name, namespace));
            }
        }
        info!(filename, namespace, "deleted image");
        true
    }

    fn remove_original(&self, filename: &str, namespace: &str) {
        let original = self.storage.path_for(filename, ORIGINAL, namespace);
        self.storage.remove_and_prune(&original);
        if let Some(backup) = backup_path(&original) {
            self.storage.remove_and_prune(&backup);
        }
    }

    /// Generate every missing variant of a namespace's originals.
    ///
    /// An empty `presets` slice means all configured presets.
    pub fn warm(&self, namespace: &str, presets: &[String]) -> Result<WarmStats, ProcessError> {
        check_segment("namespace", namespace)?;
        let selected: Vec<&str> = if presets.is_empty() {
            self.preset_names().collect()
        } else {
            for name in presets {
                self.preset(name)?;
            }
            presets.iter().map(String::as_str).collect()
        };

        let originals = self.originals(namespace);
        info!(
            namespace,
            originals = originals.len(),
            presets = selected.len(),
            "warming cache"
        );

        let jobs: Vec<(&PathBuf, &str)> = originals
            .iter()
            .flat_map(|file| selected.iter().map(move |preset| (file, *preset)))
            .collect();

        let stats = jobs
            .par_iter()
            .map(|(file, preset)| self.warm_one(file, preset, namespace))
            .reduce(WarmStats::default, WarmStats::merge);
        Ok(stats)
    }

    fn warm_one(&self, original: &Path, preset: &str, namespace: &str) -> WarmStats {
        let target = self
            .storage
            .path_for(&original.to_string_lossy(), preset, namespace);
        if target.exists() {
            return WarmStats {
                cached: 1,
                ..WarmStats::default()
            };
        }
        match self.process(original, preset, Some(&SaveRequest::to_path(&target))) {
            Ok(_) => WarmStats {
                generated: 1,
                ..WarmStats::default()
            },
            Err(e) => {
                warn!(original = %original.display(), preset, error = %e, "variant generation failed");
                WarmStats {
                    failed: 1,
                    ..WarmStats::default()
                }
            }
        }
    }

    /// Stored originals of a namespace, backups excluded, in path order.
    fn originals(&self, namespace: &str) -> Vec<PathBuf> {
        let dir = self.storage.originals_dir(namespace);
        if !dir.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                !entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(BACKUP_PREFIX)
            })
            .map(|entry| entry.into_path())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::storage::{DEFAULT_NAMESPACE, shard};
    use crate::test_helpers::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PRESETS: &str = r#"
small = [{ thumb = { width = 100, height = 100 } }]
square = [{ adaptiveThumb = { width = 50, height = 50 } }]
"#;

    fn setup() -> (TempDir, ImageProcessor) {
        let tmp = TempDir::new().unwrap();
        let config = config_with_presets(tmp.path(), PRESETS);
        let processor = ImageProcessor::new(&config).unwrap();
        (tmp, processor)
    }

    /// Store a gradient PNG as the original of `name` and return its path.
    fn store_original(processor: &ImageProcessor, name: &str, w: u32, h: u32) -> PathBuf {
        let path = processor.image_path(name, ORIGINAL, DEFAULT_NAMESPACE);
        processor.storage().ensure_dir(path.parent().unwrap()).unwrap();
        create_test_png(&path, w, h);
        path
    }

    fn counting(processor: ImageProcessor) -> (ImageProcessor, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let processor = processor.with_engine_factory(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(RustBackend::new())
        }));
        (processor, count)
    }

    // =========================================================================
    // Paths and URLs
    // =========================================================================

    #[test]
    fn image_path_matches_storage_layout() {
        let (tmp, processor) = setup();
        let path = processor.image_path("a", "small", DEFAULT_NAMESPACE);
        assert_eq!(path, tmp.path().join("img/cache/small/0c/a"));
    }

    #[test]
    fn image_url_for_empty_filename_is_empty() {
        let (_tmp, processor) = setup();
        assert_eq!(processor.image_url("", "small", "cache", Some(true)).unwrap(), "");
    }

    #[test]
    fn image_url_for_filename_without_basename_is_empty() {
        let (_tmp, processor) = setup();
        let (processor, engines) = counting(processor);
        for filename in ["/", ".", ".."] {
            let url = processor.image_url(filename, "small", "cache", Some(true)).unwrap();
            assert_eq!(url, "", "{filename:?}");
        }
        assert_eq!(engines.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn image_url_rejects_names_outside_the_root() {
        let (_tmp, processor) = setup();
        store_original(&processor, "photo.png", 40, 30);

        let result = processor.image_url("photo.png", "small", "..", Some(true));
        assert!(matches!(
            result,
            Err(ProcessError::InvalidName { kind: "namespace", .. })
        ));
        let result = processor.image_url("photo.png", "../small", "cache", None);
        assert!(matches!(
            result,
            Err(ProcessError::InvalidName { kind: "preset", .. })
        ));
    }

    #[test]
    fn image_url_without_force_does_not_generate() {
        let (_tmp, processor) = setup();
        store_original(&processor, "photo.png", 400, 300);

        let url = processor.image_url("photo.png", "small", "cache", None).unwrap();

        assert!(url.starts_with("/img/cache/small/"));
        assert!(url.ends_with("/photo.png"));
        assert!(!processor.image_path("photo.png", "small", "cache").exists());
    }

    #[test]
    fn forced_url_generates_missing_variant_exactly_once() {
        let (_tmp, processor) = setup();
        let (processor, engines) = counting(processor);
        store_original(&processor, "photo.png", 400, 300);

        let url = processor.image_url("photo.png", "small", "cache", Some(true)).unwrap();
        let variant = processor.image_path("photo.png", "small", "cache");
        assert!(variant.exists());
        assert_eq!(url, processor.storage().url_for("photo.png", "small", "cache"));
        assert_eq!(engines.load(Ordering::SeqCst), 1);

        // Second lookup hits the materialized file.
        processor.image_url("photo.png", "small", "cache", Some(true)).unwrap();
        assert_eq!(engines.load(Ordering::SeqCst), 1);

        let (w, h) = image::image_dimensions(&variant).unwrap();
        assert_eq!((w, h), (100, 75));
    }

    #[test]
    fn forced_url_prefers_existing_source_file() {
        let (tmp, processor) = setup();
        let outside = tmp.path().join("loose.png");
        create_test_png(&outside, 200, 200);

        processor
            .image_url(outside.to_str().unwrap(), "square", "cache", Some(true))
            .unwrap();

        let variant = processor.image_path("loose.png", "square", "cache");
        assert_eq!(image::image_dimensions(&variant).unwrap(), (50, 50));
    }

    #[test]
    fn forced_url_for_missing_original_is_not_found() {
        let (_tmp, processor) = setup();
        let result = processor.image_url("ghost.png", "small", "cache", Some(true));
        assert!(matches!(result, Err(ProcessError::SourceNotFound(_))));
    }

    // =========================================================================
    // process
    // =========================================================================

    #[test]
    fn process_unknown_preset_is_not_found() {
        let (_tmp, processor) = setup();
        let source = store_original(&processor, "photo.png", 40, 30);
        let result = processor.process(&source, "huge", None);
        assert!(matches!(result, Err(ProcessError::PresetNotFound(name)) if name == "huge"));
    }

    #[test]
    fn process_without_save_returns_loaded_engine() {
        let (_tmp, processor) = setup();
        let source = store_original(&processor, "photo.png", 400, 300);
        let engine = processor.process(&source, "square", None).unwrap();
        assert_eq!(engine.dimensions().unwrap().as_tuple(), (50, 50));
    }

    #[test]
    fn process_saves_to_namespace_variant_path() {
        let (_tmp, processor) = setup();
        let source = store_original(&processor, "photo.png", 400, 300);

        processor
            .process(&source, "small", Some(&SaveRequest::to_namespace("thumbs")))
            .unwrap();

        assert!(processor.image_path("photo.png", "small", "thumbs").exists());
    }

    #[test]
    fn process_rejects_escaping_namespace() {
        let (tmp, processor) = setup();
        let source = store_original(&processor, "photo.png", 400, 300);

        let result = processor.process(&source, "small", Some(&SaveRequest::to_namespace("../out")));

        assert!(matches!(result, Err(ProcessError::InvalidName { .. })));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn process_honours_format_and_touch() {
        let (tmp, processor) = setup();
        let source = store_original(&processor, "photo.png", 400, 300);
        let output = tmp.path().join("out/photo.jpg");

        let request = SaveRequest {
            format: Some(ImageFormat::Jpeg),
            quality: Some(60),
            touch: true,
            ..SaveRequest::to_path(&output)
        };
        processor.process(&source, "small", Some(&request)).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let modified = |p: &Path| fs::metadata(p).unwrap().modified().unwrap();
        assert_eq!(modified(&output), modified(&source));
    }

    // =========================================================================
    // delete
    // =========================================================================

    #[test]
    fn delete_all_removes_original_backup_and_variants() {
        let (tmp, processor) = setup();
        let original = store_original(&processor, "photo.png", 400, 300);
        fs::copy(&original, backup_path(&original).unwrap()).unwrap();
        processor.image_url("photo.png", "small", "cache", Some(true)).unwrap();
        processor.image_url("photo.png", "square", "cache", Some(true)).unwrap();

        assert!(processor.delete("photo.png", "cache", None));

        assert!(!tmp.path().join("img/cache").exists());
        assert!(tmp.path().join("img").is_dir());
    }

    #[test]
    fn delete_selected_preset_keeps_original() {
        let (_tmp, processor) = setup();
        let original = store_original(&processor, "photo.png", 400, 300);
        processor.image_url("photo.png", "small", "cache", Some(true)).unwrap();

        assert!(processor.delete("photo.png", "cache", Some(&["small"])));

        assert!(original.exists());
        assert!(!processor.image_path("photo.png", "small", "cache").exists());
    }

    #[test]
    fn delete_orig_in_list_also_removes_backup() {
        let (_tmp, processor) = setup();
        let original = store_original(&processor, "photo.png", 400, 300);
        let backup = backup_path(&original).unwrap();
        fs::copy(&original, &backup).unwrap();

        processor.delete("photo.png", "cache", Some(&[ORIGINAL]));

        assert!(!original.exists());
        assert!(!backup.exists());
    }

    #[test]
    fn delete_empty_filename_is_noop() {
        let (_tmp, processor) = setup();
        assert!(!processor.delete("", "cache", None));
    }

    #[test]
    fn delete_ignores_escaping_names() {
        let (tmp, processor) = setup();
        // Where the `small` variant would land under a `..` namespace.
        let outside = tmp.path().join("small").join(shard("photo.png")).join("photo.png");
        fs::create_dir_all(outside.parent().unwrap()).unwrap();
        fs::write(&outside, b"x").unwrap();
        let original = store_original(&processor, "photo.png", 40, 30);

        assert!(!processor.delete("photo.png", "..", None));
        assert!(processor.delete("photo.png", "cache", Some(&["../small"])));

        assert!(outside.exists());
        assert!(original.exists());
    }

    #[test]
    fn delete_filename_without_basename_is_noop() {
        let (_tmp, processor) = setup();
        let original = store_original(&processor, "photo.png", 40, 30);
        assert!(!processor.delete("/", "cache", None));
        assert!(original.exists());
    }

    // =========================================================================
    // warm
    // =========================================================================

    #[test]
    fn warm_generates_missing_and_counts_cached() {
        let (_tmp, processor) = setup();
        let original = store_original(&processor, "one.png", 400, 300);
        store_original(&processor, "two.png", 300, 400);
        fs::copy(&original, backup_path(&original).unwrap()).unwrap();
        processor.image_url("one.png", "small", "cache", Some(true)).unwrap();

        let stats = processor.warm("cache", &[]).unwrap();

        assert_eq!(
            stats,
            WarmStats {
                cached: 1,
                generated: 3,
                failed: 0
            }
        );
        assert!(processor.image_path("two.png", "square", "cache").exists());
        assert!(!processor.image_path("backup_one.png", "small", "cache").exists());
    }

    #[test]
    fn warm_counts_undecodable_originals_as_failed() {
        let (_tmp, processor) = setup();
        let path = processor.image_path("broken.png", ORIGINAL, "cache");
        processor.storage().ensure_dir(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not an image").unwrap();

        let stats = processor.warm("cache", &["small".to_string()]).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.generated, 0);
    }

    #[test]
    fn warm_unknown_preset_is_error() {
        let (_tmp, processor) = setup();
        let result = processor.warm("cache", &["huge".to_string()]);
        assert!(matches!(result, Err(ProcessError::PresetNotFound(_))));
    }

    #[test]
    fn warm_rejects_escaping_namespace() {
        let (_tmp, processor) = setup();
        assert!(matches!(
            processor.warm("../cache", &[]),
            Err(ProcessError::InvalidName { kind: "namespace", .. })
        ));
    }

    #[test]
    fn warm_empty_namespace_is_empty() {
        let (_tmp, processor) = setup();
        assert_eq!(processor.warm("nobody", &[]).unwrap(), WarmStats::default());
    }

    #[test]
    fn warm_stats_display() {
        let stats = WarmStats {
            cached: 5,
            generated: 2,
            failed: 0,
        };
        assert_eq!(stats.to_string(), "5 cached, 2 generated (7 total)");

        let stats = WarmStats {
            cached: 0,
            generated: 4,
            failed: 0,
        };
        assert_eq!(stats.to_string(), "4 generated");

        let stats = WarmStats {
            cached: 1,
            generated: 1,
            failed: 1,
        };
        assert_eq!(stats.to_string(), "1 cached, 1 generated, 1 failed (3 total)");
    }
}
