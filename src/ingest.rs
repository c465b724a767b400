//! Upload ingestion: naming, persisting, and post-upload transforms.
//!
//! An upload becomes an *original*: it gets a fresh unique basename (keeping
//! its extension), is stored at the `orig` path of its namespace, and is then
//! optionally transformed in place by the configured after-upload policy.
//!
//! ```text
//! photo.JPG ──► 9f3a61c02be4d8a7.JPG
//!               <root>/<ns>/orig/<shard>/9f3a61c02be4d8a7.JPG
//!               <root>/<ns>/orig/<shard>/backup_9f3a61c02be4d8a7.JPG   (only if the policy ran)
//! ```
//!
//! Sources come in two shapes: a [`StagedFile`] handed over by an upload
//! front-end, which knows how to write itself somewhere, or a plain path on
//! the local filesystem, which is moved into place.

use crate::config::SizeCondition;
use crate::imaging::{BackendError, Dimensions, SaveOptions};
use crate::preset::{Action, apply_actions};
use crate::processor::{ImageProcessor, ProcessError, check_segment};
use crate::storage::{ORIGINAL, backup_path};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Upload source not found: {0}")]
    MissingSource(PathBuf),
}

impl From<BackendError> for IngestError {
    fn from(e: BackendError) -> Self {
        Self::Process(ProcessError::Imaging(e))
    }
}

/// A file staged by an upload front-end, not yet in its final place.
pub trait StagedFile: Send {
    /// Where the staged bytes currently live.
    fn temp_path(&self) -> &Path;
    /// Extension declared by the client, without the dot.
    fn extension(&self) -> Option<&str>;
    /// Write the bytes to `destination`.
    fn save_as(&mut self, destination: &Path) -> io::Result<()>;
}

/// A staged file that is copied into storage, leaving the source untouched.
#[derive(Debug, Clone)]
pub struct StagedCopy {
    path: PathBuf,
}

impl StagedCopy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StagedFile for StagedCopy {
    fn temp_path(&self) -> &Path {
        &self.path
    }

    fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }

    fn save_as(&mut self, destination: &Path) -> io::Result<()> {
        fs::copy(&self.path, destination).map(|_| ())
    }
}

/// One upload source.
pub enum Upload {
    Staged(Box<dyn StagedFile>),
    /// A local file, moved into storage.
    Path(PathBuf),
}

impl Upload {
    fn source(&self) -> &Path {
        match self {
            Self::Staged(staged) => staged.temp_path(),
            Self::Path(path) => path,
        }
    }

    fn extension(&self) -> Option<&str> {
        match self {
            Self::Staged(staged) => staged.extension(),
            Self::Path(path) => path.extension().and_then(|ext| ext.to_str()),
        }
    }
}

/// Result of storing one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Generated basename; the logical filename for later lookups.
    pub filename: String,
    /// Full storage path of the original.
    pub path: PathBuf,
}

/// Compiled after-upload transform.
#[derive(Debug, Clone, PartialEq)]
pub struct AfterUploadPolicy {
    /// When `None`, the actions run on every upload.
    pub condition: Option<SizeCondition>,
    pub actions: Vec<Action>,
}

impl AfterUploadPolicy {
    pub fn applies_to(&self, dims: Dimensions) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.is_exceeded_by(dims))
    }
}

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// A fresh basename: 16 hex digits, plus the extension when there is one.
pub fn unique_name(extension: Option<&str>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hasher.finalize();
    let id: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    }
}

impl ImageProcessor {
    /// Store one upload as a new original under `namespace`.
    ///
    /// If the after-upload transform fails, the stored original and any
    /// backup are removed again before the error is returned.
    pub fn upload(&self, upload: Upload, namespace: &str) -> Result<Record, IngestError> {
        check_segment("namespace", namespace)?;
        let source = upload.source().to_path_buf();
        if !source.is_file() {
            return Err(IngestError::MissingSource(source));
        }

        let filename = unique_name(upload.extension());
        let path = self.image_path(&filename, ORIGINAL, namespace);
        if let Some(dir) = path.parent() {
            self.storage().ensure_dir(dir)?;
        }

        match upload {
            Upload::Staged(mut staged) => staged.save_as(&path)?,
            Upload::Path(local) => move_file(&local, &path)?,
        }
        info!(source = %source.display(), filename = %filename, namespace, "stored upload");

        match self.after_upload_process(&path) {
            Ok(true) => info!(filename = %filename, "applied after-upload transform"),
            Ok(false) => {}
            Err(e) => {
                warn!(filename = %filename, error = %e, "after-upload transform failed, discarding upload");
                self.discard(&path);
                return Err(e);
            }
        }
        Ok(Record { filename, path })
    }

    /// Store several uploads in parallel. Records come back in input order.
    pub fn upload_many(
        &self,
        uploads: Vec<Upload>,
        namespace: &str,
    ) -> Result<Vec<Record>, IngestError> {
        uploads
            .into_par_iter()
            .map(|upload| self.upload(upload, namespace))
            .collect()
    }

    fn discard(&self, original: &Path) {
        if let Some(backup) = backup_path(original) {
            self.storage().remove_and_prune(&backup);
        }
        self.storage().remove_and_prune(original);
    }

    /// Run the after-upload policy on a stored original.
    ///
    /// Returns whether the original was rewritten. The untouched bytes are
    /// kept as a `backup_` sibling first.
    fn after_upload_process(&self, original: &Path) -> Result<bool, IngestError> {
        let Some(policy) = &self.after_upload else {
            return Ok(false);
        };

        let mut engine = self.engine();
        engine.load(original)?;
        let dims = engine.dimensions()?;
        if !policy.applies_to(dims) {
            debug!(original = %original.display(), ?dims, "after-upload condition not met");
            return Ok(false);
        }

        if let Some(backup) = backup_path(original) {
            fs::copy(original, &backup)?;
        }
        apply_actions(engine.as_mut(), &policy.actions)?;
        engine.save(original, &SaveOptions::default())?;
        Ok(true)
    }
}

/// Rename, falling back to copy-and-remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
