//! Sharded storage layout for originals and preset variants.
//!
//! Every file the processor writes lives at a path derived from three inputs:
//! the basename of the logical filename, the preset, and the namespace.
//!
//! ```text
//! <image_path>/
//! └── cache/                  # namespace
//!     ├── orig/               # reserved preset: the untouched upload
//!     │   └── 3f/             # shard = first byte of md5(basename), hex
//!     │       ├── 65a1c3e09b2d.jpg
//!     │       └── backup_65a1c3e09b2d.jpg
//!     └── small/
//!         └── 3f/
//!             └── 65a1c3e09b2d.jpg
//! ```
//!
//! Public URLs mirror the same layout under `image_url`. [`Storage`] is the
//! only place that composes these paths; nothing else joins path segments
//! by hand. Namespaces and preset names must each be a single plain segment
//! (see [`is_path_segment`]), so a resolved path never leaves the root.
//!
//! Deletion prunes empty parent directories bottom-up, never past the
//! storage root. Pruning is best effort: a failure stops the walk and is
//! logged, not returned.

use md5::{Digest, Md5};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reserved preset name for the untouched upload.
pub const ORIGINAL: &str = "orig";

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "cache";

/// Prefix of the pre-transform copy kept next to an original.
pub const BACKUP_PREFIX: &str = "backup_";

/// Two-character shard directory for a basename.
///
/// ```
/// use imgpreset::storage::shard;
/// assert_eq!(shard("photo.jpg"), shard("photo.jpg"));
/// assert_eq!(shard("photo.jpg").len(), 2);
/// ```
pub fn shard(basename: &str) -> String {
    let digest = Md5::digest(basename.as_bytes());
    format!("{:02x}", digest[0])
}

/// Final path component of a logical filename, or `None` if there is none.
pub fn basename(filename: &str) -> Option<&str> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
}

/// Whether `value` can stand as one directory level under the root.
///
/// Rejects empty values, `.` and `..`, and anything containing a path
/// separator or NUL.
///
/// ```
/// use imgpreset::storage::is_path_segment;
/// assert!(is_path_segment("avatars"));
/// assert!(!is_path_segment(".."));
/// assert!(!is_path_segment("a/b"));
/// ```
pub fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

/// Backup sibling of an original file: same directory, `backup_` prefix.
pub fn backup_path(original: &Path) -> Option<PathBuf> {
    let name = original.file_name()?.to_str()?;
    Some(original.with_file_name(format!("{BACKUP_PREFIX}{name}")))
}

/// Resolves storage paths and public URLs, and owns directory housekeeping.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    url_base: String,
    file_mode: u32,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, url_base: impl Into<String>, file_mode: u32) -> Self {
        let url_base: String = url_base.into();
        Self {
            root: root.into(),
            url_base: url_base.trim_end_matches('/').to_string(),
            file_mode,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<namespace>/<preset>/<shard>/<basename>`.
    ///
    /// A filename without a basename, or a preset or namespace that is not a
    /// plain segment, yields an empty path.
    pub fn path_for(&self, filename: &str, preset: &str, namespace: &str) -> PathBuf {
        match resolvable(filename, preset, namespace) {
            Some(name) => self
                .root
                .join(namespace)
                .join(preset)
                .join(shard(name))
                .join(name),
            None => PathBuf::new(),
        }
    }

    /// `<url_base>/<namespace>/<preset>/<shard>/<basename>`.
    ///
    /// Empty under the same conditions as [`Storage::path_for`].
    pub fn url_for(&self, filename: &str, preset: &str, namespace: &str) -> String {
        match resolvable(filename, preset, namespace) {
            Some(name) => format!(
                "{}/{namespace}/{preset}/{}/{name}",
                self.url_base,
                shard(name)
            ),
            None => String::new(),
        }
    }

    /// Directory holding every original of a namespace.
    pub fn originals_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join(ORIGINAL)
    }

    /// Create `dir` and any missing parents.
    ///
    /// Permission bits are applied only to directories this call creates.
    pub fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        // A relative path ends in an empty ancestor, which never "exists".
        let missing: Vec<&Path> = dir
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
            .collect();
        create_dir_all(dir, self.file_mode)?;
        for created in missing.iter().rev() {
            set_mode(created, self.file_mode)?;
        }
        debug!(dir = %dir.display(), created = missing.len(), "created directories");
        Ok(())
    }

    /// Remove `file` if present, then prune now-empty parents up to the root.
    ///
    /// Returns whether a file was removed.
    pub fn remove_and_prune(&self, file: &Path) -> bool {
        if !file.is_file() {
            return false;
        }
        if let Err(e) = fs::remove_file(file) {
            warn!(file = %file.display(), error = %e, "failed to remove file");
            return false;
        }
        debug!(file = %file.display(), "removed");
        if let Some(parent) = file.parent() {
            self.prune(parent);
        }
        true
    }

    /// Walk upward removing empty directories, stopping at the root.
    fn prune(&self, start: &Path) {
        let mut dir = start;
        while dir != self.root && dir.starts_with(&self.root) {
            match fs::read_dir(dir) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "stopped pruning");
                    return;
                }
            }
            if let Err(e) = fs::remove_dir(dir) {
                warn!(dir = %dir.display(), error = %e, "stopped pruning");
                return;
            }
            debug!(dir = %dir.display(), "pruned empty directory");
            match dir.parent() {
                Some(parent) => dir = parent,
                None => return,
            }
        }
    }
}

/// Basename of `filename` when the whole triple resolves to a path.
fn resolvable<'a>(filename: &'a str, preset: &str, namespace: &str) -> Option<&'a str> {
    if !is_path_segment(preset) || !is_path_segment(namespace) {
        return None;
    }
    basename(filename)
}

#[cfg(unix)]
fn create_dir_all(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn set_mode(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_dir: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
