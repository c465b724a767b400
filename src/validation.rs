//! Dimension checks for incoming images.
//!
//! Used by upload front-ends before an image is ingested. An unreadable file
//! is reported as [`Violation::InvalidImage`], not as an error: from the
//! caller's point of view it is just another reason to reject the upload.

use crate::imaging::ImageBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Why an image was rejected. The display text is user-facing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("The image \"{file}\" is too small. Its width cannot be smaller than {limit} px.")]
    TooNarrow { file: String, limit: u32 },
    #[error("The image \"{file}\" is too small. Its height cannot be smaller than {limit} px.")]
    TooShort { file: String, limit: u32 },
    #[error("The image \"{file}\" is too large. Its width cannot exceed {limit} px.")]
    TooWide { file: String, limit: u32 },
    #[error("The image \"{file}\" is too large. Its height cannot exceed {limit} px.")]
    TooTall { file: String, limit: u32 },
    #[error("Invalid image.")]
    InvalidImage,
}

/// Inclusive size limits; `None` leaves a side unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DimensionRules {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl DimensionRules {
    /// Load `path` into `engine` and check it against the limits.
    ///
    /// `name` is how the file is referred to in the message, usually the
    /// client-side filename. Limits are checked in a fixed order and the
    /// first one broken is reported.
    pub fn check(&self, engine: &mut dyn ImageBackend, path: &Path, name: &str) -> Option<Violation> {
        let dims = match engine.load(path).and_then(|()| engine.dimensions()) {
            Ok(dims) => dims,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "rejected unreadable image");
                return Some(Violation::InvalidImage);
            }
        };
        let file = name.to_string();

        if let Some(limit) = self.min_width
            && dims.width < limit
        {
            return Some(Violation::TooNarrow { file, limit });
        }
        if let Some(limit) = self.min_height
            && dims.height < limit
        {
            return Some(Violation::TooShort { file, limit });
        }
        if let Some(limit) = self.max_width
            && dims.width > limit
        {
            return Some(Violation::TooWide { file, limit });
        }
        if let Some(limit) = self.max_height
            && dims.height > limit
        {
            return Some(Violation::TooTall { file, limit });
        }
        None
    }
}
