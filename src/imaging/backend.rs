//! Transform engine trait and shared types.
//!
//! The [`ImageBackend`] trait is the capability set every transform backend
//! must support: load/reload/release of one working image, the nine pixel
//! operations, and `save`. Each engine instance owns at most one decoded
//! image; loading a new file releases the previous one first.
//!
//! `thumb` and `adaptive_thumb` are provided methods built on `resize` and
//! `crop`, so every backend gets identical sizing behaviour for free.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! and `imageproc` crates.

use super::calculations::{cover_dimensions, thumb_bounds};
use super::params::{Color, Corner, FlipMode};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image is not loaded")]
    NotLoaded,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported image {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Size of the working image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Options for [`ImageBackend::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Output format. `None` keeps the decoded source format.
    pub format: Option<ImageFormat>,
    /// Encode quality. `None` uses the engine's `quality` property, then 75.
    pub quality: Option<u8>,
    /// Copy the source file's modification time onto the written file.
    pub touch: bool,
}

/// Text overlay request.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpec {
    /// One entry per rendered line.
    pub lines: Vec<String>,
    pub font_file: PathBuf,
    /// Pixel height of a line.
    pub size: f32,
    pub color: Color,
    pub corner: Corner,
    pub offset_x: i64,
    pub offset_y: i64,
    /// Clockwise rotation in degrees.
    pub angle: f64,
}

/// Trait for transform engines.
///
/// Every backend must implement the whole capability set so the preset
/// dispatcher is backend-agnostic. Operations called while nothing is
/// loaded fail with [`BackendError::NotLoaded`].
///
/// Instances are independent: run one per request/thread.
pub trait ImageBackend: Send {
    /// Decode `path`, releasing any previously held image first.
    ///
    /// A missing file is [`BackendError::NotFound`]; anything that does not
    /// decode is [`BackendError::Unsupported`]. Validation callers treat
    /// both as an ordinary negative result.
    fn load(&mut self, path: &Path) -> Result<(), BackendError>;

    /// Reset the working image to the still-held original decode.
    fn reload(&mut self) -> Result<(), BackendError>;

    /// Drop the held image. Idempotent.
    fn release(&mut self);

    fn is_loaded(&self) -> bool;

    /// Current working dimensions.
    fn dimensions(&self) -> Result<Dimensions, BackendError>;

    /// Format the source was decoded from.
    fn format(&self) -> Result<ImageFormat, BackendError>;

    /// Path the current image was loaded from.
    fn source_path(&self) -> Result<&Path, BackendError>;

    fn quality(&self) -> Option<u8>;

    fn set_quality(&mut self, quality: u8);

    /// Override the format used by `save` when no explicit format is given.
    fn set_output_format(&mut self, format: ImageFormat);

    fn resize(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        proportional: bool,
    ) -> Result<(), BackendError>;

    fn crop(
        &mut self,
        width: u32,
        height: u32,
        start_x: Option<u32>,
        start_y: Option<u32>,
    ) -> Result<(), BackendError>;

    fn rotate(&mut self, degrees: f64, background: Color) -> Result<(), BackendError>;

    fn flip(&mut self, mode: FlipMode) -> Result<(), BackendError>;

    fn resize_canvas(
        &mut self,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<(), BackendError>;

    fn watermark(
        &mut self,
        file: &Path,
        offset_x: i64,
        offset_y: i64,
        corner: Corner,
    ) -> Result<(), BackendError>;

    fn text(&mut self, spec: &TextSpec) -> Result<(), BackendError>;

    /// Encode the working image to `path`.
    fn save(&mut self, path: &Path, options: &SaveOptions) -> Result<(), BackendError>;

    fn width(&self) -> Result<u32, BackendError> {
        Ok(self.dimensions()?.width)
    }

    fn height(&self) -> Result<u32, BackendError> {
        Ok(self.dimensions()?.height)
    }

    fn mime_type(&self) -> Result<&'static str, BackendError> {
        Ok(self.format()?.to_mime_type())
    }

    /// Like `resize`, but never upscales on either axis.
    fn thumb(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        proportional: bool,
    ) -> Result<(), BackendError> {
        let current = self.dimensions()?.as_tuple();
        let (width, height) = thumb_bounds(current, width, height);
        self.resize(width, height, proportional)
    }

    /// Resize to cover `width`x`height`, then center-crop to exactly that size.
    fn adaptive_thumb(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "adaptive thumb needs a non-empty box, got {width}x{height}"
            )));
        }
        let current = self.dimensions()?.as_tuple();
        let (cover_w, cover_h) = cover_dimensions(current, (width, height));
        self.resize(Some(cover_w), Some(cover_h), false)?;
        self.crop(width, height, None, None)
    }
}
