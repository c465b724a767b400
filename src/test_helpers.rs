//! Shared test utilities for the imgpreset test suite.
//!
//! Synthetic fixtures only: every image is generated on the fly so the tests
//! never depend on files checked into the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let source = tmp.path().join("photo.png");
//! create_test_png(&source, 400, 300);
//!
//! let config = config_with_presets(tmp.path(), r#"small = [{ thumb = { width = 100, height = 100 } }]"#);
//! ```

use crate::config::ProcessorConfig;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

pub use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient where each pixel encodes its own coordinates: `(x, y, 128)`.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
}

/// Write a gradient PNG (lossless, so pixel assertions are exact).
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// Write a gradient JPEG.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

/// Write a solid-colour RGBA PNG, e.g. a watermark.
pub fn create_solid_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// Decode an image file to RGBA for pixel assertions.
pub fn open_rgba(path: &Path) -> RgbaImage {
    image::open(path).unwrap().to_rgba8()
}

/// Monospace TrueType font checked in under `fixtures/fonts/`.
pub fn fixture_font() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/fonts/DejaVuSansMono.ttf")
}

// =========================================================================
// Config fixtures
// =========================================================================

/// Build a config rooted at `<root>/img` with the given `[presets]` body.
pub fn config_with_presets(root: &Path, presets_toml: &str) -> ProcessorConfig {
    let toml = format!(
        "image_path = {path:?}\nimage_url = \"/img\"\nfile_mode = 0o755\n\n[presets]\n{presets_toml}\n",
        path = root.join("img").to_string_lossy(),
    );
    let config: ProcessorConfig = toml::from_str(&toml).unwrap();
    config.validate().unwrap();
    config
}
