//! Pure Rust transform engine.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image::ImageReader` with guessed format |
//! | Resize / thumb / adaptive thumb | `DynamicImage::resize_exact` with the configured filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Flip | `DynamicImage::fliph` / `flipv` |
//! | Rotate (quarter turns) | `image::imageops::rotate90/180/270` |
//! | Rotate (arbitrary) | `imageproc::geometric_transformations::rotate_about_center` on an expanded canvas |
//! | Canvas | `image::imageops::replace` |
//! | Watermark | `image::imageops::overlay` |
//! | Text | `imageproc::drawing::draw_text_mut` + `ab_glyph` |
//! | Encode | `JpegEncoder` (quality) or `DynamicImage::write_to`, written atomically |

use super::backend::{BackendError, Dimensions, ImageBackend, SaveOptions, TextSpec};
use super::calculations::{
    canvas_offset, corner_position, crop_region, quarter_turns, resize_dimensions, rotated_bounds,
};
use super::params::{Color, Corner, FlipMode, Quality};
use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Sequence for temporary file names, unique within the process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// The untouched decode, kept so `reload` can reset the working copy.
struct Source {
    image: DynamicImage,
    format: ImageFormat,
    path: PathBuf,
}

/// Transform engine backed by the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    filter: FilterType,
    source: Option<Source>,
    working: Option<DynamicImage>,
    quality: Option<u8>,
    output_format: Option<ImageFormat>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_filter(FilterType::Lanczos3)
    }

    /// Engine using a specific resampling filter for every resize.
    pub fn with_filter(filter: FilterType) -> Self {
        Self {
            filter,
            source: None,
            working: None,
            quality: None,
            output_format: None,
        }
    }

    /// Borrow the working image.
    pub fn image(&self) -> Result<&DynamicImage, BackendError> {
        self.working.as_ref().ok_or(BackendError::NotLoaded)
    }

    fn working_mut(&mut self) -> Result<&mut DynamicImage, BackendError> {
        self.working.as_mut().ok_or(BackendError::NotLoaded)
    }

    fn source(&self) -> Result<&Source, BackendError> {
        self.source.as_ref().ok_or(BackendError::NotLoaded)
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotate clockwise by `degrees`, expanding the canvas to the rotated bounds.
///
/// Quarter turns are lossless; other angles fill exposed corners with `fill`.
fn rotate_rgba(image: &RgbaImage, degrees: f64, fill: Rgba<u8>) -> RgbaImage {
    match quarter_turns(degrees) {
        Some(0) => return image.clone(),
        Some(1) => return imageops::rotate90(image),
        Some(2) => return imageops::rotate180(image),
        Some(3) => return imageops::rotate270(image),
        _ => {}
    }

    let (bound_w, bound_h) = rotated_bounds(image.dimensions(), degrees);
    let mut canvas = RgbaImage::from_pixel(bound_w, bound_h, fill);
    let (x, y) = canvas_offset(image.dimensions(), (bound_w, bound_h));
    imageops::overlay(&mut canvas, image, x, y);

    rotate_about_center(
        &canvas,
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        fill,
    )
}

/// Load a font file for text rendering.
fn load_font(path: &Path) -> Result<FontVec, BackendError> {
    if !path.is_file() {
        return Err(BackendError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    FontVec::try_from_vec(bytes).map_err(|e| BackendError::Unsupported {
        path: path.to_path_buf(),
        reason: format!("invalid font: {e}"),
    })
}

/// Render `lines` stacked top to bottom onto a transparent layer.
fn render_text_layer(spec: &TextSpec, font: &FontVec) -> RgbaImage {
    let scale = PxScale::from(spec.size);
    let line_height = spec.size.ceil().max(1.0) as u32;
    let width = spec
        .lines
        .iter()
        .map(|line| text_size(scale, font, line).0)
        .max()
        .unwrap_or(0)
        .max(1);
    let height = line_height * spec.lines.len().max(1) as u32;

    let mut layer = RgbaImage::new(width, height);
    for (i, line) in spec.lines.iter().enumerate() {
        let y = (i as u32 * line_height) as i32;
        draw_text_mut(&mut layer, spec.color.rgba(), 0, y, scale, font, line);
    }
    layer
}

/// Normalise pixel layout to something the target encoder accepts.
fn for_encoder(image: &DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        ImageFormat::Png | ImageFormat::Tiff => image.clone(),
        _ if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Encode into `writer` in the requested format.
fn encode<W: Write + std::io::Seek>(
    image: &DynamicImage,
    writer: &mut W,
    format: ImageFormat,
    quality: u8,
) -> Result<(), BackendError> {
    let image = for_encoder(image, format);
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);
            image.write_with_encoder(encoder)
        }
        other => image.write_to(writer, other),
    };
    result.map_err(|e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}")))
}

/// Encode to a hidden sibling file, then rename it over `path`.
///
/// Readers never observe a partially written image.
fn write_atomic(
    image: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    quality: u8,
) -> Result<(), BackendError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| BackendError::InvalidArgument(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(
        ".{}.{}-{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed),
    ));

    let written = (|| {
        let mut writer = BufWriter::new(fs::File::create(&temp)?);
        encode(image, &mut writer, format, quality)?;
        writer.flush()?;
        Ok::<(), BackendError>(())
    })();

    match written.and_then(|()| fs::rename(&temp, path).map_err(BackendError::from)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

impl ImageBackend for RustBackend {
    fn load(&mut self, path: &Path) -> Result<(), BackendError> {
        self.release();

        if !path.is_file() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        let unsupported = |reason: String| BackendError::Unsupported {
            path: path.to_path_buf(),
            reason,
        };
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| unsupported("unrecognised image format".to_string()))?;
        let image = reader.decode().map_err(|e| unsupported(e.to_string()))?;

        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            ?format,
            "image loaded"
        );
        self.working = Some(image.clone());
        self.source = Some(Source {
            image,
            format,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn reload(&mut self) -> Result<(), BackendError> {
        let original = self.source()?.image.clone();
        self.working = Some(original);
        Ok(())
    }

    fn release(&mut self) {
        self.working = None;
        self.source = None;
        self.quality = None;
        self.output_format = None;
    }

    fn is_loaded(&self) -> bool {
        self.working.is_some()
    }

    fn dimensions(&self) -> Result<Dimensions, BackendError> {
        let image = self.image()?;
        Ok(Dimensions {
            width: image.width(),
            height: image.height(),
        })
    }

    fn format(&self) -> Result<ImageFormat, BackendError> {
        Ok(self.source()?.format)
    }

    fn source_path(&self) -> Result<&Path, BackendError> {
        Ok(&self.source()?.path)
    }

    fn quality(&self) -> Option<u8> {
        self.quality
    }

    fn set_quality(&mut self, quality: u8) {
        self.quality = Some(Quality::new(quality as u32).value());
    }

    fn set_output_format(&mut self, format: ImageFormat) {
        self.output_format = Some(format);
    }

    fn resize(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        proportional: bool,
    ) -> Result<(), BackendError> {
        let filter = self.filter;
        let image = self.working_mut()?;
        let (w, h) = resize_dimensions(
            (image.width(), image.height()),
            width,
            height,
            proportional,
        );
        if (w, h) != (image.width(), image.height()) {
            *image = image.resize_exact(w, h, filter);
        }
        Ok(())
    }

    fn crop(
        &mut self,
        width: u32,
        height: u32,
        start_x: Option<u32>,
        start_y: Option<u32>,
    ) -> Result<(), BackendError> {
        let image = self.working_mut()?;
        let region = crop_region(
            (image.width(), image.height()),
            (width, height),
            start_x,
            start_y,
        );
        *image = image.crop_imm(region.x, region.y, region.width, region.height);
        Ok(())
    }

    fn rotate(&mut self, degrees: f64, background: Color) -> Result<(), BackendError> {
        let image = self.working_mut()?;
        *image = match quarter_turns(degrees) {
            Some(0) => return Ok(()),
            Some(1) => image.rotate90(),
            Some(2) => image.rotate180(),
            Some(3) => image.rotate270(),
            _ => DynamicImage::ImageRgba8(rotate_rgba(
                &image.to_rgba8(),
                degrees,
                background.rgba(),
            )),
        };
        Ok(())
    }

    fn flip(&mut self, mode: FlipMode) -> Result<(), BackendError> {
        let image = self.working_mut()?;
        *image = match mode {
            FlipMode::Horizontal => image.fliph(),
            FlipMode::Vertical => image.flipv(),
            FlipMode::Both => image.fliph().flipv(),
        };
        Ok(())
    }

    fn resize_canvas(
        &mut self,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<(), BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "canvas must be non-empty, got {width}x{height}"
            )));
        }
        let image = self.working_mut()?;
        let mut canvas = RgbaImage::from_pixel(width, height, background.rgba());
        let (x, y) = canvas_offset((image.width(), image.height()), (width, height));
        imageops::replace(&mut canvas, &image.to_rgba8(), x, y);
        *image = DynamicImage::ImageRgba8(canvas);
        Ok(())
    }

    fn watermark(
        &mut self,
        file: &Path,
        offset_x: i64,
        offset_y: i64,
        corner: Corner,
    ) -> Result<(), BackendError> {
        // Fail on the engine state before touching the watermark file.
        self.image()?;
        if !file.is_file() {
            return Err(BackendError::NotFound(file.to_path_buf()));
        }
        let mark = image::open(file)
            .map_err(|e| BackendError::Unsupported {
                path: file.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgba8();

        let image = self.working_mut()?;
        let (x, y) = corner_position(
            (image.width(), image.height()),
            mark.dimensions(),
            corner,
            (offset_x, offset_y),
        );
        let mut canvas = image.to_rgba8();
        imageops::overlay(&mut canvas, &mark, x, y);
        *image = DynamicImage::ImageRgba8(canvas);
        Ok(())
    }

    fn text(&mut self, spec: &TextSpec) -> Result<(), BackendError> {
        self.image()?;
        if spec.size <= 0.0 {
            return Err(BackendError::InvalidArgument(format!(
                "text size must be positive, got {}",
                spec.size
            )));
        }
        let font = load_font(&spec.font_file)?;
        if spec.lines.iter().all(|line| line.is_empty()) {
            return Ok(());
        }

        let mut layer = render_text_layer(spec, &font);
        if spec.angle != 0.0 {
            layer = rotate_rgba(&layer, spec.angle, Rgba([0, 0, 0, 0]));
        }

        let image = self.working_mut()?;
        let (x, y) = corner_position(
            (image.width(), image.height()),
            layer.dimensions(),
            spec.corner,
            (spec.offset_x, spec.offset_y),
        );
        let mut canvas = image.to_rgba8();
        imageops::overlay(&mut canvas, &layer, x, y);
        *image = DynamicImage::ImageRgba8(canvas);
        Ok(())
    }

    fn save(&mut self, path: &Path, options: &SaveOptions) -> Result<(), BackendError> {
        let image = self.image()?;
        let source = self.source()?;
        let format = options
            .format
            .or(self.output_format)
            .unwrap_or(source.format);
        let quality = options
            .quality
            .or(self.quality)
            .unwrap_or_else(|| Quality::default().value());

        write_atomic(image, path, format, quality)?;

        if options.touch && path != source.path {
            let modified = fs::metadata(&source.path)?.modified()?;
            fs::OpenOptions::new()
                .write(true)
                .open(path)?
                .set_modified(modified)?;
        }

        debug!(path = %path.display(), ?format, quality, "image saved");
        Ok(())
    }
}
