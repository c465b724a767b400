//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Backends call into this module so every implementation agrees on the
//! exact output sizes and placements.

use super::params::Corner;

/// Calculate the output size of a `resize`.
///
/// `None` on an axis means "unconstrained on that axis". When `proportional`
/// is set the tighter of the two constraints wins and the aspect ratio is
/// kept; otherwise each supplied axis is taken verbatim.
///
/// # Examples
/// ```
/// # use imgpreset::imaging::calculations::resize_dimensions;
/// // 400x300 into a 200x200 box → 200x150
/// assert_eq!(resize_dimensions((400, 300), Some(200), Some(200), true), (200, 150));
///
/// // Height only → width follows
/// assert_eq!(resize_dimensions((400, 300), None, Some(150), true), (200, 150));
/// ```
pub fn resize_dimensions(
    current: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    proportional: bool,
) -> (u32, u32) {
    let (cur_w, cur_h) = current;

    if !proportional {
        return (
            width.unwrap_or(cur_w).max(1),
            height.unwrap_or(cur_h).max(1),
        );
    }

    let ratio = match (width, height) {
        (None, None) => return current,
        (Some(w), None) => w as f64 / cur_w as f64,
        (None, Some(h)) => h as f64 / cur_h as f64,
        (Some(w), Some(h)) => (w as f64 / cur_w as f64).min(h as f64 / cur_h as f64),
    };

    (
        ((cur_w as f64 * ratio).round() as u32).max(1),
        ((cur_h as f64 * ratio).round() as u32).max(1),
    )
}

/// Clamp requested thumbnail bounds so they never exceed the current size.
pub fn thumb_bounds(
    current: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (Option<u32>, Option<u32>) {
    (
        width.map(|w| w.min(current.0)),
        height.map(|h| h.min(current.1)),
    )
}

/// Calculate dimensions needed to cover a target box (resize before crop).
///
/// The image is scaled uniformly by the larger of the two axis ratios, so
/// one side matches the target exactly and the other is at least as large.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `target` - Target box dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Cover dimensions (never smaller than target)
pub fn cover_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let width_ratio = tgt_w as f64 / src_w as f64;
    let height_ratio = tgt_h as f64 / src_h as f64;

    if width_ratio > height_ratio {
        let h = (tgt_w as f64 / src_w as f64 * src_h as f64).round() as u32;
        (tgt_w, h.max(tgt_h))
    } else {
        let w = (tgt_h as f64 / src_h as f64 * src_w as f64).round() as u32;
        (w.max(tgt_w), tgt_h)
    }
}

/// A rectangle inside the current image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolve a crop request into a region that lies inside the image.
///
/// Missing start coordinates center the crop on that axis. Sizes larger
/// than the image are clamped to the image.
pub fn crop_region(
    current: (u32, u32),
    size: (u32, u32),
    start_x: Option<u32>,
    start_y: Option<u32>,
) -> Region {
    let (cur_w, cur_h) = current;
    let width = size.0.clamp(1, cur_w.max(1));
    let height = size.1.clamp(1, cur_h.max(1));

    let x = start_x
        .unwrap_or((cur_w - width) / 2)
        .min(cur_w - width);
    let y = start_y
        .unwrap_or((cur_h - height) / 2)
        .min(cur_h - height);

    Region {
        x,
        y,
        width,
        height,
    }
}

/// Offset that centers `content` on a canvas of size `canvas`.
///
/// Negative when the content is larger than the canvas (it gets clipped).
pub fn canvas_offset(content: (u32, u32), canvas: (u32, u32)) -> (i64, i64) {
    (
        (canvas.0 as i64 - content.0 as i64).div_euclid(2),
        (canvas.1 as i64 - content.1 as i64).div_euclid(2),
    )
}

/// Top-left placement of an overlay anchored at `corner`.
///
/// Left/top anchored edges use the offset directly; right/bottom anchored
/// edges subtract the overlay size and the offset from the canvas extent.
/// `Center` ignores the offsets.
///
/// # Examples
/// ```
/// # use imgpreset::imaging::calculations::corner_position;
/// # use imgpreset::imaging::Corner;
/// assert_eq!(corner_position((200, 100), (20, 10), Corner::RightBottom, (0, 0)), (180, 90));
/// assert_eq!(corner_position((200, 100), (20, 10), Corner::Center, (0, 0)), (90, 45));
/// ```
pub fn corner_position(
    canvas: (u32, u32),
    overlay: (u32, u32),
    corner: Corner,
    offset: (i64, i64),
) -> (i64, i64) {
    let (canvas_w, canvas_h) = (canvas.0 as i64, canvas.1 as i64);
    let (overlay_w, overlay_h) = (overlay.0 as i64, overlay.1 as i64);
    let (offset_x, offset_y) = offset;

    match corner {
        Corner::LeftTop => (offset_x, offset_y),
        Corner::RightTop => (canvas_w - overlay_w - offset_x, offset_y),
        Corner::LeftBottom => (offset_x, canvas_h - overlay_h - offset_y),
        Corner::RightBottom => (
            canvas_w - overlay_w - offset_x,
            canvas_h - overlay_h - offset_y,
        ),
        Corner::Center => (
            (canvas_w - overlay_w).div_euclid(2),
            (canvas_h - overlay_h).div_euclid(2),
        ),
    }
}

/// Bounding box of an image rotated by `degrees`.
pub fn rotated_bounds(size: (u32, u32), degrees: f64) -> (u32, u32) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let (w, h) = (size.0 as f64, size.1 as f64);

    // Trim float noise so 90° on 100x50 gives 50x100, not 51x101.
    let fit = |v: f64| ((v - 1e-6).ceil().max(1.0)) as u32;
    (fit(w * cos + h * sin), fit(w * sin + h * cos))
}

/// Normalise a rotation to one of the lossless quarter turns, if it is one.
pub fn quarter_turns(degrees: f64) -> Option<u32> {
    let normalised = degrees.rem_euclid(360.0);
    [0u32, 1, 2, 3]
        .into_iter()
        .find(|&turns| (normalised - turns as f64 * 90.0).abs() < 0.01)
        .or(((normalised - 360.0).abs() < 0.01).then_some(0))
}
