//! Value types shared by the transform operations.
//!
//! These types describe *what* an operation is asked to do. Each one parses
//! from the loose forms found in preset files (strings or the legacy integer
//! codes) so that binding a preset action is a matter of calling `parse`.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`Corner`]: Anchor used by watermark and text placement.
//! - [`FlipMode`]: Mirror axis for `flip`.
//! - [`Color`]: RGBA colour parsed from `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
//! - [`parse_format`]: Output format from a name such as `"png"` or `"jpg"`.

use super::backend::BackendError;
use image::{ImageFormat, Rgba};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Anchor point of an overlay on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    LeftTop,
    RightTop,
    LeftBottom,
    RightBottom,
    Center,
}

impl Corner {
    /// Legacy integer selector: 1 = left-top ... 5 = center.
    pub fn from_code(code: i64) -> Result<Self, BackendError> {
        match code {
            1 => Ok(Self::LeftTop),
            2 => Ok(Self::RightTop),
            3 => Ok(Self::LeftBottom),
            4 => Ok(Self::RightBottom),
            5 => Ok(Self::Center),
            other => Err(BackendError::InvalidArgument(format!(
                "invalid corner selector: {other}"
            ))),
        }
    }
}

impl FromStr for Corner {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "left-top" | "top-left" => Ok(Self::LeftTop),
            "right-top" | "top-right" => Ok(Self::RightTop),
            "left-bottom" | "bottom-left" => Ok(Self::LeftBottom),
            "right-bottom" | "bottom-right" => Ok(Self::RightBottom),
            "center" | "centre" => Ok(Self::Center),
            _ => Err(BackendError::InvalidArgument(format!(
                "invalid corner selector: {s:?}"
            ))),
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LeftTop => "left-top",
            Self::RightTop => "right-top",
            Self::LeftBottom => "left-bottom",
            Self::RightBottom => "right-bottom",
            Self::Center => "center",
        };
        f.write_str(name)
    }
}

/// Mirror axis for the `flip` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipMode {
    Horizontal,
    Vertical,
    Both,
}

impl FlipMode {
    /// Legacy integer selector: 1 = horizontal, 2 = vertical, 3 = both.
    pub fn from_code(code: i64) -> Result<Self, BackendError> {
        match code {
            1 => Ok(Self::Horizontal),
            2 => Ok(Self::Vertical),
            3 => Ok(Self::Both),
            other => Err(BackendError::InvalidArgument(format!(
                "invalid flip mode: {other}"
            ))),
        }
    }
}

impl FromStr for FlipMode {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Ok(Self::Horizontal),
            "vertical" => Ok(Self::Vertical),
            "both" => Ok(Self::Both),
            _ => Err(BackendError::InvalidArgument(format!(
                "invalid flip mode: {s:?}"
            ))),
        }
    }
}

/// RGBA colour used for backgrounds and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);

    pub fn rgba(self) -> Rgba<u8> {
        Rgba(self.0)
    }
}

impl FromStr for Color {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BackendError::InvalidArgument(format!("invalid colour: {s:?}"));
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| invalid())
        };
        match hex.len() {
            3 => Ok(Color([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            6 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(invalid()),
        }
    }
}

/// Resolve an output format name (`"jpg"`, `"png"`, `"webp"`, ...).
pub fn parse_format(name: &str) -> Result<ImageFormat, BackendError> {
    ImageFormat::from_extension(name.trim().trim_start_matches('.'))
        .filter(|format| format.writing_enabled())
        .ok_or_else(|| BackendError::InvalidArgument(format!("unsupported output format: {name:?}")))
}
