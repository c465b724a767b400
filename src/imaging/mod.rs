//! Image transform engine: pure Rust, no native libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` with format sniffing |
//! | **Resize / thumb** | `image::imageops::resize` (configurable filter) |
//! | **Crop / flip** | `image::imageops` |
//! | **Rotate** | quarter turns via `rotate90`, others via `imageproc` |
//! | **Text** | `ab_glyph` + `imageproc::drawing` |
//! | **Encode** | `image` encoders, written through a temp file and renamed |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Value types operations are called with
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, SaveOptions, TextSpec};
pub use params::{Color, Corner, FlipMode, Quality, parse_format};
pub use rust_backend::RustBackend;
