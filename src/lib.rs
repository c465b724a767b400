//! # imgpreset
//!
//! On-demand image presets backed by a sharded file cache. Originals are
//! stored once; every derived variant ("preset") is rendered the first time
//! it is asked for and served from disk afterwards.
//!
//! # Architecture: Store, Resolve, Render
//!
//! ```text
//! 1. Ingest    upload            →  <root>/<ns>/orig/<shard>/<name>      (unique name, optional shrink + backup)
//! 2. Resolve   (name, preset, ns) →  <root>/<ns>/<preset>/<shard>/<name>  (pure path/URL math)
//! 3. Render    orig + preset     →  variant file                         (load → actions → atomic save)
//! ```
//!
//! A variant is never invalidated automatically: if an original changes, the
//! caller deletes the old variants and they are rendered again on demand.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`storage`] | Shard hashing, path and URL layout, directory creation and pruning |
//! | [`preset`] | Action types, per-operation parameter schema, the dispatcher |
//! | [`imaging`] | Transform engine trait, pure geometry, and the `image`-based backend |
//! | [`processor`] | [`processor::ImageProcessor`]: process, lazy URL generation, delete, cache warming |
//! | [`ingest`] | Upload naming, persisting, and the after-upload transform |
//! | [`validation`] | Min/max dimension checks with user-facing messages |
//! | [`config`] | TOML config loading, validation, and preset compilation |
//!
//! # Design Decisions
//!
//! ## Presets Are Compiled at Load Time
//!
//! A preset is data: an ordered list of `{ operation = { params } }` and
//! `{ property = value }` entries. Each operation declares its parameters
//! (name, default, plural) in a static schema, and the whole config is bound
//! against it when loaded. A typo in a preset fails `load_config`, not the
//! first request that happens to use it.
//!
//! ## One Engine Per Unit of Work
//!
//! [`imaging::ImageBackend`] holds exactly one decoded image. The processor
//! builds a fresh engine for every request, so parallel work (cache warming,
//! batch uploads) shares nothing but the filesystem.
//!
//! ## Atomic Writes, No Locks
//!
//! Variants are encoded to a hidden temporary sibling and renamed into place.
//! Readers never observe a half-written file. Two requests racing to render
//! the same variant both succeed and the last rename wins.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and encoding use the `image` crate; rotation and text
//! come from `imageproc`. No system libraries are required.

pub mod config;
pub mod imaging;
pub mod ingest;
pub mod preset;
pub mod processor;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;
