//! Metadata layer.
//!
//! Metadata is an ordered JSON object ([`MetaMap`]) persisted next to its
//! payload. This module groups:
//!
//! - `normalize`: canonicalization applied before anything is persisted
//!   (unit synonyms, datatype inference and validation).
//! - `attrs`: the [`Attrs`] value type used by datasets, which keeps the
//!   derived `datatype_name` in step with `datatype`.
//! - `sidecar`: path derivation and load/save of `<path>.meta` documents.

pub mod attrs;
pub mod normalize;
pub mod sidecar;

pub use attrs::Attrs;

/// Ordered string-keyed metadata mapping, as stored in a sidecar.
pub type MetaMap = serde_json::Map<String, serde_json::Value>;

/// Key holding the unit string of a dataset.
pub const UNITS_KEY: &str = "units";
/// Key holding the integer datatype code.
pub const DATATYPE_KEY: &str = "datatype";
/// Key holding the derived datatype name.
pub const DATATYPE_NAME_KEY: &str = "datatype_name";
