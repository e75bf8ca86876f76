//! Canonicalization applied to metadata before it is persisted.
//!
//! Both entry points mutate a [`MetaMap`] in place and are idempotent.
//! Every dataset write path calls them before touching the disk, so a
//! failed normalization never leaves a sidecar behind.

use serde_json::Value;

use crate::{
    datatypes::{DataType, DataTypeError},
    metadata::{DATATYPE_KEY, DATATYPE_NAME_KEY, MetaMap, UNITS_KEY},
};

/// Unit synonyms and their canonical short forms. Matching is exact.
const UNIT_SYNONYMS: &[(&str, &str)] = &[
    ("second", "s"),
    ("seconds", "s"),
    ("sec", "s"),
    ("secs", "s"),
    ("millisecond", "ms"),
    ("milliseconds", "ms"),
    ("msec", "ms"),
    ("volt", "V"),
    ("volts", "V"),
    ("millivolt", "mV"),
    ("millivolts", "mV"),
    ("microvolt", "uV"),
    ("microvolts", "uV"),
    ("hertz", "Hz"),
];

/// Canonical unit for seconds; the only unit that implies an event datatype.
pub const SECONDS: &str = "s";

/// Map a unit string to its canonical form, or return it unchanged.
pub fn canonical_unit(units: &str) -> &str {
    UNIT_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == units)
        .map_or(units, |(_, canonical)| *canonical)
}

/// Rewrite a string-valued `units` entry to its canonical form.
///
/// Units outside the synonym table (`"samples"`, `"mV"`, any custom label)
/// and non-string values are left untouched.
pub fn enforce_units(meta: &mut MetaMap) {
    if let Some(Value::String(units)) = meta.get_mut(UNITS_KEY) {
        let canonical = canonical_unit(units);
        if canonical != units.as_str() {
            *units = canonical.to_string();
        }
    }
}

/// Datatype implied by a unit string when none was given explicitly.
pub fn infer_datatype(units: Option<&str>) -> DataType {
    match units.map(canonical_unit) {
        Some(SECONDS) => DataType::Event,
        _ => DataType::Undefined,
    }
}

/// Whether the caller supplied a datatype (by code or by name).
pub(crate) fn has_explicit_datatype(meta: &MetaMap) -> bool {
    meta.contains_key(DATATYPE_KEY) || meta.contains_key(DATATYPE_NAME_KEY)
}

/// Resolve the datatype a mapping describes without modifying it.
///
/// `datatype` is authoritative; `datatype_name` is consulted only when the
/// code is absent; otherwise the datatype is inferred from `units`.
pub fn resolve_datatype(meta: &MetaMap) -> Result<DataType, DataTypeError> {
    if let Some(value) = meta.get(DATATYPE_KEY) {
        return DataType::from_value(value);
    }
    if let Some(value) = meta.get(DATATYPE_NAME_KEY) {
        return DataType::from_value(value);
    }
    Ok(infer_datatype(meta.get(UNITS_KEY).and_then(Value::as_str)))
}

/// Write `datatype` and its derived `datatype_name` together.
pub(crate) fn set_datatype(meta: &mut MetaMap, datatype: DataType) {
    meta.insert(DATATYPE_KEY.to_string(), Value::from(datatype.code()));
    meta.insert(
        DATATYPE_NAME_KEY.to_string(),
        Value::from(datatype.name()),
    );
}

/// Validate or infer the datatype and (re)derive `datatype_name`.
///
/// - A present `datatype` must be a registered code or name; it is stored
///   back as the integer code.
/// - An absent `datatype` is inferred from `units`: seconds imply `EVENT`,
///   anything else `UNDEFINED`.
///
/// On error the mapping is left unchanged.
pub fn enforce_datatypes(meta: &mut MetaMap) -> Result<(), DataTypeError> {
    let datatype = resolve_datatype(meta)?;
    set_datatype(meta, datatype);
    Ok(())
}
