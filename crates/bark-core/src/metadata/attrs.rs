//! Normalized dataset attributes.
//!
//! [`Attrs`] wraps a [`MetaMap`] and maintains three guarantees for its whole
//! lifetime:
//!
//! - `units` is present (possibly `null`) and canonical.
//! - `datatype` is a registered integer code.
//! - `datatype_name` equals the registry name for `datatype`.
//!
//! Every mutation goes through [`Attrs::insert`] or [`Attrs::remove`], which
//! route the reserved keys through the normalizer instead of storing them
//! verbatim.

use serde_json::Value;
use snafu::prelude::*;

use crate::{
    datatypes::{DataType, DataTypeError},
    metadata::{
        DATATYPE_KEY, DATATYPE_NAME_KEY, MetaMap, UNITS_KEY,
        normalize::{self, canonical_unit},
    },
};

/// Errors raised while editing [`Attrs`].
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum AttrsError {
    /// A datatype value could not be resolved against the registry.
    #[snafu(display("{source}"))]
    Datatype {
        /// Underlying lookup failure.
        source: DataTypeError,
    },

    /// The key is required and cannot be removed.
    #[snafu(display("attribute '{key}' is required and cannot be removed"))]
    Required {
        /// The protected key.
        key: String,
    },
}

impl AttrsError {
    /// Returns `true` for datatype registry lookup failures.
    pub fn is_lookup(&self) -> bool {
        matches!(self, AttrsError::Datatype { .. })
    }
}

/// Dataset attribute mapping with a consistent derived `datatype_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attrs {
    map: MetaMap,
    datatype: DataType,
}

impl Attrs {
    /// Normalize `map` and wrap it.
    ///
    /// Runs [`normalize::enforce_units`] and [`normalize::enforce_datatypes`]
    /// and inserts `units: null` when no units were given.
    pub fn from_map(mut map: MetaMap) -> Result<Self, DataTypeError> {
        let datatype = normalize::resolve_datatype(&map)?;
        normalize::enforce_units(&mut map);
        if !map.contains_key(UNITS_KEY) {
            map.insert(UNITS_KEY.to_string(), Value::Null);
        }
        normalize::set_datatype(&mut map, datatype);
        Ok(Attrs { map, datatype })
    }

    /// The resolved datatype.
    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    /// Replace the datatype, updating `datatype_name` with it.
    pub fn set_datatype(&mut self, datatype: DataType) {
        self.datatype = datatype;
        normalize::set_datatype(&mut self.map, datatype);
    }

    /// The unit string, if units are set and are a string.
    pub fn units(&self) -> Option<&str> {
        self.map.get(UNITS_KEY).and_then(Value::as_str)
    }

    /// Look up an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Look up a numeric attribute as `f64`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.map.get(key).and_then(Value::as_f64)
    }

    /// Look up a string attribute.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Whether the attribute is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Set an attribute, returning the previous value.
    ///
    /// - `units` strings are canonicalized.
    /// - `datatype` / `datatype_name` accept a code or a name; both keys are
    ///   rewritten together. An unregistered value leaves `self` unchanged.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, AttrsError> {
        let key = key.into();
        let value = value.into();

        match key.as_str() {
            DATATYPE_KEY | DATATYPE_NAME_KEY => {
                let datatype = DataType::from_value(&value).context(DatatypeSnafu)?;
                let previous = self.map.get(&key).cloned();
                self.set_datatype(datatype);
                Ok(previous)
            }
            UNITS_KEY => {
                let value = match value {
                    Value::String(s) => Value::String(canonical_unit(&s).to_string()),
                    other => other,
                };
                Ok(self.map.insert(key, value))
            }
            _ => Ok(self.map.insert(key, value)),
        }
    }

    /// Remove an attribute. The reserved keys cannot be removed.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, AttrsError> {
        ensure!(
            !matches!(key, DATATYPE_KEY | DATATYPE_NAME_KEY | UNITS_KEY),
            RequiredSnafu { key }
        );
        Ok(self.map.shift_remove(key))
    }

    /// Iterate over attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &MetaMap {
        &self.map
    }

    /// Consume into the underlying mapping.
    pub fn into_map(self) -> MetaMap {
        self.map
    }

    /// Stamp a crate-owned key without the reserved-key routing.
    pub(crate) fn insert_raw(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> Attrs {
        let Value::Object(map) = v else {
            panic!("expected object");
        };
        Attrs::from_map(map).unwrap()
    }

    #[test]
    fn from_map_fills_required_keys() {
        let a = attrs(json!({"sampling_rate": 100}));
        assert_eq!(a.get("units"), Some(&Value::Null));
        assert_eq!(a.datatype(), DataType::Undefined);
        assert_eq!(a.get("datatype_name"), Some(&json!("UNDEFINED")));
    }

    #[test]
    fn inserting_datatype_rewrites_name() {
        let mut a = attrs(json!({"units": "s"}));
        assert_eq!(a.datatype(), DataType::Event);

        let previous = a.insert("datatype", 1001).unwrap();
        assert_eq!(previous, Some(json!(1000)));
        assert_eq!(a.get("datatype_name"), Some(&json!("SPIKET")));

        a.insert("datatype_name", "BEHAVET").unwrap();
        assert_eq!(a.get("datatype"), Some(&json!(1002)));
        assert_eq!(a.datatype(), DataType::Behavet);
    }

    #[test]
    fn unregistered_datatype_insert_is_rejected() {
        let mut a = attrs(json!({"units": "s"}));
        let before = a.clone();
        let err = a.insert("datatype", -1).unwrap_err();
        assert!(err.is_lookup());
        assert_eq!(a, before);
    }

    #[test]
    fn units_are_canonicalized_on_insert() {
        let mut a = attrs(json!({"units": "mV"}));
        a.insert("units", "seconds").unwrap();
        assert_eq!(a.units(), Some("s"));
    }

    #[test]
    fn reserved_keys_cannot_be_removed() {
        let mut a = attrs(json!({"units": "mV", "extra": "barley"}));
        for key in ["datatype", "datatype_name", "units"] {
            assert!(matches!(a.remove(key), Err(AttrsError::Required { .. })));
        }
        assert_eq!(a.remove("extra").unwrap(), Some(json!("barley")));
        assert!(!a.contains_key("extra"));
    }
}
