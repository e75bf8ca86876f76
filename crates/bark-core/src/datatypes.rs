//! Datatype taxonomy.
//!
//! Every dataset carries an integer `datatype` code drawn from a closed
//! registry. The numeric range alone decides how a dataset is interpreted:
//!
//! - `0..1000`: continuous, uniformly sampled signals ("timeseries").
//! - `1000..`: discrete events and intervals ("point-process").
//!
//! [`is_timeseries`] and [`is_pointproc`] are pure range tests that do not
//! consult the registry. Exact identity (names, validation of codes supplied
//! by a caller) goes through [`DataType`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// First code of the point-process range.
pub const POINTPROC_START: i64 = 1000;

/// Returns `true` iff `code` lies in the continuous range `0 <= code < 1000`.
///
/// The code does not need to be registered.
pub fn is_timeseries(code: i64) -> bool {
    (0..POINTPROC_START).contains(&code)
}

/// Returns `true` iff `code` lies in the point-process range `code >= 1000`.
///
/// The code does not need to be registered.
pub fn is_pointproc(code: i64) -> bool {
    code >= POINTPROC_START
}

/// Lookup failures against the datatype registry.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum DataTypeError {
    /// The integer code is not registered.
    #[snafu(display("unknown datatype code {code}"))]
    UnknownCode {
        /// The unregistered code.
        code: i64,
    },

    /// The name is not registered.
    #[snafu(display("unknown datatype name '{name}'"))]
    UnknownName {
        /// The unregistered name.
        name: String,
    },

    /// The stored value is neither an integer code nor a name.
    #[snafu(display("datatype must be an integer code or a name, got {value}"))]
    InvalidValue {
        /// JSON rendering of the offending value.
        value: String,
    },
}

macro_rules! datatypes {
    ($($(#[$doc:meta])* $variant:ident = $code:literal => $name:literal,)+) => {
        /// Registered dataset datatypes.
        ///
        /// Serializes as its integer code; deserialization rejects unregistered
        /// codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "i64", try_from = "i64")]
        pub enum DataType {
            $($(#[$doc])* $variant,)+
        }

        impl DataType {
            /// Every registered datatype in code order.
            pub const ALL: &'static [DataType] = &[$(DataType::$variant,)+];

            /// The integer code persisted in metadata.
            pub const fn code(self) -> i64 {
                match self {
                    $(DataType::$variant => $code,)+
                }
            }

            /// The canonical upper-case name persisted as `datatype_name`.
            pub const fn name(self) -> &'static str {
                match self {
                    $(DataType::$variant => $name,)+
                }
            }

            /// Look up a datatype by integer code.
            pub fn from_code(code: i64) -> Result<Self, DataTypeError> {
                match code {
                    $($code => Ok(DataType::$variant),)+
                    _ => UnknownCodeSnafu { code }.fail(),
                }
            }

            /// Look up a datatype by its canonical name.
            pub fn from_name(name: &str) -> Result<Self, DataTypeError> {
                match name {
                    $($name => Ok(DataType::$variant),)+
                    _ => UnknownNameSnafu { name }.fail(),
                }
            }
        }
    };
}

datatypes! {
    /// No particular interpretation.
    Undefined = 0 => "UNDEFINED",
    /// Acoustic recording.
    Acoustic = 1 => "ACOUSTIC",
    /// Extracellular, high-pass filtered.
    ExtracHp = 2 => "EXTRAC_HP",
    /// Extracellular, low-frequency (LFP).
    ExtracLf = 3 => "EXTRAC_LF",
    /// Extracellular EEG.
    ExtracEeg = 4 => "EXTRAC_EEG",
    /// Intracellular, current clamp.
    IntracCc = 5 => "INTRAC_CC",
    /// Intracellular, voltage clamp.
    IntracVc = 6 => "INTRAC_VC",
    /// Generic event.
    Event = 1000 => "EVENT",
    /// Spike times.
    Spiket = 1001 => "SPIKET",
    /// Behavioral events.
    Behavet = 1002 => "BEHAVET",
    /// Generic interval.
    Interval = 2000 => "INTERVAL",
    /// Stimulus intervals.
    Stimi = 2001 => "STIMI",
    /// Song component labels.
    Componentl = 2002 => "COMPONENTL",
}

impl DataType {
    /// Whether this datatype belongs to the continuous range.
    pub fn is_timeseries(self) -> bool {
        is_timeseries(self.code())
    }

    /// Whether this datatype belongs to the point-process range.
    pub fn is_pointproc(self) -> bool {
        is_pointproc(self.code())
    }

    /// Resolve a stored JSON value: an integer code or a registered name.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DataTypeError> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(code) => DataType::from_code(code),
                None => InvalidValueSnafu {
                    value: n.to_string(),
                }
                .fail(),
            },
            serde_json::Value::String(s) => s.parse(),
            other => InvalidValueSnafu {
                value: other.to_string(),
            }
            .fail(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = DataTypeError;

    /// Accepts a registered name, or a registered code written in decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) => DataType::from_code(code),
            Err(_) => DataType::from_name(s),
        }
    }
}

impl TryFrom<i64> for DataType {
    type Error = DataTypeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        DataType::from_code(code)
    }
}

impl From<DataType> for i64 {
    fn from(dt: DataType) -> Self {
        dt.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn range_predicates_ignore_registration() {
        assert!(is_timeseries(0));
        assert!(is_timeseries(1));
        assert!(is_timeseries(999));
        assert!(!is_timeseries(1000));
        assert!(!is_timeseries(2002));
        assert!(!is_timeseries(-1));

        assert!(is_pointproc(1000));
        assert!(is_pointproc(5555));
        assert!(!is_pointproc(999));
        assert!(!is_pointproc(-1));
    }

    #[test]
    fn name_and_code_lookups() {
        assert_eq!(DataType::from_name("UNDEFINED").unwrap().code(), 0);
        assert_eq!(DataType::from_name("EVENT").unwrap().code(), 1000);
        assert_eq!(DataType::from_code(1).unwrap().name(), "ACOUSTIC");
        assert_eq!(DataType::from_code(2002).unwrap().name(), "COMPONENTL");
    }

    #[test]
    fn unknown_lookups_fail() {
        assert_eq!(
            DataType::from_code(-1),
            Err(DataTypeError::UnknownCode { code: -1 })
        );
        assert_eq!(
            DataType::from_name("event"),
            Err(DataTypeError::UnknownName {
                name: "event".to_string()
            })
        );
    }

    #[test]
    fn registry_is_bijective() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_code(dt.code()).unwrap(), *dt);
            assert_eq!(DataType::from_name(dt.name()).unwrap(), *dt);
        }
    }

    #[test]
    fn from_value_accepts_codes_and_names() {
        assert_eq!(DataType::from_value(&json!(1001)).unwrap(), DataType::Spiket);
        assert_eq!(DataType::from_value(&json!("STIMI")).unwrap(), DataType::Stimi);
        assert_eq!(DataType::from_value(&json!("3")).unwrap(), DataType::ExtracLf);
        assert!(matches!(
            DataType::from_value(&json!(1.5)),
            Err(DataTypeError::InvalidValue { .. })
        ));
        assert!(matches!(
            DataType::from_value(&json!(true)),
            Err(DataTypeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_value(DataType::Behavet).unwrap(), json!(1002));
        let dt: DataType = serde_json::from_value(json!(2001)).unwrap();
        assert_eq!(dt, DataType::Stimi);
        assert!(serde_json::from_value::<DataType>(json!(7)).is_err());
    }
}
