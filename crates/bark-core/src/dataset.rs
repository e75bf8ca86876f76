//! Datasets: the sampled and event payload kinds and the dispatcher that
//! picks one from persisted metadata.
//!
//! Both kinds share the same contract through [`DatasetLike`]: a path, a
//! normalized attribute mapping, and an explicit [`DatasetLike::save_attrs`]
//! write-back. Attribute edits stay in memory until saved.
//!
//! [`read_dataset`] reads only the sidecar, classifies the stored datatype
//! code, and hands off to [`read_sampled`] or [`read_events`]. The payload
//! stays unopened until its data is first requested.

pub mod dtype;
pub mod error;
pub mod events;
pub(crate) mod payload;
pub mod sampled;

use std::{fmt, fs::File, path::Path};

use snafu::prelude::*;

pub use dtype::{Dtype, Sample};
pub use error::{DatasetError, DatasetResult};
pub use events::{ColumnType, EventData, EventParams, read_events, write_events};
pub use sampled::{
    MapMode, SampleArray, SampleMatrix, SampledData, SampledLayout, SampledParams, read_sampled,
    read_sampled_with_mode, write_sampled,
};

use crate::{
    datatypes::{DataType, is_pointproc, is_timeseries},
    metadata::{Attrs, DATATYPE_KEY, DATATYPE_NAME_KEY, MetaMap, UNITS_KEY, normalize, sidecar},
    storage,
};
use error::*;

/// The two concrete dataset kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Array-backed continuous signal.
    Sampled,
    /// Table-backed intervals.
    Events,
}

impl DatasetKind {
    /// Classify a datatype code, or `None` if it lies in neither range.
    pub fn for_code(code: i64) -> Option<Self> {
        if is_timeseries(code) {
            Some(DatasetKind::Sampled)
        } else if is_pointproc(code) {
            Some(DatasetKind::Events)
        } else {
            None
        }
    }

    /// Datatype used when an inferred one belongs to the other kind.
    pub fn default_datatype(self) -> DataType {
        match self {
            DatasetKind::Sampled => DataType::Undefined,
            DatasetKind::Events => DataType::Event,
        }
    }

    /// Whether `datatype` can describe a dataset of this kind.
    pub fn admits(self, datatype: DataType) -> bool {
        DatasetKind::for_code(datatype.code()) == Some(self)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetKind::Sampled => "sampled",
            DatasetKind::Events => "events",
        })
    }
}

/// Make the datatype in `attrs` agree with `kind`.
///
/// An explicit datatype of the wrong range is an error. An inferred one is
/// replaced by the kind's default.
pub(crate) fn settle_datatype(
    attrs: &mut Attrs,
    explicit: bool,
    kind: DatasetKind,
) -> DatasetResult<()> {
    let datatype = attrs.datatype();
    if kind.admits(datatype) {
        return Ok(());
    }
    ensure!(!explicit, DatatypeKindMismatchSnafu { datatype, kind });
    attrs.set_datatype(kind.default_datatype());
    Ok(())
}

/// Open a dataset payload, reporting a missing file as
/// [`DatasetError::PayloadNotFound`].
pub(crate) fn open_payload(path: &Path, writable: bool) -> DatasetResult<File> {
    match storage::open_existing(path, writable) {
        Ok(file) => Ok(file),
        Err(e) if e.is_not_found() => PayloadNotFoundSnafu {
            path: path.display().to_string(),
        }
        .fail(),
        Err(source) => Err(DatasetError::Storage { source }),
    }
}

/// The contract shared by every dataset kind.
pub trait DatasetLike {
    /// The concrete kind of this object.
    fn kind(&self) -> DatasetKind;

    /// Path of the primary payload.
    fn path(&self) -> &Path;

    /// Normalized attributes as currently held in memory.
    fn attrs(&self) -> &Attrs;

    /// Mutable attributes. Changes are persisted by [`save_attrs`](Self::save_attrs).
    fn attrs_mut(&mut self) -> &mut Attrs;

    /// Write the in-memory attributes back to the sidecar.
    fn save_attrs(&mut self) -> DatasetResult<()>;
}

/// A dataset of either kind, as returned by [`read_dataset`].
#[derive(Debug)]
pub enum Dataset {
    /// A sampled dataset.
    Sampled(SampledData),
    /// An event dataset.
    Events(EventData),
}

impl Dataset {
    /// The sampled dataset, if this is one.
    pub fn as_sampled(&self) -> Option<&SampledData> {
        match self {
            Dataset::Sampled(d) => Some(d),
            Dataset::Events(_) => None,
        }
    }

    /// The sampled dataset, mutably.
    pub fn as_sampled_mut(&mut self) -> Option<&mut SampledData> {
        match self {
            Dataset::Sampled(d) => Some(d),
            Dataset::Events(_) => None,
        }
    }

    /// The event dataset, if this is one.
    pub fn as_events(&self) -> Option<&EventData> {
        match self {
            Dataset::Events(d) => Some(d),
            Dataset::Sampled(_) => None,
        }
    }

    /// The event dataset, mutably.
    pub fn as_events_mut(&mut self) -> Option<&mut EventData> {
        match self {
            Dataset::Events(d) => Some(d),
            Dataset::Sampled(_) => None,
        }
    }

    fn inner(&self) -> &dyn DatasetLike {
        match self {
            Dataset::Sampled(d) => d,
            Dataset::Events(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DatasetLike {
        match self {
            Dataset::Sampled(d) => d,
            Dataset::Events(d) => d,
        }
    }
}

impl DatasetLike for Dataset {
    fn kind(&self) -> DatasetKind {
        self.inner().kind()
    }

    fn path(&self) -> &Path {
        self.inner().path()
    }

    fn attrs(&self) -> &Attrs {
        self.inner().attrs()
    }

    fn attrs_mut(&mut self) -> &mut Attrs {
        self.inner_mut().attrs_mut()
    }

    fn save_attrs(&mut self) -> DatasetResult<()> {
        self.inner_mut().save_attrs()
    }
}

impl From<SampledData> for Dataset {
    fn from(d: SampledData) -> Self {
        Dataset::Sampled(d)
    }
}

impl From<EventData> for Dataset {
    fn from(d: EventData) -> Self {
        Dataset::Events(d)
    }
}

/// Whether `dset` is a sampled dataset object.
///
/// Decided by the object's concrete kind, never by its datatype code.
pub fn is_sampled<D: DatasetLike + ?Sized>(dset: &D) -> bool {
    dset.kind() == DatasetKind::Sampled
}

/// Whether `dset` is an event dataset object.
pub fn is_events<D: DatasetLike + ?Sized>(dset: &D) -> bool {
    dset.kind() == DatasetKind::Events
}

/// The datatype code a sidecar mapping records, before registry validation.
fn stored_code(path: &Path, meta: &MetaMap) -> DatasetResult<i64> {
    if let Some(code) = meta.get(DATATYPE_KEY).and_then(|v| v.as_i64()) {
        return Ok(code);
    }
    if !meta.contains_key(DATATYPE_KEY) && !meta.contains_key(DATATYPE_NAME_KEY) {
        let units = meta.get(UNITS_KEY).and_then(|v| v.as_str());
        return Ok(normalize::infer_datatype(units).code());
    }
    let datatype = normalize::resolve_datatype(meta).map_err(|_| DatasetError::InvalidAttr {
        path: path.display().to_string(),
        key: DATATYPE_KEY,
        message: "must be an integer code or a registered datatype name".to_string(),
    })?;
    Ok(datatype.code())
}

/// Read any dataset, choosing the kind from its stored datatype.
///
/// Point-process codes (>= 1000) open an event dataset; timeseries codes
/// (0..1000) open a sampled dataset read-only. A code in neither range fails
/// with [`DatasetError::UnrecognizedDatatype`].
pub fn read_dataset(path: impl AsRef<Path>) -> DatasetResult<Dataset> {
    let path = path.as_ref();
    let meta = sidecar::load(path).context(SidecarSnafu)?;
    let code = stored_code(path, &meta)?;

    match DatasetKind::for_code(code) {
        Some(DatasetKind::Sampled) => {
            SampledData::from_meta(path, meta, MapMode::ReadOnly).map(Dataset::Sampled)
        }
        Some(DatasetKind::Events) => EventData::from_meta(path, meta).map(Dataset::Events),
        None => UnrecognizedDatatypeSnafu {
            path: path.display().to_string(),
            code,
        }
        .fail(),
    }
}
