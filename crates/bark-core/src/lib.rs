//! Core library for the `bark` storage convention.
//!
//! `bark` keeps time-aligned scientific recordings as plain files on disk:
//!
//! - Every dataset is a primary payload file plus a JSON sidecar at
//!   `<path>.meta` (`metadata` module).
//! - A closed [`DataType`] taxonomy classifies datasets into continuous
//!   (timeseries, codes below 1000) and discrete (point-process, codes from
//!   1000 up) kinds (`datatypes` module).
//! - Sampled datasets are flat little-endian binary arrays accessed through
//!   memory maps. Event datasets are CSV tables with `start`, `stop`, and
//!   `name` columns (`dataset` module).
//! - Datasets are grouped into timestamped, uniquely identified entries
//!   under an experiment root (`container` module).
//!
//! All operations are synchronous and assume one writer per path.
#![deny(missing_docs)]

pub mod container;
pub mod dataset;
pub mod datatypes;
pub mod metadata;
pub mod storage;

pub use container::{
    ContainerError, Entry, Root, create_entry, create_root, datetime_to_timestamp, read_entry,
    read_root, timestamp_to_datetime,
};
pub use dataset::{
    ColumnType, Dataset, DatasetError, DatasetKind, DatasetLike, Dtype, EventData, EventParams,
    MapMode, Sample, SampleArray, SampleMatrix, SampledData, SampledLayout, SampledParams,
    is_events, is_sampled, read_dataset, read_events, read_sampled, read_sampled_with_mode,
    write_events, write_sampled,
};
pub use datatypes::{DataType, DataTypeError, is_pointproc, is_timeseries};
pub use metadata::{
    Attrs, MetaMap,
    normalize::{enforce_datatypes, enforce_units},
    sidecar::{SidecarError, find_orphan_sidecars, sidecar_path},
};
