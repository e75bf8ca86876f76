//! Sampled (continuous) datasets.
//!
//! A sampled dataset is a row-major `n_samples x n_channels` array of one
//! [`Dtype`], stored as a flat little-endian binary file and accessed through
//! a memory map. The sidecar records the layout (`dtype`, `n_samples`,
//! `n_channels`) next to `sampling_rate` and `units`, so the array can be
//! re-derived without reading the payload.
//!
//! Mapped pages are shared with every other live mapping of the same file.
//! Writes through a read-write mapping are visible to other mappings
//! immediately and are not transactional.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;
use memmap2::{Mmap, MmapMut};
use serde_json::Value;
use snafu::prelude::*;

use crate::{
    dataset::{
        DatasetKind, DatasetLike,
        dtype::{Dtype, Sample},
        error::*,
        open_payload,
        payload::Payload,
        settle_datatype,
    },
    datatypes::DataType,
    metadata::{Attrs, MetaMap, UNITS_KEY, normalize, sidecar},
    storage,
};

/// Key holding the sampling rate in Hz.
pub const SAMPLING_RATE_KEY: &str = "sampling_rate";
/// Key holding the optional scale from stored integers to `units`.
pub const UNIT_SCALE_KEY: &str = "unit_scale";
/// Key holding the element type tag.
pub const DTYPE_KEY: &str = "dtype";
/// Key holding the row count.
pub const N_SAMPLES_KEY: &str = "n_samples";
/// Key holding the column count.
pub const N_CHANNELS_KEY: &str = "n_channels";

/// How a payload is memory-mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Shared read-only mapping.
    #[default]
    ReadOnly,
    /// Shared read-write mapping; writes reach the file.
    ReadWrite,
}

/// Shape and element type of a sampled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledLayout {
    /// Element type.
    pub dtype: Dtype,
    /// Number of rows (samples).
    pub n_samples: usize,
    /// Number of columns (channels).
    pub n_channels: usize,
}

impl SampledLayout {
    /// Payload size in bytes, or `None` on overflow.
    pub fn byte_len(&self) -> Option<u64> {
        (self.n_samples as u64)
            .checked_mul(self.n_channels as u64)?
            .checked_mul(self.dtype.itemsize() as u64)
    }

    fn checked_byte_len(&self) -> DatasetResult<u64> {
        self.byte_len().context(InvalidArgumentSnafu {
            message: format!(
                "payload of {} x {} {} overflows",
                self.n_samples, self.n_channels, self.dtype
            ),
        })
    }

    fn stamp(&self, attrs: &mut Attrs) {
        attrs.insert_raw(DTYPE_KEY, Value::from(self.dtype.tag()));
        attrs.insert_raw(N_SAMPLES_KEY, Value::from(self.n_samples as u64));
        attrs.insert_raw(N_CHANNELS_KEY, Value::from(self.n_channels as u64));
    }

    /// Rebuild the layout from persisted attributes.
    ///
    /// When `n_samples` is absent it is derived from `payload_len`, which must
    /// then be a whole number of rows.
    fn from_attrs(path: &Path, attrs: &Attrs, payload_len: u64) -> DatasetResult<Self> {
        let path_str = || path.display().to_string();

        let dtype = attrs
            .get_str(DTYPE_KEY)
            .context(MissingAttrSnafu {
                path: path_str(),
                key: DTYPE_KEY,
            })?
            .parse::<Dtype>()?;

        let n_channels = read_count(path, attrs, N_CHANNELS_KEY)?.context(MissingAttrSnafu {
            path: path_str(),
            key: N_CHANNELS_KEY,
        })?;
        ensure!(
            n_channels > 0,
            InvalidAttrSnafu {
                path: path_str(),
                key: N_CHANNELS_KEY,
                message: "must be at least 1",
            }
        );

        let n_samples = match read_count(path, attrs, N_SAMPLES_KEY)? {
            Some(n) => n,
            None => {
                let row_bytes = n_channels
                    .checked_mul(dtype.itemsize())
                    .and_then(|n| u64::try_from(n).ok())
                    .context(InvalidAttrSnafu {
                        path: path_str(),
                        key: N_CHANNELS_KEY,
                        message: format!("{n_channels} channels of {dtype} overflow a row"),
                    })?;
                ensure!(
                    payload_len % row_bytes == 0,
                    PayloadSizeMismatchSnafu {
                        path: path_str(),
                        expected: payload_len - payload_len % row_bytes,
                        actual: payload_len,
                    }
                );
                (payload_len / row_bytes) as usize
            }
        };

        Ok(SampledLayout {
            dtype,
            n_samples,
            n_channels,
        })
    }
}

fn read_count(path: &Path, attrs: &Attrs, key: &'static str) -> DatasetResult<Option<usize>> {
    match attrs.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .context(InvalidAttrSnafu {
                path: path.display().to_string(),
                key,
                message: format!("expected a non-negative integer, found {v}"),
            }),
    }
}

/// Parameters for [`write_sampled`].
#[derive(Debug, Clone)]
pub struct SampledParams {
    sampling_rate: f64,
    units: Option<String>,
    unit_scale: Option<f64>,
    datatype: Option<DataType>,
    dtype: Option<Dtype>,
    n_samples: Option<usize>,
    n_channels: Option<usize>,
    extra: MetaMap,
}

impl SampledParams {
    /// Parameters with the required sampling rate (Hz) and units.
    pub fn new(sampling_rate: f64, units: impl Into<String>) -> Self {
        SampledParams {
            sampling_rate,
            units: Some(units.into()),
            unit_scale: None,
            datatype: None,
            dtype: None,
            n_samples: None,
            n_channels: None,
            extra: MetaMap::new(),
        }
    }

    /// Parameters with no units recorded (`units: null`).
    pub fn unitless(sampling_rate: f64) -> Self {
        SampledParams {
            units: None,
            ..SampledParams::new(sampling_rate, "")
        }
    }

    /// Scale from stored values to `units`.
    pub fn unit_scale(mut self, scale: f64) -> Self {
        self.unit_scale = Some(scale);
        self
    }

    /// Explicit datatype; must be in the timeseries range.
    pub fn datatype(mut self, datatype: DataType) -> Self {
        self.datatype = Some(datatype);
        self
    }

    /// Element type; required when no data is supplied.
    pub fn dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Row count; required when no data is supplied.
    pub fn n_samples(mut self, n: usize) -> Self {
        self.n_samples = Some(n);
        self
    }

    /// Column count; required when no data is supplied.
    pub fn n_channels(mut self, n: usize) -> Self {
        self.n_channels = Some(n);
        self
    }

    /// Additional free-form attribute. Keys set by the typed builders win.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn layout(&self, data: Option<&SampleArray>) -> DatasetResult<SampledLayout> {
        let Some(data) = data else {
            let dtype = self.dtype.context(MissingPayloadShapeSnafu { missing: "dtype" })?;
            let n_samples = self
                .n_samples
                .context(MissingPayloadShapeSnafu { missing: "n_samples" })?;
            let n_channels = self
                .n_channels
                .context(MissingPayloadShapeSnafu { missing: "n_channels" })?;
            ensure!(
                n_channels > 0,
                InvalidArgumentSnafu {
                    message: "n_channels must be at least 1",
                }
            );
            return Ok(SampledLayout {
                dtype,
                n_samples,
                n_channels,
            });
        };

        let layout = data.layout();
        check_matches("dtype", self.dtype, layout.dtype)?;
        check_matches("n_samples", self.n_samples, layout.n_samples)?;
        check_matches("n_channels", self.n_channels, layout.n_channels)?;
        Ok(layout)
    }

    fn into_map(self) -> MetaMap {
        let mut map = MetaMap::new();
        map.insert(SAMPLING_RATE_KEY.to_string(), Value::from(self.sampling_rate));
        map.insert(
            UNITS_KEY.to_string(),
            self.units.map_or(Value::Null, Value::from),
        );
        if let Some(scale) = self.unit_scale {
            map.insert(UNIT_SCALE_KEY.to_string(), Value::from(scale));
        }
        for (k, v) in self.extra {
            map.entry(k).or_insert(v);
        }
        if let Some(datatype) = self.datatype {
            normalize::set_datatype(&mut map, datatype);
        }
        map
    }
}

fn check_matches<T>(field: &'static str, expected: Option<T>, actual: T) -> DatasetResult<()>
where
    T: PartialEq + ToString,
{
    match expected {
        Some(expected) if expected != actual => ShapeMismatchSnafu {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .fail(),
        _ => Ok(()),
    }
}

/// In-memory row-major samples, ready to be written as a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArray {
    layout: SampledLayout,
    bytes: Vec<u8>,
}

impl SampleArray {
    /// Build from interleaved samples (`row0ch0, row0ch1, ..., row1ch0, ...`).
    pub fn new<T: Sample>(samples: &[T], n_channels: usize) -> DatasetResult<Self> {
        ensure!(
            n_channels > 0,
            InvalidArgumentSnafu {
                message: "n_channels must be at least 1",
            }
        );
        ensure!(
            samples.len() % n_channels == 0,
            InvalidArgumentSnafu {
                message: format!(
                    "{} samples do not fill whole rows of {n_channels} channels",
                    samples.len()
                ),
            }
        );

        let size = T::DTYPE.itemsize();
        let mut bytes = vec![0u8; samples.len() * size];
        for (chunk, &s) in bytes.chunks_exact_mut(size).zip(samples) {
            s.write_le(chunk);
        }

        Ok(SampleArray {
            layout: SampledLayout {
                dtype: T::DTYPE,
                n_samples: samples.len() / n_channels,
                n_channels,
            },
            bytes,
        })
    }

    /// Build from equally long rows, one per sample.
    pub fn from_rows<T: Sample, R: AsRef<[T]>>(rows: &[R]) -> DatasetResult<Self> {
        let n_channels = rows.first().map_or(0, |r| r.as_ref().len());
        let mut flat = Vec::with_capacity(rows.len() * n_channels);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            ensure!(
                row.len() == n_channels,
                InvalidArgumentSnafu {
                    message: format!(
                        "row {i} has {} channels, expected {n_channels}",
                        row.len()
                    ),
                }
            );
            flat.extend_from_slice(row);
        }
        SampleArray::new(&flat, n_channels)
    }

    /// Shape and element type.
    pub fn layout(&self) -> SampledLayout {
        self.layout
    }

    /// `(n_samples, n_channels)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.layout.n_samples, self.layout.n_channels)
    }

    /// Raw little-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug)]
enum Mapping {
    /// Zero-length payloads are not mapped.
    Empty,
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A memory-mapped sampled payload.
#[derive(Debug)]
pub struct SampleMatrix {
    path: PathBuf,
    layout: SampledLayout,
    mapping: Mapping,
}

impl SampleMatrix {
    fn open(path: &Path, layout: SampledLayout, mode: MapMode) -> DatasetResult<Self> {
        let expected = check_payload(path, layout)?;

        let mapping = if expected == 0 {
            Mapping::Empty
        } else {
            let file = open_payload(path, mode == MapMode::ReadWrite)?;
            let map_err = |source| DatasetError::Map {
                path: path.display().to_string(),
                source,
            };
            // SAFETY: the file stays open until the map is created; the
            // mapping itself outlives the handle. External truncation while
            // mapped is outside the single-writer contract.
            match mode {
                MapMode::ReadOnly => {
                    Mapping::ReadOnly(unsafe { Mmap::map(&file) }.map_err(map_err)?)
                }
                MapMode::ReadWrite => {
                    Mapping::ReadWrite(unsafe { MmapMut::map_mut(&file) }.map_err(map_err)?)
                }
            }
        };

        Ok(SampleMatrix {
            path: path.to_path_buf(),
            layout,
            mapping,
        })
    }

    /// Shape and element type.
    pub fn layout(&self) -> SampledLayout {
        self.layout
    }

    /// `(n_samples, n_channels)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.layout.n_samples, self.layout.n_channels)
    }

    /// Number of rows.
    pub fn n_samples(&self) -> usize {
        self.layout.n_samples
    }

    /// Number of columns.
    pub fn n_channels(&self) -> usize {
        self.layout.n_channels
    }

    /// Element type.
    pub fn dtype(&self) -> Dtype {
        self.layout.dtype
    }

    /// Whether writes are permitted.
    pub fn is_writable(&self) -> bool {
        !matches!(self.mapping, Mapping::ReadOnly(_))
    }

    /// The raw little-endian payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.mapping {
            Mapping::Empty => &[],
            Mapping::ReadOnly(m) => &m[..],
            Mapping::ReadWrite(m) => &m[..],
        }
    }

    /// Mutable payload bytes; fails on a read-only mapping.
    pub fn as_bytes_mut(&mut self) -> DatasetResult<&mut [u8]> {
        match &mut self.mapping {
            Mapping::Empty => Ok(&mut [][..]),
            Mapping::ReadWrite(m) => Ok(&mut m[..]),
            Mapping::ReadOnly(_) => ReadOnlyPayloadSnafu {
                path: self.path.display().to_string(),
            }
            .fail(),
        }
    }

    fn check_dtype<T: Sample>(&self) -> DatasetResult<()> {
        ensure!(
            T::DTYPE == self.layout.dtype,
            DtypeMismatchSnafu {
                actual: self.layout.dtype,
                requested: T::DTYPE,
            }
        );
        Ok(())
    }

    fn offset(&self, row: usize, col: usize) -> DatasetResult<usize> {
        let SampledLayout {
            dtype,
            n_samples,
            n_channels,
        } = self.layout;
        ensure!(
            row < n_samples && col < n_channels,
            IndexOutOfBoundsSnafu {
                row,
                col,
                n_samples,
                n_channels,
            }
        );
        Ok((row * n_channels + col) * dtype.itemsize())
    }

    /// Read one sample.
    pub fn get<T: Sample>(&self, row: usize, col: usize) -> DatasetResult<T> {
        self.check_dtype::<T>()?;
        let at = self.offset(row, col)?;
        Ok(T::read_le(&self.as_bytes()[at..at + T::DTYPE.itemsize()]))
    }

    /// Write one sample through a read-write mapping.
    pub fn set<T: Sample>(&mut self, row: usize, col: usize, value: T) -> DatasetResult<()> {
        self.check_dtype::<T>()?;
        let at = self.offset(row, col)?;
        let bytes = self.as_bytes_mut()?;
        value.write_le(&mut bytes[at..at + T::DTYPE.itemsize()]);
        Ok(())
    }

    /// All channels of one row.
    pub fn row<T: Sample>(&self, row: usize) -> DatasetResult<Vec<T>> {
        self.check_dtype::<T>()?;
        let start = self.offset(row, 0)?;
        let len = self.layout.n_channels * T::DTYPE.itemsize();
        Ok(decode(&self.as_bytes()[start..start + len]))
    }

    /// All rows of one channel.
    pub fn column<T: Sample>(&self, col: usize) -> DatasetResult<Vec<T>> {
        self.check_dtype::<T>()?;
        if self.layout.n_samples == 0 {
            ensure!(
                col < self.layout.n_channels,
                IndexOutOfBoundsSnafu {
                    row: 0usize,
                    col,
                    n_samples: 0usize,
                    n_channels: self.layout.n_channels,
                }
            );
            return Ok(Vec::new());
        }
        (0..self.layout.n_samples)
            .map(|row| self.get(row, col))
            .collect()
    }

    /// Copy the whole payload out in row-major order.
    pub fn to_vec<T: Sample>(&self) -> DatasetResult<Vec<T>> {
        self.check_dtype::<T>()?;
        Ok(decode(self.as_bytes()))
    }

    /// Flush outstanding writes of a read-write mapping to disk.
    pub fn flush(&self) -> DatasetResult<()> {
        if let Mapping::ReadWrite(m) = &self.mapping {
            m.flush().context(MapSnafu {
                path: self.path.display().to_string(),
            })?;
        }
        Ok(())
    }
}

fn decode<T: Sample>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.itemsize())
        .map(T::read_le)
        .collect()
}

/// Verify that the payload exists and has the size the layout requires.
fn check_payload(path: &Path, layout: SampledLayout) -> DatasetResult<u64> {
    let expected = layout.checked_byte_len()?;
    let actual = payload_len(path)?;
    ensure!(
        actual == expected,
        PayloadSizeMismatchSnafu {
            path: path.display().to_string(),
            expected,
            actual,
        }
    );
    Ok(expected)
}

fn payload_len(path: &Path) -> DatasetResult<u64> {
    let file = open_payload(path, false)?;
    storage::file_len(&file, path).context(StorageSnafu)
}

/// A sampled dataset: sidecar attributes plus a lazily mapped payload.
#[derive(Debug)]
pub struct SampledData {
    path: PathBuf,
    attrs: Attrs,
    layout: SampledLayout,
    mode: MapMode,
    data: Payload<SampleMatrix>,
}

impl SampledData {
    /// Build from an already loaded sidecar mapping.
    pub(crate) fn from_meta(path: &Path, meta: MetaMap, mode: MapMode) -> DatasetResult<Self> {
        let explicit = normalize::has_explicit_datatype(&meta);
        let mut attrs = Attrs::from_map(meta).context(LookupSnafu)?;
        settle_datatype(&mut attrs, explicit, DatasetKind::Sampled)?;

        let rate = attrs.get(SAMPLING_RATE_KEY).context(MissingAttrSnafu {
            path: path.display().to_string(),
            key: SAMPLING_RATE_KEY,
        })?;
        ensure!(
            rate.as_f64().is_some_and(|r| r.is_finite() && r > 0.0),
            InvalidAttrSnafu {
                path: path.display().to_string(),
                key: SAMPLING_RATE_KEY,
                message: format!("expected a positive number, found {rate}"),
            }
        );

        let payload_len = payload_len(path)?;
        let layout = SampledLayout::from_attrs(path, &attrs, payload_len)?;
        check_payload(path, layout)?;

        Ok(SampledData {
            path: path.to_path_buf(),
            attrs,
            layout,
            mode,
            data: Payload::unopened(),
        })
    }

    /// Sampling rate in Hz.
    pub fn sampling_rate(&self) -> f64 {
        self.attrs.get_f64(SAMPLING_RATE_KEY).unwrap_or(f64::NAN)
    }

    /// Shape and element type recorded for the payload.
    pub fn layout(&self) -> SampledLayout {
        self.layout
    }

    /// `(n_samples, n_channels)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.layout.n_samples, self.layout.n_channels)
    }

    /// Mapping mode used when the payload is opened.
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// Whether the payload has been mapped.
    pub fn is_loaded(&self) -> bool {
        self.data.is_opened()
    }

    /// The mapped payload, opening it on first access.
    pub fn data(&mut self) -> DatasetResult<&SampleMatrix> {
        self.data_mut().map(|m| &*m)
    }

    /// The mapped payload, mutably.
    pub fn data_mut(&mut self) -> DatasetResult<&mut SampleMatrix> {
        let (path, layout, mode) = (&self.path, self.layout, self.mode);
        self.data
            .get_or_try_open(|| SampleMatrix::open(path, layout, mode))
    }

    /// Unmap the payload. The next data access maps it again.
    pub fn close(&mut self) {
        self.data.close();
    }
}

impl DatasetLike for SampledData {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Sampled
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    /// Persist the attributes, re-stamping the recorded layout.
    fn save_attrs(&mut self) -> DatasetResult<()> {
        ensure!(
            DatasetKind::Sampled.admits(self.attrs.datatype()),
            DatatypeKindMismatchSnafu {
                datatype: self.attrs.datatype(),
                kind: DatasetKind::Sampled,
            }
        );
        self.layout.stamp(&mut self.attrs);
        sidecar::save(&self.path, self.attrs.as_map()).context(SidecarSnafu)
    }
}

/// Write a sampled dataset and return it with the payload mapped read-write.
///
/// With `data`, the payload is written from it. Without, a zero-filled
/// payload is allocated from the `dtype`, `n_samples`, and `n_channels`
/// parameters, all of which are then required.
///
/// Metadata is normalized before anything touches the disk, so a lookup
/// failure leaves no files behind. An existing payload at `path` is replaced.
pub fn write_sampled(
    path: impl AsRef<Path>,
    data: Option<&SampleArray>,
    params: SampledParams,
) -> DatasetResult<SampledData> {
    let path = path.as_ref();

    ensure!(
        params.sampling_rate.is_finite() && params.sampling_rate > 0.0,
        InvalidArgumentSnafu {
            message: format!(
                "sampling_rate must be a positive number, got {}",
                params.sampling_rate
            ),
        }
    );
    let layout = params.layout(data)?;
    let byte_len = layout.checked_byte_len()?;

    let meta = params.into_map();
    let explicit = normalize::has_explicit_datatype(&meta);
    let mut attrs = Attrs::from_map(meta).context(LookupSnafu)?;
    settle_datatype(&mut attrs, explicit, DatasetKind::Sampled)?;
    layout.stamp(&mut attrs);

    {
        let mut file = storage::create_truncate(path).context(StorageSnafu)?;
        match data {
            Some(data) => file
                .write_all(data.as_bytes())
                .map_err(|e| storage::io_error(path, e))
                .context(StorageSnafu)?,
            None => storage::set_len(&file, path, byte_len).context(StorageSnafu)?,
        }
        file.sync_all()
            .map_err(|e| storage::io_error(path, e))
            .context(StorageSnafu)?;
    }

    sidecar::save(path, attrs.as_map()).context(SidecarSnafu)?;

    let matrix = SampleMatrix::open(path, layout, MapMode::ReadWrite)?;
    debug!(
        "wrote sampled dataset {} ({} x {} {})",
        path.display(),
        layout.n_samples,
        layout.n_channels,
        layout.dtype
    );

    Ok(SampledData {
        path: path.to_path_buf(),
        attrs,
        layout,
        mode: MapMode::ReadWrite,
        data: Payload::opened(matrix),
    })
}

/// Read a sampled dataset; the payload is mapped read-only on first access.
pub fn read_sampled(path: impl AsRef<Path>) -> DatasetResult<SampledData> {
    read_sampled_with_mode(path, MapMode::ReadOnly)
}

/// Read a sampled dataset with an explicit mapping mode.
///
/// The payload's existence and size are checked against the recorded layout
/// immediately; the mapping itself is created on first data access.
pub fn read_sampled_with_mode(path: impl AsRef<Path>, mode: MapMode) -> DatasetResult<SampledData> {
    let path = path.as_ref();
    let meta = sidecar::load(path).context(SidecarSnafu)?;
    let dset = SampledData::from_meta(path, meta, mode)?;
    debug!(
        "read sampled dataset {} ({} x {})",
        path.display(),
        dset.layout.n_samples,
        dset.layout.n_channels
    );
    Ok(dset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn params() -> SampledParams {
        SampledParams::new(30000.0, "mV")
            .unit_scale(0.025)
            .attr("extra", "barley")
    }

    #[test]
    fn write_then_read_round_trips_samples() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("test_sampled");
        let samples: Vec<i16> = (0..30).map(|i| i * 3 - 40).collect();
        let array = SampleArray::new(&samples, 3)?;

        let mut written = write_sampled(&path, Some(&array), params())?;
        assert!(written.is_loaded());
        assert_eq!(written.data()?.shape(), (10, 3));

        let mut read = read_sampled(&path)?;
        assert!(!read.is_loaded());
        assert_eq!(read.shape(), (10, 3));
        assert_eq!(read.data()?.to_vec::<i16>()?, samples);
        assert_eq!(read.data()?.get::<i16>(2, 1)?, samples[7]);
        assert_eq!(read.attrs().get("extra"), Some(&json!("barley")));
        assert_eq!(read.attrs().get("unit_scale"), Some(&json!(0.025)));
        assert_eq!(read.sampling_rate(), 30000.0);
        Ok(())
    }

    #[test]
    fn missing_shape_information_is_an_argument_error() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("empty");
        let params = SampledParams::new(10.0, "mV")
            .n_channels(10)
            .dtype(Dtype::Int16);

        let err = write_sampled(&path, None, params).unwrap_err();
        assert!(
            matches!(err, DatasetError::MissingPayloadShape { missing: "n_samples" }),
            "got {err:?}"
        );
        assert!(err.is_argument());
        assert!(!path.exists());
        assert!(!sidecar::sidecar_path(&path).exists());
        Ok(())
    }

    #[test]
    fn zero_filled_payload_from_dimensions() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("zeros");
        let params = SampledParams::new(1000.0, "mV")
            .dtype(Dtype::Float32)
            .n_samples(4)
            .n_channels(2);

        let mut dset = write_sampled(&path, None, params)?;
        assert_eq!(std::fs::metadata(&path)?.len(), 4 * 2 * 4);
        assert_eq!(dset.data()?.to_vec::<f32>()?, vec![0.0; 8]);
        Ok(())
    }

    #[test]
    fn writes_through_read_write_mapping_persist() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("rw");
        let array = SampleArray::from_rows(&[[1i32, 2], [3, 4]])?;
        write_sampled(&path, Some(&array), params())?;

        let mut dset = read_sampled_with_mode(&path, MapMode::ReadWrite)?;
        dset.data_mut()?.set(1, 0, 30i32)?;
        dset.data()?.flush()?;
        drop(dset);

        let mut dset = read_sampled(&path)?;
        assert_eq!(dset.data()?.column::<i32>(0)?, vec![1, 30]);
        assert_eq!(dset.data()?.row::<i32>(1)?, vec![30, 4]);

        let err = dset.data_mut()?.set(0, 0, 5i32).unwrap_err();
        assert!(matches!(err, DatasetError::ReadOnlyPayload { .. }));
        Ok(())
    }

    #[test]
    fn typed_access_checks_dtype_and_bounds() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("typed");
        let array = SampleArray::new(&[1.0f64, 2.0, 3.0, 4.0], 2)?;
        let mut dset = write_sampled(&path, Some(&array), params())?;
        let data = dset.data()?;

        assert!(matches!(
            data.get::<f32>(0, 0),
            Err(DatasetError::DtypeMismatch { .. })
        ));
        assert!(matches!(
            data.get::<f64>(2, 0),
            Err(DatasetError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            data.get::<f64>(0, 2),
            Err(DatasetError::IndexOutOfBounds { .. })
        ));
        Ok(())
    }

    #[test]
    fn explicit_parameters_must_agree_with_data() -> TestResult {
        let tmp = TempDir::new()?;
        let array = SampleArray::new(&[0i16; 6], 3)?;

        let err = write_sampled(
            tmp.path().join("a"),
            Some(&array),
            params().n_channels(2),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { field: "n_channels", .. }));

        let err = write_sampled(tmp.path().join("b"), Some(&array), params().dtype(Dtype::Int32))
            .unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { field: "dtype", .. }));
        Ok(())
    }

    #[test]
    fn invalid_sampling_rate_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let array = SampleArray::new(&[0u8; 2], 1)?;
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = write_sampled(
                tmp.path().join("rate"),
                Some(&array),
                SampledParams::new(rate, "mV"),
            )
            .unwrap_err();
            assert!(err.is_argument(), "rate {rate}: {err:?}");
        }
        Ok(())
    }

    #[test]
    fn pointproc_datatype_cannot_describe_sampled_data() -> TestResult {
        let tmp = TempDir::new()?;
        let array = SampleArray::new(&[0u8; 2], 1)?;

        let err = write_sampled(
            tmp.path().join("spikes"),
            Some(&array),
            params().datatype(DataType::Spiket),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::DatatypeKindMismatch { .. }));

        // Seconds would infer EVENT; a sampled dataset falls back to UNDEFINED.
        let dset = write_sampled(
            tmp.path().join("secs"),
            Some(&array),
            SampledParams::new(10.0, "seconds"),
        )?;
        assert_eq!(dset.attrs().datatype(), DataType::Undefined);
        assert_eq!(dset.attrs().units(), Some("s"));
        Ok(())
    }

    #[test]
    fn unregistered_datatype_writes_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("bad_dt");
        let array = SampleArray::new(&[0u8; 2], 1)?;

        let err = write_sampled(&path, Some(&array), params().attr("datatype", -1)).unwrap_err();
        assert!(err.is_lookup(), "got {err:?}");
        assert!(!path.exists());
        assert!(!sidecar::sidecar_path(&path).exists());
        Ok(())
    }

    #[test]
    fn size_mismatch_is_a_format_error() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("trunc");
        let array = SampleArray::new(&[7i16; 8], 2)?;
        write_sampled(&path, Some(&array), params())?;

        std::fs::write(&path, [0u8; 6])?;
        let err = read_sampled(&path).unwrap_err();
        assert!(
            matches!(
                err,
                DatasetError::PayloadSizeMismatch {
                    expected: 16,
                    actual: 6,
                    ..
                }
            ),
            "got {err:?}"
        );
        assert!(err.is_format());
        Ok(())
    }

    #[test]
    fn missing_payload_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("gone");
        let array = SampleArray::new(&[1u16, 2], 2)?;
        write_sampled(&path, Some(&array), params())?;

        std::fs::remove_file(&path)?;
        let err = read_sampled(&path).unwrap_err();
        assert!(err.is_not_found(), "got {err:?}");
        Ok(())
    }

    #[test]
    fn n_samples_is_derived_when_absent() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("legacy");
        let samples: Vec<u16> = (0..12).collect();
        std::fs::write(
            &path,
            samples.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>(),
        )?;
        let Value::Object(meta) = json!({
            "sampling_rate": 100,
            "units": "mV",
            "dtype": "<u2",
            "n_channels": 4,
        }) else {
            unreachable!()
        };
        sidecar::save(&path, &meta)?;

        let mut dset = read_sampled(&path)?;
        assert_eq!(dset.shape(), (3, 4));
        assert_eq!(dset.data()?.row::<u16>(2)?, vec![8, 9, 10, 11]);

        dset.save_attrs()?;
        let stored = sidecar::load(&path)?;
        assert_eq!(stored["n_samples"], json!(3));
        assert_eq!(stored["dtype"], json!("uint16"));
        Ok(())
    }

    #[test]
    fn oversized_channel_count_is_a_format_error() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("corrupt");
        std::fs::write(&path, [0u8; 16])?;
        let Value::Object(meta) = json!({
            "sampling_rate": 100,
            "units": "mV",
            "dtype": "int64",
            "n_channels": u64::MAX / 2,
        }) else {
            unreachable!()
        };
        sidecar::save(&path, &meta)?;

        let err = read_sampled(&path).unwrap_err();
        assert!(
            matches!(err, DatasetError::InvalidAttr { key: N_CHANNELS_KEY, .. }),
            "got {err:?}"
        );
        assert!(err.is_format());
        Ok(())
    }

    #[test]
    fn save_attrs_restamps_layout() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("restamp");
        let array = SampleArray::new(&[0i8; 4], 2)?;
        let mut dset = write_sampled(&path, Some(&array), params())?;

        dset.attrs_mut().insert("n_channels", 7)?;
        dset.attrs_mut().insert("experimenter", "kjbrown")?;
        dset.save_attrs()?;

        let mut reread = read_sampled(&path)?;
        assert_eq!(reread.shape(), (2, 2));
        assert_eq!(reread.attrs().get("experimenter"), Some(&json!("kjbrown")));
        assert_eq!(reread.data()?.to_vec::<i8>()?, vec![0; 4]);
        Ok(())
    }
}
