//! Event (interval) datasets.
//!
//! An event dataset is a table of time-bounded, named intervals. Rows are in
//! chronological order and must carry at least the `start`, `stop`, and
//! `name` columns. The payload is CSV with a header row; the sidecar records
//! each column's type under `columns` so a reader can rebuild the exact
//! schema instead of guessing it.
//!
//! Null cells are written as the marker recorded under `null_value`, so an
//! empty string survives a round trip as an empty string. Tables without a
//! recorded marker read empty fields as null.

use std::{
    fs::File,
    io::Seek,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::{DataType as ArrowType, Field, Schema, SchemaRef},
};
use arrow_csv::{ReaderBuilder, WriterBuilder, reader::Format};
use log::debug;
use regex::Regex;
use serde_json::{Value, json};
use snafu::prelude::*;

use crate::{
    dataset::{
        DatasetKind, DatasetLike, error::*, open_payload, payload::Payload, settle_datatype,
    },
    datatypes::DataType,
    metadata::{Attrs, MetaMap, UNITS_KEY, normalize, sidecar},
    storage,
};

/// Key holding the column type map.
pub const COLUMNS_KEY: &str = "columns";

/// Key holding the text written for null cells.
pub const NULL_VALUE_KEY: &str = "null_value";

/// Null marker used by [`write_events`].
pub const NULL_MARKER: &str = "\\N";

/// Columns every event table must have.
pub const REQUIRED_COLUMNS: [&str; 3] = ["start", "stop", "name"];

/// Column type that can be stored in an event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint8`
    UInt8,
    /// `uint16`
    UInt16,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// `utf8`
    Utf8,
    /// `bool`
    Bool,
}

impl ColumnType {
    const ALL: [ColumnType; 12] = [
        ColumnType::Int8,
        ColumnType::Int16,
        ColumnType::Int32,
        ColumnType::Int64,
        ColumnType::UInt8,
        ColumnType::UInt16,
        ColumnType::UInt32,
        ColumnType::UInt64,
        ColumnType::Float32,
        ColumnType::Float64,
        ColumnType::Utf8,
        ColumnType::Bool,
    ];

    /// Tag persisted in the sidecar.
    pub fn tag(self) -> &'static str {
        match self {
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::UInt8 => "uint8",
            ColumnType::UInt16 => "uint16",
            ColumnType::UInt32 => "uint32",
            ColumnType::UInt64 => "uint64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Utf8 => "utf8",
            ColumnType::Bool => "bool",
        }
    }

    /// Parse a persisted tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        ColumnType::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// The storable type for an Arrow type, if any.
    pub fn from_arrow(data_type: &ArrowType) -> Option<Self> {
        Some(match data_type {
            ArrowType::Int8 => ColumnType::Int8,
            ArrowType::Int16 => ColumnType::Int16,
            ArrowType::Int32 => ColumnType::Int32,
            ArrowType::Int64 => ColumnType::Int64,
            ArrowType::UInt8 => ColumnType::UInt8,
            ArrowType::UInt16 => ColumnType::UInt16,
            ArrowType::UInt32 => ColumnType::UInt32,
            ArrowType::UInt64 => ColumnType::UInt64,
            ArrowType::Float32 => ColumnType::Float32,
            ArrowType::Float64 => ColumnType::Float64,
            ArrowType::Utf8 => ColumnType::Utf8,
            ArrowType::Boolean => ColumnType::Bool,
            _ => return None,
        })
    }

    /// The Arrow type a column is read back as.
    pub fn to_arrow(self) -> ArrowType {
        match self {
            ColumnType::Int8 => ArrowType::Int8,
            ColumnType::Int16 => ArrowType::Int16,
            ColumnType::Int32 => ArrowType::Int32,
            ColumnType::Int64 => ArrowType::Int64,
            ColumnType::UInt8 => ArrowType::UInt8,
            ColumnType::UInt16 => ArrowType::UInt16,
            ColumnType::UInt32 => ArrowType::UInt32,
            ColumnType::UInt64 => ArrowType::UInt64,
            ColumnType::Float32 => ArrowType::Float32,
            ColumnType::Float64 => ArrowType::Float64,
            ColumnType::Utf8 => ArrowType::Utf8,
            ColumnType::Bool => ArrowType::Boolean,
        }
    }
}

type Columns = Vec<(String, ColumnType)>;

fn columns_of(schema: &Schema) -> DatasetResult<Columns> {
    schema
        .fields()
        .iter()
        .map(|f| {
            let ty = ColumnType::from_arrow(f.data_type()).context(UnsupportedColumnTypeSnafu {
                column: f.name().clone(),
                data_type: f.data_type().to_string(),
            })?;
            Ok((f.name().clone(), ty))
        })
        .collect()
}

fn columns_value(columns: &Columns) -> Value {
    Value::Object(
        columns
            .iter()
            .map(|(name, ty)| (name.clone(), json!({ "type": ty.tag() })))
            .collect(),
    )
}

fn columns_from_attrs(path: &Path, attrs: &Attrs) -> DatasetResult<Option<Columns>> {
    let invalid = |message: String| DatasetError::InvalidAttr {
        path: path.display().to_string(),
        key: COLUMNS_KEY,
        message,
    };

    let obj = match attrs.get(COLUMNS_KEY) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(obj)) => obj,
        Some(other) => return Err(invalid(format!("expected an object, found {other}"))),
    };

    let mut columns = Vec::with_capacity(obj.len());
    for (name, desc) in obj {
        let tag = desc
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("column '{name}' has no type tag")))?;
        let ty = ColumnType::from_tag(tag).context(UnsupportedColumnTypeSnafu {
            column: name.clone(),
            data_type: tag,
        })?;
        columns.push((name.clone(), ty));
    }
    Ok(Some(columns))
}

fn schema_of(columns: &Columns) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, ty)| Field::new(name, ty.to_arrow(), true))
            .collect::<Vec<_>>(),
    ))
}

fn check_required(schema: &Schema) -> DatasetResult<()> {
    for column in REQUIRED_COLUMNS {
        ensure!(
            schema.field_with_name(column).is_ok(),
            MissingColumnSnafu { column }
        );
    }
    Ok(())
}

fn csv_format(path: &Path, null_value: Option<&str>) -> DatasetResult<Format> {
    let format = Format::default().with_header(true);
    let Some(marker) = null_value else {
        return Ok(format);
    };
    let pattern = format!("^{}$", regex::escape(marker));
    let null_regex = Regex::new(&pattern).map_err(|e| DatasetError::InvalidAttr {
        path: path.display().to_string(),
        key: NULL_VALUE_KEY,
        message: e.to_string(),
    })?;
    Ok(format.with_null_regex(null_regex))
}

/// Schema guessed from the CSV itself. `name` is always text, and types the
/// table cannot store fall back to text.
fn infer_columns(path: &Path, file: &mut File, format: &Format) -> DatasetResult<Columns> {
    let arrow_err = |source| DatasetError::Arrow {
        path: path.display().to_string(),
        source,
    };
    let (schema, _) = format.infer_schema(&mut *file, None).map_err(arrow_err)?;
    file.rewind()
        .map_err(|e| storage::io_error(path, e))
        .context(StorageSnafu)?;

    Ok(schema
        .fields()
        .iter()
        .map(|f| {
            let ty = if f.name() == "name" {
                ColumnType::Utf8
            } else {
                ColumnType::from_arrow(f.data_type()).unwrap_or(ColumnType::Utf8)
            };
            (f.name().clone(), ty)
        })
        .collect())
}

fn load_table(
    path: &Path,
    columns: &mut Option<Columns>,
    null_value: Option<&str>,
) -> DatasetResult<RecordBatch> {
    let arrow_err = |source| DatasetError::Arrow {
        path: path.display().to_string(),
        source,
    };

    let format = csv_format(path, null_value)?;
    let mut file = open_payload(path, false)?;
    let cols = match columns {
        Some(cols) => cols.clone(),
        None => {
            let inferred = infer_columns(path, &mut file, &format)?;
            *columns = Some(inferred.clone());
            inferred
        }
    };
    let schema = schema_of(&cols);
    check_required(&schema).map_err(|_| DatasetError::InvalidAttr {
        path: path.display().to_string(),
        key: COLUMNS_KEY,
        message: format!("table must have columns {REQUIRED_COLUMNS:?}"),
    })?;

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(file)
        .map_err(arrow_err)?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(arrow_err)?);
    }
    concat_batches(&schema, &batches).map_err(arrow_err)
}

/// Parameters for [`write_events`].
#[derive(Debug, Clone)]
pub struct EventParams {
    units: String,
    datatype: Option<DataType>,
    extra: MetaMap,
}

impl EventParams {
    /// Parameters with the given units (`"s"` or `"samples"`, typically).
    pub fn new(units: impl Into<String>) -> Self {
        EventParams {
            units: units.into(),
            datatype: None,
            extra: MetaMap::new(),
        }
    }

    /// Explicit datatype; must be in the point-process range.
    pub fn datatype(mut self, datatype: DataType) -> Self {
        self.datatype = Some(datatype);
        self
    }

    /// Additional free-form attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn into_map(self) -> MetaMap {
        let mut map = MetaMap::new();
        map.insert(UNITS_KEY.to_string(), Value::from(self.units));
        for (k, v) in self.extra {
            map.entry(k).or_insert(v);
        }
        if let Some(datatype) = self.datatype {
            normalize::set_datatype(&mut map, datatype);
        }
        map
    }
}

/// An event dataset: sidecar attributes plus a lazily loaded table.
#[derive(Debug)]
pub struct EventData {
    path: PathBuf,
    attrs: Attrs,
    columns: Option<Columns>,
    null_value: Option<String>,
    data: Payload<RecordBatch>,
}

impl EventData {
    pub(crate) fn from_meta(path: &Path, meta: MetaMap) -> DatasetResult<Self> {
        let explicit = normalize::has_explicit_datatype(&meta);
        let mut attrs = Attrs::from_map(meta).context(LookupSnafu)?;
        settle_datatype(&mut attrs, explicit, DatasetKind::Events)?;
        let columns = columns_from_attrs(path, &attrs)?;
        let null_value = match attrs.get(NULL_VALUE_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(marker)) => Some(marker.clone()),
            Some(other) => {
                return InvalidAttrSnafu {
                    path: path.display().to_string(),
                    key: NULL_VALUE_KEY,
                    message: format!("expected a string, found {other}"),
                }
                .fail();
            }
        };

        // Existence only; the table is parsed on first access.
        drop(open_payload(path, false)?);

        Ok(EventData {
            path: path.to_path_buf(),
            attrs,
            columns,
            null_value,
            data: Payload::unopened(),
        })
    }

    /// Column names and types, once known.
    ///
    /// `None` until the table is loaded when the sidecar carries no
    /// `columns` record.
    pub fn columns(&self) -> Option<impl Iterator<Item = (&str, ColumnType)>> {
        self.columns
            .as_ref()
            .map(|cols| cols.iter().map(|(n, t)| (n.as_str(), *t)))
    }

    /// Whether the table has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.data.is_opened()
    }

    /// The event table, loading it on first access.
    pub fn data(&mut self) -> DatasetResult<&RecordBatch> {
        let (path, columns) = (&self.path, &mut self.columns);
        let null_value = self.null_value.as_deref();
        self.data
            .get_or_try_open(|| load_table(path, columns, null_value))
            .map(|batch| &*batch)
    }

    /// Drop the cached table.
    pub fn close(&mut self) {
        self.data.close();
    }
}

impl DatasetLike for EventData {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Events
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

    /// Persist the attributes, re-stamping the known column types.
    fn save_attrs(&mut self) -> DatasetResult<()> {
        ensure!(
            DatasetKind::Events.admits(self.attrs.datatype()),
            DatatypeKindMismatchSnafu {
                datatype: self.attrs.datatype(),
                kind: DatasetKind::Events,
            }
        );
        if let Some(columns) = &self.columns {
            self.attrs.insert_raw(COLUMNS_KEY, columns_value(columns));
        }
        if let Some(marker) = &self.null_value {
            self.attrs.insert_raw(NULL_VALUE_KEY, Value::from(marker.as_str()));
        }
        sidecar::save(&self.path, self.attrs.as_map()).context(SidecarSnafu)
    }
}

/// Write an event table and return it as a loaded dataset.
///
/// The table must have the `start`, `stop`, and `name` columns, and every
/// column must have a storable type. Nothing is written when validation or
/// metadata normalization fails.
pub fn write_events(
    path: impl AsRef<Path>,
    data: &RecordBatch,
    params: EventParams,
) -> DatasetResult<EventData> {
    let path = path.as_ref();
    let arrow_err = |source| DatasetError::Arrow {
        path: path.display().to_string(),
        source,
    };

    let schema = data.schema();
    check_required(&schema)?;
    let columns = columns_of(&schema)?;

    let meta = params.into_map();
    let explicit = normalize::has_explicit_datatype(&meta);
    let mut attrs = Attrs::from_map(meta).context(LookupSnafu)?;
    settle_datatype(&mut attrs, explicit, DatasetKind::Events)?;
    attrs.insert_raw(COLUMNS_KEY, columns_value(&columns));
    attrs.insert_raw(NULL_VALUE_KEY, Value::from(NULL_MARKER));

    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_null(NULL_MARKER.to_string())
        .build(Vec::new());
    writer.write(data).map_err(arrow_err)?;
    let buf = writer.into_inner();

    storage::write_atomic(path, &buf).context(StorageSnafu)?;
    sidecar::save(path, attrs.as_map()).context(SidecarSnafu)?;
    debug!(
        "wrote event dataset {} ({} rows, {} columns)",
        path.display(),
        data.num_rows(),
        columns.len()
    );

    Ok(EventData {
        path: path.to_path_buf(),
        attrs,
        columns: Some(columns),
        null_value: Some(NULL_MARKER.to_string()),
        data: Payload::opened(data.clone()),
    })
}

/// Read an event dataset. The table is parsed on first data access.
pub fn read_events(path: impl AsRef<Path>) -> DatasetResult<EventData> {
    let path = path.as_ref();
    let meta = sidecar::load(path).context(SidecarSnafu)?;
    let dset = EventData::from_meta(path, meta)?;
    debug!("read event dataset {}", path.display());
    Ok(dset)
}
