//! Entries: timestamped, uniquely identified groups of datasets.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use snafu::prelude::*;
use uuid::Uuid;

use crate::{
    container::{
        create_container_dir,
        error::*,
        require_dir,
        timestamp::{check_encodable, datetime_to_timestamp, timestamp_to_datetime},
    },
    dataset::{Dataset, DatasetLike, read_dataset},
    metadata::{MetaMap, sidecar},
    storage,
};

/// Key holding the entry's unique id.
pub const UUID_KEY: &str = "uuid";
/// Key holding the entry's encoded timestamp.
pub const TIMESTAMP_KEY: &str = "timestamp";

fn is_immutable(key: &str) -> bool {
    matches!(key, UUID_KEY | TIMESTAMP_KEY)
}

/// A directory of datasets with a fixed identity and timestamp.
///
/// Entries compare and sort by timestamp alone: two entries with the same
/// timestamp are equal for ordering purposes even when their ids differ.
#[derive(Debug)]
pub struct Entry {
    path: PathBuf,
    attrs: MetaMap,
    uuid: Uuid,
    timestamp: DateTime<Utc>,
    datasets: BTreeMap<String, Dataset>,
}

impl Entry {
    /// Directory of the entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, used as the entry's name within its root.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Identifier generated at creation.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Timestamp given at creation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All attributes, including `uuid` and `timestamp`.
    pub fn attrs(&self) -> &MetaMap {
        &self.attrs
    }

    /// Set a free-form attribute in memory. `uuid` and `timestamp` are fixed.
    pub fn set_attr(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ContainerResult<Option<Value>> {
        let key = key.into();
        ensure!(!is_immutable(&key), ImmutableAttrSnafu { key });
        Ok(self.attrs.insert(key, value.into()))
    }

    /// Remove a free-form attribute in memory.
    pub fn remove_attr(&mut self, key: &str) -> ContainerResult<Option<Value>> {
        ensure!(!is_immutable(key), ImmutableAttrSnafu { key });
        Ok(self.attrs.shift_remove(key))
    }

    /// Persist the attributes to the entry's sidecar.
    pub fn save_attrs(&self) -> ContainerResult<()> {
        sidecar::save(&self.path, &self.attrs).context(SidecarSnafu)
    }

    /// Datasets keyed by file name.
    pub fn datasets(&self) -> &BTreeMap<String, Dataset> {
        &self.datasets
    }

    /// A dataset by file name.
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    /// A dataset by file name, mutably (to load data or edit attributes).
    pub fn dataset_mut(&mut self, name: &str) -> Option<&mut Dataset> {
        self.datasets.get_mut(name)
    }

    /// Where a dataset called `name` lives inside this entry.
    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Track a dataset written into this entry's directory.
    ///
    /// Returns the dataset previously tracked under the same name.
    pub fn insert_dataset(&mut self, dset: impl Into<Dataset>) -> Option<Dataset> {
        let dset = dset.into();
        let name = dset
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.datasets.insert(name, dset)
    }

    fn from_meta(path: &Path, attrs: MetaMap) -> ContainerResult<Self> {
        let path_str = || path.display().to_string();

        let uuid = attrs
            .get(UUID_KEY)
            .context(MissingAttrSnafu {
                path: path_str(),
                key: UUID_KEY,
            })?
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .context(InvalidAttrSnafu {
                path: path_str(),
                key: UUID_KEY,
                message: "expected a UUID string",
            })?;

        let timestamp = timestamp_to_datetime(attrs.get(TIMESTAMP_KEY).context(
            MissingAttrSnafu {
                path: path_str(),
                key: TIMESTAMP_KEY,
            },
        )?)?;

        Ok(Entry {
            path: path.to_path_buf(),
            attrs,
            uuid,
            timestamp,
            datasets: BTreeMap::new(),
        })
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// Create an entry directory at `path`.
///
/// A fresh v4 `uuid` and the encoded `timestamp` are stored alongside
/// `attrs`. Supplying either of those keys in `attrs` is an error, as is a
/// timestamp outside years 0000 through 9999.
pub fn create_entry(
    path: impl AsRef<Path>,
    timestamp: DateTime<Utc>,
    attrs: MetaMap,
) -> ContainerResult<Entry> {
    let path = path.as_ref();
    if let Some(key) = attrs.keys().find(|k| is_immutable(k)) {
        return ImmutableAttrSnafu { key: key.clone() }.fail();
    }
    check_encodable(timestamp)?;

    let uuid = Uuid::new_v4();
    let mut meta = MetaMap::new();
    meta.insert(UUID_KEY.to_string(), Value::from(uuid.to_string()));
    meta.insert(TIMESTAMP_KEY.to_string(), datetime_to_timestamp(timestamp));
    meta.extend(attrs);

    create_container_dir(path)?;
    sidecar::save(path, &meta).context(SidecarSnafu)?;
    debug!("created entry {} ({uuid})", path.display());

    Ok(Entry {
        path: path.to_path_buf(),
        attrs: meta,
        uuid,
        timestamp,
        datasets: BTreeMap::new(),
    })
}

/// Read an entry and all of its datasets.
///
/// Every file in the directory that has a sidecar is opened with
/// [`read_dataset`]; payloads stay unloaded until accessed. Files without a
/// sidecar and sidecars without a payload are skipped with a warning.
pub fn read_entry(path: impl AsRef<Path>) -> ContainerResult<Entry> {
    let path = path.as_ref();
    require_dir(path)?;
    let meta = sidecar::load(path).context(SidecarSnafu)?;
    let mut entry = Entry::from_meta(path, meta)?;

    for child in storage::list_dir(path).context(StorageSnafu)? {
        if sidecar::is_sidecar(&child) {
            let primary = sidecar::primary_path(&child).unwrap_or_default();
            if !storage::exists(&primary).context(StorageSnafu)? {
                warn!("skipping orphan sidecar {}", child.display());
            }
            continue;
        }
        if !storage::is_file(&child).context(StorageSnafu)? {
            debug!("skipping non-file {} in entry", child.display());
            continue;
        }
        if !storage::exists(&sidecar::sidecar_path(&child)).context(StorageSnafu)? {
            warn!("skipping {} without sidecar", child.display());
            continue;
        }
        let dset = read_dataset(&child).context(DatasetSnafu)?;
        entry.insert_dataset(dset);
    }

    debug!(
        "read entry {} with {} datasets",
        path.display(),
        entry.datasets.len()
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};

    use crate::dataset::{
        EventParams, SampleArray, SampledParams, is_events, is_sampled, write_events,
        write_sampled,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn attrs(v: Value) -> MetaMap {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn create_entry_stamps_identity() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("myentry");
        let dtime = Utc.with_ymd_and_hms(2016, 1, 27, 14, 1, 3).unwrap();

        let entry = create_entry(&path, dtime, attrs(json!({"food": "pizza"})))?;
        assert!(path.is_dir());
        assert_eq!(entry.timestamp(), dtime);
        assert_eq!(entry.attrs()["food"], json!("pizza"));
        assert_eq!(timestamp_to_datetime(&entry.attrs()["timestamp"])?, dtime);
        assert_eq!(entry.attrs()["uuid"], json!(entry.uuid().to_string()));

        let read = read_entry(&path)?;
        assert_eq!(read.uuid(), entry.uuid());
        assert_eq!(read.timestamp(), dtime);
        assert!(read.datasets().is_empty());
        Ok(())
    }

    #[test]
    fn existing_path_is_refused() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("twice");
        let now = Utc::now();
        create_entry(&path, now, MetaMap::new())?;

        let err = create_entry(&path, now, MetaMap::new()).unwrap_err();
        assert!(err.is_already_exists(), "got {err:?}");
        Ok(())
    }

    #[test]
    fn unencodable_timestamp_creates_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("far_future");
        let dt = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();

        let err = create_entry(&path, dt, MetaMap::new()).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidTimestamp { .. }), "got {err:?}");
        assert!(!path.exists());
        assert!(!sidecar::sidecar_path(&path).exists());

        let dt = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        create_entry(&path, dt, MetaMap::new())?;
        assert_eq!(read_entry(&path)?.timestamp(), dt);
        Ok(())
    }

    #[test]
    fn identity_keys_are_immutable() -> TestResult {
        let tmp = TempDir::new()?;
        let err = create_entry(
            tmp.path().join("forged"),
            Utc::now(),
            attrs(json!({"uuid": "not-yours"})),
        )
        .unwrap_err();
        assert!(matches!(err, ContainerError::ImmutableAttr { .. }));
        assert!(!tmp.path().join("forged").exists());

        let mut entry = create_entry(tmp.path().join("e"), Utc::now(), MetaMap::new())?;
        assert!(entry.set_attr("timestamp", 0).is_err());
        assert!(entry.remove_attr("uuid").is_err());
        entry.set_attr("notes", "quiet bird")?;
        entry.save_attrs()?;
        assert_eq!(read_entry(entry.path())?.attrs()["notes"], json!("quiet bird"));
        Ok(())
    }

    #[test]
    fn entries_sort_by_timestamp_only() -> TestResult {
        let tmp = TempDir::new()?;
        let early = Utc.with_ymd_and_hms(2016, 1, 27, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2016, 1, 27, 11, 0, 0).unwrap();

        let e2 = create_entry(tmp.path().join("a_late"), late, MetaMap::new())?;
        let e1 = create_entry(tmp.path().join("b_early"), early, MetaMap::new())?;
        let twin = create_entry(tmp.path().join("c_twin"), early, MetaMap::new())?;

        assert!(e1 < e2);
        assert_eq!(e1, twin);
        assert_ne!(e1.uuid(), twin.uuid());

        let mut entries = vec![e2, e1];
        entries.sort();
        assert_eq!(entries[0].name(), "b_early");
        assert_eq!(entries[1].name(), "a_late");
        Ok(())
    }

    #[test]
    fn read_entry_dispatches_datasets() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("session");
        let mut entry = create_entry(&path, Utc::now(), MetaMap::new())?;

        let array = SampleArray::new(&[1i16, 2, 3, 4], 2)?;
        let mic = write_sampled(
            entry.dataset_path("mic.dat"),
            Some(&array),
            SampledParams::new(22050.0, "V"),
        )?;
        entry.insert_dataset(mic);

        let batch = RecordBatch::try_from_iter(vec![
            ("start", Arc::new(Float64Array::from(vec![0.1])) as ArrayRef),
            ("stop", Arc::new(Float64Array::from(vec![0.2])) as ArrayRef),
            ("name", Arc::new(StringArray::from(vec!["syl"])) as ArrayRef),
        ])?;
        write_events(entry.dataset_path("song.csv"), &batch, EventParams::new("s"))?;

        std::fs::write(path.join("notes.txt"), b"no sidecar")?;
        sidecar::save(&path.join("deleted.dat"), &MetaMap::new())?;

        let mut read = read_entry(&path)?;
        let names: Vec<&str> = read.datasets().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["mic.dat", "song.csv"]);
        assert!(is_sampled(read.dataset("mic.dat").ok_or("mic")?));
        assert!(is_events(read.dataset("song.csv").ok_or("song")?));

        let mic = read
            .dataset_mut("mic.dat")
            .and_then(Dataset::as_sampled_mut)
            .ok_or("mic is not sampled")?;
        assert!(!mic.is_loaded());
        assert_eq!(mic.data()?.to_vec::<i16>()?, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn missing_entry_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let err = read_entry(tmp.path().join("nowhere")).unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }
}
