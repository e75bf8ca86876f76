#![allow(missing_docs)]

use std::io;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use bark_core::{
    DatasetLike, EventParams, SampleArray, SampledParams, read_dataset, read_entry, read_root,
    sidecar_path, write_events, write_sampled,
};
use serde_json::{Value, json};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_bark")
}

fn run_cli(args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin()).args(args).output()
}

fn path_arg(p: &Path) -> &str {
    p.to_str().unwrap_or_default()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_cli_failure(output: &Output) {
    assert_eq!(
        output.status.code(),
        Some(1),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!output.stderr.is_empty());
}

#[test]
fn create_root_and_entries_then_list() -> TestResult {
    let tmp = TempDir::new()?;
    let root = tmp.path().join("finches");

    let out = run_cli(&[
        "create-root",
        path_arg(&root),
        "-a",
        "experimenter=kjbrown",
        "-a",
        "birds=3",
    ])?;
    assert_cli_success(&out);

    let late = root.join("day2");
    let early = root.join("day1");
    assert_cli_success(&run_cli(&[
        "create-entry",
        path_arg(&late),
        "--timestamp",
        "2016-01-28T09:00:00Z",
    ])?);
    assert_cli_success(&run_cli(&[
        "create-entry",
        path_arg(&early),
        "--timestamp",
        "2016-01-27T16:01:03.5+02:00",
        "-a",
        "food=pizza",
    ])?);

    let array = SampleArray::new(&[1i16, 2, 3, 4], 1)?;
    write_sampled(
        early.join("mic.dat"),
        Some(&array),
        SampledParams::new(30000.0, "mV"),
    )?;

    let read = read_root(&root)?;
    assert_eq!(read.attrs()["experimenter"], json!("kjbrown"));
    assert_eq!(read.attrs()["birds"], json!(3));
    let day1 = read.entry("day1").ok_or("day1 missing")?;
    assert_eq!(day1.attrs()["food"], json!("pizza"));
    assert_eq!(day1.attrs()["timestamp"], json!("2016-01-27T14:01:03.500Z"));

    let out = run_cli(&["list", path_arg(&root)])?;
    assert_cli_success(&out);
    let stdout = String::from_utf8(out.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{stdout}");
    assert!(lines[0].starts_with("day1\t2016-01-27T14:01:03.500Z\t"));
    assert_eq!(lines[1], "  mic.dat\tsampled\tUNDEFINED");
    assert!(lines[2].starts_with("day2\t2016-01-28T09:00:00Z\t"));
    Ok(())
}

#[test]
fn create_over_existing_path_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let root = tmp.path().join("root");
    assert_cli_success(&run_cli(&["create-root", path_arg(&root)])?);

    let out = run_cli(&["create-root", path_arg(&root)])?;
    assert_cli_failure(&out);
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));
    Ok(())
}

#[test]
fn bad_timestamp_is_reported() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(&[
        "create-entry",
        path_arg(&tmp.path().join("e")),
        "--timestamp",
        "last tuesday",
    ])?;
    assert_cli_failure(&out);
    assert!(!tmp.path().join("e").exists());
    Ok(())
}

#[test]
fn info_prints_sidecar_json() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("song.csv");
    let batch = RecordBatch::try_from_iter(vec![
        ("start", Arc::new(Float64Array::from(vec![0.1])) as ArrayRef),
        ("stop", Arc::new(Float64Array::from(vec![0.2])) as ArrayRef),
        ("name", Arc::new(StringArray::from(vec!["a"])) as ArrayRef),
    ])?;
    write_events(&path, &batch, EventParams::new("s"))?;

    let out = run_cli(&["info", path_arg(&path)])?;
    assert_cli_success(&out);
    let printed: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(printed["datatype_name"], json!("EVENT"));
    assert_eq!(printed["units"], json!("s"));
    Ok(())
}

#[test]
fn set_attr_normalizes_dataset_metadata() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("mic.dat");
    let array = SampleArray::new(&[0.0f64; 4], 2)?;
    write_sampled(&path, Some(&array), SampledParams::new(1000.0, "V"))?;

    assert_cli_success(&run_cli(&[
        "set-attr",
        path_arg(&path),
        "-a",
        "datatype=ACOUSTIC",
        "-a",
        "units=millivolts",
        "-a",
        "gain=2.5",
    ])?);

    let dset = read_dataset(&path)?;
    assert_eq!(dset.attrs().get("datatype"), Some(&json!(1)));
    assert_eq!(dset.attrs().get("datatype_name"), Some(&json!("ACOUSTIC")));
    assert_eq!(dset.attrs().units(), Some("mV"));
    assert_eq!(dset.attrs().get("gain"), Some(&json!(2.5)));

    let out = run_cli(&["set-attr", path_arg(&path), "-a", "datatype=-1"])?;
    assert_cli_failure(&out);
    assert_eq!(read_dataset(&path)?.attrs().get("datatype"), Some(&json!(1)));
    Ok(())
}

#[test]
fn set_attr_refuses_entry_identity() -> TestResult {
    let tmp = TempDir::new()?;
    let entry = tmp.path().join("entry");
    assert_cli_success(&run_cli(&["create-entry", path_arg(&entry)])?);
    let uuid = read_entry(&entry)?.uuid();

    let out = run_cli(&["set-attr", path_arg(&entry), "-a", "uuid=mine"])?;
    assert_cli_failure(&out);
    assert_eq!(read_entry(&entry)?.uuid(), uuid);

    assert_cli_success(&run_cli(&["set-attr", path_arg(&entry), "-a", "bird=b12"])?);
    assert_eq!(read_entry(&entry)?.attrs()["bird"], json!("b12"));
    Ok(())
}

#[test]
fn clean_orphans_honors_dry_run() -> TestResult {
    let tmp = TempDir::new()?;
    let entry = tmp.path().join("entry");
    assert_cli_success(&run_cli(&["create-entry", path_arg(&entry)])?);
    let payload = entry.join("gone.dat");
    let array = SampleArray::new(&[7u8], 1)?;
    write_sampled(&payload, Some(&array), SampledParams::new(1.0, "V"))?;
    std::fs::remove_file(&payload)?;
    let orphan = sidecar_path(&payload);

    let out = run_cli(&["clean-orphans", path_arg(tmp.path()), "--dry-run"])?;
    assert_cli_success(&out);
    assert!(String::from_utf8(out.stdout)?.contains("would remove"));
    assert!(orphan.exists());

    assert_cli_success(&run_cli(&["clean-orphans", path_arg(tmp.path())])?);
    assert!(!orphan.exists());
    assert!(sidecar_path(&entry).exists());
    Ok(())
}
