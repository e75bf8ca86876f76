//! Command-line tool for bark roots, entries and datasets.

mod attrs;
mod error;

use std::path::{Path, PathBuf};

use bark_core::{
    DatasetLike, container::entry::UUID_KEY, create_entry, create_root, find_orphan_sidecars,
    metadata::sidecar, read_dataset, read_entry, read_root, storage,
};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use log::debug;
use snafu::{ResultExt, ensure};
use tracing_subscriber::EnvFilter;

use crate::{
    attrs::parse_attrs,
    error::{
        AttrSnafu, CliResult, ContainerSnafu, DatasetSnafu, InvalidTimestampSnafu, NoAttrsSnafu,
        RemoveSnafu, RenderSnafu, ScanSnafu, SidecarSnafu,
    },
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an experiment root directory
    CreateRoot {
        path: PathBuf,

        /// Repeatable key=value attribute
        #[arg(short = 'a', long = "attr")]
        attrs: Vec<String>,
    },

    /// Create a timestamped entry directory
    CreateEntry {
        path: PathBuf,

        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        timestamp: Option<String>,

        /// Repeatable key=value attribute
        #[arg(short = 'a', long = "attr")]
        attrs: Vec<String>,
    },

    /// Print the metadata of a root, entry or dataset
    Info { path: PathBuf },

    /// List the entries of a root in chronological order
    List { root: PathBuf },

    /// Update attributes of a root, entry or dataset
    SetAttr {
        path: PathBuf,

        /// Repeatable key=value attribute
        #[arg(short = 'a', long = "attr", required = true)]
        attrs: Vec<String>,
    },

    /// Remove sidecar files whose payload is gone
    CleanOrphans {
        dir: PathBuf,

        /// Only report what would be removed
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "bark", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn parse_timestamp(value: Option<String>) -> CliResult<DateTime<Utc>> {
    match value {
        None => Ok(Utc::now()),
        Some(value) => DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .context(InvalidTimestampSnafu { value }),
    }
}

fn cmd_create_root(path: &Path, attrs: &[String]) -> CliResult<()> {
    let attrs = parse_attrs(attrs)?;
    create_root(path, attrs).context(ContainerSnafu)?;
    println!("Created root at {}", path.display());
    Ok(())
}

fn cmd_create_entry(path: &Path, timestamp: Option<String>, attrs: &[String]) -> CliResult<()> {
    let timestamp = parse_timestamp(timestamp)?;
    let attrs = parse_attrs(attrs)?;
    let entry = create_entry(path, timestamp, attrs).context(ContainerSnafu)?;
    println!("Created entry {} ({})", path.display(), entry.uuid());
    Ok(())
}

fn cmd_info(path: &Path) -> CliResult<()> {
    let meta = sidecar::load(path).context(SidecarSnafu)?;
    let text = serde_json::to_string_pretty(&meta).context(RenderSnafu)?;
    println!("{text}");
    Ok(())
}

fn cmd_list(path: &Path) -> CliResult<()> {
    let root = read_root(path).context(ContainerSnafu)?;
    for entry in root.entries() {
        println!(
            "{}\t{}\t{}",
            entry.name(),
            entry.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, true),
            entry.uuid()
        );
        for (name, dset) in entry.datasets() {
            println!("  {name}\t{}\t{}", dset.kind(), dset.attrs().datatype());
        }
    }
    Ok(())
}

fn cmd_set_attr(path: &Path, attrs: &[String]) -> CliResult<()> {
    let updates = parse_attrs(attrs)?;
    ensure!(!updates.is_empty(), NoAttrsSnafu);

    let is_dir = storage::is_dir(path).context(ScanSnafu {
        path: path.display().to_string(),
    })?;

    if !is_dir {
        let mut dset = read_dataset(path).context(DatasetSnafu)?;
        for (key, value) in updates {
            dset.attrs_mut().insert(key, value).context(AttrSnafu {
                path: path.display().to_string(),
            })?;
        }
        dset.save_attrs().context(DatasetSnafu)?;
    } else if sidecar::load(path).context(SidecarSnafu)?.contains_key(UUID_KEY) {
        let mut entry = read_entry(path).context(ContainerSnafu)?;
        for (key, value) in updates {
            entry.set_attr(key, value).context(ContainerSnafu)?;
        }
        entry.save_attrs().context(ContainerSnafu)?;
    } else {
        let mut root = read_root(path).context(ContainerSnafu)?;
        root.attrs_mut().extend(updates);
        root.save_attrs().context(ContainerSnafu)?;
    }

    println!("Updated {}", path.display());
    Ok(())
}

fn collect_orphans(dir: &Path, out: &mut Vec<PathBuf>) -> CliResult<()> {
    out.extend(find_orphan_sidecars(dir).context(SidecarSnafu)?);
    let scan = || ScanSnafu {
        path: dir.display().to_string(),
    };
    for child in storage::list_dir(dir).context(scan())? {
        if storage::is_dir(&child).context(scan())? {
            collect_orphans(&child, out)?;
        }
    }
    Ok(())
}

fn cmd_clean_orphans(dir: &Path, dry_run: bool) -> CliResult<()> {
    let mut orphans = Vec::new();
    collect_orphans(dir, &mut orphans)?;

    for orphan in &orphans {
        if dry_run {
            println!("would remove {}", orphan.display());
        } else {
            storage::remove_file(orphan).context(RemoveSnafu {
                path: orphan.display().to_string(),
            })?;
            debug!("removed orphan sidecar {}", orphan.display());
            println!("removed {}", orphan.display());
        }
    }
    println!("{} orphan sidecar(s)", orphans.len());
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::CreateRoot { path, attrs } => cmd_create_root(&path, &attrs),
        Command::CreateEntry {
            path,
            timestamp,
            attrs,
        } => cmd_create_entry(&path, timestamp, &attrs),
        Command::Info { path } => cmd_info(&path),
        Command::List { root } => cmd_list(&root),
        Command::SetAttr { path, attrs } => cmd_set_attr(&path, &attrs),
        Command::CleanOrphans { dir, dry_run } => cmd_clean_orphans(&dir, dry_run),
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
