use bark_core::{
    ContainerError, DatasetError, SidecarError, metadata::attrs::AttrsError,
    storage::StorageError,
};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid attribute '{arg}': expected key=value"))]
    InvalidAttrArg { arg: String },

    #[snafu(display("Invalid --timestamp '{value}': {source}"))]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[snafu(display("Nothing to update: pass at least one -a key=value"))]
    NoAttrs,

    #[snafu(display("{source}"))]
    Container {
        #[snafu(source(from(ContainerError, Box::new)))]
        source: Box<ContainerError>,
    },

    #[snafu(display("{source}"))]
    Dataset {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Cannot set attribute on {path}: {source}"))]
    Attr { path: String, source: AttrsError },

    #[snafu(display("{source}"))]
    Sidecar { source: SidecarError },

    #[snafu(display("Failed to remove {path}: {source}"))]
    Remove { path: String, source: StorageError },

    #[snafu(display("Failed to scan {path}: {source}"))]
    Scan { path: String, source: StorageError },

    #[snafu(display("Failed to render metadata: {source}"))]
    Render { source: serde_json::Error },
}
