use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TfcheckError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cases '{first}' and '{second}' share directory {}", .dir.display())]
    SharedDirectory {
        first: String,
        second: String,
        dir: PathBuf,
    },

    #[error("case '{case}': directory {} not found", .dir.display())]
    MissingDirectory { case: String, dir: PathBuf },

    #[error("invalid suite file {}: {source}", .path.display())]
    SuiteFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("case task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
