use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TrapError>;

/// Errors produced by trap output management.
///
/// Only configuration and contract violations are fatal; everything else in
/// this crate degrades to a logged warning so a long extraction run is never
/// aborted by a single bad class file or a best-effort metadata write.
#[derive(Debug, thiserror::Error)]
pub enum TrapError {
    #[error("{trap_dir_var} was set to '{trap_dir}', but {source_archive_var} was not set")]
    MissingSourceArchiveDir {
        trap_dir_var: &'static str,
        trap_dir: String,
        source_archive_var: &'static str,
    },

    #[error("neither {trap_dir_var} nor {layout_var} was set")]
    MissingOutputConfig {
        trap_dir_var: &'static str,
        layout_var: &'static str,
    },

    #[error("failed to parse layout file {path}: {message}")]
    InvalidLayoutFile { path: PathBuf, message: String },

    /// Caller bug: trap output only supports compressed trap files.
    #[error("unsupported trap file path (expected a `.trap.gz` file): {path}")]
    UnsupportedTrapPath { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
