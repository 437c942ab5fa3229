//! Incremental artifact cache for the extractor output tree.
//!
//! Each compilation unit — a source file, a class, a classpath archive, or a
//! JVM module — maps to one compressed trap artifact in a shared output
//! tree. This crate decides whether previously produced output is still
//! valid, and arbitrates exclusive production of new output across multiple
//! concurrent extractor processes.
//!
//! ## On-disk layout (inventory)
//!
//! Under the trap root:
//! - `<source path>.trap.gz` + `<source path>.set`:
//!   - per-source-file facts and the manifest of trap paths touched while
//!     processing that file
//! - `classes/<binary name as path>.members.trap.gz` (+ `.metadata`, `.dep`):
//!   - per-class member facts, the class-file version record used for
//!     staleness decisions, and the dependency ledger
//! - `jars/<archive path>.trap.gz`, `modules/<name>.trap.gz`:
//!   - per-archive and per-module facts
//! - `.lock/`:
//!   - cross-process lock files, one per trap path
//!
//! Under the source archive root: a UTF-8 copy of each populated source
//! file at its database path.
//!
//! The suffix strings and subdirectory names are a contract shared by every
//! process writing to one output tree; the suffix constants are re-exported
//! at the crate root.

mod config;
mod error;
mod ledger;
mod lock;
mod output;
mod paths;
mod version;

pub use config::{
    LayoutEntry, LayoutFile, OutputConfig, LAYOUT_FILE_ENV_VAR, SOURCE_ARCHIVE_DIR_ENV_VAR,
    TRAP_DIR_ENV_VAR,
};
pub use error::{Result, TrapError};
pub use ledger::{TrapDependencies, TrapSet};
pub use lock::TrapLock;
pub use output::{OutputManager, SourceContext, TrapLocker, TrapSession};
pub use paths::{TrapUnit, DEP_SUFFIX, METADATA_SUFFIX, SET_SUFFIX, TRAP_SUFFIX};
pub use version::{BackingClassFile, ClassSymbol, TrapVersion};
