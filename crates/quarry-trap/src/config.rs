use crate::error::{Result, TrapError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the trap output root.
pub const TRAP_DIR_ENV_VAR: &str = "QUARRY_TRAP_DIR";
/// Environment variable naming the source archive root.
pub const SOURCE_ARCHIVE_DIR_ENV_VAR: &str = "QUARRY_SOURCE_ARCHIVE_DIR";
/// Environment variable naming a layout file used instead of fixed roots.
pub const LAYOUT_FILE_ENV_VAR: &str = "QUARRY_LAYOUT_FILE";

/// The pair of output roots that applies to one source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub trap_dir: PathBuf,
    pub source_archive_dir: PathBuf,
}

/// Where extractor output goes.
///
/// Either a fixed pair of roots shared by every source file, or a layout file
/// mapping subsets of the source tree to per-entry roots (source files matched
/// by no entry are excluded from the population).
#[derive(Clone, Debug)]
pub enum OutputConfig {
    Roots(LayoutEntry),
    Layout(LayoutFile),
}

impl OutputConfig {
    /// Resolve the output configuration from the environment.
    ///
    /// `QUARRY_TRAP_DIR` + `QUARRY_SOURCE_ARCHIVE_DIR` take precedence; when
    /// neither is set, `QUARRY_LAYOUT_FILE` must name a layout file. Absence
    /// of both is a fatal configuration error.
    pub fn from_env() -> Result<Self> {
        if let Some(trap_dir) = non_empty_env(TRAP_DIR_ENV_VAR) {
            let Some(source_archive_dir) = non_empty_env(SOURCE_ARCHIVE_DIR_ENV_VAR) else {
                return Err(TrapError::MissingSourceArchiveDir {
                    trap_dir_var: TRAP_DIR_ENV_VAR,
                    trap_dir: trap_dir.to_string_lossy().into_owned(),
                    source_archive_var: SOURCE_ARCHIVE_DIR_ENV_VAR,
                });
            };
            return Ok(Self::with_roots(trap_dir, source_archive_dir));
        }

        match non_empty_env(LAYOUT_FILE_ENV_VAR) {
            Some(path) => Ok(Self::Layout(LayoutFile::load(path)?)),
            None => Err(TrapError::MissingOutputConfig {
                trap_dir_var: TRAP_DIR_ENV_VAR,
                layout_var: LAYOUT_FILE_ENV_VAR,
            }),
        }
    }

    pub fn with_roots(
        trap_dir: impl Into<PathBuf>,
        source_archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::Roots(LayoutEntry {
            trap_dir: trap_dir.into(),
            source_archive_dir: source_archive_dir.into(),
        })
    }

    /// The output roots for `source_file`, or `None` if the file is excluded
    /// from the population.
    pub fn entry_for(&self, source_file: &Path) -> Option<LayoutEntry> {
        match self {
            Self::Roots(entry) => Some(entry.clone()),
            Self::Layout(layout) => layout.entry_for(source_file),
        }
    }
}

/// A parsed layout file: an ordered list of `[[entry]]` tables, each with its
/// own output roots and the source-tree prefixes it covers.
///
/// ```toml
/// [[entry]]
/// trap-dir = "/out/trap"
/// source-archive-dir = "/out/src"
/// include = ["/work/project/src"]
/// ```
///
/// The first entry whose `include` list contains a prefix of the source file
/// wins. An empty `include` list matches every source file.
#[derive(Clone, Debug)]
pub struct LayoutFile {
    entries: Vec<LayoutFileEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct LayoutFileEntry {
    trap_dir: PathBuf,
    source_archive_dir: PathBuf,
    #[serde(default)]
    include: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutDoc {
    #[serde(default)]
    entry: Vec<LayoutFileEntry>,
}

impl LayoutFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let doc: LayoutDoc =
            toml::from_str(&text).map_err(|err| TrapError::InvalidLayoutFile {
                path: path.clone(),
                message: err.message().to_string(),
            })?;
        Ok(Self {
            entries: doc.entry,
        })
    }

    pub fn entry_for(&self, source_file: &Path) -> Option<LayoutEntry> {
        self.entries
            .iter()
            .find(|entry| {
                entry.include.is_empty()
                    || entry
                        .include
                        .iter()
                        .any(|prefix| source_file.starts_with(prefix))
            })
            .map(|entry| LayoutEntry {
                trap_dir: entry.trap_dir.clone(),
                source_archive_dir: entry.source_archive_dir.clone(),
            })
    }
}

fn non_empty_env(var: &str) -> Option<PathBuf> {
    let value = std::env::var_os(var)?;
    if value.is_empty() {
        return None;
    }
    Some(PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_from(text: &str) -> LayoutFile {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("layout.toml");
        std::fs::write(&path, text).unwrap();
        LayoutFile::load(path).unwrap()
    }

    #[test]
    fn first_matching_entry_wins() {
        let layout = layout_from(
            r#"
[[entry]]
trap-dir = "/out/a/trap"
source-archive-dir = "/out/a/src"
include = ["/work/a"]

[[entry]]
trap-dir = "/out/b/trap"
source-archive-dir = "/out/b/src"
include = ["/work"]
"#,
        );

        let a = layout.entry_for(Path::new("/work/a/Main.java")).unwrap();
        assert_eq!(a.trap_dir, Path::new("/out/a/trap"));

        let b = layout.entry_for(Path::new("/work/b/Other.java")).unwrap();
        assert_eq!(b.trap_dir, Path::new("/out/b/trap"));
    }

    #[test]
    fn unmatched_source_file_is_excluded() {
        let layout = layout_from(
            r#"
[[entry]]
trap-dir = "/out/trap"
source-archive-dir = "/out/src"
include = ["/work/project"]
"#,
        );

        assert_eq!(layout.entry_for(Path::new("/elsewhere/Main.java")), None);
    }

    #[test]
    fn empty_include_matches_everything() {
        let layout = layout_from(
            r#"
[[entry]]
trap-dir = "/out/trap"
source-archive-dir = "/out/src"
"#,
        );

        assert!(layout.entry_for(Path::new("/anything/A.java")).is_some());
    }

    #[test]
    fn malformed_layout_file_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("layout.toml");
        std::fs::write(&path, "[[entry]]\ntrap-dir = 3\n").unwrap();
        assert!(matches!(
            LayoutFile::load(path),
            Err(TrapError::InvalidLayoutFile { .. })
        ));
    }
}
