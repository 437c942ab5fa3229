use std::path::{Path, PathBuf};

/// Suffix of every compressed trap artifact. The exact suffix strings below
/// are a cross-process contract: cooperating extractor processes and the
/// downstream reconciler all derive sibling paths from them.
pub const TRAP_SUFFIX: &str = ".trap.gz";
/// Sibling record holding the class-file version of an artifact.
pub const METADATA_SUFFIX: &str = ".metadata";
/// Sibling record listing the trap paths an artifact depends on.
pub const DEP_SUFFIX: &str = ".dep";
/// Per-source-file manifest of the trap paths touched while processing it.
pub const SET_SUFFIX: &str = ".set";

pub(crate) const CLASSES_DIR: &str = "classes";
pub(crate) const JARS_DIR: &str = "jars";
pub(crate) const MODULES_DIR: &str = "modules";
pub(crate) const MEMBERS_SUFFIX: &str = ".members.trap.gz";

/// One logical unit whose output artifact is cached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrapUnit {
    /// A source file being extracted.
    SourceFile(PathBuf),
    /// A class identified by its fully qualified binary name.
    Class { binary_name: String },
    /// A `.jar` archive on the classpath.
    Archive(PathBuf),
    /// A named JVM module.
    Module(String),
}

/// Render an absolute file path as a database string: forward slashes, a
/// Windows drive letter folded into the leading path segment, and a leading
/// separator so it can be appended under any output root.
pub(crate) fn database_path(file: &Path) -> String {
    let mut s = file.to_string_lossy().replace('\\', "/");
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        s = format!("/{}_{}", &s[..1], &s[2..]);
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    s
}

/// Join a trap-root-relative path (as produced below) under `root`.
pub(crate) fn under_root(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}

pub(crate) fn source_relative_path(file: &Path) -> String {
    format!(
        "{}{TRAP_SUFFIX}",
        database_path(file).trim_start_matches('/')
    )
}

/// Member trap path for a binary class name: every namespace separator
/// becomes a directory separator, under the fixed `classes/` subtree.
pub(crate) fn member_relative_path(binary_name: &str) -> String {
    format!("{CLASSES_DIR}/{}{MEMBERS_SUFFIX}", binary_name.replace('.', "/"))
}

/// Archive trap path, or `None` for paths that are not `.jar` files.
pub(crate) fn archive_relative_path(file: &Path) -> Option<String> {
    if file.extension().and_then(|ext| ext.to_str()) != Some("jar") {
        return None;
    }
    Some(format!(
        "{JARS_DIR}/{}{TRAP_SUFFIX}",
        database_path(file).trim_start_matches('/')
    ))
}

pub(crate) fn module_relative_path(name: &str) -> String {
    format!("{MODULES_DIR}/{name}{TRAP_SUFFIX}")
}

/// Replace the `.trap.gz` suffix of a trap path with a sibling suffix.
///
/// Panics in debug builds if `trap_path` does not carry the trap suffix; the
/// artifact writer guards that contract before any session is opened.
pub(crate) fn sibling_path(trap_path: &str, suffix: &str) -> String {
    debug_assert!(trap_path.ends_with(TRAP_SUFFIX));
    match trap_path.strip_suffix(TRAP_SUFFIX) {
        Some(stem) => format!("{stem}{suffix}"),
        None => format!("{trap_path}{suffix}"),
    }
}

/// The `.set` manifest path for a source file, relative to the trap root.
pub(crate) fn trap_set_relative_path(source_file: &Path) -> String {
    format!(
        "{}{SET_SUFFIX}",
        database_path(source_file).trim_start_matches('/')
    )
}
