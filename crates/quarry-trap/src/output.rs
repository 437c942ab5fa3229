use crate::config::{LayoutEntry, LayoutFile, OutputConfig};
use crate::error::{Result, TrapError};
use crate::ledger::{TrapDependencies, TrapSet};
use crate::lock::TrapLock;
use crate::paths::{
    archive_relative_path, database_path, member_relative_path, module_relative_path,
    sibling_path, source_relative_path, trap_set_relative_path, under_root, TrapUnit, DEP_SUFFIX,
    METADATA_SUFFIX, TRAP_SUFFIX,
};
use crate::version::{read_trap_metadata, write_trap_metadata, ClassSymbol, TrapVersion};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Entry point of the output layer: resolves where extractor output goes and
/// hands out per-source-file contexts.
///
/// The member-path lookup cache lives here so class trap paths are computed
/// once per binary name for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct OutputManager {
    config: Arc<OutputConfig>,
    member_paths: Arc<Mutex<HashMap<String, String>>>,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config: Arc::new(config),
            member_paths: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve output roots from the environment; see [`OutputConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OutputConfig::from_env()?))
    }

    pub fn with_roots(
        trap_dir: impl Into<PathBuf>,
        source_archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::new(OutputConfig::with_roots(trap_dir, source_archive_dir))
    }

    /// Resolve output roots through a layout file; see [`LayoutFile`].
    pub fn with_layout_file(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(OutputConfig::Layout(LayoutFile::load(path)?)))
    }

    /// Begin processing `source_file`.
    ///
    /// Returns the context that owns all per-file session state: the resolved
    /// output roots (possibly excluded), the trap-set manifest, and the lock
    /// and session handles derived from it. Starting a new context is the
    /// reset point between source files; contexts must not be shared across
    /// threads processing different files.
    pub fn start_source_file(&self, source_file: impl Into<PathBuf>) -> SourceContext {
        let source_file = source_file.into();
        let entry = self.config.entry_for(&source_file);
        let traps_created = Mutex::new(TrapSet::new(database_path(&source_file)));
        SourceContext {
            source_file,
            entry,
            member_paths: Arc::clone(&self.member_paths),
            traps_created,
        }
    }
}

/// All output state for one source file currently being processed.
#[derive(Debug)]
pub struct SourceContext {
    source_file: PathBuf,
    entry: Option<LayoutEntry>,
    member_paths: Arc<Mutex<HashMap<String, String>>>,
    traps_created: Mutex<TrapSet>,
}

impl SourceContext {
    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// Whether this source file is part of the output population at all.
    pub fn is_included(&self) -> bool {
        self.entry.is_some()
    }

    pub fn trap_dir(&self) -> Option<&Path> {
        self.entry.as_ref().map(|entry| entry.trap_dir.as_path())
    }

    /// Resolve a unit to its absolute trap path, or `None` if the unit is
    /// excluded (source file outside the population, or a non-`.jar`
    /// archive). Deterministic for the lifetime of the process.
    pub fn resolve(&self, unit: &TrapUnit) -> Option<PathBuf> {
        let entry = self.entry.as_ref()?;
        let relative = self.relative_path_for(unit)?;
        Some(under_root(&entry.trap_dir, &relative))
    }

    fn relative_path_for(&self, unit: &TrapUnit) -> Option<String> {
        match unit {
            TrapUnit::SourceFile(path) => Some(source_relative_path(path)),
            TrapUnit::Class { binary_name } => Some(self.member_path(binary_name)),
            TrapUnit::Archive(path) => archive_relative_path(path),
            TrapUnit::Module(name) => Some(module_relative_path(name)),
        }
    }

    fn member_path(&self, binary_name: &str) -> String {
        let mut cache = self
            .member_paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(binary_name.to_string())
            .or_insert_with(|| member_relative_path(binary_name))
            .clone()
    }

    /// Lock the trap file for this source file itself.
    ///
    /// To keep cooperating extractor processes deadlock-free, at most one
    /// source-file locker may be open at a time, and it must be acquired
    /// before (and stay held across) any class, archive, or module locker.
    pub fn lock_current_source_file(&self) -> Result<TrapLocker<'_>> {
        let relative = source_relative_path(&self.source_file);
        self.lock_unit(Some(relative), TrapVersion::source(), None)
    }

    /// Lock the members trap file for a class.
    ///
    /// At most one class/archive/module locker may be open at a time,
    /// nested inside the source-file locker (if any).
    pub fn lock_class_file(&self, sym: &dyn ClassSymbol) -> Result<TrapLocker<'_>> {
        let version = TrapVersion::of_symbol(sym);
        let relative = self.member_path(sym.binary_name());
        self.lock_unit(Some(relative), version, Some(sym.binary_name().to_string()))
    }

    /// Lock the trap file for a classpath archive. Non-`.jar` paths resolve
    /// to an excluded locker. Same ordering discipline as class lockers.
    pub fn lock_archive_file(&self, archive: &Path) -> Result<TrapLocker<'_>> {
        let relative = archive_relative_path(archive);
        self.lock_unit(relative, TrapVersion::source(), None)
    }

    /// Lock the trap file for a named module. Same ordering discipline as
    /// class lockers.
    pub fn lock_module(&self, name: &str) -> Result<TrapLocker<'_>> {
        let relative = Some(module_relative_path(name));
        self.lock_unit(relative, TrapVersion::source(), None)
    }

    fn lock_unit(
        &self,
        relative: Option<String>,
        version: TrapVersion,
        class_name: Option<String>,
    ) -> Result<TrapLocker<'_>> {
        let target = match (self.entry.as_ref(), relative) {
            (Some(entry), Some(relative)) => {
                let trap_file = under_root(&entry.trap_dir, &relative);
                let lock = TrapLock::acquire(&entry.trap_dir, &trap_file)?;
                Some(LockedTrap {
                    trap_dir: entry.trap_dir.clone(),
                    relative,
                    trap_file,
                    version,
                    class_name,
                    _lock: lock,
                })
            }
            _ => None,
        };
        Ok(TrapLocker { ctx: self, target })
    }

    /// Copy the current source file's text, UTF-8 encoded, into the source
    /// archive. No-op when the file is excluded from the population.
    pub fn write_current_source_to_archive(&self, contents: &str) -> Result<()> {
        self.write_to_archive(&self.source_file, contents)
    }

    /// Copy an arbitrary file's text into the source archive at its own
    /// resolved path. No-op when the current source file is excluded.
    pub fn write_file_to_archive(&self, file: &Path) -> Result<()> {
        if self.entry.is_none() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(file)?;
        self.write_to_archive(file, &contents)
    }

    fn write_to_archive(&self, file: &Path, contents: &str) -> Result<()> {
        let Some(entry) = self.entry.as_ref() else {
            return Ok(());
        };
        let target = under_root(&entry.source_archive_dir, &database_path(file));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, contents.as_bytes())?;
        Ok(())
    }

    /// Persist the manifest of trap paths produced under this context so the
    /// companion reconciler can spot stale outputs. No-op when excluded.
    pub fn write_trap_set(&self) -> Result<()> {
        let Some(entry) = self.entry.as_ref() else {
            return Ok(());
        };
        let set_file = under_root(&entry.trap_dir, &trap_set_relative_path(&self.source_file));
        self.traps_created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .save(&set_file)?;
        Ok(())
    }

    pub fn traps_created(&self) -> TrapSet {
        self.traps_created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

struct LockedTrap {
    trap_dir: PathBuf,
    relative: String,
    trap_file: PathBuf,
    version: TrapVersion,
    class_name: Option<String>,
    _lock: TrapLock,
}

impl std::fmt::Debug for LockedTrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedTrap")
            .field("trap_file", &self.trap_file)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Scoped lock on one unit's trap file; the lock is held for the lifetime of
/// this value and of any session opened from it. Lockers borrow the context
/// shared, so a class locker can be taken while the source-file locker is
/// still held.
#[derive(Debug)]
pub struct TrapLocker<'c> {
    ctx: &'c SourceContext,
    target: Option<LockedTrap>,
}

impl TrapLocker<'_> {
    /// The locked trap path, or `None` for an excluded unit.
    pub fn trap_file(&self) -> Option<&Path> {
        self.target.as_ref().map(|target| target.trap_file.as_path())
    }

    /// Decide whether to produce output for the locked unit, and open the
    /// writing session if so.
    ///
    /// Returns `Ok(None)` when the unit is excluded, when a fresh artifact
    /// already exists (including one created concurrently by another
    /// process), or when the fresh version token is invalid — in the latter
    /// case the existing artifact is kept and a warning is emitted.
    pub fn open(&mut self) -> Result<Option<TrapSession<'_>>> {
        let Some(target) = self.target.as_ref() else {
            return Ok(None);
        };
        let ctx = self.ctx;

        if !target.relative.ends_with(TRAP_SUFFIX) {
            return Err(TrapError::UnsupportedTrapPath {
                path: target.trap_file.clone(),
            });
        }

        let fresh = target.version;
        if target.trap_file.exists() {
            let Some(class_name) = target.class_name.as_deref() else {
                // Source, archive, and module traps are write-once: an
                // existing file means this unit was already handled, here or
                // in a concurrent process.
                return Ok(None);
            };

            let metadata_file = under_root(
                &target.trap_dir,
                &sibling_path(&target.relative, METADATA_SUFFIX),
            );
            let stored = read_trap_metadata(&metadata_file);
            if !fresh.is_valid() {
                tracing::warn!(
                    target = "quarry.trap",
                    class = class_name,
                    stored = %stored,
                    fresh = %fresh,
                    path = %target.trap_file.display(),
                    "not rewriting trap file"
                );
                return Ok(None);
            }
            if fresh.newer_than(&stored) {
                tracing::trace!(
                    target = "quarry.trap",
                    class = class_name,
                    stored = %stored,
                    fresh = %fresh,
                    path = %target.trap_file.display(),
                    "rewriting trap file"
                );
                remove_file_best_effort(&target.trap_file);
                remove_file_best_effort(&metadata_file);
                remove_file_best_effort(&under_root(
                    &target.trap_dir,
                    &sibling_path(&target.relative, DEP_SUFFIX),
                ));
            } else {
                return Ok(None);
            }
        }

        if let Some(parent) = target.trap_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        ctx.traps_created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add_trap(target.relative.clone());

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target.trap_file)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                // Another process won the creation race; the unit is handled.
                tracing::trace!(
                    target = "quarry.trap",
                    path = %target.trap_file.display(),
                    "trap file appeared concurrently; skipping"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Some(TrapSession {
            ctx,
            encoder: Some(GzEncoder::new(file, Compression::default())),
            deps: TrapDependencies::new(target.relative.clone()),
            trap_dir: target.trap_dir.clone(),
            relative: target.relative.clone(),
            trap_file: target.trap_file.clone(),
            version: fresh,
            failed: false,
        }))
    }
}

/// One unit's artifact production, from open to close.
///
/// Facts are streamed through the [`io::Write`] impl (gzip-compressed on the
/// way down). Dependencies registered along the way are persisted as the
/// `.dep` ledger at close, together with the `.metadata` version record.
pub struct TrapSession<'l> {
    ctx: &'l SourceContext,
    encoder: Option<GzEncoder<File>>,
    deps: TrapDependencies,
    trap_dir: PathBuf,
    relative: String,
    trap_file: PathBuf,
    version: TrapVersion,
    failed: bool,
}

impl TrapSession<'_> {
    pub fn trap_file(&self) -> &Path {
        &self.trap_file
    }

    /// Record that this artifact depends on another unit's artifact.
    /// Discovery order and duplicates are preserved in the ledger.
    pub fn add_dependency(&mut self, unit: &TrapUnit) {
        match self.ctx.relative_path_for(unit) {
            Some(relative) => self.deps.add(relative),
            None => {
                tracing::trace!(
                    target = "quarry.trap",
                    ?unit,
                    "dependency on excluded unit not recorded"
                );
            }
        }
    }

    /// Mark the session failed: `close` will discard the partial artifact
    /// and commit neither metadata nor ledger.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn close(mut self) -> Result<()> {
        let encoder = self.encoder.take();
        if self.failed {
            drop(encoder);
            remove_file_best_effort(&self.trap_file);
            return Ok(());
        }
        let Some(encoder) = encoder else {
            return Ok(());
        };

        match encoder.finish() {
            Ok(file) => drop(file),
            Err(err) => {
                remove_file_best_effort(&self.trap_file);
                return Err(err.into());
            }
        }

        let dep_file = under_root(&self.trap_dir, &sibling_path(&self.relative, DEP_SUFFIX));
        if let Err(err) = self.deps.save(&dep_file) {
            tracing::warn!(
                target = "quarry.trap",
                path = %dep_file.display(),
                error = %err,
                "could not save trap dependencies file"
            );
        }

        // Recorded so a later run can tell whether it re-encountered a newer
        // version of the same class.
        let metadata_file = under_root(
            &self.trap_dir,
            &sibling_path(&self.relative, METADATA_SUFFIX),
        );
        if let Err(err) = write_trap_metadata(&metadata_file, &self.version) {
            tracing::warn!(
                target = "quarry.trap",
                path = %metadata_file.display(),
                error = %err,
                "could not save trap metadata file"
            );
        }

        Ok(())
    }
}

impl io::Write for TrapSession<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.write(buf),
            None => Err(io::Error::other("trap session already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TrapSession<'_> {
    fn drop(&mut self) {
        if self.encoder.take().is_some() {
            tracing::warn!(
                target = "quarry.trap",
                path = %self.trap_file.display(),
                "trap session dropped without close; discarding partial output"
            );
            remove_file_best_effort(&self.trap_file);
        }
    }
}

fn remove_file_best_effort(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(
                target = "quarry.trap",
                path = %path.display(),
                error = %err,
                "failed to remove trap output file"
            );
        }
    }
}
