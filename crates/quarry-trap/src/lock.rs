use crate::error::Result;
use crate::paths::TRAP_SUFFIX;
use fs2::FileExt as _;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

const LOCK_DIR: &str = ".lock";

/// An exclusive lock on one resolved trap path, shared across extractor
/// processes working against the same trap root.
///
/// Lock files live in a `.lock` directory mirroring the trap tree, so
/// source-file, class, archive, and module locks are disjoint by
/// construction (their trap paths never collide). The lock is released when
/// the value is dropped.
///
/// Callers must respect the acquisition order that keeps cooperating
/// processes deadlock-free: at most one source-file lock held at a time,
/// acquired before any class/archive/module lock, and at most one of the
/// latter held at a time. The lock itself does not enforce this.
#[derive(Debug)]
pub struct TrapLock {
    file: File,
    lock_file: PathBuf,
    // The file lock only excludes other processes; threads of this process
    // targeting the same trap path queue on this guard.
    _guard: MutexGuard<'static, ()>,
}

impl TrapLock {
    /// Acquire the lock for `trap_file` under `trap_dir`, creating the
    /// lockfile if needed. Blocks until the lock is available.
    pub fn acquire(trap_dir: &Path, trap_file: &Path) -> Result<Self> {
        let lock_file = lock_file_for(trap_dir, trap_file);

        let mutex = process_lock_for_path(&lock_file);
        let guard = mutex
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = lock_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_file)?;
        file.lock_exclusive()?;

        Ok(Self {
            file,
            lock_file,
            _guard: guard,
        })
    }
}

impl Drop for TrapLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(
                target = "quarry.trap",
                path = %self.lock_file.display(),
                error = %err,
                "error unlocking trap file"
            );
        }
    }
}

fn lock_file_for(trap_dir: &Path, trap_file: &Path) -> PathBuf {
    let relative = trap_file.strip_prefix(trap_dir).unwrap_or(trap_file);
    let mut name = relative.to_string_lossy().replace('\\', "/");
    if let Some(stem) = name.strip_suffix(TRAP_SUFFIX) {
        name = format!("{stem}.lock");
    } else {
        name.push_str(".lock");
    }
    trap_dir.join(LOCK_DIR).join(name.trim_start_matches('/'))
}

// One leaked mutex per lock-file path, living for the rest of the process.
// The set of trap paths a single extraction touches is bounded by its
// compilation units, so the table never grows unreasonably.
fn process_lock_for_path(path: &Path) -> &'static Mutex<()> {
    static LOCK_TABLE: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let mut table = LOCK_TABLE
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *table
        .entry(path.to_path_buf())
        .or_insert_with(|| Box::leak(Box::new(Mutex::new(()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_files_mirror_the_trap_tree() {
        let dir = Path::new("/out/trap");
        let lock = lock_file_for(dir, &dir.join("classes/com/Foo.members.trap.gz"));
        assert_eq!(
            lock,
            Path::new("/out/trap/.lock/classes/com/Foo.members.lock")
        );
    }

    #[test]
    fn distinct_trap_paths_get_distinct_lock_files() {
        let dir = Path::new("/out/trap");
        let a = lock_file_for(dir, &dir.join("work/src/Main.java.trap.gz"));
        let b = lock_file_for(dir, &dir.join("jars/work/lib/a.jar.trap.gz"));
        assert_ne!(a, b);
    }
}
