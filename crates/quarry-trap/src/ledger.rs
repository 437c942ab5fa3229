use std::io::Write as _;
use std::path::Path;

/// Ordered dependency ledger persisted next to a trap file.
///
/// The `.dep` file names the artifact's own trap path on its first line,
/// then one dependency trap path per line in discovery order. Duplicates are
/// preserved; downstream tooling walks these records to prune and rebuild
/// transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapDependencies {
    trap_path: String,
    deps: Vec<String>,
}

impl TrapDependencies {
    pub fn new(trap_path: impl Into<String>) -> Self {
        Self {
            trap_path: trap_path.into(),
            deps: Vec::new(),
        }
    }

    pub fn trap_path(&self) -> &str {
        &self.trap_path
    }

    pub fn add(&mut self, dep: impl Into<String>) {
        self.deps.push(dep.into());
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn save(&self, file: &Path) -> std::io::Result<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(file)?;
        writeln!(out, "{}", self.trap_path)?;
        for dep in &self.deps {
            writeln!(out, "{dep}")?;
        }
        Ok(())
    }

    pub fn load(file: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(file)?;
        let mut lines = text.lines();
        let trap_path = lines.next().unwrap_or_default().to_string();
        let deps = lines.map(str::to_string).collect();
        Ok(Self { trap_path, deps })
    }
}

/// Manifest of the trap paths touched while processing one source file.
///
/// Persisted as a `.set` file so a companion reconciler can find outputs
/// that belong to the source file but were not touched in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapSet {
    source: String,
    traps: Vec<String>,
}

impl TrapSet {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            traps: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn add_trap(&mut self, trap_path: impl Into<String>) {
        self.traps.push(trap_path.into());
    }

    pub fn traps(&self) -> &[String] {
        &self.traps
    }

    pub fn save(&self, file: &Path) -> std::io::Result<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(file)?;
        writeln!(out, "{}", self.source)?;
        for trap in &self.traps {
            writeln!(out, "{trap}")?;
        }
        Ok(())
    }

    pub fn load(file: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(file)?;
        let mut lines = text.lines();
        let source = lines.next().unwrap_or_default().to_string();
        let traps = lines.map(str::to_string).collect();
        Ok(Self { source, traps })
    }
}
