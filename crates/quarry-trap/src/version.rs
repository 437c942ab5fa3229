use quarry_classfile::ClassHeader;
use std::io::Write as _;
use std::path::Path;

const MAJOR_VERSION_KEY: &str = "majorVersion";
const MINOR_VERSION_KEY: &str = "minorVersion";
const LAST_MODIFIED_KEY: &str = "lastModified";

/// The raw class-file bytes backing a symbol, when the class was loaded from
/// a prebuilt dependency rather than compiled from source in this run.
#[derive(Debug, Clone)]
pub struct BackingClassFile {
    pub bytes: Vec<u8>,
    pub last_modified_millis: u64,
}

/// The compiler-side view of a class, as consumed by the output layer.
///
/// Implemented by the extraction driver over whatever symbol representation
/// its compiler front-end provides.
pub trait ClassSymbol {
    /// Fully qualified binary name, e.g. `com.example.Foo$Inner`.
    fn binary_name(&self) -> &str;

    /// The class-file bytes backing this symbol.
    ///
    /// `Ok(None)` means the class is being compiled from source in this run;
    /// `Err` means a backing file exists but could not be read.
    fn backing_file(&self) -> std::io::Result<Option<BackingClassFile>>;
}

/// Freshness token deciding whether an existing trap artifact is superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapVersion {
    pub major: u32,
    pub minor: u32,
    pub last_modified_millis: u64,
    pub from_source: bool,
}

impl TrapVersion {
    /// Token for a unit being compiled from source in this run. Source units
    /// take precedence over any classpath-loaded version of the same name,
    /// in this or any other extractor invocation.
    pub fn source() -> Self {
        Self {
            major: 0,
            minor: 0,
            last_modified_millis: 0,
            from_source: true,
        }
    }

    /// The degraded token produced when version information cannot be
    /// determined. Never newer than anything, and not valid.
    pub fn invalid() -> Self {
        Self {
            major: 0,
            minor: 0,
            last_modified_millis: 0,
            from_source: false,
        }
    }

    /// Compute the token for a class symbol.
    ///
    /// Classes without a backing file get the source token. Any failure to
    /// read or decode the backing class file degrades to [`Self::invalid`]
    /// with a warning; the caller then keeps existing output conservatively.
    pub fn of_symbol(sym: &dyn ClassSymbol) -> Self {
        let backing = match sym.backing_file() {
            Ok(Some(backing)) => backing,
            Ok(None) => return Self::source(),
            Err(err) => {
                tracing::warn!(
                    target = "quarry.trap",
                    class = sym.binary_name(),
                    error = %err,
                    "failed to read backing class file for version information"
                );
                return Self::invalid();
            }
        };

        match ClassHeader::parse(&backing.bytes) {
            Ok(header) => Self {
                major: u32::from(header.major_version),
                minor: u32::from(header.minor_version),
                last_modified_millis: backing.last_modified_millis,
                from_source: false,
            },
            Err(err) => {
                tracing::warn!(
                    target = "quarry.trap",
                    class = sym.binary_name(),
                    error = %err,
                    "failed to read class file version information"
                );
                Self::invalid()
            }
        }
    }

    /// Strict "supersedes" order.
    ///
    /// Source-origin tokens outrank every classpath token regardless of the
    /// numeric fields; among classpath tokens the order is lexicographic on
    /// `(major, minor, last_modified)`.
    pub fn newer_than(&self, other: &TrapVersion) -> bool {
        if other.from_source {
            false
        } else if self.from_source {
            true
        } else {
            (self.major, self.minor, self.last_modified_millis)
                > (other.major, other.minor, other.last_modified_millis)
        }
    }

    /// A token is valid if it is source-origin or carries a real class-file
    /// major version. The degraded zero token is not valid: it must never
    /// cause an existing artifact to be overwritten, or to be kept silently.
    pub fn is_valid(&self) -> bool {
        self.from_source || self.major > 0
    }
}

impl std::fmt::Display for TrapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from_source {
            write!(f, "source")
        } else {
            write!(
                f,
                "{}.{}-{}",
                self.major, self.minor, self.last_modified_millis
            )
        }
    }
}

/// Read the version recorded next to an existing trap file.
///
/// A missing or malformed record reads as the zero version, which (via the
/// `major == 0` source sentinel shared with cooperating processes) keeps the
/// existing artifact. A warning is emitted so the condition is diagnosable.
pub(crate) fn read_trap_metadata(metadata_file: &Path) -> TrapVersion {
    let mut major = 0u32;
    let mut minor = 0u32;
    let mut last_modified = 0u64;

    match std::fs::read_to_string(metadata_file) {
        Ok(text) => {
            for line in text.lines() {
                let Some((key, value)) = line.split_once(',') else {
                    continue;
                };
                match key {
                    MAJOR_VERSION_KEY => major = parse_field(value, metadata_file, major),
                    MINOR_VERSION_KEY => minor = parse_field(value, metadata_file, minor),
                    LAST_MODIFIED_KEY => {
                        last_modified = parse_field(value, metadata_file, last_modified)
                    }
                    _ => {}
                }
            }
        }
        Err(err) => {
            tracing::warn!(
                target = "quarry.trap",
                path = %metadata_file.display(),
                error = %err,
                "trap metadata file could not be read"
            );
        }
    }

    TrapVersion {
        major,
        minor,
        last_modified_millis: last_modified,
        // Cooperating processes record source-compiled classes with a zero
        // major version; preserve that sentinel on the way back in.
        from_source: major == 0,
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, metadata_file: &Path, current: T) -> T {
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(
                target = "quarry.trap",
                path = %metadata_file.display(),
                value,
                "invalid class file version field in trap metadata"
            );
            current
        }
    }
}

/// Persist the version record for a freshly produced trap file.
pub(crate) fn write_trap_metadata(
    metadata_file: &Path,
    version: &TrapVersion,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(metadata_file)?;
    writeln!(file, "{MAJOR_VERSION_KEY},{}", version.major)?;
    writeln!(file, "{MINOR_VERSION_KEY},{}", version.minor)?;
    writeln!(file, "{LAST_MODIFIED_KEY},{}", version.last_modified_millis)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classpath(major: u32, minor: u32, last_modified: u64) -> TrapVersion {
        TrapVersion {
            major,
            minor,
            last_modified_millis: last_modified,
            from_source: false,
        }
    }

    #[test]
    fn source_outranks_any_classpath_version() {
        let source = TrapVersion::source();
        let high = classpath(65, 0, u64::MAX);
        assert!(source.newer_than(&high));
        assert!(!high.newer_than(&source));
    }

    #[test]
    fn source_never_supersedes_source() {
        assert!(!TrapVersion::source().newer_than(&TrapVersion::source()));
    }

    #[test]
    fn classpath_order_is_lexicographic() {
        assert!(classpath(52, 0, 0).newer_than(&classpath(51, 9, 999)));
        assert!(classpath(52, 1, 0).newer_than(&classpath(52, 0, 999)));
        assert!(classpath(52, 0, 10).newer_than(&classpath(52, 0, 9)));
    }

    #[test]
    fn equal_versions_are_not_newer_either_way() {
        let a = classpath(52, 0, 100);
        assert!(!a.newer_than(&a));
    }

    #[test]
    fn invalid_token_is_not_valid_but_source_is() {
        assert!(!TrapVersion::invalid().is_valid());
        assert!(TrapVersion::source().is_valid());
        assert!(classpath(45, 3, 0).is_valid());
    }

    #[test]
    fn metadata_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Foo.members.metadata");
        let version = classpath(61, 0, 1_700_000_000_000);
        write_trap_metadata(&path, &version).unwrap();
        assert_eq!(read_trap_metadata(&path), version);
    }

    #[test]
    fn source_token_round_trips_through_zero_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Foo.members.metadata");
        write_trap_metadata(&path, &TrapVersion::source()).unwrap();
        let read = read_trap_metadata(&path);
        assert!(read.from_source);
        assert!(!TrapVersion::source().newer_than(&read));
    }

    #[test]
    fn missing_metadata_reads_as_zero_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let read = read_trap_metadata(&tmp.path().join("absent.metadata"));
        assert_eq!(read.major, 0);
        assert!(read.from_source);
    }

    struct FakeSymbol {
        name: &'static str,
        backing: std::io::Result<Option<BackingClassFile>>,
    }

    impl ClassSymbol for FakeSymbol {
        fn binary_name(&self) -> &str {
            self.name
        }

        fn backing_file(&self) -> std::io::Result<Option<BackingClassFile>> {
            match &self.backing {
                Ok(backing) => Ok(backing.clone()),
                Err(err) => Err(std::io::Error::new(err.kind(), "unreadable")),
            }
        }
    }

    #[test]
    fn symbol_without_backing_file_is_source() {
        let sym = FakeSymbol {
            name: "com.example.Fresh",
            backing: Ok(None),
        };
        assert!(TrapVersion::of_symbol(&sym).from_source);
    }

    #[test]
    fn malformed_class_bytes_degrade_to_invalid() {
        let sym = FakeSymbol {
            name: "com.example.Broken",
            backing: Ok(Some(BackingClassFile {
                bytes: vec![1, 2, 3],
                last_modified_millis: 42,
            })),
        };
        let version = TrapVersion::of_symbol(&sym);
        assert_eq!(version, TrapVersion::invalid());
        assert!(!version.is_valid());
    }

    #[test]
    fn unreadable_backing_file_degrades_to_invalid() {
        let sym = FakeSymbol {
            name: "com.example.Gone",
            backing: Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "unreadable",
            )),
        };
        assert_eq!(TrapVersion::of_symbol(&sym), TrapVersion::invalid());
    }

    #[test]
    fn backing_bytes_yield_header_version() {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE];
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(&52u16.to_be_bytes());
        let sym = FakeSymbol {
            name: "com.example.Loaded",
            backing: Ok(Some(BackingClassFile {
                bytes,
                last_modified_millis: 7,
            })),
        };
        let version = TrapVersion::of_symbol(&sym);
        assert_eq!(version, classpath(52, 3, 7));
    }
}
