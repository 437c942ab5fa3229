#![forbid(unsafe_code)]

//! Minimal JVM class-file reader for the extractor output layer.
//!
//! The extractor only needs the `minor_version`/`major_version` fields from
//! the class-file header to decide whether a previously extracted artifact is
//! stale. Everything past the version fields (constant pool, members, code,
//! debug info) is irrelevant here and is never touched.

mod error;
mod reader;

pub use crate::error::{Error, Result};

use crate::reader::Reader;

/// The leading fields of a JVM class file: magic plus the version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
}

impl ClassHeader {
    /// Parse the header from raw class-file bytes.
    ///
    /// Only the first eight bytes are inspected; trailing content is ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;

        Ok(Self {
            minor_version,
            major_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(major: u16, minor: u16) -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE];
        bytes.extend_from_slice(&minor.to_be_bytes());
        bytes.extend_from_slice(&major.to_be_bytes());
        bytes
    }

    #[test]
    fn parses_version_fields() {
        let header = ClassHeader::parse(&header_bytes(65, 0)).unwrap();
        assert_eq!(header.major_version, 65);
        assert_eq!(header.minor_version, 0);
    }

    #[test]
    fn ignores_trailing_content() {
        let mut bytes = header_bytes(52, 3);
        bytes.extend_from_slice(&[0u8; 64]);
        let header = ClassHeader::parse(&bytes).unwrap();
        assert_eq!(header.major_version, 52);
        assert_eq!(header.minor_version, 3);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52];
        match ClassHeader::parse(&bytes) {
            Err(Error::InvalidMagic(magic)) => assert_eq!(magic, 0xDEADBEEF),
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        assert!(matches!(
            ClassHeader::parse(&bytes),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(ClassHeader::parse(&[]), Err(Error::UnexpectedEof)));
    }
}
