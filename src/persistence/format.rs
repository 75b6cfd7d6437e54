//! File format definitions for forge-ann persistence.
//!
//! Layout, version 1:
//!
//! ```text
//! [MAGIC 8B "FORGEANN"][VERSION u32][INDEX_TYPE u32][FLAGS u32][CHECKSUM u32]
//! [DATA bincode snapshot]
//! ```
//!
//! All header integers are little-endian. `CHECKSUM` is the CRC32 of the
//! data section. Readers reject unknown magic, newer versions, type
//! mismatches, and checksum failures.

use crate::error::{ForgeAnnError, Result};

/// Magic bytes identifying a forge-ann file.
pub const MAGIC: [u8; 8] = *b"FORGEANN";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Index type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexType {
    /// HNSW index
    Hnsw = 1,
    /// HNSW + PQ hybrid index
    HnswPq = 2,
    /// Flat PQ index
    Pq = 3,
    /// IVF index
    Ivf = 4,
    /// LSH index
    Lsh = 5,
    /// Random-projection tree index
    RpTree = 6,
}

impl IndexType {
    /// Convert from u32.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Hnsw),
            2 => Some(Self::HnswPq),
            3 => Some(Self::Pq),
            4 => Some(Self::Ivf),
            5 => Some(Self::Lsh),
            6 => Some(Self::RpTree),
            _ => None,
        }
    }
}

/// File header structure. Total size: 24 bytes.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Magic bytes (must be [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version.
    pub version: u32,
    /// Index type.
    pub index_type: IndexType,
    /// Reserved flag bits; zero in version 1.
    pub flags: u32,
    /// CRC32 checksum of the data section.
    pub checksum: u32,
}

impl FileHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 24;

    /// Create a new header.
    pub fn new(index_type: IndexType, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            index_type,
            flags: 0,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&(self.index_type as u32).to_le_bytes());
        bytes[16..20].copy_from_slice(&self.flags.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ForgeAnnError::invalid_format("header too small"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        if magic != MAGIC {
            return Err(ForgeAnnError::invalid_format("invalid magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let index_type_raw = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let flags = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let checksum = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);

        let index_type = IndexType::from_u32(index_type_raw)
            .ok_or_else(|| ForgeAnnError::invalid_format("unknown index type"))?;

        Ok(Self {
            magic,
            version,
            index_type,
            flags,
            checksum,
        })
    }

    /// Verify the header is valid and matches the expected type.
    pub fn verify(&self, expected_type: IndexType) -> Result<()> {
        if self.version > FORMAT_VERSION {
            return Err(ForgeAnnError::invalid_format(format!(
                "unsupported version {} (max supported: {})",
                self.version, FORMAT_VERSION
            )));
        }
        if self.index_type != expected_type {
            return Err(ForgeAnnError::invalid_format(format!(
                "index type mismatch: expected {:?}, got {:?}",
                expected_type, self.index_type
            )));
        }
        Ok(())
    }
}
