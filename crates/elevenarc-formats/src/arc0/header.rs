//! ARC0 file header

use binrw::{BinRead, BinWrite};

use super::error::{Arc0Error, Arc0Result};

/// "ARC0" read as a little-endian 32-bit integer
pub const ARC0_MAGIC: u32 = 0x3043_5241;

/// Header size in bytes; also the offset of the directory entry table
pub const HEADER_SIZE: usize = 0x48;

/// ARC0 header (72 bytes, little-endian)
#[derive(Debug, Clone, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Arc0Header {
    /// Magic: [`ARC0_MAGIC`]
    pub magic: u32,

    /// Directory entry table offset (always [`HEADER_SIZE`])
    pub directory_entries_offset: i32,

    /// Directory hash table offset
    pub directory_hash_offset: i32,

    /// File entry table offset
    pub file_entries_offset: i32,

    /// Name blob offset
    pub name_offset: i32,

    /// Payload region offset
    pub data_offset: i32,

    /// Number of directory entries
    pub directory_entries_count: i16,

    /// Number of directory hashes
    pub directory_hash_count: i16,

    /// Number of file entries
    pub file_entries_count: i32,

    /// Header plus compressed tables, rounded up to 4
    pub table_chunk_size: i32,

    /// Unused; zero on write, preserved on read
    pub reserved: [u32; 5],

    /// Directory count (same as the entry count)
    pub directory_count: i32,

    /// File count (same as the entry count)
    pub file_count: i32,

    /// Unused; zero on write, preserved on read
    pub trailing_reserved: [u32; 2],
}

impl Arc0Header {
    /// Create an empty header with the magic and fixed offsets set
    pub fn new() -> Self {
        Self {
            magic: ARC0_MAGIC,
            directory_entries_offset: HEADER_SIZE as i32,
            ..Self::default()
        }
    }

    /// Offsets of the four table blocks and the payload region, in file order
    pub fn block_offsets(&self) -> Arc0Result<[u64; 5]> {
        let offsets = [
            ("directory entries", self.directory_entries_offset),
            ("directory hash", self.directory_hash_offset),
            ("file entries", self.file_entries_offset),
            ("name", self.name_offset),
            ("data", self.data_offset),
        ];
        let mut resolved = [0u64; 5];
        for (slot, (table, offset)) in resolved.iter_mut().zip(offsets) {
            *slot = u64::try_from(offset).map_err(|_| {
                Arc0Error::InvalidFormat(format!("negative {table} offset {offset}"))
            })?;
        }
        Ok(resolved)
    }

    /// Check magic, fixed offset and offset ordering
    pub fn validate(&self) -> Arc0Result<()> {
        if self.magic != ARC0_MAGIC {
            return Err(Arc0Error::InvalidMagic(self.magic));
        }
        if self.directory_entries_offset != HEADER_SIZE as i32 {
            return Err(Arc0Error::InvalidFormat(format!(
                "directory entries must start at 0x{HEADER_SIZE:X}, header says 0x{:X}",
                self.directory_entries_offset
            )));
        }
        let offsets = self.block_offsets()?;
        if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Arc0Error::InvalidFormat(format!(
                "table offsets out of order: {offsets:?}"
            )));
        }
        if self.directory_entries_count != self.directory_hash_count {
            return Err(Arc0Error::InvalidFormat(format!(
                "{} directory entries but {} directory hashes",
                self.directory_entries_count, self.directory_hash_count
            )));
        }
        if self.directory_entries_count < 0 || self.file_entries_count < 0 {
            return Err(Arc0Error::InvalidFormat("negative table count".to_string()));
        }
        Ok(())
    }
}
