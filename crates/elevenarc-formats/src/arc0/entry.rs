//! ARC0 directory and file table records

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, Endian};

use super::error::{Arc0Error, Arc0Result};

/// One folder in the directory table (20 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DirectoryEntry {
    /// Name hash of the folder path
    pub crc32: u32,
    /// Number of immediate subfolders
    pub dir_count: i16,
    /// Index of the folder's first file entry
    pub first_file_index: u16,
    /// Number of files directly in the folder
    pub file_count: i16,
    /// Offset of the folder name in the name blob
    pub dir_name_offset: i32,
    /// Offset in the name blob that file name offsets are relative to
    pub file_name_offset: i32,
    /// Running sum of `dir_count` over the hash-sorted table
    pub first_dir_index: u16,
}

impl DirectoryEntry {
    /// Record size in bytes
    pub const SIZE: usize = 20;

    /// Range of this folder's entries in the file table
    pub fn file_range(&self) -> Arc0Result<std::ops::Range<usize>> {
        let count = usize::try_from(self.file_count).map_err(|_| {
            Arc0Error::InvalidFormat(format!(
                "directory 0x{:08X} has negative file count {}",
                self.crc32, self.file_count
            ))
        })?;
        let start = usize::from(self.first_file_index);
        Ok(start..start + count)
    }
}

/// One file in the file table (16 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct FileEntry {
    /// Name hash of the file name
    pub crc32: u32,
    /// Name offset relative to the folder's `file_name_offset`
    pub name_offset_in_folder: u32,
    /// Payload offset relative to the data region (4-byte aligned)
    pub data_offset: u32,
    /// Payload size in bytes
    pub size: u32,
}

impl FileEntry {
    /// Record size in bytes
    pub const SIZE: usize = 16;
}

/// Serialize fixed-size records back to back
pub(crate) fn write_records<T>(records: &[T]) -> Arc0Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    for record in records {
        record.write_options(&mut cursor, Endian::Little, ())?;
    }
    Ok(cursor.into_inner())
}

/// Parse `count` fixed-size records from a decompressed table block
pub(crate) fn read_records<T>(
    table: &'static str,
    data: &[u8],
    count: usize,
    record_size: usize,
) -> Arc0Result<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let required = count.checked_mul(record_size).ok_or_else(|| {
        Arc0Error::InvalidFormat(format!("{table} table count {count} overflows"))
    })?;
    if data.len() < required {
        return Err(Arc0Error::InvalidFormat(format!(
            "{table} table holds {} bytes, {count} records need {required}",
            data.len()
        )));
    }
    let mut cursor = Cursor::new(data);
    (0..count)
        .map(|_| T::read_options(&mut cursor, Endian::Little, ()).map_err(Arc0Error::from))
        .collect()
}
