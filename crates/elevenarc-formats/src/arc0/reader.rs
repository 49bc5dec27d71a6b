//! ARC0 archive reader

use binrw::io::Cursor;
use binrw::{BinRead, Endian};
use bytes::Bytes;
use elevenarc_vfs::{
    BlobSource, LazyBlob, ParallelPolicy, SharedSource, VfsConfig, VirtualDirectory, share,
};
use encoding_rs::SHIFT_JIS;
use std::io::{Read, SeekFrom};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::entry::{DirectoryEntry, FileEntry, read_records};
use super::error::{Arc0Error, Arc0Result};
use super::header::{ARC0_MAGIC, Arc0Header, HEADER_SIZE};
use crate::compression::decompress_auto;
use crate::crc32::name_hash;

/// Decoded ARC0 tables
#[derive(Debug, Clone)]
pub struct Arc0Tables {
    /// Archive header
    pub header: Arc0Header,
    /// Directory entries, sorted by hash
    pub directories: Vec<DirectoryEntry>,
    /// Directory hash table
    pub directory_hashes: Vec<u32>,
    /// File entries
    pub files: Vec<FileEntry>,
    /// Raw name blob (Shift_JIS, null-terminated)
    pub names: Vec<u8>,
}

impl Arc0Tables {
    /// Decode the tables from the start of an archive
    ///
    /// `region` must hold at least the header and every table block, i.e. the
    /// first `data_offset` bytes.
    pub fn parse(region: &[u8]) -> Arc0Result<Self> {
        let header = Arc0Header::read_options(&mut Cursor::new(region), Endian::Little, ())?;
        header.validate()?;
        let offsets = header.block_offsets()?;
        let data_offset = offsets[4];
        if (region.len() as u64) < data_offset {
            return Err(Arc0Error::TruncatedTable {
                table: "name",
                offset: offsets[3],
                required: data_offset - offsets[3],
                available: region.len() as u64,
            });
        }

        let block = |index: usize| -> Arc0Result<Vec<u8>> {
            let start = offsets[index] as usize;
            let end = offsets[index + 1] as usize;
            let data = decompress_auto(&region[start..end])?;
            debug!(index, compressed = end - start, raw = data.len(), "decoded table block");
            Ok(data)
        };

        let directory_count = header.directory_entries_count as usize;
        let file_count = header.file_entries_count as usize;
        let directories = read_records(
            "directory entries",
            &block(0)?,
            directory_count,
            DirectoryEntry::SIZE,
        )?;
        let directory_hashes = read_records(
            "directory hash",
            &block(1)?,
            header.directory_hash_count as usize,
            4,
        )?;
        let files = read_records("file entries", &block(2)?, file_count, FileEntry::SIZE)?;
        let names = block(3)?;

        let tables = Self {
            header,
            directories,
            directory_hashes,
            files,
            names,
        };
        tables.verify()?;
        Ok(tables)
    }

    /// Payload region offset from the start of the archive
    pub fn data_offset(&self) -> u64 {
        self.header.data_offset as u64
    }

    /// Stored path of a directory (`""` for the root, `"a/b/"` below it)
    pub fn directory_name(&self, directory: &DirectoryEntry) -> Arc0Result<String> {
        self.name_at(i64::from(directory.dir_name_offset))
    }

    /// Name of a file inside `directory`
    pub fn file_name(&self, directory: &DirectoryEntry, file: &FileEntry) -> Arc0Result<String> {
        self.name_at(i64::from(directory.file_name_offset) + i64::from(file.name_offset_in_folder))
    }

    /// File entries belonging to `directory`
    pub fn directory_files(&self, directory: &DirectoryEntry) -> Arc0Result<&[FileEntry]> {
        let range = directory.file_range()?;
        let end = range.end;
        self.files.get(range).ok_or_else(|| {
            Arc0Error::InvalidFormat(format!(
                "directory 0x{:08X} files end at {end}, table has {}",
                directory.crc32,
                self.files.len()
            ))
        })
    }

    /// Look up a directory by stored path with a binary search over the hash table
    pub fn find_directory(&self, name: &str) -> Option<&DirectoryEntry> {
        let hash = name_hash(name);
        let start = self.directory_hashes.partition_point(|&h| h < hash);
        self.directory_hashes[start..]
            .iter()
            .take_while(|&&h| h == hash)
            .enumerate()
            .map(|(i, _)| &self.directories[start + i])
            .find(|entry| self.directory_name(entry).is_ok_and(|n| n == name))
    }

    /// Look up a file in `directory` with a binary search over its hash-sorted entries
    pub fn find_file(&self, directory: &DirectoryEntry, name: &str) -> Option<&FileEntry> {
        let files = self.directory_files(directory).ok()?;
        let hash = name_hash(name);
        let start = files.partition_point(|f| f.crc32 < hash);
        files[start..]
            .iter()
            .take_while(|f| f.crc32 == hash)
            .find(|f| self.file_name(directory, f).is_ok_and(|n| n == name))
    }

    fn verify(&self) -> Arc0Result<()> {
        let matches = self
            .directories
            .iter()
            .zip(&self.directory_hashes)
            .all(|(entry, &hash)| entry.crc32 == hash);
        if !matches || self.directories.len() != self.directory_hashes.len() {
            return Err(Arc0Error::InvalidFormat(
                "directory hash table does not match directory entries".to_string(),
            ));
        }
        if self.directory_hashes.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Arc0Error::InvalidFormat(
                "directory hash table is not sorted".to_string(),
            ));
        }
        for directory in &self.directories {
            self.directory_files(directory)?;
        }
        Ok(())
    }

    fn name_at(&self, offset: i64) -> Arc0Result<String> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.names.len())
            .ok_or_else(|| {
                Arc0Error::InvalidFormat(format!(
                    "name offset {offset} outside name table of {} bytes",
                    self.names.len()
                ))
            })?;
        let raw = &self.names[start..];
        let end = raw.iter().position(|&b| b == 0).ok_or_else(|| {
            Arc0Error::InvalidFormat(format!("name at offset {offset} is not terminated"))
        })?;
        let (name, had_errors) = SHIFT_JIS.decode_without_bom_handling(&raw[..end]);
        if had_errors {
            warn!(offset, "name is not valid Shift_JIS, replaced undecodable bytes");
        }
        Ok(name.into_owned())
    }
}

/// Reader over an ARC0 archive held by a shared source
pub struct Arc0Reader {
    source: SharedSource,
    source_len: u64,
    tables: Arc0Tables,
    chunk_size: usize,
    policy: ParallelPolicy,
}

impl Arc0Reader {
    /// Parse the tables of the archive in `source`
    pub fn new(source: SharedSource) -> Arc0Result<Self> {
        Self::with_config(source, &VfsConfig::default())
    }

    /// Parse the tables of an in-memory archive
    pub fn from_bytes(data: impl Into<Bytes>) -> Arc0Result<Self> {
        Self::new(share(Cursor::new(data.into())))
    }

    /// Parse the tables, using `config` for the blobs and folders the reader creates
    ///
    /// A source without the ARC0 magic is retried as a compressed wrapper
    /// around a whole archive.
    pub fn with_config(source: SharedSource, config: &VfsConfig) -> Arc0Result<Self> {
        let (source, source_len, region) = match read_region(&source)? {
            Region::Tables { len, region } => (source, len, region),
            Region::Foreign { magic, data } => {
                let unwrapped = decompress_auto(&data)
                    .ok()
                    .filter(|inner| read_magic(inner) == Some(ARC0_MAGIC))
                    .ok_or(Arc0Error::InvalidMagic(magic))?;
                debug!(
                    wrapped = data.len(),
                    unwrapped = unwrapped.len(),
                    "unwrapped compressed archive"
                );
                let len = unwrapped.len() as u64;
                let inner = share(Cursor::new(Bytes::from(unwrapped)));
                match read_region(&inner)? {
                    Region::Tables { region, .. } => (inner, len, region),
                    Region::Foreign { magic, .. } => return Err(Arc0Error::InvalidMagic(magic)),
                }
            }
        };

        let tables = Arc0Tables::parse(&region)?;
        Ok(Self {
            source,
            source_len,
            tables,
            chunk_size: config.read_chunk_size,
            policy: config.policy(),
        })
    }

    /// Decoded tables
    pub fn tables(&self) -> &Arc0Tables {
        &self.tables
    }

    /// Source the archive's blobs read from
    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Build the namespace described by the tables
    ///
    /// Directories are created from their stored paths in name order and files
    /// are added in name order, so the result does not depend on hash order.
    /// File payloads stay in the source as lazy blobs.
    pub fn read_directory(&self) -> Arc0Result<VirtualDirectory> {
        let tables = &self.tables;
        let data_offset = tables.data_offset();

        let mut directories = tables
            .directories
            .iter()
            .map(|entry| -> Arc0Result<_> { Ok((tables.directory_name(entry)?, entry)) })
            .collect::<Arc0Result<Vec<_>>>()?;
        directories.sort_by(|a, b| a.0.cmp(&b.0));

        let mut root = VirtualDirectory::root();
        root.set_parallel_policy(self.policy);
        for (name, entry) in directories {
            if name_hash(&name) != entry.crc32 {
                return Err(Arc0Error::InvalidFormat(format!(
                    "directory {name:?} stored with hash 0x{:08X}, name hashes to 0x{:08X}",
                    entry.crc32,
                    name_hash(&name)
                )));
            }
            let mut files = tables
                .directory_files(entry)?
                .iter()
                .map(|file| -> Arc0Result<_> { Ok((tables.file_name(entry, file)?, file)) })
                .collect::<Arc0Result<Vec<_>>>()?;
            files.sort_by(|a, b| a.0.cmp(&b.0));

            let folder = root.get_or_create_folder(&name);
            for (file_name, file) in files {
                if name_hash(&file_name) != file.crc32 {
                    return Err(Arc0Error::InvalidFormat(format!(
                        "file {name}{file_name} stored with hash 0x{:08X}, name hashes to 0x{:08X}",
                        file.crc32,
                        name_hash(&file_name)
                    )));
                }
                let offset = data_offset + u64::from(file.data_offset);
                let size = u64::from(file.size);
                if offset + size > self.source_len {
                    return Err(Arc0Error::InvalidFormat(format!(
                        "{name}{file_name} spans 0x{offset:X}+{size}, archive is {} bytes",
                        self.source_len
                    )));
                }
                let blob = LazyBlob::new_lazy(Arc::clone(&self.source), offset, size)?
                    .with_chunk_size(self.chunk_size);
                folder.add_file(file_name, blob);
            }
        }

        info!(
            directories = tables.directories.len(),
            files = tables.files.len(),
            bytes = self.source_len,
            "read ARC0 archive"
        );
        Ok(root)
    }
}

impl std::fmt::Debug for Arc0Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arc0Reader")
            .field("source_len", &self.source_len)
            .field("directories", &self.tables.directories.len())
            .field("files", &self.tables.files.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Parse the archive in `source` into a namespace backed by it
pub fn read(source: SharedSource) -> Arc0Result<VirtualDirectory> {
    Arc0Reader::new(source)?.read_directory()
}

/// Parse an in-memory archive
pub fn from_bytes(data: impl Into<Bytes>) -> Arc0Result<VirtualDirectory> {
    Arc0Reader::from_bytes(data)?.read_directory()
}

enum Region {
    Tables { len: u64, region: Vec<u8> },
    Foreign { magic: u32, data: Vec<u8> },
}

fn read_magic(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read the header and table blocks, or the whole source when the magic is not ARC0
fn read_region(source: &SharedSource) -> Arc0Result<Region> {
    let mut guard = source.lock();
    let stream: &mut dyn BlobSource = &mut **guard;
    let len = stream.seek(SeekFrom::End(0))?;

    if len < HEADER_SIZE as u64 {
        let mut data = Vec::new();
        stream.seek(SeekFrom::Start(0))?;
        stream.read_to_end(&mut data)?;
        return match read_magic(&data) {
            Some(ARC0_MAGIC) => Err(Arc0Error::TruncatedTable {
                table: "header",
                offset: 0,
                required: HEADER_SIZE as u64,
                available: len,
            }),
            magic => Ok(Region::Foreign {
                magic: magic.unwrap_or_default(),
                data,
            }),
        };
    }

    let mut header = [0u8; HEADER_SIZE];
    stream.seek(SeekFrom::Start(0))?;
    stream.read_exact(&mut header)?;
    let magic = read_magic(&header).unwrap_or_default();
    if magic != ARC0_MAGIC {
        let mut data = header.to_vec();
        stream.read_to_end(&mut data)?;
        return Ok(Region::Foreign { magic, data });
    }

    let parsed = Arc0Header::read_options(&mut Cursor::new(&header[..]), Endian::Little, ())?;
    parsed.validate()?;
    let data_offset = parsed.block_offsets()?[4];
    if data_offset > len {
        return Err(Arc0Error::TruncatedTable {
            table: "table region",
            offset: 0,
            required: data_offset,
            available: len,
        });
    }

    let mut region = header.to_vec();
    region.resize(data_offset as usize, 0);
    stream.read_exact(&mut region[HEADER_SIZE..])?;
    Ok(Region::Tables { len, region })
}
