//! ARC0 archive writer
//!
//! Writing happens in two phases. [`Arc0Layout::plan`] walks the namespace
//! and assigns every hash, name offset and payload offset without touching
//! file content. Emission then writes a zeroed header, the four compressed
//! table blocks, the payload copied from each blob, and finally seeks back to
//! patch the real header in.

use binrw::{BinWrite, Endian};
use elevenarc_vfs::{LazyBlob, VirtualDirectory};
use encoding_rs::SHIFT_JIS;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::entry::{DirectoryEntry, FileEntry, write_records};
use super::error::{Arc0Error, Arc0Result};
use super::header::{Arc0Header, HEADER_SIZE};
use crate::compression::{Compressor, NoCompression};
use crate::crc32::name_hash;

/// Options controlling how archives are written
#[derive(Debug, Clone)]
pub struct Arc0WriteOptions {
    compressor: Arc<dyn Compressor>,
}

impl Default for Arc0WriteOptions {
    fn default() -> Self {
        Self {
            compressor: Arc::new(NoCompression),
        }
    }
}

impl Arc0WriteOptions {
    /// Compress table blocks with `compressor`
    #[must_use]
    pub fn with_compressor(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    /// Strategy used for table blocks
    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }
}

/// Round `value` up to the next multiple of 4
pub const fn align4(value: u64) -> u64 {
    (value + 3) & !3
}

/// Table contents and payload placement for one namespace
#[derive(Debug)]
pub struct Arc0Layout<'a> {
    /// Directory entries sorted by hash
    pub directories: Vec<DirectoryEntry>,
    /// Hashes of `directories`, same order
    pub directory_hashes: Vec<u32>,
    /// File entries, grouped per folder in traversal order, hash-sorted within
    /// each group
    pub files: Vec<FileEntry>,
    /// Null-terminated Shift_JIS names in assignment order
    pub names: Vec<u8>,
    /// Blobs with their payload offsets, ascending
    pub payload: Vec<(u32, &'a LazyBlob)>,
}

impl<'a> Arc0Layout<'a> {
    /// Assign every table value for `root`
    pub fn plan(root: &'a VirtualDirectory) -> Arc0Result<Self> {
        let folders = root.walk();
        if folders.len() > i16::MAX as usize {
            return Err(Arc0Error::InvalidArgument(format!(
                "{} directories exceed the ARC0 limit of {}",
                folders.len(),
                i16::MAX
            )));
        }

        let mut seen = HashSet::with_capacity(folders.len());
        let mut directories = Vec::with_capacity(folders.len());
        let mut files = Vec::new();
        let mut names = Vec::new();
        let mut payload = Vec::new();
        let mut data_offset: u64 = 0;

        for (path, folder) in folders {
            if !seen.insert(path.clone()) {
                return Err(Arc0Error::InvalidArgument(format!(
                    "duplicate directory path {path}"
                )));
            }
            let dir_name = path.strip_prefix('/').unwrap_or(&path);

            let dir_name_offset = table_i32(names.len(), "name table")?;
            push_name(&mut names, dir_name)?;
            let file_name_offset = names.len();

            let first_file_index = u16::try_from(files.len()).map_err(|_| {
                Arc0Error::InvalidArgument(format!(
                    "too many files before {path}: first file index {} exceeds {}",
                    files.len(),
                    u16::MAX
                ))
            })?;

            let mut sorted: Vec<(&str, &LazyBlob)> = folder.files().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));

            let mut folder_files = Vec::with_capacity(sorted.len());
            for (name, blob) in sorted {
                if name.is_empty() {
                    return Err(Arc0Error::InvalidArgument(format!(
                        "empty file name in {path}"
                    )));
                }
                let name_offset_in_folder = (names.len() - file_name_offset) as u32;
                push_name(&mut names, name)?;

                let size = u32::try_from(blob.size()).map_err(|_| {
                    Arc0Error::InvalidArgument(format!(
                        "{path}{name} is {} bytes, over the 4 GiB file limit",
                        blob.size()
                    ))
                })?;
                let offset = u32::try_from(data_offset).map_err(|_| {
                    Arc0Error::InvalidArgument(format!(
                        "payload offset of {path}{name} exceeds 4 GiB"
                    ))
                })?;

                folder_files.push(FileEntry {
                    crc32: name_hash(name),
                    name_offset_in_folder,
                    data_offset: offset,
                    size,
                });
                payload.push((offset, blob));
                data_offset = align4(data_offset + u64::from(size));
            }

            folder_files.sort_by_key(|entry| entry.crc32);

            directories.push(DirectoryEntry {
                crc32: name_hash(dir_name),
                dir_count: count_i16(folder.folders().len(), &path, "subfolders")?,
                first_file_index,
                file_count: count_i16(folder_files.len(), &path, "files")?,
                dir_name_offset,
                file_name_offset: table_i32(file_name_offset, "name table")?,
                first_dir_index: 0,
            });
            files.extend(folder_files);
        }

        directories.sort_by_key(|entry| entry.crc32);
        let mut running: u32 = 0;
        for entry in &mut directories {
            entry.first_dir_index = u16::try_from(running).map_err(|_| {
                Arc0Error::InvalidArgument(format!("directory index {running} exceeds u16"))
            })?;
            running += u32::from(entry.dir_count.unsigned_abs());
        }
        let directory_hashes = directories.iter().map(|entry| entry.crc32).collect();

        Ok(Self {
            directories,
            directory_hashes,
            files,
            names,
            payload,
        })
    }

    /// Write the archive described by this layout
    pub fn emit<W: Write + Seek>(
        &self,
        writer: &mut W,
        options: &Arc0WriteOptions,
    ) -> Arc0Result<u64> {
        let base = writer.stream_position()?;
        writer.write_all(&[0u8; HEADER_SIZE])?;

        let blocks = [
            ("directory entries", write_records(&self.directories)?),
            ("directory hash", write_records(&self.directory_hashes)?),
            ("file entries", write_records(&self.files)?),
            ("name", self.names.clone()),
        ];

        let mut position = HEADER_SIZE as u64;
        let mut offsets = [0u64; 4];
        for (slot, (table, raw)) in offsets.iter_mut().zip(&blocks) {
            *slot = position;
            let block = options.compressor().compress(raw)?;
            writer.write_all(&block)?;
            let len = block.len() as u64;
            write_padding(writer, align4(len) - len)?;
            debug!(table, raw = raw.len(), compressed = len, offset = position, "wrote table block");
            position += align4(len);
        }
        let data_offset = position;

        let mut written = 0u64;
        for (offset, blob) in &self.payload {
            let offset = u64::from(*offset);
            write_padding(writer, offset - written)?;
            written = offset + blob.copy_to(writer)?;
        }
        write_padding(writer, align4(written) - written)?;
        let end = data_offset + align4(written);

        let header = Arc0Header {
            directory_hash_offset: table_i32(offsets[1], "directory hash offset")?,
            file_entries_offset: table_i32(offsets[2], "file entries offset")?,
            name_offset: table_i32(offsets[3], "name offset")?,
            data_offset: table_i32(data_offset, "data offset")?,
            directory_entries_count: self.directories.len() as i16,
            directory_hash_count: self.directory_hashes.len() as i16,
            file_entries_count: table_i32(self.files.len(), "file count")?,
            table_chunk_size: table_i32(data_offset, "table chunk size")?,
            directory_count: self.directories.len() as i32,
            file_count: table_i32(self.files.len(), "file count")?,
            ..Arc0Header::new()
        };

        writer.seek(SeekFrom::Start(base))?;
        header.write_options(writer, Endian::Little, ())?;
        writer.seek(SeekFrom::Start(base + end))?;
        writer.flush()?;

        info!(
            directories = self.directories.len(),
            files = self.files.len(),
            bytes = end,
            method = ?options.compressor().method(),
            "wrote ARC0 archive"
        );
        Ok(end)
    }
}

/// Write `root` as an ARC0 archive with default options
pub fn write<W: Write + Seek>(root: &VirtualDirectory, writer: &mut W) -> Arc0Result<u64> {
    write_with_options(root, writer, &Arc0WriteOptions::default())
}

/// Write `root` as an ARC0 archive
///
/// Returns the number of bytes written. A failed write leaves a truncated
/// archive behind; nothing is rolled back.
pub fn write_with_options<W: Write + Seek>(
    root: &VirtualDirectory,
    writer: &mut W,
    options: &Arc0WriteOptions,
) -> Arc0Result<u64> {
    Arc0Layout::plan(root)?.emit(writer, options)
}

/// Serialize `root` into memory with default options
pub fn to_bytes(root: &VirtualDirectory) -> Arc0Result<Vec<u8>> {
    to_bytes_with_options(root, &Arc0WriteOptions::default())
}

/// Serialize `root` into memory
pub fn to_bytes_with_options(
    root: &VirtualDirectory,
    options: &Arc0WriteOptions,
) -> Arc0Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_with_options(root, &mut cursor, options)?;
    Ok(cursor.into_inner())
}

/// Write `root` to a file with default options
pub fn write_to_path(root: &VirtualDirectory, path: &Path) -> Arc0Result<()> {
    write_to_path_with_options(root, path, &Arc0WriteOptions::default())
}

/// Write `root` to a file
///
/// The archive is built in memory and moved into place with a rename, so
/// blobs still backed by an open handle on `path` keep reading the old file.
pub fn write_to_path_with_options(
    root: &VirtualDirectory,
    path: &Path,
    options: &Arc0WriteOptions,
) -> Arc0Result<()> {
    let Some(file_name) = path.file_name() else {
        return Err(Arc0Error::InvalidArgument(format!(
            "output path {} does not name a file",
            path.display()
        )));
    };
    let bytes = to_bytes_with_options(root, options)?;

    let mut staging_name = file_name.to_os_string();
    staging_name.push(".partial");
    let staging = path.with_file_name(staging_name);
    fs::write(&staging, &bytes)?;
    fs::rename(&staging, path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved ARC0 archive");
    Ok(())
}

fn push_name(names: &mut Vec<u8>, name: &str) -> Arc0Result<()> {
    if name.contains('\0') {
        return Err(Arc0Error::InvalidArgument(format!(
            "name {name:?} contains a NUL byte"
        )));
    }
    let (encoded, _, had_errors) = SHIFT_JIS.encode(name);
    if had_errors {
        return Err(Arc0Error::UnencodableName(name.to_string()));
    }
    names.extend_from_slice(&encoded);
    names.push(0);
    Ok(())
}

fn write_padding<W: Write + ?Sized>(writer: &mut W, len: u64) -> io::Result<()> {
    io::copy(&mut io::repeat(0).take(len), writer)?;
    Ok(())
}

fn count_i16(count: usize, path: &str, what: &str) -> Arc0Result<i16> {
    i16::try_from(count).map_err(|_| {
        Arc0Error::InvalidArgument(format!("{path} holds {count} {what}, over {}", i16::MAX))
    })
}

fn table_i32<T>(value: T, what: &str) -> Arc0Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| Arc0Error::InvalidArgument(format!("{what} {value} exceeds the i32 range")))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compression::ZlibCompression;
    use crate::crc32::SENTINEL;
    use pretty_assertions::assert_eq;

    fn eager(data: &[u8]) -> LazyBlob {
        LazyBlob::new_eager(data.to_vec())
    }

    #[test]
    fn align4_rounds_up() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }

    #[test]
    fn files_are_name_sorted_for_offsets_and_hash_sorted_in_table() {
        let mut root = VirtualDirectory::root();
        root.add_file("b.bin", eager(&[0; 3]));
        root.add_file("a.bin", eager(&[0; 5]));
        root.add_file("c.bin", eager(&[0; 1]));
        let layout = Arc0Layout::plan(&root).unwrap();

        assert_eq!(layout.names, b"\0a.bin\0b.bin\0c.bin\0".to_vec());
        let by_name = |name: &str| {
            let crc = name_hash(name);
            *layout.files.iter().find(|f| f.crc32 == crc).unwrap()
        };
        assert_eq!(by_name("a.bin").data_offset, 0);
        assert_eq!(by_name("b.bin").data_offset, 8);
        assert_eq!(by_name("c.bin").data_offset, 12);
        assert_eq!(by_name("a.bin").name_offset_in_folder, 0);
        assert_eq!(by_name("b.bin").name_offset_in_folder, 6);
        assert_eq!(by_name("c.bin").name_offset_in_folder, 12);

        assert!(layout.files.windows(2).all(|w| w[0].crc32 <= w[1].crc32));
        let offsets: Vec<u32> = layout.payload.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![0, 8, 12]);
    }

    #[test]
    fn root_directory_uses_sentinel() {
        let mut root = VirtualDirectory::root();
        root.add_folder("a");
        let layout = Arc0Layout::plan(&root).unwrap();
        let root_entry = layout.directories.last().unwrap();
        assert_eq!(root_entry.crc32, SENTINEL);
        assert_eq!(root_entry.dir_name_offset, 0);
        assert_eq!(root_entry.file_name_offset, 1);
        assert_eq!(root_entry.dir_count, 1);
    }

    #[test]
    fn directory_table_is_hash_sorted_with_running_index() {
        let mut root = VirtualDirectory::root();
        root.add_folder("a").add_folder("c");
        root.add_folder("b");
        let layout = Arc0Layout::plan(&root).unwrap();

        assert_eq!(layout.directories.len(), 4);
        assert_eq!(
            layout.directory_hashes,
            layout.directories.iter().map(|d| d.crc32).collect::<Vec<_>>()
        );
        assert!(layout.directory_hashes.windows(2).all(|w| w[0] <= w[1]));

        let mut running = 0;
        for entry in &layout.directories {
            assert_eq!(entry.first_dir_index, running);
            running += entry.dir_count as u16;
        }
        assert_eq!(running, 3);
    }

    #[test]
    fn first_file_index_follows_traversal_order() {
        let mut root = VirtualDirectory::root();
        root.add_file("r", eager(b"r"));
        let a = root.add_folder("a");
        a.add_file("x", eager(b"x"));
        a.add_file("y", eager(b"y"));
        root.add_folder("b").add_file("z", eager(b"z"));
        let layout = Arc0Layout::plan(&root).unwrap();

        let find = |name: &str| {
            let crc = name_hash(name);
            *layout.directories.iter().find(|d| d.crc32 == crc).unwrap()
        };
        assert_eq!(find("").first_file_index, 0);
        assert_eq!(find("a/").first_file_index, 1);
        assert_eq!(find("a/").file_count, 2);
        assert_eq!(find("b/").first_file_index, 3);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut root = VirtualDirectory::root();
        root.add_folder("dup");
        root.add_folder("dup");
        assert!(matches!(
            Arc0Layout::plan(&root),
            Err(Arc0Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unencodable_names_are_rejected() {
        let mut root = VirtualDirectory::root();
        root.add_file("smile\u{1F600}.bin", eager(b""));
        assert!(matches!(
            Arc0Layout::plan(&root),
            Err(Arc0Error::UnencodableName(_))
        ));
    }

    #[test]
    fn shift_jis_names_are_stored_encoded() {
        let mut root = VirtualDirectory::root();
        root.add_file("メニュー", eager(b""));
        let layout = Arc0Layout::plan(&root).unwrap();
        assert_eq!(&layout.names[1..], &[0x83, 0x81, 0x83, 0x6A, 0x83, 0x85, 0x81, 0x5B, 0]);
        assert_eq!(layout.files[0].crc32, name_hash("メニュー"));
    }

    #[test]
    fn emitted_offsets_are_aligned() {
        let mut root = VirtualDirectory::root();
        root.add_folder("odd").add_file("one.bin", eager(&[1, 2, 3]));
        root.add_file("two.bin", eager(&[4; 7]));
        let options = Arc0WriteOptions::default().with_compressor(ZlibCompression::default());
        let bytes = to_bytes_with_options(&root, &options).unwrap();

        let header = <Arc0Header as binrw::BinRead>::read_options(
            &mut Cursor::new(&bytes),
            Endian::Little,
            (),
        )
        .unwrap();
        header.validate().unwrap();
        for offset in header.block_offsets().unwrap() {
            assert_eq!(offset % 4, 0);
        }
        assert_eq!(header.table_chunk_size % 4, 0);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn table_chunk_covers_padded_blocks() {
        let mut root = VirtualDirectory::root();
        for i in 0..5 {
            root.add_folder(format!("folder{i}"))
                .add_file(format!("file{i}.bin"), eager(&[i as u8; 3]));
        }
        let options = Arc0WriteOptions::default().with_compressor(ZlibCompression::default());
        let bytes = to_bytes_with_options(&root, &options).unwrap();

        let header = <Arc0Header as binrw::BinRead>::read_options(
            &mut Cursor::new(&bytes),
            Endian::Little,
            (),
        )
        .unwrap();
        assert_eq!(header.table_chunk_size, header.data_offset);
    }

    #[test]
    fn empty_output_path_is_rejected() {
        let root = VirtualDirectory::root();
        assert!(matches!(
            write_to_path(&root, Path::new("")),
            Err(Arc0Error::InvalidArgument(_))
        ));
    }
}
