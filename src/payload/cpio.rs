use filetime::{FileTime, set_file_mtime};
use log::debug;
use std::convert::TryFrom;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::{HexReader, HexWriter, align_n_bytes, write_pad};

const MAGIC: &[u8] = b"070701";
const TRAILER: &str = "TRAILER!!!";

/// 110 ASCII bytes: magic plus thirteen 8-char hex fields.
const HEADER_LEN: u32 = 110;

/// Maximum allowed CPIO entry name size (4 KB).
const MAX_NAME_SIZE: u32 = 4096;
/// Maximum allowed CPIO entry file size (1 GB).
const MAX_ENTRY_SIZE: u32 = 1024 * 1024 * 1024;

pub const MODE_DIR: u32 = 0o040000;
pub const MODE_REGULAR: u32 = 0o100000;
pub const MODE_SYMLINK: u32 = 0o120000;
const MODE_TYPE_MASK: u32 = 0o170000;

/// Check that an archive path is safe for extraction: relative and free of
/// parent-directory components.
fn is_safe_path(path: &Path) -> bool {
    let has_traversal = path.components().any(|c| matches!(c, Component::ParentDir));

    let path_str = path.to_string_lossy();
    let starts_with_separator = path_str.starts_with('/') || path_str.starts_with('\\');

    !has_traversal && !path.is_absolute() && !starts_with_separator
}

#[derive(Debug, PartialEq, Clone)]
pub struct FileEntry {
    pub name: String,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub file_size: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
}

impl FileEntry {
    pub fn is_trailer(&self) -> bool {
        self.name == TRAILER
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_SYMLINK
    }

    /// Parse the 110-byte header, the NUL-terminated name and the name
    /// padding. Leaves the stream positioned at the payload.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0_u8; 6];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(Error::InvalidFormat(format!(
                "incorrect magic of cpio entry {:x?}",
                magic
            )));
        }

        let ino = reader.read_hex_as_u32()?;
        let mode = reader.read_hex_as_u32()?;
        let uid = reader.read_hex_as_u32()?;
        let gid = reader.read_hex_as_u32()?;
        let nlink = reader.read_hex_as_u32()?;
        let mtime = reader.read_hex_as_u32()?;
        let file_size = reader.read_hex_as_u32()?;

        if file_size > MAX_ENTRY_SIZE {
            return Err(Error::InvalidFormat(format!(
                "cpio entry file size {} exceeds maximum {}",
                file_size, MAX_ENTRY_SIZE
            )));
        }

        let dev_major = reader.read_hex_as_u32()?;
        let dev_minor = reader.read_hex_as_u32()?;
        let rdev_major = reader.read_hex_as_u32()?;
        let rdev_minor = reader.read_hex_as_u32()?;
        let name_size = reader.read_hex_as_u32()?;

        if name_size == 0 || name_size > MAX_NAME_SIZE {
            return Err(Error::InvalidFormat(format!(
                "cpio entry name size {} out of range",
                name_size
            )));
        }

        let mut checksum = [0_u8; 8];
        reader.read_exact(&mut checksum)?;

        let mut name_bytes = vec![0_u8; name_size as usize];
        reader.read_exact(&mut name_bytes)?;
        name_bytes.pop();
        let name = String::from_utf8(name_bytes)
            .map_err(|e| Error::InvalidFormat(format!("incorrect utf8 in cpio name: {}", e)))?;

        // name padding, relative to the start of the entry
        let position = align_n_bytes(HEADER_LEN + name_size, 4);
        let mut tmp_bytes = vec![0_u8; position as usize];
        reader.read_exact(&mut tmp_bytes)?;

        Ok(FileEntry {
            name,
            ino,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            file_size,
            dev_major,
            dev_minor,
            rdev_major,
            rdev_minor,
        })
    }

    /// Emit header, name and name padding. `name_size` and the magic are
    /// derived from the entry; the payload and its padding follow
    /// separately.
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32_as_hex(self.ino)?;
        writer.write_u32_as_hex(self.mode)?;
        writer.write_u32_as_hex(self.uid)?;
        writer.write_u32_as_hex(self.gid)?;
        writer.write_u32_as_hex(self.nlink)?;
        writer.write_u32_as_hex(self.mtime)?;
        writer.write_u32_as_hex(self.file_size)?;
        writer.write_u32_as_hex(self.dev_major)?;
        writer.write_u32_as_hex(self.dev_minor)?;
        writer.write_u32_as_hex(self.rdev_major)?;
        writer.write_u32_as_hex(self.rdev_minor)?;
        let name_size = u32::try_from(self.name.len() + 1)
            .map_err(|_| Error::invalid_field("cpio name too long"))?;
        writer.write_u32_as_hex(name_size)?;
        writer.write_all(b"00000000")?;

        writer.write_all(self.name.as_bytes())?;
        writer.write_all(&[0_u8])?;

        let number = align_n_bytes(HEADER_LEN + name_size, 4) as usize;
        write_pad(writer, number)?;
        Ok(())
    }
}

impl Default for FileEntry {
    fn default() -> Self {
        FileEntry {
            name: TRAILER.to_owned(),
            ino: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 1,
            mtime: 0,
            file_size: 0,
            dev_major: 0,
            dev_minor: 0,
            rdev_major: 0,
            rdev_minor: 0,
        }
    }
}

impl TryFrom<&PathBuf> for FileEntry {
    type Error = Error;

    fn try_from(f: &PathBuf) -> Result<Self> {
        let meta = f.metadata()?;
        let name = f
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidField(format!("cannot parse path {:?} to string", f)))?
            .to_owned();

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(FileEntry {
                name,
                ino: meta.ino() as u32,
                mode: meta.mode(),
                uid: meta.uid(),
                gid: meta.gid(),
                nlink: meta.nlink() as u32,
                mtime: meta.mtime() as u32,
                file_size: meta.size() as u32,
                dev_major: major(meta.dev() as u32),
                dev_minor: minor(meta.dev() as u32),
                rdev_major: major(meta.rdev() as u32),
                rdev_minor: minor(meta.rdev() as u32),
            })
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::MetadataExt;
            Ok(FileEntry {
                name,
                ino: 1,
                mode: MODE_REGULAR | 0o644,
                uid: 0,
                gid: 0,
                nlink: 1,
                mtime: 0,
                file_size: meta.file_size() as u32,
                dev_major: 0,
                dev_minor: 0,
                rdev_major: 0,
                rdev_minor: 0,
            })
        }
    }
}

fn major(x: u32) -> u32 {
    (x >> 8) & 0x7F
}

fn minor(x: u32) -> u32 {
    x & 0xFF
}

/// Sequential newc reader over a non-seekable stream.
///
/// `read` discards whatever is left of the previous payload, parses the
/// next header and returns `None` at the trailer. `open` hands out a
/// bounded view over the current payload; the borrow ends before the next
/// `read` can run.
pub struct CpioReader<R> {
    reader: R,
    pending: u64,
}

impl<R: Read> CpioReader<R> {
    pub fn new(reader: R) -> Self {
        CpioReader { reader, pending: 0 }
    }

    pub fn read(&mut self) -> Result<Option<FileEntry>> {
        if self.pending > 0 {
            io::copy(&mut (&mut self.reader).take(self.pending), &mut io::sink())?;
            self.pending = 0;
        }

        let entry = FileEntry::read(&mut self.reader)?;
        self.pending = u64::from(entry.file_size) + u64::from(align_n_bytes(entry.file_size, 4));
        if entry.is_trailer() {
            Ok(None)
        } else {
            Ok(Some(entry))
        }
    }

    pub fn open(&mut self, entry: &FileEntry) -> PayloadReader<'_, R> {
        PayloadReader {
            remaining: entry.file_size,
            archive: self,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Bounded view over the current entry's payload.
pub struct PayloadReader<'a, R> {
    archive: &'a mut CpioReader<R>,
    remaining: u32,
}

impl<R: Read> Read for PayloadReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let limit = buf.len().min(self.remaining as usize);
        let n = self.archive.reader.read(&mut buf[..limit])?;
        self.remaining -= n as u32;
        self.archive.pending -= n as u64;
        Ok(n)
    }
}

/// List all entries of a seekable archive, skipping payloads.
pub fn read_entries<R: Read + Seek>(reader: &mut R) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    loop {
        let entry = FileEntry::read(reader)?;
        let position = align_n_bytes(entry.file_size, 4) + entry.file_size;
        reader.seek(io::SeekFrom::Current(position.into()))?;
        if entry.is_trailer() {
            break;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Read the next entry and copy its payload into `writer`.
pub fn read_entry<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<(FileEntry, u64)> {
    let entry = FileEntry::read(reader)?;
    let number = io_copy_exact(reader, writer, entry.file_size)?;
    let position = align_n_bytes(entry.file_size, 4);
    reader.seek(io::SeekFrom::Current(position.into()))?;
    Ok((entry, number.into()))
}

/// Extract the next entry below `dir`. Rejects entries whose names would
/// escape the extraction directory.
pub fn extract_entry<R: Read + Seek>(
    reader: &mut R,
    dir: &Path,
    creates_dir: bool,
    change_owner: bool,
) -> Result<(FileEntry, u64)> {
    let entry = FileEntry::read(reader)?;

    if entry.is_trailer() {
        return Ok((entry, 0));
    }

    if !is_safe_path(Path::new(&entry.name)) {
        return Err(Error::InvalidFormat(format!(
            "unsafe path in archive: {}",
            entry.name
        )));
    }

    let path = dir.join(&entry.name);
    let mut number = 0;

    if entry.is_dir() {
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }
    } else {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            if creates_dir {
                std::fs::create_dir_all(parent)?;
            } else {
                return Err(Error::InvalidFormat(format!(
                    "parent directory does not exist: {:?}",
                    parent
                )));
            }
        }

        if entry.is_symlink() {
            let mut target = Vec::new();
            io_copy_exact(reader, &mut target, entry.file_size)?;
            let target = String::from_utf8(target)
                .map_err(|e| Error::InvalidFormat(format!("incorrect utf8 in link target: {}", e)))?;
            debug!("symlink {} -> {}", entry.name, target);
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &path)?;
            #[cfg(not(unix))]
            let _ = target;
        } else {
            let mut writer = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            number = io_copy_exact(reader, &mut writer, entry.file_size)?;
        }

        let position = align_n_bytes(entry.file_size, 4);
        reader.seek(io::SeekFrom::Current(position.into()))?;
    }

    #[cfg(unix)]
    {
        if change_owner && !entry.is_symlink() {
            use nix::unistd::{Gid, Uid, chown};
            use std::os::unix::fs::PermissionsExt;

            let metadata = path.metadata()?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(entry.mode);
            std::fs::set_permissions(&path, permissions)?;
            chown(
                &path,
                Some(Uid::from_raw(entry.uid)),
                Some(Gid::from_raw(entry.gid)),
            )
            .map_err(|e| Error::InvalidField(format!("can not change owner: {}", e)))?;
        }
    }

    if !entry.is_symlink() {
        let mtime = FileTime::from_unix_time(entry.mtime.into(), 0);
        set_file_mtime(&path, mtime)?;
    }
    Ok((entry, number.into()))
}

pub fn extract_entries<R: Read + Seek>(
    reader: &mut R,
    dir: &Path,
    creates_dir: bool,
    change_owner: bool,
) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    loop {
        let (entry, _) = extract_entry(reader, dir, creates_dir, change_owner)?;
        if entry.is_trailer() {
            break;
        }
        entries.push(entry);
    }
    Ok(entries)
}

const BUFSIZE: usize = 8 * 1024;

fn io_copy_exact<R: Read, W: Write>(reader: &mut R, writer: &mut W, count: u32) -> Result<u32> {
    let mut buf = [0_u8; BUFSIZE];
    let buf_count = count as usize / BUFSIZE;
    let buf_left = count as usize % BUFSIZE;

    for _ in 0..buf_count {
        reader.read_exact(&mut buf)?;
        writer.write_all(&buf)?;
    }

    if buf_left > 0 {
        let mut buf2 = vec![0_u8; buf_left];
        reader.read_exact(&mut buf2)?;
        writer.write_all(&buf2)?;
    }

    Ok(count)
}

pub trait CpioWriter {
    fn write_cpio_entry(&mut self, entry: FileEntry) -> Result<()>;

    fn write_cpio_entry_payload<R: Read>(&mut self, reader: &mut R) -> Result<()>;

    fn write_cpio_file(&mut self, path: &PathBuf) -> Result<()> {
        let entry: FileEntry = path.try_into()?;
        self.write_cpio_entry(entry)?;
        let mut file = File::open(path)?;
        self.write_cpio_entry_payload(&mut file)
    }

    fn write_cpio_record<R: Read>(&mut self, record: FileEntry, data: &mut R) -> Result<()> {
        self.write_cpio_entry(record)?;
        self.write_cpio_entry_payload(data)
    }

    /// Terminate the archive with the `TRAILER!!!` sentinel. No further
    /// entries may be written.
    fn cpio_close(&mut self) -> Result<()> {
        self.write_cpio_entry(FileEntry::default())
    }
}

impl<W> CpioWriter for W
where
    W: Write,
{
    fn write_cpio_entry(&mut self, entry: FileEntry) -> Result<()> {
        entry.write(self)
    }

    fn write_cpio_entry_payload<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let file_size = io::copy(reader, self)? as u32;
        let number = align_n_bytes(file_size, 4) as usize;
        write_pad(self, number)?;
        Ok(())
    }
}

pub struct CpioBuilder<W: Write> {
    writer: W,
    records: Vec<(FileEntry, PathBuf)>,
}

impl<W: Write> CpioBuilder<W> {
    pub fn new(writer: W) -> Self {
        CpioBuilder {
            writer,
            records: Vec::new(),
        }
    }

    pub fn add_raw_file(mut self, path: &PathBuf) -> Result<Self> {
        let record: FileEntry = path.try_into()?;
        self.records.push((record, path.clone()));
        Ok(self)
    }

    pub fn add_file(mut self, path: &str, as_path: &str) -> Result<Self> {
        let file = PathBuf::from(path);
        let mut record: FileEntry = (&file).try_into()?;
        record.name = as_path.to_owned();
        self.records.push((record, file));
        Ok(self)
    }

    pub fn build(mut self) -> Result<()> {
        for (record, path) in self.records.into_iter() {
            let mut data = File::open(&path)?;
            self.writer.write_cpio_record(record, &mut data)?;
        }
        self.writer.cpio_close()
    }
}

impl CpioBuilder<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(CpioBuilder::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn entry(name: &str, payload_len: u32) -> FileEntry {
        FileEntry {
            name: name.to_owned(),
            ino: 1,
            mode: MODE_REGULAR | 0o644,
            nlink: 1,
            mtime: 1_600_000_000,
            file_size: payload_len,
            ..FileEntry::default()
        }
    }

    #[test]
    fn test_cpio_write_trailer_entry() -> Result<()> {
        let mut writer = Vec::new();
        writer.write_cpio_entry(FileEntry::default())?;
        let entry = FileEntry::read(&mut writer.as_slice())?;
        assert!(entry.is_trailer());
        assert_eq!(entry, FileEntry::default());
        Ok(())
    }

    #[test]
    fn test_cpio_payload_round_trip() -> Result<()> {
        let payloads: [&[u8]; 4] = [b"", b"x", b"hello\n", &[7_u8; 1000]];

        for payload in payloads {
            let mut archive = Vec::new();
            archive.write_cpio_record(
                entry("some/file", payload.len() as u32),
                &mut Cursor::new(payload),
            )?;
            archive.cpio_close()?;
            assert_eq!(archive.len() % 4, 0);

            let mut reader = CpioReader::new(archive.as_slice());
            let parsed = reader.read()?.unwrap();
            assert_eq!(parsed.name, "some/file");
            assert_eq!(parsed.file_size as usize, payload.len());

            let mut bytes = Vec::new();
            reader.open(&parsed).read_to_end(&mut bytes).unwrap();
            assert_eq!(bytes, payload);

            assert!(reader.read()?.is_none());
        }
        Ok(())
    }

    #[test]
    fn test_cpio_skips_unopened_payloads() -> Result<()> {
        let mut archive = Vec::new();
        archive.write_cpio_record(entry("a", 5), &mut Cursor::new(b"aaaaa"))?;
        archive.write_cpio_record(entry("b", 2), &mut Cursor::new(b"bb"))?;
        archive.cpio_close()?;

        let mut reader = CpioReader::new(archive.as_slice());
        assert_eq!(reader.read()?.unwrap().name, "a");
        // payload of "a" is never opened
        let b = reader.read()?.unwrap();
        assert_eq!(b.name, "b");
        let mut bytes = Vec::new();
        reader.open(&b).read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"bb");
        assert!(reader.read()?.is_none());
        Ok(())
    }

    #[test]
    fn test_cpio_rejects_incorrect_magic() {
        let data = b"070702deadbeef".to_vec();
        let result = FileEntry::read(&mut Cursor::new(data));
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_cpio_rejects_oversized_file() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        for _ in 0..6 {
            data.write_u32_as_hex(0).unwrap();
        }
        data.write_u32_as_hex(MAX_ENTRY_SIZE + 1).unwrap();

        let result = FileEntry::read(&mut Cursor::new(data));
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_cpio_rejects_oversized_name() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        for _ in 0..6 {
            data.write_u32_as_hex(0).unwrap();
        }
        data.write_u32_as_hex(100).unwrap();
        for _ in 0..4 {
            data.write_u32_as_hex(0).unwrap();
        }
        data.write_u32_as_hex(MAX_NAME_SIZE + 1).unwrap();

        let result = FileEntry::read(&mut Cursor::new(data));
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_read_entries_skips_payloads() -> Result<()> {
        let mut archive = Vec::new();
        archive.write_cpio_record(entry("first", 6), &mut Cursor::new(b"hello\n"))?;
        archive.write_cpio_record(entry("second", 3), &mut Cursor::new(b"abc"))?;
        archive.cpio_close()?;

        let entries = read_entries(&mut Cursor::new(archive))?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "first");
        assert_eq!(entries[1].name, "second");
        Ok(())
    }

    #[test]
    fn test_is_safe_path_rejects_traversal() {
        assert!(!is_safe_path(Path::new("../../etc/passwd")));
        assert!(!is_safe_path(Path::new("foo/../../../etc/passwd")));
        assert!(!is_safe_path(Path::new("/etc/passwd")));
        assert!(!is_safe_path(Path::new("foo/..")));
    }

    #[test]
    fn test_is_safe_path_accepts_relative() {
        assert!(is_safe_path(Path::new("file.txt")));
        assert!(is_safe_path(Path::new("dir/subdir/file.txt")));
        assert!(is_safe_path(Path::new("./dir/file.txt")));
        assert!(is_safe_path(Path::new("file..txt")));
    }
}
