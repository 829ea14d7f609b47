use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::payload::{MODE_DIR, MODE_REGULAR, MODE_SYMLINK};

/// Payload of one filesystem object handed to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Regular(Vec<u8>),
    Directory,
    Symlink(String),
}

/// One object of the publish tree, rooted at the install prefix.
///
/// `mode` carries permission bits only; the file-type bits follow from
/// `content`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub mode: u32,
    pub mtime: u32,
    pub content: FileContent,
}

impl SourceFile {
    pub fn file<P: Into<String>>(path: P, mode: u32, content: Vec<u8>) -> Self {
        SourceFile {
            path: path.into(),
            mode,
            mtime: 0,
            content: FileContent::Regular(content),
        }
    }

    pub fn dir<P: Into<String>>(path: P, mode: u32) -> Self {
        SourceFile {
            path: path.into(),
            mode,
            mtime: 0,
            content: FileContent::Directory,
        }
    }

    pub fn symlink<P: Into<String>, T: Into<String>>(path: P, target: T) -> Self {
        SourceFile {
            path: path.into(),
            mode: 0o777,
            mtime: 0,
            content: FileContent::Symlink(target.into()),
        }
    }

    pub fn with_mtime(mut self, mtime: u32) -> Self {
        self.mtime = mtime;
        self
    }

    /// Full mode word: file-type bits from the content kind plus the
    /// permission bits.
    pub fn full_mode(&self) -> u32 {
        let kind = match self.content {
            FileContent::Regular(_) => MODE_REGULAR,
            FileContent::Directory => MODE_DIR,
            FileContent::Symlink(_) => MODE_SYMLINK,
        };
        kind | (self.mode & 0o7777)
    }

    /// Archive path with the `./` prefix payload entries carry.
    pub fn archive_path(&self) -> String {
        let trimmed = self
            .path
            .trim_start_matches("./")
            .trim_start_matches('/');
        format!("./{}", trimmed)
    }

    /// Split the archive path into `(dirname, basename)`; the dirname
    /// keeps its trailing slash.
    pub fn split_path(&self) -> (String, String) {
        let path = self.archive_path();
        match path.rfind('/') {
            Some(at) => (path[..=at].to_owned(), path[at + 1..].to_owned()),
            None => ("./".to_owned(), path),
        }
    }

    /// Bytes that end up in the CPIO payload for this object.
    pub fn payload(&self) -> &[u8] {
        match &self.content {
            FileContent::Regular(bytes) => bytes,
            FileContent::Directory => &[],
            FileContent::Symlink(target) => target.as_bytes(),
        }
    }
}

/// Where the assembler gets its payload from. Implementations yield
/// objects rooted at the install prefix; the assembler orders them by
/// path before emission.
pub trait FileSource {
    fn files(&self) -> Result<Vec<SourceFile>>;
}

impl FileSource for Vec<SourceFile> {
    fn files(&self) -> Result<Vec<SourceFile>> {
        Ok(self.clone())
    }
}

impl FileSource for &[SourceFile] {
    fn files(&self) -> Result<Vec<SourceFile>> {
        Ok(self.to_vec())
    }
}

/// Publish directory walked from disk.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirSource {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl FileSource for DirSource {
    fn files(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(io::Error::from)?;
            let path = entry.path();
            if path == self.root {
                continue;
            }

            let relative = path
                .strip_prefix(&self.root)
                .map_err(|e| Error::InvalidField(e.to_string()))?
                .to_string_lossy()
                .into_owned();

            let meta = entry.metadata().map_err(io::Error::from)?;
            let mode = permissions_of(&meta);
            let mtime = mtime_of(&meta);

            let content = if entry.path_is_symlink() {
                let target = fs::read_link(path)?.to_string_lossy().into_owned();
                FileContent::Symlink(target)
            } else if meta.is_dir() {
                FileContent::Directory
            } else {
                FileContent::Regular(fs::read(path)?)
            };

            files.push(SourceFile {
                path: relative,
                mode,
                mtime,
                content,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[cfg(unix)]
fn permissions_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions_of(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() { 0o755 } else { 0o644 }
}

#[cfg(unix)]
fn mtime_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() as u32
}

#[cfg(not(unix))]
fn mtime_of(_meta: &fs::Metadata) -> u32 {
    0
}
