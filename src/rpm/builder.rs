use bitflags::bitflags;
use chrono::Utc;
use log::debug;
use std::io::{self, Write};

use crate::digest::{DigestAlgo, Signer, SignatureAlgorithm, md5_parts, sha1_hex, sha256_hex};
use crate::error::{Error, Result};
use crate::header::{RType, SignatureTag, Tag, Tags};
use crate::lead::{Lead, LeadWriter};
use crate::payload::{Compressor, CpioWriter, FileEntry};
use crate::rpm::source::{FileContent, FileSource, SourceFile};
use crate::utils::{align_n_bytes, write_pad};

/// Version reported in the RPMVERSION tag.
const RPM_VERSION: &str = "4.11.3";

bitflags! {
    /// Per-file flag word of the FILEFLAGS array.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u32 {
        const CONFIG = 1;
        const DOC = 1 << 1;
        const MISSINGOK = 1 << 3;
        const NOREPLACE = 1 << 4;
        const GHOST = 1 << 6;
    }
}

bitflags! {
    /// Dependency sense bits of the REQUIREFLAGS / PROVIDEFLAGS arrays.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DependencyFlags: u32 {
        const LESS = 1 << 1;
        const GREATER = 1 << 2;
        const EQUAL = 1 << 3;
        const PREREQ = 1 << 6;
        const INTERP = 1 << 8;
        const RPMLIB = 1 << 24;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub time: u32,
    pub name: String,
    pub text: String,
}

/// Assembles a binary RPM from a [`FileSource`].
///
/// Identity goes in up front, everything else through chained setters,
/// then one `assemble` call per output file.
#[derive(Default)]
pub struct RpmBuilder {
    name: String,
    version: String,
    release: String,
    arch: Option<String>,
    os: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    license: Option<String>,
    vendor: Option<String>,
    url: Option<String>,
    group: Option<String>,
    distribution: Option<String>,
    dist_url: Option<String>,
    opt_flags: Option<String>,
    platform: Option<String>,
    source_rpm: Option<String>,
    build_time: Option<u32>,
    build_host: Option<String>,
    cookie: Option<String>,
    post_install_program: Option<String>,
    post_uninstall_program: Option<String>,
    changelog: Vec<ChangelogEntry>,
    compressor: Compressor,
    digest_algo: DigestAlgo,
    signer: Option<Box<dyn Signer>>,
}

impl RpmBuilder {
    pub fn new<S: Into<String>>(name: S, version: S, release: S) -> Self {
        RpmBuilder {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            ..Default::default()
        }
    }

    pub fn arch<S: Into<String>>(mut self, arch: S) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn os<S: Into<String>>(mut self, os: S) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn summary<S: Into<String>>(mut self, summary: S) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn license<S: Into<String>>(mut self, license: S) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn vendor<S: Into<String>>(mut self, vendor: S) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn distribution<S: Into<String>>(mut self, distribution: S) -> Self {
        self.distribution = Some(distribution.into());
        self
    }

    pub fn dist_url<S: Into<String>>(mut self, dist_url: S) -> Self {
        self.dist_url = Some(dist_url.into());
        self
    }

    pub fn opt_flags<S: Into<String>>(mut self, opt_flags: S) -> Self {
        self.opt_flags = Some(opt_flags.into());
        self
    }

    pub fn platform<S: Into<String>>(mut self, platform: S) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn source_rpm<S: Into<String>>(mut self, source_rpm: S) -> Self {
        self.source_rpm = Some(source_rpm.into());
        self
    }

    /// Seconds since the epoch. An explicit build time makes the output
    /// byte-reproducible.
    pub fn build_time(mut self, build_time: u32) -> Self {
        self.build_time = Some(build_time);
        self
    }

    pub fn build_host<S: Into<String>>(mut self, build_host: S) -> Self {
        self.build_host = Some(build_host.into());
        self
    }

    pub fn cookie<S: Into<String>>(mut self, cookie: S) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn post_install_program<S: Into<String>>(mut self, program: S) -> Self {
        self.post_install_program = Some(program.into());
        self
    }

    pub fn post_uninstall_program<S: Into<String>>(mut self, program: S) -> Self {
        self.post_uninstall_program = Some(program.into());
        self
    }

    pub fn changelog_entry(mut self, entry: ChangelogEntry) -> Self {
        self.changelog.push(entry);
        self
    }

    pub fn compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn digest_algo(mut self, digest_algo: DigestAlgo) -> Self {
        self.digest_algo = digest_algo;
        self
    }

    pub fn signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Run the whole pipeline and write the finished package to `out`.
    ///
    /// Callers wanting atomic output should hand in a temp file and rename
    /// it afterwards; nothing is unwritten on error.
    pub fn assemble<S: FileSource, W: Write>(&self, source: &S, out: &mut W) -> Result<()> {
        let mut files = source.files()?;
        files.sort_by(|a, b| a.archive_path().cmp(&b.archive_path()));

        debug!("assembling {} files into {}", files.len(), self.nvr());
        let (stats, compressed) = self.write_payload(&files)?;

        let header = self.build_header(&stats)?;
        let mut header_blob = Vec::new();
        header.write_section(&mut header_blob)?;

        let signature = self.build_signature(&header_blob, &compressed, stats.archive_size)?;
        let mut signature_blob = Vec::new();
        let signature_len = signature.write_section(&mut signature_blob)?;

        let lead = Lead::new(
            &self.nvr(),
            self.arch.as_deref().unwrap_or("noarch"),
            self.os.as_deref().unwrap_or("linux"),
        );

        out.write_lead(&lead)?;
        out.write_all(&signature_blob)?;
        write_pad(out, align_n_bytes(signature_len as u32, 8) as usize)?;
        out.write_all(&header_blob)?;
        out.write_all(&compressed)?;
        Ok(())
    }

    fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }

    /// Phase 1 and 2: emit the CPIO archive straight into the compressor,
    /// collecting per-file statistics on the way through.
    fn write_payload(&self, files: &[SourceFile]) -> Result<(PayloadStats, Vec<u8>)> {
        let mut stats = PayloadStats::default();
        let mut compressed = Vec::new();
        let encoder = self.compressor.writer(&mut compressed)?;
        let mut counter = CountWriter::new(encoder);

        for (i, file) in files.iter().enumerate() {
            let payload = file.payload();
            let file_size = u32::try_from(payload.len())
                .map_err(|_| Error::InvalidField(format!("file too large: {}", file.path)))?;
            let is_dir = matches!(file.content, FileContent::Directory);
            let ino = (i + 1) as u32;

            let entry = FileEntry {
                name: file.archive_path(),
                ino,
                mode: file.full_mode(),
                uid: 0,
                gid: 0,
                nlink: if is_dir { 2 } else { 1 },
                mtime: file.mtime,
                file_size,
                ..FileEntry::default()
            };
            counter.write_cpio_record(entry, &mut io::Cursor::new(payload))?;

            stats.push(file, file_size, ino, self.digest_algo);
        }
        counter.cpio_close()?;

        stats.archive_size = counter.count;
        counter.into_inner().finish()?;
        debug!(
            "payload: {} bytes cpio, {} bytes compressed",
            stats.archive_size,
            compressed.len()
        );
        Ok((stats, compressed))
    }

    /// Phase 3: the header store, populated in canonical tag order.
    fn build_header(&self, stats: &PayloadStats) -> Result<Tags<Tag>> {
        let build_time = self.build_time.unwrap_or_else(now);
        let build_host = self.build_host.clone().unwrap_or_else(default_host);
        let cookie = self
            .cookie
            .clone()
            .unwrap_or_else(|| format!("{} {}", build_host, build_time));
        let arch = self.arch.as_deref().unwrap_or("noarch");

        let mut header = Tags::new();
        header.mark_immutable();
        header.insert(
            Tag::HeaderI18nTable,
            RType::StringArray(vec!["C".to_owned()]),
        )?;
        header.insert(Tag::Name, RType::String(self.name.clone()))?;
        header.insert(Tag::Version, RType::String(self.version.clone()))?;
        header.insert(Tag::Release, RType::String(self.release.clone()))?;
        if let Some(summary) = &self.summary {
            header.insert(Tag::Summary, RType::I18nstring(summary.clone()))?;
        }
        if let Some(description) = &self.description {
            header.insert(Tag::Description, RType::I18nstring(description.clone()))?;
        }
        header.insert(Tag::BuildTime, RType::Int32(build_time))?;
        header.insert(Tag::BuildHost, RType::String(build_host))?;
        header.insert(Tag::Size, RType::Int32(stats.total_size()?))?;
        if let Some(distribution) = &self.distribution {
            header.insert(Tag::Distribution, RType::String(distribution.clone()))?;
        }
        if let Some(vendor) = &self.vendor {
            header.insert(Tag::Vendor, RType::String(vendor.clone()))?;
        }
        if let Some(license) = &self.license {
            header.insert(Tag::License, RType::String(license.clone()))?;
        }
        if let Some(group) = &self.group {
            header.insert(Tag::Group, RType::I18nstring(group.clone()))?;
        }
        if let Some(url) = &self.url {
            header.insert(Tag::Url, RType::String(url.clone()))?;
        }
        header.insert(Tag::Os, RType::String(self.os.clone().unwrap_or_else(|| "linux".to_owned())))?;
        header.insert(Tag::Arch, RType::String(arch.to_owned()))?;

        if !stats.sizes.is_empty() {
            header.insert(Tag::FileSizes, RType::Int32Array(stats.sizes.clone()))?;
            header.insert(Tag::FileModes, RType::Int16Array(stats.modes.clone()))?;
            header.insert(Tag::FileRDevs, RType::Int16Array(stats.rdevs.clone()))?;
            header.insert(Tag::FileMTimes, RType::Int32Array(stats.mtimes.clone()))?;
            header.insert(Tag::FileDigests, RType::StringArray(stats.digests.clone()))?;
            header.insert(Tag::FileLinkTos, RType::StringArray(stats.linktos.clone()))?;
            header.insert(Tag::FileFlags, RType::Int32Array(stats.flags.clone()))?;
            header.insert(Tag::FileUserName, RType::StringArray(stats.users.clone()))?;
            header.insert(Tag::FileGroupName, RType::StringArray(stats.groups.clone()))?;
        }
        if let Some(source_rpm) = &self.source_rpm {
            header.insert(Tag::SourceRpm, RType::String(source_rpm.clone()))?;
        }
        if !stats.sizes.is_empty() {
            header.insert(
                Tag::FileVerifyFlags,
                RType::Int32Array(stats.verify_flags.clone()),
            )?;
        }

        header.insert(
            Tag::ProvideName,
            RType::StringArray(vec![self.name.clone()]),
        )?;
        let requires = self.rpmlib_requires();
        header.insert(
            Tag::RequireFlags,
            RType::Int32Array(vec![
                (DependencyFlags::LESS | DependencyFlags::EQUAL | DependencyFlags::RPMLIB)
                    .bits();
                requires.len()
            ]),
        )?;
        header.insert(
            Tag::RequireName,
            RType::StringArray(requires.iter().map(|(n, _)| (*n).to_owned()).collect()),
        )?;
        header.insert(
            Tag::RequireVersion,
            RType::StringArray(requires.iter().map(|(_, v)| (*v).to_owned()).collect()),
        )?;
        header.insert(Tag::RpmVersion, RType::String(RPM_VERSION.to_owned()))?;

        if !self.changelog.is_empty() {
            header.insert(
                Tag::ChangelogTime,
                RType::Int32Array(self.changelog.iter().map(|e| e.time).collect()),
            )?;
            header.insert(
                Tag::ChangelogName,
                RType::StringArray(self.changelog.iter().map(|e| e.name.clone()).collect()),
            )?;
            header.insert(
                Tag::ChangelogText,
                RType::StringArray(self.changelog.iter().map(|e| e.text.clone()).collect()),
            )?;
        }
        if let Some(program) = &self.post_install_program {
            header.insert(Tag::PostInProg, RType::String(program.clone()))?;
        }
        if let Some(program) = &self.post_uninstall_program {
            header.insert(Tag::PostUnProg, RType::String(program.clone()))?;
        }
        header.insert(Tag::Cookie, RType::String(cookie))?;

        if !stats.sizes.is_empty() {
            header.insert(Tag::FileDevices, RType::Int32Array(stats.devices.clone()))?;
            header.insert(Tag::FileInodes, RType::Int32Array(stats.inodes.clone()))?;
            header.insert(Tag::FileLangs, RType::StringArray(stats.langs.clone()))?;
        }

        header.insert(
            Tag::ProvideFlags,
            RType::Int32Array(vec![DependencyFlags::EQUAL.bits()]),
        )?;
        header.insert(
            Tag::ProvideVersion,
            RType::StringArray(vec![format!("{}-{}", self.version, self.release)]),
        )?;

        if !stats.sizes.is_empty() {
            header.insert(
                Tag::DirIndexes,
                RType::Int32Array(stats.dir_indexes.clone()),
            )?;
            header.insert(Tag::BaseNames, RType::StringArray(stats.basenames.clone()))?;
            header.insert(Tag::DirNames, RType::StringArray(stats.dirnames.clone()))?;
        }
        if let Some(opt_flags) = &self.opt_flags {
            header.insert(Tag::OptFlags, RType::String(opt_flags.clone()))?;
        }
        if let Some(dist_url) = &self.dist_url {
            header.insert(Tag::DistUrl, RType::String(dist_url.clone()))?;
        }

        header.insert(Tag::PayloadFormat, RType::String("cpio".to_owned()))?;
        header.insert(
            Tag::PayloadCompressor,
            RType::String(self.compressor.name().to_owned()),
        )?;
        header.insert(Tag::PayloadFlags, RType::String(self.compressor.flags()))?;
        header.insert(
            Tag::Platform,
            RType::String(
                self.platform
                    .clone()
                    .unwrap_or_else(|| format!("{}-redhat-linux", arch)),
            ),
        )?;
        if !stats.sizes.is_empty() {
            header.insert(Tag::FileColors, RType::Int32Array(stats.colors.clone()))?;
        }
        header.insert(
            Tag::FileDigestAlgo,
            RType::Int32(self.digest_algo.code()),
        )?;
        Ok(header)
    }

    /// Phase 4: signature store over the header blob and compressed
    /// payload.
    fn build_signature(
        &self,
        header_blob: &[u8],
        compressed: &[u8],
        archive_size: u64,
    ) -> Result<Tags<SignatureTag>> {
        let mut signature = Tags::new();
        signature.mark_immutable();

        let combined = header_blob.len() as u64 + compressed.len() as u64;
        signature.insert(SignatureTag::Size, RType::Int32(into_u32(combined)?))?;
        signature.insert(
            SignatureTag::Md5,
            RType::Bin(md5_parts(&[header_blob, compressed])),
        )?;
        signature.insert(
            SignatureTag::Sha1Header,
            RType::String(sha1_hex(header_blob)),
        )?;
        signature.insert(
            SignatureTag::Sha256Header,
            RType::String(sha256_hex(header_blob)),
        )?;
        signature.insert(
            SignatureTag::PayloadSize,
            RType::Int32(into_u32(archive_size)?),
        )?;

        if let Some(signer) = &self.signer {
            let header_signature = signer.sign(header_blob)?;
            let mut whole = Vec::with_capacity(header_blob.len() + compressed.len());
            whole.extend_from_slice(header_blob);
            whole.extend_from_slice(compressed);
            let whole_signature = signer.sign(&whole)?;

            match signer.algorithm() {
                SignatureAlgorithm::Rsa => {
                    signature.insert(SignatureTag::RsaHeader, RType::Bin(header_signature))?;
                    signature.insert(SignatureTag::Pgp, RType::Bin(whole_signature))?;
                }
                SignatureAlgorithm::Dsa => {
                    signature.insert(SignatureTag::DsaHeader, RType::Bin(header_signature))?;
                    signature.insert(SignatureTag::Gpg, RType::Bin(whole_signature))?;
                }
            }
        }
        Ok(signature)
    }

    /// rpmlib capabilities the produced package depends on, in ascending
    /// name order.
    fn rpmlib_requires(&self) -> Vec<(&'static str, &'static str)> {
        let mut requires = vec![("rpmlib(CompressedFileNames)", "3.0.4-1")];
        if self.digest_algo == DigestAlgo::Sha256 {
            requires.push(("rpmlib(FileDigests)", "4.6.0-1"));
        }
        requires.push(("rpmlib(PayloadFilesHavePrefix)", "4.0-1"));
        if matches!(self.compressor, Compressor::Xz(_)) {
            requires.push(("rpmlib(PayloadIsXz)", "5.2-1"));
        }
        requires
    }
}

fn now() -> u32 {
    Utc::now().timestamp() as u32
}

fn default_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_owned())
}

fn into_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid_field("size exceeds u32 range"))
}

/// Per-file columns observed while the archive is emitted.
#[derive(Default)]
struct PayloadStats {
    archive_size: u64,
    sizes: Vec<u32>,
    modes: Vec<u16>,
    rdevs: Vec<u16>,
    mtimes: Vec<u32>,
    digests: Vec<String>,
    linktos: Vec<String>,
    flags: Vec<u32>,
    users: Vec<String>,
    groups: Vec<String>,
    verify_flags: Vec<u32>,
    devices: Vec<u32>,
    inodes: Vec<u32>,
    langs: Vec<String>,
    colors: Vec<u32>,
    dir_indexes: Vec<u32>,
    basenames: Vec<String>,
    dirnames: Vec<String>,
}

impl PayloadStats {
    fn push(&mut self, file: &SourceFile, file_size: u32, ino: u32, algo: DigestAlgo) {
        let (dirname, basename) = file.split_path();
        let dir_index = match self.dirnames.iter().position(|d| *d == dirname) {
            Some(at) => at as u32,
            None => {
                self.dirnames.push(dirname);
                (self.dirnames.len() - 1) as u32
            }
        };

        let (digest, linkto) = match &file.content {
            FileContent::Regular(bytes) => (algo.hex_digest(bytes), String::new()),
            FileContent::Directory => (String::new(), String::new()),
            FileContent::Symlink(target) => (String::new(), target.clone()),
        };

        self.sizes.push(file_size);
        self.modes.push(file.full_mode() as u16);
        self.rdevs.push(0);
        self.mtimes.push(file.mtime);
        self.digests.push(digest);
        self.linktos.push(linkto);
        self.flags.push(FileFlags::empty().bits());
        self.users.push("root".to_owned());
        self.groups.push("root".to_owned());
        self.verify_flags.push(u32::MAX);
        self.devices.push(1);
        self.inodes.push(ino);
        self.langs.push(String::new());
        self.colors.push(0);
        self.dir_indexes.push(dir_index);
        self.basenames.push(basename);
    }

    fn total_size(&self) -> Result<u32> {
        into_u32(self.sizes.iter().map(|s| u64::from(*s)).sum())
    }
}

/// Counts bytes on their way into the compressor; the count is the
/// uncompressed archive size the signature section reports.
struct CountWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountWriter<W> {
    fn new(inner: W) -> Self {
        CountWriter { inner, count: 0 }
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpmlib_requires_default_set() {
        let builder = RpmBuilder::new("a", "1", "1");
        let names: Vec<&str> = builder.rpmlib_requires().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "rpmlib(CompressedFileNames)",
                "rpmlib(FileDigests)",
                "rpmlib(PayloadFilesHavePrefix)",
                "rpmlib(PayloadIsXz)",
            ]
        );
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_rpmlib_requires_follow_configuration() {
        let builder = RpmBuilder::new("a", "1", "1")
            .digest_algo(DigestAlgo::Md5)
            .compressor(Compressor::Gzip(9));
        let names: Vec<&str> = builder.rpmlib_requires().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "rpmlib(CompressedFileNames)",
                "rpmlib(PayloadFilesHavePrefix)",
            ]
        );
    }

    #[test]
    fn test_dependency_flags_value() {
        let flags = DependencyFlags::LESS | DependencyFlags::EQUAL | DependencyFlags::RPMLIB;
        assert_eq!(flags.bits(), 16_777_226);
    }

    #[test]
    fn test_stats_dir_indexes() {
        let mut stats = PayloadStats::default();
        let files = [
            SourceFile::file("a/x", 0o644, b"1".to_vec()),
            SourceFile::file("a/y", 0o644, b"2".to_vec()),
            SourceFile::file("b/z", 0o644, b"3".to_vec()),
        ];
        for (i, file) in files.iter().enumerate() {
            stats.push(file, 1, (i + 1) as u32, DigestAlgo::Md5);
        }
        assert_eq!(stats.dirnames, vec!["./a/", "./b/"]);
        assert_eq!(stats.basenames, vec!["x", "y", "z"]);
        assert_eq!(stats.dir_indexes, vec![0, 0, 1]);
    }
}
