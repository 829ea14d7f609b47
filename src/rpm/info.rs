use chrono::{Local, TimeZone};
use itertools::multizip;
use std::fmt;
use std::io::{Read, Seek};

use crate::header::{SignatureTag, Tag};
use crate::payload::{FileInfo, RpmPayload};
use crate::rpm::file::RpmFile;

/// Summary of a package assembled from its tag stores, rendered the way
/// `rpm -qi` prints it.
#[derive(Debug, Default)]
pub struct RpmInfo {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub group: String,
    pub size: u64,
    pub license: String,
    pub source_rpm: String,
    pub build_time: i64,
    pub build_host: String,
    pub summary: String,
    pub description: String,
    pub payload: RpmPayload,
}

impl fmt::Display for RpmInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let build_time = Local
            .timestamp_opt(self.build_time, 0)
            .single()
            .map(|t| t.format("%c").to_string())
            .unwrap_or_default();

        writeln!(f, "Name        : {}", self.name)?;
        writeln!(f, "Version     : {}", self.version)?;
        writeln!(f, "Release     : {}", self.release)?;
        writeln!(f, "Architecture: {}", self.arch)?;
        writeln!(f, "Group       : {}", self.group)?;
        writeln!(f, "Size        : {}", self.size)?;
        writeln!(f, "License     : {}", self.license)?;
        writeln!(f, "Source RPM  : {}", self.source_rpm)?;
        writeln!(f, "Build Date  : {}", build_time)?;
        writeln!(f, "Build Host  : {}", self.build_host)?;
        writeln!(f, "Summary     : {}", self.summary)?;
        writeln!(f, "Description : \n{}", self.description)
    }
}

impl<T: Read + Seek> From<&RpmFile<T>> for RpmInfo {
    fn from(rpm: &RpmFile<T>) -> Self {
        let RpmFile {
            signature_tags,
            header_tags,
            ..
        } = rpm;

        let dirs = header_tags.get_as_string_array(Tag::DirNames);
        let dir_indexes = header_tags.get_as_u32_array(Tag::DirIndexes);
        let basenames = header_tags.get_as_string_array(Tag::BaseNames);
        let filesizes = header_tags.get_as_u64_array(Tag::FileSizes);
        let users = header_tags.get_as_string_array(Tag::FileUserName);
        let groups = header_tags.get_as_string_array(Tag::FileGroupName);
        let flags = header_tags.get_as_u32_array(Tag::FileFlags);
        let mtimes = header_tags.get_as_u32_array(Tag::FileMTimes);
        let linknames = header_tags.get_as_string_array(Tag::FileLinkTos);
        let modes = header_tags.get_as_u16_array(Tag::FileModes);
        let devices = header_tags.get_as_u32_array(Tag::FileDevices);
        let inodes = header_tags.get_as_u32_array(Tag::FileInodes);
        let digests = header_tags.get_as_string_array(Tag::FileDigests);

        let files: Vec<FileInfo> = multizip((
            basenames,
            dir_indexes,
            filesizes,
            users,
            groups,
            linknames,
            digests,
        ))
        .enumerate()
        .map(
            |(i, (name, index, size, user, group, linkname, digest))| FileInfo {
                name: dirs.get(index as usize).cloned().unwrap_or_default() + &name,
                size,
                user,
                group,
                flags: flags.get(i).copied().unwrap_or_default(),
                mtime: mtimes.get(i).copied().unwrap_or_default(),
                digest,
                mode: modes.get(i).copied().unwrap_or_default(),
                linkname,
                device: devices.get(i).copied().unwrap_or_default(),
                inode: inodes.get(i).copied().unwrap_or_default(),
            },
        )
        .collect();

        let payload = RpmPayload {
            size: signature_tags.get_as_u64(SignatureTag::PayloadSize),
            format: header_tags.get_as_string(Tag::PayloadFormat),
            compressor: header_tags.get_as_string(Tag::PayloadCompressor),
            flags: header_tags.get_as_string(Tag::PayloadFlags),
            files,
        };

        RpmInfo {
            name: header_tags.get_as_string(Tag::Name),
            version: header_tags.get_as_string(Tag::Version),
            release: header_tags.get_as_string(Tag::Release),
            arch: header_tags.get_as_string(Tag::Arch),
            group: header_tags.get_as_string(Tag::Group),
            size: header_tags.get_as_u64(Tag::Size),
            license: header_tags.get_as_string(Tag::License),
            source_rpm: header_tags.get_as_string(Tag::SourceRpm),
            build_time: header_tags.get_as_i64(Tag::BuildTime),
            build_host: header_tags.get_as_string(Tag::BuildHost),
            summary: header_tags.get_as_string(Tag::Summary),
            description: header_tags.get_as_string(Tag::Description),
            payload,
        }
    }
}
