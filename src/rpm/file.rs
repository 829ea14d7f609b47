use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::digest::{md5_parts, sha1_hex, sha256_hex};
use crate::error::{Error, Result};
use crate::header::{SignatureTag, Tag, Tags, read_section};
use crate::lead::Lead;
use crate::payload::{FileEntry, decompress_reader, read_entries};
use crate::utils::align_n_bytes;

/// A parsed package: lead, both tag sections and the position of the
/// compressed payload. The inverse of the assembler, used for
/// verification and inspection.
#[derive(Debug)]
pub struct RpmFile<T> {
    pub lead: Lead,
    pub signature_tags: Tags<SignatureTag>,
    pub header_tags: Tags<Tag>,
    pub header_offset: u64,
    pub payload_offset: u64,
    pub file: T,
}

impl RpmFile<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::read(file)
    }
}

impl<T: 'static + Read + Seek> RpmFile<T> {
    pub fn read(mut reader: T) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let lead = Lead::read(&mut reader)?;

        let (signature_tags, signature_size) = read_section::<_, SignatureTag>(&mut reader)?;

        // the header begins on an 8-byte boundary
        let pad = align_n_bytes(signature_size, 8);
        reader.seek(SeekFrom::Current(pad.into()))?;

        let header_offset = reader.stream_position()?;
        let (header_tags, _) = read_section::<_, Tag>(&mut reader)?;
        let payload_offset = reader.stream_position()?;

        Ok(RpmFile {
            lead,
            signature_tags,
            header_tags,
            header_offset,
            payload_offset,
            file: reader,
        })
    }

    /// Recompute every digest the signature section carries and compare.
    pub fn verify_digests(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.header_offset))?;
        let header_len = (self.payload_offset - self.header_offset) as usize;
        let mut header_blob = vec![0_u8; header_len];
        self.file.read_exact(&mut header_blob)?;
        let mut payload = Vec::new();
        self.file.read_to_end(&mut payload)?;

        let sha1 = self.signature_tags.get_as_string(SignatureTag::Sha1Header);
        if !sha1.is_empty() && sha1 != sha1_hex(&header_blob) {
            return Err(Error::DigestMismatch("header sha1 differs".to_owned()));
        }

        let sha256 = self.signature_tags.get_as_string(SignatureTag::Sha256Header);
        if !sha256.is_empty() && sha256 != sha256_hex(&header_blob) {
            return Err(Error::DigestMismatch("header sha256 differs".to_owned()));
        }

        let md5 = self.signature_tags.get_as_bin(SignatureTag::Md5);
        if !md5.is_empty() && md5 != md5_parts(&[&header_blob, &payload]) {
            return Err(Error::DigestMismatch(
                "header and payload md5 differs".to_owned(),
            ));
        }

        if let Some(size) = self.signature_tags.get(SignatureTag::Size).and_then(|v| v.as_u64())
            && size != (header_len + payload.len()) as u64
        {
            return Err(Error::DigestMismatch(format!(
                "signature size {} != {}",
                size,
                header_len + payload.len()
            )));
        }

        if let Some(payload_size) = self
            .signature_tags
            .get(SignatureTag::PayloadSize)
            .and_then(|v| v.as_u64())
        {
            let compressor = self.header_tags.get_as_string(Tag::PayloadCompressor);
            let mut reader = decompress_reader(&compressor, io::Cursor::new(&payload))?;
            let uncompressed = io::copy(&mut reader, &mut io::sink())?;
            if payload_size != uncompressed {
                return Err(Error::DigestMismatch(format!(
                    "payload size {} != {}",
                    payload_size, uncompressed
                )));
            }
        }

        debug!("all stored digests verified");
        Ok(())
    }

    /// Decompress the payload into memory.
    pub fn payload_decompressed(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(self.payload_offset))?;
        let compressor = self.header_tags.get_as_string(Tag::PayloadCompressor);
        let mut reader = decompress_reader(&compressor, &mut self.file)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// List the CPIO entries of the payload.
    pub fn files(&mut self) -> Result<Vec<FileEntry>> {
        let payload = self.payload_decompressed()?;
        read_entries(&mut io::Cursor::new(payload))
    }

    /// Write the decompressed payload (a CPIO archive) to `path`.
    pub fn copy_payload(self, path: &Path) -> Result<u64> {
        let mut writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut reader = self.into_uncompress_reader()?;
        Ok(io::copy(&mut reader, &mut writer)?)
    }

    fn into_uncompress_reader(mut self) -> Result<Box<dyn Read>> {
        self.file.seek(SeekFrom::Start(self.payload_offset))?;

        let compressor = self.header_tags.get_as_string(Tag::PayloadCompressor);
        if compressor.is_empty() {
            return Err(Error::invalid_format("payload compressor is not defined"));
        }
        decompress_reader(&compressor, self.file)
    }
}
