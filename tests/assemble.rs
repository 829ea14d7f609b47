use std::io::{Cursor, Read};

use rpm_pack::header::{SignatureTag, Tag};
use rpm_pack::payload::CpioReader;
use rpm_pack::{
    Compressor, DigestAlgo, FileContent, Result, RpmBuilder, RpmFile, RpmInfo, SignatureAlgorithm,
    Signer, SourceFile,
};

const BUILD_TIME: u32 = 1_700_000_000;

fn assemble(builder: &RpmBuilder, files: Vec<SourceFile>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    builder.assemble(&files, &mut out)?;
    Ok(out)
}

fn open(bytes: &[u8]) -> Result<RpmFile<Cursor<Vec<u8>>>> {
    RpmFile::read(Cursor::new(bytes.to_vec()))
}

#[test]
fn empty_package() -> Result<()> {
    let builder = RpmBuilder::new("empty", "1.0", "1")
        .arch("noarch")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let bytes = assemble(&builder, Vec::new())?;

    let mut rpm = open(&bytes)?;
    assert_eq!(rpm.lead.name_str(), "empty-1.0-1");
    assert_eq!(rpm.header_tags.get_as_u64(Tag::Size), 0);
    assert!(rpm.header_tags.get(Tag::BaseNames).is_none());
    assert!(rpm.header_tags.get(Tag::DirNames).is_none());

    // payload holds nothing but the trailer
    assert!(rpm.files()?.is_empty());
    rpm.verify_digests()?;
    Ok(())
}

#[test]
fn single_file_package() -> Result<()> {
    let builder = RpmBuilder::new("single", "1.0", "1")
        .arch("x86_64")
        .build_time(BUILD_TIME)
        .build_host("buildhost")
        .digest_algo(DigestAlgo::Md5);
    let files = vec![SourceFile::file(
        "/usr/share/empty/readme.txt",
        0o644,
        b"hello\n".to_vec(),
    )];
    let bytes = assemble(&builder, files)?;

    let mut rpm = open(&bytes)?;
    assert_eq!(rpm.header_tags.get_as_u32_array(Tag::FileSizes), vec![6]);
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::FileDigests),
        vec!["b1946ac92492d2347c6235b4d2611184"]
    );
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::BaseNames),
        vec!["readme.txt"]
    );
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::DirNames),
        vec!["./usr/share/empty/"]
    );
    assert_eq!(rpm.header_tags.get_as_u32_array(Tag::DirIndexes), vec![0]);
    assert_eq!(rpm.header_tags.get_as_u64(Tag::Size), 6);
    assert_eq!(rpm.header_tags.get_as_u32(Tag::FileDigestAlgo), 1);

    let listed = rpm.files()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "./usr/share/empty/readme.txt");

    rpm.verify_digests()?;
    Ok(())
}

#[test]
fn nested_directories() -> Result<()> {
    let builder = RpmBuilder::new("nested", "2.0", "3")
        .arch("x86_64")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let files = vec![
        SourceFile::file("./a/x", 0o644, b"x".to_vec()),
        SourceFile::file("./a/y", 0o644, b"y".to_vec()),
        SourceFile::file("./b/z", 0o644, b"z".to_vec()),
    ];
    let bytes = assemble(&builder, files)?;

    let rpm = open(&bytes)?;
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::DirNames),
        vec!["./a/", "./b/"]
    );
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::BaseNames),
        vec!["x", "y", "z"]
    );
    assert_eq!(
        rpm.header_tags.get_as_u32_array(Tag::DirIndexes),
        vec![0, 0, 1]
    );
    Ok(())
}

#[test]
fn symlink_entry() -> Result<()> {
    let builder = RpmBuilder::new("links", "1.0", "1")
        .arch("noarch")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let files = vec![
        SourceFile::file("usr/bin/real", 0o755, b"#!/bin/sh\n".to_vec()),
        SourceFile::symlink("usr/bin/link", "../real"),
    ];
    let bytes = assemble(&builder, files)?;

    let rpm = open(&bytes)?;
    let linktos = rpm.header_tags.get_as_string_array(Tag::FileLinkTos);
    let digests = rpm.header_tags.get_as_string_array(Tag::FileDigests);
    let sizes = rpm.header_tags.get_as_u32_array(Tag::FileSizes);
    let basenames = rpm.header_tags.get_as_string_array(Tag::BaseNames);

    let at = basenames.iter().position(|b| b == "link").unwrap();
    assert_eq!(linktos[at], "../real");
    assert_eq!(digests[at], "");
    assert_eq!(sizes[at], "../real".len() as u32);
    Ok(())
}

#[test]
fn digest_consistency() -> Result<()> {
    let builder = RpmBuilder::new("digests", "1.0", "1")
        .arch("x86_64")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let files = vec![SourceFile::file("opt/data", 0o644, vec![42_u8; 4096])];
    let bytes = assemble(&builder, files)?;

    let mut rpm = open(&bytes)?;

    let header_and_payload = &bytes[rpm.header_offset as usize..];
    assert_eq!(
        rpm.signature_tags.get_as_u64(SignatureTag::Size),
        header_and_payload.len() as u64
    );

    let header_blob = &bytes[rpm.header_offset as usize..rpm.payload_offset as usize];
    let payload = &bytes[rpm.payload_offset as usize..];
    assert_eq!(
        rpm.signature_tags.get_as_bin(SignatureTag::Md5),
        rpm_pack::digest::md5_parts(&[header_blob, payload])
    );
    assert_eq!(
        rpm.signature_tags.get_as_string(SignatureTag::Sha1Header),
        rpm_pack::digest::sha1_hex(header_blob)
    );
    assert_eq!(
        rpm.signature_tags.get_as_string(SignatureTag::Sha256Header),
        rpm_pack::digest::sha256_hex(header_blob)
    );

    let uncompressed = rpm.payload_decompressed()?;
    assert_eq!(
        rpm.signature_tags.get_as_u64(SignatureTag::PayloadSize),
        uncompressed.len() as u64
    );
    assert_eq!(uncompressed.len() % 4, 0);

    rpm.verify_digests()?;
    Ok(())
}

#[test]
fn signature_section_is_8_byte_aligned() -> Result<()> {
    for files in [
        Vec::new(),
        vec![SourceFile::file("etc/one", 0o644, b"1".to_vec())],
        vec![
            SourceFile::file("etc/one", 0o644, b"1".to_vec()),
            SourceFile::file("etc/two", 0o644, b"22".to_vec()),
        ],
    ] {
        let builder = RpmBuilder::new("aligned", "1.0", "1")
            .build_time(BUILD_TIME)
            .build_host("buildhost");
        let bytes = assemble(&builder, files)?;
        let rpm = open(&bytes)?;
        // lead is 96 bytes; the header must start 8-byte aligned relative
        // to the signature section start
        assert_eq!((rpm.header_offset - 96) % 8, 0);
    }
    Ok(())
}

#[test]
fn assembly_is_deterministic() -> Result<()> {
    let files = vec![
        SourceFile::file("usr/bin/tool", 0o755, b"binary".to_vec()).with_mtime(1_650_000_000),
        SourceFile::dir("usr/share/doc", 0o755),
        SourceFile::file("usr/share/doc/README", 0o644, b"docs".to_vec()),
    ];
    let builder = RpmBuilder::new("determinism", "1.2", "3")
        .arch("x86_64")
        .summary("sample")
        .description("sample package")
        .license("MIT")
        .build_time(BUILD_TIME)
        .build_host("buildhost");

    let first = assemble(&builder, files.clone())?;
    let second = assemble(&builder, files)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn assemble_read_assemble_is_byte_identical() -> Result<()> {
    let files = vec![
        SourceFile::dir("opt/app", 0o755).with_mtime(1_650_000_000),
        SourceFile::file("opt/app/run", 0o755, b"#!/bin/sh\nexit 0\n".to_vec())
            .with_mtime(1_650_000_001),
        SourceFile::symlink("opt/app/alias", "run").with_mtime(1_650_000_002),
    ];
    let builder = RpmBuilder::new("roundtrip", "1.0", "1")
        .arch("x86_64")
        .summary("round trip")
        .description("assemble, read, assemble again")
        .license("MIT")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let first = assemble(&builder, files)?;

    // reconstruct the source and identity from the package alone
    let mut rpm = open(&first)?;
    let payload = rpm.payload_decompressed()?;
    let mut reader = CpioReader::new(Cursor::new(payload));
    let mut rebuilt_files = Vec::new();
    while let Some(entry) = reader.read()? {
        let mut content = Vec::new();
        reader.open(&entry).read_to_end(&mut content)?;
        let source = if entry.is_dir() {
            SourceFile::dir(entry.name.clone(), entry.mode & 0o7777)
        } else if entry.is_symlink() {
            SourceFile::symlink(entry.name.clone(), String::from_utf8(content).unwrap())
        } else {
            SourceFile::file(entry.name.clone(), entry.mode & 0o7777, content)
        };
        rebuilt_files.push(source.with_mtime(entry.mtime));
    }

    let header = &rpm.header_tags;
    let rebuilt = RpmBuilder::new(
        header.get_as_string(Tag::Name),
        header.get_as_string(Tag::Version),
        header.get_as_string(Tag::Release),
    )
    .arch(header.get_as_string(Tag::Arch))
    .summary(header.get_as_string(Tag::Summary))
    .description(header.get_as_string(Tag::Description))
    .license(header.get_as_string(Tag::License))
    .build_time(header.get_as_u32(Tag::BuildTime))
    .build_host(header.get_as_string(Tag::BuildHost));

    let second = assemble(&rebuilt, rebuilt_files)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn gzip_payload_reads_back() -> Result<()> {
    let builder = RpmBuilder::new("gz", "1.0", "1")
        .build_time(BUILD_TIME)
        .build_host("buildhost")
        .compressor(Compressor::Gzip(9));
    let files = vec![SourceFile::file("srv/file", 0o644, b"gzip payload".to_vec())];
    let bytes = assemble(&builder, files)?;

    let mut rpm = open(&bytes)?;
    assert_eq!(
        rpm.header_tags.get_as_string(Tag::PayloadCompressor),
        "gzip"
    );
    let requires = rpm.header_tags.get_as_string_array(Tag::RequireName);
    assert!(!requires.iter().any(|r| r.contains("PayloadIsXz")));

    let listed = rpm.files()?;
    assert_eq!(listed[0].name, "./srv/file");
    rpm.verify_digests()?;
    Ok(())
}

struct FakeSigner;

impl Signer for FakeSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Rsa
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        // deterministic stand-in for a detached OpenPGP signature
        let mut fake = b"SIG:".to_vec();
        fake.extend_from_slice(&rpm_pack::digest::md5_parts(&[data]));
        Ok(fake)
    }
}

#[test]
fn signed_package_carries_signature_tags() -> Result<()> {
    let builder = RpmBuilder::new("signed", "1.0", "1")
        .build_time(BUILD_TIME)
        .build_host("buildhost")
        .signer(Box::new(FakeSigner));
    let files = vec![SourceFile::file("etc/conf", 0o600, b"secret".to_vec())];
    let bytes = assemble(&builder, files)?;

    let mut rpm = open(&bytes)?;
    let rsa = rpm.signature_tags.get_as_bin(SignatureTag::RsaHeader);
    let pgp = rpm.signature_tags.get_as_bin(SignatureTag::Pgp);
    assert!(rsa.starts_with(b"SIG:"));
    assert!(pgp.starts_with(b"SIG:"));
    assert_ne!(rsa, pgp);
    rpm.verify_digests()?;
    Ok(())
}

#[test]
fn corrupted_payload_fails_verification() -> Result<()> {
    let builder = RpmBuilder::new("corrupt", "1.0", "1")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let files = vec![SourceFile::file("var/data", 0o644, b"payload".to_vec())];
    let mut bytes = assemble(&builder, files)?;

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let mut rpm = open(&bytes)?;
    assert!(matches!(
        rpm.verify_digests(),
        Err(rpm_pack::Error::DigestMismatch(_))
    ));
    Ok(())
}

#[test]
fn info_renders_per_file_rows() -> Result<()> {
    let builder = RpmBuilder::new("infopkg", "0.9", "2")
        .arch("x86_64")
        .summary("info sample")
        .description("info sample text")
        .license("Apache-2.0")
        .group("Applications/System")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let files = vec![
        SourceFile::file("usr/bin/app", 0o755, b"app".to_vec()),
        SourceFile::file("usr/share/app/data", 0o644, b"data!".to_vec()),
    ];
    let bytes = assemble(&builder, files)?;

    let rpm = open(&bytes)?;
    let info: RpmInfo = (&rpm).into();
    assert_eq!(info.name, "infopkg");
    assert_eq!(info.size, 8);
    assert_eq!(info.payload.format, "cpio");
    assert_eq!(info.payload.compressor, "xz");
    assert_eq!(info.payload.files.len(), 2);
    assert_eq!(info.payload.files[0].name, "./usr/bin/app");
    assert_eq!(info.payload.files[0].user, "root");

    let rendered = format!("{}", info);
    assert!(rendered.contains("Name        : infopkg"));
    assert!(rendered.contains("License     : Apache-2.0"));
    Ok(())
}

#[test]
fn rpmlib_requirements_present() -> Result<()> {
    let builder = RpmBuilder::new("reqs", "1.0", "1")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let bytes = assemble(&builder, Vec::new())?;

    let rpm = open(&bytes)?;
    let names = rpm.header_tags.get_as_string_array(Tag::RequireName);
    assert_eq!(
        names,
        vec![
            "rpmlib(CompressedFileNames)",
            "rpmlib(FileDigests)",
            "rpmlib(PayloadFilesHavePrefix)",
            "rpmlib(PayloadIsXz)",
        ]
    );
    let flags = rpm.header_tags.get_as_u32_array(Tag::RequireFlags);
    assert_eq!(flags, vec![16_777_226; 4]);

    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::ProvideName),
        vec!["reqs"]
    );
    assert_eq!(
        rpm.header_tags.get_as_string_array(Tag::ProvideVersion),
        vec!["1.0-1"]
    );
    Ok(())
}

#[test]
fn dir_source_walks_publish_tree() -> Result<()> {
    use rpm_pack::FileSource;

    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("usr/bin"))?;
    std::fs::write(dir.path().join("usr/bin/tool"), b"tool")?;
    std::fs::write(dir.path().join("usr/readme"), b"readme")?;

    let source = rpm_pack::DirSource::new(dir.path());
    let files = source.files()?;
    let paths: Vec<String> = files.iter().map(|f| f.archive_path()).collect();
    assert_eq!(paths, vec!["./usr", "./usr/bin", "./usr/bin/tool", "./usr/readme"]);
    assert!(matches!(files[2].content, FileContent::Regular(ref b) if b == b"tool"));

    let builder = RpmBuilder::new("walked", "1.0", "1")
        .build_time(BUILD_TIME)
        .build_host("buildhost");
    let mut out = Vec::new();
    builder.assemble(&source, &mut out)?;
    let mut rpm = open(&out)?;
    rpm.verify_digests()?;
    Ok(())
}
