//! Assemble and inspect binary RPM packages.
//!
//! The write path is a one-shot pipeline: a [`FileSource`] yields the
//! payload tree, [`RpmBuilder`] turns it into a CPIO archive, compresses
//! it, fills the header and signature sections and emits the finished
//! package. [`RpmFile`] is the inverse, parsing a package back into its
//! sections for verification.

pub mod digest;
pub mod error;
pub mod header;
pub mod lead;
pub mod payload;
pub mod rpm;
pub mod utils;

pub use digest::{DigestAlgo, SignatureAlgorithm, Signer};
pub use error::{Error, Result};
pub use lead::Lead;
pub use payload::Compressor;
pub use rpm::{
    ChangelogEntry, DirSource, FileContent, FileSource, RpmBuilder, RpmFile, RpmInfo, SourceFile,
};
