use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// FILEDIGESTALGO codes for the per-file digest column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgo {
    Md5 = 1,
    Sha256 = 8,
}

impl Default for DigestAlgo {
    fn default() -> Self {
        DigestAlgo::Sha256
    }
}

impl DigestAlgo {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Lowercase hex digest of `data` with this algorithm.
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            DigestAlgo::Md5 => md5_hex(data),
            DigestAlgo::Sha256 => sha256_hex(data),
        }
    }
}

/// Raw MD5 over a sequence of byte ranges, hashed as one stream.
pub fn md5_parts(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa,
    Dsa,
}

/// Detached-signature hook. Implementations produce OpenPGP signature
/// packets over the byte range they are handed; the assembler decides
/// which ranges get signed and where the result is stored.
pub trait Signer {
    fn algorithm(&self) -> SignatureAlgorithm;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}
