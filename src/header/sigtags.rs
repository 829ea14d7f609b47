use num_derive::{FromPrimitive, ToPrimitive};
use strum_macros::Display;

use super::index::Type;

/// Signature section tag registry.
#[derive(Debug, Copy, Clone, FromPrimitive, ToPrimitive, Display, PartialEq, Eq, Hash)]
pub enum SignatureTag {
    HeaderImage = 61,
    HeaderSignatures = 62,
    HeaderImmutable = 63,
    HeaderRegions = 64,
    HeaderI18nTable = 100,
    DsaHeader = 267,
    RsaHeader = 268,
    Sha1Header = 269,
    LongSigSize = 270,
    LongArchiveSize = 271,
    Sha256Header = 273,
    Size = 1000,
    LeMd5_1 = 1001,
    Pgp = 1002,
    LeMd5_2 = 1003,
    Md5 = 1004,
    Gpg = 1005,
    Pgp5 = 1006,
    PayloadSize = 1007,
    ReservedSpace = 1008,
    Other = 8888,
}

impl Default for SignatureTag {
    fn default() -> SignatureTag {
        SignatureTag::Other
    }
}

/// Declared wire types of the signature tags this crate emits. Unlike the
/// header section there is no reference ordering to reproduce; tags are
/// written in ascending numeric id order.
pub const SIGNATURE_TAG_TYPES: &[(SignatureTag, Type)] = &[
    (SignatureTag::DsaHeader, Type::Bin),
    (SignatureTag::RsaHeader, Type::Bin),
    (SignatureTag::Sha1Header, Type::String),
    (SignatureTag::LongSigSize, Type::Int64),
    (SignatureTag::LongArchiveSize, Type::Int64),
    (SignatureTag::Sha256Header, Type::String),
    (SignatureTag::Size, Type::Int32),
    (SignatureTag::Pgp, Type::Bin),
    (SignatureTag::Md5, Type::Bin),
    (SignatureTag::Gpg, Type::Bin),
    (SignatureTag::PayloadSize, Type::Int32),
];
