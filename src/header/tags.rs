use num_derive::{FromPrimitive, ToPrimitive};
use strum_macros::Display;

use super::index::Type;

/// Header tag registry. Numeric values are the on-disk tag ids.
#[derive(Debug, Copy, Clone, FromPrimitive, ToPrimitive, Display, PartialEq, Eq, Hash)]
pub enum Tag {
    HeaderImage = 61,
    HeaderSignatures = 62,
    HeaderImmutable = 63,
    HeaderRegions = 64,
    HeaderI18nTable = 100,
    Name = 1000,
    Version = 1001,
    Release = 1002,
    Epoch = 1003,
    Summary = 1004,
    Description = 1005,
    BuildTime = 1006,
    BuildHost = 1007,
    InstallTime = 1008,
    Size = 1009,
    Distribution = 1010,
    Vendor = 1011,
    License = 1014,
    Packager = 1015,
    Group = 1016,
    Url = 1020,
    Os = 1021,
    Arch = 1022,
    PreIn = 1023,
    PostIn = 1024,
    PreUn = 1025,
    PostUn = 1026,
    OldFileNames = 1027,
    FileSizes = 1028,
    FileStates = 1029,
    FileModes = 1030,
    FileUids = 1031,
    FileGids = 1032,
    FileRDevs = 1033,
    FileMTimes = 1034,
    FileDigests = 1035,
    FileLinkTos = 1036,
    FileFlags = 1037,
    FileUserName = 1039,
    FileGroupName = 1040,
    Icon = 1043,
    SourceRpm = 1044,
    FileVerifyFlags = 1045,
    ArchiveSize = 1046,
    ProvideName = 1047,
    RequireFlags = 1048,
    RequireName = 1049,
    RequireVersion = 1050,
    ConflictFlags = 1053,
    ConflictName = 1054,
    ConflictVersion = 1055,
    ExcludeArch = 1059,
    ExcludeOs = 1060,
    ExclusiveArch = 1061,
    ExclusiveOs = 1062,
    RpmVersion = 1064,
    TriggerScripts = 1065,
    TriggerName = 1066,
    TriggerVersion = 1067,
    TriggerFlags = 1068,
    TriggerIndex = 1069,
    VerifyScript = 1079,
    ChangelogTime = 1080,
    ChangelogName = 1081,
    ChangelogText = 1082,
    PreInProg = 1085,
    PostInProg = 1086,
    PreUnProg = 1087,
    PostUnProg = 1088,
    BuildArchs = 1089,
    ObsoleteName = 1090,
    VerifyScriptProg = 1091,
    TriggerScriptProg = 1092,
    Cookie = 1094,
    FileDevices = 1095,
    FileInodes = 1096,
    FileLangs = 1097,
    Prefixes = 1098,
    InstPrefixes = 1099,
    SourcePackage = 1106,
    ProvideFlags = 1112,
    ProvideVersion = 1113,
    ObsoleteFlags = 1114,
    ObsoleteVersion = 1115,
    DirIndexes = 1116,
    BaseNames = 1117,
    DirNames = 1118,
    OrigDirIndexes = 1119,
    OrigBaseNames = 1120,
    OrigDirNames = 1121,
    OptFlags = 1122,
    DistUrl = 1123,
    PayloadFormat = 1124,
    PayloadCompressor = 1125,
    PayloadFlags = 1126,
    InstallColor = 1127,
    InstallTid = 1128,
    RemoveTid = 1129,
    Platform = 1132,
    FileColors = 1140,
    FileClass = 1141,
    ClassDict = 1142,
    FileDependsX = 1143,
    FileDependsN = 1144,
    DependsDict = 1145,
    SourcePkgId = 1146,
    FileContexts = 1147,
    PreTrans = 1151,
    PostTrans = 1152,
    PreTransProg = 1153,
    PostTransProg = 1154,
    DistTag = 1155,
    DbInstance = 1195,
    LongFileSizes = 5008,
    LongSize = 5009,
    FileCaps = 5010,
    FileDigestAlgo = 5011,
    BugUrl = 5012,
    Evr = 5013,
    Nvr = 5014,
    Nevr = 5015,
    Nevra = 5016,
    HeaderColor = 5017,
    Verbose = 5018,
    EpochNum = 5019,
    Encoding = 5062,
    PayloadDigest = 5092,
    PayloadDigestAlgo = 5093,
    ModularityLabel = 5096,
    Other = 8888,
}

impl Default for Tag {
    fn default() -> Tag {
        Tag::Other
    }
}

/// Canonical header tag order with each tag's declared wire type.
///
/// The sequence is the one byte-exact reference producers emit; new tags
/// are appended, never inserted. The immutable-region marker is not listed:
/// it is always the first index entry and is handled by the section writer.
pub const HEADER_TAG_ORDER: &[(Tag, Type)] = &[
    (Tag::HeaderI18nTable, Type::StringArray),
    (Tag::Name, Type::String),
    (Tag::Version, Type::String),
    (Tag::Release, Type::String),
    (Tag::Summary, Type::I18nstring),
    (Tag::Description, Type::I18nstring),
    (Tag::BuildTime, Type::Int32),
    (Tag::BuildHost, Type::String),
    (Tag::Size, Type::Int32),
    (Tag::Distribution, Type::String),
    (Tag::Vendor, Type::String),
    (Tag::License, Type::String),
    (Tag::Group, Type::I18nstring),
    (Tag::Url, Type::String),
    (Tag::Os, Type::String),
    (Tag::Arch, Type::String),
    (Tag::FileSizes, Type::Int32),
    (Tag::FileModes, Type::Int16),
    (Tag::FileRDevs, Type::Int16),
    (Tag::FileMTimes, Type::Int32),
    (Tag::FileDigests, Type::StringArray),
    (Tag::FileLinkTos, Type::StringArray),
    (Tag::FileFlags, Type::Int32),
    (Tag::FileUserName, Type::StringArray),
    (Tag::FileGroupName, Type::StringArray),
    (Tag::SourceRpm, Type::String),
    (Tag::FileVerifyFlags, Type::Int32),
    (Tag::ProvideName, Type::StringArray),
    (Tag::RequireFlags, Type::Int32),
    (Tag::RequireName, Type::StringArray),
    (Tag::RequireVersion, Type::StringArray),
    (Tag::RpmVersion, Type::String),
    (Tag::ChangelogTime, Type::Int32),
    (Tag::ChangelogName, Type::StringArray),
    (Tag::ChangelogText, Type::StringArray),
    (Tag::PostInProg, Type::String),
    (Tag::PostUnProg, Type::String),
    (Tag::Cookie, Type::String),
    (Tag::FileDevices, Type::Int32),
    (Tag::FileInodes, Type::Int32),
    (Tag::FileLangs, Type::StringArray),
    (Tag::ProvideFlags, Type::Int32),
    (Tag::ProvideVersion, Type::StringArray),
    (Tag::DirIndexes, Type::Int32),
    (Tag::BaseNames, Type::StringArray),
    (Tag::DirNames, Type::StringArray),
    (Tag::OptFlags, Type::String),
    (Tag::DistUrl, Type::String),
    (Tag::PayloadFormat, Type::String),
    (Tag::PayloadCompressor, Type::String),
    (Tag::PayloadFlags, Type::String),
    (Tag::Platform, Type::String),
    (Tag::FileColors, Type::Int32),
    (Tag::FileClass, Type::Int32),
    (Tag::ClassDict, Type::StringArray),
    (Tag::FileDependsX, Type::Int32),
    (Tag::FileDependsN, Type::Int32),
    (Tag::DependsDict, Type::Int32),
    (Tag::SourcePkgId, Type::Bin),
    (Tag::FileDigestAlgo, Type::Int32),
];
