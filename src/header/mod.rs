mod index;
mod lead;
mod sigtags;
mod tags;

pub use index::*;
pub use lead::*;
pub use sigtags::*;
pub use tags::*;

use log::warn;
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::io::{Read, Write};
use std::mem::size_of;

use crate::error::{Error, Result};
use crate::utils::{parse_string, parse_strings};

/// Region trailer records are always 16 bytes: a fake index entry pointing
/// back at the start of the region.
const TRAILER_LEN: usize = 16;

/// A tag usable as the key of a section store.
pub trait SectionTag:
    Copy + Eq + Default + FromPrimitive + ToPrimitive + fmt::Debug + fmt::Display
{
    /// The pseudo-tag marking this section's immutable region.
    fn region_tag() -> Self;

    /// Position in the canonical emission order. Tags without a canonical
    /// position sort after all ranked tags, in insertion order.
    fn rank(self) -> u32;

    /// Declared wire type, for tags this crate knows how to emit.
    fn declared_type(self) -> Option<Type>;
}

impl SectionTag for Tag {
    fn region_tag() -> Self {
        Tag::HeaderImmutable
    }

    fn rank(self) -> u32 {
        HEADER_TAG_ORDER
            .iter()
            .position(|(t, _)| *t == self)
            .map(|p| p as u32)
            .unwrap_or(u32::MAX)
    }

    fn declared_type(self) -> Option<Type> {
        HEADER_TAG_ORDER
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, ty)| *ty)
    }
}

impl SectionTag for SignatureTag {
    fn region_tag() -> Self {
        SignatureTag::HeaderSignatures
    }

    // Signature tags carry no reference ordering; ascending numeric id
    // keeps the section reproducible.
    fn rank(self) -> u32 {
        self.to_u32().unwrap_or(u32::MAX)
    }

    fn declared_type(self) -> Option<Type> {
        SIGNATURE_TAG_TYPES
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, ty)| *ty)
    }
}

#[derive(Debug, Clone)]
pub struct TagEntry<T> {
    pub tag: T,
    pub id: u32,
    pub value: RType,
}

/// An ordered tag-to-value store for one section of an RPM file.
///
/// Entries are kept in insertion order; serialization sorts them by the
/// canonical order of the tag type. At most one entry exists per tag.
#[derive(Debug, Default)]
pub struct Tags<T> {
    entries: Vec<TagEntry<T>>,
    region: Option<T>,
}

impl<T: SectionTag> Tags<T> {
    pub fn new() -> Self {
        Tags {
            entries: Vec::new(),
            region: None,
        }
    }

    /// Record the immutable-region marker for this section. The section
    /// writer emits it as the first index entry with a trailer record at
    /// the end of the data store.
    pub fn mark_immutable(&mut self) {
        self.region = Some(T::region_tag());
    }

    pub fn region(&self) -> Option<T> {
        self.region
    }

    /// Insert a value for a tag, replacing any previous value. Fails with
    /// `TypeMismatch` when the value's wire type differs from the tag's
    /// declared type, and with `InvalidField` for empty arrays, which the
    /// header structure cannot represent.
    pub fn insert(&mut self, tag: T, value: RType) -> Result<()> {
        let (actual, count) = value.type_and_count();
        if let Some(declared) = tag.declared_type()
            && declared != actual
        {
            return Err(Error::TypeMismatch {
                tag: tag.to_string(),
                declared: declared.to_string(),
                actual: actual.to_string(),
            });
        }
        if count == 0 {
            return Err(Error::InvalidField(format!("empty array for tag {}", tag)));
        }

        let id = tag.to_u32().unwrap_or_default();
        self.insert_raw(tag, id, value);
        Ok(())
    }

    fn insert_raw(&mut self, tag: T, id: u32, value: RType) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.value = value,
            None => self.entries.push(TagEntry { tag, id, value }),
        }
    }

    pub fn get(&self, tag: T) -> Option<&RType> {
        let id = tag.to_u32().unwrap_or_default();
        self.entries.iter().find(|e| e.id == id).map(|e| &e.value)
    }

    pub fn remove(&mut self, tag: T) -> Option<RType> {
        let id = tag.to_u32().unwrap_or_default();
        let position = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(position).value)
    }

    /// Entries in canonical emission order.
    pub fn iter(&self) -> impl Iterator<Item = &TagEntry<T>> {
        let mut sorted: Vec<&TagEntry<T>> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.tag.rank());
        sorted.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_as_string(&self, tag: T) -> String {
        self.get(tag).and_then(|v| v.as_string()).unwrap_or_default()
    }

    pub fn get_as_string_array(&self, tag: T) -> Vec<String> {
        self.get(tag)
            .and_then(|v| v.as_string_array())
            .unwrap_or_default()
    }

    pub fn get_as_u32(&self, tag: T) -> u32 {
        self.get(tag).and_then(|v| v.as_u32()).unwrap_or_default()
    }

    pub fn get_as_u64(&self, tag: T) -> u64 {
        self.get(tag).and_then(|v| v.as_u64()).unwrap_or_default()
    }

    pub fn get_as_i64(&self, tag: T) -> i64 {
        self.get_as_u64(tag) as i64
    }

    pub fn get_as_u16_array(&self, tag: T) -> Vec<u16> {
        self.get(tag)
            .and_then(|v| v.as_u16_array())
            .unwrap_or_default()
    }

    pub fn get_as_u32_array(&self, tag: T) -> Vec<u32> {
        self.get(tag)
            .and_then(|v| v.as_u32_array())
            .unwrap_or_default()
    }

    pub fn get_as_u64_array(&self, tag: T) -> Vec<u64> {
        self.get(tag)
            .and_then(|v| v.as_u64_array())
            .unwrap_or_default()
    }

    pub fn get_as_bin(&self, tag: T) -> Vec<u8> {
        self.get(tag).and_then(|v| v.as_bin()).unwrap_or_default()
    }

    /// Serialize the section: preamble, index, data store. Returns the
    /// total number of bytes written. The caller is responsible for any
    /// tail padding the section needs (signature sections pad to 8).
    pub fn write_section<W: Write>(&self, fh: &mut W) -> Result<usize> {
        let mut store: Vec<u8> = Vec::new();
        let mut indexes: Vec<Index<T>> = Vec::new();

        for entry in self.iter() {
            let (itype, count) = entry.value.type_and_count();
            let pad = crate::utils::align_n_bytes(store.len() as u32, itype.alignment());
            store.resize(store.len() + pad as usize, 0);

            let offset = u32::try_from(store.len())
                .map_err(|_| Error::invalid_field("data store exceeds u32 range"))?;
            entry.value.write_store(&mut store)?;

            indexes.push(Index {
                tag: entry.tag,
                id: entry.id,
                itype,
                offset,
                count: count as u32,
            });
        }

        let nindex = indexes.len() + usize::from(self.region.is_some());

        if let Some(region) = self.region {
            let region_id = region.to_u32().unwrap_or_default();
            let offset = u32::try_from(store.len())
                .map_err(|_| Error::invalid_field("data store exceeds u32 range"))?;

            // Trailer: a back-reference from the end of the index to its
            // first entry, written last but indexed first.
            let back = -((nindex * TRAILER_LEN) as i32);
            store.extend_from_slice(&region_id.to_be_bytes());
            store.extend_from_slice(&(Type::Bin.to_u32().unwrap_or_default()).to_be_bytes());
            store.extend_from_slice(&back.to_be_bytes());
            store.extend_from_slice(&(TRAILER_LEN as u32).to_be_bytes());

            indexes.insert(
                0,
                Index {
                    tag: region,
                    id: region_id,
                    itype: Type::Bin,
                    offset,
                    count: TRAILER_LEN as u32,
                },
            );
        }

        let hsize = u32::try_from(store.len())
            .map_err(|_| Error::invalid_field("data store exceeds u32 range"))?;

        HeaderLead::new(nindex, hsize).write(fh)?;
        for index in &indexes {
            index.write(fh)?;
        }
        fh.write_all(&store)?;

        Ok(16 + nindex * 16 + store.len())
    }

    /// Read the data store and decode every indexed value.
    pub fn read<R: Read>(fh: &mut R, indexes: &[Index<T>], size: usize) -> Result<Self> {
        let mut data = vec![0_u8; size];
        fh.read_exact(&mut data)?;
        Self::from_raw(indexes, &data)
    }

    /// Decode a section from its index entries and data store.
    ///
    /// A first index entry of type BIN and count 16 whose tag is one of the
    /// region pseudo-tags is treated as the immutable-region marker; its
    /// trailer must point back at the first index entry.
    pub fn from_raw(indexes: &[Index<T>], data: &[u8]) -> Result<Self> {
        let mut tags = Tags::new();
        let mut items = indexes;

        if let Some(first) = indexes.first()
            && first.itype == Type::Bin
            && first.count as usize == TRAILER_LEN
            && (61..=64).contains(&first.id)
        {
            let trailer = slice_at(data, first.offset as usize, TRAILER_LEN)?;
            let back = i32::from_be_bytes([trailer[8], trailer[9], trailer[10], trailer[11]]);
            let expected = -((indexes.len() * TRAILER_LEN) as i32);
            if back != expected {
                return Err(Error::InvalidFormat(format!(
                    "region trailer points at {} instead of {}",
                    back, expected
                )));
            }
            tags.region = Some(first.tag);
            items = &indexes[1..];
        }

        for item in items {
            let value = decode_value(item, data)?;
            tags.insert_raw(item.tag, item.id, value);
        }
        Ok(tags)
    }
}

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    data.get(offset..offset + len)
        .ok_or_else(|| Error::invalid_format("index entry points outside the data store"))
}

fn decode_value<T: SectionTag>(item: &Index<T>, data: &[u8]) -> Result<RType> {
    let ps = item.offset as usize;
    let count = item.count as usize;

    let value = match item.itype {
        Type::Null => RType::Null,
        Type::Char => RType::Char(*slice_at(data, ps, 1)?.first().unwrap_or(&0)),
        Type::Int8 => extract(data, ps, count, RType::Int8, RType::Int8Array)?,
        Type::Int16 => extract(data, ps, count, RType::Int16, RType::Int16Array)?,
        Type::Int32 => extract(data, ps, count, RType::Int32, RType::Int32Array)?,
        Type::Int64 => extract(data, ps, count, RType::Int64, RType::Int64Array)?,
        Type::String => RType::String(parse_string(slice_to_end(data, ps)?)),
        Type::Bin => RType::Bin(slice_at(data, ps, count)?.to_vec()),
        Type::StringArray => RType::StringArray(parse_strings(slice_to_end(data, ps)?, count)),
        Type::I18nstring => RType::I18nstring(parse_string(slice_to_end(data, ps)?)),
    };
    Ok(value)
}

fn slice_to_end(data: &[u8], offset: usize) -> Result<&[u8]> {
    data.get(offset..)
        .ok_or_else(|| Error::invalid_format("index entry points outside the data store"))
}

fn extract<V: FromBeBytes>(
    data: &[u8],
    position: usize,
    count: usize,
    single: fn(V) -> RType,
    multiple: fn(Vec<V>) -> RType,
) -> Result<RType> {
    let bytes = slice_at(data, position, count * size_of::<V>())?;
    if count > 1 {
        let values = (0..count)
            .map(|i| V::from_be_slice(&bytes[i * size_of::<V>()..]))
            .collect();
        Ok(multiple(values))
    } else {
        Ok(single(V::from_be_slice(bytes)))
    }
}

trait FromBeBytes {
    fn from_be_slice(data: &[u8]) -> Self;
}

macro_rules! from_be_bytes (
    ($item:ty, $number:expr) => (
        impl FromBeBytes for $item {
            fn from_be_slice(data: &[u8]) -> $item {
                let mut bytes: [u8; $number] = Default::default();
                bytes.copy_from_slice(&data[..$number]);
                <$item>::from_be_bytes(bytes)
            }
        }
    );
);

from_be_bytes!(u8, 1);
from_be_bytes!(u16, 2);
from_be_bytes!(u32, 4);
from_be_bytes!(u64, 8);

pub trait TagsWrite {
    fn write_header<T: SectionTag>(&mut self, tags: &Tags<T>) -> Result<usize>;
}

impl<W> TagsWrite for W
where
    W: Write,
{
    fn write_header<T: SectionTag>(&mut self, tags: &Tags<T>) -> Result<usize> {
        tags.write_section(self)
    }
}

/// Read one section: preamble, index array, decoded store. Returns the
/// store size as well so the caller can skip the signature tail padding.
pub fn read_section<R: Read, T: SectionTag>(fh: &mut R) -> Result<(Tags<T>, u32)> {
    let lead = HeaderLead::read(fh)?;
    let indexes = IndexArray::read(fh, lead.nindex)?;
    let tags = Tags::read(fh, &indexes, lead.hsize as usize)?;
    if tags.region.is_none() {
        warn!("section has no immutable region marker");
    }
    Ok((tags, lead.hsize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Tags<Tag> {
        let mut tags = Tags::new();
        tags.mark_immutable();
        tags.insert(Tag::HeaderI18nTable, RType::StringArray(vec!["C".into()]))
            .unwrap();
        tags.insert(Tag::Name, RType::String("sample".into())).unwrap();
        tags.insert(Tag::Version, RType::String("1.0".into())).unwrap();
        tags.insert(Tag::Release, RType::String("1".into())).unwrap();
        tags.insert(Tag::Size, RType::Int32(1234)).unwrap();
        tags.insert(Tag::FileModes, RType::Int16Array(vec![0o100644, 0o100755]))
            .unwrap();
        tags.insert(Tag::FileSizes, RType::Int32Array(vec![6, 12]))
            .unwrap();
        tags.insert(
            Tag::BaseNames,
            RType::StringArray(vec!["readme.txt".into(), "tool".into()]),
        )
        .unwrap();
        tags
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let tags = sample_header();
        let mut buf = Vec::new();
        let written = tags.write_section(&mut buf).unwrap();
        assert_eq!(written, buf.len());

        let mut cursor = Cursor::new(buf);
        let (parsed, _) = read_section::<_, Tag>(&mut cursor).unwrap();

        assert_eq!(parsed.region(), Some(Tag::HeaderImmutable));
        assert_eq!(parsed.get_as_string(Tag::Name), "sample");
        assert_eq!(parsed.get_as_u32(Tag::Size), 1234);
        assert_eq!(
            parsed.get_as_u16_array(Tag::FileModes),
            vec![0o100644, 0o100755]
        );
        assert_eq!(parsed.get_as_u32_array(Tag::FileSizes), vec![6, 12]);
        assert_eq!(
            parsed.get_as_string_array(Tag::BaseNames),
            vec!["readme.txt", "tool"]
        );
        assert_eq!(parsed.len(), tags.len());
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let tags = sample_header();
        let mut first = Vec::new();
        tags.write_section(&mut first).unwrap();

        let mut cursor = Cursor::new(first.clone());
        let (parsed, _) = read_section::<_, Tag>(&mut cursor).unwrap();
        let mut second = Vec::new();
        parsed.write_section(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_canonical_order() {
        let mut tags = Tags::new();
        // inserted out of order on purpose
        tags.insert(Tag::Version, RType::String("1".into())).unwrap();
        tags.insert(Tag::Name, RType::String("a".into())).unwrap();

        let order: Vec<Tag> = tags.iter().map(|e| e.tag).collect();
        assert_eq!(order, vec![Tag::Name, Tag::Version]);
    }

    #[test]
    fn test_insert_type_mismatch() {
        let mut tags = Tags::new();
        let err = tags.insert(Tag::Name, RType::Int32(1)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_insert_rejects_empty_array() {
        let mut tags = Tags::new();
        let err = tags
            .insert(Tag::BaseNames, RType::StringArray(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField(_)));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut tags = Tags::new();
        tags.insert(Tag::Name, RType::String("a".into())).unwrap();
        tags.insert(Tag::Name, RType::String("b".into())).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get_as_string(Tag::Name), "b");
    }

    #[test]
    fn test_int32_offsets_are_aligned() {
        let tags = sample_header();
        let mut buf = Vec::new();
        tags.write_section(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let lead = HeaderLead::read(&mut cursor).unwrap();
        let indexes: Vec<Index<Tag>> = IndexArray::read(&mut cursor, lead.nindex).unwrap();
        for index in indexes {
            let align = index.itype.alignment();
            assert_eq!(index.offset % align, 0, "tag {} misaligned", index.tag);
        }
    }

    #[test]
    fn test_region_trailer_backref() {
        let tags = sample_header();
        let mut buf = Vec::new();
        tags.write_section(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        let lead = HeaderLead::read(&mut cursor).unwrap();
        let indexes: Vec<Index<Tag>> = IndexArray::read(&mut cursor, lead.nindex).unwrap();
        let region = &indexes[0];
        assert_eq!(region.id, 63);
        assert_eq!(region.itype, Type::Bin);
        assert_eq!(region.count, 16);

        let store = &buf[16 + lead.nindex * 16..];
        let ps = region.offset as usize;
        let back = i32::from_be_bytes([store[ps + 8], store[ps + 9], store[ps + 10], store[ps + 11]]);
        assert_eq!(back, -((lead.nindex * 16) as i32));
    }

    #[test]
    fn test_array_extent_matches_count() {
        let tags = sample_header();
        let mut buf = Vec::new();
        tags.write_section(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        let lead = HeaderLead::read(&mut cursor).unwrap();
        let indexes: Vec<Index<Tag>> = IndexArray::read(&mut cursor, lead.nindex).unwrap();
        let sizes = indexes.iter().find(|i| i.tag == Tag::FileSizes).unwrap();
        assert_eq!(sizes.count, 2);
        let modes = indexes.iter().find(|i| i.tag == Tag::FileModes).unwrap();
        assert_eq!(modes.count, 2);
    }

    #[test]
    fn test_unknown_tag_survives_round_trip() {
        let mut tags: Tags<Tag> = Tags::new();
        tags.insert_raw(Tag::Other, 54321, RType::Int32(7));
        tags.insert(Tag::Name, RType::String("a".into())).unwrap();

        let mut buf = Vec::new();
        tags.write_section(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.clone());
        let (parsed, _) = read_section::<_, Tag>(&mut cursor).unwrap();

        let mut again = Vec::new();
        parsed.write_section(&mut again).unwrap();
        assert_eq!(buf, again);
    }

    #[test]
    fn test_signature_tags_sort_numerically() {
        let mut tags: Tags<SignatureTag> = Tags::new();
        tags.insert(SignatureTag::PayloadSize, RType::Int32(10)).unwrap();
        tags.insert(SignatureTag::Sha1Header, RType::String("ab".into()))
            .unwrap();
        tags.insert(SignatureTag::Size, RType::Int32(20)).unwrap();

        let order: Vec<SignatureTag> = tags.iter().map(|e| e.tag).collect();
        assert_eq!(
            order,
            vec![
                SignatureTag::Sha1Header,
                SignatureTag::Size,
                SignatureTag::PayloadSize
            ]
        );
    }
}
