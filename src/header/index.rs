use log::warn;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use omnom::prelude::*;
use std::io::{Read, Write};
use strum_macros::Display;

use crate::error::{Error, Result};

/// On-disk value types of the header structure.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, ToPrimitive, Display)]
pub enum Type {
    Null = 0,
    Char = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    String = 6,
    Bin = 7,
    StringArray = 8,
    I18nstring = 9,
}

impl Type {
    /// Alignment of this type's items within the data store.
    pub fn alignment(self) -> u32 {
        match self {
            Type::Int16 => 2,
            Type::Int32 => 4,
            Type::Int64 => 8,
            _ => 1,
        }
    }
}

/// A decoded tag value.
#[derive(Debug, PartialEq, Clone)]
pub enum RType {
    Null,
    Char(u8),
    Int8(u8),
    Int8Array(Vec<u8>),
    Int16(u16),
    Int16Array(Vec<u16>),
    Int32(u32),
    Int32Array(Vec<u32>),
    Int64(u64),
    Int64Array(Vec<u64>),
    String(String),
    Bin(Vec<u8>),
    StringArray(Vec<String>),
    I18nstring(String),
}

impl RType {
    /// On-disk type and element count this value serializes as.
    pub fn type_and_count(&self) -> (Type, usize) {
        match self {
            RType::Null => (Type::Null, 1),
            RType::Char(_) => (Type::Char, 1),
            RType::Int8(_) => (Type::Int8, 1),
            RType::Int8Array(a) => (Type::Int8, a.len()),
            RType::Int16(_) => (Type::Int16, 1),
            RType::Int16Array(a) => (Type::Int16, a.len()),
            RType::Int32(_) => (Type::Int32, 1),
            RType::Int32Array(a) => (Type::Int32, a.len()),
            RType::Int64(_) => (Type::Int64, 1),
            RType::Int64Array(a) => (Type::Int64, a.len()),
            RType::String(_) => (Type::String, 1),
            RType::Bin(b) => (Type::Bin, b.len()),
            RType::StringArray(a) => (Type::StringArray, a.len()),
            RType::I18nstring(_) => (Type::I18nstring, 1),
        }
    }

    /// Append the encoded value to the data store. Integers are big-endian,
    /// strings NUL-terminated, arrays tightly packed.
    pub fn write_store(&self, store: &mut Vec<u8>) -> Result<()> {
        match self {
            RType::Null => {}
            RType::Char(v) | RType::Int8(v) => store.push(*v),
            RType::Int8Array(a) => store.extend_from_slice(a),
            RType::Int16(v) => {
                store.write_be(*v)?;
            }
            RType::Int16Array(a) => {
                for v in a {
                    store.write_be(*v)?;
                }
            }
            RType::Int32(v) => {
                store.write_be(*v)?;
            }
            RType::Int32Array(a) => {
                for v in a {
                    store.write_be(*v)?;
                }
            }
            RType::Int64(v) => {
                store.write_be(*v)?;
            }
            RType::Int64Array(a) => {
                for v in a {
                    store.write_be(*v)?;
                }
            }
            RType::String(s) | RType::I18nstring(s) => {
                store.extend_from_slice(s.as_bytes());
                store.push(0);
            }
            RType::Bin(b) => store.extend_from_slice(b),
            RType::StringArray(a) => {
                for s in a {
                    store.extend_from_slice(s.as_bytes());
                    store.push(0);
                }
            }
        }
        Ok(())
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            RType::String(s) | RType::I18nstring(s) => Some(s.to_owned()),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<Vec<String>> {
        match self {
            RType::StringArray(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RType::Int8(n) => Some(u64::from(*n)),
            RType::Int16(n) => Some(u64::from(*n)),
            RType::Int32(n) => Some(u64::from(*n)),
            RType::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            RType::Int8(n) => Some(u32::from(*n)),
            RType::Int16(n) => Some(u32::from(*n)),
            RType::Int32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u32_array(&self) -> Option<Vec<u32>> {
        match self {
            RType::Int8Array(a) => Some(a.iter().map(|x| u32::from(*x)).collect()),
            RType::Int16Array(a) => Some(a.iter().map(|x| u32::from(*x)).collect()),
            RType::Int32Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_u64_array(&self) -> Option<Vec<u64>> {
        match self {
            RType::Int8Array(a) => Some(a.iter().map(|x| u64::from(*x)).collect()),
            RType::Int16Array(a) => Some(a.iter().map(|x| u64::from(*x)).collect()),
            RType::Int32Array(a) => Some(a.iter().map(|x| u64::from(*x)).collect()),
            RType::Int64Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_u16_array(&self) -> Option<Vec<u16>> {
        match self {
            RType::Int8Array(a) => Some(a.iter().map(|x| u16::from(*x)).collect()),
            RType::Int16Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_bin(&self) -> Option<Vec<u8>> {
        match self {
            RType::Bin(b) => Some(b.clone()),
            _ => None,
        }
    }
}

/// One 16-byte index entry. `id` keeps the raw tag number so that tags
/// outside the registry survive a decode/encode round trip.
#[derive(Debug)]
pub struct Index<T> {
    pub tag: T,
    pub id: u32,
    pub itype: Type,
    pub offset: u32,
    pub count: u32,
}

impl<T> Index<T>
where
    T: FromPrimitive + Default,
{
    pub fn read<R: Read>(fh: &mut R) -> Result<Self> {
        let id: u32 = fh.read_be()?;
        let tag = T::from_u32(id).unwrap_or_else(|| {
            warn!("unknown tag {}", id);
            T::default()
        });

        let type_id: u32 = fh.read_be()?;
        let itype = Type::from_u32(type_id)
            .ok_or_else(|| Error::InvalidFormat(format!("unknown value type {}", type_id)))?;

        let offset: u32 = fh.read_be()?;
        let count: u32 = fh.read_be()?;

        Ok(Index {
            tag,
            id,
            itype,
            offset,
            count,
        })
    }
}

impl<T> Index<T> {
    pub fn write<W: Write>(&self, fh: &mut W) -> Result<()> {
        fh.write_be(self.id)?;
        fh.write_be(self.itype.to_u32().unwrap_or_default())?;
        fh.write_be(self.offset)?;
        fh.write_be(self.count)?;
        Ok(())
    }
}

pub struct IndexArray;

impl IndexArray {
    pub fn read<R, T>(fh: &mut R, nindex: usize) -> Result<Vec<Index<T>>>
    where
        R: Read,
        T: FromPrimitive + Default,
    {
        let mut indexes = Vec::with_capacity(nindex);
        for _ in 0..nindex {
            let index = Index::read(fh)?;
            indexes.push(index);
        }
        Ok(indexes)
    }
}
