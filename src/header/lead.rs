use omnom::prelude::*;
use std::io::{Read, Write};

use crate::error::{Error, Result};

pub const MAGIC_HEADER: [u8; 4] = [142, 173, 232, 1];

/// The 16-byte preamble of a header structure: magic, reserved, index
/// entry count and data store size.
#[derive(Debug)]
pub struct HeaderLead {
    pub magic: [u8; 4],
    pub reserved: [u8; 4],
    pub nindex: usize,
    pub hsize: u32,
}

impl HeaderLead {
    pub fn new(nindex: usize, hsize: u32) -> Self {
        HeaderLead {
            magic: MAGIC_HEADER,
            reserved: [0; 4],
            nindex,
            hsize,
        }
    }

    pub fn read<R: Read>(fh: &mut R) -> Result<Self> {
        let mut magic = [0_u8; 4];
        fh.read_exact(&mut magic)?;

        if magic != MAGIC_HEADER {
            return Err(Error::invalid_format("section magic not found"));
        }

        let mut reserved = [0_u8; 4];
        fh.read_exact(&mut reserved)?;

        let nindex: u32 = fh.read_be()?;
        let hsize: u32 = fh.read_be()?;

        Ok(HeaderLead {
            magic,
            reserved,
            nindex: nindex as usize,
            hsize,
        })
    }

    pub fn write<W: Write>(&self, fh: &mut W) -> Result<()> {
        fh.write_all(&self.magic)?;
        fh.write_all(&self.reserved)?;
        fh.write_be(self.nindex as u32)?;
        fh.write_be(self.hsize)?;
        Ok(())
    }
}

impl Default for HeaderLead {
    fn default() -> Self {
        HeaderLead::new(0, 0)
    }
}
