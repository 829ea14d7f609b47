use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use omnom::prelude::*;
use std::fmt;
use std::io::{Read, Write};
use strum_macros::Display;

use crate::error::{Error, Result};
use crate::utils::parse_string;

pub const MAGIC: [u8; 4] = [237, 171, 238, 219];

const LEAD_MAJOR: u8 = 3;
const LEAD_MINOR: u8 = 0;
/// Header-style signature section follows the lead.
const SIGNATURE_TYPE: u16 = 5;

/// Architecture codes from the rpmrc `arch_canon` table. Anything not
/// listed here is written as 1, matching reference producer behavior.
const ARCH_CANON: &[(&str, u16)] = &[
    ("i386", 1),
    ("i486", 1),
    ("i586", 1),
    ("i686", 1),
    ("athlon", 1),
    ("x86_64", 1),
    ("alpha", 2),
    ("sparc", 3),
    ("mips", 4),
    ("ppc", 5),
    ("m68k", 6),
    ("ia64", 9),
    ("arm", 12),
    ("armv7hl", 12),
    ("s390", 14),
    ("s390x", 15),
    ("ppc64", 16),
    ("ppc64le", 16),
    ("aarch64", 19),
    ("riscv64", 22),
];

const OS_CANON: &[(&str, u16)] = &[("linux", 1)];

fn canon_number(table: &[(&str, u16)], name: &str) -> u16 {
    table
        .iter()
        .find(|(n, _)| name.eq_ignore_ascii_case(n))
        .map(|(_, num)| *num)
        .unwrap_or(1)
}

#[derive(Debug, PartialEq, FromPrimitive, ToPrimitive, Display)]
pub enum PackageType {
    Binary = 0,
    Source = 1,
}

pub struct Lead {
    pub magic: [u8; 4],
    pub major: u8,
    pub minor: u8,
    pub rpm_type: PackageType,
    pub archnum: u16,
    pub name: [u8; 66],
    pub osnum: u16,
    pub signature_type: u16,
    pub reserved: [u8; 16],
}

impl Lead {
    /// Lead for a binary package. `nvr` is the `name-version-release`
    /// string; it is silently truncated to the 65 bytes the name field can
    /// carry next to its NUL terminator.
    pub fn new(nvr: &str, arch: &str, os: &str) -> Self {
        let mut name = [0_u8; 66];
        let bytes = nvr.as_bytes();
        let len = bytes.len().min(65);
        name[..len].copy_from_slice(&bytes[..len]);

        Lead {
            magic: MAGIC,
            major: LEAD_MAJOR,
            minor: LEAD_MINOR,
            rpm_type: PackageType::Binary,
            archnum: canon_number(ARCH_CANON, arch),
            name,
            osnum: canon_number(OS_CANON, os),
            signature_type: SIGNATURE_TYPE,
            reserved: [0; 16],
        }
    }

    pub fn read<R: Read>(fh: &mut R) -> Result<Self> {
        let mut magic = [0_u8; 4];
        fh.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(Error::invalid_format("File is not rpm"));
        }

        let mut head = [0_u8; 2];
        fh.read_exact(&mut head)?;
        let [major, minor] = head;

        match (major, minor) {
            (3, 0) | (3, 1) | (4, 0) => {}
            _ => {
                return Err(Error::InvalidFormat(format!(
                    "rpm format version is not supported {}.{}",
                    major, minor
                )));
            }
        }

        let rpm_type_num: u16 = fh.read_be()?;
        let rpm_type = PackageType::from_u16(rpm_type_num)
            .ok_or_else(|| Error::InvalidFormat(format!("unknown rpm type {}", rpm_type_num)))?;
        let archnum: u16 = fh.read_be()?;

        let mut name = [0_u8; 66];
        fh.read_exact(&mut name)?;
        let osnum: u16 = fh.read_be()?;
        let signature_type: u16 = fh.read_be()?;
        let mut reserved = [0_u8; 16];
        fh.read_exact(&mut reserved)?;

        Ok(Lead {
            magic,
            major,
            minor,
            rpm_type,
            archnum,
            name,
            osnum,
            signature_type,
            reserved,
        })
    }

    pub fn write<W: Write>(&self, fh: &mut W) -> Result<()> {
        fh.write_all(&self.magic)?;
        fh.write_all(&[self.major, self.minor])?;
        fh.write_be(self.rpm_type.to_u16().unwrap_or_default())?;
        fh.write_be(self.archnum)?;
        fh.write_all(&self.name)?;
        fh.write_be(self.osnum)?;
        fh.write_be(self.signature_type)?;
        fh.write_all(&self.reserved)?;
        Ok(())
    }

    pub fn name_str(&self) -> String {
        parse_string(&self.name)
    }
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {:?}", self.magic)?;
        writeln!(f, "major: {}", self.major)?;
        writeln!(f, "minor: {}", self.minor)?;
        writeln!(f, "rpm_type: {}", self.rpm_type)?;
        writeln!(f, "archnum: {}", self.archnum)?;
        writeln!(f, "name: {}", self.name_str())?;
        writeln!(f, "osnum: {}", self.osnum)?;
        writeln!(f, "signature_type: {}", self.signature_type)
    }
}

impl fmt::Debug for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {:?}", self.magic)?;
        writeln!(f, "major: {}", self.major)?;
        writeln!(f, "minor: {}", self.minor)?;
        writeln!(f, "rpm_type: {}", self.rpm_type)?;
        writeln!(f, "archnum: {}", self.archnum)?;
        writeln!(f, "name: {:?}", &&self.name[..])?;
        writeln!(f, "osnum: {}", self.osnum)?;
        writeln!(f, "signature_type: {}", self.signature_type)?;
        writeln!(f, "reserved: {:?}", self.reserved)
    }
}

impl Default for Lead {
    fn default() -> Self {
        Lead {
            magic: MAGIC,
            major: LEAD_MAJOR,
            minor: LEAD_MINOR,
            rpm_type: PackageType::Binary,
            archnum: 1,
            name: [0; 66],
            osnum: 1,
            signature_type: SIGNATURE_TYPE,
            reserved: [0; 16],
        }
    }
}

pub trait LeadWriter {
    fn write_lead(&mut self, lead: &Lead) -> Result<()>;
}

impl<W> LeadWriter for W
where
    W: Write,
{
    fn write_lead(&mut self, lead: &Lead) -> Result<()> {
        lead.write(self)
    }
}
