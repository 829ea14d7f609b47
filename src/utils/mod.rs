use hex::FromHex;
use omnom::prelude::*;
use std::io;
use std::io::{Read, Write};

/// Number of pad bytes needed to advance `from` to the next multiple of `n`.
pub fn align_n_bytes(from: u32, n: u32) -> u32 {
    (n - from % n) % n
}

/// Write `count` NUL bytes of padding.
pub fn write_pad<W: Write>(writer: &mut W, count: usize) -> io::Result<()> {
    if count > 0 {
        writer.write_all(&vec![0_u8; count])?;
    }
    Ok(())
}

/// Parse a NUL-terminated string from the start of `bytes`.
pub fn parse_string(bytes: &[u8]) -> String {
    let position = bytes.iter().position(|&x| x == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..position]).to_string()
}

/// Parse `count` consecutive NUL-terminated strings from the start of `bytes`.
pub fn parse_strings(bytes: &[u8], count: usize) -> Vec<String> {
    bytes
        .split(|x| *x == 0)
        .take(count)
        .map(|b| String::from_utf8_lossy(b).to_string())
        .collect()
}

pub trait HexWriter {
    fn write_u32_as_hex(&mut self, from: u32) -> io::Result<()>;
}

impl<W> HexWriter for W
where
    W: Write,
{
    fn write_u32_as_hex(&mut self, from: u32) -> io::Result<()> {
        self.write_all(format!("{:08X}", from).as_bytes())?;
        Ok(())
    }
}

pub trait HexReader {
    fn read_hex_as_u32(&mut self) -> io::Result<u32>;
}

impl<R> HexReader for R
where
    R: Read,
{
    fn read_hex_as_u32(&mut self) -> io::Result<u32> {
        let mut raw_bytes = [0_u8; 8];
        self.read_exact(&mut raw_bytes)?;

        Vec::from_hex(raw_bytes)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Error: can not parse hex {}", e),
                )
            })?
            .as_slice()
            .read_be()
    }
}
