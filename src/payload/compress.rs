use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::error::{Error, Result};

/// Payload compressor selection. The level is what ends up in the
/// PAYLOADFLAGS tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Gzip(u32),
    Bzip2(u32),
    Zstd(i32),
    Xz(u32),
}

impl Default for Compressor {
    fn default() -> Self {
        Compressor::Xz(2)
    }
}

impl Compressor {
    /// Compressor named by a PAYLOADCOMPRESSOR tag value, with the level
    /// that tag's sibling PAYLOADFLAGS usually carries.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "gzip" => Ok(Compressor::Gzip(9)),
            "bzip2" => Ok(Compressor::Bzip2(9)),
            "zstd" => Ok(Compressor::Zstd(3)),
            "xz" | "lzma" => Ok(Compressor::Xz(2)),
            format => Err(Error::CompressionFailed(format!(
                "compressor \"{}\" is not implemented",
                format
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compressor::Gzip(_) => "gzip",
            Compressor::Bzip2(_) => "bzip2",
            Compressor::Zstd(_) => "zstd",
            Compressor::Xz(_) => "xz",
        }
    }

    /// PAYLOADFLAGS value: the compression level as a decimal string.
    pub fn flags(&self) -> String {
        match self {
            Compressor::Gzip(level) | Compressor::Bzip2(level) | Compressor::Xz(level) => {
                level.to_string()
            }
            Compressor::Zstd(level) => level.to_string(),
        }
    }

    /// Streaming encoder over `sink`. Bytes flow through as written; the
    /// stream must be closed with [`CompressWriter::finish`] to flush the
    /// final block.
    pub fn writer<W: Write>(&self, sink: W) -> Result<CompressWriter<W>> {
        match self {
            Compressor::Gzip(level) => Ok(CompressWriter::Gzip(GzEncoder::new(
                sink,
                flate2::Compression::new(*level),
            ))),
            Compressor::Bzip2(level) => Ok(CompressWriter::Bzip2(BzEncoder::new(
                sink,
                bzip2::Compression::new(*level),
            ))),
            Compressor::Zstd(level) => {
                let encoder = ZstdEncoder::new(sink, *level)
                    .map_err(|e| Error::CompressionFailed(e.to_string()))?;
                Ok(CompressWriter::Zstd(encoder))
            }
            Compressor::Xz(level) => Ok(CompressWriter::Xz(XzEncoder::new(sink, *level))),
        }
    }
}

/// Streaming decoder for the compressor named by a PAYLOADCOMPRESSOR tag.
pub fn decompress_reader<'a, R: Read + 'a>(name: &str, reader: R) -> Result<Box<dyn Read + 'a>> {
    match name {
        "gzip" => Ok(Box::new(GzDecoder::new(reader))),
        "bzip2" => Ok(Box::new(BzDecoder::new(reader))),
        "zstd" => {
            let decoder =
                ZstdDecoder::new(reader).map_err(|e| Error::CompressionFailed(e.to_string()))?;
            Ok(Box::new(decoder))
        }
        "xz" | "lzma" => Ok(Box::new(XzDecoder::new(reader))),
        format => Err(Error::CompressionFailed(format!(
            "decompressor \"{}\" is not implemented",
            format
        ))),
    }
}

pub enum CompressWriter<W: Write> {
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
    Zstd(ZstdEncoder<'static, W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> CompressWriter<W> {
    /// Flush the final block and return the underlying sink without
    /// closing it.
    pub fn finish(self) -> Result<W> {
        let result = match self {
            CompressWriter::Gzip(encoder) => encoder.finish(),
            CompressWriter::Bzip2(encoder) => encoder.finish(),
            CompressWriter::Zstd(encoder) => encoder.finish(),
            CompressWriter::Xz(encoder) => encoder.finish(),
        };
        result.map_err(|e| Error::CompressionFailed(e.to_string()))
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            CompressWriter::Gzip(encoder) => encoder.write(buf),
            CompressWriter::Bzip2(encoder) => encoder.write(buf),
            CompressWriter::Zstd(encoder) => encoder.write(buf),
            CompressWriter::Xz(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            CompressWriter::Gzip(encoder) => encoder.flush(),
            CompressWriter::Bzip2(encoder) => encoder.flush(),
            CompressWriter::Zstd(encoder) => encoder.flush(),
            CompressWriter::Xz(encoder) => encoder.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_xz_round_trip() -> Result<()> {
        let input = b"some payload bytes, repeated: some payload bytes".to_vec();

        let mut compressed = Vec::new();
        let mut writer = Compressor::Xz(2).writer(&mut compressed)?;
        writer.write_all(&input)?;
        writer.finish()?;
        assert!(!compressed.is_empty());

        let mut output = Vec::new();
        let mut reader = decompress_reader("xz", Cursor::new(compressed))?;
        reader.read_to_end(&mut output)?;
        assert_eq!(output, input);
        Ok(())
    }

    #[test]
    fn test_finish_does_not_consume_sink() -> Result<()> {
        let mut sink = Vec::new();
        let writer = Compressor::Xz(2).writer(&mut sink)?;
        writer.finish()?;
        // sink holds the empty-stream framing and stays usable
        assert!(!sink.is_empty());
        sink.push(0);
        Ok(())
    }

    #[test]
    fn test_unknown_compressor_name() {
        assert!(matches!(
            decompress_reader("lz4", Cursor::new(Vec::new())),
            Err(Error::CompressionFailed(_))
        ));
        assert!(matches!(
            Compressor::from_name("lz4"),
            Err(Error::CompressionFailed(_))
        ));
    }

    #[test]
    fn test_gzip_round_trip() -> Result<()> {
        let input = b"gzip path".to_vec();
        let mut compressed = Vec::new();
        let mut writer = Compressor::Gzip(9).writer(&mut compressed)?;
        writer.write_all(&input)?;
        writer.finish()?;

        let mut output = Vec::new();
        decompress_reader("gzip", Cursor::new(compressed))?.read_to_end(&mut output)?;
        assert_eq!(output, input);
        Ok(())
    }
}
