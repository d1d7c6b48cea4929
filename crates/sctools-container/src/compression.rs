//! Zlib layer of compressed containers.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sctools_core::FormatError;

pub fn compress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).map_err(compression_error)?;
    encoder.finish().map_err(compression_error)
}

/// Inflate `data`, which must hold exactly `expected` bytes. Inflation stops
/// one byte past `expected`, so an oversized stream reports
/// `expected + 1` as its length.
pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, FormatError> {
    let limit = expected as u64 + 1;
    let mut decompressed = Vec::new();
    ZlibDecoder::new(data)
        .take(limit)
        .read_to_end(&mut decompressed)
        .map_err(compression_error)?;
    if decompressed.len() != expected {
        return Err(FormatError::LengthMismatch {
            what: "decompressed payload",
            expected,
            actual: decompressed.len(),
        });
    }
    Ok(decompressed)
}

fn compression_error(e: std::io::Error) -> FormatError {
    FormatError::Compression {
        message: e.to_string(),
    }
}
