//! Gzip compression of cached payloads

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::core::component::ComponentError;

pub fn compress(data: &[u8]) -> Result<Vec<u8>, ComponentError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ComponentError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ComponentError::SerializationError(format!("Corrupt compressed entry: {}", e)))?;
    Ok(out)
}

/// Compress `data` when enabled, large enough, and actually smaller.
/// Returns the bytes to store and whether they are compressed.
pub fn maybe_compress(data: Vec<u8>, enabled: bool, threshold: usize) -> Result<(Vec<u8>, bool), ComponentError> {
    if !enabled || data.len() < threshold {
        return Ok((data, false));
    }

    let compressed = compress(&data)?;
    if compressed.len() < data.len() {
        Ok((compressed, true))
    } else {
        Ok((data, false))
    }
}
