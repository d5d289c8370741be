use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use cascore::error::{CascadeError, CascadeResult};

/// Decodes a raw detector block of little-endian 32 bit counts.
///
/// # Arguments
///
/// * `bytes` - raw block as read from the detector
///
/// # Returns
///
/// * one count per 32 bit word, or `MisalignedBuffer` if the length is not a multiple of 4
///
/// # Examples
///
/// ```
/// use rustcascade::data::raw::decode_counts;
///
/// let counts = decode_counts(&[5, 0, 0, 0, 1, 1, 0, 0]).unwrap();
/// assert_eq!(counts, vec![5, 257]);
/// assert!(decode_counts(&[1, 2, 3]).is_err());
/// ```
pub fn decode_counts(bytes: &[u8]) -> CascadeResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(CascadeError::MisalignedBuffer(bytes.len()));
    }
    let mut counts = vec![0u32; bytes.len() / 4];
    LittleEndian::read_u32_into(bytes, &mut counts);
    Ok(counts)
}

/// Reads and decodes a raw detector file.
pub fn read_counts<P: AsRef<Path>>(path: P) -> CascadeResult<Vec<u32>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    decode_counts(&bytes)
}

#[cfg(test)]
pub(crate) fn encode_counts(counts: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; counts.len() * 4];
    LittleEndian::write_u32_into(counts, &mut bytes);
    bytes
}
