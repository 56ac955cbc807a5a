//! Little-endian binary reading helpers shared by the header and codecs.

use coexnet_core::{CoexError, Result};

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            CoexError::MalformedRecord(format!(
                "unexpected end of data reading {what} at byte {}",
                *pos
            ))
        })?;
    let bytes = &data[*pos..end];
    *pos = end;
    Ok(bytes)
}

pub(crate) fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    Ok(take(data, pos, 1, "u8")?[0])
}

pub(crate) fn read_u16_le(data: &[u8], pos: &mut usize) -> Result<u16> {
    let b = take(data, pos, 2, "u16")?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32_le(data: &[u8], pos: &mut usize) -> Result<u32> {
    let b = take(data, pos, 4, "u32")?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_u64_le(data: &[u8], pos: &mut usize) -> Result<u64> {
    let b = take(data, pos, 8, "u64")?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}

pub(crate) fn read_f32_le(data: &[u8], pos: &mut usize) -> Result<f32> {
    read_u32_le(data, pos).map(f32::from_bits)
}

pub(crate) fn read_f64_le(data: &[u8], pos: &mut usize) -> Result<f64> {
    read_u64_le(data, pos).map(f64::from_bits)
}

/// A `u32` length-prefixed UTF-8 string.
pub(crate) fn read_string(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u32_le(data, pos)? as usize;
    let bytes = take(data, pos, len, "string")?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CoexError::MalformedRecord(format!("invalid UTF-8 in string: {e}")))
}

pub(crate) fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_position() {
        let mut data = Vec::new();
        data.push(7u8);
        data.extend_from_slice(&0x1234u16.to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
        write_string(&mut data, "gene");

        let mut pos = 0;
        assert_eq!(read_u8(&data, &mut pos).unwrap(), 7);
        assert_eq!(read_u16_le(&data, &mut pos).unwrap(), 0x1234);
        assert_eq!(read_f32_le(&data, &mut pos).unwrap(), 1.5);
        assert_eq!(read_string(&data, &mut pos).unwrap(), "gene");
        assert_eq!(pos, data.len());
    }

    #[test]
    fn truncated_is_malformed() {
        let data = [1u8, 2, 3];
        let mut pos = 0;
        let err = read_u32_le(&data, &mut pos).unwrap_err();
        assert!(matches!(err, CoexError::MalformedRecord(_)));
        assert_eq!(pos, 0);
    }

    #[test]
    fn string_length_past_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(b"abc");
        let mut pos = 0;
        assert!(read_string(&data, &mut pos).is_err());
    }
}
