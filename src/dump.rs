// Raw magnitude dump: a small validated header plus little-endian f32 rows.
//
// Layout: four u32 little-endian fields {magic, version, width, height}
// followed by `width * height` IEEE-754 little-endian f32 values in row-major
// order. Readers reject anything that does not carry the magic.

use std::io::{Read, Write};
use thiserror::Error;

pub const DUMP_MAGIC: u32 = 0x4351_5446;
pub const DUMP_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("payload holds {got} values, header promises {expected}")]
    PayloadSize { expected: usize, got: usize },
    #[error("{got} values do not fill a {width}x{height} dump")]
    Dimensions { width: u32, height: u32, got: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeDump {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

pub fn write<W: Write>(
    writer: &mut W,
    width: u32,
    height: u32,
    values: &[f32],
) -> Result<(), DumpError> {
    let expected = width as usize * height as usize;
    if values.len() != expected {
        return Err(DumpError::Dimensions {
            width,
            height,
            got: values.len(),
        });
    }
    let mut bytes = Vec::with_capacity(HEADER_LEN + values.len() * 4);
    for field in [DUMP_MAGIC, DUMP_VERSION, width, height] {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    writer.write_all(&bytes)?;
    Ok(())
}

pub fn read<R: Read>(reader: &mut R) -> Result<MagnitudeDump, DumpError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let field = |i: usize| u32::from_le_bytes(header[i * 4..i * 4 + 4].try_into().unwrap());
    let magic = field(0);
    if magic != DUMP_MAGIC {
        return Err(DumpError::BadMagic(magic));
    }
    let version = field(1);
    if version != DUMP_VERSION {
        return Err(DumpError::UnsupportedVersion(version));
    }
    let (width, height) = (field(2), field(3));
    let expected = width as usize * height as usize;

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    if payload.len() != expected * 4 {
        return Err(DumpError::PayloadSize {
            expected,
            got: payload.len() / 4,
        });
    }
    let values = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();
    Ok(MagnitudeDump {
        width,
        height,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn round_trips_through_a_file() {
        let values: Vec<f32> = (0..12).map(|v| v as f32 * 0.25).collect();
        let mut file = tempfile::tempfile().unwrap();
        write(&mut file, 4, 3, &values).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let dump = read(&mut file).unwrap();
        assert_eq!(dump.width, 4);
        assert_eq!(dump.height, 3);
        assert_eq!(dump.values, values);
    }

    #[test]
    fn header_bytes_are_little_endian() {
        let mut bytes = Vec::new();
        write(&mut bytes, 1, 1, &[1.0]).unwrap();
        assert_eq!(&bytes[..4], &0x4351_5446u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(bytes.len(), HEADER_LEN + 4);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = Vec::new();
        write(&mut bytes, 1, 1, &[1.0]).unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(
            read(&mut bytes.as_slice()),
            Err(DumpError::BadMagic(_))
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bytes = Vec::new();
        write(&mut bytes, 1, 1, &[1.0]).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            read(&mut bytes.as_slice()),
            Err(DumpError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = Vec::new();
        write(&mut bytes, 2, 2, &[0.0; 4]).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            read(&mut bytes.as_slice()),
            Err(DumpError::PayloadSize { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn mismatched_dimensions_refuse_to_write() {
        let mut sink = Vec::new();
        assert!(matches!(
            write(&mut sink, 3, 2, &[0.0; 5]),
            Err(DumpError::Dimensions { .. })
        ));
        assert!(sink.is_empty(), "nothing should be written on a failed dump");
    }
}
