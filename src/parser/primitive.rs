//! Primitive XDR data type parsing utilities.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use num_traits::FromPrimitive;

use super::{Error, Result};

/// The XDR alignment in bytes.
pub const ALIGNMENT: usize = 4;

/// Reads and discards padding bytes to ensure XDR alignment.
pub fn padding(src: &mut impl Read, n: usize) -> Result<()> {
    let mut buf = [0u8; ALIGNMENT];
    let padding = (ALIGNMENT - n % ALIGNMENT) % ALIGNMENT;
    src.read_exact(&mut buf[..padding]).map_err(|_| Error::IncorrectPadding)
}

/// Parses a `u32` (unsigned 32-bit integer) from the `Read` source, in Big-Endian format.
pub fn u32(src: &mut impl Read) -> Result<u32> {
    src.read_u32::<BigEndian>().map_err(Error::IO)
}

/// Parses a `u64` (unsigned 64-bit integer) from the `Read` source, in Big-Endian format.
pub fn u64(src: &mut impl Read) -> Result<u64> {
    src.read_u64::<BigEndian>().map_err(Error::IO)
}

/// Parses a `u32` and converts it to `usize`.
pub fn u32_as_usize(src: &mut impl Read) -> Result<usize> {
    Ok(u32(src)? as usize)
}

/// Parses an XDR boolean (encoded as a `u32`) from the `Read` source.
pub fn bool(src: &mut impl Read) -> Result<bool> {
    match u32(src)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::EnumDiscMismatch),
    }
}

/// Parses an optional XDR type. The option is encoded as a boolean preceding the actual type.
pub fn option<T, S: Read>(
    src: &mut S,
    cont: impl FnOnce(&mut S) -> Result<T>,
) -> Result<Option<T>> {
    match bool(src)? {
        true => Ok(Some(cont(src)?)),
        false => Ok(None),
    }
}

/// Parses a fixed-size array of bytes `[u8; N]` from the `Read` source, including padding.
pub fn array<const N: usize>(src: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    src.read_exact(&mut buf).map_err(Error::IO)?;
    padding(src, N)?;
    Ok(buf)
}

/// Parses a variable-length vector of bytes (opaque data) from the `Read` source.
/// The vector's length is encoded as a `u32` preceding the data.
pub fn vector(src: &mut impl Read) -> Result<Vec<u8>> {
    let size = u32_as_usize(src)?;
    let mut vec = vec![0u8; size];
    src.read_exact(vec.as_mut_slice()).map_err(Error::IO)?;
    padding(src, size)?;
    Ok(vec)
}

/// Parses a variable-length vector of bytes with a maximum allowed size.
pub fn vec_max_size(src: &mut impl Read, max_size: usize) -> Result<Vec<u8>> {
    let size = u32_as_usize(src)?;
    if size > max_size {
        return Err(Error::MaxElemLimit);
    }
    let mut vec = vec![0u8; size];
    src.read_exact(vec.as_mut_slice()).map_err(Error::IO)?;
    padding(src, size)?;
    Ok(vec)
}

/// Parses an XDR string with a maximum allowed size.
pub fn string_max_size(src: &mut impl Read, max_size: usize) -> Result<String> {
    let vec = vec_max_size(src, max_size)?;
    String::from_utf8(vec).map_err(Error::IncorrectString)
}

/// Parses an XDR string from the `Read` source.
pub fn string(src: &mut impl Read) -> Result<String> {
    let vec = vector(src)?;
    String::from_utf8(vec).map_err(Error::IncorrectString)
}

/// Parses an XDR enum variant from the `Read` source.
pub fn variant<T: FromPrimitive>(src: &mut impl Read) -> Result<T> {
    FromPrimitive::from_u32(u32(src)?).ok_or(Error::EnumDiscMismatch)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{bool, option, string, u32, u64, vector};
    use crate::parser::Error;

    #[test]
    fn test_u32_u64() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x2a]);
        assert_eq!(u32(&mut src).unwrap(), 42);

        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(u64(&mut src).unwrap(), 256);
    }

    #[test]
    fn test_bool_invalid_discriminant() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x02]);
        assert!(matches!(bool(&mut src), Err(Error::EnumDiscMismatch)));
    }

    #[test]
    fn test_vector_with_padding() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c', 0x00]);
        assert_eq!(vector(&mut src).unwrap(), b"abc");
    }

    #[test]
    fn test_vector_missing_padding() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c']);
        assert!(matches!(vector(&mut src), Err(Error::IncorrectPadding)));
    }

    #[test]
    fn test_string() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x04, b't', b'e', b's', b't']);
        assert_eq!(string(&mut src).unwrap(), "test");
    }

    #[test]
    fn test_option() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x07]);
        assert_eq!(option(&mut src, |s| u32(s)).unwrap(), Some(7));

        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x00]);
        assert_eq!(option(&mut src, |s| u32(s)).unwrap(), None);
    }
}
