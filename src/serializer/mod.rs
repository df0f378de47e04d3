//! XDR (External Data Representation) serialization for the RPC, MOUNT and
//! NFSv3 call messages issued by this client.
//!
//! XDR ensures consistent data representation across architectures by
//! enforcing:
//!
//! - **Big-endian byte order**: all multibyte values are serialized in
//!   big-endian (network byte order)
//! - **4-byte alignment**: all data structures are aligned to 4-byte
//!   boundaries with padding bytes inserted as needed
//!
//! Calls are serialized into an in-memory buffer which the transport then
//! frames into a single TCP record.

pub mod mount;
pub mod nfs3;
pub mod rpc;

use std::io::{self, Error, ErrorKind, Write};

use byteorder::{BigEndian, WriteBytesExt};
use num_traits::ToPrimitive;

/// All serialized data is aligned to [`ALIGNMENT`] (4 bytes) boundaries.
pub const ALIGNMENT: usize = 4;

/// Writes XDR alignment padding for an already-written field of length `n` bytes.
fn padding(dest: &mut dyn Write, n: usize) -> io::Result<()> {
    let padding = (ALIGNMENT - n % ALIGNMENT) % ALIGNMENT;
    let slice = [0u8; ALIGNMENT];
    dest.write_all(&slice[..padding])
}

/// Serializes an XDR `unsigned int` (32-bit) in big-endian order.
pub fn u32(dest: &mut dyn Write, n: u32) -> io::Result<()> {
    dest.write_u32::<BigEndian>(n)
}

/// Serializes an XDR `unsigned hyper` (64-bit) in big-endian order.
pub fn u64(dest: &mut dyn Write, n: u64) -> io::Result<()> {
    dest.write_u64::<BigEndian>(n)
}

/// Serializes an XDR `bool` as `0`/`1` (encoded as a 32-bit integer).
pub fn bool(dest: &mut dyn Write, b: bool) -> io::Result<()> {
    match b {
        true => dest.write_u32::<BigEndian>(1),
        false => dest.write_u32::<BigEndian>(0),
    }
}

/// Serializes an XDR optional value as a boolean discriminator followed by the value (if present).
pub fn option<T, S: Write>(
    dest: &mut S,
    opt: Option<T>,
    cont: impl FnOnce(T, &mut S) -> io::Result<()>,
) -> io::Result<()> {
    match opt {
        Some(val) => bool(dest, true).and_then(|_| cont(val, dest)),
        None => bool(dest, false),
    }
}

/// Serializes a fixed-length XDR opaque value (`opaque[N]`) and adds alignment padding.
pub fn array<const N: usize>(dest: &mut dyn Write, slice: [u8; N]) -> io::Result<()> {
    dest.write_all(&slice).and_then(|_| padding(dest, N))
}

/// Serializes a variable-length XDR opaque value (`opaque<>`): length + bytes + padding.
pub fn vector(dest: &mut dyn Write, vec: &[u8]) -> io::Result<()> {
    let len = vec
        .len()
        .try_into()
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "vector length exceeds u32"))?;
    dest.write_u32::<BigEndian>(len)
        .and_then(|_| dest.write_all(vec))
        .and_then(|_| padding(dest, vec.len()))
}

/// Serializes a variable-length XDR opaque value with an explicit maximum length check.
pub fn vec_max_size(dest: &mut dyn Write, vec: &[u8], max_size: usize) -> io::Result<()> {
    if vec.len() > max_size {
        return Err(Error::new(ErrorKind::InvalidInput, "vector out of bounds"));
    }
    vector(dest, vec)
}

/// Serializes an XDR `string<max_size>` (UTF-8 bytes as counted opaque, bounded).
pub fn string_max_size(dest: &mut dyn Write, string: &str, max_size: usize) -> io::Result<()> {
    vec_max_size(dest, string.as_bytes(), max_size)
}

/// Serializes an unbounded XDR `string<>` (UTF-8 bytes as counted opaque).
pub fn string(dest: &mut dyn Write, string: &str) -> io::Result<()> {
    vector(dest, string.as_bytes())
}

/// Serializes an XDR enum discriminant / union tag as a 32-bit integer.
pub fn variant<T: ToPrimitive>(dest: &mut impl Write, val: T) -> io::Result<()> {
    dest.write_u32::<BigEndian>(
        ToPrimitive::to_u32(&val)
            .ok_or(Error::new(ErrorKind::InvalidInput, "cannot convert to u32"))?,
    )
}

#[cfg(test)]
mod tests {
    use super::{bool, option, string, u32, u64, vector};

    #[test]
    fn test_u32_u64() {
        let mut dest = Vec::new();
        u32(&mut dest, 42).unwrap();
        u64(&mut dest, 256).unwrap();
        assert_eq!(
            dest,
            [0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn test_vector_padded() {
        let mut dest = Vec::new();
        vector(&mut dest, b"abc").unwrap();
        assert_eq!(dest, [0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c', 0x00]);
    }

    #[test]
    fn test_string_aligned() {
        let mut dest = Vec::new();
        string(&mut dest, "test").unwrap();
        assert_eq!(dest, [0x00, 0x00, 0x00, 0x04, b't', b'e', b's', b't']);
    }

    #[test]
    fn test_bool_and_option() {
        let mut dest = Vec::new();
        bool(&mut dest, true).unwrap();
        option(&mut dest, Some(7u32), |v, d| u32(d, v)).unwrap();
        option(&mut dest, None::<u32>, |v, d| u32(d, v)).unwrap();
        assert_eq!(
            dest,
            [
                0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x00,
                0x00, 0x00, 0x00,
            ]
        );
    }
}
