//! Parsing of MOUNT v3 protocol results.

use std::io::Read;

use crate::nfs3::NFS3_FHSIZE;
use crate::parser::primitive::{u32, u32_as_usize, vec_max_size};
use crate::parser::Result;

/// Result of a `MNT` call.
#[derive(Debug)]
pub enum MntResult {
    /// The export was mounted; carries the root file handle.
    Ok { root_handle: Vec<u8> },
    /// The server refused the mount with the given status code.
    Fail { status: u32 },
}

/// Parses a `MOUNTPROC3_MNT` result.
///
/// On success the body carries the root file handle followed by the list of
/// authentication flavors the server accepts; the flavors are consumed and
/// discarded since this client always offers `AUTH_SYS`.
pub fn mnt_result(src: &mut impl Read) -> Result<MntResult> {
    let status = u32(src)?;
    if status != crate::mount3::MNT3_OK {
        return Ok(MntResult::Fail { status });
    }

    let root_handle = vec_max_size(src, NFS3_FHSIZE)?;

    let flavor_count = u32_as_usize(src)?;
    for _ in 0..flavor_count {
        let _flavor = u32(src)?;
    }

    Ok(MntResult::Ok { root_handle })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{mnt_result, MntResult};

    #[test]
    fn test_mnt_ok() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, // MNT3_OK
            0x00, 0x00, 0x00, 0x08, // handle length 8
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
            0x00, 0x00, 0x00, 0x01, // one auth flavor
            0x00, 0x00, 0x00, 0x01, // AUTH_SYS
        ];

        match mnt_result(&mut Cursor::new(DATA)).unwrap() {
            MntResult::Ok { root_handle } => {
                assert_eq!(root_handle, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
            }
            MntResult::Fail { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn test_mnt_fail() {
        const DATA: &[u8] = &[0x00, 0x00, 0x00, 0x0d]; // NFS3ERR_ACCES

        match mnt_result(&mut Cursor::new(DATA)).unwrap() {
            MntResult::Fail { status } => assert_eq!(status, 13),
            MntResult::Ok { .. } => panic!("expected failure"),
        }
    }
}
