//! Parsing of the file-related structures shared by NFSv3 results.

use std::io::Read;

use crate::nfs3::{Attr, FileType, Handle, Time, NFS3_FHSIZE};
use crate::parser::primitive::{option, u32, u64, vec_max_size, variant};
use crate::parser::{Error, Result};

/// Parses an `nfs_fh3` (counted opaque, at most [`NFS3_FHSIZE`] bytes).
pub fn handle(src: &mut impl Read) -> Result<Handle> {
    let bytes = vec_max_size(src, NFS3_FHSIZE).map_err(|_| Error::BadFileHandle)?;
    Ok(Handle(bytes))
}

/// Parses an `nfstime3`.
pub fn time(src: &mut impl Read) -> Result<Time> {
    Ok(Time { seconds: u32(src)?, nseconds: u32(src)? })
}

/// Parses a full `fattr3` structure.
pub fn attr(src: &mut impl Read) -> Result<Attr> {
    Ok(Attr {
        file_type: variant::<FileType>(src)?,
        mode: u32(src)?,
        nlink: u32(src)?,
        uid: u32(src)?,
        gid: u32(src)?,
        size: u64(src)?,
        used: u64(src)?,
        rdev: (u32(src)?, u32(src)?),
        fsid: u64(src)?,
        fileid: u64(src)?,
        atime: time(src)?,
        mtime: time(src)?,
        ctime: time(src)?,
    })
}

/// Parses a `post_op_attr` (optional `fattr3`).
pub fn post_op_attr(src: &mut impl Read) -> Result<Option<Attr>> {
    option(src, |s| attr(s))
}

/// Parses a `post_op_fh3` (optional `nfs_fh3`).
pub fn post_op_handle(src: &mut impl Read) -> Result<Option<Handle>> {
    option(src, |s| handle(s))
}

/// Parses a `wcc_data` block, returning the post-operation attributes.
///
/// The `before` digest only matters for cache validation, which a
/// connectionless batch client does not perform.
pub fn wcc_data(src: &mut impl Read) -> Result<Option<Attr>> {
    let _before = option(src, |s| {
        let _size = u64(s)?;
        let _mtime = time(s)?;
        let _ctime = time(s)?;
        Ok(())
    })?;
    post_op_attr(src)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{attr, handle};
    use crate::nfs3::FileType;
    use crate::parser::Error;

    fn sample_attr_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // NF3REG
        data.extend_from_slice(&0o755u32.to_be_bytes()); // mode
        data.extend_from_slice(&1u32.to_be_bytes()); // nlink
        data.extend_from_slice(&0u32.to_be_bytes()); // uid
        data.extend_from_slice(&0u32.to_be_bytes()); // gid
        data.extend_from_slice(&4096u64.to_be_bytes()); // size
        data.extend_from_slice(&4096u64.to_be_bytes()); // used
        data.extend_from_slice(&0u32.to_be_bytes()); // rdev major
        data.extend_from_slice(&0u32.to_be_bytes()); // rdev minor
        data.extend_from_slice(&7u64.to_be_bytes()); // fsid
        data.extend_from_slice(&99u64.to_be_bytes()); // fileid
        for _ in 0..3 {
            data.extend_from_slice(&1234u32.to_be_bytes());
            data.extend_from_slice(&0u32.to_be_bytes());
        }
        data
    }

    #[test]
    fn test_attr() {
        let parsed = attr(&mut Cursor::new(sample_attr_bytes())).unwrap();
        assert_eq!(parsed.file_type, FileType::Regular);
        assert_eq!(parsed.mode, 0o755);
        assert_eq!(parsed.size, 4096);
        assert_eq!(parsed.fileid, 99);
    }

    #[test]
    fn test_handle_too_long() {
        let mut data = Vec::new();
        data.extend_from_slice(&65u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 68]);

        assert!(matches!(handle(&mut Cursor::new(data)), Err(Error::BadFileHandle)));
    }
}
