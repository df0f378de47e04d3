//! Serialization of the file-related structures shared by NFSv3 arguments.

use std::io::{self, Write};

use crate::nfs3::{Handle, NFS3_FHSIZE};
use crate::serializer::{option, string_max_size, u32, u64, vec_max_size};

const MAX_NAME_LEN: usize = 255;

/// Serializes an `nfs_fh3`.
pub fn handle(dest: &mut impl Write, handle: &Handle) -> io::Result<()> {
    vec_max_size(dest, &handle.0, NFS3_FHSIZE)
}

/// Serializes a `diropargs3`: directory handle plus entry name.
pub fn dir_op_args(dest: &mut impl Write, dir: &Handle, name: &str) -> io::Result<()> {
    handle(dest, dir)?;
    string_max_size(dest, name, MAX_NAME_LEN)
}

/// Serializes a `sattr3` carrying only the attributes this client sets:
/// optional mode and size, everything else "don't change".
pub fn set_attr(dest: &mut impl Write, mode: Option<u32>, size: Option<u64>) -> io::Result<()> {
    option(dest, mode, |m, d| u32(d, m))?; // mode
    u32(dest, 0)?; // uid: don't change
    u32(dest, 0)?; // gid: don't change
    option(dest, size, |s, d| u64(d, s))?; // size
    u32(dest, 0)?; // atime: DONT_CHANGE
    u32(dest, 0) // mtime: DONT_CHANGE
}
