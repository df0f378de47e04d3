//! Serializes `READDIR3args`.

use std::io::{self, Write};

use crate::nfs3::{Handle, NFS3_COOKIEVERFSIZE};
use crate::serializer::nfs3::file::handle;
use crate::serializer::{array, u32, u64};

pub fn args(
    dest: &mut impl Write,
    dir: &Handle,
    cookie: u64,
    cookieverf: [u8; NFS3_COOKIEVERFSIZE],
    count: u32,
) -> io::Result<()> {
    handle(dest, dir)?;
    u64(dest, cookie)?;
    array(dest, cookieverf)?;
    u32(dest, count)
}
