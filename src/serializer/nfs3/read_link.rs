//! Serializes `READLINK3args`.

use std::io::{self, Write};

use crate::nfs3::Handle;
use crate::serializer::nfs3::file::handle;

pub fn args(dest: &mut impl Write, link: &Handle) -> io::Result<()> {
    handle(dest, link)
}
