//! Serializes `LOOKUP3args`.

use std::io::{self, Write};

use crate::nfs3::Handle;
use crate::serializer::nfs3::file::dir_op_args;

pub fn args(dest: &mut impl Write, dir: &Handle, name: &str) -> io::Result<()> {
    dir_op_args(dest, dir, name)
}
