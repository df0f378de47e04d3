//! Serializes `SYMLINK3args`.

use std::io::{self, Write};

use crate::nfs3::Handle;
use crate::serializer::nfs3::file::{dir_op_args, set_attr};
use crate::serializer::string_max_size;

const MAX_TARGET_LEN: usize = 1024;

pub fn args(dest: &mut impl Write, dir: &Handle, name: &str, target: &str) -> io::Result<()> {
    dir_op_args(dest, dir, name)?;
    set_attr(dest, None, None)?;
    string_max_size(dest, target, MAX_TARGET_LEN)
}
