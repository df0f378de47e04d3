//! Serializes `RENAME3args`.

use std::io::{self, Write};

use crate::nfs3::Handle;
use crate::serializer::nfs3::file::dir_op_args;

pub fn args(
    dest: &mut impl Write,
    from_dir: &Handle,
    from_name: &str,
    to_dir: &Handle,
    to_name: &str,
) -> io::Result<()> {
    dir_op_args(dest, from_dir, from_name)?;
    dir_op_args(dest, to_dir, to_name)
}
