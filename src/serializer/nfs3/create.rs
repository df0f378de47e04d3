//! Serializes `CREATE3args` (UNCHECKED mode).

use std::io::{self, Write};

use crate::nfs3::{CreateMode, Handle};
use crate::serializer::nfs3::file::{dir_op_args, set_attr};
use crate::serializer::variant;

/// New files are created world-accessible and empty; the export's ambient
/// trust model governs access, not per-file modes.
pub fn args(dest: &mut impl Write, dir: &Handle, name: &str) -> io::Result<()> {
    dir_op_args(dest, dir, name)?;
    variant(dest, CreateMode::Unchecked as u32)?;
    set_attr(dest, Some(0o777), Some(0))
}
