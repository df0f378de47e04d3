//! Parses `READLINK3res`.

use std::io::Read;

use crate::nfs3::NFS3_OK;
use crate::parser::nfs3::file::post_op_attr;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::string_max_size;
use crate::parser::Result;

const MAX_TARGET_LEN: usize = 1024;

/// `READLINK3resok` body: the link target path.
#[derive(Debug)]
pub struct Resok {
    pub target: String,
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => {
            let _attr = post_op_attr(src)?;
            Ok(NfsResult::Resok(Resok { target: string_max_size(src, MAX_TARGET_LEN)? }))
        }
        code => Ok(NfsResult::Resfail(code)),
    }
}
