//! Parses `MKDIR3res` (same layout as CREATE).

use std::io::Read;

use crate::nfs3::NFS3_OK;
use crate::parser::nfs3::create::{resok_body, Resok};
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::Result;

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => Ok(NfsResult::Resok(resok_body(src)?)),
        code => Ok(NfsResult::Resfail(code)),
    }
}
