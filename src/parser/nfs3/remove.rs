//! Parses `REMOVE3res` and `RMDIR3res` (identical layouts).

use std::io::Read;

use crate::nfs3::NFS3_OK;
use crate::parser::nfs3::file::wcc_data;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::Result;

pub fn result(src: &mut impl Read) -> Result<NfsResult<()>> {
    match status(src)? {
        NFS3_OK => {
            let _dir_wcc = wcc_data(src)?;
            Ok(NfsResult::Resok(()))
        }
        code => Ok(NfsResult::Resfail(code)),
    }
}
