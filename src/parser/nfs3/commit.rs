//! Parses `COMMIT3res`.

use std::io::Read;

use crate::nfs3::{NFS3_OK, NFS3_WRITEVERFSIZE};
use crate::parser::nfs3::file::wcc_data;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::array;
use crate::parser::Result;

/// `COMMIT3resok` body: the stable-storage verifier.
#[derive(Debug)]
pub struct Resok {
    pub verf: [u8; NFS3_WRITEVERFSIZE],
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => {
            let _file_attr = wcc_data(src)?;
            Ok(NfsResult::Resok(Resok { verf: array::<NFS3_WRITEVERFSIZE>(src)? }))
        }
        code => Ok(NfsResult::Resfail(code)),
    }
}
