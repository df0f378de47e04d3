//! Parses `WRITE3res`.

use std::io::Read;

use crate::nfs3::{Attr, NFS3_OK, NFS3_WRITEVERFSIZE};
use crate::parser::nfs3::file::wcc_data;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::{array, u32};
use crate::parser::Result;

/// `WRITE3resok` body.
#[derive(Debug)]
pub struct Resok {
    pub file_attr: Option<Attr>,
    pub count: u32,
    pub committed: u32,
    pub verf: [u8; NFS3_WRITEVERFSIZE],
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => Ok(NfsResult::Resok(Resok {
            file_attr: wcc_data(src)?,
            count: u32(src)?,
            committed: u32(src)?,
            verf: array::<NFS3_WRITEVERFSIZE>(src)?,
        })),
        code => Ok(NfsResult::Resfail(code)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::result;
    use crate::parser::nfs3::NfsResult;

    #[test]
    fn test_write_resok() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, // NFS3_OK
            0x00, 0x00, 0x00, 0x00, // no pre-op attrs
            0x00, 0x00, 0x00, 0x00, // no post-op attrs
            0x00, 0x00, 0x40, 0x00, // count 16384
            0x00, 0x00, 0x00, 0x00, // UNSTABLE
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // verf
        ];

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.count, 16384);
                assert_eq!(ok.verf, [1, 2, 3, 4, 5, 6, 7, 8]);
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }
}
