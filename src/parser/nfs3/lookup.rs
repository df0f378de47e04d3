//! Parses `LOOKUP3res`.

use std::io::Read;

use crate::nfs3::{Attr, Handle, NFS3_OK};
use crate::parser::nfs3::file::{handle, post_op_attr};
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::Result;

/// `LOOKUP3resok` body.
#[derive(Debug)]
pub struct Resok {
    pub object: Handle,
    pub obj_attr: Option<Attr>,
    pub dir_attr: Option<Attr>,
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => Ok(NfsResult::Resok(Resok {
            object: handle(src)?,
            obj_attr: post_op_attr(src)?,
            dir_attr: post_op_attr(src)?,
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
    fn test_lookup_resok_without_attrs() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, // NFS3_OK
            0x00, 0x00, 0x00, 0x04, // handle length 4
            0xde, 0xad, 0xbe, 0xef,
            0x00, 0x00, 0x00, 0x00, // no obj attrs
            0x00, 0x00, 0x00, 0x00, // no dir attrs
        ];

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.object.0, [0xde, 0xad, 0xbe, 0xef]);
                assert!(ok.obj_attr.is_none());
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }

    #[test]
    fn test_lookup_resfail() {
        const DATA: &[u8] = &[0x00, 0x00, 0x00, 0x02]; // NFS3ERR_NOENT

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resfail(code) => assert_eq!(code, 2),
            NfsResult::Resok(_) => panic!("expected failure"),
        }
    }
}
