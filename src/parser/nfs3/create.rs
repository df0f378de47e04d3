//! Parses `CREATE3res`.
//!
//! CREATE, MKDIR and SYMLINK share the same result layout; the sibling
//! modules reuse [`resok_body`].

use std::io::Read;

use crate::nfs3::{Attr, Handle, NFS3_OK};
use crate::parser::nfs3::file::{post_op_attr, post_op_handle, wcc_data};
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::Result;

/// Result body shared by the node-creating procedures.
#[derive(Debug)]
pub struct Resok {
    /// Handle of the created object, when the server returns one.
    pub object: Option<Handle>,
    pub obj_attr: Option<Attr>,
}

pub(super) fn resok_body(src: &mut impl Read) -> Result<Resok> {
    let object = post_op_handle(src)?;
    let obj_attr = post_op_attr(src)?;
    let _dir_wcc = wcc_data(src)?;
    Ok(Resok { object, obj_attr })
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => Ok(NfsResult::Resok(resok_body(src)?)),
        code => Ok(NfsResult::Resfail(code)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::result;
    use crate::parser::nfs3::NfsResult;

    #[test]
    fn test_create_resok() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, // NFS3_OK
            0x00, 0x00, 0x00, 0x01, // handle present
            0x00, 0x00, 0x00, 0x04, // handle length 4
            0x0a, 0x0b, 0x0c, 0x0d,
            0x00, 0x00, 0x00, 0x00, // no obj attrs
            0x00, 0x00, 0x00, 0x00, // no pre-op attrs
            0x00, 0x00, 0x00, 0x00, // no post-op attrs
        ];

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.object.unwrap().0, [0x0a, 0x0b, 0x0c, 0x0d]);
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }

    #[test]
    fn test_create_exists() {
        const DATA: &[u8] = &[0x00, 0x00, 0x00, 0x11]; // NFS3ERR_EXIST

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resfail(code) => assert_eq!(code, 17),
            NfsResult::Resok(_) => panic!("expected failure"),
        }
    }
}
