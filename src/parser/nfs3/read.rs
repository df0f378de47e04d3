//! Parses `READ3res`.

use std::io::Read;

use crate::nfs3::{Attr, NFS3_OK};
use crate::parser::nfs3::file::post_op_attr;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::{bool, u32, vector};
use crate::parser::Result;

/// `READ3resok` body.
#[derive(Debug)]
pub struct Resok {
    pub file_attr: Option<Attr>,
    pub count: u32,
    pub eof: bool,
    pub data: Vec<u8>,
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => Ok(NfsResult::Resok(Resok {
            file_attr: post_op_attr(src)?,
            count: u32(src)?,
            eof: bool(src)?,
            data: vector(src)?,
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
    fn test_read_resok() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, // NFS3_OK
            0x00, 0x00, 0x00, 0x00, // no attrs
            0x00, 0x00, 0x00, 0x03, // count 3
            0x00, 0x00, 0x00, 0x01, // eof
            0x00, 0x00, 0x00, 0x03, // data length 3
            b'f', b'o', b'o', 0x00,
        ];

        match result(&mut Cursor::new(DATA)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.count, 3);
                assert!(ok.eof);
                assert_eq!(ok.data, b"foo");
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }
}
