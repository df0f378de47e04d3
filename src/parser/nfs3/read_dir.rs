//! Parses `READDIR3res`.

use std::io::Read;

use crate::nfs3::{NFS3_COOKIEVERFSIZE, NFS3_OK};
use crate::parser::nfs3::file::post_op_attr;
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::{array, bool, string_max_size, u64};
use crate::parser::Result;

const MAX_NAME_LEN: usize = 255;

/// One `entry3` of a READDIR reply.
#[derive(Debug)]
pub struct Entry {
    pub fileid: u64,
    pub name: String,
    pub cookie: u64,
}

/// `READDIR3resok` body with the entry linked list flattened.
#[derive(Debug)]
pub struct Resok {
    pub cookieverf: [u8; NFS3_COOKIEVERFSIZE],
    pub entries: Vec<Entry>,
    pub eof: bool,
}

pub fn result(src: &mut impl Read) -> Result<NfsResult<Resok>> {
    match status(src)? {
        NFS3_OK => {
            let _dir_attr = post_op_attr(src)?;
            let cookieverf = array::<NFS3_COOKIEVERFSIZE>(src)?;

            let mut entries = Vec::new();
            while bool(src)? {
                entries.push(Entry {
                    fileid: u64(src)?,
                    name: string_max_size(src, MAX_NAME_LEN)?,
                    cookie: u64(src)?,
                });
            }
            let eof = bool(src)?;

            Ok(NfsResult::Resok(Resok { cookieverf, entries, eof }))
        }
        code => Ok(NfsResult::Resfail(code)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::result;
    use crate::parser::nfs3::NfsResult;

    #[test]
    fn test_readdir_two_entries() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes()); // NFS3_OK
        data.extend_from_slice(&0u32.to_be_bytes()); // no dir attrs
        data.extend_from_slice(&[0u8; 8]); // cookieverf

        data.extend_from_slice(&1u32.to_be_bytes()); // entry follows
        data.extend_from_slice(&11u64.to_be_bytes()); // fileid
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(b"a."); // name "a." + padding
        data.extend_from_slice(&[0u8; 2]);
        data.extend_from_slice(&1u64.to_be_bytes()); // cookie

        data.extend_from_slice(&1u32.to_be_bytes()); // entry follows
        data.extend_from_slice(&12u64.to_be_bytes());
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"file");
        data.extend_from_slice(&2u64.to_be_bytes());

        data.extend_from_slice(&0u32.to_be_bytes()); // end of list
        data.extend_from_slice(&1u32.to_be_bytes()); // eof

        match result(&mut Cursor::new(data)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.entries.len(), 2);
                assert_eq!(ok.entries[0].name, "a.");
                assert_eq!(ok.entries[1].cookie, 2);
                assert!(ok.eof);
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }
}
