//! Parses `READDIRPLUS3res`.

use std::io::Read;

use crate::nfs3::{Attr, Handle, NFS3_COOKIEVERFSIZE, NFS3_OK};
use crate::parser::nfs3::file::{post_op_attr, post_op_handle};
use crate::parser::nfs3::{status, NfsResult};
use crate::parser::primitive::{array, bool, string_max_size, u64};
use crate::parser::Result;

const MAX_NAME_LEN: usize = 255;

/// One `entryplus3` of a READDIRPLUS reply.
#[derive(Debug)]
pub struct Entry {
    pub fileid: u64,
    pub name: String,
    pub cookie: u64,
    /// Attributes of the entry, when the server chose to include them.
    pub attr: Option<Attr>,
    pub handle: Option<Handle>,
}

/// `READDIRPLUS3resok` body with the entry linked list flattened.
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
                    attr: post_op_attr(src)?,
                    handle: post_op_handle(src)?,
                });
            }
            let eof = bool(src)?;

            Ok(NfsResult::Resok(Resok { cookieverf, entries, eof }))
        }
        code => Ok(NfsResult::Resfail(code)),
    }
}
