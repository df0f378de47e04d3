//! Parsing of RPC reply headers and portmapper results.

use std::io::Read;

use crate::parser::primitive::{u32, vec_max_size};
use crate::parser::{Error, Result};
use crate::rpc::{ACCEPT_SUCCESS, MSG_ACCEPTED, MSG_REPLY};

const MAX_VERF_SIZE: usize = 400;

/// Parses and validates a complete RPC reply header.
///
/// Checks the message direction, acceptance and accept status, and that the
/// transaction id matches the call that was just issued. On success the
/// source is positioned at the first byte of the procedure-specific results.
pub fn reply_header(src: &mut impl Read, expected_xid: u32) -> Result<()> {
    let xid = u32(src)?;
    if xid != expected_xid {
        return Err(Error::Rpc(format!("xid mismatch: sent {expected_xid}, got {xid}")));
    }

    let msg_type = u32(src)?;
    if msg_type != MSG_REPLY {
        return Err(Error::Rpc(format!("expected reply message, got type {msg_type}")));
    }

    let reply_stat = u32(src)?;
    if reply_stat != MSG_ACCEPTED {
        return Err(Error::Rpc("call denied by server".to_string()));
    }

    // Server verifier is opaque to us.
    let _verf_flavor = u32(src)?;
    let _verf_body = vec_max_size(src, MAX_VERF_SIZE)?;

    let accept_stat = u32(src)?;
    if accept_stat != ACCEPT_SUCCESS {
        return Err(Error::Rpc(format!("call not executed: accept_stat={accept_stat}")));
    }

    Ok(())
}

/// Parses a `PMAPPROC_GETPORT` result: the registered port number.
pub fn getport_result(src: &mut impl Read) -> Result<u16> {
    let port = u32(src)?;
    if port == 0 || port > u16::MAX as u32 {
        return Err(Error::Rpc(format!("program not registered with portmapper: port={port}")));
    }
    Ok(port as u16)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{getport_result, reply_header};
    use crate::parser::Error;

    #[test]
    fn test_accepted_reply() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x2a, // xid = 42
            0x00, 0x00, 0x00, 0x01, // REPLY
            0x00, 0x00, 0x00, 0x00, // MSG_ACCEPTED
            0x00, 0x00, 0x00, 0x00, // verf flavor AUTH_NONE
            0x00, 0x00, 0x00, 0x00, // verf length 0
            0x00, 0x00, 0x00, 0x00, // accept_stat SUCCESS
        ];

        reply_header(&mut Cursor::new(DATA), 42).unwrap();
    }

    #[test]
    fn test_xid_mismatch() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x07,
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];

        assert!(matches!(reply_header(&mut Cursor::new(DATA), 42), Err(Error::Rpc(_))));
    }

    #[test]
    fn test_denied_reply() {
        #[rustfmt::skip]
        const DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x2a,
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x01, // MSG_DENIED
        ];

        assert!(matches!(reply_header(&mut Cursor::new(DATA), 42), Err(Error::Rpc(_))));
    }

    #[test]
    fn test_getport() {
        let mut src = Cursor::new([0x00, 0x00, 0x08, 0x01]);
        assert_eq!(getport_result(&mut src).unwrap(), 2049);
    }

    #[test]
    fn test_getport_unregistered() {
        let mut src = Cursor::new([0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(getport_result(&mut src), Err(Error::Rpc(_))));
    }
}
