//! Serialization of RPC call headers and portmapper arguments.

use std::io::{self, Write};

use crate::rpc::{portmap, AuthFlavor, AuthSys, MSG_CALL, RPC_VERSION};
use crate::serializer::{string_max_size, u32, variant, vector};

const MAX_MACHINE_NAME: usize = 255;

/// Serializes an `AUTH_SYS` credential body (RFC 5531 appendix A).
fn auth_sys_body(dest: &mut impl Write, cred: &AuthSys) -> io::Result<()> {
    let mut body = Vec::new();
    u32(&mut body, cred.stamp)?;
    string_max_size(&mut body, &cred.machine_name, MAX_MACHINE_NAME)?;
    u32(&mut body, cred.uid)?;
    u32(&mut body, cred.gid)?;
    u32(&mut body, cred.aux_gids.len() as u32)?;
    for gid in &cred.aux_gids {
        u32(&mut body, *gid)?;
    }

    variant(dest, AuthFlavor::Sys)?;
    vector(dest, &body)
}

/// Serializes an `AUTH_NONE` opaque_auth (used as the verifier, and as the
/// credential for portmapper calls).
fn auth_none(dest: &mut impl Write) -> io::Result<()> {
    variant(dest, AuthFlavor::None)?;
    vector(dest, &[])
}

/// Serializes a full RPC call header: xid, direction, RPC version, target
/// program/version/procedure, credential and verifier.
pub fn call_header(
    dest: &mut impl Write,
    xid: u32,
    program: u32,
    version: u32,
    procedure: u32,
    cred: Option<&AuthSys>,
) -> io::Result<()> {
    u32(dest, xid)?;
    u32(dest, MSG_CALL)?;
    u32(dest, RPC_VERSION)?;
    u32(dest, program)?;
    u32(dest, version)?;
    u32(dest, procedure)?;
    match cred {
        Some(cred) => auth_sys_body(dest, cred)?,
        None => auth_none(dest)?,
    }
    auth_none(dest)
}

/// Serializes `PMAPPROC_GETPORT` arguments for a TCP service.
pub fn getport_args(dest: &mut impl Write, program: u32, version: u32) -> io::Result<()> {
    u32(dest, program)?;
    u32(dest, version)?;
    u32(dest, portmap::IPPROTO_TCP)?;
    u32(dest, 0)
}

#[cfg(test)]
mod tests {
    use super::{call_header, getport_args};
    use crate::rpc::AuthSys;

    #[test]
    fn test_call_header_auth_none() {
        let mut dest = Vec::new();
        call_header(&mut dest, 1, 100000, 2, 3, None).unwrap();

        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            0x00, 0x00, 0x00, 0x01, // xid
            0x00, 0x00, 0x00, 0x00, // CALL
            0x00, 0x00, 0x00, 0x02, // RPC version
            0x00, 0x01, 0x86, 0xa0, // program 100000
            0x00, 0x00, 0x00, 0x02, // version 2
            0x00, 0x00, 0x00, 0x03, // procedure 3
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // cred AUTH_NONE
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // verf AUTH_NONE
        ];
        assert_eq!(dest, EXPECTED);
    }

    #[test]
    fn test_call_header_auth_sys_length() {
        let mut dest = Vec::new();
        call_header(&mut dest, 7, 100003, 3, 3, Some(&AuthSys::default())).unwrap();

        // cred body: stamp + "localhost" (9 bytes + 3 padding) + uid + gid + gids count
        let cred_body_len = 4 + 4 + 12 + 4 + 4 + 4;
        assert_eq!(dest.len(), 24 + 4 + 4 + cred_body_len + 8);
    }

    #[test]
    fn test_getport_args() {
        let mut dest = Vec::new();
        getport_args(&mut dest, 100005, 3).unwrap();

        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            0x00, 0x01, 0x86, 0xa5, // program 100005
            0x00, 0x00, 0x00, 0x03, // version 3
            0x00, 0x00, 0x00, 0x06, // IPPROTO_TCP
            0x00, 0x00, 0x00, 0x00, // port 0
        ];
        assert_eq!(dest, EXPECTED);
    }
}
