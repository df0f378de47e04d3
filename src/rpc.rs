//! ONC RPC v2 (RFC 5531) message model for the client side: call headers,
//! authentication flavors, and the portmapper binder constants.

/// RPC protocol version spoken in every call.
pub const RPC_VERSION: u32 = 2;

/// `msg_type` discriminant of a call message.
pub const MSG_CALL: u32 = 0;
/// `msg_type` discriminant of a reply message.
pub const MSG_REPLY: u32 = 1;

/// `reply_stat`: the call was accepted.
pub const MSG_ACCEPTED: u32 = 0;
/// `reply_stat`: the call was rejected.
pub const MSG_DENIED: u32 = 1;

/// `accept_stat`: RPC executed successfully.
pub const ACCEPT_SUCCESS: u32 = 0;

/// Authentication flavors understood by this client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::ToPrimitive)]
#[repr(u32)]
pub enum AuthFlavor {
    /// No authentication.
    None = 0,
    /// Standard UNIX authentication (`AUTH_SYS`).
    Sys = 1,
}

/// `AUTH_SYS` credentials sent with MOUNT and NFS calls.
///
/// NFS exports consumed by this client rely on the share's ambient trust;
/// the credentials merely satisfy servers that insist on `AUTH_SYS`.
#[derive(Debug, Clone)]
pub struct AuthSys {
    pub stamp: u32,
    pub machine_name: String,
    pub uid: u32,
    pub gid: u32,
    pub aux_gids: Vec<u32>,
}

impl Default for AuthSys {
    fn default() -> Self {
        AuthSys {
            stamp: 0,
            machine_name: "localhost".to_string(),
            uid: 0,
            gid: 0,
            aux_gids: Vec::new(),
        }
    }
}

/// Portmapper (RFC 1833) binder constants, used to discover the MOUNT and
/// NFS service ports before anything else happens.
pub mod portmap {
    /// RPC program number of the portmapper itself.
    pub const PROGRAM: u32 = 100000;
    /// Portmap protocol version.
    pub const VERSION: u32 = 2;
    /// `PMAPPROC_GETPORT` procedure number.
    pub const PROC_GETPORT: u32 = 3;
    /// Transport selector for TCP in `GETPORT` arguments.
    pub const IPPROTO_TCP: u32 = 6;
    /// Well-known TCP port the portmapper listens on.
    pub const PORT: u16 = 111;
}
