//! NFSv3 protocol constants (RFC 1813) shared by the call serializers and
//! reply parsers.

use num_derive::FromPrimitive;

/// RPC program number of the NFS service.
pub const NFS_PROGRAM: u32 = 100003;
/// NFS protocol version spoken by this client.
pub const NFS_VERSION: u32 = 3;

/// Maximum bytes in an NFSv3 file handle (RFC 1813 2.4).
pub const NFS3_FHSIZE: usize = 64;
/// Bytes in a READDIR cookie verifier.
pub const NFS3_COOKIEVERFSIZE: usize = 8;
/// Bytes in a stable-write verifier.
pub const NFS3_WRITEVERFSIZE: usize = 8;

/// NFSv3 procedure numbers used by this client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Procedure {
    Null = 0,
    GetAttr = 1,
    Lookup = 3,
    ReadLink = 5,
    Read = 6,
    Write = 7,
    Create = 8,
    MkDir = 9,
    SymLink = 10,
    Remove = 12,
    RmDir = 13,
    Rename = 14,
    ReadDir = 16,
    ReadDirPlus = 17,
    Commit = 21,
}

/// `NFS3_OK`: the call completed successfully.
pub const NFS3_OK: u32 = 0;
/// `NFS3ERR_EXIST`: the file specified already exists.
pub const NFS3ERR_EXIST: u32 = 17;
/// `NFS3ERR_NOTDIR`: a non-directory was given to a directory operation.
pub const NFS3ERR_NOTDIR: u32 = 20;
/// `NFS3ERR_ISDIR`: a directory was given to a non-directory operation.
pub const NFS3ERR_ISDIR: u32 = 21;
/// `NFS3ERR_NOTSUPP`: the operation is not supported by the server.
pub const NFS3ERR_NOTSUPP: u32 = 10004;

/// Returns the symbolic name of an NFSv3 status code.
///
/// Codes outside the RFC 1813 set render as `UNKNOWN` rather than failing;
/// the decimal value is always reported next to the name by callers.
pub fn status_name(code: u32) -> &'static str {
    match code {
        0 => "NFS3_OK",
        1 => "NFS3ERR_PERM",
        2 => "NFS3ERR_NOENT",
        5 => "NFS3ERR_IO",
        6 => "NFS3ERR_NXIO",
        13 => "NFS3ERR_ACCES",
        17 => "NFS3ERR_EXIST",
        18 => "NFS3ERR_XDEV",
        19 => "NFS3ERR_NODEV",
        20 => "NFS3ERR_NOTDIR",
        21 => "NFS3ERR_ISDIR",
        22 => "NFS3ERR_INVAL",
        27 => "NFS3ERR_FBIG",
        28 => "NFS3ERR_NOSPC",
        30 => "NFS3ERR_ROFS",
        31 => "NFS3ERR_MLINK",
        63 => "NFS3ERR_NAMETOOLONG",
        66 => "NFS3ERR_NOTEMPTY",
        69 => "NFS3ERR_DQUOT",
        70 => "NFS3ERR_STALE",
        71 => "NFS3ERR_REMOTE",
        10001 => "NFS3ERR_BADHANDLE",
        10002 => "NFS3ERR_NOT_SYNC",
        10003 => "NFS3ERR_BAD_COOKIE",
        10004 => "NFS3ERR_NOTSUPP",
        10005 => "NFS3ERR_TOOSMALL",
        10006 => "NFS3ERR_SERVERFAULT",
        10007 => "NFS3ERR_BADTYPE",
        10008 => "NFS3ERR_JUKEBOX",
        _ => "UNKNOWN",
    }
}

/// File types enumerated in RFC 1813 3.3.1 (`ftype3`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
    BlockDevice = 3,
    CharacterDevice = 4,
    Symlink = 5,
    Socket = 6,
    Fifo = 7,
}

/// Opaque file handle identifying an object on the export (`nfs_fh3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(pub Vec<u8>);

/// Timestamp matching `nfstime3`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Time {
    pub seconds: u32,
    pub nseconds: u32,
}

/// Full file attributes (`fattr3`, RFC 1813 3.3.1).
///
/// The client mostly consults `file_type` and `size`; the rest is parsed
/// because it is always present in replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub file_type: FileType,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub rdev: (u32, u32),
    pub fsid: u64,
    pub fileid: u64,
    pub atime: Time,
    pub mtime: Time,
    pub ctime: Time,
}

/// Stability level requested by WRITE (`stable_how`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum StableHow {
    Unstable = 0,
    DataSync = 1,
    FileSync = 2,
}

/// Creation strategy selector for CREATE (`createmode3`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum CreateMode {
    Unchecked = 0,
    Guarded = 1,
    Exclusive = 2,
}

#[cfg(test)]
mod tests {
    use super::status_name;

    #[test]
    fn known_status_names() {
        assert_eq!(status_name(0), "NFS3_OK");
        assert_eq!(status_name(17), "NFS3ERR_EXIST");
        assert_eq!(status_name(10004), "NFS3ERR_NOTSUPP");
    }

    #[test]
    fn unknown_status_renders_placeholder() {
        assert_eq!(status_name(31337), "UNKNOWN");
    }
}
