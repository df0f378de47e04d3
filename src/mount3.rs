//! MOUNT v3 protocol constants (RFC 1813 section 5.0).

/// RPC program number of the MOUNT service.
pub const MOUNT_PROGRAM: u32 = 100005;
/// MOUNT protocol version paired with NFSv3.
pub const MOUNT_VERSION: u32 = 3;

/// `MOUNTPROC3_MNT` procedure number.
pub const PROC_MNT: u32 = 1;
/// `MOUNTPROC3_UMNT` procedure number.
pub const PROC_UMNT: u32 = 3;

/// `MNT3_OK`: the mount request succeeded.
pub const MNT3_OK: u32 = 0;

/// Maximum bytes in an export path name.
pub const MNTPATHLEN: usize = 1024;
