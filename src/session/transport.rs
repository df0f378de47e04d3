//! TCP transport for RPC calls: record framing, transaction ids, per-call
//! timeouts, and the Portmap → MOUNT → NFS connection sequence.

use std::io::Cursor;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::mount3::{MOUNT_PROGRAM, MOUNT_VERSION, PROC_MNT, PROC_UMNT};
use crate::nfs3::{Handle, NFS_PROGRAM, NFS_VERSION};
use crate::parser;
use crate::parser::mount::MntResult;
use crate::rpc::{portmap, AuthSys};
use crate::serializer;
use crate::session::NfsError;

/// Per-call timeout; a call that exceeds it is surfaced to the chunk-retry
/// wrapper rather than retried here.
pub const NFS_OP_TIMEOUT: Duration = Duration::from_secs(16);

/// Record-marking header bit flagging the final fragment of a record.
const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Upper bound on a single reply record; reads are capped at 1 GiB chunks so
/// nothing legitimate comes close.
const MAX_REPLY_LEN: usize = 2 * 1024 * 1024 * 1024;

/// One TCP connection to an RPC service.
pub(crate) struct Channel {
    stream: TcpStream,
    xid: u32,
}

impl Channel {
    pub(crate) async fn connect(host: &str, port: u16) -> Result<Self, NfsError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|err| NfsError::Connection(format!("connect to {host}:{port}: {err}")))?;
        stream.set_nodelay(true)?;
        Ok(Channel { stream, xid: rand::thread_rng().gen() })
    }

    /// Issues one RPC call and returns a cursor over the result body,
    /// positioned just past the validated reply header.
    pub(crate) async fn call(
        &mut self,
        program: u32,
        version: u32,
        procedure: u32,
        cred: Option<&AuthSys>,
        args: &[u8],
    ) -> Result<Cursor<Vec<u8>>, NfsError> {
        self.xid = self.xid.wrapping_add(1);
        let xid = self.xid;

        let mut record = Vec::with_capacity(64 + args.len());
        serializer::rpc::call_header(&mut record, xid, program, version, procedure, cred)?;
        record.extend_from_slice(args);

        debug!(program, procedure, xid, len = record.len(), "rpc call");

        let call = async {
            self.stream
                .write_u32((record.len() as u32) | LAST_FRAGMENT)
                .await?;
            self.stream.write_all(&record).await?;
            self.read_record().await
        };

        let reply = tokio::time::timeout(NFS_OP_TIMEOUT, call)
            .await
            .map_err(|_| NfsError::Timeout)??;

        let mut cursor = Cursor::new(reply);
        parser::rpc::reply_header(&mut cursor, xid)?;
        Ok(cursor)
    }

    /// Reads one complete record, reassembling fragments.
    async fn read_record(&mut self) -> Result<Vec<u8>, NfsError> {
        let mut record = Vec::new();
        loop {
            let header = self.stream.read_u32().await?;
            let len = (header & !LAST_FRAGMENT) as usize;
            if record.len() + len > MAX_REPLY_LEN {
                return Err(NfsError::Connection("reply record too large".to_string()));
            }

            let start = record.len();
            record.resize(start + len, 0);
            self.stream.read_exact(&mut record[start..]).await?;

            if header & LAST_FRAGMENT != 0 {
                return Ok(record);
            }
        }
    }
}

/// An established NFS connection: the NFS channel plus the root file handle
/// of the mounted export. The MOUNT channel is kept open so the export can
/// be unmounted on teardown.
pub(crate) struct Connection {
    pub(crate) nfs: Channel,
    mount: Channel,
    export_path: String,
    pub(crate) root: Handle,
}

impl Connection {
    /// Runs the full connection sequence:
    /// portmap → getport(MOUNT) → MNT → getport(NFS) → connect NFS.
    pub(crate) async fn establish(
        host: &str,
        export_path: &str,
        auth: &AuthSys,
    ) -> Result<Connection, NfsError> {
        let mut portmap_channel = Channel::connect(host, portmap::PORT).await?;

        let mount_port =
            getport(&mut portmap_channel, MOUNT_PROGRAM, MOUNT_VERSION).await?;
        let mut mount = Channel::connect(host, mount_port).await?;

        let mut args = Vec::new();
        serializer::mount::dirpath_args(&mut args, export_path)?;
        let mut reply = mount
            .call(MOUNT_PROGRAM, MOUNT_VERSION, PROC_MNT, Some(auth), &args)
            .await?;
        let root = match parser::mount::mnt_result(&mut reply)? {
            MntResult::Ok { root_handle } => Handle(root_handle),
            MntResult::Fail { status } => return Err(NfsError::Mount { code: status }),
        };

        let nfs_port = getport(&mut portmap_channel, NFS_PROGRAM, NFS_VERSION).await?;
        let nfs = Channel::connect(host, nfs_port).await?;

        debug!(host, export_path, mount_port, nfs_port, "nfs connection established");

        Ok(Connection { nfs, mount, export_path: export_path.to_string(), root })
    }

    /// Unmounts the export, ignoring failures. The TCP streams close on drop.
    pub(crate) async fn shutdown(mut self, auth: &AuthSys) {
        let mut args = Vec::new();
        if serializer::mount::dirpath_args(&mut args, &self.export_path).is_ok() {
            let _ = self
                .mount
                .call(MOUNT_PROGRAM, MOUNT_VERSION, PROC_UMNT, Some(auth), &args)
                .await;
        }
    }
}

async fn getport(portmap_channel: &mut Channel, program: u32, version: u32) -> Result<u16, NfsError> {
    let mut args = Vec::new();
    serializer::rpc::getport_args(&mut args, program, version)?;
    let mut reply = portmap_channel
        .call(portmap::PROGRAM, portmap::VERSION, portmap::PROC_GETPORT, None, &args)
        .await?;
    Ok(parser::rpc::getport_result(&mut reply)?)
}
