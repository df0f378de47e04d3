//! NFS client session: a POSIX-path façade over the raw protocol.
//!
//! An [`NfsSession`] owns the connection state (including the export's root
//! file handle and the adaptive chunk-size limit) and exposes filesystem
//! primitives in terms of `/`-separated remote paths. All multi-step
//! operations resolve paths segment by segment via `LOOKUP`.

mod transport;

use std::io::{Cursor, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::nfs3::{
    Attr, FileType, Handle, Procedure, StableHow, NFS3ERR_EXIST, NFS3ERR_ISDIR, NFS3ERR_NOTDIR,
    NFS3ERR_NOTSUPP, NFS3_COOKIEVERFSIZE, NFS_PROGRAM, NFS_VERSION,
};
use crate::parser::nfs3::{self as results, NfsResult};
use crate::rpc::AuthSys;
use crate::serializer::nfs3 as args;
use crate::session::transport::Connection;

pub use crate::session::transport::NFS_OP_TIMEOUT;

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, NfsError>;

/// Initial chunk size when `AMPM_CHUNK_SIZE` is unset.
pub const DEFAULT_CHUNK_SIZE: u32 = 32 * 1024;
/// Hard ceiling on the chunk size.
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024 * 1024;
/// Chunks are never halved below this; errors at this size are surfaced.
pub const MIN_CHUNK_SIZE: u32 = 1024;

/// Bytes requested per READDIR call.
const READDIR_COUNT: u32 = 8192;
/// Attribute/handle budget requested per READDIRPLUS call.
const READDIRPLUS_MAXCOUNT: u32 = 32 * 1024;

/// Errors surfaced by session operations.
///
/// The statuses with first-class handling in higher layers get their own
/// variants; every other NFS status is carried numerically with its symbolic
/// name. Only I/O-shaped failures are eligible for the reconnect-and-halve
/// retry; the structural variants never are.
#[derive(Debug, thiserror::Error)]
pub enum NfsError {
    #[error("file already exists")]
    Exists,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("operation not supported")]
    NotSupported,
    #[error("tried to read a non-file")]
    NotRegular,
    #[error("tried to upload a directory here")]
    UnexpectedDirectory,
    #[error("NFS call failed: code={code} ({})", crate::nfs3::status_name(*code))]
    Status { code: u32 },
    #[error("NFS mount failed: code={code} ({})", crate::nfs3::status_name(*code))]
    Mount { code: u32 },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("call timed out")]
    Timeout,
    #[error(transparent)]
    Parse(#[from] crate::parser::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cannot access hidden directories: {0}")]
    PathTraversal(String),
}

impl NfsError {
    /// Whether the chunk-retry wrapper may react by reconnecting. Structural
    /// answers from the server (exists, not-a-directory, ...) are final.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            NfsError::Status { .. }
                | NfsError::Connection(_)
                | NfsError::Timeout
                | NfsError::Parse(_)
                | NfsError::Io(_)
        )
    }
}

/// Maps a non-OK NFS status to its session-level error.
fn status_error(code: u32) -> NfsError {
    match code {
        NFS3ERR_EXIST => NfsError::Exists,
        NFS3ERR_NOTDIR => NfsError::NotDir,
        NFS3ERR_ISDIR => NfsError::IsDir,
        NFS3ERR_NOTSUPP => NfsError::NotSupported,
        code => NfsError::Status { code },
    }
}

/// Rejects remote paths that reach for hidden files or try to climb out of
/// the repository (`..` contains `/.` once rooted, so both are caught here).
pub fn validate_remote_path(remote_path: &str) -> Result<()> {
    if remote_path.starts_with('.') || remote_path.contains("/.") {
        return Err(NfsError::PathTraversal(remote_path.to_string()));
    }
    Ok(())
}

/// Splits a remote path into lookup segments, dropping empty ones and `.`.
fn split_path(remote_path: &str) -> Vec<String> {
    remote_path
        .trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect()
}

/// Rounds `n / 2` up to the next KiB boundary.
fn halve_chunk(n: u32) -> u32 {
    (n / 2).div_ceil(1024) * 1024
}

/// `Write` sink that feeds an optional running SHA-256 alongside the inner
/// writer.
struct HashingWriter<'a, W: Write> {
    inner: W,
    hasher: Option<&'a mut Sha256>,
}

impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn read_full(src: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = src.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// A (re)connectable NFSv3 client session against one export.
pub struct NfsSession {
    host: String,
    export_path: String,
    auth: AuthSys,
    conn: Option<Connection>,
    chunk_size_limit: u32,
    supports_readdirplus: bool,
}

impl NfsSession {
    pub fn new(host: &str, export_path: &str) -> NfsSession {
        let chunk_size_limit = std::env::var("AMPM_CHUNK_SIZE")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_CHUNK_SIZE)
            .min(MAX_CHUNK_SIZE);

        NfsSession {
            host: host.to_string(),
            export_path: export_path.to_string(),
            auth: AuthSys::default(),
            conn: None,
            chunk_size_limit,
            supports_readdirplus: true,
        }
    }

    /// Establishes the connection if there is none yet.
    pub async fn connected(&mut self) -> Result<()> {
        if self.conn.is_none() {
            validate_remote_path(self.export_path.trim_start_matches('/'))?;
            self.conn =
                Some(Connection::establish(&self.host, &self.export_path, &self.auth).await?);
        }
        Ok(())
    }

    /// Tears the connection down (best-effort UMNT) and builds a fresh one.
    async fn reconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.shutdown(&self.auth).await;
        }
        self.connected().await
    }

    /// Unmounts and disconnects.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.shutdown(&self.auth).await;
        }
    }

    async fn call(&mut self, procedure: Procedure, call_args: &[u8]) -> Result<Cursor<Vec<u8>>> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| NfsError::Connection("session not connected".to_string()))?;
        conn.nfs
            .call(NFS_PROGRAM, NFS_VERSION, procedure as u32, Some(&self.auth), call_args)
            .await
    }

    fn root(&self) -> Result<Handle> {
        self.conn
            .as_ref()
            .map(|conn| conn.root.clone())
            .ok_or_else(|| NfsError::Connection("session not connected".to_string()))
    }

    // --- single-call operations -------------------------------------------

    async fn lookup_op(&mut self, dir: &Handle, name: &str) -> Result<(Handle, Option<Attr>)> {
        let mut buf = Vec::new();
        args::lookup::args(&mut buf, dir, name)?;
        let mut reply = self.call(Procedure::Lookup, &buf).await?;
        match results::lookup::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok((ok.object, ok.obj_attr)),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn mkdir_op(&mut self, dir: &Handle, name: &str) -> Result<Option<Handle>> {
        let mut buf = Vec::new();
        args::mk_dir::args(&mut buf, dir, name)?;
        let mut reply = self.call(Procedure::MkDir, &buf).await?;
        match results::mk_dir::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok(ok.object),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn create_op(&mut self, dir: &Handle, name: &str) -> Result<Option<Handle>> {
        let mut buf = Vec::new();
        args::create::args(&mut buf, dir, name)?;
        let mut reply = self.call(Procedure::Create, &buf).await?;
        match results::create::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok(ok.object),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn symlink_op(&mut self, dir: &Handle, name: &str, target: &str) -> Result<()> {
        let mut buf = Vec::new();
        args::symlink::args(&mut buf, dir, name, target)?;
        let mut reply = self.call(Procedure::SymLink, &buf).await?;
        match results::symlink::result(&mut reply)? {
            NfsResult::Resok(_) => Ok(()),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn readlink_op(&mut self, link: &Handle) -> Result<String> {
        let mut buf = Vec::new();
        args::read_link::args(&mut buf, link)?;
        let mut reply = self.call(Procedure::ReadLink, &buf).await?;
        match results::read_link::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok(ok.target),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn remove_op(&mut self, dir: &Handle, name: &str) -> Result<()> {
        let mut buf = Vec::new();
        args::remove::args(&mut buf, dir, name)?;
        let mut reply = self.call(Procedure::Remove, &buf).await?;
        match results::remove::result(&mut reply)? {
            NfsResult::Resok(()) => Ok(()),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn rmdir_op(&mut self, dir: &Handle, name: &str) -> Result<()> {
        let mut buf = Vec::new();
        args::remove::args(&mut buf, dir, name)?;
        let mut reply = self.call(Procedure::RmDir, &buf).await?;
        match results::remove::result(&mut reply)? {
            NfsResult::Resok(()) => Ok(()),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn rename_op(
        &mut self,
        from_dir: &Handle,
        from_name: &str,
        to_dir: &Handle,
        to_name: &str,
    ) -> Result<()> {
        let mut buf = Vec::new();
        args::rename::args(&mut buf, from_dir, from_name, to_dir, to_name)?;
        let mut reply = self.call(Procedure::Rename, &buf).await?;
        match results::rename::result(&mut reply)? {
            NfsResult::Resok(()) => Ok(()),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn commit_op(&mut self, file: &Handle) -> Result<()> {
        let mut buf = Vec::new();
        args::commit::args(&mut buf, file, 0, 0)?;
        let mut reply = self.call(Procedure::Commit, &buf).await?;
        match results::commit::result(&mut reply)? {
            NfsResult::Resok(_) => Ok(()),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn read_dir_op(
        &mut self,
        dir: &Handle,
        cookie: u64,
        cookieverf: [u8; NFS3_COOKIEVERFSIZE],
    ) -> Result<results::read_dir::Resok> {
        let mut buf = Vec::new();
        args::read_dir::args(&mut buf, dir, cookie, cookieverf, READDIR_COUNT)?;
        let mut reply = self.call(Procedure::ReadDir, &buf).await?;
        match results::read_dir::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok(ok),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn read_dir_plus_op(
        &mut self,
        dir: &Handle,
        cookie: u64,
        cookieverf: [u8; NFS3_COOKIEVERFSIZE],
    ) -> Result<results::read_dir_plus::Resok> {
        let mut buf = Vec::new();
        args::read_dir_plus::args(
            &mut buf,
            dir,
            cookie,
            cookieverf,
            READDIR_COUNT,
            READDIRPLUS_MAXCOUNT,
        )?;
        let mut reply = self.call(Procedure::ReadDirPlus, &buf).await?;
        match results::read_dir_plus::result(&mut reply)? {
            NfsResult::Resok(ok) => Ok(ok),
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn try_read(&mut self, file: &Handle, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        args::read::args(&mut buf, file, offset, count)?;
        let mut reply = self.call(Procedure::Read, &buf).await?;
        match results::read::result(&mut reply)? {
            NfsResult::Resok(ok) => {
                if ok.data.is_empty() {
                    return Err(NfsError::Connection("NFS read returned 0 bytes".to_string()));
                }
                Ok(ok.data)
            }
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    async fn try_write(&mut self, file: &Handle, offset: u64, data: &[u8]) -> Result<u32> {
        let mut buf = Vec::new();
        args::write::args(&mut buf, file, offset, StableHow::Unstable, data)?;
        let mut reply = self.call(Procedure::Write, &buf).await?;
        match results::write::result(&mut reply)? {
            NfsResult::Resok(ok) => {
                if ok.count == 0 {
                    return Err(NfsError::Connection("NFS write returned 0 bytes".to_string()));
                }
                Ok(ok.count)
            }
            NfsResult::Resfail(code) => Err(status_error(code)),
        }
    }

    // --- adaptive chunking ------------------------------------------------

    /// Reads one chunk at `offset`, halving the chunk size and reconnecting
    /// on I/O failures until the chunk floor is reached.
    async fn read_chunk(&mut self, file: &Handle, offset: u64) -> Result<Vec<u8>> {
        let mut chunk_size = self.chunk_size_limit;
        loop {
            match self.try_read(file, offset, chunk_size).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() && chunk_size > MIN_CHUNK_SIZE => {
                    chunk_size = halve_chunk(chunk_size);
                    self.chunk_size_limit = chunk_size;
                    warn!(chunk_size, error = %err, "lowering chunk size due to I/O related error");
                    self.reconnect().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes a prefix of `data` at `offset` and returns the written length;
    /// same retry policy as [`NfsSession::read_chunk`].
    async fn write_chunk(&mut self, file: &Handle, offset: u64, data: &[u8]) -> Result<u32> {
        let mut chunk_size = self.chunk_size_limit;
        loop {
            let take = data.len().min(chunk_size as usize);
            match self.try_write(file, offset, &data[..take]).await {
                Ok(count) => return Ok(count),
                Err(err) if err.is_retryable() && chunk_size > MIN_CHUNK_SIZE => {
                    chunk_size = halve_chunk(chunk_size);
                    self.chunk_size_limit = chunk_size;
                    warn!(chunk_size, error = %err, "lowering chunk size due to I/O related error");
                    self.reconnect().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    // --- path primitives --------------------------------------------------

    /// Resolves a path segment by segment; returns the final handle and the
    /// attributes reported by the last `LOOKUP`.
    async fn open(&mut self, parts: &[String]) -> Result<(Handle, Option<Attr>)> {
        let mut handle = self.root()?;
        let mut attrs = None;
        for part in parts {
            let (next, next_attrs) = self.lookup_op(&handle, part).await?;
            handle = next;
            attrs = next_attrs;
        }
        Ok((handle, attrs))
    }

    /// Creates every missing directory on the path; existing segments must be
    /// directories.
    async fn mkdir_p(&mut self, parts: &[String]) -> Result<Handle> {
        let mut dir = self.root()?;
        for part in parts {
            match self.mkdir_op(&dir, part).await {
                Ok(Some(created)) => dir = created,
                Ok(None) => {
                    let (found, _) = self.lookup_op(&dir, part).await?;
                    dir = found;
                }
                Err(NfsError::Exists) => {
                    let (found, attrs) = self.lookup_op(&dir, part).await?;
                    if let Some(attrs) = attrs {
                        if attrs.file_type != FileType::Directory {
                            return Err(NfsError::NotDir);
                        }
                    }
                    dir = found;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(dir)
    }

    /// `mkdir -p` the parents, then CREATE the final component.
    async fn create_with_dirs(&mut self, parts: &[String]) -> Result<Handle> {
        let (name, parents) = match parts.split_last() {
            Some(split) => split,
            None => return Err(NfsError::Connection("empty path in create".to_string())),
        };
        let dir = self.mkdir_p(parents).await?;
        match self.create_op(&dir, name).await? {
            Some(handle) => Ok(handle),
            None => {
                let (handle, _) = self.lookup_op(&dir, name).await?;
                Ok(handle)
            }
        }
    }

    // --- directory walks --------------------------------------------------

    /// Lists the names in a directory, cookie by cookie, hidden entries
    /// included.
    pub async fn list_dir(&mut self, remote_path: &str) -> Result<Vec<String>> {
        validate_remote_path(remote_path)?;
        let (handle, _) = self.open(&split_path(remote_path)).await?;

        let mut names = Vec::new();
        let mut cookie = 0u64;
        let mut cookieverf = [0u8; NFS3_COOKIEVERFSIZE];
        loop {
            let batch = self.read_dir_op(&handle, cookie, cookieverf).await?;
            for entry in &batch.entries {
                names.push(entry.name.clone());
                cookie = entry.cookie;
            }
            cookieverf = batch.cookieverf;
            if batch.eof {
                break;
            }
        }
        Ok(names)
    }

    /// Walks all non-hidden files under `remote_path`, depth first. With
    /// `include_dirs` each directory precedes its contents. A non-directory
    /// target yields just itself.
    pub async fn walk_files(
        &mut self,
        remote_path: &str,
        include_dirs: bool,
    ) -> Result<Vec<String>> {
        Ok(self
            .walk_marked(remote_path, include_dirs)
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    /// Like [`NfsSession::walk_files`] but marks which entries are
    /// directories.
    async fn walk_marked(
        &mut self,
        remote_path: &str,
        include_dirs: bool,
    ) -> Result<Vec<(String, bool)>> {
        validate_remote_path(remote_path)?;
        let mut out = Vec::new();
        self.walk_into(remote_path.to_string(), include_dirs, &mut out).await?;
        Ok(out)
    }

    fn walk_into<'a>(
        &'a mut self,
        remote_path: String,
        include_dirs: bool,
        out: &'a mut Vec<(String, bool)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let (handle, attrs) = self.open(&split_path(&remote_path)).await?;
            if let Some(attrs) = &attrs {
                if attrs.file_type != FileType::Directory {
                    out.push((remote_path, false));
                    return Ok(());
                }
            }
            if include_dirs {
                out.push((remote_path.clone(), true));
            }

            let mut cookie = 0u64;
            let mut cookieverf = [0u8; NFS3_COOKIEVERFSIZE];
            loop {
                // Entry file types come inline from READDIRPLUS; the READDIR
                // fallback leaves them unknown and the recursion's LOOKUP
                // sorts files from directories.
                let (entries, new_verf, eof) = if self.supports_readdirplus {
                    match self.read_dir_plus_op(&handle, cookie, cookieverf).await {
                        Ok(batch) => (
                            batch
                                .entries
                                .into_iter()
                                .map(|entry| {
                                    let file_type = entry.attr.map(|attr| attr.file_type);
                                    (entry.name, file_type, entry.cookie)
                                })
                                .collect::<Vec<_>>(),
                            batch.cookieverf,
                            batch.eof,
                        ),
                        Err(NfsError::NotSupported) => {
                            self.supports_readdirplus = false;
                            continue;
                        }
                        Err(NfsError::NotDir) => {
                            out.push((remote_path, false));
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    }
                } else {
                    match self.read_dir_op(&handle, cookie, cookieverf).await {
                        Ok(batch) => (
                            batch
                                .entries
                                .into_iter()
                                .map(|entry| (entry.name, None, entry.cookie))
                                .collect::<Vec<_>>(),
                            batch.cookieverf,
                            batch.eof,
                        ),
                        Err(NfsError::NotDir) => {
                            out.push((remote_path, false));
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    }
                };

                for (name, file_type, entry_cookie) in entries {
                    cookie = entry_cookie;
                    if name.starts_with('.') {
                        continue;
                    }
                    let child = format!("{}/{}", remote_path.trim_end_matches('/'), name);
                    match file_type {
                        Some(file_type) if file_type != FileType::Directory => {
                            out.push((child, false))
                        }
                        _ => self.walk_into(child, include_dirs, out).await?,
                    }
                }

                cookieverf = new_verf;
                if eof {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Post-order walk: every directory appears after its contents, the
    /// target itself last. Feed for recursive removal.
    pub async fn walk_files_dirs_at_end(&mut self, remote_path: &str) -> Result<Vec<String>> {
        let preorder = self.walk_marked(remote_path, true).await?;

        // The DFS preorder has each directory before its contents; holding
        // directories on a stack until the walk leaves them flips that.
        let mut out: Vec<String> = Vec::with_capacity(preorder.len());
        let mut open_dirs: Vec<String> = Vec::new();
        for (path, is_dir) in preorder {
            while let Some(dir) = open_dirs.last() {
                if path.starts_with(&format!("{dir}/")) {
                    break;
                }
                out.extend(open_dirs.pop());
            }
            if is_dir {
                open_dirs.push(path);
            } else {
                out.push(path);
            }
        }
        while let Some(dir) = open_dirs.pop() {
            out.push(dir);
        }
        Ok(out)
    }

    /// Renames `old_path` to `new_path`, creating the target's parents.
    pub async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        validate_remote_path(old_path)?;
        validate_remote_path(new_path)?;
        let old_parts = split_path(old_path);
        let new_parts = split_path(new_path);
        let (Some((old_name, old_parents)), Some((new_name, new_parents))) =
            (old_parts.split_last(), new_parts.split_last())
        else {
            return Err(NfsError::Connection("empty path in rename".to_string()));
        };

        let (old_dir, _) = self.open(old_parents).await?;
        let new_dir = self.mkdir_p(new_parents).await?;
        self.rename_op(&old_dir, old_name, &new_dir, new_name).await
    }

    /// Creates a symlink at `link_path` pointing at `target`.
    pub async fn symlink(&mut self, target: &str, link_path: &str) -> Result<()> {
        validate_remote_path(link_path)?;
        let parts = split_path(link_path);
        let Some((name, parents)) = parts.split_last() else {
            return Err(NfsError::Connection("empty path in symlink".to_string()));
        };
        let (dir, _) = self.open(parents).await?;
        self.symlink_op(&dir, name, target).await
    }

    /// Reads the target of a symlink.
    pub async fn readlink(&mut self, remote_path: &str) -> Result<String> {
        validate_remote_path(remote_path)?;
        let (handle, _) = self.open(&split_path(remote_path)).await?;
        self.readlink_op(&handle).await
    }

    /// Removes a single directory entry; directories fall back to RMDIR.
    pub async fn remove(&mut self, remote_path: &str) -> Result<()> {
        validate_remote_path(remote_path)?;
        let parts = split_path(remote_path);
        let Some((name, parents)) = parts.split_last() else {
            return Err(NfsError::Connection("empty path in remove".to_string()));
        };
        let (dir, _) = self.open(parents).await?;
        match self.remove_op(&dir, name).await {
            Err(NfsError::IsDir) => self.rmdir_op(&dir, name).await,
            other => other,
        }
    }

    /// Removes a whole subtree, leaves first.
    pub async fn rmtree(&mut self, remote_path: &str) -> Result<()> {
        for path in self.walk_files_dirs_at_end(remote_path).await? {
            info!(path = %path, "removing remote entry");
            self.remove(&path).await?;
        }
        Ok(())
    }

    // --- streaming --------------------------------------------------------

    /// Streams a remote regular file into `sink` chunk by chunk; returns the
    /// byte count.
    pub async fn read_stream(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64> {
        validate_remote_path(remote_path)?;
        let (handle, attrs) = self.open(&split_path(remote_path)).await?;
        let size = match attrs {
            Some(attrs) if attrs.file_type == FileType::Regular => attrs.size,
            _ => return Err(NfsError::NotRegular),
        };

        let mut offset = 0u64;
        while offset < size {
            let data = self.read_chunk(&handle, offset).await?;
            sink.write_all(&data)?;
            offset += data.len() as u64;
        }
        Ok(offset)
    }

    /// Reads a whole remote file into memory.
    pub async fn read(&mut self, remote_path: &str) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        self.read_stream(remote_path, &mut contents).await?;
        Ok(contents)
    }

    /// Streams `src` into a new remote file (parents created as needed),
    /// with UNSTABLE writes and a final COMMIT.
    pub async fn write_stream(&mut self, src: &mut dyn Read, remote_path: &str) -> Result<()> {
        validate_remote_path(remote_path)?;
        let handle = self.create_with_dirs(&split_path(remote_path)).await?;

        let mut offset = 0u64;
        loop {
            let mut buf = vec![0u8; self.chunk_size_limit as usize];
            let filled = read_full(src, &mut buf)?;
            if filled == 0 {
                break;
            }
            let mut slice = &buf[..filled];
            while !slice.is_empty() {
                let wrote = self.write_chunk(&handle, offset, slice).await? as usize;
                offset += wrote as u64;
                slice = &slice[wrote..];
            }
        }

        self.commit_op(&handle).await
    }

    /// Writes an in-memory buffer to a remote file.
    pub async fn write(&mut self, contents: &[u8], remote_path: &str) -> Result<()> {
        let mut cursor = Cursor::new(contents);
        self.write_stream(&mut cursor, remote_path).await
    }

    /// Downloads `remote_path` (file or tree) under `local_path`.
    ///
    /// Returns the SHA-256 hex digest when exactly one regular file was
    /// transferred; directory trees and symlinks are not hashed because the
    /// manifest there is the combined tree, not a single digest.
    pub async fn download(
        &mut self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<Option<String>> {
        validate_remote_path(remote_path)?;

        let mut hasher = Some(Sha256::new());
        let mut got_one_file = false;
        for remote_file in self.walk_files(remote_path, false).await? {
            if got_one_file {
                hasher = None;
            }
            let relative = remote_file[remote_path.len()..].trim_matches('/').to_string();
            let local_file = if relative.is_empty() {
                local_path.to_path_buf()
            } else {
                local_path.join(relative)
            };
            if let Some(parent) = local_file.parent() {
                std::fs::create_dir_all(parent)?;
            }

            match self.readlink(&remote_file).await {
                Ok(target) => {
                    std::os::unix::fs::symlink(target, &local_file)?;
                    hasher = None;
                }
                Err(_) => {
                    // Not a symlink; read as a regular file.
                    use std::os::unix::fs::OpenOptionsExt;
                    let file = std::fs::OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .mode(0o755)
                        .open(&local_file)?;
                    let mut sink = HashingWriter { inner: file, hasher: hasher.as_mut() };
                    self.read_stream(&remote_file, &mut sink).await?;
                }
            }
            got_one_file = true;
        }

        Ok(hasher.filter(|_| got_one_file).map(|hasher| hex::encode(hasher.finalize())))
    }

    /// Uploads a local symlink or regular file to `remote_path`.
    async fn upload_leaf(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let meta = std::fs::symlink_metadata(local_path)?;
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(local_path)?;
            let target = target.to_str().ok_or_else(|| {
                NfsError::Connection(format!("non-UTF-8 symlink target at {}", local_path.display()))
            })?;
            self.symlink(target, remote_path).await
        } else if meta.is_file() {
            let mut file = std::fs::File::open(local_path)?;
            self.write_stream(&mut file, remote_path).await
        } else {
            Err(NfsError::Connection(format!(
                "tried to upload a path that is neither a file nor a directory: {}",
                local_path.display()
            )))
        }
    }

    fn upload_dir<'a>(
        &'a mut self,
        local_path: &'a Path,
        remote_path: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let mut entries = std::fs::read_dir(local_path)?
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.sort_by_key(|entry| entry.file_name());

            for entry in entries {
                let name = entry.file_name();
                let name = name.to_str().ok_or_else(|| {
                    NfsError::Connection(format!("non-UTF-8 file name under {}", local_path.display()))
                })?;
                let child_remote = format!("{remote_path}/{name}");
                let file_type = entry.file_type()?;
                if file_type.is_dir() && !file_type.is_symlink() {
                    self.upload_dir(&entry.path(), child_remote.clone()).await?;
                } else {
                    self.upload_leaf(&entry.path(), &child_remote).await?;
                }
            }
            Ok(())
        })
    }

    /// Uploads a local path. Directories are refused unless `allow_dir`.
    pub async fn upload(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        allow_dir: bool,
    ) -> Result<()> {
        validate_remote_path(remote_path)?;
        let meta = std::fs::symlink_metadata(local_path)?;
        if meta.is_dir() && !meta.file_type().is_symlink() {
            if !allow_dir {
                return Err(NfsError::UnexpectedDirectory);
            }
            debug!(local = %local_path.display(), remote_path, "uploading directory");
            self.upload_dir(local_path, remote_path.to_string()).await
        } else {
            self.upload_leaf(local_path, remote_path).await
        }
    }

    /// Current adaptive chunk ceiling, exposed for diagnostics.
    pub fn chunk_size_limit(&self) -> u32 {
        self.chunk_size_limit
    }
}
