//! Streaming compression plumbing.
//!
//! Downloads of `gz`/`tar.gz` artifacts hash the *compressed* byte stream
//! while the payload is inflated on the fly; the NFS reader feeds chunks
//! through a bounded channel into a blocking decompressor so the whole
//! payload is never buffered in memory. Uploads use the same crates to pack
//! payloads into temporary files before transfer.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::mpsc::{Receiver, SyncSender};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Chunks buffered between the async reader and the blocking decompressor.
const CHANNEL_DEPTH: usize = 16;

/// Creates the writer/reader pair bridging the NFS stream into a blocking
/// decompressor. Dropping the writer signals end of stream.
pub fn chunk_channel() -> (ChunkWriter, ChunkReader) {
    let (tx, rx) = std::sync::mpsc::sync_channel(CHANNEL_DEPTH);
    (ChunkWriter { tx }, ChunkReader { rx, current: Vec::new(), pos: 0 })
}

/// `Write` half of the chunk channel.
pub struct ChunkWriter {
    tx: SyncSender<Vec<u8>>,
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "decompressor exited"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `Read` half of the chunk channel.
pub struct ChunkReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0), // sender dropped: end of stream
            }
        }
        let available = &self.current[self.pos..];
        let take = available.len().min(buf.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.pos += take;
        Ok(take)
    }
}

/// Inflates a gzip stream into a single file.
pub fn gunzip_to_file(src: ChunkReader, dest: &Path) -> io::Result<()> {
    let mut decoder = GzDecoder::new(src);
    let mut out = std::fs::File::create(dest)?;
    io::copy(&mut decoder, &mut out)?;
    Ok(())
}

/// Unpacks a gzip-compressed tarball into a directory.
pub fn untar_gz(src: ChunkReader, dest_dir: &Path) -> io::Result<()> {
    let decoder = GzDecoder::new(src);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.unpack(dest_dir)
}

/// Compresses a single file with gzip into `dest`.
pub fn gzip_file(src: &Path, dest: &Path) -> io::Result<()> {
    let mut input = std::fs::File::open(src)?;
    let mut encoder = GzEncoder::new(std::fs::File::create(dest)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Packs a directory into a gzip-compressed tarball at `dest`. Symlinks are
/// stored as symlinks, entries are archive-relative.
pub fn tar_gz_dir(src_dir: &Path, dest: &Path) -> io::Result<()> {
    let encoder = GzEncoder::new(std::fs::File::create(dest)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all("", src_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{chunk_channel, gunzip_to_file, gzip_file, tar_gz_dir, untar_gz};

    #[test]
    fn gzip_roundtrip_through_channel() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        let packed = dir.path().join("plain.txt.gz");
        let unpacked = dir.path().join("unpacked.txt");
        std::fs::write(&plain, b"foo bar\n").unwrap();

        gzip_file(&plain, &packed).unwrap();
        let compressed = std::fs::read(&packed).unwrap();

        let (mut writer, reader) = chunk_channel();
        let dest = unpacked.clone();
        let pump = std::thread::spawn(move || gunzip_to_file(reader, &dest));
        // Feed in small chunks like the NFS reader would.
        for chunk in compressed.chunks(7) {
            writer.write_all(chunk).unwrap();
        }
        drop(writer);
        pump.join().unwrap().unwrap();

        assert_eq!(std::fs::read(&unpacked).unwrap(), b"foo bar\n");
    }

    #[test]
    fn tar_gz_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("sub")).unwrap();
        std::fs::write(tree.join("a.txt"), b"alpha").unwrap();
        std::fs::write(tree.join("sub/b.txt"), b"beta").unwrap();
        std::os::unix::fs::symlink("a.txt", tree.join("link")).unwrap();

        let packed = dir.path().join("tree.tar.gz");
        tar_gz_dir(&tree, &packed).unwrap();

        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let (mut writer, reader) = chunk_channel();
        let dest = out.clone();
        let pump = std::thread::spawn(move || untar_gz(reader, &dest));
        writer.write_all(&std::fs::read(&packed).unwrap()).unwrap();
        drop(writer);
        pump.join().unwrap().unwrap();

        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(out.join("sub/b.txt")).unwrap(), b"beta");
        assert_eq!(std::fs::read_link(out.join("link")).unwrap().to_str(), Some("a.txt"));
    }
}
