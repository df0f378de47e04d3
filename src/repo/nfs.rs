//! The NFS-backed remote repository.
//!
//! All remote writes follow the staging discipline: payloads and metadata
//! are written under `.tmp` names and only RENAMEd onto their final names
//! once complete, so concurrent readers never observe partial state.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::artifact::{ArtifactMetadata, ArtifactQuery, PathKind};
use crate::compress;
use crate::repo::local::LocalRepo;
use crate::repo::{ArtifactRepo, Error, Result};
use crate::session::{validate_remote_path, NfsError, NfsSession};

/// Metadata discovery rule: hash-named TOML records, possibly under nested
/// type namespaces.
const METADATA_FILE_PATTERN: &str = r"^(?:(.*)/)?([a-z0-9]{32})\.toml$";

/// Errors that must abort an operation instead of degrading to "not found":
/// transport failures, protocol breakage, traversal attempts, and local
/// permission problems.
fn is_fatal(err: &NfsError) -> bool {
    match err {
        NfsError::Connection(_)
        | NfsError::Mount { .. }
        | NfsError::Timeout
        | NfsError::Parse(_)
        | NfsError::PathTraversal(_) => true,
        NfsError::Io(io) => io.kind() == std::io::ErrorKind::PermissionDenied,
        _ => false,
    }
}

/// `Write` tee feeding a running SHA-256 before the inner sink.
struct HashingSink<'a, W: Write> {
    hasher: &'a mut Sha256,
    inner: W,
}

impl<W: Write> Write for HashingSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn apply_updates(target: &mut BTreeMap<String, String>, updates: &BTreeMap<String, String>) {
    for (key, value) in updates {
        match key.strip_prefix('-') {
            Some(removed) => {
                target.remove(removed);
            }
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Remote repository at `nfs://<host>/<export-path>#<repo-subpath>`.
pub struct NfsRepo {
    host: String,
    mount_path: String,
    repo_path: String,
    session: Mutex<NfsSession>,
}

impl NfsRepo {
    /// Parses the part after `nfs://`.
    pub fn from_uri_part(uri_part: &str) -> Result<NfsRepo> {
        let (location, repo_path) = uri_part.split_once('#').ok_or_else(|| {
            Error::Validation(format!(
                "NFS URI must name a repository sub-path: nfs://<host>/<export>#<repo>, got: {uri_part}"
            ))
        })?;
        let (host, mount_path) = location.split_once('/').ok_or_else(|| {
            Error::Validation(format!(
                "NFS URI must name an export path: nfs://<host>/<export>#<repo>, got: {uri_part}"
            ))
        })?;

        let mount_path = format!("/{}", mount_path.trim_matches('/'));
        Ok(NfsRepo {
            host: host.to_string(),
            mount_path: mount_path.clone(),
            repo_path: repo_path.trim_matches('/').to_string(),
            session: Mutex::new(NfsSession::new(host, &mount_path)),
        })
    }

    /// Parses a full `nfs://...` URI.
    pub fn from_uri(uri: &str) -> Result<NfsRepo> {
        match uri.split_once("://") {
            Some(("nfs", rest)) => NfsRepo::from_uri_part(rest),
            _ => Err(Error::Validation(format!("not an NFS repository URI: {uri}"))),
        }
    }

    /// `<repo>/metadata/<type>/<hash><suffix>`, relative to the export.
    pub fn metadata_path_of(&self, artifact_type: &str, hash: &str, suffix: &str) -> String {
        format!("{}/metadata/{}/{}{}", self.repo_path, artifact_type, hash, suffix)
    }

    /// The artifact's base directory relative to the export: the
    /// content-addressed location, or the relativized `path.location`
    /// override.
    pub fn artifact_base_path_of(
        &self,
        metadata: &ArtifactMetadata,
        suffix: &str,
    ) -> Result<String> {
        match &metadata.path_location {
            Some(location) => {
                let relative = location.strip_prefix(&self.mount_path).ok_or_else(|| {
                    Error::Validation(format!(
                        "artifact location {location:?} is outside the export {:?}",
                        self.mount_path
                    ))
                })?;
                let relative = relative.trim_start_matches('/');
                validate_remote_path(relative).map_err(Error::Nfs)?;
                Ok(format!("{relative}{suffix}"))
            }
            None => Ok(format!(
                "{}/artifacts/{}/{}{}",
                self.repo_path,
                metadata.artifact_type.to_lowercase(),
                metadata.hash()?,
                suffix,
            )),
        }
    }

    /// The payload path relative to the export. `suffix` stages the base
    /// directory (`.tmp`), while the payload name carries the storage
    /// suffix (`.gz`, `.tar.gz`).
    pub fn artifact_path_of(&self, metadata: &ArtifactMetadata, suffix: &str) -> Result<String> {
        match &metadata.path_location {
            Some(_) => self.artifact_base_path_of(metadata, suffix),
            None => Ok(format!(
                "{}/{}{}",
                self.artifact_base_path_of(metadata, suffix)?,
                metadata.name,
                metadata.path_suffix(),
            )),
        }
    }

    /// Streams a remote file (absolute within the export) through SHA-256.
    pub async fn hash_remote_file(&self, remote_path: &str) -> Result<String> {
        let relative = remote_path.strip_prefix(&self.mount_path).ok_or_else(|| {
            Error::Validation(format!(
                "remote path {remote_path:?} is outside the export {:?}",
                self.mount_path
            ))
        })?;
        let relative = relative.trim_start_matches('/').to_string();
        validate_remote_path(&relative).map_err(Error::Nfs)?;

        let mut session = self.session.lock().await;
        session.connected().await?;

        let mut hasher = Sha256::new();
        let mut sink = HashingSink { hasher: &mut hasher, inner: std::io::sink() };
        session.read_stream(&relative, &mut sink).await?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Applies mutable attribute/env updates to a published artifact.
    ///
    /// Keys prefixed `-` are removed. The update is rejected if any
    /// resulting mutable key shadows an immutable one. The publish sequence
    /// keeps the previous record as `.toml.bak`.
    pub async fn edit_artifact(
        &self,
        identifier: &str,
        attr: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
        cache: &LocalRepo,
    ) -> Result<ArtifactMetadata> {
        let query = ArtifactQuery::parse(identifier, BTreeMap::new())?;
        let mut metadata = self
            .lookup(&query, cache)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::QueryNotFound { query: Some(query.clone()) })?;

        apply_updates(&mut metadata.mutable_attributes, attr);
        let clashing: Vec<String> = metadata
            .mutable_attributes
            .keys()
            .filter(|key| metadata.attributes.contains_key(*key))
            .cloned()
            .collect();
        if !clashing.is_empty() {
            return Err(Error::Validation(format!(
                "the following attributes were specified during upload and cannot be changed: {}",
                clashing.join(", ")
            )));
        }

        apply_updates(&mut metadata.mutable_env, env);
        let clashing: Vec<String> = metadata
            .mutable_env
            .keys()
            .filter(|key| metadata.env.contains_key(*key))
            .cloned()
            .collect();
        if !clashing.is_empty() {
            return Err(Error::Validation(format!(
                "the following environment vars were specified during upload and cannot be changed: {}",
                clashing.join(", ")
            )));
        }

        let hash = metadata.hash()?;
        let artifact_type = metadata.artifact_type.clone();
        let tmp_path = self.metadata_path_of(&artifact_type, &hash, ".toml.tmp");
        let bak_path = self.metadata_path_of(&artifact_type, &hash, ".toml.bak");
        let current_path = self.metadata_path_of(&artifact_type, &hash, ".toml");
        let serialized = metadata.to_toml(true)?;

        let mut session = self.session.lock().await;
        session.connected().await?;
        info!(identifier = %identifier, "uploading metadata");

        for stale in [&bak_path, &tmp_path] {
            match session.remove(stale).await {
                Ok(()) => {}
                Err(err) if is_fatal(&err) => return Err(err.into()),
                Err(_) => {} // nothing stale to clear
            }
        }

        session.write(serialized.as_bytes(), &tmp_path).await?;
        session.rename(&current_path, &bak_path).await?;
        session.rename(&tmp_path, &current_path).await?;
        Ok(metadata)
    }

    /// Deletes an artifact's metadata and (unless it lives at a custom
    /// location) its payload tree. Returns `false` when nothing matched.
    pub async fn remove_artifact(&self, identifier: &str, cache: &LocalRepo) -> Result<bool> {
        let query = ArtifactQuery::parse(identifier, BTreeMap::new())?;
        let metadata = match self.lookup(&query, cache).await {
            Ok(results) => results.into_iter().next(),
            Err(Error::QueryNotFound { .. }) => None,
            Err(err) => return Err(err),
        };
        let Some(metadata) = metadata else {
            warn!(identifier = %identifier, "artifact not found");
            return Ok(false);
        };

        let hash = metadata.hash()?;
        let metadata_path = self.metadata_path_of(&metadata.artifact_type, &hash, ".toml");

        let mut session = self.session.lock().await;
        session.connected().await?;
        session.rmtree(&metadata_path).await?;

        match &metadata.path_location {
            Some(location) => {
                info!(location = %location, "artifact has a custom path, not removing payload");
            }
            None => {
                let base = self.artifact_base_path_of(&metadata, "")?;
                session.rmtree(&base).await?;
            }
        }
        Ok(true)
    }
}

#[async_trait(?Send)]
impl ArtifactRepo for NfsRepo {
    async fn upload(&self, metadata: &ArtifactMetadata, local_path: Option<&Path>) -> Result<()> {
        let mut session = self.session.lock().await;
        session.connected().await?;

        if let Some(local_path) = local_path {
            info!(local = %local_path.display(), "uploading artifact");
            let tmp_base = self.artifact_base_path_of(metadata, ".tmp")?;
            let final_base = self.artifact_base_path_of(metadata, "")?;
            let tmp_path = self.artifact_path_of(metadata, ".tmp")?;

            session.upload(local_path, &tmp_path, true).await?;
            session.rename(&tmp_base, &final_base).await?;
        }

        info!("uploading metadata");
        let hash = metadata.hash()?;
        let tmp_metadata = self.metadata_path_of(&metadata.artifact_type, &hash, ".toml.tmp");
        let final_metadata = self.metadata_path_of(&metadata.artifact_type, &hash, ".toml");
        session.write(metadata.to_toml(true)?.as_bytes(), &tmp_metadata).await?;
        session.rename(&tmp_metadata, &final_metadata).await?;
        Ok(())
    }

    async fn lookup(
        &self,
        query: &ArtifactQuery,
        cache: &LocalRepo,
    ) -> Result<Vec<ArtifactMetadata>> {
        let Some(hash) = &query.hash else {
            // Attribute queries run over the local mirror; see
            // `download_metadata_for_type`.
            return Ok(vec![]);
        };

        let mut session = self.session.lock().await;
        session.connected().await?;

        let lock = cache.metadata_lockfile();
        let _guard = lock.acquire().await?;

        let local_path = cache.metadata_path_of(&query.artifact_type, hash, ".toml");
        let tmp_path = cache.metadata_path_of(&query.artifact_type, hash, ".toml.tmp");
        if let Some(parent) = tmp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let remote_path = self.metadata_path_of(&query.artifact_type, hash, ".toml");
        match session.download(&tmp_path, &remote_path).await {
            Ok(_) => {}
            Err(err) if is_fatal(&err) => return Err(err.into()),
            Err(_) => return Err(Error::not_found(query)),
        }

        let contents = std::fs::read_to_string(&tmp_path)?;
        let metadata = ArtifactMetadata::from_toml(&contents)?;
        std::fs::rename(&tmp_path, &local_path)?;
        Ok(vec![metadata])
    }

    async fn download(&self, metadata: &ArtifactMetadata, cache: &LocalRepo) -> Result<PathBuf> {
        let tmp_local_base = cache.artifact_base_path_of(metadata, ".tmp")?;
        let local_base = cache.artifact_base_path_of(metadata, "")?;
        let final_path = cache.artifact_path_of(metadata, "")?;
        let remote_base = self.artifact_base_path_of(metadata, "")?;
        let remote_path = self.artifact_path_of(metadata, "")?;

        let lock = cache.download_lockfile(metadata)?;
        let _guard = lock.acquire().await?;

        // A concurrent process may have materialized it while we waited.
        if local_base.exists() {
            return Ok(final_path);
        }

        for stale in [&tmp_local_base, &local_base] {
            match std::fs::remove_dir_all(stale) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut session = self.session.lock().await;
        session.connected().await?;
        std::fs::create_dir_all(&tmp_local_base)?;

        let actual_hash = match metadata.path_type {
            PathKind::File | PathKind::Dir => {
                if metadata.path_location.is_some() {
                    session.download(&tmp_local_base.join(&metadata.name), &remote_base).await?
                } else {
                    session.download(&tmp_local_base, &remote_base).await?
                }
            }
            PathKind::Gz => {
                let out_path = tmp_local_base.join(&metadata.name);
                let (writer, reader) = compress::chunk_channel();
                let pump = tokio::task::spawn_blocking(move || {
                    compress::gunzip_to_file(reader, &out_path)
                });

                let mut hasher = Sha256::new();
                let streamed = {
                    let mut sink = HashingSink { hasher: &mut hasher, inner: writer };
                    session.read_stream(&remote_path, &mut sink).await
                };
                let pumped = pump.await.map_err(|err| {
                    Error::Io(std::io::Error::other(format!("decompressor failed: {err}")))
                })?;
                streamed?;
                pumped?;
                Some(hex::encode(hasher.finalize()))
            }
            PathKind::TarGz => {
                let unpack_dir = cache.artifact_path_of(metadata, ".tmp")?;
                std::fs::create_dir_all(&unpack_dir)?;
                let (writer, reader) = compress::chunk_channel();
                let pump =
                    tokio::task::spawn_blocking(move || compress::untar_gz(reader, &unpack_dir));

                let mut hasher = Sha256::new();
                let streamed = {
                    let mut sink = HashingSink { hasher: &mut hasher, inner: writer };
                    session.read_stream(&remote_path, &mut sink).await
                };
                let pumped = pump.await.map_err(|err| {
                    Error::Io(std::io::Error::other(format!("decompressor failed: {err}")))
                })?;
                streamed?;
                pumped?;
                Some(hex::encode(hasher.finalize()))
            }
        };

        if let (Some(expected), Some(actual)) = (&metadata.path_hash, &actual_hash) {
            if expected != actual {
                let _ = std::fs::remove_dir_all(&tmp_local_base);
                return Err(Error::Corrupted(format!(
                    "hash mismatch for {}: {expected} != {actual}, \
                     did someone modify the artifact on the server by hand?",
                    metadata.identifier()?,
                )));
            }
        }

        cache.generate_caches_for_artifact(metadata)?;
        std::fs::rename(&tmp_local_base, &local_base)?;
        Ok(final_path)
    }

    async fn download_metadata_for_type(
        &self,
        artifact_type: &str,
        cache: &LocalRepo,
    ) -> Result<()> {
        let base_path = self.metadata_path_of(artifact_type, "", "");
        let pattern = Regex::new(METADATA_FILE_PATTERN).expect("valid metadata pattern");

        let mut session = self.session.lock().await;
        session.connected().await?;

        let lock = cache.metadata_lockfile();
        let _guard = lock.acquire().await?;

        let walked = match session.walk_files(&base_path, false).await {
            Ok(walked) => walked,
            Err(err) if is_fatal(&err) => return Err(err.into()),
            // The type may simply not exist on the remote yet.
            Err(_) => return Ok(()),
        };

        for remote_file in walked {
            let Some(relative) = remote_file.strip_prefix(&base_path) else {
                continue;
            };
            let Some(captures) = pattern.captures(relative) else {
                continue;
            };
            let hash = &captures[2];
            let full_type = match captures.get(1) {
                Some(extra) => format!("{artifact_type}/{}", extra.as_str()),
                None => artifact_type.to_string(),
            };

            let local_path = cache.metadata_path_of(&full_type, hash, ".toml");
            if local_path.exists() {
                continue;
            }
            let tmp_path = cache.metadata_path_of(&full_type, hash, ".toml.tmp");
            if let Some(parent) = tmp_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let remote_metadata = self.metadata_path_of(&full_type, hash, ".toml");
            match session.download(&tmp_path, &remote_metadata).await {
                Ok(_) => std::fs::rename(&tmp_path, &local_path)?,
                Err(err) if is_fatal(&err) => return Err(err.into()),
                // A record disappearing mid-mirror (concurrent remote-rm)
                // only means this refresh sees less; the next one catches up.
                Err(_) => return Ok(()),
            }
        }
        Ok(())
    }

    fn into_uri(&self) -> String {
        format!("nfs://{}{}#{}", self.host, self.mount_path, self.repo_path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;

    use super::NfsRepo;
    use crate::artifact::{ArtifactMetadata, PathKind};
    use crate::repo::{ArtifactRepo, Error};

    fn sample(location: Option<&str>, kind: PathKind) -> ArtifactMetadata {
        ArtifactMetadata {
            name: "image.bin".to_string(),
            description: String::new(),
            pubdate: DateTime::parse_from_rfc3339("2022-05-01T12:00:00+00:00").unwrap(),
            artifact_type: "Firmware".to_string(),
            attributes: BTreeMap::new(),
            env: BTreeMap::new(),
            path_type: kind,
            path_hash: None,
            path_location: location.map(str::to_string),
            mutable_attributes: BTreeMap::new(),
            mutable_env: BTreeMap::new(),
        }
    }

    #[test]
    fn uri_roundtrip() {
        let repo = NfsRepo::from_uri("nfs://10.0.0.7/mnt/share#repo/sub").unwrap();
        assert_eq!(repo.into_uri(), "nfs://10.0.0.7/mnt/share#repo/sub");
    }

    #[test]
    fn uri_requires_fragment_and_path() {
        assert!(matches!(NfsRepo::from_uri_part("hostonly"), Err(Error::Validation(_))));
        assert!(matches!(NfsRepo::from_uri_part("host/path-no-fragment"), Err(Error::Validation(_))));
        assert!(matches!(NfsRepo::from_uri("file:///var/ampm"), Err(Error::Validation(_))));
    }

    #[test]
    fn content_addressed_paths() {
        let repo = NfsRepo::from_uri_part("host/mnt/share#repo").unwrap();
        let metadata = sample(None, PathKind::Gz);
        let hash = metadata.hash().unwrap();

        assert_eq!(
            repo.metadata_path_of("Firmware", &hash, ".toml"),
            format!("repo/metadata/Firmware/{hash}.toml")
        );
        assert_eq!(
            repo.artifact_base_path_of(&metadata, ".tmp").unwrap(),
            format!("repo/artifacts/firmware/{hash}.tmp")
        );
        assert_eq!(
            repo.artifact_path_of(&metadata, "").unwrap(),
            format!("repo/artifacts/firmware/{hash}/image.bin.gz")
        );
    }

    #[test]
    fn location_paths_are_relativized_and_guarded() {
        let repo = NfsRepo::from_uri_part("host/mnt/share#repo").unwrap();

        let inside = sample(Some("/mnt/share/custom/place"), PathKind::File);
        assert_eq!(repo.artifact_base_path_of(&inside, "").unwrap(), "custom/place");

        let outside = sample(Some("/elsewhere/file"), PathKind::File);
        assert!(matches!(repo.artifact_base_path_of(&outside, ""), Err(Error::Validation(_))));

        let traversal = sample(Some("/mnt/share/../etc/passwd"), PathKind::File);
        assert!(matches!(repo.artifact_base_path_of(&traversal, ""), Err(Error::Nfs(_))));
    }

    #[test]
    fn metadata_discovery_pattern() {
        let pattern = regex::Regex::new(super::METADATA_FILE_PATTERN).unwrap();
        let hash = "a".repeat(32);

        let name = format!("{hash}.toml");
        let captures = pattern.captures(&name).unwrap();
        assert!(captures.get(1).is_none());

        let name = format!("nightly/arm/{hash}.toml");
        let captures = pattern.captures(&name).unwrap();
        assert_eq!(&captures[1], "nightly/arm");

        assert!(pattern.captures("short.toml").is_none());
        assert!(pattern.captures(&format!("{hash}.toml.bak")).is_none());
        let upper = "A".repeat(32);
        assert!(pattern.captures(&format!("{upper}.toml")).is_none());
    }
}
