//! The local content-addressed cache under `/var/ampm`.
//!
//! The cache is never authoritative: it mirrors metadata and materialized
//! payloads and can be wiped freely. It also owns the lock files that
//! serialize cross-process access to itself.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::artifact::{ArtifactMetadata, ArtifactQuery};
use crate::lock::LockFile;
use crate::query;
use crate::repo::{ArtifactRepo, Error, Result};

/// Default cache root.
pub const DEFAULT_ROOT: &str = "/var/ampm";

#[derive(Debug, Clone)]
pub struct LocalRepo {
    root: PathBuf,
}

impl Default for LocalRepo {
    fn default() -> LocalRepo {
        LocalRepo { root: PathBuf::from(DEFAULT_ROOT) }
    }
}

impl LocalRepo {
    pub fn new(root: PathBuf) -> LocalRepo {
        LocalRepo { root }
    }

    pub fn from_uri_part(uri_part: &str) -> LocalRepo {
        LocalRepo { root: PathBuf::from(uri_part) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/metadata/<type>/<hash><suffix>`; an empty hash addresses the
    /// type's directory.
    pub fn metadata_path_of(&self, artifact_type: &str, hash: &str, suffix: &str) -> PathBuf {
        self.root.join("metadata").join(artifact_type).join(format!("{hash}{suffix}"))
    }

    /// `<root>/artifacts/<type>/<hash><suffix>`.
    pub fn artifact_base_path_of(
        &self,
        metadata: &ArtifactMetadata,
        suffix: &str,
    ) -> Result<PathBuf> {
        Ok(self
            .root
            .join("artifacts")
            .join(metadata.artifact_type.to_lowercase())
            .join(format!("{}{suffix}", metadata.hash()?)))
    }

    /// The payload path inside the artifact base. Local payloads are always
    /// stored uncompressed, so no storage suffix is appended to the name.
    pub fn artifact_path_of(&self, metadata: &ArtifactMetadata, suffix: &str) -> Result<PathBuf> {
        Ok(self.artifact_base_path_of(metadata, suffix)?.join(&metadata.name))
    }

    /// Lock serializing metadata-tree access across processes.
    pub fn metadata_lockfile(&self) -> LockFile {
        LockFile::new(self.root.join("metadata.lock"), "the metadata cache")
    }

    /// Lock serializing the download of one artifact across processes.
    pub fn download_lockfile(&self, metadata: &ArtifactMetadata) -> Result<LockFile> {
        let base = self.artifact_base_path_of(metadata, ".lock")?;
        Ok(LockFile::new(base, &metadata.identifier()?))
    }

    /// Parses the cached metadata record for `<type>:<hash>`.
    pub fn metadata_of(&self, artifact_type: &str, hash: &str) -> Result<ArtifactMetadata> {
        let path = self.metadata_path_of(artifact_type, hash, ".toml");
        let contents = std::fs::read_to_string(path)?;
        Ok(ArtifactMetadata::from_toml(&contents)?)
    }

    /// Every cached metadata record under `metadata/<type>/**`, nested type
    /// namespaces included.
    fn lookup_by_type(&self, artifact_type: &str) -> Result<Vec<ArtifactMetadata>> {
        let base = self.metadata_path_of(artifact_type, "", "");
        let pattern = format!("{}/**/*.toml", base.display());
        let paths = glob::glob(&pattern)
            .map_err(|err| Error::Validation(format!("bad metadata glob: {err}")))?;

        let mut records = Vec::new();
        for path in paths {
            let path = path.map_err(|err| std::io::Error::from(err.into_error()))?;
            let contents = std::fs::read_to_string(&path)?;
            match ArtifactMetadata::from_toml(&contents) {
                Ok(metadata) => records.push(metadata),
                Err(err) => {
                    // A half-synced or hand-edited record must not take down
                    // every query over the type.
                    debug!(path = %path.display(), error = %err, "skipping unreadable metadata");
                }
            }
        }
        Ok(records)
    }

    /// Every cached metadata record, across all types. Backs the offline
    /// listing and the search index.
    pub fn all_cached_metadata(&self) -> Result<Vec<ArtifactMetadata>> {
        let pattern = format!("{}/metadata/**/*.toml", self.root.display());
        let paths = glob::glob(&pattern)
            .map_err(|err| Error::Validation(format!("bad metadata glob: {err}")))?;

        let mut records = Vec::new();
        for path in paths {
            let path = path.map_err(|err| std::io::Error::from(err.into_error()))?;
            let contents = std::fs::read_to_string(&path)?;
            if let Ok(metadata) = ArtifactMetadata::from_toml(&contents) {
                records.push(metadata);
            }
        }
        Ok(records)
    }

    /// Writes the `.env` and `.target` cache files for a materialized
    /// artifact. Both live next to the metadata record.
    pub fn generate_caches_for_artifact(&self, metadata: &ArtifactMetadata) -> Result<()> {
        let hash = metadata.hash()?;

        let env_path = self.metadata_path_of(&metadata.artifact_type, &hash, ".env");
        if let Some(parent) = env_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&env_path, self.format_env_file(metadata)?)?;

        let target_path = self.metadata_path_of(&metadata.artifact_type, &hash, ".target");
        match std::fs::remove_file(&target_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        std::os::unix::fs::symlink(self.artifact_path_of(metadata, "")?, &target_path)?;
        Ok(())
    }

    /// Shell-sourceable `export` lines with `${BASE_DIR}` resolved to the
    /// artifact's final local path.
    pub fn format_env_file(&self, metadata: &ArtifactMetadata) -> Result<String> {
        let base_dir = self.artifact_path_of(metadata, "")?;
        let base_dir = base_dir.to_string_lossy();
        let exports = metadata
            .combined_env()
            .into_iter()
            .map(|(key, value)| {
                let value = value.replace("${BASE_DIR}", &base_dir);
                format!(
                    "export {}={}",
                    shell_escape::escape(key.into()),
                    shell_escape::escape(value.into()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(exports)
    }
}

#[async_trait(?Send)]
impl ArtifactRepo for LocalRepo {
    async fn upload(&self, _metadata: &ArtifactMetadata, _local_path: Option<&Path>) -> Result<()> {
        Err(Error::Validation("the local repository does not support upload".to_string()))
    }

    async fn lookup(
        &self,
        query: &ArtifactQuery,
        _cache: &LocalRepo,
    ) -> Result<Vec<ArtifactMetadata>> {
        if let Some(hash) = &query.hash {
            match self.metadata_of(&query.artifact_type, hash) {
                Ok(metadata) => Ok(vec![metadata]),
                Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
                Err(err) => Err(err),
            }
        } else {
            let candidates = self.lookup_by_type(&query.artifact_type)?;
            Ok(query::select(candidates, &query.attr)?)
        }
    }

    async fn download(&self, metadata: &ArtifactMetadata, _cache: &LocalRepo) -> Result<PathBuf> {
        let path = self.artifact_path_of(metadata, "")?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::QueryNotFound { query: None })
        }
    }

    async fn download_metadata_for_type(
        &self,
        _artifact_type: &str,
        _cache: &LocalRepo,
    ) -> Result<()> {
        // The cache is its own mirror.
        Ok(())
    }

    fn into_uri(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
