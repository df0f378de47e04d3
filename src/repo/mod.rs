//! Artifact repositories: the local content-addressed cache and the
//! NFS-backed remote store, plus the group that stitches them together.

pub mod local;
pub mod nfs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::artifact::{ArtifactMetadata, ArtifactQuery, MetadataError};
use crate::query::QueryError;
use crate::session::NfsError;
use local::LocalRepo;

/// Result alias for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain-level error taxonomy. Everything bubbles to the single top-level
/// handler in the binary; nothing falls back to a partial result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// More than one artifact matched a query that must name exactly one.
    #[error("ambiguous query: {query} matched {} artifacts", options.len())]
    AmbiguousQuery { query: ArtifactQuery, options: Vec<ArtifactMetadata> },

    /// Nothing matched.
    #[error("artifact not found{}", query.as_ref().map(|q| format!(": {q}")).unwrap_or_default())]
    QueryNotFound { query: Option<ArtifactQuery> },

    /// Comparator classification or grouping failed (includes ambiguous
    /// comparisons).
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Downloaded payload hash did not match the metadata.
    #[error("artifact corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Nfs(#[from] NfsError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),
}

impl Error {
    fn not_found(query: &ArtifactQuery) -> Error {
        Error::QueryNotFound { query: Some(query.clone()) }
    }
}

/// A store that can resolve queries to metadata and materialize payloads.
///
/// Remote stores materialize into the local cache, so every operation gets a
/// handle to it.
#[async_trait(?Send)]
pub trait ArtifactRepo: Send + Sync {
    /// Publishes an artifact (payload first when given, then metadata).
    async fn upload(&self, metadata: &ArtifactMetadata, local_path: Option<&Path>) -> Result<()>;

    /// Resolves a query to metadata records. Exact queries consult this
    /// repository only; attribute queries are answered by the local cache
    /// after a metadata refresh.
    async fn lookup(&self, query: &ArtifactQuery, cache: &LocalRepo)
        -> Result<Vec<ArtifactMetadata>>;

    /// Makes the payload available locally and returns its path.
    async fn download(&self, metadata: &ArtifactMetadata, cache: &LocalRepo) -> Result<PathBuf>;

    /// Mirrors all metadata of one type into the local cache.
    async fn download_metadata_for_type(&self, artifact_type: &str, cache: &LocalRepo)
        -> Result<()>;

    /// The repository's URI.
    fn into_uri(&self) -> String;
}

/// Parses a repository URI: `file://<path>` or
/// `nfs://<host>/<export-path>#<repo-subpath>`.
pub fn by_uri(uri: &str) -> Result<Box<dyn ArtifactRepo>> {
    let Some((protocol, rest)) = uri.split_once("://") else {
        return Err(Error::Validation(format!(
            "server URI must be in the format `protocol://host/path`, \
             e.g. `nfs://localhost/export#repo`, but got: {uri}"
        )));
    };
    match protocol {
        "file" => Ok(Box::new(LocalRepo::from_uri_part(rest))),
        "nfs" => Ok(Box::new(nfs::NfsRepo::from_uri_part(rest)?)),
        other => Err(Error::Validation(format!("unknown artifact repository protocol: {other}"))),
    }
}

/// The local cache plus an optional remote, consulted in order.
pub struct RepoGroup {
    local: LocalRepo,
    repos: Vec<Box<dyn ArtifactRepo>>,
}

impl RepoGroup {
    /// Builds the standard group: the local cache, then the remote named by
    /// `remote_uri` (absent in offline mode).
    pub fn new(remote_uri: Option<&str>) -> Result<RepoGroup> {
        RepoGroup::with_local(LocalRepo::default(), remote_uri)
    }

    /// Like [`RepoGroup::new`] with an explicit local cache root.
    pub fn with_local(local: LocalRepo, remote_uri: Option<&str>) -> Result<RepoGroup> {
        let mut repos: Vec<Box<dyn ArtifactRepo>> = vec![Box::new(local.clone())];
        if let Some(uri) = remote_uri {
            repos.push(by_uri(uri)?);
        }
        Ok(RepoGroup { local, repos })
    }

    pub fn local(&self) -> &LocalRepo {
        &self.local
    }

    /// All artifacts matching the query.
    pub async fn lookup(&self, query: &ArtifactQuery) -> Result<Vec<ArtifactMetadata>> {
        if query.is_exact() {
            let mut found = Vec::new();
            for repo in &self.repos {
                match repo.lookup(query, &self.local).await {
                    Ok(results) => found.extend(results),
                    Err(Error::QueryNotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(found)
        } else {
            for repo in &self.repos {
                repo.download_metadata_for_type(&query.artifact_type, &self.local).await?;
            }
            self.local.lookup(query, &self.local).await
        }
    }

    /// Exactly one artifact matching the query, or an error.
    pub async fn lookup_single(&self, query: &ArtifactQuery) -> Result<ArtifactMetadata> {
        if query.is_exact() {
            // First repository with an answer wins; the rest are not asked.
            for repo in &self.repos {
                match repo.lookup(query, &self.local).await {
                    Ok(results) => {
                        if let Some(metadata) = results.into_iter().next() {
                            return Ok(metadata);
                        }
                    }
                    Err(Error::QueryNotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            Err(Error::not_found(query))
        } else {
            let mut results = self.lookup(query).await?;
            match results.len() {
                0 => Err(Error::not_found(query)),
                1 => Ok(results.remove(0)),
                _ => Err(Error::AmbiguousQuery { query: query.clone(), options: results }),
            }
        }
    }

    /// Resolves and materializes: the local path of the single matching
    /// artifact.
    pub async fn get_single(&self, query: &ArtifactQuery) -> Result<(PathBuf, ArtifactMetadata)> {
        let metadata = self.lookup_single(query).await?;

        for repo in &self.repos {
            match repo.download(&metadata, &self.local).await {
                Ok(path) => return Ok((path, metadata)),
                Err(Error::QueryNotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::not_found(query))
    }

    /// Refreshes the local metadata mirror for one artifact type.
    pub async fn download_metadata_for_type(&self, artifact_type: &str) -> Result<()> {
        for repo in &self.repos {
            repo.download_metadata_for_type(artifact_type, &self.local).await?;
        }
        Ok(())
    }
}
