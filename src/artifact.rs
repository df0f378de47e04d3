//! Artifact metadata: the canonical TOML document, the identity fingerprint
//! derived from it, and the query type used to locate artifacts.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors around metadata documents and queries.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to serialize metadata: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to parse metadata: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid pubdate: {0}")]
    Pubdate(#[from] chrono::ParseError),
    #[error("{0}")]
    Invalid(String),
}

/// How an artifact payload is stored on the share.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "dir")]
    Dir,
    #[serde(rename = "gz")]
    Gz,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl PathKind {
    /// Suffix appended to the payload file name inside the artifact base.
    pub fn suffix(self) -> &'static str {
        match self {
            PathKind::File | PathKind::Dir => "",
            PathKind::Gz => ".gz",
            PathKind::TarGz => ".tar.gz",
        }
    }
}

/// Truncated base32 SHA-256 used as the artifact identity.
///
/// 32 characters of base32 keep the identifier filesystem- and
/// shell-friendly; this is a dedup key, not a defence against adversarial
/// collisions.
pub fn hash_buffer(buffer: &[u8]) -> String {
    let digest = Sha256::digest(buffer);
    let mut encoded = data_encoding::BASE32.encode(&digest);
    encoded.truncate(32);
    encoded.to_lowercase()
}

#[derive(Serialize, Deserialize)]
struct ArtifactSection {
    name: String,
    description: String,
    pubdate: String,
    #[serde(rename = "type")]
    artifact_type: String,
}

#[derive(Serialize, Deserialize)]
struct PathSection {
    #[serde(rename = "type")]
    path_type: PathKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct MutableSection {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
}

/// The TOML document layout. Table order is the canonical serialization the
/// fingerprint is computed over, so it must never change.
#[derive(Serialize, Deserialize)]
struct Document {
    artifact: ArtifactSection,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    path: PathSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mutable: Option<MutableSection>,
}

/// Immutable record describing one artifact, plus the narrow mutable
/// extension that can be edited after publication.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    pub name: String,
    pub description: String,
    pub pubdate: DateTime<FixedOffset>,
    pub artifact_type: String,
    pub attributes: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub path_type: PathKind,
    pub path_hash: Option<String>,
    pub path_location: Option<String>,
    pub mutable_attributes: BTreeMap<String, String>,
    pub mutable_env: BTreeMap<String, String>,
}

impl ArtifactMetadata {
    /// Serializes to canonical TOML. The mutable section is only included on
    /// request and never participates in the identity.
    pub fn to_toml(&self, with_mutable: bool) -> Result<String, MetadataError> {
        let mutable = if with_mutable
            && !(self.mutable_attributes.is_empty() && self.mutable_env.is_empty())
        {
            Some(MutableSection {
                attributes: self.mutable_attributes.clone(),
                env: self.mutable_env.clone(),
            })
        } else {
            None
        };

        let document = Document {
            artifact: ArtifactSection {
                name: self.name.clone(),
                description: self.description.clone(),
                pubdate: self.pubdate.to_rfc3339(),
                artifact_type: self.artifact_type.clone(),
            },
            attributes: self.attributes.clone(),
            env: self.env.clone(),
            path: PathSection {
                path_type: self.path_type,
                location: self.path_location.clone(),
                hash: self.path_hash.clone(),
            },
            mutable,
        };
        Ok(toml::to_string(&document)?)
    }

    pub fn from_toml(contents: &str) -> Result<ArtifactMetadata, MetadataError> {
        let document: Document = toml::from_str(contents)?;
        let mutable = document.mutable.unwrap_or_default();
        Ok(ArtifactMetadata {
            name: document.artifact.name,
            description: document.artifact.description,
            pubdate: DateTime::parse_from_rfc3339(&document.artifact.pubdate)?,
            artifact_type: document.artifact.artifact_type,
            attributes: document.attributes,
            env: document.env,
            path_type: document.path.path_type,
            path_hash: document.path.hash,
            path_location: document.path.location,
            mutable_attributes: mutable.attributes,
            mutable_env: mutable.env,
        })
    }

    /// The artifact identity: fingerprint of the immutable portion in its
    /// canonical serialization. Editing the mutable section never changes it.
    pub fn hash(&self) -> Result<String, MetadataError> {
        Ok(hash_buffer(self.to_toml(false)?.as_bytes()))
    }

    /// `<type>:<hash>` identifier as printed by `upload`.
    pub fn identifier(&self) -> Result<String, MetadataError> {
        Ok(format!("{}:{}", self.artifact_type, self.hash()?))
    }

    /// Suffix of the stored payload file (`.gz`, `.tar.gz` or nothing).
    pub fn path_suffix(&self) -> &'static str {
        self.path_type.suffix()
    }

    /// The attribute view queries run against: intrinsic fields overlaid
    /// with the immutable attributes, then the mutable ones.
    pub fn combined_attrs(&self) -> BTreeMap<String, String> {
        let mut combined = BTreeMap::new();
        combined.insert("name".to_string(), self.name.clone());
        combined.insert("description".to_string(), self.description.clone());
        combined.insert("pubdate".to_string(), self.pubdate.to_rfc3339());
        if let Some(location) = &self.path_location {
            combined.insert("location".to_string(), location.clone());
        }
        combined.extend(self.attributes.clone());
        combined.extend(self.mutable_attributes.clone());
        combined
    }

    /// Environment exports with mutable overrides applied.
    pub fn combined_env(&self) -> BTreeMap<String, String> {
        let mut combined = self.env.clone();
        combined.extend(self.mutable_env.clone());
        combined
    }
}

/// Checks an artifact type as accepted on upload: no `:` (reserved for the
/// identifier syntax), no leading `.`, no empty segments.
pub fn validate_artifact_type(artifact_type: &str) -> Result<(), MetadataError> {
    if artifact_type.is_empty()
        || artifact_type.contains(':')
        || artifact_type.starts_with('.')
        || artifact_type.split('/').any(|segment| segment.is_empty() || segment.starts_with('.'))
    {
        return Err(MetadataError::Invalid(format!("invalid artifact type: {artifact_type:?}")));
    }
    Ok(())
}

/// A lookup request: artifact type, optional exact hash, attribute filters.
#[derive(Debug, Clone)]
pub struct ArtifactQuery {
    pub artifact_type: String,
    pub hash: Option<String>,
    pub attr: BTreeMap<String, String>,
}

impl ArtifactQuery {
    /// Parses a `<type>[:<hash>]` identifier plus attribute filters.
    pub fn parse(
        identifier: &str,
        attr: BTreeMap<String, String>,
    ) -> Result<ArtifactQuery, MetadataError> {
        let (artifact_type, hash) = match identifier.split_once(':') {
            Some((artifact_type, hash)) => (artifact_type, hash),
            None => (identifier, ""),
        };
        if hash.contains(':') {
            return Err(MetadataError::Invalid(format!("invalid artifact hash: {identifier:?}")));
        }
        let hash = match hash {
            "" => None,
            hash if hash.len() == 32
                && hash.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) =>
            {
                Some(hash.to_string())
            }
            _ => {
                return Err(MetadataError::Invalid(format!(
                    "invalid hash length: {identifier:?}"
                )))
            }
        };
        Ok(ArtifactQuery { artifact_type: artifact_type.to_string(), hash, attr })
    }

    /// Whether this query names exactly one artifact.
    pub fn is_exact(&self) -> bool {
        self.hash.is_some()
    }
}

impl fmt::Display for ArtifactQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hash {
            Some(hash) => write!(f, "{}:{}", self.artifact_type, hash),
            None => {
                let attrs = self
                    .attr
                    .iter()
                    .map(|(key, value)| format!("{key}={value:?}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}({attrs})", self.artifact_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;

    use super::{hash_buffer, ArtifactMetadata, ArtifactQuery, PathKind};

    fn sample() -> ArtifactMetadata {
        ArtifactMetadata {
            name: "foobar.txt".to_string(),
            description: "test artifact".to_string(),
            pubdate: DateTime::parse_from_rfc3339("2022-05-01T12:00:00+00:00").unwrap(),
            artifact_type: "foo".to_string(),
            attributes: BTreeMap::from([("arch".to_string(), "x86_64".to_string())]),
            env: BTreeMap::from([("FOO_DIR".to_string(), "${BASE_DIR}".to_string())]),
            path_type: PathKind::File,
            path_hash: Some("aa".repeat(32)),
            path_location: None,
            mutable_attributes: BTreeMap::new(),
            mutable_env: BTreeMap::new(),
        }
    }

    #[test]
    fn hash_is_stable_across_roundtrip() {
        let meta = sample();
        let serialized = meta.to_toml(true).unwrap();
        let reparsed = ArtifactMetadata::from_toml(&serialized).unwrap();
        assert_eq!(meta.hash().unwrap(), reparsed.hash().unwrap());
        assert_eq!(meta.hash().unwrap().len(), 32);
    }

    #[test]
    fn hash_ignores_mutable_section() {
        let mut meta = sample();
        let before = meta.hash().unwrap();
        meta.mutable_attributes.insert("extra".to_string(), "1".to_string());
        meta.mutable_env.insert("EXTRA".to_string(), "2".to_string());
        assert_eq!(meta.hash().unwrap(), before);
    }

    #[test]
    fn canonical_toml_table_order() {
        let serialized = sample().to_toml(false).unwrap();
        let artifact_pos = serialized.find("[artifact]").unwrap();
        let attributes_pos = serialized.find("[attributes]").unwrap();
        let env_pos = serialized.find("[env]").unwrap();
        let path_pos = serialized.find("[path]").unwrap();
        assert!(artifact_pos < attributes_pos);
        assert!(attributes_pos < env_pos);
        assert!(env_pos < path_pos);
        assert!(!serialized.contains("[mutable"));
    }

    #[test]
    fn mutable_section_roundtrips() {
        let mut meta = sample();
        meta.mutable_attributes.insert("note".to_string(), "later".to_string());
        let serialized = meta.to_toml(true).unwrap();
        assert!(serialized.contains("[mutable.attributes]"));
        let reparsed = ArtifactMetadata::from_toml(&serialized).unwrap();
        assert_eq!(reparsed.mutable_attributes["note"], "later");
    }

    #[test]
    fn combined_attrs_shadow_order() {
        let mut meta = sample();
        meta.mutable_attributes.insert("note".to_string(), "later".to_string());
        let combined = meta.combined_attrs();
        assert_eq!(combined["name"], "foobar.txt");
        assert_eq!(combined["arch"], "x86_64");
        assert_eq!(combined["note"], "later");
    }

    #[test]
    fn hash_buffer_truncates_and_lowercases() {
        let hash = hash_buffer(b"foo bar\n");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn query_parsing() {
        let query =
            ArtifactQuery::parse("foo:abcdefghijklmnopqrstuvwxyz234567", BTreeMap::new()).unwrap();
        assert!(query.is_exact());
        assert_eq!(query.artifact_type, "foo");

        let query = ArtifactQuery::parse("foo", BTreeMap::new()).unwrap();
        assert!(!query.is_exact());

        assert!(ArtifactQuery::parse("foo:short", BTreeMap::new()).is_err());
        assert!(ArtifactQuery::parse("foo:a:b", BTreeMap::new()).is_err());
    }

    #[test]
    fn artifact_type_validation() {
        use super::validate_artifact_type;
        assert!(validate_artifact_type("firmware/nightly").is_ok());
        assert!(validate_artifact_type("with:colon").is_err());
        assert!(validate_artifact_type(".hidden").is_err());
        assert!(validate_artifact_type("a/.b").is_err());
        assert!(validate_artifact_type("").is_err());
    }
}
