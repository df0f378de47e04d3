//! Command-line adapter around the artifact repositories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sha2::{Digest, Sha256};
use tracing::info;

use ampm::artifact::{validate_artifact_type, ArtifactMetadata, ArtifactQuery, PathKind};
use ampm::compress;
use ampm::query::QueryError;
use ampm::repo::local::LocalRepo;
use ampm::repo::nfs::NfsRepo;
use ampm::repo::{ArtifactRepo, Error, RepoGroup};
use ampm::session::NfsError;
use ampm::template::{self, Context, Value};

const SEARCH_TEMPLATE: &str = include_str!("../assets/search.html");

#[derive(Parser)]
#[command(name = "ampm", about = "Artifact package manager over raw NFSv3 shares")]
struct Cli {
    /// Remote repository URI, e.g. nfs://host/export#repo
    #[arg(long, env = "AMPM_SERVER", global = true)]
    server: Option<String>,

    /// Never touch the remote repository.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ListFormat {
    Pretty,
    Json,
    Short,
    IndexFile,
    IndexWebpage,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch an artifact and print its local path.
    Get {
        /// <type>:<hash>, or <type> with attribute filters.
        identifier: String,
        /// Attribute filters, key=value (comparators allowed).
        #[arg(short = 'a', long = "attr")]
        attr: Vec<String>,
    },
    /// List matching artifacts.
    List {
        /// <type>[:<hash>]; all cached artifacts when omitted.
        identifier: Option<String>,
        #[arg(short = 'a', long = "attr")]
        attr: Vec<String>,
        #[arg(short = 'f', long = "format", value_enum, default_value = "pretty")]
        format: ListFormat,
    },
    /// Print the environment exports of an artifact.
    Env {
        identifier: String,
        #[arg(short = 'a', long = "attr")]
        attr: Vec<String>,
    },
    /// Upload an artifact to the remote repository.
    Upload {
        /// Payload to upload; may be omitted when --remote-path names an
        /// already-uploaded file.
        local_path: Option<PathBuf>,
        /// Artifact type.
        #[arg(long = "type")]
        artifact_type: String,
        /// Override the artifact name (default: the file name).
        #[arg(long)]
        name: Option<String>,
        /// Artifact description.
        #[arg(long)]
        description: Option<String>,
        /// Store the payload compressed (.gz / .tar.gz).
        #[arg(long, overrides_with = "uncompressed")]
        compressed: bool,
        /// Store the payload as-is.
        #[arg(long)]
        uncompressed: bool,
        /// Place the payload at this absolute path on the share instead of
        /// the content-addressed location.
        #[arg(long)]
        remote_path: Option<String>,
        /// Artifact attributes, key=value.
        #[arg(short = 'a', long = "attr")]
        attr: Vec<String>,
        /// Environment exports, KEY=value; values may contain ${BASE_DIR}.
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
    },
    /// Edit the mutable metadata of a published artifact.
    Edit {
        identifier: String,
        /// Mutable attribute updates; prefix the key with '-' to delete.
        #[arg(short = 'a', long = "attr")]
        attr: Vec<String>,
        /// Mutable env updates; prefix the key with '-' to delete.
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
    },
    /// Delete an artifact from the remote repository.
    RemoteRm {
        identifier: String,
        #[arg(long = "i-realise-this-may-break-other-peoples-builds-in-the-future")]
        acknowledged: bool,
    },
    /// Build and open the offline HTML search index.
    Search,
}

fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>, Error> {
    let mut parsed = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Validation(format!(
                "must be in the form \"key=value\", but got: {pair:?}"
            )));
        };
        parsed.insert(key.to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Upload-time attributes are frozen into the identity, so comparator
/// syntax must not sneak in.
fn reject_reserved_pairs(pairs: &BTreeMap<String, String>) -> Result<(), Error> {
    for (key, value) in pairs {
        if key.starts_with('@') || value.starts_with('@') {
            return Err(Error::Validation(format!(
                "attribute keys and values must not start with '@': {key}={value}"
            )));
        }
    }
    Ok(())
}

fn remote_uri(cli_server: &Option<String>, offline: bool) -> Option<String> {
    if offline {
        None
    } else {
        cli_server.clone()
    }
}

fn require_remote(cli: &Cli) -> Result<NfsRepo, Error> {
    match remote_uri(&cli.server, cli.offline) {
        Some(uri) => NfsRepo::from_uri(&uri),
        None => Err(Error::Validation(
            "this command needs a remote repository: set --server or AMPM_SERVER \
             (and drop --offline)"
                .to_string(),
        )),
    }
}

fn sha256_of_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn pretty_print(metadata: &ArtifactMetadata) -> Result<String, Error> {
    let attrs = metadata
        .combined_attrs()
        .into_iter()
        .map(|(key, value)| format!("    {key} = {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!("{}\n{attrs}", metadata.identifier()?))
}

fn json_value(metadata: &ArtifactMetadata) -> Result<serde_json::Value, Error> {
    Ok(serde_json::json!({
        "identifier": metadata.identifier()?,
        "name": metadata.name,
        "description": metadata.description,
        "pubdate": metadata.pubdate.to_rfc3339(),
        "type": metadata.artifact_type,
        "attributes": metadata.combined_attrs(),
        "env": metadata.combined_env(),
        "path": {
            "type": match metadata.path_type {
                PathKind::File => "file",
                PathKind::Dir => "dir",
                PathKind::Gz => "gz",
                PathKind::TarGz => "tar.gz",
            },
            "hash": metadata.path_hash,
            "location": metadata.path_location,
        },
    }))
}

fn render_index(
    local: &LocalRepo,
    records: &[ArtifactMetadata],
    repo_uri: &str,
) -> Result<PathBuf, Error> {
    let artifacts = records
        .iter()
        .map(|metadata| {
            let attributes = metadata
                .combined_attrs()
                .into_iter()
                .filter(|(key, _)| !matches!(key.as_str(), "name" | "description" | "pubdate"))
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(Context::from([
                ("identifier".to_string(), Value::Text(metadata.identifier()?)),
                ("name".to_string(), Value::Text(metadata.name.clone())),
                ("pubdate".to_string(), Value::Text(metadata.pubdate.to_rfc3339())),
                ("attributes".to_string(), Value::Text(attributes)),
                ("description".to_string(), Value::Text(metadata.description.clone())),
            ]))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let context = Context::from([
        ("title".to_string(), Value::Text("ampm artifact index".to_string())),
        ("generated".to_string(), Value::Text(Utc::now().to_rfc3339())),
        ("repo_uri".to_string(), Value::Text(repo_uri.to_string())),
        ("artifacts".to_string(), Value::List(artifacts)),
    ]);

    let rendered = template::format_page(SEARCH_TEMPLATE, &context)
        .map_err(|err| Error::Validation(err.to_string()))?;
    let index_path = local.root().join("index.html");
    std::fs::create_dir_all(local.root())?;
    std::fs::write(&index_path, rendered)?;
    Ok(index_path)
}

async fn cmd_upload(cli: &Cli, command: &Command) -> Result<(), Error> {
    let Command::Upload {
        local_path,
        artifact_type,
        name,
        description,
        compressed,
        uncompressed,
        remote_path,
        attr,
        env,
    } = command
    else {
        unreachable!("routed by caller");
    };

    validate_artifact_type(artifact_type)?;
    let attr = parse_pairs(attr)?;
    let env = parse_pairs(env)?;
    reject_reserved_pairs(&attr)?;

    let compressed = *compressed || !*uncompressed;
    let repo = require_remote(cli)?;

    if local_path.is_none() && name.is_none() {
        return Err(Error::Validation(
            "if LOCAL_PATH is missing then --name must be specified".to_string(),
        ));
    }
    if local_path.is_none() && remote_path.is_none() {
        return Err(Error::Validation(
            "must specify either LOCAL_PATH or --remote-path".to_string(),
        ));
    }

    // Compression happens locally before the transfer; the staging dir goes
    // away with this process.
    let staging = tempfile::tempdir()?;
    let mut upload_source: Option<PathBuf> = None;

    let (path_type, path_hash) = match local_path {
        Some(local_path) => {
            let meta = std::fs::metadata(local_path)?;
            if meta.is_dir() {
                if compressed {
                    let packed = staging.path().join("payload.tar.gz");
                    compress::tar_gz_dir(local_path, &packed)?;
                    let hash = sha256_of_file(&packed)?;
                    upload_source = Some(packed);
                    (PathKind::TarGz, Some(hash))
                } else {
                    upload_source = Some(local_path.clone());
                    (PathKind::Dir, None)
                }
            } else if meta.is_file() {
                if compressed {
                    let packed = staging.path().join("payload.gz");
                    compress::gzip_file(local_path, &packed)?;
                    let hash = sha256_of_file(&packed)?;
                    upload_source = Some(packed);
                    (PathKind::Gz, Some(hash))
                } else {
                    upload_source = Some(local_path.clone());
                    (PathKind::File, Some(sha256_of_file(local_path)?))
                }
            } else {
                return Err(Error::Validation(format!(
                    "unsupported file type: {}",
                    local_path.display()
                )));
            }
        }
        None => {
            let remote_path = remote_path.as_ref().expect("checked above");
            (PathKind::File, Some(repo.hash_remote_file(remote_path).await?))
        }
    };

    let file_name = local_path
        .as_ref()
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned());
    let name = name.clone().or(file_name).ok_or_else(|| {
        Error::Validation("artifact name could not be derived from the path".to_string())
    })?;

    let metadata = ArtifactMetadata {
        name,
        description: description.clone().unwrap_or_default(),
        pubdate: Utc::now().fixed_offset(),
        artifact_type: artifact_type.clone(),
        attributes: attr,
        env,
        path_type,
        path_hash,
        path_location: remote_path.clone(),
        mutable_attributes: BTreeMap::new(),
        mutable_env: BTreeMap::new(),
    };

    repo.upload(&metadata, upload_source.as_deref()).await?;
    println!("{}", metadata.identifier()?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Error> {
    match &cli.command {
        Command::Get { identifier, attr } => {
            let query = ArtifactQuery::parse(identifier, parse_pairs(attr)?)?;
            let group = RepoGroup::new(remote_uri(&cli.server, cli.offline).as_deref())?;
            let (path, _) = group.get_single(&query).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::List { identifier, attr, format } => {
            let group = RepoGroup::new(remote_uri(&cli.server, cli.offline).as_deref())?;
            let records = match identifier {
                Some(identifier) => {
                    let query = ArtifactQuery::parse(identifier, parse_pairs(attr)?)?;
                    group.lookup(&query).await?
                }
                None => group.local().all_cached_metadata()?,
            };

            match format {
                ListFormat::Short => {
                    for metadata in &records {
                        println!("{}", metadata.identifier()?);
                    }
                }
                ListFormat::Pretty => {
                    for metadata in &records {
                        println!("{}", pretty_print(metadata)?);
                    }
                }
                ListFormat::Json => {
                    let values =
                        records.iter().map(json_value).collect::<Result<Vec<_>, Error>>()?;
                    let rendered = serde_json::to_string_pretty(&values)
                        .map_err(|err| Error::Validation(err.to_string()))?;
                    println!("{rendered}");
                }
                ListFormat::IndexFile | ListFormat::IndexWebpage => {
                    let uri = remote_uri(&cli.server, cli.offline)
                        .unwrap_or_else(|| group.local().into_uri());
                    let index = render_index(group.local(), &records, &uri)?;
                    println!("{}", index.display());
                    if *format == ListFormat::IndexWebpage {
                        open_in_browser(&index);
                    }
                }
            }
            Ok(())
        }
        Command::Env { identifier, attr } => {
            let query = ArtifactQuery::parse(identifier, parse_pairs(attr)?)?;
            let group = RepoGroup::new(remote_uri(&cli.server, cli.offline).as_deref())?;
            let (_, metadata) = group.get_single(&query).await?;
            println!("{}", group.local().format_env_file(&metadata)?);
            Ok(())
        }
        Command::Upload { .. } => cmd_upload(&cli, &cli.command).await,
        Command::Edit { identifier, attr, env } => {
            let repo = require_remote(&cli)?;
            let local = LocalRepo::default();
            repo.edit_artifact(identifier, &parse_pairs(attr)?, &parse_pairs(env)?, &local)
                .await?;
            info!(identifier = %identifier, "metadata updated");
            Ok(())
        }
        Command::RemoteRm { identifier, acknowledged } => {
            if !acknowledged {
                return Err(Error::Validation(
                    "refusing to delete: pass \
                     --i-realise-this-may-break-other-peoples-builds-in-the-future"
                        .to_string(),
                ));
            }
            let repo = require_remote(&cli)?;
            let local = LocalRepo::default();
            if repo.remove_artifact(identifier, &local).await? {
                eprintln!("Removed {identifier}");
            } else {
                eprintln!("Artifact {identifier} not found");
            }
            Ok(())
        }
        Command::Search => {
            let local = LocalRepo::default();
            let records = local.all_cached_metadata()?;
            let uri =
                remote_uri(&cli.server, cli.offline).unwrap_or_else(|| local.into_uri());
            let index = render_index(&local, &records, &uri)?;
            println!("{}", index.display());
            open_in_browser(&index);
            Ok(())
        }
    }
}

fn open_in_browser(path: &Path) {
    // Best effort; the path was printed either way.
    let _ = std::process::Command::new("xdg-open")
        .arg(path)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
}

fn render_error(err: &Error) {
    match err {
        Error::AmbiguousQuery { query, options } => {
            eprintln!("Ambiguous query: {query}");
            eprintln!("Candidates:");
            for option in options {
                match option.identifier() {
                    Ok(identifier) => eprintln!("  {identifier}"),
                    Err(_) => eprintln!("  {}", option.name),
                }
            }
        }
        Error::QueryNotFound { query } => match query {
            Some(query) => eprintln!("Artifact not found: {query}"),
            None => eprintln!("Artifact not found"),
        },
        Error::Query(QueryError::AmbiguousComparison(message)) => {
            eprintln!("Ambiguous comparison: {message}");
        }
        Error::Nfs(NfsError::PathTraversal(path)) => {
            eprintln!("Nice try. ({path})");
        }
        Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!(
                "The local artifact store ({root}) isn't writable by you. Please run \
                 `sudo mkdir -p {root} && sudo chown $(whoami) {root}`.",
                root = ampm::repo::local::DEFAULT_ROOT,
            );
        }
        Error::Nfs(NfsError::Io(io)) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!(
                "The local artifact store ({root}) isn't writable by you. Please run \
                 `sudo mkdir -p {root} && sudo chown $(whoami) {root}`.",
                root = ampm::repo::local::DEFAULT_ROOT,
            );
        }
        other => eprintln!("Error: {other}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        render_error(&err);
        std::process::exit(1);
    }
}
