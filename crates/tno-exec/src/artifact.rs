//! Retrieval of task artifacts into a task directory.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tno_core::DriverError;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// Downloads an artifact into a directory.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetches `source` into `dest_dir` and returns the path of the written file.
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, DriverError>;
}

/// Fetches `http(s)://` sources with `reqwest` and copies `file://` URIs and plain paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

#[async_trait]
impl ArtifactFetcher for DefaultFetcher {
    #[instrument(level = "debug", skip(self), fields(dest = %dest_dir.display()))]
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, DriverError> {
        let dest = dest_dir.join(artifact_name(source)?);

        if source.starts_with("http://") || source.starts_with("https://") {
            download(source, &dest).await?;
        } else if let Some(path) = source.strip_prefix("file://") {
            copy(Path::new(strip_suffixes(path)), &dest).await?;
        } else if source.contains("::") || source.contains("://") {
            return Err(DriverError::Fetch(format!(
                "unsupported artifact source {source:?}"
            )));
        } else {
            copy(Path::new(source), &dest).await?;
        }

        debug!(target: "tno.exec.artifact", source, path = %dest.display(), "artifact fetched");
        Ok(dest)
    }
}

/// File name an artifact is stored under: the last path segment of the source with
/// any query string or fragment removed.
///
/// A URL must carry a path after its authority; `http://host:8080` names no file.
pub fn artifact_name(source: &str) -> Result<String, DriverError> {
    let no_name =
        || DriverError::Fetch(format!("cannot derive an artifact name from {source:?}"));

    let path = strip_suffixes(source);
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).ok_or_else(no_name)?,
        None => path,
    };
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(no_name)
}

fn strip_suffixes(source: &str) -> &str {
    let end = source.find(['?', '#']).unwrap_or(source.len());
    &source[..end]
}

async fn download(url: &str, dest: &Path) -> Result<(), DriverError> {
    let fetch_err = |e: reqwest::Error| DriverError::Fetch(format!("GET {url}: {e}"));

    let client = reqwest::Client::builder().build().map_err(fetch_err)?;
    let mut response = client.get(url).send().await.map_err(fetch_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(DriverError::Fetch(format!("GET {url}: status {status}")));
    }

    // Written to a hidden sibling, renamed once complete.
    let part = partial_path(dest);
    let finished = match write_body(&mut response, &part, url).await {
        Ok(()) => fs::rename(&part, dest).await.map_err(|e| {
            DriverError::Fetch(format!("failed to move artifact to {}: {e}", dest.display()))
        }),
        Err(e) => Err(e),
    };
    if finished.is_err() {
        if let Err(e) = fs::remove_file(&part).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(target: "tno.exec.artifact", path = %part.display(), error = %e, "failed to remove partial download");
        }
    }
    finished
}

async fn write_body(
    response: &mut reqwest::Response,
    path: &Path,
    url: &str,
) -> Result<(), DriverError> {
    let write_err =
        |e: std::io::Error| DriverError::Fetch(format!("failed to write {}: {e}", path.display()));

    let mut file = fs::File::create(path).await.map_err(write_err)?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DriverError::Fetch(format!("GET {url}: {e}")))?
    {
        file.write_all(&chunk).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.part"))
}

async fn copy(src: &Path, dest: &Path) -> Result<(), DriverError> {
    fs::copy(src, dest).await.map(|_| ()).map_err(|e| {
        DriverError::Fetch(format!(
            "failed to copy {} to {}: {e}",
            src.display(),
            dest.display()
        ))
    })
}
