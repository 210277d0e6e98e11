//! HuggingFace model downloader
//!
//! Resolves model sources to local GGUF files, downloading hub files into a
//! per-repo, per-revision cache.

use crate::inference::error::ModelLoadError;
use crate::storage::secrets::HubToken;
use crate::types::model::ModelSource;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const HUB_BASE: &str = "https://huggingface.co";
const USER_AGENT: &str = concat!("prompt-session/", env!("CARGO_PKG_VERSION"));

/// A file reference inside a HuggingFace repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubFile {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
}

fn sanitize_local_filename(filename: &str) -> Result<String, String> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err("Invalid model filename".to_string());
    }

    let no_query = trimmed.split('?').next().unwrap_or(trimmed);
    let no_fragment = no_query.split('#').next().unwrap_or(no_query);
    let no_leading = no_fragment.trim_start_matches('/');

    let flattened = no_leading.replace('\\', "/").replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        return Err("Invalid model filename".to_string());
    }

    Ok(sanitized)
}

impl HubFile {
    pub fn new(
        repo_id: impl Into<String>,
        filename: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            filename: filename.into(),
            revision: revision.into(),
        }
    }

    /// Parse a hub reference.
    ///
    /// Accepted forms:
    /// 1. `https://huggingface.co/user/repo/blob/main/model.gguf`
    /// 2. `https://huggingface.co/user/repo/resolve/main/model.gguf`
    /// 3. `user/repo/model.gguf`
    /// 4. `user/repo` (filename left empty)
    pub fn parse(url: &str) -> Result<Self, String> {
        let url = url.trim();
        let url = url.split('?').next().unwrap_or(url);
        let url = url.split('#').next().unwrap_or(url);

        if url.contains("huggingface.co") {
            let path = url
                .replace("https://huggingface.co/", "")
                .replace("http://huggingface.co/", "");

            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() < 2 {
                return Err("Invalid HuggingFace URL format".to_string());
            }

            let repo_id = format!("{}/{}", parts[0], parts[1]);

            if let Some(marker) = parts.iter().position(|&p| p == "blob" || p == "resolve") {
                if parts.len() > marker + 2 {
                    return Ok(Self::new(
                        repo_id,
                        parts[marker + 2..].join("/"),
                        parts[marker + 1],
                    ));
                }
            }

            return Ok(Self::new(repo_id, "", "main"));
        }

        let parts: Vec<&str> = url.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            let filename = if parts.len() > 2 {
                parts[2..].join("/")
            } else {
                String::new()
            };
            return Ok(Self::new(format!("{}/{}", parts[0], parts[1]), filename, "main"));
        }

        Err("Could not parse HuggingFace reference".to_string())
    }

    /// Build the download URL for the file
    pub fn download_url(&self) -> String {
        self.download_url_at(HUB_BASE)
    }

    fn download_url_at(&self, hub_base: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            hub_base, self.repo_id, self.revision, self.filename
        )
    }

    /// Where this file lives in a cache rooted at `models_dir`:
    /// `<models_dir>/<user>--<repo>/<revision>/<filename>`
    pub fn cache_path(&self, models_dir: &Path) -> Result<PathBuf, String> {
        let repo_dir = sanitize_local_filename(&self.repo_id.replace('/', "--"))?;
        let revision_dir = sanitize_local_filename(&self.revision)?;
        let filename = sanitize_local_filename(&self.filename)?;
        Ok(models_dir.join(repo_dir).join(revision_dir).join(filename))
    }
}

/// Turn a model source into a local file path, downloading if needed.
pub async fn resolve_model(
    source: &ModelSource,
    models_dir: &Path,
    token: Option<&HubToken>,
) -> Result<PathBuf, ModelLoadError> {
    resolve_model_at(HUB_BASE, source, models_dir, token).await
}

async fn resolve_model_at(
    hub_base: &str,
    source: &ModelSource,
    models_dir: &Path,
    token: Option<&HubToken>,
) -> Result<PathBuf, ModelLoadError> {
    match source {
        ModelSource::Local { path } => {
            if path.is_file() {
                Ok(path.clone())
            } else {
                Err(ModelLoadError::NotFound(path.clone()))
            }
        }
        ModelSource::Hub {
            repo_id,
            filename,
            revision,
        } => {
            let file = HubFile::new(repo_id.clone(), filename.clone(), revision.clone());
            let mut last_decile = 0;
            download_model_at(hub_base, &file, models_dir, token, move |done, total| {
                if total == 0 {
                    return;
                }
                let decile = done * 10 / total;
                if decile > last_decile {
                    last_decile = decile;
                    tracing::info!(
                        "Downloaded {} / {} ({}%)",
                        format_size(done),
                        format_size(total),
                        decile * 10
                    );
                }
            })
            .await
        }
    }
}

/// Download a model from HuggingFace into `models_dir`.
///
/// An existing non-empty cached copy is returned without touching the
/// network.
pub async fn download_model(
    file: &HubFile,
    models_dir: &Path,
    token: Option<&HubToken>,
    progress_callback: impl FnMut(u64, u64) + Send,
) -> Result<PathBuf, ModelLoadError> {
    download_model_at(HUB_BASE, file, models_dir, token, progress_callback).await
}

async fn download_model_at(
    hub_base: &str,
    file: &HubFile,
    models_dir: &Path,
    token: Option<&HubToken>,
    progress_callback: impl FnMut(u64, u64) + Send,
) -> Result<PathBuf, ModelLoadError> {
    let download_err = |msg: String| ModelLoadError::Download(msg);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3600)) // 1 hour timeout for large models
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| download_err(format!("Failed to create HTTP client: {}", e)))?;

    // If no specific filename, pick the repository's only GGUF file
    let file = if file.filename.is_empty() {
        let files = list_gguf_files(&client, hub_base, &file.repo_id, &file.revision, token).await?;
        match files.as_slice() {
            [] => {
                return Err(download_err(format!(
                    "No GGUF files found in {}",
                    file.repo_id
                )))
            }
            [only] => HubFile::new(file.repo_id.clone(), only.clone(), file.revision.clone()),
            _ => {
                return Err(download_err(format!(
                    "Multiple GGUF files found. Please specify one of: {}",
                    files.join(", ")
                )))
            }
        }
    } else {
        file.clone()
    };

    let output_path = file.cache_path(models_dir).map_err(download_err)?;

    if let Ok(metadata) = fs::metadata(&output_path) {
        if metadata.is_file() && metadata.len() > 0 {
            tracing::info!("Model already cached: {:?}", output_path);
            return Ok(output_path);
        }
    }

    let parent = output_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| models_dir.to_path_buf());
    fs::create_dir_all(&parent)?;

    let temp_path = output_path.with_extension(match output_path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    let download_url = file.download_url_at(hub_base);
    tracing::info!("Downloading from: {}", download_url);

    let mut request = client.get(&download_url);
    if let Some(token) = token {
        request = request.bearer_auth(token.expose());
    }

    let response = request
        .send()
        .await
        .map_err(|e| download_err(format!("Download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(download_err(format!(
            "Download of {} failed with status: {}",
            download_url,
            response.status()
        )));
    }

    let total_size = response.content_length();
    if let Some(total) = total_size {
        tracing::info!("File size: {} ({} bytes)", format_size(total), total);
    }

    let streamed = stream_to_file(response, &temp_path, total_size, progress_callback).await;
    let downloaded = match streamed {
        Ok(downloaded) => downloaded,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    if let Some(total) = total_size {
        if downloaded != total {
            let _ = fs::remove_file(&temp_path);
            return Err(download_err(format!(
                "Download incomplete: got {} bytes, expected {}",
                downloaded, total
            )));
        }
    }

    // Rename temp file to final location (atomic operation)
    fs::rename(&temp_path, &output_path)?;

    tracing::info!("Download complete: {:?}", output_path);

    Ok(output_path)
}

/// Write the response body to `path`, returning the number of bytes written
async fn stream_to_file(
    mut response: reqwest::Response,
    path: &Path,
    total_size: Option<u64>,
    mut progress_callback: impl FnMut(u64, u64) + Send,
) -> Result<u64, ModelLoadError> {
    let mut file = File::create(path).await?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ModelLoadError::Download(format!("Download error: {}", e)))?
    {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        progress_callback(downloaded, total_size.unwrap_or(0));
    }
    file.flush().await?;

    Ok(downloaded)
}

/// List available GGUF files in a HuggingFace repository
async fn list_gguf_files(
    client: &reqwest::Client,
    hub_base: &str,
    repo_id: &str,
    revision: &str,
    token: Option<&HubToken>,
) -> Result<Vec<String>, ModelLoadError> {
    let api_url = format!("{}/api/models/{}/tree/{}", hub_base, repo_id, revision);

    let mut request = client.get(&api_url);
    if let Some(token) = token {
        request = request.bearer_auth(token.expose());
    }

    let response = request
        .send()
        .await
        .map_err(|e| ModelLoadError::Download(format!("Failed to fetch repo info: {}", e)))?;

    if !response.status().is_success() {
        return Err(ModelLoadError::Download(format!(
            "Listing {} failed: {}",
            repo_id,
            response.status()
        )));
    }

    let files: Vec<FileInfo> = response
        .json()
        .await
        .map_err(|e| ModelLoadError::Download(format!("Failed to parse response: {}", e)))?;

    Ok(gguf_paths(files))
}

#[derive(Debug, serde::Deserialize)]
struct FileInfo {
    path: String,
}

fn gguf_paths(files: Vec<FileInfo>) -> Vec<String> {
    files
        .into_iter()
        .filter(|f| f.path.ends_with(".gguf"))
        .map(|f| f.path)
        .collect()
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}
