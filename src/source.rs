//! Source resolution: turn a user-supplied path or URL into a [`SourceFile`].
//!
//! The extraction service receives the document as a multipart upload, so
//! the bytes are read fully into memory up front. We validate the PDF magic
//! bytes (`%PDF`) before returning so callers get a meaningful error instead
//! of an opaque extraction failure.

use crate::document::SourceFile;
use crate::error::SchematizeError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

impl SourceFile {
    /// Load a local file or download a URL.
    pub async fn resolve(input: &str, timeout_secs: u64) -> Result<SourceFile, SchematizeError> {
        if is_url(input) {
            download_url(input, timeout_secs).await
        } else {
            SourceFile::open(input).await
        }
    }

    /// Read a local PDF, validating existence, permissions and magic bytes.
    pub async fn open(path: impl AsRef<Path>) -> Result<SourceFile, SchematizeError> {
        let path = path.as_ref().to_path_buf();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(SchematizeError::PermissionDenied { path });
            }
            Err(_) => return Err(SchematizeError::FileNotFound { path }),
        };

        check_magic(&bytes, &path)?;
        debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
        Ok(SourceFile::from_bytes(file_name_of(&path), bytes))
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceFile, SchematizeError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SchematizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SchematizeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SchematizeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(SchematizeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SchematizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let name = filename_from_url(url);
    check_magic(&bytes, Path::new(&name))?;
    info!("Downloaded {} bytes as {}", bytes.len(), name);
    Ok(SourceFile::from_bytes(name, bytes.to_vec()))
}

/// Files shorter than the magic are rejected; missing bytes read as zero.
fn check_magic(bytes: &[u8], path: &Path) -> Result<(), SchematizeError> {
    if !bytes.starts_with(PDF_MAGIC) {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(SchematizeError::NotAPdf {
            path: PathBuf::from(path),
            magic,
        });
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
