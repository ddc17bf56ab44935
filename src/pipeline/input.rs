//! Input resolution: normalise a user-supplied path or URL to document bytes.
//!
//! The grading core works on in-memory document bytes (the wire format is
//! base64), so unlike a file-based pipeline nothing needs to be staged on
//! disk here — a URL is downloaded straight into a buffer. The `%PDF`
//! magic bytes are validated before returning so callers get a meaningful
//! error rather than a pdfium failure deep inside the run.

use crate::error::GradeError;
use crate::pipeline::rasterize::{DocumentInput, DocumentRole};
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL to a validated [`DocumentInput`].
pub async fn resolve_document(
    input: &str,
    role: DocumentRole,
    timeout_secs: u64,
) -> Result<DocumentInput, GradeError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input)?
    };
    DocumentInput::new(bytes, role)
}

/// Read a local file, distinguishing missing from unreadable.
fn read_local(path_str: &str) -> Result<Vec<u8>, GradeError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(GradeError::FileNotFound { path });
    }

    match std::fs::read(&path) {
        Ok(bytes) => {
            debug!("read local document: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(GradeError::PermissionDenied { path })
        }
        Err(_) => Err(GradeError::FileNotFound { path }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, GradeError> {
    info!("downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GradeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            GradeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            GradeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(GradeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GradeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
