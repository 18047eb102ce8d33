//! Input resolution and upload validation.
//!
//! pdfium needs a file-system path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the returned [`ResolvedInput`]. Uploads
//! are checked for extension and size before a task is created; their content
//! is left to extraction, so a corrupt upload becomes a failed task.

use crate::error::Pdf2DocxError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Every PDF starts with these bytes.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF available on the local file system.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the download lives until this value is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to a local PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2DocxError> {
    if input.trim().is_empty() {
        return Err(Pdf2DocxError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).map(ResolvedInput::Local)
    }
}

/// Check that `path` exists, is readable, and starts with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, Pdf2DocxError> {
    let path = path.to_path_buf();
    if !path.is_file() {
        return Err(Pdf2DocxError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2DocxError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2DocxError::FileNotFound { path }),
    };

    let mut head = Vec::with_capacity(PDF_MAGIC.len());
    file.by_ref()
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .map_err(|e| Pdf2DocxError::io(&path, e))?;
    check_magic(&path.display().to_string(), &head)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Reject bytes that do not start with `%PDF`.
pub fn check_magic(name: &str, bytes: &[u8]) -> Result<(), Pdf2DocxError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(Pdf2DocxError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

/// Reject an upload before any task is created.
///
/// `filename` is optional; when given, its extension must be `.pdf`
/// (any case). Content is not inspected here.
pub fn validate_upload(
    bytes: &[u8],
    filename: Option<&str>,
    max_bytes: usize,
) -> Result<(), Pdf2DocxError> {
    if let Some(name) = filename {
        let is_pdf = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(Pdf2DocxError::UnsupportedFormat {
                name: name.to_string(),
            });
        }
    }
    if bytes.len() > max_bytes {
        return Err(Pdf2DocxError::UploadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    Ok(())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2DocxError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2DocxError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2DocxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(url, &bytes)?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2DocxError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2DocxError::io(&path, e))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/a/paper.pdf"), "paper.pdf");
        assert_eq!(filename_from_url("https://x.org/a/"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn upload_checks() {
        let pdf = b"%PDF-1.7\n...";
        assert!(validate_upload(pdf, Some("scan.PDF"), 1024).is_ok());
        assert!(validate_upload(pdf, None, 1024).is_ok());

        let err = validate_upload(pdf, Some("scan.docx"), 1024).unwrap_err();
        assert!(matches!(err, Pdf2DocxError::UnsupportedFormat { .. }));

        let err = validate_upload(pdf, Some("scan.pdf"), 4).unwrap_err();
        assert!(matches!(err, Pdf2DocxError::UploadTooLarge { size: 12, limit: 4 }));

        // Content is extraction's problem.
        assert!(validate_upload(b"PK\x03\x04zip", Some("fake.pdf"), 1024).is_ok());
        assert!(validate_upload(b"", Some("empty.pdf"), 1024).is_ok());
    }

    #[test]
    fn magic_mismatch_reports_leading_bytes() {
        assert!(check_magic("ok.pdf", b"%PDF-1.4").is_ok());
        match check_magic("fake.pdf", b"PK\x03\x04zip").unwrap_err() {
            Pdf2DocxError::NotAPdf { name, magic } => {
                assert_eq!(name, "fake.pdf");
                assert_eq!(magic, b"PK\x03\x04".to_vec());
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(check_magic("empty.pdf", b"").is_err());
    }

    #[test]
    fn local_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok.pdf");
        std::fs::write(&good, b"%PDF-1.4 body").unwrap();
        assert_eq!(resolve_local(&good).unwrap(), good);

        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"hello").unwrap();
        assert!(matches!(
            resolve_local(&bad).unwrap_err(),
            Pdf2DocxError::NotAPdf { .. }
        ));

        assert!(matches!(
            resolve_local(&dir.path().join("missing.pdf")).unwrap_err(),
            Pdf2DocxError::FileNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        assert!(matches!(
            resolve_input("  ", 5).await,
            Err(Pdf2DocxError::InvalidInput { .. })
        ));
    }
}
