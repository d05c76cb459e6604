//! Document loading: PDFs, batch directories and instruction templates.
//!
//! A missing or unreadable document is always an error returned to the
//! caller: every downstream stage depends on it, so there is nothing useful
//! to do without it. The `%PDF` magic check catches the common mistake of
//! pointing the tool at an HTML error page saved with a `.pdf` name.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A PDF read fully into memory.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    /// File stem used to name per-document outputs.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Read a PDF's raw bytes, validating existence and magic bytes.
pub async fn load_document(path: impl AsRef<Path>) -> Result<PdfDocument, ExtractError> {
    let path = path.as_ref().to_path_buf();
    info!("Loading PDF from {}", path.display());

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ExtractError::from_read(&path, e))?;

    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ExtractError::NotAPdf { path, magic });
    }

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(PdfDocument { path, bytes })
}

/// List the `*.pdf` files of a directory, sorted by file name.
pub async fn list_pdfs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ExtractError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ExtractError::from_read(dir, e))?;

    let mut pdfs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ExtractError::from_read(dir, e))?
    {
        let path = entry.path();
        if is_pdf_path(&path) && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    debug!("Found {} PDFs in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// Load a system-instruction template.
pub async fn load_template(path: impl AsRef<Path>) -> Result<String, ExtractError> {
    let path = path.as_ref();
    info!("Loading instruction template from {}", path.display());
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::TemplateNotFound {
            path: path.to_path_buf(),
        },
        _ => ExtractError::from_read(path, e),
    })
}

fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_document_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(dir.path().join("absent.pdf")).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }), "{err}");
    }

    #[tokio::test]
    async fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page.pdf");
        std::fs::write(&p, b"<html>404</html>").unwrap();
        let err = load_document(&p).await.unwrap_err();
        assert!(matches!(err, ExtractError::NotAPdf { magic, .. } if &magic == b"<htm"));
    }

    #[tokio::test]
    async fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("tiny.pdf");
        std::fs::write(&p, b"%P").unwrap();
        assert!(matches!(
            load_document(&p).await,
            Err(ExtractError::NotAPdf { .. })
        ));
    }

    #[tokio::test]
    async fn loads_pdf_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("report.pdf");
        std::fs::write(&p, b"%PDF-1.7 body").unwrap();
        let doc = load_document(&p).await.unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.7 body");
        assert_eq!(doc.stem(), "report");
    }

    #[tokio::test]
    async fn lists_only_pdfs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();
        let names: Vec<String> = list_pdfs(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[tokio::test]
    async fn missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_template(dir.path().join("system_instructions_step_1.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::TemplateNotFound { .. }));
    }
}
