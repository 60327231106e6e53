use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Text of one PDF page.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// 0-based page number.
    pub page: i64,
    pub text: String,
}

/// `*.pdf` files directly inside `dir`, sorted by file name.
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read PDF directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if path.is_file() && is_pdf {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Extracts per-page text off the async runtime.
///
/// pdf-extract may panic on malformed input; that surfaces here as an error.
pub async fn load_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await
        .with_context(|| format!("PDF parser crashed on {}", path.display()))?
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| PdfPage {
            page: idx as i64,
            text,
        })
        .collect())
}
