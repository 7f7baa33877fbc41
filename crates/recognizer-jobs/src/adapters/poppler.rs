//! Extraction engine backed by poppler-utils (`pdfinfo` and `pdftotext`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::{debug, warn};

use recognizer_core::defaults::{
    EXTRACTION_CMD_TIMEOUT_SECS, PDFINFO_BIN, PDFTOTEXT_BIN, RECOGNIZER_PAGES,
};
use recognizer_core::{Engine, EngineProvider, Error, Result};

/// pdftotext separates pages with a form feed.
const PAGE_BREAK: char = '\u{c}';

/// Configuration for the poppler engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopplerConfig {
    pub pdftotext_path: String,
    pub pdfinfo_path: String,
    /// Leading pages extracted for `recognizer` work.
    pub recognizer_pages: usize,
    pub cmd_timeout_secs: u64,
}

impl Default for PopplerConfig {
    fn default() -> Self {
        Self {
            pdftotext_path: PDFTOTEXT_BIN.to_string(),
            pdfinfo_path: PDFINFO_BIN.to_string(),
            recognizer_pages: RECOGNIZER_PAGES,
            cmd_timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }
}

impl PopplerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PDFTOTEXT_PATH` | `pdftotext` | pdftotext binary |
    /// | `PDFINFO_PATH` | `pdfinfo` | pdfinfo binary |
    /// | `RECOGNIZER_PAGES` | `3` | Pages sent for recognition |
    /// | `EXTRACTION_CMD_TIMEOUT_SECS` | `60` | Per-command timeout |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pdftotext_path: std::env::var("PDFTOTEXT_PATH").unwrap_or(defaults.pdftotext_path),
            pdfinfo_path: std::env::var("PDFINFO_PATH").unwrap_or(defaults.pdfinfo_path),
            recognizer_pages: std::env::var("RECOGNIZER_PAGES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.recognizer_pages)
                .max(1),
            cmd_timeout_secs: std::env::var("EXTRACTION_CMD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.cmd_timeout_secs),
        }
    }

    pub fn with_recognizer_pages(mut self, pages: usize) -> Self {
        self.recognizer_pages = pages.max(1);
        self
    }
}

/// Parse `pdfinfo` output into a JSON metadata object.
fn parse_pdfinfo(output: &str) -> JsonValue {
    let mut metadata = serde_json::Map::new();

    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase().replace(' ', "_");
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if key == "pages" {
                if let Ok(pages) = value.parse::<u64>() {
                    metadata.insert(key, JsonValue::Number(pages.into()));
                    continue;
                }
            }
            metadata.insert(key, JsonValue::String(value.to_string()));
        }
    }

    JsonValue::Object(metadata)
}

fn page_count(metadata: &JsonValue) -> usize {
    metadata.get("pages").and_then(|v| v.as_u64()).unwrap_or(0) as usize
}

/// Split pdftotext output into per-page text, dropping the empty tail after
/// the final page break.
fn split_pages(text: &str) -> Vec<&str> {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Engine(format!("External command timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Engine(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Engine(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Starts [`PopplerEngine`] instances after checking the binaries respond.
pub struct PopplerProvider {
    config: PopplerConfig,
}

impl PopplerProvider {
    pub fn new(config: PopplerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineProvider for PopplerProvider {
    async fn start(&self) -> Result<Arc<dyn Engine>> {
        let output = Command::new(&self.config.pdftotext_path)
            .arg("-v")
            .output()
            .await
            .map_err(|e| {
                Error::Engine(format!(
                    "'{}' is not available: {}",
                    self.config.pdftotext_path, e
                ))
            })?;
        // pdftotext -v exits with 0 or 99 depending on the version.
        if !(output.status.success() || output.status.code() == Some(99)) {
            return Err(Error::Engine(format!(
                "'{}' -v exited with {}",
                self.config.pdftotext_path, output.status
            )));
        }
        debug!(binary = %self.config.pdftotext_path, "Poppler engine started");
        Ok(Arc::new(PopplerEngine {
            config: self.config.clone(),
        }))
    }

    fn name(&self) -> &str {
        "poppler"
    }
}

/// Extraction engine running poppler command-line tools.
pub struct PopplerEngine {
    config: PopplerConfig,
}

impl PopplerEngine {
    async fn ensure_file(&self, file: &Path) -> Result<()> {
        if !tokio::fs::try_exists(file).await.unwrap_or(false) {
            return Err(Error::InvalidInput(format!(
                "File '{}' does not exist",
                file.display()
            )));
        }
        Ok(())
    }

    async fn pdfinfo(&self, file: &Path) -> JsonValue {
        let output = run_cmd_with_timeout(
            Command::new(&self.config.pdfinfo_path).arg(file),
            self.config.cmd_timeout_secs,
        )
        .await;
        match output {
            Ok(output) => parse_pdfinfo(&output),
            Err(e) => {
                warn!(
                    file = %file.display(),
                    error = %e,
                    "pdfinfo failed, continuing without metadata"
                );
                serde_json::json!({})
            }
        }
    }

    /// Text of 1-based pages `first..=last`.
    async fn pdftotext(&self, file: &Path, range: Option<(usize, usize)>) -> Result<String> {
        let mut cmd = Command::new(&self.config.pdftotext_path);
        if let Some((first, last)) = range {
            cmd.arg("-f")
                .arg(first.to_string())
                .arg("-l")
                .arg(last.to_string());
        }
        cmd.arg(file).arg("-");
        run_cmd_with_timeout(&mut cmd, self.config.cmd_timeout_secs).await
    }
}

#[async_trait]
impl Engine for PopplerEngine {
    async fn run_recognizer(&self, file: &Path) -> Result<JsonValue> {
        self.ensure_file(file).await?;
        let metadata = self.pdfinfo(file).await;
        let total = page_count(&metadata);

        let last = match total {
            0 => self.config.recognizer_pages,
            n => n.min(self.config.recognizer_pages),
        };
        let text = self.pdftotext(file, Some((1, last))).await?;
        let pages: Vec<JsonValue> = split_pages(&text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| serde_json::json!({ "index": index, "text": text }))
            .collect();

        debug!(file = %file.display(), total, extracted = pages.len(), "Recognizer data extracted");
        Ok(serde_json::json!({
            "metadata": metadata,
            "totalPages": total,
            "pages": pages,
        }))
    }

    async fn run_full_text(&self, file: &Path, pages: Option<&[u32]>) -> Result<JsonValue> {
        self.ensure_file(file).await?;

        let (indices, texts) = match pages {
            None => {
                let text = self.pdftotext(file, None).await?;
                let texts: Vec<String> = split_pages(&text).into_iter().map(String::from).collect();
                ((0..texts.len() as u32).collect::<Vec<_>>(), texts)
            }
            Some(requested) => {
                let mut texts = Vec::with_capacity(requested.len());
                for &index in requested {
                    let page = index as usize + 1;
                    let text = self.pdftotext(file, Some((page, page))).await?;
                    texts.push(text.trim_end_matches(PAGE_BREAK).to_string());
                }
                (requested.to_vec(), texts)
            }
        };

        Ok(serde_json::json!({
            "pages": indices,
            "text": texts.join("\n"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdfinfo_metadata_parsing() {
        let output = "\
Title:          Attention Is All You Need
Author:         Ashish Vaswani
Producer:       pdfTeX-1.40.21
Pages:          15
Page size:      612 x 792 pts (letter)
";
        let metadata = parse_pdfinfo(output);
        assert_eq!(metadata["title"], "Attention Is All You Need");
        assert_eq!(metadata["author"], "Ashish Vaswani");
        assert_eq!(metadata["pages"], 15);
        assert_eq!(metadata["page_size"], "612 x 792 pts (letter)");
        assert_eq!(page_count(&metadata), 15);
    }

    #[test]
    fn test_page_count_missing() {
        assert_eq!(page_count(&parse_pdfinfo("")), 0);
        assert_eq!(page_count(&serde_json::json!({"pages": "many"})), 0);
    }

    #[test]
    fn test_split_pages() {
        assert_eq!(split_pages("one\u{c}two\u{c}"), vec!["one", "two"]);
        assert_eq!(split_pages("only"), vec!["only"]);
        assert_eq!(split_pages(""), vec![""]);
    }

    #[test]
    fn test_config_default() {
        let config = PopplerConfig::default();
        assert_eq!(config.pdftotext_path, "pdftotext");
        assert_eq!(config.recognizer_pages, 3);
        assert_eq!(config.with_recognizer_pages(0).recognizer_pages, 1);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let provider = PopplerProvider::new(PopplerConfig {
            pdftotext_path: "/nonexistent/pdftotext".into(),
            ..Default::default()
        });
        let err = provider.start().await.err().unwrap();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_input() {
        let engine = PopplerEngine {
            config: PopplerConfig::default(),
        };
        let err = engine
            .run_recognizer(Path::new("/nonexistent/paper.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_recognizer_extraction() {
        let provider = PopplerProvider::new(PopplerConfig::default());
        let Ok(engine) = provider.start().await else {
            eprintln!("Skipping test_recognizer_extraction: pdftotext not installed");
            return;
        };

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("hello.pdf");
        std::fs::write(&file, HELLO_PDF).unwrap();

        let data = engine.run_recognizer(&file).await.unwrap();
        assert!(data["pages"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Hello World"));

        let full = engine.run_full_text(&file, Some(&[0][..])).await.unwrap();
        assert_eq!(full["pages"], serde_json::json!([0]));
        assert!(full["text"].as_str().unwrap().contains("Hello World"));
    }

    const HELLO_PDF: &[u8] = b"%PDF-1.0
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj

2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj

3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]
   /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>
endobj

4 0 obj
<< /Length 44 >>
stream
BT /F1 12 Tf 100 700 Td (Hello World) Tj ET
endstream
endobj

5 0 obj
<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>
endobj

xref
0 6
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000115 00000 n
0000000266 00000 n
0000000360 00000 n

trailer
<< /Size 6 /Root 1 0 R >>
startxref
434
%%EOF";
}
