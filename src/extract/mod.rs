// Text extraction for the document formats accepted by ingestion


use fancy_regex::Regex;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

const DOCX_BODY_PART: &str = "word/document.xml";

static DOCX_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab/>|<w:br\b[^>]*/>|</w:p>")
        .expect("valid regex")
});

static XML_ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|#x[0-9A-Fa-f]+|#[0-9]+);").expect("valid regex")
});

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

impl ExtractionError {
    fn unreadable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Format implied by the file extension, ignoring case
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::PlainText => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, format: DocumentFormat) -> bool;

    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "plain-text"
    }

    #[inline]
    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::PlainText
    }

    #[inline]
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        std::fs::read_to_string(path).map_err(|e| ExtractionError::unreadable(path, e))
    }
}

/// Reads the main document part of a Word file, one line per paragraph
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "docx"
    }

    #[inline]
    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Docx
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let file = File::open(path).map_err(|e| ExtractionError::unreadable(path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| ExtractionError::unreadable(path, e))?;
        let mut part = archive
            .by_name(DOCX_BODY_PART)
            .map_err(|e| ExtractionError::unreadable(path, format!("{DOCX_BODY_PART}: {e}")))?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| ExtractionError::unreadable(path, e))?;

        docx_xml_to_text(&xml).map_err(|e| ExtractionError::unreadable(path, e))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "pdf"
    }

    #[inline]
    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Pdf
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractionError::unreadable(path, e))?;

        // The parser panics on some malformed files; keep that to this file
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
            .map_err(|_| ExtractionError::unreadable(path, "PDF parser panicked"))?
            .map_err(|e| ExtractionError::unreadable(path, e))?;

        Ok(pages
            .iter()
            .map(|page| page.trim_end())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Plain text of a WordprocessingML body: run text in document order, tabs
/// and breaks preserved, a newline after every paragraph
#[inline]
pub fn docx_xml_to_text(xml: &str) -> Result<String, fancy_regex::Error> {
    let mut text = String::with_capacity(xml.len() / 4);

    for token in DOCX_TOKEN_REGEX.captures_iter(xml) {
        let token = token?;
        if let Some(run) = token.get(1) {
            text.push_str(&unescape_xml(run.as_str())?);
            continue;
        }

        match token.get(0).map(|m| m.as_str()) {
            Some("<w:tab/>") => text.push('\t'),
            Some("</w:p>") => text.push('\n'),
            Some(_) => text.push('\n'),
            None => {}
        }
    }

    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    Ok(text)
}

fn unescape_xml(raw: &str) -> Result<String, fancy_regex::Error> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for entity in XML_ENTITY_REGEX.captures_iter(raw) {
        let entity = entity?;
        let (Some(whole), Some(name)) = (entity.get(0), entity.get(1)) else {
            continue;
        };

        out.push_str(raw.get(last..whole.start()).unwrap_or_default());
        let replacement = match name.as_str() {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            numeric => numeric
                .strip_prefix("#x")
                .map_or_else(
                    || numeric.strip_prefix('#').and_then(|d| d.parse::<u32>().ok()),
                    |hex| u32::from_str_radix(hex, 16).ok(),
                )
                .and_then(char::from_u32),
        };
        match replacement {
            Some(c) => out.push(c),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(raw.get(last..).unwrap_or_default());
    Ok(out)
}

/// Dispatches each file to the first extractor that supports its format
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl fmt::Debug for ExtractorRegistry {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extractors.iter().map(|e| e.name()))
            .finish()
    }
}

impl Default for ExtractorRegistry {
    #[inline]
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PlainTextExtractor));
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(DocxExtractor));
        registry
    }
}

impl ExtractorRegistry {
    #[inline]
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    #[inline]
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    #[inline]
    pub fn extractor_for(&self, format: DocumentFormat) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(format))
            .map(|e| e.as_ref())
    }

    /// Whether some registered extractor handles this file's format
    #[inline]
    pub fn supports_path(&self, path: &Path) -> bool {
        DocumentFormat::from_path(path).is_some_and(|format| self.extractor_for(format).is_some())
    }

    #[inline]
    pub fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let extractor = DocumentFormat::from_path(path)
            .and_then(|format| self.extractor_for(format))
            .ok_or_else(|| ExtractionError::UnsupportedFormat(path.to_path_buf()))?;

        debug!("Extracting {} with {}", path.display(), extractor.name());
        extractor.extract(path)
    }
}

/// Extract text from a supported file using the default extractors
#[inline]
pub fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    ExtractorRegistry::default().extract(path)
}
