//! Office-document support: pull text runs out of docx / xlsx / pptx packages
//! and put translated runs back without touching anything else.
//!
//! All three formats are zip packages of XML parts. Visible text lives in
//! elements whose local name is `t` (`w:t` in Word, `a:t` in PowerPoint, `t`
//! in Excel shared strings). Extraction and reinsertion walk the same parts in
//! the same order, so the fragment list is a parallel sequence.

use crate::direction::Direction;
use crate::llm::TextGenerator;
use crate::translator::{TranslateError, Translator};
use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Docx,
    Xlsx,
    Pptx,
}

impl DocumentKind {
    /// Resolve from a file name or bare extension (`report.docx`, `docx`, `.docx`)
    pub fn from_path(path: &str) -> Result<Self> {
        let ext = path.rsplit('.').next().unwrap_or(path);
        ext.parse()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Docx => "docx",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Pptx => "pptx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            DocumentKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    /// Whether the package part `name` carries translatable text
    fn is_text_part(&self, name: &str) -> bool {
        match self {
            DocumentKind::Docx => {
                name == "word/document.xml"
                    || name == "word/footnotes.xml"
                    || name == "word/endnotes.xml"
                    || ((name.starts_with("word/header") || name.starts_with("word/footer"))
                        && name.ends_with(".xml"))
            }
            DocumentKind::Xlsx => name == "xl/sharedStrings.xml",
            DocumentKind::Pptx => name.starts_with("ppt/slides/slide") && name.ends_with(".xml"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "docx" => Ok(DocumentKind::Docx),
            "xlsx" => Ok(DocumentKind::Xlsx),
            "pptx" => Ok(DocumentKind::Pptx),
            other => bail!("Unsupported document format: '{}' (expected docx, xlsx or pptx)", other),
        }
    }
}

/// Largest single decompressed part accepted
pub const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Largest total decompressed size accepted for a package
pub const MAX_PACKAGE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PackageLimitError {
    #[error("package entry '{name}' exceeds {limit} bytes")]
    PartTooLarge { name: String, limit: u64 },

    #[error("package contents exceed {limit} bytes")]
    PackageTooLarge { limit: u64 },
}

#[derive(Debug)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    last_modified: zip::DateTime,
    unix_mode: Option<u32>,
    is_dir: bool,
}

/// An office document held in memory as its zip entries
#[derive(Debug)]
pub struct OfficePackage {
    entries: Vec<PackageEntry>,
}

impl OfficePackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limits(bytes, MAX_PART_BYTES, MAX_PACKAGE_BYTES)
    }

    /// Read a package, refusing any entry larger than `max_part` bytes or a
    /// package whose entries add up to more than `max_total` bytes.
    pub fn from_bytes_with_limits(bytes: &[u8], max_part: u64, max_total: u64) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("Failed to read document package")?;

        // Declared sizes come from the central directory and are checked
        // before anything is decompressed
        let mut declared: u64 = 0;
        for i in 0..zip.len() {
            let file = zip.by_index_raw(i).context("Failed to read package entry")?;
            if file.size() > max_part {
                return Err(PackageLimitError::PartTooLarge {
                    name: file.name().to_string(),
                    limit: max_part,
                }
                .into());
            }
            declared = declared.saturating_add(file.size());
        }
        if declared > max_total {
            return Err(PackageLimitError::PackageTooLarge { limit: max_total }.into());
        }

        let mut entries = Vec::with_capacity(zip.len());
        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("Failed to read package entry")?;
            let name = file.name().to_string();

            // The declared size may lie, so the read itself is bounded too
            let mut data = Vec::new();
            (&mut file)
                .take(max_part + 1)
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to read package entry {}", name))?;
            if data.len() as u64 > max_part {
                return Err(PackageLimitError::PartTooLarge { name, limit: max_part }.into());
            }
            total += data.len() as u64;
            if total > max_total {
                return Err(PackageLimitError::PackageTooLarge { limit: max_total }.into());
            }

            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    fn text_parts(&self, kind: DocumentKind) -> impl Iterator<Item = &PackageEntry> {
        self.entries
            .iter()
            .filter(move |e| !e.is_dir && kind.is_text_part(&e.name))
    }

    /// Every text run of the document, in package order
    pub fn extract_fragments(&self, kind: DocumentKind) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        for part in self.text_parts(kind) {
            let runs = extract_text_runs(&part.data)
                .with_context(|| format!("Failed to parse {}", part.name))?;
            fragments.extend(runs);
        }
        Ok(fragments)
    }

    /// Rebuild the package with `fragments` written over the text runs.
    /// `fragments` must line up one-to-one with [`OfficePackage::extract_fragments`].
    pub fn replace_fragments(&self, kind: DocumentKind, fragments: &[String]) -> Result<Vec<u8>> {
        let expected = self.extract_fragments(kind)?.len();
        if expected != fragments.len() {
            bail!(
                "Fragment count mismatch: document has {} text runs, got {}",
                expected,
                fragments.len()
            );
        }

        let mut remaining = fragments.iter();
        let mut replacements = HashMap::new();
        for part in self.text_parts(kind) {
            let xml = rewrite_text_runs(&part.data, &mut remaining)
                .with_context(|| format!("Failed to rewrite {}", part.name))?;
            replacements.insert(part.name.clone(), xml);
        }

        self.write_with_replacements(&replacements)
    }

    fn write_with_replacements(&self, replacements: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            let data = replacements.get(&entry.name).unwrap_or(&entry.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(entry.compression)
                .last_modified_time(entry.last_modified);
            if let Some(mode) = entry.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if entry.is_dir || entry.name.ends_with('/') {
                zout.add_directory(entry.name.as_str(), opts)
                    .with_context(|| format!("Failed to add directory {}", entry.name))?;
            } else {
                zout.start_file(entry.name.as_str(), opts)
                    .with_context(|| format!("Failed to start {}", entry.name))?;
                zout.write_all(data)
                    .with_context(|| format!("Failed to write {}", entry.name))?;
            }
        }
        let cursor = zout.finish().context("Failed to finish document package")?;
        Ok(cursor.into_inner())
    }
}

fn is_text_element(local_name: &[u8]) -> bool {
    local_name == b"t"
}

fn extract_text_runs(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut runs = Vec::new();
    let mut current: Option<String> = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).context("Failed to read XML event")? {
            Event::Eof => break,
            Event::Start(e) if is_text_element(e.local_name().as_ref()) => {
                current = Some(String::new());
            }
            Event::End(e) if is_text_element(e.local_name().as_ref()) => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
            }
            Event::Text(t) => {
                if let Some(run) = current.as_mut() {
                    run.push_str(&t.unescape().context("Failed to unescape text")?);
                }
            }
            Event::CData(t) => {
                if let Some(run) = current.as_mut() {
                    run.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            _ => {}
        }
    }
    Ok(runs)
}

fn rewrite_text_runs<'a>(
    xml: &[u8],
    fragments: &mut impl Iterator<Item = &'a String>,
) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    // Some(written) while inside a text element
    let mut in_run: Option<bool> = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).context("Failed to read XML event")?;
        match event {
            Event::Eof => break,
            Event::Start(e) if is_text_element(e.local_name().as_ref()) => {
                in_run = Some(false);
                writer.write_event(Event::Start(e)).context("Failed to write XML")?;
            }
            Event::Text(_) | Event::CData(_) if in_run.is_some() => {
                if in_run == Some(false) {
                    let fragment = fragments.next().context("Ran out of translated fragments")?;
                    writer
                        .write_event(Event::Text(BytesText::new(fragment)))
                        .context("Failed to write XML")?;
                    in_run = Some(true);
                }
            }
            Event::End(e) if is_text_element(e.local_name().as_ref()) => {
                if in_run == Some(false) {
                    let fragment = fragments.next().context("Ran out of translated fragments")?;
                    if !fragment.is_empty() {
                        writer
                            .write_event(Event::Text(BytesText::new(fragment)))
                            .context("Failed to write XML")?;
                    }
                }
                in_run = None;
                writer.write_event(Event::End(e)).context("Failed to write XML")?;
            }
            other => writer.write_event(other).context("Failed to write XML")?,
        }
    }
    Ok(writer.into_inner().into_inner())
}

/// Outcome counts of a document translation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentReport {
    pub fragments: usize,
    pub translated: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct TranslatedDocument {
    pub bytes: Vec<u8>,
    pub report: DocumentReport,
}

/// Translate every text run of an office document.
///
/// A run whose translation fails keeps its original text. A glossary storage
/// failure aborts the whole document.
pub async fn translate_document<G: TextGenerator>(
    translator: &Translator<G>,
    bytes: &[u8],
    kind: DocumentKind,
    direction: Direction,
) -> Result<TranslatedDocument> {
    let package = OfficePackage::from_bytes(bytes)?;
    let fragments = package.extract_fragments(kind)?;

    info!(
        "Translating {} with {} text runs ({})",
        kind.extension(),
        fragments.len(),
        direction.code()
    );

    let results = translator.translate_fragments(&fragments, direction).await;

    let mut report = DocumentReport {
        fragments: fragments.len(),
        ..Default::default()
    };
    let mut output = Vec::with_capacity(fragments.len());
    for (original, result) in fragments.iter().zip(results) {
        match result {
            Ok(translated) => {
                if !original.trim().is_empty() {
                    report.translated += 1;
                }
                output.push(translated);
            }
            Err(e @ TranslateError::Storage(_)) => return Err(e.into()),
            Err(e) => {
                warn!("Keeping original text for run '{}': {}", original, e);
                report.failed += 1;
                output.push(original.clone());
            }
        }
    }

    let bytes = package.replace_fragments(kind, &output)?;
    info!(
        "Document translated: {} runs, {} failed",
        report.translated, report.failed
    );

    Ok(TranslatedDocument { bytes, report })
}
