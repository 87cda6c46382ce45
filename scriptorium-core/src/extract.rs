//! Built-in content extraction.
//!
//! Partitions Markdown and plain-text documents into typed content units:
//! heading-delimited text sections, pipe tables, and embedded images carried
//! as base64 data URIs. Other extraction backends (PDF services, OCR, etc.)
//! plug in through the [`ContentExtractor`] trait instead.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use tracing::debug;

use crate::capability::ContentExtractor;
use crate::document::{ContentUnit, UnitKind, UnitPayload};
use crate::error::ExtractionError;

/// Extractor for Markdown (`.md`) and plain-text (`.txt`) documents.
#[derive(Debug, Default)]
pub struct MarkdownExtractor;

#[async_trait]
impl ContentExtractor for MarkdownExtractor {
    async fn extract(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<Vec<ContentUnit>, ExtractionError> {
        let text = std::str::from_utf8(content).map_err(ExtractionError::InvalidEncoding)?;

        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let units = match extension.as_str() {
            "md" | "markdown" => partition_markdown(text)?,
            "txt" | "text" | "" => partition_plain_text(text),
            other => {
                return Err(ExtractionError::UnsupportedFormat {
                    format: other.to_string(),
                });
            }
        };

        debug!(
            filename = %filename,
            units = units.len(),
            "Extraction complete"
        );

        Ok(units)
    }
}

/// Partition markdown into text sections, pipe tables, and embedded images.
///
/// Text is split on headings, like section extraction for other formats; a
/// run of `|`-prefixed lines forms one table unit; a standalone image line
/// with a base64 data URI becomes an image unit. Image references without an
/// inline payload stay part of the surrounding text.
pub fn partition_markdown(content: &str) -> Result<Vec<ContentUnit>, ExtractionError> {
    let mut builder = UnitBuilder::default();
    let mut section: Option<String> = None;
    let mut text_block = String::new();
    let mut table_block = String::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if !table_block.is_empty() && !trimmed.starts_with('|') {
            builder.push_table(std::mem::take(&mut table_block), section.clone());
        }

        if trimmed.starts_with('#') {
            builder.push_text(std::mem::take(&mut text_block), section.clone());
            section = Some(trimmed.trim_start_matches('#').trim().to_string());
        } else if trimmed.starts_with('|') {
            if table_block.is_empty() {
                builder.push_text(std::mem::take(&mut text_block), section.clone());
            }
            table_block.push_str(trimmed);
            table_block.push('\n');
        } else if let Some((alt, data)) = parse_inline_image(trimmed) {
            builder.push_text(std::mem::take(&mut text_block), section.clone());
            builder.push_image(data?, alt, section.clone());
        } else {
            text_block.push_str(line);
            text_block.push('\n');
        }
    }

    builder.push_table(table_block, section.clone());
    builder.push_text(text_block, section);

    Ok(builder.units)
}

/// Treat an entire plain-text document as one text unit.
pub fn partition_plain_text(content: &str) -> Vec<ContentUnit> {
    let mut builder = UnitBuilder::default();
    builder.push_text(content.to_string(), None);
    builder.units
}

/// Parse a standalone `![alt](data:image/...;base64,...)` line.
///
/// Returns the alt text and the decode result; `None` when the line is not
/// an image with an inline payload.
fn parse_inline_image(line: &str) -> Option<(Option<String>, Result<Bytes, ExtractionError>)> {
    let rest = line.strip_prefix("![")?;
    let (alt, rest) = rest.split_once("](")?;
    let src = rest.strip_suffix(')')?;

    if !src.starts_with("data:") {
        return None;
    }
    let (_, payload) = src.split_once(";base64,")?;

    let alt = if alt.trim().is_empty() {
        None
    } else {
        Some(alt.trim().to_string())
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map(Bytes::from)
        .map_err(ExtractionError::InvalidImageData);

    Some((alt, decoded))
}

/// Accumulates content units, assigning ids unique within the document.
#[derive(Default)]
struct UnitBuilder {
    units: Vec<ContentUnit>,
}

impl UnitBuilder {
    fn next_id(&self, kind: UnitKind) -> String {
        format!("{}-{:03}", kind, self.units.len())
    }

    fn push_text(&mut self, body: String, section: Option<String>) {
        let body = body.trim().to_string();
        if body.is_empty() {
            return;
        }
        self.units.push(ContentUnit {
            id: self.next_id(UnitKind::Text),
            kind: UnitKind::Text,
            payload: UnitPayload::Text { body },
            page: None,
            section,
        });
    }

    fn push_table(&mut self, body: String, section: Option<String>) {
        let body = body.trim().to_string();
        if body.is_empty() {
            return;
        }
        self.units.push(ContentUnit {
            id: self.next_id(UnitKind::Table),
            kind: UnitKind::Table,
            payload: UnitPayload::Table { body },
            page: None,
            section,
        });
    }

    fn push_image(&mut self, data: Bytes, filename: Option<String>, section: Option<String>) {
        self.units.push(ContentUnit {
            id: self.next_id(UnitKind::Image),
            kind: UnitKind::Image,
            payload: UnitPayload::Image { data, filename },
            page: None,
            section,
        });
    }
}
