//! Document and tutorial ingestion.
//!
//! Uploaded documents are split with a recursive character splitter and
//! stored in a fresh `document-<stem>-<hex>` collection. The tutorial is
//! split at markdown headers and replaces the tutorial collection wholesale.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use devbot_common::{DevbotError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::embedding::Embedder;
use crate::store::{NewDocument, SemanticStore, StoreError};
use crate::types::{MemoryConfig, DOCUMENT_COLLECTION_PREFIX};

/// File extensions read as plain text.
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["txt", "md", "py", "html", "js", "json", "xml"];

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

/// Recursive character splitter.
///
/// Text is cut at the coarsest separator present; pieces still longer than
/// `chunk_size` are cut again with the next separator. Small pieces are then
/// merged greedily into chunks of at most `chunk_size` characters, each
/// chunk repeating up to `chunk_overlap` trailing characters of the one
/// before it. Separators stay attached to the start of the following piece.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()));
        let (separator, rest) = match position {
            Some(i) => (separators[i].as_str(), &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if rest.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, rest));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&window, &mut chunks);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece.as_str(), len));
            total += len;
        }

        push_joined(&window, &mut chunks);
        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut pieces: Vec<String> = parts.next().map(str::to_string).into_iter().collect();
    pieces.extend(parts.map(|p| format!("{separator}{p}")));
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn push_joined(window: &VecDeque<(&str, usize)>, chunks: &mut Vec<String>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split markdown into sections, each starting at a header line.
///
/// Text before the first header forms its own section.
pub fn split_markdown_sections(content: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.trim().lines() {
        if is_markdown_header(line) && !current.is_empty() {
            sections.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        sections.push(current.join("\n"));
    }

    sections.retain(|s| !s.trim().is_empty());
    sections
}

/// `#`, `##`, ... followed by a space, at the very start of the line.
fn is_markdown_header(line: &str) -> bool {
    let level = line.len() - line.trim_start_matches('#').len();
    level > 0 && line[level..].starts_with(' ')
}

/// Lower-cased extension of `file_name`, if it is one we can read.
fn supported_extension(file_name: &str) -> Result<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else if ext.is_empty() {
        Err(DevbotError::Ingest(format!(
            "unsupported file format: '{file_name}' has no extension"
        )))
    } else {
        Err(DevbotError::Ingest(format!("unsupported file format: .{ext}")))
    }
}

/// Read a supported text file, replacing invalid UTF-8.
pub async fn extract_text(path: &Path) -> Result<String> {
    supported_extension(&path.to_string_lossy())?;
    if !path.exists() {
        return Err(DevbotError::Ingest(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fresh collection name for an uploaded file: `document-<stem>-<6 hex>`.
pub fn document_collection_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "upload".to_string() } else { stem };

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{DOCUMENT_COLLECTION_PREFIX}{stem}-{}", &suffix[..6])
}

/// Result of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection: String,
    pub chunks: usize,
}

/// Splits, embeds and stores documents.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn SemanticStore>,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    tutorial_collection: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn SemanticStore>,
        embedder: Arc<dyn Embedder>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            tutorial_collection: config.tutorial_collection.clone(),
        }
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Ingest a file from disk into a new document collection.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let text = extract_text(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_text(&file_name, &text).await
    }

    /// Ingest already-read text under `file_name` into a new document collection.
    pub async fn ingest_text(&self, file_name: &str, text: &str) -> Result<IngestReport> {
        supported_extension(file_name)?;

        let chunks = self.splitter.split(text);
        if chunks.is_empty() {
            return Err(DevbotError::Ingest(format!("'{file_name}' contains no text")));
        }
        debug!(file = %file_name, chunks = chunks.len(), "Split document");

        let collection = document_collection_name(file_name);
        let stored = self
            .store_chunks(&collection, &collection, file_name, chunks)
            .await?;

        info!(file = %file_name, collection = %collection, chunks = stored, "Ingested document");
        Ok(IngestReport {
            collection,
            chunks: stored,
        })
    }

    /// Rebuild the tutorial collection from a markdown file.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn index_tutorial(&self, path: &Path) -> Result<IngestReport> {
        let bytes = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let sections = split_markdown_sections(&content);
        if sections.is_empty() {
            return Err(DevbotError::Ingest(format!(
                "tutorial {} contains no text",
                path.display()
            )));
        }

        match self.store.delete_collection(&self.tutorial_collection).await {
            Ok(()) => debug!(collection = %self.tutorial_collection, "Dropped previous tutorial"),
            Err(StoreError::CollectionMissing(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let collection = self.tutorial_collection.clone();
        let stored = self
            .store_chunks(&collection, "tutorial", "tutorial", sections)
            .await?;

        info!(collection = %collection, chunks = stored, "Indexed tutorial");
        Ok(IngestReport {
            collection,
            chunks: stored,
        })
    }

    async fn store_chunks(
        &self,
        collection: &str,
        id_prefix: &str,
        source: &str,
        chunks: Vec<String>,
    ) -> Result<usize> {
        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .map_err(|e| DevbotError::Memory(e.to_string()))?;

        let documents: Vec<NewDocument> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| {
                NewDocument::new(format!("{id_prefix}-{i}"), text)
                    .with_metadata(json!({ "source": source, "chunk_id": i }))
                    .with_embedding(embedding)
            })
            .collect();

        let handle = self.store.get_or_create_collection(collection).await?;
        Ok(handle.add(documents).await?)
    }
}
