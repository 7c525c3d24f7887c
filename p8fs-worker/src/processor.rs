//! Content processor seam (§6 "content processor interface"): external
//! collaborators turn extracted text into chunks. This crate ships one
//! concrete processor — plain-text, markdown-aware splitting — and the
//! trait real extraction backends (PDF, OCR, transcription) plug into.

use async_trait::async_trait;
use p8fs_core::ChunkCategory;

use crate::error::WorkerResult;

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Target chunk size in characters (§6 default 512).
    pub chunk_size_chars: usize,
    pub markdown_aware: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self { chunk_size_chars: 512, markdown_aware: false }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    pub content: String,
    pub ordinal: u32,
    pub category: ChunkCategory,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileMetadata {
    pub word_count: usize,
    pub confidence: f32,
    pub extraction_method: String,
    pub title: Option<String>,
}

pub struct ProcessedDocument {
    pub chunks: Vec<ProcessedChunk>,
    pub metadata: FileMetadata,
}

#[async_trait]
pub trait ContentProcessor: Send + Sync {
    /// Whether this processor handles the given extension/MIME pair.
    fn supports(&self, content_type: &str, extension: &str) -> bool;

    fn extraction_method(&self) -> &'static str;

    async fn process(
        &self,
        bytes: &[u8],
        source_file: &str,
        content_type: &str,
        options: &ProcessorOptions,
    ) -> WorkerResult<ProcessedDocument>;
}

/// Splits raw UTF-8 text into chunks at whitespace boundaries, never
/// splitting a word, honoring markdown heading breaks when
/// `markdown_aware` is set. The extraction-quality baseline: no OCR, no
/// transcription, just decode-and-split.
pub struct PlainTextProcessor;

impl PlainTextProcessor {
    fn split(text: &str, options: &ProcessorOptions) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let is_heading_break = options.markdown_aware && word.starts_with('#') && !current.is_empty();
            if is_heading_break || current.len() + word.len() + 1 > options.chunk_size_chars {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

#[async_trait]
impl ContentProcessor for PlainTextProcessor {
    fn supports(&self, content_type: &str, extension: &str) -> bool {
        content_type.starts_with("text/") || extension == "txt" || extension == "md"
    }

    fn extraction_method(&self) -> &'static str {
        "plain_text_v1"
    }

    async fn process(
        &self,
        bytes: &[u8],
        _source_file: &str,
        content_type: &str,
        options: &ProcessorOptions,
    ) -> WorkerResult<ProcessedDocument> {
        let text = String::from_utf8_lossy(bytes);
        let mut opts = options.clone();
        opts.markdown_aware = opts.markdown_aware || content_type == "text/markdown";

        let word_count = text.split_whitespace().count();
        let chunks = Self::split(&text, &opts)
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| ProcessedChunk {
                content,
                ordinal: ordinal as u32,
                category: ChunkCategory::DocumentChunk,
                summary: None,
            })
            .collect();

        Ok(ProcessedDocument {
            chunks,
            metadata: FileMetadata {
                word_count,
                confidence: 1.0,
                extraction_method: self.extraction_method().to_string(),
                title: None,
            },
        })
    }
}

/// Dispatches to the first registered processor whose `supports`
/// matches, mirroring §4.4 step 5 ("select based on extension +
/// declared MIME").
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn ContentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, processor: Box<dyn ContentProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn select(&self, content_type: &str, path: &str) -> Option<&dyn ContentProcessor> {
        let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
        self.processors
            .iter()
            .find(|p| p.supports(content_type, &extension))
            .map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_processor_never_splits_a_word() {
        let processor = PlainTextProcessor;
        let text = "alpha ".repeat(100);
        let options = ProcessorOptions { chunk_size_chars: 20, markdown_aware: false };
        let doc = processor.process(text.as_bytes(), "doc.txt", "text/plain", &options).await.unwrap();
        assert!(doc.chunks.len() > 1);
        for chunk in &doc.chunks {
            assert!(!chunk.content.contains("alph "));
        }
    }

    #[test]
    fn registry_selects_by_extension() {
        let registry = ProcessorRegistry::new().register(Box::new(PlainTextProcessor));
        assert!(registry.select("text/plain", "notes.txt").is_some());
        assert!(registry.select("application/pdf", "doc.pdf").is_none());
    }
}
