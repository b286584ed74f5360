//! Document question answering: ingestion, retrieval-augmented answers and cleanup.
//!
//! [`DocQa`] wires the extractor, chunker, embedder provider, vector index and
//! generator together. All collaborators are passed in explicitly.

pub mod generate;
pub mod intent;
pub mod lifecycle;
pub mod locks;
pub mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use docqa_core::config::Settings;
use docqa_core::types::{validate_document_id, Answer, CleanupReport, DocumentFormat, IngestReport, RetrievalResult, SourceRef};
use docqa_core::{Embedder, EmbedderProvider, Error, Result, TextSplitter};
use docqa_extract::ContentExtractor;
use docqa_vector::{source_digest, IndexBuilder, VectorIndex};

pub use generate::{ChatCompletionsGenerator, Generator};
pub use lifecycle::ResourceLifecycle;
pub use locks::DocumentLocks;

pub struct DocQa {
    extractor: Arc<ContentExtractor>,
    embedders: Arc<dyn EmbedderProvider>,
    generator: Arc<dyn Generator>,
    splitter: TextSplitter,
    top_k: usize,
    lifecycle: ResourceLifecycle,
    locks: DocumentLocks,
}

impl DocQa {
    pub fn new(
        settings: &Settings,
        extractor: Arc<ContentExtractor>,
        embedders: Arc<dyn EmbedderProvider>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            extractor,
            embedders,
            generator,
            splitter: TextSplitter::from(&settings.chunking),
            top_k: settings.retrieval.top_k,
            lifecycle: ResourceLifecycle::new(&settings.paths.index_root, &settings.paths.upload_root),
            locks: DocumentLocks::new(),
        }
    }

    /// Production wiring: tesseract OCR, the configured embedder and the chat
    /// completions generator.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let extractor = Arc::new(ContentExtractor::from_settings(&settings.ocr));
        let embedders = docqa_embed::provider_from_settings(&settings.embedding);
        let generator = Arc::new(ChatCompletionsGenerator::from_settings(&settings.generation)?);
        Ok(Self::new(settings, extractor, embedders, generator))
    }

    pub fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }

    /// Extract, chunk, embed and persist `bytes` as the index of `document_id`.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest(&self, document_id: &str, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        validate_document_id(document_id)?;
        let format = DocumentFormat::from_filename(filename)?;
        let _guard = self.locks.lock(document_id).await;
        self.build_index(document_id, filename, format, bytes).await
    }

    /// Store the upload under `{upload_root}/{document_id}` and index it.
    ///
    /// The stored file is kept when indexing fails; `cleanup` removes it.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest_upload(&self, document_id: &str, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        validate_document_id(document_id)?;
        let format = DocumentFormat::from_filename(filename)?;
        let _guard = self.locks.lock(document_id).await;
        let lifecycle = self.lifecycle.clone();
        let (id, name) = (document_id.to_string(), filename.to_string());
        let bytes = tokio::task::spawn_blocking(move || lifecycle.store_upload(&id, &name, &bytes).map(|_| bytes))
            .await
            .map_err(|e| Error::io("store upload", std::io::Error::other(e.to_string())))??;
        self.build_index(document_id, filename, format, bytes).await
    }

    /// Ingest the upload previously stored with `ResourceLifecycle::store_upload`.
    pub async fn ingest_stored(&self, document_id: &str, filename: &str) -> Result<IngestReport> {
        let path = self.lifecycle.upload_path(document_id, filename)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| Error::io(format!("read {}", path.display()), e))?;
        self.ingest(document_id, filename, bytes).await
    }

    /// Caller holds the document lock.
    async fn build_index(&self, document_id: &str, filename: &str, format: DocumentFormat, bytes: Vec<u8>) -> Result<IngestReport> {
        let index_path = self.lifecycle.index_path(document_id);
        let source_label = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        let digest = source_digest(&bytes);
        let extractor = self.extractor.clone();
        let label = source_label.clone();
        let content = tokio::task::spawn_blocking(move || extractor.extract(&bytes, format, &label))
            .await
            .map_err(|e| Error::extraction(&source_label, format!("extraction task failed: {e}")))??;

        let chunks = self.splitter.split_content(&content, &source_label);
        info!(document_id, chunk_count = chunks.len(), "document chunked");

        let embedder = self.acquire_embedder().await.map_err(|e| Error::build(&index_path, e))?;
        let summary = IndexBuilder::build(&index_path, &chunks, embedder, &digest).await?;

        Ok(IngestReport {
            document_id: document_id.to_string(),
            index_path: summary.path,
            chunk_count: summary.manifest.chunk_count,
            page_count: content.page_count,
            image_count: content.image_count,
            ocr_failures: content.ocr_failures,
        })
    }

    /// Answer `query` from the index at `index_path`.
    #[instrument(skip(self))]
    pub async fn answer(&self, query: &str, index_path: &Path) -> Result<Answer> {
        let results = self.search(query, index_path, self.top_k).await?;
        let (prompt, intent) = prompt::compose(query, &results);
        info!(intent = %intent, sources = results.len(), "prompt composed");
        let answer = self.generator.generate(&prompt).await?;
        Ok(Answer { answer, sources: results.iter().map(SourceRef::from).collect(), intent })
    }

    /// Retrieval only, without generation.
    pub async fn search(&self, query: &str, index_path: &Path, k: usize) -> Result<RetrievalResult> {
        let embedder = self
            .acquire_embedder()
            .await
            .map_err(|e| Error::not_found(index_path, format!("embedding model unavailable: {e}")))?;
        let index = VectorIndex::load(index_path, embedder).await?;
        index.search(query, k).await
    }

    /// Remove the index and upload of `document_id`. I/O failures end up in
    /// the report, never in the error.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, document_id: &str) -> Result<CleanupReport> {
        validate_document_id(document_id)?;
        let _guard = self.locks.lock(document_id).await;
        let lifecycle = self.lifecycle.clone();
        let id = document_id.to_string();
        tokio::task::spawn_blocking(move || lifecycle.cleanup(&id))
            .await
            .map_err(|e| Error::io("cleanup", std::io::Error::other(e.to_string())))?
    }

    /// Path the index of `document_id` lives at once ingested.
    pub fn index_path(&self, document_id: &str) -> Result<PathBuf> {
        validate_document_id(document_id)?;
        Ok(self.lifecycle.index_path(document_id))
    }

    async fn acquire_embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let provider = self.embedders.clone();
        tokio::task::spawn_blocking(move || provider.acquire()).await?
    }
}
