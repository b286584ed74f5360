//! All-or-nothing index construction.
//!
//! Tables are written into a staging directory next to the target and the
//! staging directory is renamed into place only after everything succeeded.
use anyhow::{anyhow, ensure, Context, Result};
use arrow_array::{FixedSizeListArray, Int32Array, Int64Array, RecordBatch, StringArray};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use docqa_core::types::Chunk;
use docqa_core::{Embedder, Error};

use crate::schema::{build_chunks_schema, CHUNKS_TABLE, FORMAT_VERSION};
use crate::table::{create_table, open_db, write_manifest, IndexManifest};

#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub manifest: IndexManifest,
}

pub struct IndexBuilder;

impl IndexBuilder {
    /// Embed `chunks` and persist them at `path`.
    ///
    /// `path` must not exist yet. On any failure nothing is left at `path`.
    pub async fn build(path: &Path, chunks: &[Chunk], embedder: Arc<dyn Embedder>, source_digest: &str) -> Result<IndexSummary, Error> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::build(path, "already exists"));
        }
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new(".")).to_path_buf();
        tokio::fs::create_dir_all(&parent).await.map_err(|e| Error::build(path, e))?;
        let staging = tokio::task::spawn_blocking(move || tempfile::Builder::new().prefix(".staging-").tempdir_in(parent))
            .await
            .map_err(|e| Error::build(path, format!("staging task failed: {e}")))?
            .map_err(|e| Error::build(path, format!("cannot create staging directory: {e}")))?;

        let manifest = match write_index(staging.path(), chunks, embedder, source_digest).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index build failed, discarding staging");
                discard(staging).await;
                return Err(Error::build(path, format!("{e:#}")));
            }
        };

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            discard(staging).await;
            return Err(Error::build(path, "already exists"));
        }
        let staged = staging.into_path();
        if let Err(e) = tokio::fs::rename(&staged, path).await {
            let _ = tokio::fs::remove_dir_all(&staged).await;
            return Err(Error::build(path, format!("cannot move index into place: {e}")));
        }
        info!(path = %path.display(), chunk_count = manifest.chunk_count, embedder = %manifest.embedder_id, "index built");
        Ok(IndexSummary { path: path.to_path_buf(), manifest })
    }
}

/// Removes a staging directory without blocking the executor.
async fn discard(staging: tempfile::TempDir) {
    let _ = tokio::task::spawn_blocking(move || staging.close()).await;
}

async fn write_index(dir: &Path, chunks: &[Chunk], embedder: Arc<dyn Embedder>, source_digest: &str) -> Result<IndexManifest> {
    let dim = embedder.dim();
    let embedder_id = embedder.model_id().to_string();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| anyhow!("embedding task failed: {e}"))?
        .context("embedding failed")?;

    ensure!(vectors.len() == chunks.len(), "embedder returned {} vectors for {} chunks", vectors.len(), chunks.len());
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
        return Err(anyhow!("vector {i} has dimension {}, expected {dim}", v.len()));
    }

    let conn = open_db(dir).await?;
    let dim_i32 = i32::try_from(dim).context("embedding dimension too large")?;
    let schema = build_chunks_schema(dim_i32);
    let batch = if chunks.is_empty() { None } else { Some(chunks_to_record_batch(chunks, &vectors, dim_i32)?) };
    create_table(&conn, CHUNKS_TABLE, schema, batch).await?;

    let manifest = IndexManifest {
        embedder_id,
        dim,
        chunk_count: chunks.len(),
        source_digest: source_digest.to_string(),
        built_at: Utc::now().to_rfc3339(),
        format_version: FORMAT_VERSION,
    };
    write_manifest(&conn, &manifest).await?;
    Ok(manifest)
}

fn chunks_to_record_batch(chunks: &[Chunk], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
    let schema = build_chunks_schema(dim);
    let indices = chunks.iter().map(|c| i32::try_from(c.index)).collect::<Result<Vec<_>, _>>()?;
    let starts = chunks.iter().map(|c| i64::try_from(c.start)).collect::<Result<Vec<_>, _>>()?;
    let pages: Vec<Option<i32>> = chunks.iter().map(|c| c.page.and_then(|p| i32::try_from(p).ok())).collect();
    let contents: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let origins: Vec<&str> = chunks.iter().map(|c| c.origin.as_str()).collect();
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let vectors = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));

    let record_batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(Int64Array::from(starts)),
            Arc::new(Int32Array::from(pages)),
            Arc::new(StringArray::from(origins)),
            Arc::new(StringArray::from(sources)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
        ],
    )?;
    Ok(record_batch)
}
