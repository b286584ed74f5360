use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use docqa_core::types::{Chunk, ChunkOrigin, RetrievalResult, RetrievedChunk};
use docqa_core::{Embedder, Error};

use crate::schema::{CHUNKS_TABLE, META_TABLE};
use crate::table::{open_db, read_manifest, table_exists, IndexManifest};

/// Read-only handle on a built index. Cheap to share across tasks.
pub struct VectorIndex {
    path: PathBuf,
    table: Table,
    embedder: Arc<dyn Embedder>,
    manifest: IndexManifest,
    row_count: usize,
}

impl VectorIndex {
    /// Open the index at `path` for querying with `embedder`.
    ///
    /// Fails with `IndexNotFound` when the directory, either table or the
    /// manifest is missing, and with `EmbeddingModelMismatch` when the index was
    /// built by a different embedder.
    pub async fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, Error> {
        let is_dir = tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Err(Error::not_found(path, "no index directory"));
        }
        let conn = open_db(path).await.map_err(|e| Error::not_found(path, e))?;
        for name in [CHUNKS_TABLE, META_TABLE] {
            if !table_exists(&conn, name).await.map_err(|e| Error::not_found(path, e))? {
                return Err(Error::not_found(path, format!("missing '{name}' table")));
            }
        }
        let manifest = read_manifest(&conn)
            .await
            .map_err(|e| Error::not_found(path, format!("unreadable manifest: {e}")))?;
        if manifest.embedder_id != embedder.model_id() || manifest.dim != embedder.dim() {
            return Err(Error::EmbeddingModelMismatch {
                path: path.display().to_string(),
                built_with: format!("{} ({}d)", manifest.embedder_id, manifest.dim),
                loaded_with: format!("{} ({}d)", embedder.model_id(), embedder.dim()),
            });
        }
        let table = conn.open_table(CHUNKS_TABLE).execute().await.map_err(|e| Error::not_found(path, e))?;
        let row_count = table.count_rows(None).await.map_err(|e| Error::not_found(path, e))?;
        debug!(path = %path.display(), rows = row_count, "index loaded");
        Ok(Self { path: path.to_path_buf(), table, embedder, manifest, row_count })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Scores are cosine similarity; equal scores keep chunk order.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, Error> {
        if k == 0 || self.row_count == 0 {
            return Ok(Vec::new());
        }
        self.search_inner(query, k).await.map_err(|e| Error::not_found(&self.path, format!("search failed: {e:#}")))
    }

    async fn search_inner(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let embedder = self.embedder.clone();
        let text = vec![query.to_string()];
        let query_vec = tokio::task::spawn_blocking(move || embedder.embed_batch(&text))
            .await
            .map_err(|e| anyhow!("embedding task failed: {e}"))??
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let mut stream = self
            .table
            .vector_search(query_vec)?
            .distance_type(DistanceType::Cosine)
            .limit(self.row_count)
            .execute()
            .await?;

        let mut scored = Vec::with_capacity(self.row_count);
        while let Some(batch) = stream.try_next().await? {
            scored.extend(rows(&batch)?);
        }
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.partial_cmp(a_score).unwrap_or(std::cmp::Ordering::Equal).then(a.index.cmp(&b.index))
        });
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, chunk))| RetrievedChunk { chunk, score, rank: i + 1 })
            .collect())
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or mistyped"))
}

fn rows(batch: &RecordBatch) -> Result<Vec<(f32, Chunk)>> {
    let indices = column::<Int32Array>(batch, "chunk_index")?;
    let contents = column::<StringArray>(batch, "content")?;
    let starts = column::<Int64Array>(batch, "start")?;
    let pages = column::<Int32Array>(batch, "page")?;
    let origins = column::<StringArray>(batch, "origin")?;
    let sources = column::<StringArray>(batch, "source")?;
    let distances = column::<Float32Array>(batch, "_distance")?;

    (0..batch.num_rows())
        .map(|i| -> Result<(f32, Chunk)> {
            let chunk = Chunk {
                index: usize::try_from(indices.value(i))?,
                text: contents.value(i).to_string(),
                start: usize::try_from(starts.value(i))?,
                page: if pages.is_null(i) { None } else { u32::try_from(pages.value(i)).ok() },
                origin: ChunkOrigin::parse(origins.value(i)),
                source: sources.value(i).to_string(),
            };
            Ok((1.0 - distances.value(i), chunk))
        })
        .collect()
}
