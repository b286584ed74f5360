//! LanceDB connection helpers and the index manifest.
//!
//! The manifest lives in a key/value `meta` table next to `chunks` and stamps
//! the embedder that produced the vectors.
use anyhow::{anyhow, Context, Result};
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::schema::{build_meta_schema, META_TABLE};

pub async fn open_db(path: &Path) -> Result<Connection> {
    Ok(connect(path.to_string_lossy().as_ref()).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

/// Create `name` holding `batch`, or an empty table with `schema` when there are no rows.
pub async fn create_table(conn: &Connection, name: &str, schema: Arc<Schema>, batch: Option<RecordBatch>) -> Result<()> {
    let batches = match batch {
        Some(batch) => vec![Ok(batch)],
        None => vec![],
    };
    let reader = RecordBatchIterator::new(batches.into_iter(), schema);
    conn.create_table(name, Box::new(reader)).execute().await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexManifest {
    pub embedder_id: String,
    pub dim: usize,
    pub chunk_count: usize,
    /// blake3 hex digest of the source bytes.
    pub source_digest: String,
    /// RFC 3339 UTC timestamp.
    pub built_at: String,
    pub format_version: u32,
}

impl IndexManifest {
    fn to_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("embedder_id", self.embedder_id.clone()),
            ("dim", self.dim.to_string()),
            ("chunk_count", self.chunk_count.to_string()),
            ("source_digest", self.source_digest.clone()),
            ("built_at", self.built_at.clone()),
            ("format_version", self.format_version.to_string()),
        ]
    }

    fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let get = |k: &str| map.get(k).cloned().ok_or_else(|| anyhow!("manifest key '{k}' missing"));
        Ok(Self {
            embedder_id: get("embedder_id")?,
            dim: get("dim")?.parse().context("manifest dim")?,
            chunk_count: get("chunk_count")?.parse().context("manifest chunk_count")?,
            source_digest: get("source_digest")?,
            built_at: get("built_at")?,
            format_version: get("format_version")?.parse().context("manifest format_version")?,
        })
    }
}

pub async fn write_manifest(conn: &Connection, manifest: &IndexManifest) -> Result<()> {
    let entries = manifest.to_entries();
    let now = Utc::now().timestamp_millis();
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(entries.iter().map(|(k, _)| *k).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
        ],
    )?;
    create_table(conn, META_TABLE, build_meta_schema(), Some(rb)).await
}

pub async fn read_manifest(conn: &Connection) -> Result<IndexManifest> {
    let t = conn.open_table(META_TABLE).execute().await?;
    let mut stream = t.query().execute().await?;
    let mut map = HashMap::new();
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        let keys = batch
            .column_by_name("key")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("meta.key column missing"))?;
        let values = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("meta.value column missing"))?;
        for i in 0..batch.num_rows() {
            map.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    IndexManifest::from_map(&map)
}

pub fn source_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
