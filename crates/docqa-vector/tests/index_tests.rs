use std::sync::Arc;
use tempfile::TempDir;

use docqa_core::types::{Chunk, ChunkOrigin};
use docqa_core::{Embedder, Error};
use docqa_embed::HashEmbedder;
use docqa_vector::{source_digest, IndexBuilder, VectorIndex};

fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Chunk {
            index: i,
            text: t.to_string(),
            start: i * 100,
            page: Some(u32::try_from(i).unwrap() + 1),
            origin: ChunkOrigin::Text,
            source: "doc.pdf".to_string(),
        })
        .collect()
}

fn hash(dim: usize) -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(dim))
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing"
    }
    fn dim(&self) -> usize {
        8
    }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("device lost")
    }
}

/// Claims one dimension but returns another.
struct LyingEmbedder;

impl Embedder for LyingEmbedder {
    fn model_id(&self) -> &str {
        "lying"
    }
    fn dim(&self) -> usize {
        8
    }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

const TEXTS: [&str; 4] = [
    "alpha apples orchard harvest",
    "bravo bananas tropical market",
    "charlie cherries summer pie",
    "delta dates desert oasis",
];

#[tokio::test]
async fn build_then_load_retrieves_each_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-1");
    let summary = IndexBuilder::build(&path, &chunks(&TEXTS), hash(128), &source_digest(b"bytes")).await.expect("build");
    assert_eq!(summary.manifest.chunk_count, 4);
    assert_eq!(summary.manifest.source_digest, source_digest(b"bytes"));

    let index = VectorIndex::load(&path, hash(128)).await.expect("load");
    assert_eq!(index.len(), 4);
    for (i, text) in TEXTS.iter().enumerate() {
        let hits = index.search(text, 1).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.index, i);
        assert_eq!(hits[0].chunk.text, *text);
        assert_eq!(hits[0].chunk.page, Some(u32::try_from(i).unwrap() + 1));
        assert_eq!(hits[0].rank, 1);
        assert!(hits[0].score > 0.99, "self similarity {}", hits[0].score);
    }
}

#[tokio::test]
async fn k_bounds_and_ordering() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-2");
    IndexBuilder::build(&path, &chunks(&TEXTS), hash(64), "d").await.expect("build");
    let index = VectorIndex::load(&path, hash(64)).await.expect("load");

    assert!(index.search("apples", 0).await.expect("k=0").is_empty());
    assert_eq!(index.search("apples", 2).await.expect("k=2").len(), 2);

    let all = index.search("apples and cherries", 10).await.expect("k>rows");
    assert_eq!(all.len(), 4);
    for pair in all.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let ranks: Vec<usize> = all.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn equal_scores_keep_chunk_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-3");
    let texts = ["same words here", "unrelated zebra", "same words here", "same words here"];
    IndexBuilder::build(&path, &chunks(&texts), hash(64), "d").await.expect("build");
    let index = VectorIndex::load(&path, hash(64)).await.expect("load");
    let hits = index.search("same words here", 3).await.expect("search");
    let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
    assert_eq!(order, vec![0, 2, 3]);
}

#[tokio::test]
async fn missing_index_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = VectorIndex::load(&tmp.path().join("nope"), hash(16)).await.err().expect("error");
    assert!(matches!(err, Error::IndexNotFound { .. }));
    assert!(err.is_index_unavailable());
}

#[tokio::test]
async fn directory_without_tables_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty-dir");
    std::fs::create_dir_all(&path).unwrap();
    let err = VectorIndex::load(&path, hash(16)).await.err().expect("error");
    assert!(matches!(err, Error::IndexNotFound { .. }));
}

#[tokio::test]
async fn other_embedder_is_a_mismatch() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-4");
    IndexBuilder::build(&path, &chunks(&TEXTS), hash(64), "d").await.expect("build");
    let err = VectorIndex::load(&path, hash(32)).await.err().expect("error");
    assert!(matches!(err, Error::EmbeddingModelMismatch { .. }));
    assert!(err.is_index_unavailable());
}

#[tokio::test]
async fn failed_embedding_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-5");
    let err = IndexBuilder::build(&path, &chunks(&TEXTS), Arc::new(FailingEmbedder), "d").await.err().expect("error");
    assert!(matches!(err, Error::IndexBuild { .. }));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0, "staging directory removed");
}

#[tokio::test]
async fn wrong_vector_dimension_fails_the_build() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-6");
    let err = IndexBuilder::build(&path, &chunks(&TEXTS), Arc::new(LyingEmbedder), "d").await.err().expect("error");
    assert!(matches!(err, Error::IndexBuild { .. }));
    assert!(err.to_string().contains("dimension"));
    assert!(!path.exists());
}

#[tokio::test]
async fn existing_index_is_not_overwritten() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-7");
    IndexBuilder::build(&path, &chunks(&TEXTS[..1]), hash(16), "first").await.expect("build");
    let err = IndexBuilder::build(&path, &chunks(&TEXTS), hash(16), "second").await.err().expect("error");
    assert!(err.to_string().contains("already exists"));
    let index = VectorIndex::load(&path, hash(16)).await.expect("load");
    assert_eq!(index.manifest().source_digest, "first");
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn empty_document_builds_an_empty_index() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc-8");
    IndexBuilder::build(&path, &[], hash(16), "d").await.expect("build");
    let index = VectorIndex::load(&path, hash(16)).await.expect("load");
    assert!(index.is_empty());
    assert!(index.search("anything", 4).await.expect("search").is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_builds_create_missing_parents() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("nested").join("indexes");
    let (path_a, path_b) = (root.join("doc-a"), root.join("doc-b"));
    let (chunks_a, chunks_b) = (chunks(&TEXTS[..2]), chunks(&TEXTS[2..]));
    let (a, b) = tokio::join!(
        IndexBuilder::build(&path_a, &chunks_a, hash(32), "a"),
        IndexBuilder::build(&path_b, &chunks_b, hash(32), "b"),
    );
    assert_eq!(a.expect("build a").manifest.chunk_count, 2);
    assert_eq!(b.expect("build b").manifest.chunk_count, 2);

    let mut names: Vec<String> =
        std::fs::read_dir(&root).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
    names.sort();
    assert_eq!(names, vec!["doc-a", "doc-b"], "no staging directories left");
    assert_eq!(VectorIndex::load(&root.join("doc-b"), hash(32)).await.expect("load").len(), 2);
}
