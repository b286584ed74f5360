use std::sync::Arc;

/// A sentence encoder producing fixed-size vectors.
///
/// `model_id` is stamped into every index so that a later load can detect a
/// different model; two embedders with equal ids must produce equal vectors.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Explicit acquisition of an embedding model. Release is dropping the `Arc`.
pub trait EmbedderProvider: Send + Sync {
    fn acquire(&self) -> anyhow::Result<Arc<dyn Embedder>>;
}

/// Recognizes text in a single encoded raster image (PNG or JPEG bytes).
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8]) -> anyhow::Result<String>;
}
