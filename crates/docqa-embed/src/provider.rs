//! Explicit model acquisition.
//!
//! `acquire` hands out an `Arc<dyn Embedder>`; dropping the last clone
//! releases the model. `PerCallProvider` loads a fresh model on every
//! acquisition, `SharedProvider` loads once and hands out clones.
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use tracing::info;

use docqa_core::config::{EmbeddingBackend, EmbeddingSettings};
use docqa_core::{Embedder, EmbedderProvider};

use crate::bert::BertEmbedder;
use crate::hash::HashEmbedder;

type Loader = Box<dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync>;

pub struct PerCallProvider {
    loader: Loader,
}

impl PerCallProvider {
    pub fn new(loader: impl Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static) -> Self {
        Self { loader: Box::new(loader) }
    }
}

impl EmbedderProvider for PerCallProvider {
    fn acquire(&self) -> Result<Arc<dyn Embedder>> {
        (self.loader)()
    }
}

pub struct SharedProvider {
    loader: Loader,
    cached: Mutex<Option<Arc<dyn Embedder>>>,
}

impl SharedProvider {
    pub fn new(loader: impl Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static) -> Self {
        Self { loader: Box::new(loader), cached: Mutex::new(None) }
    }

    /// Wrap an already loaded embedder.
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        let for_loader = embedder.clone();
        Self { loader: Box::new(move || Ok(for_loader.clone())), cached: Mutex::new(Some(embedder)) }
    }
}

impl EmbedderProvider for SharedProvider {
    fn acquire(&self) -> Result<Arc<dyn Embedder>> {
        let mut cached = self.cached.lock().map_err(|_| anyhow!("embedder cache lock poisoned"))?;
        if let Some(embedder) = cached.as_ref() {
            return Ok(embedder.clone());
        }
        let embedder = (self.loader)()?;
        *cached = Some(embedder.clone());
        Ok(embedder)
    }
}

/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hash backend.
pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the provider selected by `embedding.backend` and `embedding.cache_model`.
pub fn provider_from_settings(settings: &EmbeddingSettings) -> Arc<dyn EmbedderProvider> {
    let backend = if use_fake_embeddings() { EmbeddingBackend::Hash } else { settings.backend };
    let loader: Loader = match backend {
        EmbeddingBackend::Hash => {
            info!(dim = settings.hash_dim, "using hash embedder");
            let dim = settings.hash_dim;
            Box::new(move || Ok(Arc::new(HashEmbedder::new(dim)) as Arc<dyn Embedder>))
        }
        EmbeddingBackend::Bert => {
            let dir = settings.model_dir.clone();
            let model_id = settings.model_id.clone();
            let max_len = settings.max_len;
            Box::new(move || Ok(Arc::new(BertEmbedder::load(&dir, model_id.clone(), max_len)?) as Arc<dyn Embedder>))
        }
    };
    if settings.cache_model {
        Arc::new(SharedProvider { loader, cached: Mutex::new(None) })
    } else {
        Arc::new(PerCallProvider { loader })
    }
}
