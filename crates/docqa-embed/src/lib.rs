//! Sentence embedding models and their acquisition.

pub mod bert;
pub mod device;
pub mod hash;
pub mod pool;
pub mod provider;
pub mod tokenize;

pub use bert::BertEmbedder;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;
pub use provider::{provider_from_settings, use_fake_embeddings, PerCallProvider, SharedProvider};
