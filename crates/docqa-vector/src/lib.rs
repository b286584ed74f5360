//! Per-document vector indexes on LanceDB.
//!
//! An index is a directory holding a `chunks` table (text, provenance and
//! vector per chunk) and a `meta` manifest. Indexes are written once by
//! [`IndexBuilder::build`] and then only read through [`VectorIndex`].

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::VectorIndex;
pub use table::{source_digest, IndexManifest};
pub use writer::{IndexBuilder, IndexSummary};
