// Vector database module
// Persistent chunk storage and similarity search

pub mod lancedb;

pub use lancedb::{ChunkMetadata, ChunkRecord, StoredChunk, collection::VectorCollection};
