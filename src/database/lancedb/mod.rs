// LanceDB vector database module
// Handles chunk storage and similarity search over embeddings

pub mod collection;

use serde::{Deserialize, Serialize};

/// Chunk record written to the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier for this chunk
    pub id: String,
    /// The embedding vector for the chunk text
    pub vector: Vec<f32>,
    /// The chunk text itself
    pub text: String,
    /// Metadata describing where the chunk came from
    pub metadata: ChunkMetadata,
    /// RFC 3339 timestamp when this record was created
    pub created_at: String,
}

/// Metadata stored alongside each chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Logical source name (usually the original file name)
    pub source: String,
    /// Position of this chunk within its source document
    pub chunk_index: u32,
    /// Absolute path of the source file at index time, if known
    pub file_path: Option<String>,
}

/// Chunk as read back from the vector store
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}
