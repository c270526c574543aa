pub mod flat_index;
pub mod memory;
pub mod opensearch;
pub mod qdrant;

pub use flat_index::InMemoryVectorIndex;
pub use memory::InMemoryDocumentStore;
pub use opensearch::OpenSearchDocumentStore;
pub use qdrant::QdrantIndex;
