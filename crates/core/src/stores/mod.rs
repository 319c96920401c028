pub mod memory;
pub mod memory_index;
pub mod opensearch;

pub use memory::InMemoryDocumentStore;
pub use memory_index::InMemorySearchBackend;
pub use opensearch::OpenSearchBackend;
