pub mod file_store;
pub mod in_memory;

pub use file_store::FileArtifactRepository;
pub use in_memory::InMemoryArtifactRepository;
