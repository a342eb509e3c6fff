pub mod index;
pub mod qdrant;
pub mod vector;

pub use index::{IndexSettings, SearchMode, SearchOutput, VectorIndex};
pub use vector::{InMemoryVectorStore, VectorEntry, VectorHit, VectorStore};
