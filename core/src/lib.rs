pub mod config;
pub mod models;
pub mod search;
pub mod storage;
pub mod tokenizer;

pub use models::{Author, Highlight, HighlightAnchor, Paper, PaperMeta};
pub use search::{PaperStore, SearchIndex, SearchMatch, SearchResult};
pub use storage::Store;
