//! File-backed blog content: markdown posts with a front matter header.

pub mod front_matter;
pub use front_matter::{FrontMatter, FrontMatterError};

pub(crate) mod store;
pub use store::{BlogError, Post, PostMetadata, PostStore};
