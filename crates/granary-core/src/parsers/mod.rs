//! Parsers for the meeting application's data files

pub mod cache;

pub use cache::{parse_cache, CacheEncoding, CacheParser};
