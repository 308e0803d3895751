//! Construction core for compact taxonomic classification databases.
//!
//! Reference genomes are streamed through per-file signature extraction
//! (64-bit minimized k-mer hashes) and folded, under a pluggable reduction
//! strategy, into a single global signature -> annotation map backed by a
//! taxonomy tree.

pub mod build_map;
pub mod encoder;
pub mod errors;
pub mod name_map;
pub mod reduce;
pub mod resolve;
pub mod seqreader;
pub mod table;
pub mod taxonomy;
pub mod types;

pub use build_map::{BuildOptions, MapBuilder};
pub use errors::{Error, Result};
pub use name_map::NameResolver;
pub use taxonomy::Taxonomy;
