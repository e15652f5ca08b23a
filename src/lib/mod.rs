//! Environment file promotion library.
//!
//! Promotes a source `.env` template onto a destination file: the output takes
//! the source's structure (line order, comments, blank lines) while keeping the
//! destination's existing values. Keys missing from the destination and keys
//! only the destination knows about are handled by [`merge::MergeOptions`].
//!
//! # Modules
//!
//! - [`parse`]: lossless line tokenizer and file parser
//! - [`diff`]: missing and unused key computation
//! - [`merge`]: the merge engine producing the output bytes
//! - [`sync`]: file I/O around the pure core
//!
//! # Example
//!
//! ```rust
//! use env_promote::merge::{MergeOptions, merge};
//! use env_promote::parse::ParsedFile;
//!
//! let source = ParsedFile::try_from("A=1\n# c\nB=2").unwrap();
//! let destination = ParsedFile::try_from("A=9\nB=").unwrap();
//!
//! let merged = merge(&source, &destination, &MergeOptions::default());
//! assert_eq!(merged.to_string(), "A=9\n# c\nB=\n");
//! ```

pub mod diff;
pub mod merge;
pub mod parse;
pub mod sync;
