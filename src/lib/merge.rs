//! Merge engine.
//!
//! Walks the source file line by line and rebuilds it with the destination's
//! values:
//!
//! 1. Comments, blank lines and other non-assignments are copied from the source
//! 2. For each source assignment:
//!    - If the destination has the key, its value is kept (an empty value is
//!      replaced by the source's when `fill_empty` is set)
//!    - Otherwise the value is left blank, or taken from the source when
//!      `use_source_defaults` is set
//!    - The source's inline comment wins; the destination's is used when the
//!      source has none
//! 3. With `keep_unused`, destination-only lines are appended verbatim after a
//!    blank separator line
//!
//! # Examples
//!
//! ```rust
//! use env_promote::merge::{MergeOptions, merge};
//! use env_promote::parse::ParsedFile;
//!
//! let source = ParsedFile::try_from("A=1\nB=2").unwrap();
//! let destination = ParsedFile::try_from("A=9  # tuned\nD=4").unwrap();
//!
//! let options = MergeOptions {
//!     keep_unused: true,
//!     ..MergeOptions::default()
//! };
//!
//! let merged = merge(&source, &destination, &options);
//! assert_eq!(merged.to_string(), "A=9  # tuned\nB=\n\nD=4\n");
//! ```

use std::{borrow::Cow, fmt};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::diff;
use crate::parse::{Line, LineKind, ParsedFile};

/// Policy flags for [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
  /// Append keys only the destination has after the merged body.
  pub keep_unused: bool,
  /// Keys missing from the destination take the source's value instead of blank.
  pub use_source_defaults: bool,
  /// Destination keys with an empty value take the source's value.
  pub fill_empty: bool,
  /// Precomputed unused keys. Computed from the two files when `None`.
  pub unused_keys: Option<Vec<String>>,
}

/// Output of [`merge`]: the emitted lines, each written with a trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedFile<'a> {
  lines: Vec<Cow<'a, str>>,
}

impl<'a> MergedFile<'a> {
  pub fn lines(&self) -> &[Cow<'a, str>] {
    &self.lines
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.to_string().into_bytes()
  }

  fn ends_with_blank(&self) -> bool {
    self.lines.last().is_some_and(|line| line.trim().is_empty())
  }
}

impl<'a> fmt::Display for MergedFile<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for line in &self.lines {
      writeln!(f, "{}", line)?;
    }
    Ok(())
  }
}

/// Rebuilds `source` with the values of `destination`.
///
/// Pure and deterministic: the same inputs always give the same output.
pub fn merge<'a>(
  source: &ParsedFile<'a>,
  destination: &ParsedFile<'a>,
  options: &MergeOptions,
) -> MergedFile<'a> {
  #[cfg(feature = "tracing")]
  debug!(
    "Merging {} source lines against {} destination lines",
    source.lines().len(),
    destination.lines().len()
  );

  let mut merged = MergedFile::default();

  for line in source.lines() {
    let emitted = match line.kind {
      LineKind::Other => Cow::Borrowed(line.raw),
      LineKind::Assignment => Cow::Owned(merge_assignment(line, destination, options).to_string()),
    };
    merged.lines.push(emitted);
  }

  if options.keep_unused {
    append_unused(&mut merged, source, destination, options);
  }

  merged
}

fn merge_assignment<'a>(
  line: &Line<'a>,
  destination: &ParsedFile<'a>,
  options: &MergeOptions,
) -> Line<'a> {
  let Some(existing) = destination.get(line.key) else {
    #[cfg(feature = "tracing")]
    trace!(
      "{} missing from destination, using {}",
      line.key,
      if options.use_source_defaults { "source default" } else { "blank" }
    );

    let value = if options.use_source_defaults { line.value } else { "" };
    return Line { value, ..*line };
  };

  let value = if existing.value.is_empty() && options.fill_empty {
    #[cfg(feature = "tracing")]
    trace!("Filling empty {} from source", line.key);
    line.value
  } else {
    existing.value
  };

  let tail = if line.tail.is_empty() { existing.tail } else { line.tail };

  Line { value, tail, ..*line }
}

fn append_unused<'a>(
  merged: &mut MergedFile<'a>,
  source: &ParsedFile<'a>,
  destination: &ParsedFile<'a>,
  options: &MergeOptions,
) {
  let unused: Vec<&Line<'a>> = match &options.unused_keys {
    Some(keys) => keys.iter().filter_map(|key| destination.get(key)).collect(),
    None => diff::unused_keys(source, destination)
      .into_iter()
      .filter_map(|key| destination.get(key))
      .collect(),
  };

  if unused.is_empty() {
    return;
  }

  #[cfg(feature = "tracing")]
  debug!("Keeping {} unused destination keys", unused.len());

  if !merged.lines.is_empty() && !merged.ends_with_blank() {
    merged.lines.push(Cow::Borrowed(""));
  }

  merged
    .lines
    .extend(unused.into_iter().map(|line| Cow::Borrowed(line.raw)));
}
