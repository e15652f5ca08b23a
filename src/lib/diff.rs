//! Key-level differences between a source and a destination file.

use crate::parse::ParsedFile;

/// Keys assigned in `source` but not in `destination`, in source order.
pub fn missing_keys<'a>(source: &ParsedFile<'a>, destination: &ParsedFile<'_>) -> Vec<&'a str> {
  keys_only_in(source, destination)
}

/// Keys assigned in `destination` but not in `source`, in destination order.
pub fn unused_keys<'a>(source: &ParsedFile<'_>, destination: &ParsedFile<'a>) -> Vec<&'a str> {
  keys_only_in(destination, source)
}

fn keys_only_in<'a>(side: &ParsedFile<'a>, other: &ParsedFile<'_>) -> Vec<&'a str> {
  side
    .keys()
    .iter()
    .copied()
    .filter(|key| !other.contains_key(key))
    .collect()
}

/// Both directions of the key difference, computed together for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyDiff<'a> {
  pub missing: Vec<&'a str>,
  pub unused: Vec<&'a str>,
}

impl<'a> KeyDiff<'a> {
  pub fn new(source: &ParsedFile<'a>, destination: &ParsedFile<'a>) -> Self {
    Self {
      missing: missing_keys(source, destination),
      unused: unused_keys(source, destination),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.missing.is_empty() && self.unused.is_empty()
  }
}
