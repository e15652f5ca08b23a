use std::{
  collections::{HashMap, hash_map::Entry},
  convert::TryFrom,
  fmt,
};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

const COMMENT_PREFIX: char = '#';
const ASSIGNMENT_OPERATOR: char = '=';
const EXPORT_KEYWORD: &str = "export";
const MAX_LINE_LEN: usize = 1024 * 1024;

/// Prefix recorded on assignments written as `export KEY=VALUE`.
pub const EXPORT_PREFIX: &str = "export ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
  Assignment,
  /// Blank lines, comments and anything that is not a `KEY=VALUE` line.
  Other,
}

/// One physical line of an env file.
///
/// For [`LineKind::Other`] only `raw` and `line_number` are meaningful. For
/// assignments, `prefix`, `key`, `value` and `tail` rebuild the line through
/// [`Display`](fmt::Display).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
  pub kind: LineKind,
  pub raw: &'a str,
  pub prefix: &'static str,
  pub key: &'a str,
  pub value: &'a str,
  /// Whitespace and inline comment following the value, kept verbatim.
  pub tail: &'a str,
  pub line_number: usize,
}

impl<'a> Line<'a> {
  /// Tokenizes a single line (without its newline). Never fails: anything
  /// that is not a well-formed assignment becomes [`LineKind::Other`].
  pub fn parse(raw: &'a str, line_number: usize) -> Self {
    let other = Line {
      kind: LineKind::Other,
      raw,
      prefix: "",
      key: "",
      value: "",
      tail: "",
      line_number,
    };

    let rest = raw.trim_start_matches(is_space);
    if rest.is_empty() || rest.starts_with(COMMENT_PREFIX) {
      return other;
    }

    let (prefix, rest) = match strip_export(rest) {
      Some(rest) => (EXPORT_PREFIX, rest),
      None => ("", rest),
    };

    let Some((key, rhs)) = rest.split_once(ASSIGNMENT_OPERATOR) else {
      #[cfg(feature = "tracing")]
      trace!("Line {} has no assignment, passing through", line_number);
      return other;
    };

    let key = key.trim();
    if key.is_empty() {
      #[cfg(feature = "tracing")]
      trace!("Line {} has an empty key, passing through", line_number);
      return other;
    }

    let (value, tail) = split_value_and_tail(rhs);

    #[cfg(feature = "tracing")]
    trace!(
      "Parsed assignment on line {}: key={}, value={:?}, tail={:?}",
      line_number, key, value, tail
    );

    Line {
      kind: LineKind::Assignment,
      raw,
      prefix,
      key,
      value,
      tail,
      line_number,
    }
  }

  pub fn is_assignment(&self) -> bool {
    self.kind == LineKind::Assignment
  }
}

impl<'a> fmt::Display for Line<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      LineKind::Assignment => write!(
        f,
        "{}{}{}{}{}",
        self.prefix, self.key, ASSIGNMENT_OPERATOR, self.value, self.tail
      ),
      LineKind::Other => write!(f, "{}", self.raw),
    }
  }
}

fn is_space(c: char) -> bool {
  c == ' ' || c == '\t'
}

fn strip_export(s: &str) -> Option<&str> {
  let rest = s.strip_prefix(EXPORT_KEYWORD)?;
  if rest.starts_with(is_space) {
    Some(rest.trim_start_matches(is_space))
  } else {
    None
  }
}

/// Splits the right-hand side of an assignment into its value and tail.
///
/// A `#` starts the tail only outside quotes and only when it is the first
/// character or follows whitespace; the whitespace before it belongs to the
/// tail. Backslash escapes the next character inside double quotes only.
pub fn split_value_and_tail(rhs: &str) -> (&str, &str) {
  let bytes = rhs.as_bytes();
  let mut in_single = false;
  let mut in_double = false;
  let mut escaped = false;

  for (i, &ch) in bytes.iter().enumerate() {
    if escaped {
      escaped = false;
      continue;
    }

    match ch {
      b'\\' if in_double => escaped = true,
      b'\'' if !in_double => in_single = !in_single,
      b'"' if !in_single => in_double = !in_double,
      b'#' if !in_single && !in_double && (i == 0 || matches!(bytes[i - 1], b' ' | b'\t')) => {
        let start = rhs[..i].trim_end_matches(is_space).len();
        return (&rhs[..start], &rhs[start..]);
      }
      _ => {}
    }
  }

  (rhs.trim_end_matches(is_space), "")
}

/// A tokenized env file.
///
/// Keeps every line in order together with an index of each key's first
/// assignment. Later assignments of the same key stay in [`lines`](Self::lines)
/// but are never returned by [`get`](Self::get).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFile<'a> {
  lines: Vec<Line<'a>>,
  by_key: HashMap<&'a str, usize>,
  keys: Vec<&'a str>,
}

impl<'a> ParsedFile<'a> {
  /// Parses a byte buffer. Lines are split on `\n`, a trailing `\r` is
  /// dropped and a missing final newline is accepted.
  pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ParseError> {
    let mut file = ParsedFile::default();
    if bytes.is_empty() {
      return Ok(file);
    }

    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    for (index, chunk) in body.split(|&b| b == b'\n').enumerate() {
      let line_number = index + 1;
      let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);

      if chunk.len() >= MAX_LINE_LEN {
        return Err(ParseError::LineTooLong {
          line: line_number,
          len: chunk.len(),
        });
      }

      let raw = std::str::from_utf8(chunk).map_err(|_| ParseError::InvalidUtf8 { line: line_number })?;
      file.push(Line::parse(raw, line_number));
    }

    #[cfg(feature = "tracing")]
    debug!(
      "Parsed {} lines with {} distinct keys",
      file.lines.len(),
      file.keys.len()
    );

    Ok(file)
  }

  fn push(&mut self, line: Line<'a>) {
    if line.is_assignment() {
      match self.by_key.entry(line.key) {
        Entry::Vacant(slot) => {
          slot.insert(self.lines.len());
          self.keys.push(line.key);
        }
        Entry::Occupied(_) => {
          #[cfg(feature = "tracing")]
          trace!(
            "Duplicate key {} on line {}, keeping first occurrence",
            line.key, line.line_number
          );
        }
      }
    }
    self.lines.push(line);
  }

  pub fn lines(&self) -> &[Line<'a>] {
    &self.lines
  }

  /// Keys in order of first appearance, without duplicates.
  pub fn keys(&self) -> &[&'a str] {
    &self.keys
  }

  /// Returns the first assignment of `key`.
  pub fn get(&self, key: &str) -> Option<&Line<'a>> {
    self.by_key.get(key).map(|&index| &self.lines[index])
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.by_key.contains_key(key)
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }
}

impl<'a> TryFrom<&'a str> for ParsedFile<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    Self::from_bytes(s.as_bytes())
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("Invalid UTF-8 on line {line}")]
  InvalidUtf8 { line: usize },
  #[error("Line {line} is too long ({len} bytes)")]
  LineTooLong { line: usize, len: usize },
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assignment(raw: &str) -> Line<'_> {
    let line = Line::parse(raw, 1);
    assert_eq!(line.kind, LineKind::Assignment, "Expected assignment: {raw:?}");
    line
  }

  #[test]
  fn test_parse_simple_assignment() {
    let line = assignment("KEY=value");
    assert_eq!(line.prefix, "");
    assert_eq!(line.key, "KEY");
    assert_eq!(line.value, "value");
    assert_eq!(line.tail, "");
  }

  #[test]
  fn test_passthrough_lines() {
    for raw in ["", "   ", "\t", "# comment", "   # indented comment", "no equals here", "=value", "  = value"] {
      let line = Line::parse(raw, 7);
      assert_eq!(line.kind, LineKind::Other, "Expected passthrough: {raw:?}");
      assert_eq!(line.raw, raw);
      assert_eq!(line.key, "");
      assert_eq!(line.value, "");
      assert_eq!(line.tail, "");
      assert_eq!(line.line_number, 7);
    }
  }

  #[test]
  fn test_export_prefix() {
    let line = assignment("export KEY=value");
    assert_eq!(line.prefix, EXPORT_PREFIX);
    assert_eq!(line.key, "KEY");

    let line = assignment("  export\t  KEY = value");
    assert_eq!(line.prefix, EXPORT_PREFIX);
    assert_eq!(line.key, "KEY");
    assert_eq!(line.value, " value");
    assert_eq!(line.to_string(), "export KEY= value");

    // Not followed by whitespace, so part of the key
    let line = assignment("exportKEY=1");
    assert_eq!(line.prefix, "");
    assert_eq!(line.key, "exportKEY");

    let line = assignment("export=1");
    assert_eq!(line.prefix, "");
    assert_eq!(line.key, "export");

    assert_eq!(Line::parse("export KEY", 1).kind, LineKind::Other);
  }

  #[test]
  fn test_key_is_trimmed() {
    let line = assignment("  KEY  =value");
    assert_eq!(line.key, "KEY");
    assert_eq!(line.value, "value");
  }

  #[test]
  fn test_value_split_on_first_equals() {
    let line = assignment("URL=postgres://u:p@h/db?sslmode=require");
    assert_eq!(line.key, "URL");
    assert_eq!(line.value, "postgres://u:p@h/db?sslmode=require");
  }

  #[test]
  fn test_inline_comment_goes_to_tail() {
    let line = assignment("KEY=value  # a comment");
    assert_eq!(line.value, "value");
    assert_eq!(line.tail, "  # a comment");
    assert_eq!(line.to_string(), "KEY=value  # a comment");

    let line = assignment("KEY=value\t# tabbed");
    assert_eq!(line.value, "value");
    assert_eq!(line.tail, "\t# tabbed");
  }

  #[test]
  fn test_comment_at_start_of_value() {
    let line = assignment("KEY=# nothing set");
    assert_eq!(line.value, "");
    assert_eq!(line.tail, "# nothing set");
  }

  #[test]
  fn test_glued_hash_is_value() {
    let line = assignment("COLOR=a#ff0000");
    assert_eq!(line.value, "a#ff0000");
    assert_eq!(line.tail, "");

    // A leading hash has nothing before it, so it still opens a comment
    let line = assignment("COLOR=#ff0000");
    assert_eq!(line.value, "");
    assert_eq!(line.tail, "#ff0000");

    let line = assignment("PASS=abc#def # real comment");
    assert_eq!(line.value, "abc#def");
    assert_eq!(line.tail, " # real comment");
  }

  #[test]
  fn test_hash_inside_quotes_is_value() {
    let line = assignment(r#"KEY="a # b" # c"#);
    assert_eq!(line.value, r#""a # b""#);
    assert_eq!(line.tail, " # c");

    let line = assignment("KEY='a # b' # c");
    assert_eq!(line.value, "'a # b'");
    assert_eq!(line.tail, " # c");

    let line = assignment(r#"KEY='say "hi" # there'"#);
    assert_eq!(line.value, r#"'say "hi" # there'"#);
    assert_eq!(line.tail, "");
  }

  #[test]
  fn test_escaped_quote_in_double_quotes() {
    let line = assignment(r#"KEY="a\" # still value" # c"#);
    assert_eq!(line.value, r#""a\" # still value""#);
    assert_eq!(line.tail, " # c");
  }

  #[test]
  fn test_backslash_is_literal_in_single_quotes() {
    // The backslash does not escape, so the quote after it closes the string
    let line = assignment(r"KEY='a\' # c");
    assert_eq!(line.value, r"'a\'");
    assert_eq!(line.tail, " # c");
  }

  #[test]
  fn test_trailing_whitespace_trimmed_from_value() {
    let line = assignment("KEY=value   \t");
    assert_eq!(line.value, "value");
    assert_eq!(line.tail, "");

    let line = assignment("KEY=   ");
    assert_eq!(line.value, "");
  }

  #[test]
  fn test_parsed_file_indexes_first_occurrence() {
    let file = ParsedFile::try_from("# header\nA=1\nB=2\nA=3\n\nC=").unwrap();

    assert_eq!(file.lines().len(), 6);
    assert_eq!(file.keys(), &["A", "B", "C"]);
    assert_eq!(file.get("A").unwrap().value, "1");
    assert_eq!(file.get("A").unwrap().line_number, 2);
    assert_eq!(file.lines()[3].value, "3");
    assert!(file.contains_key("C"));
    assert!(!file.contains_key("a"));
    assert!(file.get("D").is_none());
  }

  #[test]
  fn test_parsed_file_line_splitting() {
    assert!(ParsedFile::try_from("").unwrap().is_empty());

    let file = ParsedFile::try_from("\n").unwrap();
    assert_eq!(file.lines().len(), 1);
    assert_eq!(file.lines()[0].raw, "");

    let with_newline = ParsedFile::try_from("A=1\nB=2\n").unwrap();
    let without_newline = ParsedFile::try_from("A=1\nB=2").unwrap();
    assert_eq!(with_newline, without_newline);

    let file = ParsedFile::try_from("A=1\n\n").unwrap();
    assert_eq!(file.lines().len(), 2);
    assert_eq!(file.lines()[1].line_number, 2);
  }

  #[test]
  fn test_parsed_file_strips_carriage_returns() {
    let file = ParsedFile::try_from("A=1 # c\r\n# note\r\nB=2\r").unwrap();
    assert_eq!(file.get("A").unwrap().tail, " # c");
    assert_eq!(file.lines()[1].raw, "# note");
    assert_eq!(file.get("B").unwrap().value, "2");
  }

  #[test]
  fn test_invalid_utf8_reports_line() {
    let bytes: &[u8] = b"A=1\nB=\xff\xfe\n";
    match ParsedFile::from_bytes(bytes) {
      Err(ParseError::InvalidUtf8 { line }) => assert_eq!(line, 2),
      other => panic!("Expected InvalidUtf8, got {other:?}"),
    }
  }

  #[test]
  fn test_line_too_long() {
    let long = format!("A=1\nB={}", "x".repeat(MAX_LINE_LEN));
    match ParsedFile::try_from(long.as_str()) {
      Err(ParseError::LineTooLong { line, len }) => {
        assert_eq!(line, 2);
        assert_eq!(len, MAX_LINE_LEN + 2);
      }
      other => panic!("Expected LineTooLong, got {other:?}"),
    }
  }

  #[test]
  fn test_line_length_limit_boundary() {
    let at_limit = format!("B={}", "x".repeat(MAX_LINE_LEN - 2));
    match ParsedFile::try_from(at_limit.as_str()) {
      Err(ParseError::LineTooLong { line, len }) => {
        assert_eq!(line, 1);
        assert_eq!(len, MAX_LINE_LEN);
      }
      other => panic!("Expected LineTooLong, got {other:?}"),
    }

    let under_limit = format!("B={}\n", "x".repeat(MAX_LINE_LEN - 3));
    let file = ParsedFile::try_from(under_limit.as_str()).unwrap();
    assert_eq!(file.get("B").unwrap().value.len(), MAX_LINE_LEN - 3);
  }
}
