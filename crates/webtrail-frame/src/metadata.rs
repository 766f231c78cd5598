use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Ordered, case-insensitive mapping from header names to string values.
///
/// One logical instance exists per call per direction: leading metadata
/// (delivered before any message) and trailing metadata (delivered with
/// the trailer frame). Keys compare case-insensitively; the casing of the
/// first insertion is retained for display only. Value order within a key
/// is preserved; repeated headers are meaningful.
///
/// An empty channel is a valid state, distinguishable from "not yet
/// received" (callers hold `Option<Metadata>` for the latter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    values: Vec<String>,
}

impl Metadata {
    /// Create an empty metadata channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// All values for a key, in insertion order. Empty slice if absent.
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    /// First value for a key, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Replace all values for a key. An empty value list removes the key.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        let existing = self
            .entries
            .iter()
            .position(|e| e.key.eq_ignore_ascii_case(&key));
        match (existing, values.is_empty()) {
            (Some(idx), true) => {
                self.entries.remove(idx);
            }
            (Some(idx), false) => self.entries[idx].values = values,
            (None, true) => {}
            (None, false) => self.entries.push(Entry { key, values }),
        }
    }

    /// Append a single value after any existing values for the key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|e| e.key.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.values.push(value),
            None => self.entries.push(Entry {
                key,
                values: vec![value],
            }),
        }
    }

    /// Whether the key is present with at least one value.
    pub fn contains_key(&self, key: &str) -> bool {
        !self.get(key).is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the channel has zero keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine another channel into this one. For keys present in both,
    /// `other`'s values are appended after the existing ones.
    pub fn merge(&mut self, other: Metadata) {
        for entry in other.entries {
            for value in entry.values {
                self.append(entry.key.clone(), value);
            }
        }
    }

    /// Iterate `(key, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), e.values.as_slice()))
    }

    /// Serialize as `key: value\r\n` lines, one line per value.
    ///
    /// This is the trailer frame payload format; it is also used for the
    /// leading-metadata preamble one layer up.
    pub fn to_wire(&self) -> Bytes {
        let mut out = String::new();
        for entry in &self.entries {
            for value in &entry.values {
                out.push_str(&entry.key);
                out.push_str(": ");
                out.push_str(value);
                out.push_str("\r\n");
            }
        }
        Bytes::from(out)
    }

    /// Parse serialized metadata lines.
    ///
    /// Accepts any key casing and a missing CRLF on the final line.
    /// A non-empty line without a `:` separator is malformed.
    pub fn from_wire(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|err| FrameError::MalformedTrailer(format!("not UTF-8: {err}")))?;

        let mut metadata = Metadata::new();
        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                FrameError::MalformedTrailer(format!("line without separator: {line:?}"))
            })?;
            if key.is_empty() {
                return Err(FrameError::MalformedTrailer(format!(
                    "empty key in line: {line:?}"
                )));
            }
            metadata.append(key, value.strip_prefix(' ').unwrap_or(value));
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_absent_key_is_empty() {
        let md = Metadata::new();
        assert!(md.get("missing").is_empty());
        assert_eq!(md.first("missing"), None);
        assert_eq!(md.len(), 0);
        assert!(md.is_empty());
    }

    #[test]
    fn set_replaces_all_values() {
        let mut md = Metadata::new();
        md.set("key", vec!["a".into(), "b".into()]);
        md.set("key", vec!["c".into()]);
        assert_eq!(md.get("key"), ["c"]);
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn set_empty_removes_key() {
        let mut md = Metadata::new();
        md.set("key", vec!["a".into()]);
        md.set("key", vec![]);
        assert!(md.is_empty());
    }

    #[test]
    fn append_preserves_value_order() {
        let mut md = Metadata::new();
        md.append("k", "1");
        md.append("k", "2");
        md.append("k", "3");
        assert_eq!(md.get("k"), ["1", "2", "3"]);
    }

    #[test]
    fn keys_compare_case_insensitively() {
        let mut md = Metadata::new();
        md.append("Content-Type", "application/webtrail");
        assert_eq!(md.first("content-type"), Some("application/webtrail"));
        assert_eq!(md.first("CONTENT-TYPE"), Some("application/webtrail"));

        md.append("content-type", "second");
        assert_eq!(md.len(), 1, "one distinct key regardless of casing");
        assert_eq!(md.get("Content-Type").len(), 2);
    }

    #[test]
    fn first_insertion_casing_is_retained() {
        let mut md = Metadata::new();
        md.append("X-Mixed-Case", "v");
        md.append("x-mixed-case", "w");
        let keys: Vec<&str> = md.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["X-Mixed-Case"]);
    }

    #[test]
    fn merge_appends_after_existing() {
        let mut left = Metadata::new();
        left.append("shared", "1");
        left.append("only-left", "l");

        let mut right = Metadata::new();
        right.append("SHARED", "2");
        right.append("only-right", "r");

        left.merge(right);
        assert_eq!(left.get("shared"), ["1", "2"]);
        assert_eq!(left.get("only-left"), ["l"]);
        assert_eq!(left.get("only-right"), ["r"]);
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn wire_roundtrip_preserves_keys_and_order() {
        let mut md = Metadata::new();
        md.set("a", vec!["1".into(), "2".into()]);
        md.set("b", vec!["3".into()]);

        let wire = md.to_wire();
        assert_eq!(wire.as_ref(), b"a: 1\r\na: 2\r\nb: 3\r\n");

        let decoded = Metadata::from_wire(&wire).unwrap();
        assert_eq!(decoded.get("A"), ["1", "2"]);
        assert_eq!(decoded.get("B"), ["3"]);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn from_wire_tolerates_missing_final_crlf() {
        let md = Metadata::from_wire(b"a: 1\r\nb: 2").unwrap();
        assert_eq!(md.get("a"), ["1"]);
        assert_eq!(md.get("b"), ["2"]);
    }

    #[test]
    fn from_wire_preserves_value_without_space() {
        let md = Metadata::from_wire(b"a:1\r\n").unwrap();
        assert_eq!(md.get("a"), ["1"]);
    }

    #[test]
    fn from_wire_rejects_separatorless_line() {
        let err = Metadata::from_wire(b"no-separator\r\n").unwrap_err();
        assert!(matches!(err, FrameError::MalformedTrailer(_)));
    }

    #[test]
    fn from_wire_rejects_empty_key() {
        let err = Metadata::from_wire(b": value\r\n").unwrap_err();
        assert!(matches!(err, FrameError::MalformedTrailer(_)));
    }

    #[test]
    fn from_wire_rejects_invalid_utf8() {
        let err = Metadata::from_wire(&[0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, FrameError::MalformedTrailer(_)));
    }

    #[test]
    fn empty_channel_serializes_to_nothing() {
        let md = Metadata::new();
        assert!(md.to_wire().is_empty());
        assert_eq!(Metadata::from_wire(b"").unwrap(), md);
    }
}
