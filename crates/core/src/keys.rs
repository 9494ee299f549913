//! Blob store key scheme for upload sessions.
//!
//! Every (session id, filename) pair owns a disjoint keyspace:
//!
//! ```text
//! chunks/<enc(session_id)>/<enc(filename)>/part-<index>
//! merged/<enc(session_id)>/<enc(filename)>
//! ```
//!
//! Components are percent-encoded with every byte escaped except ASCII
//! alphanumerics and `-`, so an encoded component never contains `/`, `.`
//! or `_` and can never be mistaken for a separator or for another
//! component's prefix.

use crate::error::{Error, Result};
use crate::{MAX_COMPONENT_LEN, MAX_KEY_LEN};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;

/// Escape set for key components: everything but `[A-Za-z0-9-]`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-');

/// Namespace holding in-flight chunks.
pub const CHUNK_NAMESPACE: &str = "chunks";

/// Namespace holding merged artifacts.
pub const MERGED_NAMESPACE: &str = "merged";

const PART_TAG: &str = "part-";

/// Length of the longest key the scheme can produce: a chunk key with two
/// maximal components and a `u64::MAX` index.
pub const MAX_SCHEME_KEY_LEN: usize =
    CHUNK_NAMESPACE.len() + 1 + MAX_COMPONENT_LEN + 1 + MAX_COMPONENT_LEN + 1 + PART_TAG.len() + 20;

const _: () = assert!(MAX_SCHEME_KEY_LEN <= MAX_KEY_LEN);

/// Percent-encode a single key component.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_control) {
        return Err(Error::invalid(field, "must not contain control characters"));
    }
    let encoded = encode_component(value).len();
    if encoded > MAX_COMPONENT_LEN {
        return Err(Error::invalid(
            field,
            format!("encoded length {encoded} exceeds maximum of {MAX_COMPONENT_LEN} bytes"),
        ));
    }
    Ok(())
}

/// Identity of one upload: a caller-chosen session id plus the original filename.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionRef {
    session_id: String,
    filename: String,
}

impl SessionRef {
    /// Validate and build a session reference.
    pub fn new(session_id: impl Into<String>, filename: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        let filename = filename.into();
        validate_component("sessionID", &session_id)?;
        validate_component("filename", &filename)?;
        Ok(Self {
            session_id,
            filename,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn encoded_pair(&self) -> String {
        format!(
            "{}/{}",
            encode_component(&self.session_id),
            encode_component(&self.filename)
        )
    }

    /// Prefix shared by every chunk key of this session, with trailing `/`.
    pub fn chunk_prefix(&self) -> String {
        format!("{CHUNK_NAMESPACE}/{}/", self.encoded_pair())
    }

    /// Key of one chunk.
    pub fn chunk_key(&self, index: ChunkIndex) -> String {
        format!("{}{PART_TAG}{}", self.chunk_prefix(), index.0)
    }

    /// Key of the merged artifact. Never shares a prefix with chunk keys.
    pub fn merged_key(&self) -> String {
        format!("{MERGED_NAMESPACE}/{}", self.encoded_pair())
    }

    /// Recover the chunk index from a key listed under [`Self::chunk_prefix`].
    ///
    /// Only the exact form emitted by [`Self::chunk_key`] is accepted.
    pub fn parse_chunk_key(&self, key: &str) -> Result<ChunkIndex> {
        let malformed = |reason: &str| Error::MalformedKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let prefix = self.chunk_prefix();
        let rest = key
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| malformed("not under the session prefix"))?;
        let digits = rest
            .strip_prefix(PART_TAG)
            .ok_or_else(|| malformed("missing part- tag"))?;
        ChunkIndex::from_canonical(digits)
            .ok_or_else(|| malformed("index is not a canonical decimal integer"))
    }
}

impl fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionRef({:?}, {:?})", self.session_id, self.filename)
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.filename)
    }
}

/// Zero-based position of a chunk within its session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkIndex(u64);

impl ChunkIndex {
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parse a client-supplied index. Surrounding whitespace is ignored and
    /// leading zeros are tolerated; signs, fractions and overflow are not.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid(field, "must not be empty"));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid(
                field,
                format!("{trimmed:?} is not a non-negative integer"),
            ));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| Error::invalid(field, format!("{trimmed} is out of range")))
    }

    fn from_canonical(digits: &str) -> Option<Self> {
        let canonical = !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && (digits == "0" || !digits.starts_with('0'));
        if !canonical {
            return None;
        }
        digits.parse::<u64>().ok().map(Self)
    }
}

impl From<u64> for ChunkIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkIndex({})", self.0)
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chunk of one session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    session: SessionRef,
    index: ChunkIndex,
}

impl ChunkRef {
    pub fn new(session: SessionRef, index: ChunkIndex) -> Self {
        Self { session, index }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    pub fn key(&self) -> String {
        self.session.chunk_key(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percent_encoding::percent_decode_str;

    fn session(id: &str, name: &str) -> SessionRef {
        SessionRef::new(id, name).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let s = session("abc-123", "video.mp4");
        assert_eq!(s.chunk_prefix(), "chunks/abc-123/video%2Emp4/");
        assert_eq!(s.chunk_key(ChunkIndex::new(7)), "chunks/abc-123/video%2Emp4/part-7");
        assert_eq!(s.merged_key(), "merged/abc-123/video%2Emp4");
    }

    #[test]
    fn test_separator_laden_inputs_have_disjoint_prefixes() {
        let sessions = [
            session("a/b", "c"),
            session("a", "b/c"),
            session("a", "b_part_1"),
            session("a_part_1", "b"),
            session("..", "x"),
            session(".", ".x"),
            session("%2F", "x"),
            session("/", "x"),
            session("a", "b"),
            session("a%2Fb", "c"),
        ];

        for (i, left) in sessions.iter().enumerate() {
            for (j, right) in sessions.iter().enumerate() {
                if i == j {
                    continue;
                }
                assert!(
                    !left.chunk_prefix().starts_with(&right.chunk_prefix()),
                    "{left:?} prefix overlaps {right:?}"
                );
                assert_ne!(left.merged_key(), right.merged_key());
            }
        }
    }

    #[test]
    fn test_encoded_components_decode_to_original() {
        let inputs = ["a/b", "..", "%2F", "über größe.bin", "tab-free name", "x_part_0", "-"];
        for input in inputs {
            let encoded = encode_component(input);
            assert!(
                encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'%'),
                "unexpected byte in {encoded}"
            );
            let decoded = percent_decode_str(&encoded).decode_utf8().unwrap();
            assert_eq!(decoded, input);
        }
    }

    #[test]
    fn test_parse_chunk_key_roundtrip() {
        let s = session("sess", "file.bin");
        for index in [0u64, 1, 9, 10, 11, 12345, u64::MAX] {
            let key = s.chunk_key(ChunkIndex::new(index));
            assert_eq!(s.parse_chunk_key(&key).unwrap(), ChunkIndex::new(index));
        }
    }

    #[test]
    fn test_parse_chunk_key_rejects_non_canonical() {
        let s = session("sess", "file.bin");
        let prefix = s.chunk_prefix();
        for suffix in ["part-07", "part-+7", "part--1", "part-", "part-1.5", "part-x", "7", "part-7/x"] {
            let key = format!("{prefix}{suffix}");
            assert!(
                matches!(s.parse_chunk_key(&key), Err(Error::MalformedKey { .. })),
                "{key} should not parse"
            );
        }
    }

    #[test]
    fn test_parse_chunk_key_rejects_foreign_prefix() {
        let s = session("sess", "file.bin");
        let other = session("sess", "other.bin");
        let key = other.chunk_key(ChunkIndex::new(0));
        assert!(matches!(s.parse_chunk_key(&key), Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn test_session_ref_validation() {
        assert!(matches!(
            SessionRef::new("", "f"),
            Err(Error::InvalidField { field: "sessionID", .. })
        ));
        assert!(matches!(
            SessionRef::new("s", ""),
            Err(Error::InvalidField { field: "filename", .. })
        ));
        assert!(SessionRef::new("s\n", "f").is_err());
        assert!(SessionRef::new("s", "f\u{0}").is_err());
        assert!(SessionRef::new("s".repeat(MAX_COMPONENT_LEN + 1), "f").is_err());
        assert!(SessionRef::new("s".repeat(MAX_COMPONENT_LEN), "f").is_ok());
    }

    #[test]
    fn test_component_limit_applies_to_encoded_form() {
        // Each CJK character is 3 UTF-8 bytes and encodes to 9 key bytes.
        assert!(SessionRef::new("s", "文".repeat(28)).is_ok());
        assert!(matches!(
            SessionRef::new("s", "文".repeat(29)),
            Err(Error::InvalidField { field: "filename", .. })
        ));

        // Escaped ASCII costs 3 key bytes per input byte.
        assert!(SessionRef::new(".".repeat(85), "f").is_ok());
        assert!(matches!(
            SessionRef::new(".".repeat(86), "f"),
            Err(Error::InvalidField { field: "sessionID", .. })
        ));
    }

    #[test]
    fn test_longest_keys_fit_key_limit() {
        let s = session(&"a".repeat(MAX_COMPONENT_LEN), &"b".repeat(MAX_COMPONENT_LEN));
        let key = s.chunk_key(ChunkIndex::new(u64::MAX));
        assert_eq!(key.len(), MAX_SCHEME_KEY_LEN);
        assert!(s.merged_key().len() < key.len());
        assert!(key.len() <= MAX_KEY_LEN);
    }

    #[test]
    fn test_chunk_index_parse() {
        assert_eq!(ChunkIndex::parse("chunkIndex", "3").unwrap(), ChunkIndex::new(3));
        assert_eq!(ChunkIndex::parse("chunkIndex", " 12 ").unwrap(), ChunkIndex::new(12));
        assert_eq!(ChunkIndex::parse("chunkIndex", "007").unwrap(), ChunkIndex::new(7));
        for bad in ["", "-1", "+1", "1.0", "abc", "99999999999999999999999"] {
            match ChunkIndex::parse("chunkIndex", bad) {
                Err(Error::InvalidField { field, .. }) => assert_eq!(field, "chunkIndex"),
                other => panic!("{bad:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_chunk_index_orders_numerically() {
        let mut indices: Vec<ChunkIndex> = [10u64, 2, 1, 11, 0].into_iter().map(ChunkIndex::new).collect();
        indices.sort();
        let values: Vec<u64> = indices.into_iter().map(ChunkIndex::get).collect();
        assert_eq!(values, vec![0, 1, 2, 10, 11]);
    }
}
