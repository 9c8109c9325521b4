// crates/recall-store/src/namespace.rs
// Namespace codec: JSON-array encoding, prefix patterns, match conditions

use crate::error::{RecallError, Result};
use recall_types::{MatchCondition, MatchType, Namespace, WILDCARD};

/// Encode a namespace as compact JSON array text (`["users","admin"]`).
///
/// Segments are JSON string literals, so a closing quote inside the encoding
/// always ends a segment. That makes a string prefix of the encoding equivalent
/// to a segment prefix of the namespace.
pub fn encode(namespace: &Namespace) -> Result<String> {
    Ok(serde_json::to_string(namespace.segments())?)
}

/// Decode text produced by [`encode`].
pub fn decode(encoded: &str) -> Result<Namespace> {
    let segments: Vec<String> = serde_json::from_str(encoded).map_err(|e| {
        RecallError::Storage(format!("corrupt namespace encoding {encoded:?}: {e}"))
    })?;
    Ok(Namespace::from(segments))
}

/// Encoded form of a namespace prefix: the encoding minus its closing bracket.
///
/// `["a"` matches `["a"]` and `["a","b"]` but not `["ab"]`. The empty prefix
/// is `[` and matches every namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePrefix {
    encoded: String,
}

impl NamespacePrefix {
    pub fn new(prefix: &Namespace) -> Result<Self> {
        let mut encoded = encode(prefix)?;
        encoded.pop();
        Ok(Self { encoded })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// SQL `LIKE` pattern for this prefix, to be used with `ESCAPE '\'`.
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.encoded.len() + 8);
        for ch in self.encoded.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        pattern
    }

    /// Exact (case-sensitive) check against an encoded namespace.
    ///
    /// SQLite's `LIKE` folds ASCII case, so rows returned by a `LIKE` scan
    /// must be re-checked with this.
    pub fn matches_encoded(&self, encoded_namespace: &str) -> bool {
        encoded_namespace.starts_with(&self.encoded)
    }
}

/// Parse a match type by name.
pub fn parse_match_type(name: &str) -> Result<MatchType> {
    MatchType::from_name(name).ok_or_else(|| RecallError::UnsupportedMatchType(name.to_string()))
}

/// True if `namespace` satisfies `condition`.
///
/// Prefix conditions compare from the first segment, suffix conditions from
/// the last. `*` matches any single segment. A namespace shorter than the
/// condition path never matches.
pub fn matches_condition(condition: &MatchCondition, namespace: &Namespace) -> bool {
    let segments = namespace.segments();
    let path = &condition.path;
    if segments.len() < path.len() {
        return false;
    }

    let window = match condition.match_type {
        MatchType::Prefix => &segments[..path.len()],
        MatchType::Suffix => &segments[segments.len() - path.len()..],
    };

    path.iter()
        .zip(window)
        .all(|(pattern, segment)| pattern == WILDCARD || pattern == segment)
}

/// True if `namespace` satisfies every condition (conjunction).
pub fn matches_all(conditions: &[MatchCondition], namespace: &Namespace) -> bool {
    conditions
        .iter()
        .all(|condition| matches_condition(condition, namespace))
}
