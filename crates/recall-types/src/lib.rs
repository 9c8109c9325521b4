// crates/recall-types/src/lib.rs
// Shared types for Recall (store data model + batch operations)
// Serialization only: no storage or network dependencies allowed here

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default page size for `SearchOp`
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Default page size for `ListNamespacesOp`
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Segment that matches any single namespace segment in a `MatchCondition`
pub const WILDCARD: &str = "*";

// ═══════════════════════════════════════
// NAMESPACES & ITEMS
// ═══════════════════════════════════════

/// Ordered sequence of path segments identifying a partition of the key space.
///
/// Ordering is lexicographic by segment, which is the canonical order used
/// when listing namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty namespace. Only meaningful as a search prefix (matches everything).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dot-separated namespace (`"users.admin"`). The empty string is the root.
    pub fn parse_dotted(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root();
        }
        Self::new(raw.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `prefix` is a sequence-prefix of this namespace.
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Copy of this namespace cut down to at most `depth` segments.
    pub fn truncated(&self, depth: usize) -> Namespace {
        Self(self.0.iter().take(depth).cloned().collect())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<Vec<String>> for Namespace {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for Namespace {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Namespace {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

/// A stored value addressed by `(namespace, key)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Search hit. `score` is the similarity on the semantic path and absent on the filter path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchItem {
    pub fn key(&self) -> &str {
        &self.item.key
    }

    pub fn namespace(&self) -> &Namespace {
        &self.item.namespace
    }

    pub fn value(&self) -> &Value {
        &self.item.value
    }
}

// ═══════════════════════════════════════
// NAMESPACE MATCHING
// ═══════════════════════════════════════

/// Which end of a namespace a `MatchCondition` is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Prefix,
    Suffix,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
        }
    }

    /// Parse from its wire name. Returns `None` for unknown match types.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "prefix" => Some(Self::Prefix),
            "suffix" => Some(Self::Suffix),
            _ => None,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace pattern used by `ListNamespacesOp`; `"*"` matches any one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    pub match_type: MatchType,
    pub path: Vec<String>,
}

impl MatchCondition {
    pub fn prefix<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            match_type: MatchType::Prefix,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn suffix<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            match_type: MatchType::Suffix,
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

// ═══════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════

/// Per-write indexing override.
///
/// On the wire: absent/`null`/`true` = `Default`, `false` = `Disabled`,
/// a list of field paths = `Fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<IndexRepr>", into = "Option<IndexRepr>")]
pub enum IndexMode {
    /// Use the store's configured field set
    #[default]
    Default,
    /// Do not embed this write
    Disabled,
    /// Embed these field paths instead of the configured ones
    Fields(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    Flag(bool),
    Fields(Vec<String>),
}

impl From<Option<IndexRepr>> for IndexMode {
    fn from(repr: Option<IndexRepr>) -> Self {
        match repr {
            None | Some(IndexRepr::Flag(true)) => Self::Default,
            Some(IndexRepr::Flag(false)) => Self::Disabled,
            Some(IndexRepr::Fields(fields)) => Self::Fields(fields),
        }
    }
}

impl From<IndexMode> for Option<IndexRepr> {
    fn from(mode: IndexMode) -> Self {
        match mode {
            IndexMode::Default => None,
            IndexMode::Disabled => Some(IndexRepr::Flag(false)),
            IndexMode::Fields(fields) => Some(IndexRepr::Fields(fields)),
        }
    }
}

/// What a put does to its `(namespace, key)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PutAction {
    Upsert {
        value: Value,
        #[serde(default)]
        index: IndexMode,
    },
    Delete,
}

/// Point lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOp {
    pub namespace: Namespace,
    pub key: String,
}

impl GetOp {
    pub fn new(namespace: impl Into<Namespace>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

/// Write or delete one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOp {
    pub namespace: Namespace,
    pub key: String,
    #[serde(flatten)]
    pub action: PutAction,
}

impl PutOp {
    pub fn upsert(namespace: impl Into<Namespace>, key: impl Into<String>, value: Value) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            action: PutAction::Upsert {
                value,
                index: IndexMode::Default,
            },
        }
    }

    pub fn delete(namespace: impl Into<Namespace>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            action: PutAction::Delete,
        }
    }

    /// Override indexing for an upsert. No effect on deletes.
    pub fn with_index(mut self, mode: IndexMode) -> Self {
        if let PutAction::Upsert { ref mut index, .. } = self.action {
            *index = mode;
        }
        self
    }
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// Filtered and/or semantic search under a namespace prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOp {
    pub namespace_prefix: Namespace,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl SearchOp {
    pub fn new(namespace_prefix: impl Into<Namespace>) -> Self {
        Self {
            namespace_prefix: namespace_prefix.into(),
            query: None,
            filter: None,
            limit: DEFAULT_SEARCH_LIMIT,
            offset: 0,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Enumerate stored namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListNamespacesOp {
    #[serde(default)]
    pub match_conditions: Vec<MatchCondition>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for ListNamespacesOp {
    fn default() -> Self {
        Self::new()
    }
}

impl ListNamespacesOp {
    pub fn new() -> Self {
        Self {
            match_conditions: Vec::new(),
            max_depth: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }

    pub fn condition(mut self, condition: MatchCondition) -> Self {
        self.match_conditions.push(condition);
        self
    }

    pub fn prefix<I, S>(self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition(MatchCondition::prefix(path))
    }

    pub fn suffix<I, S>(self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition(MatchCondition::suffix(path))
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Get(GetOp),
    Put(PutOp),
    Search(SearchOp),
    ListNamespaces(ListNamespacesOp),
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Get(_) => "get",
            Self::Put(_) => "put",
            Self::Search(_) => "search",
            Self::ListNamespaces(_) => "list_namespaces",
        }
    }
}

impl From<GetOp> for Operation {
    fn from(op: GetOp) -> Self {
        Self::Get(op)
    }
}

impl From<PutOp> for Operation {
    fn from(op: PutOp) -> Self {
        Self::Put(op)
    }
}

impl From<SearchOp> for Operation {
    fn from(op: SearchOp) -> Self {
        Self::Search(op)
    }
}

impl From<ListNamespacesOp> for Operation {
    fn from(op: ListNamespacesOp) -> Self {
        Self::ListNamespaces(op)
    }
}

/// Result of one operation, positionally aligned with the submitted batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "result", rename_all = "snake_case")]
pub enum OpResult {
    Get(Option<Item>),
    Put,
    Search(Vec<SearchItem>),
    ListNamespaces(Vec<Namespace>),
}

impl OpResult {
    pub fn into_item(self) -> Option<Item> {
        match self {
            Self::Get(item) => item,
            _ => None,
        }
    }

    pub fn into_search_items(self) -> Option<Vec<SearchItem>> {
        match self {
            Self::Search(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_namespaces(self) -> Option<Vec<Namespace>> {
        match self {
            Self::ListNamespaces(namespaces) => Some(namespaces),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespace_ordering_is_segmentwise() {
        let mut namespaces = vec![
            Namespace::from(["b"]),
            Namespace::from(["a", "z"]),
            Namespace::from(["a"]),
        ];
        namespaces.sort();
        assert_eq!(
            namespaces,
            vec![
                Namespace::from(["a"]),
                Namespace::from(["a", "z"]),
                Namespace::from(["b"]),
            ]
        );
    }

    #[test]
    fn test_namespace_prefix_and_truncate() {
        let ns = Namespace::from(["a", "b", "c"]);
        assert!(ns.starts_with(&Namespace::from(["a", "b"])));
        assert!(ns.starts_with(&Namespace::root()));
        assert!(!ns.starts_with(&Namespace::from(["a", "c"])));
        assert_eq!(ns.truncated(2), Namespace::from(["a", "b"]));
        assert_eq!(ns.truncated(10), ns);
    }

    #[test]
    fn test_namespace_dotted() {
        assert_eq!(
            Namespace::parse_dotted("users.admin"),
            Namespace::from(["users", "admin"])
        );
        assert!(Namespace::parse_dotted("").is_empty());
        assert_eq!(Namespace::from(["users", "admin"]).to_string(), "users.admin");
    }

    #[test]
    fn test_namespace_serializes_as_array() {
        let ns = Namespace::from(["users", "admin"]);
        assert_eq!(serde_json::to_value(&ns).unwrap(), json!(["users", "admin"]));
    }

    #[test]
    fn test_index_mode_wire_forms() {
        let put: PutOp = serde_json::from_value(json!({
            "namespace": ["docs"],
            "key": "d1",
            "action": "upsert",
            "value": {"text": "hi"},
            "index": false
        }))
        .unwrap();
        assert_eq!(
            put.action,
            PutAction::Upsert {
                value: json!({"text": "hi"}),
                index: IndexMode::Disabled
            }
        );

        let put: PutOp = serde_json::from_value(json!({
            "namespace": ["docs"],
            "key": "d1",
            "action": "upsert",
            "value": {"text": "hi"},
            "index": ["text"]
        }))
        .unwrap();
        assert!(matches!(
            put.action,
            PutAction::Upsert { index: IndexMode::Fields(ref f), .. } if f == &vec!["text".to_string()]
        ));

        let put: PutOp = serde_json::from_value(json!({
            "namespace": ["docs"],
            "key": "d1",
            "action": "upsert",
            "value": 1
        }))
        .unwrap();
        assert!(matches!(
            put.action,
            PutAction::Upsert {
                index: IndexMode::Default,
                ..
            }
        ));
    }

    #[test]
    fn test_operation_tagging() {
        let op: Operation = serde_json::from_value(json!({
            "op": "search",
            "namespace_prefix": ["docs"],
            "query": "hello"
        }))
        .unwrap();
        match op {
            Operation::Search(search) => {
                assert_eq!(search.query.as_deref(), Some("hello"));
                assert_eq!(search.limit, DEFAULT_SEARCH_LIMIT);
                assert_eq!(search.offset, 0);
            }
            other => panic!("expected search, got {}", other.kind()),
        }

        assert!(serde_json::from_value::<Operation>(json!({"op": "delete_all"})).is_err());
    }

    #[test]
    fn test_with_index_ignored_for_delete() {
        let op = PutOp::delete(["a"], "k").with_index(IndexMode::Disabled);
        assert_eq!(op.action, PutAction::Delete);
    }

    #[test]
    fn test_match_type_names() {
        assert_eq!(MatchType::from_name("prefix"), Some(MatchType::Prefix));
        assert_eq!(MatchType::from_name("suffix"), Some(MatchType::Suffix));
        assert_eq!(MatchType::from_name("infix"), None);
        assert_eq!(MatchType::Suffix.to_string(), "suffix");
    }

    #[test]
    fn test_op_result_accessors() {
        assert!(OpResult::Put.into_item().is_none());
        assert_eq!(
            OpResult::ListNamespaces(vec![Namespace::from(["a"])]).into_namespaces(),
            Some(vec![Namespace::from(["a"])])
        );
        assert!(OpResult::Get(None).into_search_items().is_none());
    }
}
