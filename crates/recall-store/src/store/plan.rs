// crates/recall-store/src/store/plan.rs
// Batch planning: validation, put de-duplication and deferred embedding work

use crate::error::{RecallError, Result};
use crate::fields::{self, FieldPath};
use crate::filter::Filter;
use crate::namespace;
use recall_types::{
    GetOp, IndexMode, ListNamespacesOp, Namespace, Operation, PutAction, PutOp, SearchOp,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One operation after validation, in submission order
#[derive(Debug)]
pub(crate) enum PlannedOp {
    Get(GetOp),
    /// Placeholder; the write itself lives in [`BatchPlan::writes`]
    Put,
    Search(PlannedSearch),
    ListNamespaces(ListNamespacesOp),
}

#[derive(Debug)]
pub(crate) struct PlannedSearch {
    pub prefix: Namespace,
    pub query: Option<String>,
    pub filter: Option<Filter>,
    pub limit: usize,
    pub offset: usize,
}

/// Final state of one `(namespace, key)` after de-duplication
#[derive(Debug)]
pub(crate) struct PlannedWrite {
    pub namespace: Namespace,
    /// Encoded namespace, as stored in `store_vectors`
    pub encoded: String,
    pub key: String,
    pub action: WriteAction,
}

#[derive(Debug)]
pub(crate) enum WriteAction {
    /// `entries` are `(entry_path, text)` pairs to embed. Empty means the item
    /// ends up with no vector entries.
    Upsert {
        value: Value,
        entries: Vec<(String, String)>,
    },
    Delete,
}

/// Validated batch: operations in order, writes de-duplicated, texts to embed.
#[derive(Debug, Default)]
pub(crate) struct BatchPlan {
    pub ops: Vec<PlannedOp>,
    pub writes: Vec<PlannedWrite>,
}

impl BatchPlan {
    /// Validate every operation before any I/O.
    ///
    /// `default_fields` is `None` when the store has no index configuration;
    /// writes then carry no entries.
    pub fn build(operations: Vec<Operation>, default_fields: Option<&[FieldPath]>) -> Result<Self> {
        let mut plan = BatchPlan::default();
        // (encoded namespace, key) -> slot in `writes`
        let mut write_slots: HashMap<(String, String), usize> = HashMap::new();

        for op in operations {
            let planned = match op {
                Operation::Get(get) => {
                    validate_namespace(&get.namespace)?;
                    PlannedOp::Get(get)
                }
                Operation::Put(put) => {
                    let write = plan_write(put, default_fields)?;
                    let slot_key = (write.encoded.clone(), write.key.clone());
                    match write_slots.get(&slot_key) {
                        Some(&slot) => plan.writes[slot] = write,
                        None => {
                            write_slots.insert(slot_key, plan.writes.len());
                            plan.writes.push(write);
                        }
                    }
                    PlannedOp::Put
                }
                Operation::Search(search) => PlannedOp::Search(plan_search(search)?),
                Operation::ListNamespaces(list) => {
                    if list.max_depth == Some(0) {
                        return Err(RecallError::InvalidInput(
                            "max_depth must be at least 1".into(),
                        ));
                    }
                    PlannedOp::ListNamespaces(list)
                }
            };
            plan.ops.push(planned);
        }

        Ok(plan)
    }

    /// Distinct search queries, in first-seen order
    pub fn queries(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ops
            .iter()
            .filter_map(|op| match op {
                PlannedOp::Search(search) => search.query.clone(),
                _ => None,
            })
            .filter(|q| seen.insert(q.clone()))
            .collect()
    }

    /// Distinct document texts across all surviving writes
    pub fn document_texts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.writes
            .iter()
            .filter_map(|w| match &w.action {
                WriteAction::Upsert { entries, .. } => Some(entries),
                WriteAction::Delete => None,
            })
            .flatten()
            .map(|(_, text)| text.clone())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

fn validate_namespace(ns: &Namespace) -> Result<()> {
    if ns.is_empty() {
        return Err(RecallError::InvalidInput("namespace cannot be empty".into()));
    }
    Ok(())
}

/// Namespaces that get written must be addressable by dotted paths.
fn validate_write_namespace(ns: &Namespace) -> Result<()> {
    validate_namespace(ns)?;
    for segment in ns.segments() {
        if segment.is_empty() {
            return Err(RecallError::InvalidInput(format!(
                "namespace {ns:?} contains an empty segment"
            )));
        }
        if segment.contains('.') {
            return Err(RecallError::InvalidInput(format!(
                "namespace segment {segment:?} cannot contain '.'"
            )));
        }
    }
    Ok(())
}

fn plan_write(put: PutOp, default_fields: Option<&[FieldPath]>) -> Result<PlannedWrite> {
    validate_write_namespace(&put.namespace)?;
    let encoded = namespace::encode(&put.namespace)?;

    let action = match put.action {
        // Writing null deletes the item
        PutAction::Delete | PutAction::Upsert { value: Value::Null, .. } => WriteAction::Delete,
        PutAction::Upsert { value, index } => {
            let entries = match (default_fields, index) {
                (None, _) | (_, IndexMode::Disabled) => Vec::new(),
                (Some(defaults), IndexMode::Default) => collect_entries(defaults, &value),
                (Some(_), IndexMode::Fields(custom)) => {
                    collect_entries(&fields::parse_all(&custom)?, &value)
                }
            };
            WriteAction::Upsert { value, entries }
        }
    };

    Ok(PlannedWrite {
        namespace: put.namespace,
        encoded,
        key: put.key,
        action,
    })
}

fn collect_entries(paths: &[FieldPath], value: &Value) -> Vec<(String, String)> {
    paths.iter().flat_map(|path| path.entries(value)).collect()
}

fn plan_search(search: SearchOp) -> Result<PlannedSearch> {
    Ok(PlannedSearch {
        filter: Filter::parse(search.filter.as_ref())?,
        prefix: search.namespace_prefix,
        query: search.query.filter(|q| !q.is_empty()),
        limit: search.limit,
        offset: search.offset,
    })
}

/// Parse a JSON array of operations.
///
/// Match types are checked before deserializing so an unknown one reports
/// [`RecallError::UnsupportedMatchType`] rather than a generic JSON error.
pub fn operations_from_json(value: Value) -> Result<Vec<Operation>> {
    let Value::Array(raw_ops) = value else {
        return Err(RecallError::InvalidInput(
            "batch must be a JSON array of operations".into(),
        ));
    };

    for raw in &raw_ops {
        let conditions = raw
            .get("match_conditions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for condition in conditions {
            if let Some(name) = condition.get("match_type").and_then(Value::as_str) {
                namespace::parse_match_type(name)?;
            }
        }
    }

    raw_ops
        .into_iter()
        .map(|raw| serde_json::from_value(raw).map_err(RecallError::from))
        .collect()
}
