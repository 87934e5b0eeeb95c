//! Result-row reducer (spec §4.10, component C10).
//!
//! Folds the flat rows a driver returns back into the nested object
//! shape the caller asked for. Most of that nesting already happened in
//! SQL (C7's `json_agg`/`json_build_object` shapes produce ready-made
//! JSON columns); the reducer's remaining job is fourfold: parse any
//! JSON-as-text columns (SQLite returns aggregate columns as TEXT, not a
//! native JSON type), descend dotted-path columns a flat-join plan
//! produced and fold them into nested objects by composite key,
//! splice in relations the planner (C9) decomposed into separate
//! batched queries, and undo the sort reversal used to serve a
//! negative `take`.
//!
//! Exposed as an explicit `new`/`process_row`/`result` state machine
//! (spec §6 external interface) rather than a one-shot function so a
//! caller can stream driver rows into it without buffering the whole
//! result set in memory before reduction starts.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::schema::Cardinality;

/// One row as the driver hands it back: column name to JSON-compatible
/// value. Scalar columns arrive as their native JSON representation;
/// aggregated relation columns arrive as either a parsed `Value` (most
/// Postgres drivers deserialize `json`/`jsonb` columns automatically) or
/// a JSON string (SQLite, which has no native JSON column type).
/// Flat-join columns arrive under dotted names (`"posts.id"`,
/// `"posts.comments.id"`) rather than as a single aggregated column.
pub type Row = HashMap<String, Value>;

/// Describes one relation node of a flat-join include tree so the
/// reducer can descend dotted column names and fold matching rows into
/// nested children (spec §4.10). `alias` is the dotted-path segment
/// this node owns (e.g. `"comments"` under parent prefix `"posts"`
/// yields the full prefix `"posts.comments"`).
#[derive(Debug, Clone)]
pub struct IncludeTreeMeta {
    pub alias: String,
    pub primary_key_columns: Vec<String>,
    pub cardinality: Cardinality,
    pub children: Vec<IncludeTreeMeta>,
}

impl IncludeTreeMeta {
    pub fn new(alias: impl Into<String>, primary_key_columns: Vec<String>, cardinality: Cardinality) -> Self {
        Self { alias: alias.into(), primary_key_columns, cardinality, children: Vec::new() }
    }

    pub fn with_children(mut self, children: Vec<IncludeTreeMeta>) -> Self {
        self.children = children;
        self
    }
}

/// Which relation columns on a row are JSON-aggregated and may need
/// text parsing, keyed by their output alias.
#[derive(Debug, Clone, Default)]
pub struct ReductionSpec {
    pub json_text_columns: Vec<String>,
    /// Output alias -> batched relation field name, for relations the
    /// planner pulled into a separate query instead of aggregating inline.
    pub batched_relations: HashMap<String, String>,
    pub primary_key_columns: Vec<String>,
    /// Flat-join relations, described as a forest so nested flat-joins
    /// (a flat-joined relation whose own child is also flat-joined)
    /// resolve by recursive descent rather than a fixed number of levels.
    pub flat_join_tree: Vec<IncludeTreeMeta>,
    /// `true` if the scan ran in reverse order to serve a negative
    /// `take` and needs flipping back before returning to the caller.
    pub scan_reversed: bool,
}

fn key_string(values: &[Value]) -> String {
    serde_json::to_string(values).unwrap_or_default()
}

/// Copies every column under `prefix.` whose remainder has no further
/// dot (i.e. is a scalar of this node, not a deeper relation) into
/// `obj`, using the remainder as the output field name. Existing keys
/// are left alone so repeated descent over the same row is idempotent.
fn populate_scalars(row: &Row, prefix: &str, obj: &mut Map<String, Value>) {
    let lead = format!("{prefix}.");
    for (column, value) in row {
        if let Some(rest) = column.strip_prefix(lead.as_str()) {
            if !rest.contains('.') {
                obj.entry(rest.to_string()).or_insert_with(|| value.clone());
            }
        }
    }
}

/// Descends one level of the flat-join tree under `prefix`, extracting
/// the child's composite key from its dotted columns, looking it up (or
/// creating it) under `parent_obj`, and recursing into deeper children.
/// A null composite key means this row carries no matching child at
/// this node (an outer-joined parent with no related rows) and is
/// skipped, per spec §4.10.
fn descend(
    row: &Row,
    prefix: &str,
    root_key_str: &str,
    node: &IncludeTreeMeta,
    parent_obj: &mut Map<String, Value>,
    child_index: &mut HashMap<String, usize>,
) -> Result<(), CompileError> {
    let full_prefix = if prefix.is_empty() { node.alias.clone() } else { format!("{prefix}.{}", node.alias) };

    let mut key_values = Vec::with_capacity(node.primary_key_columns.len());
    let mut key_is_null = false;
    for pk in &node.primary_key_columns {
        let column = format!("{full_prefix}.{pk}");
        match row.get(&column) {
            None | Some(Value::Null) => {
                key_is_null = true;
                break;
            }
            Some(v) => key_values.push(v.clone()),
        }
    }
    if key_is_null {
        return Ok(());
    }
    let child_key_str = key_string(&key_values);
    let scope = format!("{root_key_str}\u{0}{full_prefix}\u{0}{child_key_str}");

    match node.cardinality {
        Cardinality::One => {
            if !matches!(parent_obj.get(&node.alias), Some(Value::Object(_))) {
                let mut child_obj = Map::new();
                populate_scalars(row, &full_prefix, &mut child_obj);
                parent_obj.insert(node.alias.clone(), Value::Object(child_obj));
            }
            if let Some(Value::Object(child_obj)) = parent_obj.get_mut(&node.alias) {
                for deeper in &node.children {
                    descend(row, &full_prefix, root_key_str, deeper, child_obj, child_index)?;
                }
            }
        }
        Cardinality::Many => {
            let entry = parent_obj.entry(node.alias.clone()).or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(arr) = entry else {
                return Err(CompileError::Critical(format!("`{}` is both a to-one and to-many relation across rows", node.alias)));
            };
            let idx = if let Some(&idx) = child_index.get(&scope) {
                idx
            } else {
                let mut child_obj = Map::new();
                populate_scalars(row, &full_prefix, &mut child_obj);
                arr.push(Value::Object(child_obj));
                let idx = arr.len() - 1;
                child_index.insert(scope, idx);
                idx
            };
            if let Value::Object(child_obj) = &mut arr[idx] {
                for deeper in &node.children {
                    descend(row, &full_prefix, root_key_str, deeper, child_obj, child_index)?;
                }
            }
        }
    }
    Ok(())
}

/// Accumulates reduced rows for one compiled query.
pub struct Reducer {
    spec: ReductionSpec,
    rows: Vec<Map<String, Value>>,
    /// Root composite key (as its canonical JSON-string form) -> index
    /// into `rows`, maintained so repeated rows for the same parent
    /// (duplicated by a flat outer join) fold into one parent object.
    parent_index: HashMap<String, usize>,
    /// Scoped child dedup index: `"{root_key}\0{dotted_path}\0{child_key}"`
    /// -> index into the child's array, so the same child row appearing
    /// twice (a second flat-joined grandchild fans the row out again)
    /// is folded rather than duplicated.
    child_index: HashMap<String, usize>,
    /// Batched relation results, keyed by the parent key value they
    /// belong to, merged in during `result()`.
    batched: HashMap<String, HashMap<Value, Vec<Value>>>,
}

impl Reducer {
    pub fn new(spec: ReductionSpec) -> Self {
        Self {
            spec,
            rows: Vec::new(),
            parent_index: HashMap::new(),
            child_index: HashMap::new(),
            batched: HashMap::new(),
        }
    }

    /// Feeds one driver row through JSON-text parsing, folds it into its
    /// parent (by composite primary key) and descends any flat-joined
    /// relation columns into nested children.
    pub fn process_row(&mut self, mut row: Row) -> Result<(), CompileError> {
        for column in &self.spec.json_text_columns {
            if let Some(Value::String(text)) = row.get(column) {
                let parsed: Value = serde_json::from_str(text)
                    .map_err(|e| CompileError::Critical(format!("failed to parse JSON column `{column}`: {e}")))?;
                row.insert(column.clone(), parsed);
            }
        }

        if self.spec.flat_join_tree.is_empty() {
            self.rows.push(row.into_iter().collect());
            return Ok(());
        }

        let root_key_values: Vec<Value> =
            self.spec.primary_key_columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
        let root_key_str = key_string(&root_key_values);

        let idx = if let Some(&idx) = self.parent_index.get(&root_key_str) {
            idx
        } else {
            let mut obj = Map::new();
            for (column, value) in &row {
                if !column.contains('.') {
                    obj.insert(column.clone(), value.clone());
                }
            }
            self.rows.push(obj);
            let idx = self.rows.len() - 1;
            self.parent_index.insert(root_key_str.clone(), idx);
            idx
        };

        for node in &self.spec.flat_join_tree {
            descend(&row, "", &root_key_str, node, &mut self.rows[idx], &mut self.child_index)?;
        }
        Ok(())
    }

    /// Feeds one batched-relation result row (fetched by a follow-up
    /// `WHERE parent_id IN (...)` query) for splicing into the
    /// already-accumulated parent rows at `result()` time.
    pub fn process_batched_row(&mut self, output_alias: &str, parent_key: Value, child: Value) {
        self.batched.entry(output_alias.to_string()).or_default().entry(parent_key).or_default().push(child);
    }

    /// Finalizes the result: splices batched relations into their
    /// parent rows, reverses row order if the scan ran backwards, and
    /// returns the nested object array.
    pub fn result(mut self) -> Result<Vec<Value>, CompileError> {
        if !self.batched.is_empty() {
            let pk_column = self.spec.primary_key_columns.first().cloned();
            for (alias, by_parent) in std::mem::take(&mut self.batched) {
                let Some(pk_column) = &pk_column else {
                    return Err(CompileError::Critical(
                        "batched relation present but no primary key column configured".into(),
                    ));
                };
                for row in &mut self.rows {
                    let Some(key) = row.get(pk_column).cloned() else {
                        continue;
                    };
                    let children = by_parent.get(&key).cloned().unwrap_or_default();
                    row.insert(alias.clone(), Value::Array(children));
                }
            }
        }
        if self.spec.scan_reversed {
            self.rows.reverse();
        }
        Ok(self.rows.into_iter().map(Value::Object).collect())
    }

    /// Convenience for `findFirst`/`findUnique`: returns the single row,
    /// or `Value::Null` if the query matched nothing.
    pub fn result_single(self) -> Result<Value, CompileError> {
        Ok(self.result()?.into_iter().next().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn parses_json_text_columns() {
        let spec = ReductionSpec {
            json_text_columns: vec!["posts".into()],
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        reducer.process_row(row(&[("id", Value::from(1)), ("posts", Value::String("[1,2,3]".into()))])).unwrap();
        let result = reducer.result().unwrap();
        assert_eq!(result[0]["posts"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn splices_batched_relations_by_parent_key() {
        let spec = ReductionSpec {
            primary_key_columns: vec!["id".into()],
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        reducer.process_row(row(&[("id", Value::from(1))])).unwrap();
        reducer.process_row(row(&[("id", Value::from(2))])).unwrap();
        reducer.process_batched_row("comments", Value::from(1), serde_json::json!({"text": "hi"}));
        let result = reducer.result().unwrap();
        assert_eq!(result[0]["comments"], serde_json::json!([{"text": "hi"}]));
        assert_eq!(result[1]["comments"], serde_json::json!([]));
    }

    #[test]
    fn reverses_rows_for_negative_take_scan() {
        let spec = ReductionSpec {
            scan_reversed: true,
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        reducer.process_row(row(&[("id", Value::from(2))])).unwrap();
        reducer.process_row(row(&[("id", Value::from(1))])).unwrap();
        let result = reducer.result().unwrap();
        assert_eq!(result[0]["id"], Value::from(1));
        assert_eq!(result[1]["id"], Value::from(2));
    }

    #[test]
    fn result_single_returns_null_when_empty() {
        let reducer = Reducer::new(ReductionSpec::default());
        assert_eq!(reducer.result_single().unwrap(), Value::Null);
    }

    #[test]
    fn flat_join_descends_dotted_columns_and_dedupes_children() {
        let spec = ReductionSpec {
            primary_key_columns: vec!["id".into()],
            flat_join_tree: vec![IncludeTreeMeta::new("posts", vec!["id".into()], Cardinality::Many)],
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        // Parent 1 fans out to two posts across two rows; parent 2 has none
        // (its post columns are null from the outer join).
        reducer
            .process_row(row(&[
                ("id", Value::from(1)),
                ("name", Value::String("alice".into())),
                ("posts.id", Value::from(10)),
                ("posts.title", Value::String("first".into())),
            ]))
            .unwrap();
        reducer
            .process_row(row(&[
                ("id", Value::from(1)),
                ("name", Value::String("alice".into())),
                ("posts.id", Value::from(11)),
                ("posts.title", Value::String("second".into())),
            ]))
            .unwrap();
        reducer
            .process_row(row(&[("id", Value::from(2)), ("name", Value::String("bob".into())), ("posts.id", Value::Null), ("posts.title", Value::Null)]))
            .unwrap();

        let result = reducer.result().unwrap();
        assert_eq!(result.len(), 2);
        let alice = result.iter().find(|r| r["id"] == Value::from(1)).unwrap();
        assert_eq!(alice["posts"], serde_json::json!([{"id": 10, "title": "first"}, {"id": 11, "title": "second"}]));
        let bob = result.iter().find(|r| r["id"] == Value::from(2)).unwrap();
        assert_eq!(bob["posts"], serde_json::json!([]));
    }

    #[test]
    fn idempotent_processing_dedupes_repeated_row() {
        let spec = ReductionSpec {
            primary_key_columns: vec!["id".into()],
            flat_join_tree: vec![IncludeTreeMeta::new("posts", vec!["id".into()], Cardinality::Many)],
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        let duplicated = row(&[
            ("id", Value::from(1)),
            ("posts.id", Value::from(10)),
            ("posts.title", Value::String("first".into())),
        ]);
        reducer.process_row(duplicated.clone()).unwrap();
        reducer.process_row(duplicated).unwrap();

        let result = reducer.result().unwrap();
        assert_eq!(result.len(), 1, "the same root row must not duplicate a parent object");
        assert_eq!(result[0]["posts"], serde_json::json!([{"id": 10, "title": "first"}]), "the same child row must not duplicate a child object");
    }

    #[test]
    fn nested_flat_join_descends_multiple_levels() {
        let spec = ReductionSpec {
            primary_key_columns: vec!["id".into()],
            flat_join_tree: vec![IncludeTreeMeta::new("posts", vec!["id".into()], Cardinality::Many).with_children(vec![
                IncludeTreeMeta::new("comments", vec!["id".into()], Cardinality::Many),
            ])],
            ..Default::default()
        };
        let mut reducer = Reducer::new(spec);
        reducer
            .process_row(row(&[
                ("id", Value::from(1)),
                ("posts.id", Value::from(10)),
                ("posts.comments.id", Value::from(100)),
                ("posts.comments.body", Value::String("nice".into())),
            ]))
            .unwrap();
        reducer
            .process_row(row(&[
                ("id", Value::from(1)),
                ("posts.id", Value::from(10)),
                ("posts.comments.id", Value::from(101)),
                ("posts.comments.body", Value::String("cool".into())),
            ]))
            .unwrap();

        let result = reducer.result().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0]["posts"],
            serde_json::json!([{"id": 10, "comments": [{"id": 100, "body": "nice"}, {"id": 101, "body": "cool"}]}])
        );
    }
}
