//! Reads the live field tree into a nested model.
//!
//! Nothing is cached: every call walks the current nodes. The representational
//! shape of a name depends on how many nodes share it, so adding a second
//! checkbox called `tasks` turns `tasks` from a boolean into an array.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::node::{data_fields, FieldKind, FieldRef, Subtree, DEFAULT_CHECKBOX_VALUE};
use crate::path::{self, FieldPath};

/// Nodes sharing one name, in document order.
pub(crate) struct NameGroup {
    pub name: String,
    pub path: FieldPath,
    pub nodes: Vec<FieldRef>,
}

impl NameGroup {
    pub fn kind(&self) -> FieldKind {
        self.nodes
            .first()
            .map(|node| node.kind())
            .unwrap_or(FieldKind::Text)
    }

    pub fn value(&self) -> Value {
        self.kind().extract(&self.nodes)
    }
}

/// Group data fields by name, keeping first-occurrence order.
///
/// Names that do not parse are skipped.
pub(crate) fn group_by_name(nodes: Vec<FieldRef>) -> Vec<NameGroup> {
    let mut groups: Vec<NameGroup> = Vec::new();
    for node in data_fields(nodes) {
        let name = node.name();
        if let Some(group) = groups.iter_mut().find(|g| g.name == name) {
            group.nodes.push(node);
            continue;
        }
        match FieldPath::parse(&name) {
            Ok(path) => groups.push(NameGroup {
                name,
                path,
                nodes: vec![node],
            }),
            Err(err) => debug!("skipping field with unusable name: {err}"),
        }
    }
    groups
}

/// Build the model for `prefix` (the whole tree when `None` or empty).
///
/// When `prefix` names exactly one field, that field's own value is returned
/// instead of a wrapping object.
pub fn extract(nodes: Vec<FieldRef>, prefix: Option<&FieldPath>) -> Value {
    let groups = group_by_name(nodes);
    let prefix = prefix.cloned().unwrap_or_default();

    if !prefix.is_empty() {
        if let Some(group) = groups.iter().find(|g| g.path == prefix) {
            return group.value();
        }
    }

    // The whole form is an object; below a prefix the first written segment
    // decides between array and object.
    let mut model = if prefix.is_empty() {
        Value::Object(Map::new())
    } else {
        Value::Null
    };
    for group in &groups {
        if let Some(relative) = group.path.relative_to(&prefix) {
            path::set(&mut model, &relative, group.value());
        }
    }
    if model.is_null() {
        model = Value::Object(Map::new());
    }
    model
}

/// `extract` over a subtree with a raw prefix string.
pub fn extract_tree(tree: &dyn Subtree, prefix: Option<&str>) -> Result<Value> {
    let prefix = prefix.map(FieldPath::parse_prefix).transpose()?;
    Ok(extract(tree.fields(), prefix.as_ref()))
}

impl FieldKind {
    /// Extraction rule for all nodes sharing one name.
    pub fn extract(self, nodes: &[FieldRef]) -> Value {
        match self {
            FieldKind::Checkbox if nodes.len() >= 2 => Value::Array(
                nodes
                    .iter()
                    .filter(|node| node.checked())
                    .map(|node| Value::String(node.value()))
                    .collect(),
            ),
            FieldKind::Checkbox => match nodes.first() {
                Some(node) if node.checked() => {
                    let value = node.value();
                    if value == DEFAULT_CHECKBOX_VALUE {
                        Value::Bool(true)
                    } else {
                        Value::String(value)
                    }
                }
                _ => Value::Bool(false),
            },
            FieldKind::Radio => nodes
                .iter()
                .find(|node| node.checked())
                .map(|node| Value::String(node.value()))
                .unwrap_or(Value::Null),
            FieldKind::MultiChoice => nodes
                .first()
                .map(|node| node.selected().into_iter().map(Value::String).collect())
                .unwrap_or_else(|| Value::Array(Vec::new())),
            FieldKind::Text | FieldKind::Numeric | FieldKind::SingleChoice | FieldKind::Widget => {
                match nodes {
                    [single] => Value::String(single.value()),
                    many => many.iter().map(|node| Value::String(node.value())).collect(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FieldSpec, MemoryTree};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn indexed_names_build_arrays() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("user.tags[0]").value("a"));
        tree.add(FieldSpec::text("user.tags[1]").value("b"));
        assert_eq!(
            extract_tree(&*tree, None).unwrap(),
            json!({"user": {"tags": ["a", "b"]}})
        );
    }

    #[test]
    fn exact_prefix_returns_the_bare_value() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::numeric("order.qty").value("007"));
        tree.add(FieldSpec::text("order.note").value("fragile"));
        assert_eq!(extract_tree(&*tree, Some("order.qty")).unwrap(), json!("007"));
        assert_eq!(
            extract_tree(&*tree, Some("order.")).unwrap(),
            json!({"qty": "007", "note": "fragile"})
        );
    }

    #[test]
    fn prefix_aligns_on_segments() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("address.city").value("X"));
        tree.add(FieldSpec::text("addressLine1").value("Main St"));
        assert_eq!(
            extract_tree(&*tree, Some("address")).unwrap(),
            json!({"city": "X"})
        );
    }

    #[test]
    fn prefix_above_indices_yields_an_array() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("user.tags[0]").value("a"));
        tree.add(FieldSpec::text("user.tags[1]").value("b"));
        tree.add(FieldSpec::text("user.name").value("Ada"));
        assert_eq!(extract_tree(&*tree, Some("user.tags")).unwrap(), json!(["a", "b"]));
        assert_eq!(extract_tree(&*tree, Some("user.tags.")).unwrap(), json!(["a", "b"]));
        assert_eq!(
            extract_tree(&*tree, Some("user")).unwrap(),
            json!({"tags": ["a", "b"], "name": "Ada"})
        );
    }

    #[test]
    fn checkbox_group_under_an_indexed_parent() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("items[0].title").value("first"));
        tree.add(FieldSpec::checkbox("items[0].tags").value("red").checked(true));
        tree.add(FieldSpec::checkbox("items[0].tags").value("blue"));
        tree.add(FieldSpec::checkbox("items[1].tags").value("red"));
        tree.add(FieldSpec::checkbox("items[1].tags").value("blue").checked(true));
        assert_eq!(
            extract_tree(&*tree, None).unwrap(),
            json!({"items": [
                {"title": "first", "tags": ["red"]},
                {"tags": ["blue"]}
            ]})
        );
        assert_eq!(
            extract_tree(&*tree, Some("items")).unwrap(),
            json!([{"title": "first", "tags": ["red"]}, {"tags": ["blue"]}])
        );
        assert_eq!(extract_tree(&*tree, Some("items[1].tags")).unwrap(), json!(["blue"]));
    }

    #[test]
    fn empty_section_is_an_empty_object() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("a").value("x"));
        assert_eq!(extract_tree(&*tree, Some("missing")).unwrap(), json!({}));
        assert_eq!(extract_tree(&*MemoryTree::new(), None).unwrap(), json!({}));
    }

    #[test]
    fn huge_index_names_extract_without_panicking() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("items[18446744073709551615]").value("max"));
        tree.add(FieldSpec::text("items[4000000000]").value("big"));
        assert_eq!(
            extract_tree(&*tree, None).unwrap(),
            json!({"items": {"18446744073709551615": "max", "4000000000": "big"}})
        );
    }

    #[test]
    fn masters_and_unnamed_nodes_carry_no_data() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::master("tasks"));
        tree.add(FieldSpec::checkbox("tasks").value("a").checked(true));
        tree.add(FieldSpec::text(""));
        assert_eq!(extract_tree(&*tree, None).unwrap(), json!({"tasks": "a"}));
    }

    #[test]
    fn unparsable_names_are_skipped() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::text("broken..name").value("x"));
        tree.add(FieldSpec::text("ok").value("y"));
        assert_eq!(extract_tree(&*tree, None).unwrap(), json!({"ok": "y"}));
    }

    #[test]
    fn radio_and_multi_choice() {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::radio("plan", "basic"));
        tree.add(FieldSpec::radio("plan", "pro").checked(true));
        tree.add(FieldSpec::radio("size", "s"));
        tree.add(FieldSpec::multi_select("langs").selected(["rust", "go"]));
        assert_eq!(
            extract_tree(&*tree, None).unwrap(),
            json!({"plan": "pro", "size": null, "langs": ["rust", "go"]})
        );
    }

    #[test]
    fn malformed_prefix_is_an_error() {
        let tree = MemoryTree::new();
        assert!(extract_tree(&*tree, Some("a[")).is_err());
    }
}
