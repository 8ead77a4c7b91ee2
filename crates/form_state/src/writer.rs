//! Native-bypass writes.
//!
//! A value assigned through the renderer-visible property can be swallowed by
//! the renderer's own change bookkeeping. Writes therefore go through the
//! node's underlying setter ([`FieldNode::set_value`] and friends) and are
//! followed by exactly one synthetic [`EventKind::Change`] so the engine's own
//! listeners, and any other observer, see the update.
//!
//! None of these functions fail. Writing to a node that has left the tree is
//! a no-op.

use serde_json::Value;
use tracing::trace;

use crate::node::{EventKind, FieldKind, FieldNode, FieldRef};

pub fn write_value(field: &dyn FieldNode, value: &str) {
    if !field.is_connected() {
        trace!("skip write to detached field {}", field.name());
        return;
    }
    field.set_value(value);
    field.dispatch(EventKind::Change);
}

pub fn write_checked(field: &dyn FieldNode, checked: bool) {
    if !field.is_connected() {
        trace!("skip write to detached field {}", field.name());
        return;
    }
    field.set_checked(checked);
    field.dispatch(EventKind::Change);
}

pub fn write_selected(field: &dyn FieldNode, values: &[String]) {
    if !field.is_connected() {
        trace!("skip write to detached field {}", field.name());
        return;
    }
    field.set_selected(values);
    field.dispatch(EventKind::Change);
}

/// Text form of a model value for text-like kinds.
fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        compound => compound.to_string(),
    }
}

fn as_text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(as_text).collect(),
        Value::Null => Vec::new(),
        single => vec![as_text(single)],
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl FieldKind {
    /// Injection rule for all nodes sharing one name: the inverse of
    /// [`FieldKind::extract`]. Every node receives exactly one write.
    pub fn inject(self, nodes: &[FieldRef], value: &Value) {
        match self {
            FieldKind::Checkbox if nodes.len() >= 2 => {
                let wanted = as_text_list(value);
                for node in nodes {
                    write_checked(node.as_ref(), wanted.contains(&node.value()));
                }
            }
            FieldKind::Checkbox => {
                for node in nodes {
                    let checked = match value {
                        Value::String(s) => *s == node.value(),
                        other => is_truthy(other),
                    };
                    write_checked(node.as_ref(), checked);
                }
            }
            FieldKind::Radio => {
                let wanted = match value {
                    Value::Null => None,
                    other => Some(as_text(other)),
                };
                for node in nodes {
                    write_checked(node.as_ref(), wanted.as_deref() == Some(&*node.value()));
                }
            }
            FieldKind::MultiChoice => {
                let wanted = as_text_list(value);
                for node in nodes {
                    write_selected(node.as_ref(), &wanted);
                }
            }
            FieldKind::Text | FieldKind::Numeric | FieldKind::SingleChoice | FieldKind::Widget => {
                match (nodes, value) {
                    ([single], value) => write_value(single.as_ref(), &as_text(value)),
                    (many, Value::Array(items)) => {
                        for (i, node) in many.iter().enumerate() {
                            let text = items.get(i).map(as_text).unwrap_or_default();
                            write_value(node.as_ref(), &text);
                        }
                    }
                    (many, value) => {
                        let text = as_text(value);
                        for node in many {
                            write_value(node.as_ref(), &text);
                        }
                    }
                }
            }
        }
    }

    /// Revert every node to its declared default.
    pub fn restore_default(self, nodes: &[FieldRef]) {
        for node in nodes {
            match self {
                FieldKind::Checkbox | FieldKind::Radio => {
                    write_checked(node.as_ref(), node.default_checked())
                }
                FieldKind::MultiChoice => write_selected(node.as_ref(), &node.default_selected()),
                FieldKind::Text
                | FieldKind::Numeric
                | FieldKind::SingleChoice
                | FieldKind::Widget => write_value(node.as_ref(), &node.default_value()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_conversion() {
        assert_eq!(as_text(&json!(null)), "");
        assert_eq!(as_text(&json!("x")), "x");
        assert_eq!(as_text(&json!(42)), "42");
        assert_eq!(as_text(&json!(1.5)), "1.5");
        assert_eq!(as_text(&json!(true)), "true");
        assert_eq!(as_text(&json!(["a"])), r#"["a"]"#);
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn scalar_becomes_single_item_list() {
        assert_eq!(as_text_list(&json!("a")), vec!["a".to_string()]);
        assert_eq!(as_text_list(&json!(null)), Vec::<String>::new());
        assert_eq!(as_text_list(&json!(["a", 1])), vec!["a".to_string(), "1".into()]);
    }
}
