//! Platform seam between the engine and a live UI tree.
//!
//! The renderer owns every node; the engine only observes and writes through
//! the traits below. A platform binding implements:
//! - [`FieldNode`] for each addressable field element
//! - [`Subtree`] for any container the engine may scan (the form root, a wizard step)
//! - [`FormRoot`] for the element the engine attaches to
//! - [`SubtreeChangeNotifier`] to report fields entering or leaving the tree
//! - [`ErrorSlot`] for the `error-<name>` elements that render messages
//!
//! [`crate::memory`] ships an in-memory binding that implements all of them.

use std::fmt;
use std::sync::Arc;

use strum::Display;

/// Custom rule lookup key.
pub const ATTR_VALIDATION: &str = "data-validation";
/// Marks a checkbox as the master of the named group.
pub const ATTR_CHECKBOX_MASTER: &str = "data-checkbox-master";
/// Presentation flag written by the engine for invalid fields.
pub const ATTR_INVALID: &str = "aria-invalid";
/// Points at the error slot describing an invalid field.
pub const ATTR_DESCRIBED_BY: &str = "aria-describedby";

/// Value a checkbox reports when it has no explicit `value` attribute.
pub const DEFAULT_CHECKBOX_VALUE: &str = "on";

/// Stable node identity, assigned by the platform binding.
pub type NodeId = u64;

/// Handle returned by [`FieldNode::add_listener`].
pub type ListenerId = u64;

/// Handle returned by [`SubtreeChangeNotifier::subscribe`].
pub type SubscriptionId = u64;

pub type FieldRef = Arc<dyn FieldNode>;

pub type FieldListener = Arc<dyn Fn(&FieldEvent) + Send + Sync>;

pub type ChangeCallback = Arc<dyn Fn(&SubtreeChange) + Send + Sync>;

/// Kinds of field the engine knows how to read and write.
///
/// Each kind carries its own extraction rule (see `extract`) and injection
/// rule (see `writer`); the engine never sniffs values at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
    Text,
    /// Numeric input. The raw text is preserved; parsing belongs to the caller.
    Numeric,
    Checkbox,
    Radio,
    SingleChoice,
    MultiChoice,
    /// Externally rendered widget (searchable select, rating, tags, ...)
    /// exposing a text value and its own validity.
    Widget,
}

impl FieldKind {
    /// Free-text kinds are listened to on every keystroke.
    pub fn is_free_text(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Numeric)
    }

    /// Events the registry subscribes to for this kind.
    pub fn listened_events(self) -> &'static [EventKind] {
        if self.is_free_text() {
            &[EventKind::Input, EventKind::Change, EventKind::Blur]
        } else {
            &[EventKind::Change, EventKind::Blur]
        }
    }
}

/// Interaction notifications a field can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// Keystroke-level change.
    Input,
    /// Commit-level change.
    Change,
    /// Focus loss.
    Blur,
}

pub struct FieldEvent {
    pub kind: EventKind,
    pub target: FieldRef,
}

impl fmt::Debug for FieldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEvent")
            .field("kind", &self.kind)
            .field("target", &self.target.name())
            .finish()
    }
}

/// Native constraint state as reported by the platform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
    pub message: String,
}

impl Validity {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// One addressable field element in the live tree.
///
/// The engine treats these accessors as the source of truth and re-reads them
/// on every query.
pub trait FieldNode: Send + Sync {
    fn id(&self) -> NodeId;

    /// Path string; may be shared by sibling nodes (checkbox and radio groups).
    fn name(&self) -> String;

    fn kind(&self) -> FieldKind;

    /// Current text value. Checkboxes and radios report their `value`
    /// attribute ([`DEFAULT_CHECKBOX_VALUE`] when absent).
    fn value(&self) -> String;

    fn checked(&self) -> bool;

    /// Selected options of a [`FieldKind::MultiChoice`] field.
    fn selected(&self) -> Vec<String> {
        Vec::new()
    }

    fn default_value(&self) -> String;

    fn default_checked(&self) -> bool;

    fn default_selected(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_disabled(&self) -> bool;

    /// False once the renderer removed the node from the tree.
    fn is_connected(&self) -> bool;

    fn is_visible(&self) -> bool {
        true
    }

    /// Visible control standing in for a hidden backing field.
    fn focus_proxy(&self) -> Option<FieldRef> {
        None
    }

    fn attribute(&self, name: &str) -> Option<String>;

    /// `None` removes the attribute.
    fn set_attribute(&self, name: &str, value: Option<&str>);

    /// Native constraint state, including any injected custom message.
    fn validity(&self) -> Validity;

    /// Inject a custom validity message; the empty string clears it.
    fn set_custom_validity(&self, message: &str);

    fn indeterminate(&self) -> bool;

    fn set_indeterminate(&self, indeterminate: bool);

    /// Write the value through the platform's underlying setter.
    ///
    /// Implementations must bypass any renderer-level interception of the
    /// value property and must NOT dispatch notifications themselves.
    fn set_value(&self, value: &str);

    /// Same contract as [`FieldNode::set_value`] for the checked state.
    fn set_checked(&self, checked: bool);

    /// Same contract as [`FieldNode::set_value`] for multi-choice selections.
    fn set_selected(&self, _values: &[String]) {}

    /// Deliver a synthetic notification to every listener of `kind`.
    fn dispatch(&self, kind: EventKind);

    fn add_listener(&self, kind: EventKind, listener: FieldListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    fn focus(&self);

    /// Trigger the platform's native validity report for this field.
    fn report_validity(&self);

    /// Group name this node controls, if it is a checkbox master.
    fn master_of(&self) -> Option<String> {
        self.attribute(ATTR_CHECKBOX_MASTER)
    }

    /// Custom rule key, if any.
    fn rule_key(&self) -> Option<String> {
        self.attribute(ATTR_VALIDATION)
    }

    fn is_marked_invalid(&self) -> bool {
        self.attribute(ATTR_INVALID).as_deref() == Some("true")
    }
}

/// Any container of fields.
pub trait Subtree: Send + Sync {
    /// All field nodes below this container, in document order.
    fn fields(&self) -> Vec<FieldRef>;
}

/// Text element rendering one field's error message.
pub trait ErrorSlot: Send + Sync {
    fn text(&self) -> String;

    fn set_text(&self, text: &str);
}

/// Batch of structural changes, in the order the tree reported them.
#[derive(Default)]
pub struct SubtreeChange {
    /// Field nodes that entered the tree, including ones nested in an inserted container.
    pub added: Vec<FieldRef>,
    /// Field nodes that left the tree.
    pub removed: Vec<FieldRef>,
}

impl SubtreeChange {
    pub fn touches_checkboxes(&self) -> bool {
        self.added
            .iter()
            .chain(self.removed.iter())
            .any(|node| node.kind() == FieldKind::Checkbox)
    }
}

pub trait SubtreeChangeNotifier: Send + Sync {
    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// The element a form engine attaches to.
pub trait FormRoot: Subtree {
    /// Look up an error slot by element identifier.
    fn error_slot(&self, id: &str) -> Option<Arc<dyn ErrorSlot>>;

    fn notifier(&self) -> &dyn SubtreeChangeNotifier;
}

/// Field nodes that carry model data (everything except checkbox masters).
pub fn data_fields(nodes: Vec<FieldRef>) -> Vec<FieldRef> {
    nodes
        .into_iter()
        .filter(|node| node.master_of().is_none() && !node.name().is_empty())
        .collect()
}
