//! In-memory platform binding.
//!
//! Keeps a flat, ordered list of field nodes (optionally grouped into named
//! sections such as wizard steps) together with error slots, and implements
//! every trait of [`crate::node`]. Native constraints (required, length,
//! pattern, numeric range) are evaluated live from the current value, the way
//! a browser computes its validity state.
//!
//! Each field also tracks the value its "renderer" last saw. User-style input
//! (`type_text`, `choose`, `click`) updates both; the bypass setters used by
//! the engine update only the underlying value. Tests use this to tell the two
//! write paths apart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use regex::Regex;
use tracing::warn;

use crate::lock;
use crate::node::{
    ChangeCallback, ErrorSlot, EventKind, FieldEvent, FieldKind, FieldListener, FieldNode,
    FieldRef, FormRoot, ListenerId, NodeId, Subtree, SubtreeChange, SubtreeChangeNotifier,
    SubscriptionId, Validity, ATTR_CHECKBOX_MASTER, ATTR_VALIDATION, DEFAULT_CHECKBOX_VALUE,
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Declarative description of a field to insert into a [`MemoryTree`].
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    value: Option<String>,
    checked: bool,
    selected: Vec<String>,
    attributes: Vec<(String, String)>,
    disabled: bool,
    hidden: bool,
    constraints: Constraints,
}

#[derive(Clone, Debug, Default)]
struct Constraints {
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            checked: false,
            selected: Vec::new(),
            attributes: Vec::new(),
            disabled: false,
            hidden: false,
            constraints: Constraints::default(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Numeric)
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Checkbox)
    }

    pub fn radio(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Radio).value(value)
    }

    pub fn select(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::SingleChoice)
    }

    pub fn multi_select(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::MultiChoice)
    }

    pub fn widget(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Widget)
    }

    /// Master checkbox for the checkboxes named `group`.
    pub fn master(group: impl Into<String>) -> Self {
        Self::new("", FieldKind::Checkbox).attr(ATTR_CHECKBOX_MASTER, group)
    }

    /// Initial (and default) value. For checkboxes and radios this is the
    /// `value` attribute.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn selected<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.selected = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Attach a custom rule key.
    pub fn rule(self, key: impl Into<String>) -> Self {
        self.attr(ATTR_VALIDATION, key)
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Required. Not supported for radios, which would need their siblings.
    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.constraints.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.constraints.max_length = Some(n);
        self
    }

    /// Whole-value regex. An invalid expression is ignored with a warning.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.constraints.pattern = Some(pattern.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.constraints.max = Some(max);
        self
    }
}

#[derive(Default)]
struct FieldState {
    value: String,
    renderer_value: String,
    checked: bool,
    selected: Vec<String>,
    indeterminate: bool,
    disabled: bool,
    attributes: HashMap<String, String>,
    custom_validity: String,
    widget_error: Option<String>,
    focus_proxy: Option<FieldRef>,
    focused: bool,
    reports: usize,
}

/// A field node living in a [`MemoryTree`].
pub struct MemoryField {
    id: NodeId,
    me: Weak<MemoryField>,
    name: String,
    kind: FieldKind,
    hidden: bool,
    default_value: String,
    default_checked: bool,
    default_selected: Vec<String>,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    min: Option<f64>,
    max: Option<f64>,
    connected: AtomicBool,
    state: Mutex<FieldState>,
    listeners: Mutex<Vec<(ListenerId, EventKind, FieldListener)>>,
    dispatched: Mutex<HashMap<EventKind, usize>>,
}

impl MemoryField {
    fn from_spec(spec: FieldSpec) -> Arc<Self> {
        let pattern = spec.constraints.pattern.as_deref().and_then(|raw| {
            Regex::new(&format!("^(?:{raw})$"))
                .map_err(|err| warn!("ignoring invalid pattern on {}: {err}", spec.name))
                .ok()
        });
        let default_value = match (spec.kind, spec.value) {
            (_, Some(value)) => value,
            (FieldKind::Checkbox | FieldKind::Radio, None) => DEFAULT_CHECKBOX_VALUE.to_string(),
            (_, None) => String::new(),
        };

        Arc::new_cyclic(|me| MemoryField {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            me: me.clone(),
            name: spec.name,
            kind: spec.kind,
            hidden: spec.hidden,
            required: spec.constraints.required,
            min_length: spec.constraints.min_length,
            max_length: spec.constraints.max_length,
            pattern,
            min: spec.constraints.min,
            max: spec.constraints.max,
            connected: AtomicBool::new(true),
            state: Mutex::new(FieldState {
                value: default_value.clone(),
                renderer_value: default_value.clone(),
                checked: spec.checked,
                selected: spec.selected.clone(),
                disabled: spec.disabled,
                attributes: spec.attributes.into_iter().collect(),
                ..FieldState::default()
            }),
            default_value,
            default_checked: spec.checked,
            default_selected: spec.selected,
            listeners: Mutex::new(Vec::new()),
            dispatched: Mutex::new(HashMap::new()),
        })
    }

    fn as_ref_counted(&self) -> Option<FieldRef> {
        self.me.upgrade().map(|me| me as FieldRef)
    }

    // --- user-style interaction ----------------------------------------------------------------

    /// Keystroke: replace the text and fire `Input`.
    pub fn type_text(&self, text: &str) {
        {
            let mut state = lock(&self.state);
            state.value = text.to_string();
            state.renderer_value = text.to_string();
        }
        self.dispatch(EventKind::Input);
    }

    /// Commit the current text (fires `Change`).
    pub fn commit(&self) {
        self.dispatch(EventKind::Change);
    }

    /// Pick a value on a choice or widget field (fires `Change`).
    pub fn choose(&self, value: &str) {
        {
            let mut state = lock(&self.state);
            state.value = value.to_string();
            state.renderer_value = value.to_string();
        }
        self.dispatch(EventKind::Change);
    }

    /// Toggle a checkbox (fires `Change`).
    pub fn click(&self) {
        {
            let mut state = lock(&self.state);
            state.checked = !state.checked;
            state.indeterminate = false;
        }
        self.dispatch(EventKind::Change);
    }

    pub fn blur(&self) {
        lock(&self.state).focused = false;
        self.dispatch(EventKind::Blur);
    }

    // --- binding-side knobs --------------------------------------------------------------------

    pub fn set_disabled(&self, disabled: bool) {
        lock(&self.state).disabled = disabled;
    }

    /// Validity reported by an external widget; `None` means valid.
    pub fn set_widget_error(&self, error: Option<&str>) {
        lock(&self.state).widget_error = error.map(str::to_string);
    }

    pub fn set_focus_proxy(&self, proxy: FieldRef) {
        lock(&self.state).focus_proxy = Some(proxy);
    }

    // --- inspection ----------------------------------------------------------------------------

    /// Value the renderer last observed; untouched by bypass writes.
    pub fn renderer_value(&self) -> String {
        lock(&self.state).renderer_value.clone()
    }

    pub fn dispatch_count(&self, kind: EventKind) -> usize {
        lock(&self.dispatched).get(&kind).copied().unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_focused(&self) -> bool {
        lock(&self.state).focused
    }

    pub fn report_count(&self) -> usize {
        lock(&self.state).reports
    }

    fn native_validity(&self, state: &FieldState) -> Validity {
        if state.disabled {
            return Validity::valid();
        }
        match self.kind {
            FieldKind::Checkbox => {
                if self.required && !state.checked {
                    return Validity::invalid("Please check this box if you want to proceed.");
                }
            }
            FieldKind::Radio => {}
            FieldKind::MultiChoice => {
                if self.required && state.selected.is_empty() {
                    return Validity::invalid("Please select an item in the list.");
                }
            }
            FieldKind::Text | FieldKind::Numeric | FieldKind::SingleChoice | FieldKind::Widget => {
                if let Some(error) = &state.widget_error {
                    return Validity::invalid(error.clone());
                }
                if let Some(message) = self.text_violation(&state.value) {
                    return Validity::invalid(message);
                }
            }
        }
        Validity::valid()
    }

    fn text_violation(&self, value: &str) -> Option<String> {
        if value.is_empty() {
            return self.required.then(|| {
                if self.kind == FieldKind::SingleChoice {
                    "Please select an item in the list.".to_string()
                } else {
                    "Please fill out this field.".to_string()
                }
            });
        }
        let len = value.chars().count();
        if let Some(min) = self.min_length.filter(|min| len < *min) {
            return Some(format!(
                "Please lengthen this text to {min} characters or more (you are currently using {len} characters)."
            ));
        }
        if let Some(max) = self.max_length.filter(|max| len > *max) {
            return Some(format!(
                "Please shorten this text to {max} characters or less (you are currently using {len} characters)."
            ));
        }
        if self.kind == FieldKind::Numeric {
            let Ok(number) = value.trim().parse::<f64>() else {
                return Some("Please enter a number.".to_string());
            };
            if let Some(min) = self.min.filter(|min| number < *min) {
                return Some(format!("Value must be greater than or equal to {min}."));
            }
            if let Some(max) = self.max.filter(|max| number > *max) {
                return Some(format!("Value must be less than or equal to {max}."));
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                return Some("Please match the requested format.".to_string());
            }
        }
        None
    }
}

impl FieldNode for MemoryField {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn value(&self) -> String {
        lock(&self.state).value.clone()
    }

    fn checked(&self) -> bool {
        lock(&self.state).checked
    }

    fn selected(&self) -> Vec<String> {
        lock(&self.state).selected.clone()
    }

    fn default_value(&self) -> String {
        self.default_value.clone()
    }

    fn default_checked(&self) -> bool {
        self.default_checked
    }

    fn default_selected(&self) -> Vec<String> {
        self.default_selected.clone()
    }

    fn is_disabled(&self) -> bool {
        lock(&self.state).disabled
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_visible(&self) -> bool {
        !self.hidden
    }

    fn focus_proxy(&self) -> Option<FieldRef> {
        lock(&self.state).focus_proxy.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        lock(&self.state).attributes.get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: Option<&str>) {
        let mut state = lock(&self.state);
        match value {
            Some(value) => {
                state.attributes.insert(name.to_string(), value.to_string());
            }
            None => {
                state.attributes.remove(name);
            }
        }
    }

    fn validity(&self) -> Validity {
        let state = lock(&self.state);
        let native = self.native_validity(&state);
        if native.valid && !state.custom_validity.is_empty() && !state.disabled {
            return Validity::invalid(state.custom_validity.clone());
        }
        native
    }

    fn set_custom_validity(&self, message: &str) {
        lock(&self.state).custom_validity = message.to_string();
    }

    fn indeterminate(&self) -> bool {
        lock(&self.state).indeterminate
    }

    fn set_indeterminate(&self, indeterminate: bool) {
        lock(&self.state).indeterminate = indeterminate;
    }

    fn set_value(&self, value: &str) {
        lock(&self.state).value = value.to_string();
    }

    fn set_checked(&self, checked: bool) {
        lock(&self.state).checked = checked;
    }

    fn set_selected(&self, values: &[String]) {
        lock(&self.state).selected = values.to_vec();
    }

    fn dispatch(&self, kind: EventKind) {
        *lock(&self.dispatched).entry(kind).or_insert(0) += 1;
        let Some(target) = self.as_ref_counted() else {
            return;
        };
        // Listeners may re-enter this node; call them without holding the lock.
        let listeners: Vec<FieldListener> = lock(&self.listeners)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        let event = FieldEvent { kind, target };
        for listener in listeners {
            listener(&event);
        }
    }

    fn add_listener(&self, kind: EventKind, listener: FieldListener) -> ListenerId {
        let id = next_handle();
        lock(&self.listeners).push((id, kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(lid, _, _)| *lid != id);
    }

    fn focus(&self) {
        lock(&self.state).focused = true;
    }

    fn report_validity(&self) {
        lock(&self.state).reports += 1;
    }
}

/// Error message element.
pub struct MemorySlot {
    id: String,
    text: Mutex<String>,
}

impl MemorySlot {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl ErrorSlot for MemorySlot {
    fn text(&self) -> String {
        lock(&self.text).clone()
    }

    fn set_text(&self, text: &str) {
        *lock(&self.text) = text.to_string();
    }
}

struct Entry {
    field: Arc<MemoryField>,
    section: Option<String>,
}

/// Ordered in-memory field tree.
#[derive(Default)]
pub struct MemoryTree {
    entries: Mutex<Vec<Entry>>,
    slots: Mutex<HashMap<String, Arc<MemorySlot>>>,
    subscribers: Mutex<Vec<(SubscriptionId, ChangeCallback)>>,
}

impl MemoryTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a field outside any section.
    pub fn add(&self, spec: FieldSpec) -> Arc<MemoryField> {
        self.insert(None, vec![spec]).remove(0)
    }

    /// Append a field inside `section`.
    pub fn add_in(&self, section: &str, spec: FieldSpec) -> Arc<MemoryField> {
        self.insert(Some(section), vec![spec]).remove(0)
    }

    /// Append several fields and report them as one structural change.
    pub fn insert(&self, section: Option<&str>, specs: Vec<FieldSpec>) -> Vec<Arc<MemoryField>> {
        let fields: Vec<Arc<MemoryField>> = specs.into_iter().map(MemoryField::from_spec).collect();
        {
            let mut entries = lock(&self.entries);
            entries.extend(fields.iter().map(|field| Entry {
                field: field.clone(),
                section: section.map(str::to_string),
            }));
        }
        self.notify(SubtreeChange {
            added: fields.iter().map(|f| f.clone() as FieldRef).collect(),
            removed: Vec::new(),
        });
        fields
    }

    pub fn remove(&self, field: &MemoryField) {
        self.remove_where(|entry| entry.field.id == field.id);
    }

    /// Remove every field of a section in one structural change.
    pub fn remove_section(&self, section: &str) {
        self.remove_where(|entry| entry.section.as_deref() == Some(section));
    }

    fn remove_where(&self, predicate: impl Fn(&Entry) -> bool) {
        let removed: Vec<Arc<MemoryField>> = {
            let mut entries = lock(&self.entries);
            let (gone, kept): (Vec<Entry>, Vec<Entry>) =
                entries.drain(..).partition(|entry| predicate(entry));
            *entries = kept;
            gone.into_iter().map(|entry| entry.field).collect()
        };
        if removed.is_empty() {
            return;
        }
        for field in &removed {
            field.connected.store(false, Ordering::Release);
        }
        self.notify(SubtreeChange {
            added: Vec::new(),
            removed: removed.into_iter().map(|f| f as FieldRef).collect(),
        });
    }

    /// Check `field` and uncheck its same-named radio siblings, then fire `Change`.
    pub fn pick_radio(&self, field: &MemoryField) {
        for sibling in self.fields_named(&field.name) {
            if sibling.id != field.id {
                sibling.set_checked(false);
            }
        }
        field.set_checked(true);
        field.dispatch(EventKind::Change);
    }

    pub fn add_error_slot(&self, id: impl Into<String>) -> Arc<MemorySlot> {
        let id = id.into();
        let slot = Arc::new(MemorySlot {
            id: id.clone(),
            text: Mutex::new(String::new()),
        });
        lock(&self.slots).insert(id, slot.clone());
        slot
    }

    pub fn section(self: &Arc<Self>, name: impl Into<String>) -> MemorySection {
        MemorySection {
            tree: self.clone(),
            name: name.into(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Arc<MemoryField>> {
        self.fields_named(name).into_iter().next()
    }

    pub fn fields_named(&self, name: &str) -> Vec<Arc<MemoryField>> {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.field.name == name)
            .map(|entry| entry.field.clone())
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn notify(&self, change: SubtreeChange) {
        let callbacks: Vec<ChangeCallback> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(&change);
        }
    }
}

impl Subtree for MemoryTree {
    fn fields(&self) -> Vec<FieldRef> {
        lock(&self.entries)
            .iter()
            .map(|entry| entry.field.clone() as FieldRef)
            .collect()
    }
}

impl SubtreeChangeNotifier for MemoryTree {
    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        let id = next_handle();
        lock(&self.subscribers).push((id, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subscribers).retain(|(sid, _)| *sid != id);
    }
}

impl FormRoot for MemoryTree {
    fn error_slot(&self, id: &str) -> Option<Arc<dyn ErrorSlot>> {
        lock(&self.slots)
            .get(id)
            .map(|slot| slot.clone() as Arc<dyn ErrorSlot>)
    }

    fn notifier(&self) -> &dyn SubtreeChangeNotifier {
        self
    }
}

/// Named section of a [`MemoryTree`], e.g. one wizard step.
#[derive(Clone)]
pub struct MemorySection {
    tree: Arc<MemoryTree>,
    name: String,
}

impl MemorySection {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Subtree for MemorySection {
    fn fields(&self) -> Vec<FieldRef> {
        lock(&self.tree.entries)
            .iter()
            .filter(|entry| entry.section.as_deref() == Some(self.name.as_str()))
            .map(|entry| entry.field.clone() as FieldRef)
            .collect()
    }
}
