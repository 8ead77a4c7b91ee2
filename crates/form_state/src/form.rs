//! `FormEngine`: the public face of one form.
//!
//! The engine holds no copy of field values. Every read walks the attached
//! root, every write goes through the bypass writer, and every validation pass
//! recomputes presentation state from scratch.
//!
//! Typical usage:
//! ```ignore
//! let tree = MemoryTree::new();
//! tree.add(FieldSpec::text("user.email").required());
//!
//! let form = FormEngine::new(FormConfig::default());
//! form.attach(tree.clone());
//! form.set_validators(Validators::new().rule("notAdmin", |v, _, _| {
//!     if v == "admin" { Err("reserved".into()) } else { Ok(()) }
//! }));
//!
//! let submit = form.handle_submit(|model, _event| println!("{model}"));
//! submit.handle(SubmitEvent::new()).await;
//! ```

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FormConfig;
use crate::error::{FormError, Result};
use crate::extract::{self, group_by_name};
use crate::lock;
use crate::node::{
    data_fields, ChangeCallback, EventKind, FieldEvent, FieldKind, FieldListener, FieldNode,
    FieldRef, FormRoot, Subtree, SubtreeChange,
};
use crate::path::{self, FieldPath};
use crate::registry::{self, FieldRegistry};
use crate::scope;
use crate::submit::{SubmitEvent, SubmitHandler};
use crate::validation::{ValidationEngine, Validators};

pub(crate) struct FormInner {
    pub(crate) config: FormConfig,
    root: Mutex<Option<Arc<dyn FormRoot>>>,
    registry: Mutex<FieldRegistry>,
    pub(crate) validation: ValidationEngine,
}

impl FormInner {
    pub(crate) fn root(&self) -> Option<Arc<dyn FormRoot>> {
        lock(&self.root).clone()
    }

    /// Whole-tree model, or `None` while detached.
    pub(crate) fn model(&self) -> Option<Value> {
        self.root().map(|root| extract::extract(root.fields(), None))
    }

    pub(crate) fn update_error_ui(&self, field: &dyn FieldNode, message: &str) {
        let root = self.root();
        self.validation
            .update_error_ui(root.as_deref(), field, message);
    }

    fn validate_now(&self, field: &dyn FieldNode) -> String {
        let model = self.model().unwrap_or(Value::Null);
        self.validation.validate_field(field, &model)
    }

    /// Validate every enabled data field without debounce. Returns overall validity.
    pub(crate) fn revalidate_all(&self) -> bool {
        let Some(root) = self.root() else {
            return true;
        };
        let model = extract::extract(root.fields(), None);
        let mut valid = true;
        for field in data_fields(root.fields()) {
            if field.is_disabled() {
                continue;
            }
            let message = self.validation.validate_field(field.as_ref(), &model);
            self.validation
                .update_error_ui(Some(root.as_ref()), field.as_ref(), &message);
            valid &= message.is_empty();
        }
        valid
    }

    /// Let dispatched notifications propagate before trusting a read.
    pub(crate) async fn settle(&self) {
        for _ in 0..self.config.settle_ticks {
            tokio::task::yield_now().await;
        }
    }

    fn on_field_event(self: &Arc<Self>, event: &FieldEvent) {
        let field = &event.target;

        if field.kind() == FieldKind::Checkbox && event.kind != EventKind::Blur {
            if let Some(root) = self.root() {
                if field.master_of().is_some() {
                    registry::apply_master(field.as_ref(), &root.fields());
                }
                registry::sync_masters(&root.fields());
            }
        }
        if field.master_of().is_some() {
            return;
        }

        let name = field.name();
        match event.kind {
            EventKind::Blur => {
                self.validation.mark_touched(field.as_ref());
                self.validation.cancel(&name);
                let message = self.validate_now(field.as_ref());
                self.update_error_ui(field.as_ref(), &message);
            }
            EventKind::Input | EventKind::Change => {
                if !field.is_marked_invalid() {
                    return;
                }
                let message = self.validate_now(field.as_ref());
                if message.is_empty() {
                    self.validation.cancel(&name);
                    self.update_error_ui(field.as_ref(), "");
                    return;
                }
                let weak = Arc::downgrade(self);
                let target = field.clone();
                let key = name.clone();
                self.validation.debounce(name, move |generation| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.validation.finish(&key, generation) {
                        inner.update_error_ui(target.as_ref(), &message);
                    }
                });
            }
        }
    }

    fn on_structure_change(&self, change: &SubtreeChange) {
        lock(&self.registry).apply_change(change);
        for node in &change.removed {
            self.validation.forget(node.id());
        }
        debug!(
            "structure change: {} added, {} removed",
            change.added.len(),
            change.removed.len()
        );
        if change.touches_checkboxes() {
            if let Some(root) = self.root() {
                registry::sync_masters(&root.fields());
            }
        }
    }

    fn detach(&self) {
        lock(&self.registry).teardown();
        self.validation.cancel_all();
        if lock(&self.root).take().is_some() {
            info!("form detached");
        }
    }
}

impl Drop for FormInner {
    fn drop(&mut self) {
        self.detach();
    }
}

/// One form bound to (at most) one live root.
///
/// Cloning is cheap and yields a handle to the same form.
#[derive(Clone)]
pub struct FormEngine {
    inner: Arc<FormInner>,
}

impl Default for FormEngine {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

impl FormEngine {
    pub fn new(config: FormConfig) -> Self {
        Self {
            inner: Arc::new(FormInner {
                validation: ValidationEngine::new(config.clone()),
                config,
                root: Mutex::new(None),
                registry: Mutex::new(FieldRegistry::new()),
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &Arc<FormInner> {
        &self.inner
    }

    /// Attach to `root`, tearing down any previous root first.
    pub fn attach(&self, root: Arc<dyn FormRoot>) {
        self.inner.detach();

        let weak: Weak<FormInner> = Arc::downgrade(&self.inner);
        let handler: FieldListener = Arc::new(move |event: &FieldEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_field_event(event);
            }
        });
        let weak: Weak<FormInner> = Arc::downgrade(&self.inner);
        let on_change: ChangeCallback = Arc::new(move |change: &SubtreeChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_structure_change(change);
            }
        });

        *lock(&self.inner.root) = Some(root.clone());
        lock(&self.inner.registry).attach(root.clone(), handler, on_change);
        registry::sync_masters(&root.fields());
        info!("form attached ({} fields)", self.registered_count());
    }

    /// Remove all listeners, the structural subscription and pending timers.
    /// Safe to call repeatedly.
    pub fn detach(&self) {
        self.inner.detach();
    }

    pub fn is_attached(&self) -> bool {
        self.inner.root().is_some()
    }

    /// Number of nodes currently carrying engine listeners.
    pub fn registered_count(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    pub fn is_registered(&self, field: &dyn FieldNode) -> bool {
        lock(&self.inner.registry).is_attached(field.id())
    }

    /// Read the model below `prefix` (the whole form for `None` or `""`).
    ///
    /// A prefix equal to one field's name yields that field's value alone.
    /// Returns `Null` while detached or for a malformed prefix.
    pub fn get_value(&self, prefix: Option<&str>) -> Value {
        let Some(root) = self.inner.root() else {
            debug!("get_value on detached form");
            return Value::Null;
        };
        let prefix = match prefix.map(FieldPath::parse_prefix).transpose() {
            Ok(prefix) => prefix,
            Err(err) => {
                warn!("get_value: {err}");
                return Value::Null;
            }
        };
        extract::extract(root.fields(), prefix.as_ref())
    }

    /// First field node named `name`.
    pub fn field(&self, name: &str) -> Option<FieldRef> {
        self.inner
            .root()?
            .fields()
            .into_iter()
            .find(|field| field.name() == name)
    }

    /// Bulk write of a section through the bypass writer.
    ///
    /// `data` is addressed relative to `prefix`; `None` reverts every field in
    /// the section to its default, and so does a path missing from `data`.
    /// Pending debounce timers, touched flags and error presentation of the
    /// rewritten fields are cleared first. Resolves one settle tick after the
    /// last write.
    pub async fn reset_section(&self, prefix: &str, data: Option<&Value>) -> Result<()> {
        let Some(root) = self.inner.root() else {
            debug!("reset_section on detached form");
            return Ok(());
        };
        let prefix_path =
            FieldPath::parse_prefix(prefix).inspect_err(|err| warn!("reset_section: {err}"))?;

        let groups: Vec<_> = group_by_name(root.fields())
            .into_iter()
            .filter(|group| group.path.relative_to(&prefix_path).is_some())
            .collect();
        let single_field =
            !prefix_path.is_empty() && groups.iter().any(|g| g.path == prefix_path);

        if let Some(data) = data {
            if !single_field && !(data.is_object() || data.is_array()) {
                let err = FormError::CorruptPayload {
                    prefix: prefix.to_string(),
                    reason: format!("expected an object, found `{data}`"),
                };
                warn!("reset_section: {err}");
                return Err(err);
            }
        }

        for group in &groups {
            self.inner.validation.cancel(&group.name);
            for node in &group.nodes {
                self.inner.validation.forget(node.id());
                node.set_custom_validity("");
                self.inner
                    .validation
                    .update_error_ui(Some(root.as_ref()), node.as_ref(), "");
            }
        }

        for group in &groups {
            let value = group
                .path
                .relative_to(&prefix_path)
                .and_then(|relative| data.and_then(|data| path::get(data, &relative)));
            match value {
                Some(value) => group.kind().inject(&group.nodes, value),
                None => group.kind().restore_default(&group.nodes),
            }
        }
        debug!("reset_section `{prefix}`: {} names written", groups.len());

        self.inner.settle().await;
        Ok(())
    }

    /// [`FormEngine::reset_section`] with a JSON payload; `null` reverts to defaults.
    pub async fn reset_section_json(&self, prefix: &str, payload: &str) -> Result<()> {
        let data: Value = serde_json::from_str(payload).map_err(|err| {
            warn!("reset_section_json `{prefix}`: {err}");
            FormError::from(err)
        })?;
        let data = (!data.is_null()).then_some(&data);
        self.reset_section(prefix, data).await
    }

    /// Replace the custom rule map.
    pub fn set_validators(&self, validators: Validators) {
        self.inner.validation.set_validators(validators);
    }

    /// Validate one field against the current whole model, without touching
    /// its presentation state.
    pub fn validate_field(&self, field: &dyn FieldNode) -> String {
        self.inner.validate_now(field)
    }

    /// Validate every enabled field immediately and refresh its presentation.
    pub fn revalidate_all(&self) -> bool {
        self.inner.revalidate_all()
    }

    /// Validate only the fields below `container` (e.g. the visible wizard step).
    pub fn validate_scope(&self, container: &dyn Subtree) -> bool {
        scope::validate_scope(&self.inner, container)
    }

    pub fn is_touched(&self, field: &dyn FieldNode) -> bool {
        self.inner.validation.is_touched(field)
    }

    /// Whether a debounced error update is pending for `name`.
    pub fn has_pending_update(&self, name: &str) -> bool {
        self.inner.validation.has_pending(name)
    }

    /// Build a submit handler that calls `on_valid(model, event)` only when the
    /// whole form is valid.
    pub fn handle_submit<F>(&self, on_valid: F) -> SubmitHandler<F>
    where
        F: Fn(Value, &SubmitEvent) + Send + Sync,
    {
        SubmitHandler::new(self.clone(), on_valid)
    }
}
