//! Two-tier validation: native constraint state first, then custom rules.
//!
//! Custom rules only run when the platform reports the field as natively
//! valid. Error presentation (invalid flag, described-by reference, error slot
//! text) is derived state and is rewritten on every pass.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::FormConfig;
use crate::lock;
use crate::node::{FieldNode, FormRoot, NodeId, ATTR_DESCRIBED_BY, ATTR_INVALID};
use crate::path::{self, FieldPath};

/// A custom rule: `(field value, field, whole model)`.
///
/// `Err(message)` marks the field invalid; an empty message counts as valid.
pub type RuleFn = dyn Fn(&Value, &dyn FieldNode, &Value) -> Result<(), String> + Send + Sync;

/// Rule map supplied by the form owner, keyed by the `data-validation` attribute.
#[derive(Clone, Default)]
pub struct Validators {
    rules: HashMap<String, Arc<RuleFn>>,
}

impl Validators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    ///
    /// ```ignore
    /// let validators = Validators::new().rule("passwordMatch", |value, _field, model| {
    ///     if Some(value) == model.get("pass") { Ok(()) } else { Err("mismatch".into()) }
    /// });
    /// ```
    pub fn rule(
        mut self,
        key: impl Into<String>,
        f: impl Fn(&Value, &dyn FieldNode, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.insert(key, f);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        f: impl Fn(&Value, &dyn FieldNode, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.rules.insert(key.into(), Arc::new(f));
    }

    pub fn get(&self, key: &str) -> Option<Arc<RuleFn>> {
        self.rules.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.rules.keys().collect();
        keys.sort();
        f.debug_struct("Validators").field("rules", &keys).finish()
    }
}

struct PendingTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl PendingTimer {
    fn abort(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// Per-form validation state: rule map, touched set and debounce timers.
pub(crate) struct ValidationEngine {
    config: FormConfig,
    validators: Mutex<Validators>,
    touched: Mutex<HashSet<NodeId>>,
    timers: Mutex<HashMap<String, PendingTimer>>,
    next_generation: AtomicU64,
}

impl ValidationEngine {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            validators: Mutex::new(Validators::default()),
            touched: Mutex::new(HashSet::new()),
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn set_validators(&self, validators: Validators) {
        debug!("installing {} custom rules", validators.len());
        *lock(&self.validators) = validators;
    }

    /// Validate one field against the current model; the empty string means valid.
    pub fn validate_field(&self, field: &dyn FieldNode, model: &Value) -> String {
        field.set_custom_validity("");

        let native = field.validity();
        if !native.valid {
            return native.message;
        }

        let Some(key) = field.rule_key() else {
            return String::new();
        };
        // Clone the rule out so it may call back into the engine.
        let rule = lock(&self.validators).get(&key);
        let Some(rule) = rule else {
            debug!("no custom rule registered for key `{key}` ({})", field.name());
            return String::new();
        };

        let name = field.name();
        let value = FieldPath::parse(&name)
            .ok()
            .and_then(|path| path::get(model, &path).cloned())
            .unwrap_or(Value::Null);

        match rule(&value, field, model) {
            Err(message) if !message.is_empty() => {
                field.set_custom_validity(&message);
                message
            }
            _ => String::new(),
        }
    }

    /// Rewrite the presentation state of `field` for `message`.
    pub fn update_error_ui(
        &self,
        root: Option<&dyn FormRoot>,
        field: &dyn FieldNode,
        message: &str,
    ) {
        let slot_id = self.config.error_slot_id(&field.name());
        if message.is_empty() {
            field.set_attribute(ATTR_INVALID, None);
            field.set_attribute(ATTR_DESCRIBED_BY, None);
        } else {
            field.set_attribute(ATTR_INVALID, Some("true"));
            field.set_attribute(ATTR_DESCRIBED_BY, Some(&slot_id));
        }
        match root.and_then(|root| root.error_slot(&slot_id)) {
            Some(slot) => slot.set_text(message),
            None => trace!("no error slot `{slot_id}`"),
        }
    }

    // --- touched ----------------------------------------------------------------------------

    pub fn mark_touched(&self, field: &dyn FieldNode) {
        lock(&self.touched).insert(field.id());
    }

    pub fn is_touched(&self, field: &dyn FieldNode) -> bool {
        lock(&self.touched).contains(&field.id())
    }

    pub fn forget(&self, id: NodeId) {
        lock(&self.touched).remove(&id);
    }

    // --- debounce ---------------------------------------------------------------------------

    /// Run `apply` after the debounce window, replacing any pending timer for `key`.
    ///
    /// `apply` receives the timer generation and should confirm it with
    /// [`ValidationEngine::finish`] before touching presentation state.
    /// Outside a tokio runtime `apply` runs immediately.
    pub fn debounce<F>(&self, key: String, apply: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            debug!("no async runtime, applying debounced update for `{key}` now");
            self.cancel(&key);
            lock(&self.timers).insert(
                key,
                PendingTimer {
                    generation,
                    handle: None,
                },
            );
            apply(generation);
            return;
        };

        let delay = self.config.debounce();
        trace!("debouncing `{key}` for {delay:?}");
        // Registered before spawning so `finish` always finds this generation.
        let mut timers = lock(&self.timers);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = PendingTimer {
            generation,
            handle: None,
        };
        if let Some(previous) = timers.insert(key.clone(), pending) {
            previous.abort();
        }
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            apply(generation);
        });
        if let Some(timer) = timers.get_mut(&key) {
            timer.handle = Some(handle);
        }
    }

    /// Retire the timer for `key` if `generation` is still the current one.
    pub fn finish(&self, key: &str, generation: u64) -> bool {
        let mut timers = lock(&self.timers);
        match timers.get(key) {
            Some(timer) if timer.generation == generation => {
                timers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, key: &str) {
        if let Some(timer) = lock(&self.timers).remove(key) {
            timer.abort();
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.abort();
        }
    }

    pub fn has_pending(&self, key: &str) -> bool {
        lock(&self.timers).contains_key(key)
    }
}

impl Drop for ValidationEngine {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
