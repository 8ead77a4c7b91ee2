//! Submit coordination.
//!
//! A submit runs `Validating → Resolved`:
//! 1. every field is marked touched and all rules are re-run synchronously
//! 2. the handler yields (`settle_ticks`) so injected custom validity settles
//! 3. whole-tree validity decides between focusing the first invalid field
//!    and calling the success callback with the extracted model

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info};

use crate::extract;
use crate::form::FormEngine;
use crate::lock;
use crate::node::data_fields;
use crate::scope::focus_and_report;

/// The event that triggered a submit.
#[derive(Debug, Default)]
pub struct SubmitEvent {
    submitter: Option<String>,
    default_prevented: AtomicBool,
}

impl SubmitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the control that triggered the submit.
    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    pub fn submitter(&self) -> Option<&str> {
        self.submitter.as_deref()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::Relaxed);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The success callback ran.
    Submitted,
    /// Validation failed; `field` names the first invalid field.
    Blocked { field: String },
    /// No root attached; nothing happened.
    Detached,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubmitPhase {
    #[default]
    Idle,
    Validating,
    Resolved(SubmitOutcome),
}

/// Submit handler returned by [`FormEngine::handle_submit`].
pub struct SubmitHandler<F> {
    form: FormEngine,
    on_valid: F,
    phase: Mutex<SubmitPhase>,
}

impl<F> SubmitHandler<F>
where
    F: Fn(Value, &SubmitEvent) + Send + Sync,
{
    pub(crate) fn new(form: FormEngine, on_valid: F) -> Self {
        Self {
            form,
            on_valid,
            phase: Mutex::new(SubmitPhase::Idle),
        }
    }

    pub fn phase(&self) -> SubmitPhase {
        lock(&self.phase).clone()
    }

    pub async fn handle(&self, event: SubmitEvent) -> SubmitOutcome {
        event.prevent_default();
        *lock(&self.phase) = SubmitPhase::Validating;
        let outcome = self.run(&event).await;
        *lock(&self.phase) = SubmitPhase::Resolved(outcome.clone());
        outcome
    }

    async fn run(&self, event: &SubmitEvent) -> SubmitOutcome {
        let inner = self.form.inner();
        let Some(root) = inner.root() else {
            debug!("submit on detached form ignored");
            return SubmitOutcome::Detached;
        };

        for field in data_fields(root.fields()) {
            inner.validation.mark_touched(field.as_ref());
        }
        inner.revalidate_all();

        inner.settle().await;

        // Re-read: fields may have been inserted while settling.
        let fields = data_fields(root.fields());
        let first_invalid = fields
            .iter()
            .filter(|field| field.is_connected() && !field.is_disabled())
            .find(|field| !field.validity().valid);

        match first_invalid {
            Some(field) => {
                info!("submit blocked by {}", field.name());
                focus_and_report(field.as_ref());
                SubmitOutcome::Blocked {
                    field: field.name(),
                }
            }
            None => {
                let model = extract::extract(root.fields(), None);
                debug!("submit accepted");
                (self.on_valid)(model, event);
                SubmitOutcome::Submitted
            }
        }
    }
}
