//! Partial validation of one subtree (a wizard step).
//!
//! Cross-field rules still see the whole model; only touched flags, error
//! presentation and the validity verdict are limited to the scope.

use tracing::debug;

use crate::extract;
use crate::form::FormInner;
use crate::node::{data_fields, FieldNode, FieldRef, Subtree};

pub(crate) fn validate_scope(inner: &FormInner, container: &dyn Subtree) -> bool {
    let scoped = data_fields(container.fields());
    for field in &scoped {
        inner.validation.mark_touched(field.as_ref());
    }

    // Detached forms fall back to the container's own model.
    let model = inner
        .model()
        .unwrap_or_else(|| extract::extract(container.fields(), None));

    let mut first_invalid: Option<&FieldRef> = None;
    for field in scoped.iter().filter(|field| !field.is_disabled()) {
        let message = inner.validation.validate_field(field.as_ref(), &model);
        inner.update_error_ui(field.as_ref(), &message);
        if !message.is_empty() && first_invalid.is_none() {
            first_invalid = Some(field);
        }
    }

    match first_invalid {
        Some(field) => {
            debug!("scope invalid at {}", field.name());
            focus_and_report(field.as_ref());
            false
        }
        None => true,
    }
}

/// Focus `field` (or its visible proxy) and trigger the native report.
pub(crate) fn focus_and_report(field: &dyn FieldNode) {
    match field.focus_proxy().filter(|proxy| proxy.is_visible()) {
        Some(proxy) => proxy.focus(),
        None => field.focus(),
    }
    field.report_validity();
}
