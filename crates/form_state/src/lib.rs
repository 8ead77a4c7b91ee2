//! Hybrid form-state engine.
//!
//! A live, renderer-owned tree of field nodes is the single source of truth
//! for form data. The engine reconciles it into a path-addressed model on
//! demand, writes values back around renderer interception, and runs a
//! two-tier validation pipeline (native constraints, then custom cross-field
//! rules) with debounced error presentation and scoped validation for
//! wizard-style forms.
//!
//! Modules, leaves first:
//! - [`path`]: path codec (`a.b[0].c` == `a.b.0.c`), model get/set
//! - [`extract`]: tree → model
//! - [`writer`]: native-bypass writes and per-kind injection
//! - `registry`: listener bookkeeping, checkbox masters
//! - `validation`: rule map, validation pass, debounce timers
//! - `scope` / `submit`: partial validation and submit coordination
//! - [`FormEngine`]: public operations
//! - [`memory`]: in-memory platform binding

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod memory;
pub mod node;
pub mod path;
pub mod writer;

mod form;
mod registry;
mod scope;
mod submit;
mod validation;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::FormConfig;
pub use error::{FormError, Result};
pub use form::FormEngine;
pub use node::{FieldKind, FieldNode, FieldRef, FormRoot, Subtree, Validity};
pub use registry::{master_state, MasterState};
pub use submit::{SubmitEvent, SubmitHandler, SubmitOutcome, SubmitPhase};
pub use validation::{RuleFn, Validators};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
