//! Field discovery and listener bookkeeping.
//!
//! The registry attaches one set of interaction listeners per node identity,
//! follows structural changes reported by the root's notifier, and owns the
//! checkbox-master reconciliation. Masters never store their own state: it is
//! recomputed from the live group every time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::node::{
    ChangeCallback, FieldKind, FieldListener, FieldNode, FieldRef, FormRoot, ListenerId, NodeId,
    SubscriptionId, SubtreeChange,
};
use crate::writer;

struct Attached {
    node: FieldRef,
    listeners: Vec<ListenerId>,
}

struct Subscription {
    root: Arc<dyn FormRoot>,
    id: SubscriptionId,
}

/// Node → listener map plus the structural-change subscription of one root.
#[derive(Default)]
pub(crate) struct FieldRegistry {
    attached: HashMap<NodeId, Attached>,
    handler: Option<FieldListener>,
    subscription: Option<Subscription>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear down any previous root, subscribe to `root` and attach listeners
    /// to every field already present.
    pub fn attach(
        &mut self,
        root: Arc<dyn FormRoot>,
        handler: FieldListener,
        on_change: ChangeCallback,
    ) {
        self.teardown();

        let id = root.notifier().subscribe(on_change);
        self.handler = Some(handler);
        for node in root.fields() {
            self.attach_node(node);
        }
        debug!("registry attached to root ({} fields)", self.attached.len());
        self.subscription = Some(Subscription { root, id });
    }

    /// Remove every listener and the structural subscription. Idempotent.
    pub fn teardown(&mut self) {
        for (_, attached) in self.attached.drain() {
            for id in attached.listeners {
                attached.node.remove_listener(id);
            }
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.root.notifier().unsubscribe(subscription.id);
            debug!("registry detached from root");
        }
        self.handler = None;
    }

    /// Attach listeners to `node` unless it is already known.
    pub fn attach_node(&mut self, node: FieldRef) -> bool {
        let Some(handler) = &self.handler else {
            return false;
        };
        if self.attached.contains_key(&node.id()) || !node.is_connected() {
            return false;
        }
        let listeners = node
            .kind()
            .listened_events()
            .iter()
            .map(|kind| node.add_listener(*kind, handler.clone()))
            .collect();
        trace!("listening on {} ({})", node.name(), node.kind());
        self.attached.insert(node.id(), Attached { node, listeners });
        true
    }

    pub fn detach_node(&mut self, id: NodeId) -> bool {
        let Some(attached) = self.attached.remove(&id) else {
            return false;
        };
        for listener in attached.listeners {
            attached.node.remove_listener(listener);
        }
        true
    }

    /// Apply one notifier batch incrementally; no full rescan.
    pub fn apply_change(&mut self, change: &SubtreeChange) {
        for node in &change.removed {
            self.detach_node(node.id());
        }
        for node in &change.added {
            self.attach_node(node.clone());
        }
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.attached.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }
}

impl Drop for FieldRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Presentation state of a checkbox master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterState {
    AllChecked,
    NoneChecked,
    /// Indeterminate.
    Partial,
}

/// Derive the master state from the group's live checked flags.
pub fn master_state(members: &[FieldRef]) -> MasterState {
    let checked = members.iter().filter(|m| m.checked()).count();
    match checked {
        0 => MasterState::NoneChecked,
        n if n == members.len() => MasterState::AllChecked,
        _ => MasterState::Partial,
    }
}

/// Checkboxes controlled by a master for `group`.
pub fn group_members(fields: &[FieldRef], group: &str) -> Vec<FieldRef> {
    fields
        .iter()
        .filter(|f| {
            f.kind() == FieldKind::Checkbox && f.master_of().is_none() && f.name() == group
        })
        .cloned()
        .collect()
}

/// Recompute every master's checked/indeterminate presentation.
///
/// Masters are written silently (no notification) so reconciliation never
/// feeds back into the listeners.
pub fn sync_masters(fields: &[FieldRef]) {
    for master in fields.iter() {
        let Some(group) = master.master_of() else {
            continue;
        };
        let (checked, indeterminate) = match master_state(&group_members(fields, &group)) {
            MasterState::AllChecked => (true, false),
            MasterState::NoneChecked => (false, false),
            MasterState::Partial => (false, true),
        };
        master.set_checked(checked);
        master.set_indeterminate(indeterminate);
    }
}

/// Push a master's checked state onto its whole group.
pub fn apply_master(master: &dyn FieldNode, fields: &[FieldRef]) {
    let Some(group) = master.master_of() else {
        return;
    };
    // Captured before writing: each member write reconciles the master again.
    let checked = master.checked();
    for member in group_members(fields, &group) {
        if member.checked() != checked && !member.is_disabled() {
            writer::write_checked(member.as_ref(), checked);
        }
    }
}
