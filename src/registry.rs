//! Process-wide bookkeeping: monotonic id counters and the installed diagnostics sink.
//!
//! The core is single-threaded by design, so "process-wide" means thread-local. State is
//! initialized on first use and never torn down; ids are monotonic and never reused.

use crate::diagnostics::{Diagnostics, UsageWarning};
use core::cell::{Cell, RefCell};
use std::rc::Rc;

struct Registry {
	next_instance_id: Cell<u64>,
	next_definition_id: Cell<u64>,
	diagnostics: RefCell<Option<Rc<dyn Diagnostics>>>,
}

thread_local! {
	static REGISTRY: Registry = Registry {
		next_instance_id: Cell::new(1),
		next_definition_id: Cell::new(1),
		diagnostics: RefCell::new(None),
	};
}

/// Issues the next instance id. Ids are assigned in creation order, which makes ascending-id
/// scheduler flushes run ancestors before their descendants.
#[must_use]
pub(crate) fn next_instance_id() -> u64 {
	REGISTRY.with(|r| {
		let id = r.next_instance_id.get();
		r.next_instance_id.set(id + 1);
		id
	})
}

#[must_use]
pub(crate) fn next_definition_id() -> u64 {
	REGISTRY.with(|r| {
		let id = r.next_definition_id.get();
		r.next_definition_id.set(id + 1);
		id
	})
}

/// Installs the diagnostics collaborator that receives [`UsageWarning`]s.
///
/// Without one installed, warnings still go to `tracing` but are otherwise dropped; render
/// behavior is identical either way.
pub fn install_diagnostics(sink: Rc<dyn Diagnostics>) {
	REGISTRY.with(|r| *r.diagnostics.borrow_mut() = Some(sink));
}

/// Removes the installed diagnostics collaborator, if any.
pub fn clear_diagnostics() {
	REGISTRY.with(|r| *r.diagnostics.borrow_mut() = None);
}

/// Reports a non-fatal usage warning against `instance` (if known).
pub(crate) fn report(instance: Option<u64>, warning: &UsageWarning) {
	tracing::warn!(?instance, %warning, "usage warning");
	REGISTRY.with(|r| {
		if let Some(sink) = &*r.diagnostics.borrow() {
			sink.usage_warning(instance, warning);
		}
	});
}
