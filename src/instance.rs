//! Running component instances: lifecycle phases, build cycles and coalesced re-renders.
//!
//! An instance owns the previous/next tree pair the patch engine diffs. Ownership is strictly
//! hierarchical: parents own their child instance records, children keep a non-owning
//! back-reference. All sharing is single-threaded (`Rc`/`Cell`), matching the cooperative
//! render model: one cycle runs to completion before the next starts.

use crate::adapter::{Adapter, Handle};
use crate::diagnostics::{FieldGuard, UsageWarning};
use crate::error::{BuildError, CycleError, FlushError};
use crate::node::{ComponentNode, Config, Node, Value};
use crate::normalize::{self, NormalizeMode, Raw, RawList};
use crate::options::{Definition, HookKind, Options};
use crate::patch::Patcher;
use crate::registry;
use core::cell::{Cell, Ref, RefCell};
use core::fmt;
use hashbrown::HashSet;
use std::rc::{Rc, Weak};
use tracing::{trace, trace_span, warn};

/// Lifecycle phases. `Updating` loops back to `Mounted` after every committed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Constructed,
	Configuring,
	/// Tree built, not yet realized on the surface.
	PreMount,
	Mounted,
	Updating,
	Unmounting,
	Destroyed,
}

/// The build collaborator: produces the raw child input for one render cycle.
///
/// Compiled builders may override [`normalize_mode`](Builder::normalize_mode) to
/// [`NormalizeMode::Simple`], since their output is guaranteed at most one nesting level.
pub trait Builder {
	fn build(&self, instance: &Instance) -> Result<Raw, BuildError>;

	/// Field names this builder will read from the instance, vetted before `build` runs.
	fn referenced_fields(&self) -> Vec<String> {
		Vec::new()
	}

	fn normalize_mode(&self) -> NormalizeMode {
		NormalizeMode::Full
	}
}

impl<F> Builder for F
where
	F: Fn(&Instance) -> Result<Raw, BuildError>,
{
	fn build(&self, instance: &Instance) -> Result<Raw, BuildError> {
		self(instance)
	}
}

struct InstanceInner {
	id: u64,
	def: Definition,
	options: RefCell<Rc<Options>>,
	/// Placeholder config (props and bindings handed down by the parent tree).
	config: RefCell<Config>,
	slot_children: RefCell<Vec<Node>>,
	phase: Cell<Phase>,
	previous_tree: RefCell<Option<Node>>,
	parent: RefCell<Weak<InstanceInner>>,
	children: RefCell<Vec<Instance>>,
	/// Surface parent captured at mount; the insertion context for root replacement.
	mount_parent: Cell<Option<Handle>>,
	dirty: Cell<bool>,
	guard: FieldGuard,
}

/// One running component. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct Instance {
	inner: Rc<InstanceInner>,
}

impl Instance {
	/// The general instantiation path: resolves the definition's effective configuration
	/// through the full ancestor walk.
	#[must_use]
	pub fn new(def: &Definition) -> Self {
		let options = def.resolved_options();
		Self::instantiate(def, options, Config::new(), Vec::new(), None)
	}

	/// The internal instantiation path used for component placeholders: copies the
	/// already-resolved fields straight from the placeholder descriptor, skipping the
	/// general merge.
	pub(crate) fn new_internal(placeholder: &ComponentNode, parent: Option<&Instance>) -> Self {
		let options = placeholder.def.options();
		Self::instantiate(
			&placeholder.def,
			options,
			placeholder.config.clone(),
			placeholder.slot_children.clone(),
			parent,
		)
	}

	fn instantiate(def: &Definition, options: Rc<Options>, config: Config, slot_children: Vec<Node>, parent: Option<&Instance>) -> Self {
		let id = registry::next_instance_id();
		let span = trace_span!("instantiate", id, def = ?def);
		let _enter = span.enter();

		let known = options.fields.iter().cloned().chain(options.props.keys().cloned()).chain(config.iter().map(|(k, _)| k.to_owned()));
		let instance = Self {
			inner: Rc::new(InstanceInner {
				id,
				def: def.clone(),
				guard: FieldGuard::new(known),
				options: RefCell::new(options),
				config: RefCell::new(config),
				slot_children: RefCell::new(slot_children),
				phase: Cell::new(Phase::Constructed),
				previous_tree: RefCell::new(None),
				parent: RefCell::new(Weak::new()),
				children: RefCell::new(Vec::new()),
				mount_parent: Cell::new(None),
				dirty: Cell::new(false),
			}),
		};
		instance.inner.phase.set(Phase::Configuring);
		if let Some(parent) = parent {
			*instance.inner.parent.borrow_mut() = Rc::downgrade(&parent.inner);
			parent.inner.children.borrow_mut().push(instance.clone());
		}
		instance.call_hook(HookKind::Created);
		instance
	}

	#[must_use]
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.inner.phase.get()
	}

	#[must_use]
	pub fn definition(&self) -> &Definition {
		&self.inner.def
	}

	#[must_use]
	pub fn options(&self) -> Rc<Options> {
		self.inner.options.borrow().clone()
	}

	#[must_use]
	pub fn config(&self) -> Ref<'_, Config> {
		self.inner.config.borrow()
	}

	#[must_use]
	pub fn slot_children(&self) -> Ref<'_, Vec<Node>> {
		self.inner.slot_children.borrow()
	}

	/// Looks up `key` in the placeholder config first, then in the resolved props.
	#[must_use]
	pub fn prop(&self, key: &str) -> Option<Value> {
		if let Some(value) = self.inner.config.borrow().get(key) {
			return Some(value.clone());
		}
		self.inner.options.borrow().props.get(key).cloned()
	}

	#[must_use]
	pub fn previous_tree(&self) -> Ref<'_, Option<Node>> {
		self.inner.previous_tree.borrow()
	}

	/// The realized handle of this instance's root, once mounted.
	#[must_use]
	pub fn root_handle(&self) -> Option<Handle> {
		self.inner.previous_tree.borrow().as_ref().and_then(Node::real)
	}

	#[must_use]
	pub fn parent_id(&self) -> Option<u64> {
		self.inner.parent.borrow().upgrade().map(|parent| parent.id)
	}

	/// Element construction for hand-authored builders: resolves `tag` against the
	/// component registry before falling back to a plain element. Total; misuse degrades to
	/// an empty placeholder.
	#[must_use]
	pub fn create_element(&self, tag: &str, config: Config, children: RawList) -> Node {
		if config.is_observed() {
			if cfg!(debug_assertions) {
				registry::report(Some(self.id()), &UsageWarning::ObservedConfigReuse { tag: tag.to_owned() });
			}
			return Node::empty();
		}
		if tag.is_empty() {
			return Node::empty();
		}
		let def = self.inner.options.borrow().components.get(tag).cloned();
		match def {
			Some(def) => Node::component(&def, config, normalize::normalize(children, NormalizeMode::Full)),
			None => Node::element(tag, config, normalize::normalize(children, NormalizeMode::Full)),
		}
	}

	/// Realizes the instance under `target`. `Configuring → PreMount → Mounted`.
	pub fn mount<A: Adapter>(&self, patcher: &mut Patcher<A>, target: Handle) -> Result<Handle, CycleError> {
		self.mount_at(patcher, target, None)
	}

	pub(crate) fn mount_at<A: Adapter>(&self, patcher: &mut Patcher<A>, parent: Handle, reference: Option<Handle>) -> Result<Handle, CycleError> {
		let span = trace_span!("mount", id = self.inner.id);
		let _enter = span.enter();

		let tree = self.build_tree()?;
		self.inner.phase.set(Phase::PreMount);
		self.inner.mount_parent.set(Some(parent));
		let handle = patcher.patch_subtree(Some(self), None, &tree, Some(parent), reference)?;
		*self.inner.previous_tree.borrow_mut() = Some(tree);
		self.inner.phase.set(Phase::Mounted);
		self.call_hook(HookKind::Mounted);
		Ok(handle)
	}

	/// One update cycle: build a fresh tree, diff it against the previous one, commit.
	///
	/// A builder failure propagates without committing anything: the previous tree stays
	/// authoritative and the instance returns to `Mounted`.
	pub fn rerender<A: Adapter>(&self, patcher: &mut Patcher<A>) -> Result<Handle, CycleError> {
		if self.phase() != Phase::Mounted {
			return Err(BuildError::new(format!("instance {} is not mounted", self.inner.id)).into());
		}
		let span = trace_span!("rerender", id = self.inner.id);
		let _enter = span.enter();

		self.call_hook(HookKind::BeforeUpdate);
		self.inner.phase.set(Phase::Updating);
		let new_tree = match self.build_tree() {
			Ok(tree) => tree,
			Err(error) => {
				self.inner.phase.set(Phase::Mounted);
				return Err(error.into());
			}
		};

		let previous = self.inner.previous_tree.borrow_mut().take();
		let result = patcher.patch_subtree(Some(self), previous.as_ref(), &new_tree, self.inner.mount_parent.get(), None);
		match result {
			Ok(handle) => {
				*self.inner.previous_tree.borrow_mut() = Some(new_tree);
				self.inner.phase.set(Phase::Mounted);
				self.call_hook(HookKind::Updated);
				Ok(handle)
			}
			Err(error) => {
				*self.inner.previous_tree.borrow_mut() = previous;
				self.inner.phase.set(Phase::Mounted);
				Err(error.into())
			}
		}
	}

	/// Re-entry point for the patch engine when a placeholder for this instance is patched
	/// in place: adopt the new config and slots, re-render only if they actually changed.
	pub(crate) fn update_placeholder<A: Adapter>(&self, patcher: &mut Patcher<A>, config: &Config, slots: &[Node]) -> Result<Handle, CycleError> {
		let changed = { *self.inner.config.borrow() != *config || self.inner.slot_children.borrow().as_slice() != slots };
		if !changed {
			return self.root_handle().ok_or_else(|| BuildError::new(format!("instance {} lost its realized root", self.inner.id)).into());
		}
		*self.inner.config.borrow_mut() = config.clone();
		*self.inner.slot_children.borrow_mut() = slots.to_vec();
		self.rerender(patcher)
	}

	/// Marks this instance dirty with the given scheduler. The reactivity collaborator's
	/// entry point.
	pub fn invalidate(&self, scheduler: &Scheduler) {
		scheduler.queue_update(self);
	}

	/// Cascading destruction: children first, then this instance's surface subtree.
	pub fn teardown<A: Adapter>(&self, patcher: &mut Patcher<A>) {
		self.teardown_inner(patcher, true);
	}

	pub(crate) fn teardown_inner<A: Adapter>(&self, patcher: &mut Patcher<A>, remove_surface: bool) {
		if matches!(self.phase(), Phase::Unmounting | Phase::Destroyed) {
			return;
		}
		let span = trace_span!("teardown", id = self.inner.id);
		let _enter = span.enter();

		self.call_hook(HookKind::BeforeDestroy);
		self.inner.phase.set(Phase::Unmounting);
		// Children release their hooks and records only; the surface subtree goes away
		// with this instance's root removal.
		let children = self.inner.children.borrow_mut().split_off(0);
		for child in children {
			child.teardown_inner(patcher, false);
		}
		if remove_surface {
			if let Some(handle) = self.root_handle() {
				patcher.adapter_mut().remove(handle);
			}
		}
		*self.inner.previous_tree.borrow_mut() = None;
		self.inner.mount_parent.set(None);
		self.inner.phase.set(Phase::Destroyed);
		self.call_hook(HookKind::Destroyed);

		if let Some(parent) = self.inner.parent.borrow().upgrade() {
			parent.children.borrow_mut().retain(|sibling| sibling.id() != self.id());
		}
		*self.inner.parent.borrow_mut() = Weak::new();
	}

	fn call_hook(&self, kind: HookKind) {
		let hooks = self.inner.options.borrow().hooks.get(&kind).cloned().unwrap_or_default();
		for hook in hooks {
			hook(self);
		}
	}

	/// Runs the field-access validation pass, the pre/post build hooks and the builder, and
	/// normalizes the result down to a single root.
	fn build_tree(&self) -> Result<Node, BuildError> {
		let builder = self.inner.options.borrow().builder.clone();
		let builder = builder.ok_or_else(|| BuildError::new(format!("instance {} has no builder", self.inner.id)))?;

		if cfg!(debug_assertions) {
			for name in builder.referenced_fields() {
				let _ = self.inner.guard.check(Some(self.id()), &name);
			}
		}

		self.call_hook(HookKind::BeforeBuild);
		let raw = builder.build(self)?;
		self.call_hook(HookKind::Built);

		let mut roots = normalize::normalize_root(raw, builder.normalize_mode());
		if roots.len() > 1 {
			if cfg!(debug_assertions) {
				registry::report(Some(self.id()), &UsageWarning::MultipleRoots { count: roots.len() });
			}
			roots.truncate(1);
		}
		Ok(roots.pop().unwrap_or_else(Node::empty))
	}
}

impl fmt::Debug for Instance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("id", &self.inner.id)
			.field("def", &self.inner.def)
			.field("phase", &self.phase())
			.field("dirty", &self.inner.dirty.get())
			.finish()
	}
}

/// Coalesces re-render requests and flushes them in ancestor-before-descendant order.
///
/// At most one pending entry exists per instance; requests against instances that are torn
/// down before the flush are dropped, so no patch ever runs against a dead instance. The
/// embedder owns the flush point: requests wait until [`flush`](Scheduler::flush) is called.
#[derive(Debug, Default)]
pub struct Scheduler {
	queue: RefCell<Vec<Instance>>,
	queued: RefCell<HashSet<u64>>,
	flushing: Cell<bool>,
}

impl Scheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests a re-render of `instance` at the next flush. Repeat requests coalesce.
	pub fn queue_update(&self, instance: &Instance) {
		if matches!(instance.phase(), Phase::Unmounting | Phase::Destroyed) {
			trace!(id = instance.id(), "ignoring update request for dead instance");
			return;
		}
		if !self.queued.borrow_mut().insert(instance.id()) {
			return;
		}
		instance.inner.dirty.set(true);
		self.queue.borrow_mut().push(instance.clone());
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.queue.borrow().len()
	}

	/// Runs every coalesced re-render. Instance ids are monotonic by creation, so ascending
	/// order commits parents before re-evaluating children they may have replaced. Requests
	/// queued *during* the flush (by hooks or builders) are drained in the same flush.
	pub fn flush<A: Adapter>(&self, patcher: &mut Patcher<A>) -> Result<(), FlushError> {
		if self.flushing.replace(true) {
			warn!("re-entrant flush ignored");
			return Ok(());
		}
		let mut failures = Vec::new();
		loop {
			let mut batch = self.queue.borrow_mut().split_off(0);
			if batch.is_empty() {
				break;
			}
			batch.sort_by_key(Instance::id);
			for instance in batch {
				self.queued.borrow_mut().remove(&instance.id());
				instance.inner.dirty.set(false);
				if instance.phase() != Phase::Mounted {
					trace!(id = instance.id(), phase = ?instance.phase(), "skipping non-mounted instance at flush");
					continue;
				}
				if let Err(error) = instance.rerender(patcher) {
					failures.push((instance.id(), error));
				}
			}
		}
		self.flushing.set(false);
		if failures.is_empty() {
			Ok(())
		} else {
			Err(FlushError { failures })
		}
	}
}
