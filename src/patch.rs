//! The patch engine: turns a `(previous, next)` tree pair into a minimal mutation sequence
//! against the surface behind an [`Adapter`].
//!
//! Mutation calls are proportional to actual change, never to tree size: an untouched
//! subtree produces zero adapter calls. Structural invariant violations abort only the
//! affected subtree; siblings keep patching.

use crate::adapter::{Adapter, Handle};
use crate::error::{CycleError, PatchError};
use crate::instance::Instance;
use crate::node::{Config, ElementNode, Key, Node};
use hashbrown::HashMap;
use tracing::{error, trace, trace_span};

/// Whether `a` and `b` describe the same conceptual node, so the surface object can be
/// patched in place instead of replaced.
#[must_use]
pub fn same_node(a: &Node, b: &Node) -> bool {
	match (a, b) {
		(Node::Element(a), Node::Element(b)) => a.tag == b.tag && a.key == b.key && a.namespace == b.namespace,
		(Node::Component(a), Node::Component(b)) => a.def.id() == b.def.id() && a.key == b.key,
		(Node::Text(_), Node::Text(_)) | (Node::Comment(_), Node::Comment(_)) | (Node::Empty(_), Node::Empty(_)) => true,
		_ => false,
	}
}

/// Drives one [`Adapter`]. Holds reusable scratch state so steady-state patching allocates
/// as little as possible.
pub struct Patcher<A: Adapter> {
	adapter: A,
	/// Free list of key-index maps for keyed reconciliation. Maps are taken per child-list
	/// level (reconciliation recurses), cleared on return, and reused ever after.
	scratch_pool: Vec<HashMap<Key, usize>>,
}

impl<A: Adapter> Patcher<A> {
	#[must_use]
	pub fn new(adapter: A) -> Self {
		Self {
			adapter,
			scratch_pool: Vec::new(),
		}
	}

	#[must_use]
	pub fn adapter(&self) -> &A {
		&self.adapter
	}

	pub fn adapter_mut(&mut self) -> &mut A {
		&mut self.adapter
	}

	#[must_use]
	pub fn into_adapter(self) -> A {
		self.adapter
	}

	/// Reconciles `next` against `previous` (or realizes it fresh when `previous` is
	/// `None`), inserting at `mount_target` where insertion context is needed. Returns the
	/// realized handle of `next`.
	pub fn patch(&mut self, previous: Option<&Node>, next: &Node, mount_target: Option<Handle>) -> Result<Handle, PatchError> {
		self.patch_subtree(None, previous, next, mount_target, None)
	}

	pub(crate) fn patch_subtree(
		&mut self,
		owner: Option<&Instance>,
		previous: Option<&Node>,
		next: &Node,
		parent: Option<Handle>,
		reference: Option<Handle>,
	) -> Result<Handle, PatchError> {
		match previous {
			None => self.create_into(owner, next, parent, reference),
			Some(previous) if same_node(previous, next) => self.patch_same(owner, previous, next, parent),
			Some(previous) => {
				let span = trace_span!("replace", from = %previous.describe(), to = %next.describe());
				let _enter = span.enter();
				// Realize the replacement before the old position, then drop the old tree.
				let parent = parent.ok_or(PatchError::MissingMountTarget)?;
				let handle = self.create_into(owner, next, Some(parent), previous.real())?;
				self.remove_node(previous);
				Ok(handle)
			}
		}
	}

	/// Realizes `node` (and its subtree) fresh, inserting into `parent` before `reference`.
	fn create_into(&mut self, owner: Option<&Instance>, node: &Node, parent: Option<Handle>, reference: Option<Handle>) -> Result<Handle, PatchError> {
		match node {
			Node::Component(component) => {
				let span = trace_span!("create_component", def = ?component.def);
				let _enter = span.enter();
				let parent = parent.ok_or(PatchError::MissingMountTarget)?;
				let instance = Instance::new_internal(component, owner);
				match instance.mount_at(self, parent, reference) {
					Ok(handle) => {
						component.instance.replace(Some(instance));
						node.set_real(Some(handle));
						Ok(handle)
					}
					Err(CycleError::Patch(error)) => Err(error),
					Err(CycleError::Build(error)) => {
						// Instance-granular recovery: this position degrades to an empty
						// placeholder and the rest of the tree is unaffected.
						error!(%error, def = ?component.def, "component build failed during first realization");
						instance.teardown_inner(self, false);
						let placeholder = Node::empty();
						let handle = self.adapter.create_node(&placeholder);
						self.adapter.insert(handle, parent, reference);
						node.set_real(Some(handle));
						Ok(handle)
					}
				}
			}
			_ => {
				let handle = self.adapter.create_node(node);
				node.set_real(Some(handle));
				if let Node::Element(element) = node {
					self.update_config(handle, None, &element.config);
					for child in &element.children {
						if let Err(error) = self.create_into(owner, child, Some(handle), None) {
							error!(node = %child.describe(), %error, "skipping unrealizable child");
						}
					}
				}
				if let Some(parent) = parent {
					self.adapter.insert(handle, parent, reference);
				}
				Ok(handle)
			}
		}
	}

	/// Patches `next` onto `previous`'s surface object. Both are the same node per
	/// [`same_node`].
	fn patch_same(&mut self, owner: Option<&Instance>, previous: &Node, next: &Node, parent: Option<Handle>) -> Result<Handle, PatchError> {
		match (previous, next) {
			(Node::Element(prev), Node::Element(nxt)) => {
				let span = trace_span!("patch_element", tag = %prev.tag);
				let _enter = span.enter();
				let handle = previous.real().ok_or_else(|| PatchError::MissingHandle { described: previous.describe() })?;
				next.set_real(Some(handle));
				self.update_config(handle, Some(&prev.config), &nxt.config);
				self.patch_children(owner, handle, &prev.children, &nxt.children);
				Ok(handle)
			}
			(Node::Component(prev), Node::Component(nxt)) => {
				let span = trace_span!("patch_component", def = ?nxt.def);
				let _enter = span.enter();
				let instance = match prev.instance.borrow_mut().take() {
					Some(instance) => instance,
					None => return Err(PatchError::MissingHandle { described: previous.describe() }),
				};
				let result = instance.update_placeholder(self, &nxt.config, &nxt.slot_children);
				let handle = instance.root_handle();
				nxt.instance.replace(Some(instance));
				next.set_real(handle);
				match result {
					Ok(handle) => Ok(handle),
					Err(CycleError::Build(error)) => {
						// The instance kept its previous tree; adopt its old root and let
						// siblings continue.
						error!(%error, "component update failed; previous tree stays authoritative");
						handle.ok_or_else(|| PatchError::MissingHandle { described: next.describe() })
					}
					Err(CycleError::Patch(error)) => Err(error),
				}
			}
			(Node::Text(prev), Node::Text(nxt)) => {
				let handle = previous.real().ok_or_else(|| PatchError::MissingHandle { described: previous.describe() })?;
				next.set_real(Some(handle));
				if prev.text != nxt.text {
					trace!(from = %prev.text, to = %nxt.text, "text update");
					self.adapter.set_text(handle, &nxt.text);
				}
				Ok(handle)
			}
			(Node::Comment(prev), Node::Comment(nxt)) => {
				let handle = previous.real().ok_or_else(|| PatchError::MissingHandle { described: previous.describe() })?;
				next.set_real(Some(handle));
				if prev.text != nxt.text {
					self.adapter.set_text(handle, &nxt.text);
				}
				Ok(handle)
			}
			(Node::Empty(_), Node::Empty(_)) => {
				let handle = previous.real().ok_or_else(|| PatchError::MissingHandle { described: previous.describe() })?;
				next.set_real(Some(handle));
				Ok(handle)
			}
			_ => unreachable!("patch_same requires same_node to hold"),
		}
	}

	/// Key-by-key config diff; one adapter call per actually changed entry.
	fn update_config(&mut self, handle: Handle, old: Option<&Config>, new: &Config) {
		if let Some(old) = old {
			for (key, value) in old.iter() {
				if new.get(key).is_none() {
					self.adapter.update_attribute(handle, key, Some(value), None);
				}
			}
		}
		for (key, value) in new.iter() {
			let old_value = old.and_then(|old| old.get(key));
			if old_value != Some(value) {
				self.adapter.update_attribute(handle, key, old_value, Some(value));
			}
		}
	}

	/// Patches one child pair in place, isolating failures to that subtree.
	fn patch_child(&mut self, owner: Option<&Instance>, previous: &Node, next: &Node, parent: Handle) {
		if let Err(error) = self.patch_same(owner, previous, next, Some(parent)) {
			error!(node = %next.describe(), %error, "subtree patch aborted; siblings continue");
		}
	}

	/// Child-list reconciliation over four walking pointers.
	///
	/// The four comparisons run in this exact order: start/start, end/end, start/end (moved
	/// toward the back), end/start (moved toward the front). Adjacent matches win over the
	/// key-map fallback, which keeps moves minimal for unkeyed same-tag runs.
	fn patch_children(&mut self, owner: Option<&Instance>, parent: Handle, old: &[Node], new: &[Node]) {
		let span = trace_span!("patch_children", old = old.len(), new = new.len());
		let _enter = span.enter();

		let mut old_start = 0_isize;
		let mut old_end = old.len() as isize - 1;
		let mut new_start = 0_isize;
		let mut new_end = new.len() as isize - 1;
		// Old entries matched through the key map; skipped when the pointers reach them.
		let mut consumed = vec![false; old.len()];
		let mut key_map: Option<HashMap<Key, usize>> = None;

		while old_start <= old_end && new_start <= new_end {
			if consumed[old_start as usize] {
				old_start += 1;
				continue;
			}
			if consumed[old_end as usize] {
				old_end -= 1;
				continue;
			}
			let o_start = &old[old_start as usize];
			let o_end = &old[old_end as usize];
			let n_start = &new[new_start as usize];
			let n_end = &new[new_end as usize];

			if same_node(o_start, n_start) {
				self.patch_child(owner, o_start, n_start, parent);
				old_start += 1;
				new_start += 1;
			} else if same_node(o_end, n_end) {
				self.patch_child(owner, o_end, n_end, parent);
				old_end -= 1;
				new_end -= 1;
			} else if same_node(o_start, n_end) {
				// Moved toward the back: re-insert after the current old tail.
				self.patch_child(owner, o_start, n_end, parent);
				if let Some(handle) = n_end.real() {
					let after_tail = o_end.real().and_then(|tail| self.adapter.next_sibling(tail));
					self.adapter.insert(handle, parent, after_tail);
				}
				old_start += 1;
				new_end -= 1;
			} else if same_node(o_end, n_start) {
				// Moved toward the front: re-insert before the current old head.
				self.patch_child(owner, o_end, n_start, parent);
				if let Some(handle) = n_start.real() {
					self.adapter.insert(handle, parent, o_start.real());
				}
				old_end -= 1;
				new_start += 1;
			} else {
				let map = key_map.get_or_insert_with(|| {
					let mut map = self.scratch_pool.pop().unwrap_or_default();
					for index in old_start..=old_end {
						if let Some(key) = old[index as usize].key() {
							map.insert(key.clone(), index as usize);
						}
					}
					map
				});
				let found = match n_start.key() {
					Some(key) => map.get(key).copied().filter(|&index| index >= old_start as usize && index <= old_end as usize),
					None => {
						// Keyless: linear scan of the remaining old range for a same-node
						// candidate.
						let mut found = None;
						for index in old_start as usize..=old_end as usize {
							if !consumed[index] && old[index].key().is_none() && same_node(&old[index], n_start) {
								found = Some(index);
								break;
							}
						}
						found
					}
				};
				match found {
					Some(index) if !consumed[index] && same_node(&old[index], n_start) => {
						self.patch_child(owner, &old[index], n_start, parent);
						consumed[index] = true;
						if let Some(handle) = n_start.real() {
							self.adapter.insert(handle, parent, o_start.real());
						}
					}
					// Not present, or a key reused for a different element: realize fresh
					// before the current old head.
					_ => {
						if let Err(error) = self.create_into(owner, n_start, Some(parent), o_start.real()) {
							error!(node = %n_start.describe(), %error, "skipping unrealizable child");
						}
					}
				}
				new_start += 1;
			}
		}

		if old_start > old_end {
			// Old range exhausted: everything left in the new range is additions, inserted
			// before the node that follows the new range.
			if new_start <= new_end {
				let reference = new.get((new_end + 1) as usize).and_then(Node::real);
				for index in new_start..=new_end {
					if let Err(error) = self.create_into(owner, &new[index as usize], Some(parent), reference) {
						error!(node = %new[index as usize].describe(), %error, "skipping unrealizable child");
					}
				}
			}
		} else if new_start > new_end {
			// New range exhausted: everything left in the old range is removals.
			for index in old_start..=old_end {
				if !consumed[index as usize] {
					self.remove_node(&old[index as usize]);
				}
			}
		}

		if let Some(mut map) = key_map {
			map.clear();
			self.scratch_pool.push(map);
		}
	}

	/// Removes a realized subtree: cascades component teardown, then detaches the root
	/// surface object (which takes its surface subtree with it).
	fn remove_node(&mut self, node: &Node) {
		match node {
			Node::Component(component) => {
				let instance = component.instance.borrow_mut().take();
				if let Some(instance) = instance {
					instance.teardown_inner(self, false);
				}
			}
			Node::Element(element) => self.release_descendants(element),
			_ => {}
		}
		match node.real() {
			Some(handle) => self.adapter.remove(handle),
			None => error!(node = %node.describe(), "removal of a node that was never realized"),
		}
	}

	/// Tears down component instances nested below an element that is about to be detached
	/// wholesale.
	fn release_descendants(&mut self, element: &ElementNode) {
		for child in &element.children {
			match child {
				Node::Component(component) => {
					let instance = component.instance.borrow_mut().take();
					if let Some(instance) = instance {
						instance.teardown_inner(self, false);
					}
				}
				Node::Element(element) => self.release_descendants(element),
				_ => {}
			}
		}
	}
}

impl<A: Adapter + core::fmt::Debug> core::fmt::Debug for Patcher<A> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Patcher")
			.field("adapter", &self.adapter)
			.field("scratch_pool", &self.scratch_pool.len())
			.finish()
	}
}
