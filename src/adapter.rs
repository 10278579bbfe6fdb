//! The capability set a platform injects into the [`Patcher`](crate::patch::Patcher).
//!
//! This is the only seam through which the engine reaches the real surface. The engine never
//! holds a surface object itself: it sees opaque [`Handle`]s, issued and owned by the
//! adapter, and asks the adapter for every mutation.

use crate::node::{Node, Value};
use core::num::NonZeroU64;

/// Opaque reference to one realized surface object.
///
/// Handles are issued by the [`Adapter`] and stored back onto [`Node`]s as they are realized.
/// The engine only ever copies and compares them; ownership of whatever they designate stays
/// with the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);
impl Handle {
	/// Wraps a raw non-zero id. Meaningful only to the adapter that issued it.
	#[must_use]
	pub fn from_raw(raw: NonZeroU64) -> Self {
		Self(raw)
	}

	#[must_use]
	pub fn into_raw(self) -> NonZeroU64 {
		self.0
	}
}

/// Surface operations, mirroring a mutable DOM-like tree.
///
/// The patch engine guarantees it calls these proportionally to actual changes: an untouched
/// subtree receives zero calls.
pub trait Adapter {
	/// Creates a shallow surface object for `node` (by tag and namespace for elements, by
	/// content for text and comments) and returns its handle.
	///
	/// Attributes and children are applied by the engine through separate calls, so the
	/// adapter must not inspect `node` beyond its own kind's identity fields.
	fn create_node(&mut self, node: &Node) -> Handle;

	/// Inserts `node` into `parent` before `reference`, or at the end when `reference` is
	/// `None`. Inserting an already-attached node moves it.
	fn insert(&mut self, node: Handle, parent: Handle, reference: Option<Handle>);

	/// Detaches `node` (and implicitly its surface subtree).
	fn remove(&mut self, node: Handle);

	/// Applies one attribute/prop/event-binding change. `old` is `None` on first set, `new`
	/// is `None` on removal.
	fn update_attribute(&mut self, node: Handle, key: &str, old: Option<&Value>, new: Option<&Value>);

	/// Replaces the text content of a text node.
	fn set_text(&mut self, node: Handle, text: &str);

	/// The next sibling of `node`, if any. Used to position moves during keyed
	/// reconciliation.
	fn next_sibling(&self, node: Handle) -> Option<Handle>;
}
