//! The lightweight tree-node model: one [`Node`] per conceptual surface position.
//!
//! Nodes are immutable by convention once attached to a tree. The only mutable state they
//! carry is realization bookkeeping (the surface [`Handle`] and, for component placeholders,
//! the running instance), which the patch engine owns. Semantic equality ([`PartialEq`])
//! deliberately ignores that bookkeeping.

use crate::adapter::Handle;
use crate::diagnostics::UsageWarning;
use crate::instance::Instance;
use crate::normalize::{self, NormalizeMode, RawList};
use crate::options::Definition;
use crate::registry;
use core::cell::{Cell, RefCell};
use core::fmt;
use hashbrown::HashMap;
use std::rc::Rc;

/// An attribute/prop/event-binding value.
#[derive(Debug, Clone)]
pub enum Value {
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	Handler(Handler),
}
impl PartialEq for Value {
	#[allow(clippy::float_cmp)] // Bit-identical floats are "unchanged" for diffing purposes.
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Handler(a), Value::Handler(b)) => a == b,
			_ => false,
		}
	}
}
impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}
impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}
impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}
impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(value.to_owned())
	}
}
impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(value)
	}
}
impl From<Handler> for Value {
	fn from(value: Handler) -> Self {
		Value::Handler(value)
	}
}

/// An event-binding callback. Compared by identity, like any other binding the platform
/// would have to re-attach.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn()>);
impl Handler {
	pub fn new(callback: impl Fn() + 'static) -> Self {
		Self(Rc::new(callback))
	}

	pub fn invoke(&self) {
		(self.0)()
	}
}
impl PartialEq for Handler {
	#[allow(clippy::vtable_address_comparisons)] // Identity, not content; a false negative only re-binds.
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Handler(..)")
	}
}

/// A primitive identity hint matching a node across renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Str(String),
	Int(i64),
}
impl From<&str> for Key {
	fn from(key: &str) -> Self {
		Key::Str(key.to_owned())
	}
}
impl From<String> for Key {
	fn from(key: String) -> Self {
		Key::Str(key)
	}
}
impl From<i64> for Key {
	fn from(key: i64) -> Self {
		Key::Int(key)
	}
}
impl Key {
	/// Converts a config value into a key. Non-primitive values yield `None`.
	#[must_use]
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Str(s) => Some(Key::Str(s.clone())),
			Value::Int(i) => Some(Key::Int(*i)),
			Value::Float(f) => Some(Key::Str(f.to_string())),
			Value::Bool(b) => Some(Key::Str(b.to_string())),
			Value::Handler(_) => None,
		}
	}
}

/// The configuration map attached to one node: attributes, props and event bindings.
///
/// Must be a fresh object per construction. The reactivity layer marks configs it has taken
/// ownership of as observed; attaching such a config again is the reuse condition reported
/// as [`UsageWarning::ObservedConfigReuse`].
#[derive(Debug, Clone, Default)]
pub struct Config {
	entries: HashMap<String, Value>,
	observed: bool,
}
impl Config {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.entries.insert(key.into(), value.into());
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.entries.insert(key.into(), value.into())
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.entries.get(key)
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.entries.remove(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Marks this config as owned by the reactivity layer. Called by that collaborator, not
	/// by builders.
	pub fn mark_observed(&mut self) {
		self.observed = true;
	}

	#[must_use]
	pub fn is_observed(&self) -> bool {
		self.observed
	}

	/// Extracts the `key` entry, reporting a non-primitive value against `tag`.
	fn take_key(&mut self, tag: &str) -> Option<Key> {
		let value = self.entries.remove("key")?;
		let key = Key::from_value(&value);
		if key.is_none() && cfg!(debug_assertions) {
			registry::report(None, &UsageWarning::NonPrimitiveKey { tag: tag.to_owned() });
		}
		key
	}
}
impl PartialEq for Config {
	fn eq(&self, other: &Self) -> bool {
		self.entries == other.entries
	}
}

#[derive(Debug)]
pub struct ElementNode {
	pub tag: String,
	pub config: Config,
	pub children: Vec<Node>,
	pub key: Option<Key>,
	pub namespace: Option<String>,
	real: Cell<Option<Handle>>,
}

#[derive(Debug)]
pub struct ComponentNode {
	pub def: Definition,
	pub config: Config,
	pub slot_children: Vec<Node>,
	pub key: Option<Key>,
	pub(crate) instance: RefCell<Option<Instance>>,
	real: Cell<Option<Handle>>,
}

#[derive(Debug)]
pub struct TextNode {
	pub text: String,
	real: Cell<Option<Handle>>,
}

#[derive(Debug)]
pub struct CommentNode {
	pub text: String,
	real: Cell<Option<Handle>>,
}

#[derive(Debug, Default)]
pub struct EmptyNode {
	real: Cell<Option<Handle>>,
}

/// One position of the virtual tree.
#[derive(Debug)]
pub enum Node {
	/// A plain surface element with a string tag.
	Element(Box<ElementNode>),
	/// A component placeholder; realized by mounting an [`Instance`] of its definition.
	Component(Box<ComponentNode>),
	Text(TextNode),
	Comment(CommentNode),
	/// Placeholder for "nothing here": falsy tags and empty builds still occupy a position.
	Empty(EmptyNode),
}

impl Node {
	#[must_use]
	pub fn text(content: impl Into<String>) -> Self {
		Node::Text(TextNode {
			text: content.into(),
			real: Cell::new(None),
		})
	}

	#[must_use]
	pub fn comment(content: impl Into<String>) -> Self {
		Node::Comment(CommentNode {
			text: content.into(),
			real: Cell::new(None),
		})
	}

	#[must_use]
	pub fn empty() -> Self {
		Node::Empty(EmptyNode::default())
	}

	/// A plain element from already-normalized children. The `key` entry is lifted out of
	/// `config` into node identity.
	#[must_use]
	pub fn element(tag: impl Into<String>, mut config: Config, children: Vec<Node>) -> Self {
		let tag = tag.into();
		let key = config.take_key(&tag);
		Node::Element(Box::new(ElementNode {
			tag,
			config,
			children,
			key,
			namespace: None,
			real: Cell::new(None),
		}))
	}

	/// Like [`Node::element`], but rendered under `namespace`, which propagates to
	/// descendant elements that do not declare their own.
	#[must_use]
	pub fn element_ns(tag: impl Into<String>, namespace: impl Into<String>, config: Config, children: Vec<Node>) -> Self {
		let mut node = Node::element(tag, config, children);
		apply_namespace(&mut node, &namespace.into());
		node
	}

	/// A placeholder for an instance of `def`. `slot_children` are handed to the instance's
	/// builder, not patched in place.
	#[must_use]
	pub fn component(def: &Definition, mut config: Config, slot_children: Vec<Node>) -> Self {
		let tag = def.name().unwrap_or_else(|| "component".to_owned());
		let key = config.take_key(&tag);
		Node::Component(Box::new(ComponentNode {
			def: def.clone(),
			config,
			slot_children,
			key,
			instance: RefCell::new(None),
			real: Cell::new(None),
		}))
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		match self {
			Node::Element(e) => e.key.as_ref(),
			Node::Component(c) => c.key.as_ref(),
			Node::Text(_) | Node::Comment(_) | Node::Empty(_) => None,
		}
	}

	/// The realized surface handle, once rendered.
	#[must_use]
	pub fn real(&self) -> Option<Handle> {
		match self {
			Node::Element(e) => e.real.get(),
			Node::Component(c) => c.real.get(),
			Node::Text(t) => t.real.get(),
			Node::Comment(c) => c.real.get(),
			Node::Empty(e) => e.real.get(),
		}
	}

	pub(crate) fn set_real(&self, handle: Option<Handle>) {
		match self {
			Node::Element(e) => e.real.set(handle),
			Node::Component(c) => c.real.set(handle),
			Node::Text(t) => t.real.set(handle),
			Node::Comment(c) => c.real.set(handle),
			Node::Empty(e) => e.real.set(handle),
		}
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		matches!(self, Node::Text(_))
	}

	/// Short human-readable description for log and error messages.
	#[must_use]
	pub fn describe(&self) -> String {
		match self {
			Node::Element(e) => format!("<{}>", e.tag),
			Node::Component(c) => format!("component {:?}", c.def.name().unwrap_or_else(|| format!("#{}", c.def.id()))),
			Node::Text(_) => "#text".to_owned(),
			Node::Comment(_) => "#comment".to_owned(),
			Node::Empty(_) => "#empty".to_owned(),
		}
	}
}

impl Clone for Node {
	/// Clones the declarative content with fresh bookkeeping: the clone is unrealized (no
	/// surface handle, no running instance).
	fn clone(&self) -> Self {
		match self {
			Node::Element(e) => Node::Element(Box::new(ElementNode {
				tag: e.tag.clone(),
				config: e.config.clone(),
				children: e.children.clone(),
				key: e.key.clone(),
				namespace: e.namespace.clone(),
				real: Cell::new(None),
			})),
			Node::Component(c) => Node::Component(Box::new(ComponentNode {
				def: c.def.clone(),
				config: c.config.clone(),
				slot_children: c.slot_children.clone(),
				key: c.key.clone(),
				instance: RefCell::new(None),
				real: Cell::new(None),
			})),
			Node::Text(t) => Node::text(t.text.clone()),
			Node::Comment(c) => Node::comment(c.text.clone()),
			Node::Empty(_) => Node::empty(),
		}
	}
}

impl PartialEq for Node {
	/// Semantic comparison of declarative content. Realized handles and running instances
	/// are bookkeeping, not content, and are ignored.
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Node::Element(a), Node::Element(b)) => {
				a.tag == b.tag && a.key == b.key && a.namespace == b.namespace && a.config == b.config && a.children == b.children
			}
			(Node::Component(a), Node::Component(b)) => {
				a.def.id() == b.def.id() && a.key == b.key && a.config == b.config && a.slot_children == b.slot_children
			}
			(Node::Text(a), Node::Text(b)) => a.text == b.text,
			(Node::Comment(a), Node::Comment(b)) => a.text == b.text,
			(Node::Empty(_), Node::Empty(_)) => true,
			_ => false,
		}
	}
}

/// Builds a plain element from heterogeneous raw children, normalizing them under `mode`.
///
/// Best-effort fallbacks keep this total: an observed config or an empty tag produces an
/// [`Node::empty`] placeholder (with a warning for the former) instead of failing the build.
#[must_use]
pub fn build_element(tag: &str, config: Config, children: RawList, mode: NormalizeMode) -> Node {
	if config.is_observed() {
		if cfg!(debug_assertions) {
			registry::report(None, &UsageWarning::ObservedConfigReuse { tag: tag.to_owned() });
		}
		return Node::empty();
	}
	if tag.is_empty() {
		return Node::empty();
	}
	Node::element(tag, config, normalize::normalize(children, mode))
}

/// Tags a subtree with a rendering namespace. Descendant elements keep a namespace of their
/// own; others inherit.
pub fn apply_namespace(node: &mut Node, namespace: &str) {
	if let Node::Element(element) = node {
		if element.namespace.is_none() {
			element.namespace = Some(namespace.to_owned());
			for child in &mut element.children {
				apply_namespace(child, namespace);
			}
		}
	}
}
