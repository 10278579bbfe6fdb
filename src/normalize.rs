//! Normalization of heterogeneous builder output into one flat child sequence.
//!
//! Builders hand back whatever is convenient: nodes, primitives, nested lists from repeated
//! expansion, gaps from conditionals. Normalization turns all of that into a flat `Vec<Node>`
//! with adjacent text merged, so the patch engine only ever sees the canonical shape.

use crate::node::{Key, Node};

/// How much normalization the input needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
	/// Input is guaranteed at most one level of nested lists (compiled builder output):
	/// flattening is a single concatenation pass.
	Simple,
	/// Input may be arbitrarily nested (hand-authored builders, repeated expansion):
	/// flattening is recursive, with text merging and key synthesis.
	Full,
}

/// One raw child as produced by a builder, before normalization.
#[derive(Debug, PartialEq)]
pub enum Raw {
	/// A gap, e.g. from a conditional that produced nothing. Dropped silently.
	Nothing,
	/// Booleans are treated as gaps, so `condition && node` patterns cost nothing.
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	Node(Node),
	List(RawList),
}
impl From<Node> for Raw {
	fn from(node: Node) -> Self {
		Raw::Node(node)
	}
}
impl From<&str> for Raw {
	fn from(text: &str) -> Self {
		Raw::Str(text.to_owned())
	}
}
impl From<String> for Raw {
	fn from(text: String) -> Self {
		Raw::Str(text)
	}
}
impl From<i64> for Raw {
	fn from(number: i64) -> Self {
		Raw::Int(number)
	}
}
impl From<f64> for Raw {
	fn from(number: f64) -> Self {
		Raw::Float(number)
	}
}
impl From<bool> for Raw {
	fn from(value: bool) -> Self {
		Raw::Bool(value)
	}
}
impl From<RawList> for Raw {
	fn from(list: RawList) -> Self {
		Raw::List(list)
	}
}

/// An ordered sequence of raw children.
#[derive(Debug, Default, PartialEq)]
pub struct RawList {
	pub items: Vec<Raw>,
	/// Marks output of repeated expansion (list rendering). Element-kind children of a
	/// generated nested list get a synthesized key from their nesting path, so expansion
	/// output stays uniquely identifiable across renders.
	pub generated: bool,
}
impl RawList {
	#[must_use]
	pub fn new(items: Vec<Raw>) -> Self {
		Self { items, generated: false }
	}

	#[must_use]
	pub fn generated(items: Vec<Raw>) -> Self {
		Self { items, generated: true }
	}
}
impl From<Vec<Raw>> for RawList {
	fn from(items: Vec<Raw>) -> Self {
		Self::new(items)
	}
}
impl From<Vec<Node>> for RawList {
	fn from(nodes: Vec<Node>) -> Self {
		Self::new(nodes.into_iter().map(Raw::Node).collect())
	}
}

/// Normalizes `children` into a flat sequence. Total over well-typed input: malformed shapes
/// degrade, they never fail.
#[must_use]
pub fn normalize(children: RawList, mode: NormalizeMode) -> Vec<Node> {
	let mut out = Vec::with_capacity(children.items.len());
	match mode {
		NormalizeMode::Simple => concat_simple(&mut out, children.items),
		NormalizeMode::Full => {
			let generated = children.generated;
			normalize_list(&mut out, children.items, generated, None);
		}
	}
	out
}

/// Normalizes a single raw build result into a root child sequence.
#[must_use]
pub fn normalize_root(raw: Raw, mode: NormalizeMode) -> Vec<Node> {
	match raw {
		Raw::Nothing | Raw::Bool(_) => Vec::new(),
		Raw::Node(node) => vec![node],
		Raw::Str(text) => vec![Node::text(text)],
		Raw::Int(number) => vec![Node::text(number.to_string())],
		Raw::Float(number) => vec![Node::text(number.to_string())],
		Raw::List(list) => normalize(list, mode),
	}
}

/// The single concatenation pass of [`NormalizeMode::Simple`]: no text merging, no key
/// synthesis. One nesting level is the contract; deeper levels are misshapen compiled
/// output and are spliced the same way rather than dropped.
fn concat_simple(out: &mut Vec<Node>, items: Vec<Raw>) {
	for item in items {
		match item {
			Raw::Nothing | Raw::Bool(_) => {}
			Raw::Node(node) => out.push(node),
			Raw::Str(text) => out.push(Node::text(text)),
			Raw::Int(number) => out.push(Node::text(number.to_string())),
			Raw::Float(number) => out.push(Node::text(number.to_string())),
			Raw::List(list) => concat_simple(out, list.items),
		}
	}
}

/// Recursive left-to-right flattening pass. `path` is the nesting path of this list
/// (`None` at the root), used to synthesize keys for generated lists.
fn normalize_list(out: &mut Vec<Node>, items: Vec<Raw>, generated: bool, path: Option<&str>) {
	for (index, item) in items.into_iter().enumerate() {
		match item {
			Raw::Nothing | Raw::Bool(_) => {}
			Raw::Str(text) => push_text(out, &text),
			Raw::Int(number) => push_text(out, &number.to_string()),
			Raw::Float(number) => push_text(out, &number.to_string()),
			Raw::List(list) => {
				let nested_path = format!("{}_{}", path.unwrap_or(""), index);
				let nested_generated = list.generated;
				normalize_list(out, list.items, nested_generated, Some(&nested_path));
			}
			Raw::Node(mut node) => {
				if let Node::Text(text) = &node {
					// Adjacent text nodes merge whether they arrive as nodes or primitives.
					if matches!(out.last(), Some(Node::Text(_))) {
						push_text(out, &text.text);
						continue;
					}
				} else if generated && path.is_some() {
					synthesize_key(&mut node, path.unwrap_or(""), index);
				}
				out.push(node);
			}
		}
	}
}

/// Appends text, merging into an immediately preceding text node. Empty text that has
/// nothing to merge into produces no node.
fn push_text(out: &mut Vec<Node>, text: &str) {
	if let Some(Node::Text(last)) = out.last_mut() {
		last.text.push_str(text);
	} else if !text.is_empty() {
		out.push(Node::text(text));
	}
}

/// Default key for element-kind children of generated nested lists.
fn synthesize_key(node: &mut Node, path: &str, index: usize) {
	let key = match node {
		Node::Element(element) if element.key.is_none() => &mut element.key,
		Node::Component(component) if component.key.is_none() => &mut component.key,
		_ => return,
	};
	*key = Some(Key::Str(format!("__list{}_{}__", path, index)));
}
