//! Shared test double: a surface that records every operation the engine asks for.
//!
//! Included from the actual test crates via `mod recording_adapter_;`.

#![allow(dead_code)] // Also compiled standalone as an (empty) test crate.

use phloem::{Adapter, Handle, Node, Value};
use std::collections::HashMap;
use std::num::NonZeroU64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
	Create(String),
	/// First attachment of a fresh node.
	Insert(u64),
	/// Re-attachment of an already-attached node, i.e. a repositioning.
	Move(u64),
	Remove(u64),
	UpdateAttribute(String),
	SetText(String),
}

#[derive(Debug, Default)]
pub struct Realized {
	pub desc: String,
	pub text: String,
	pub attributes: HashMap<String, Value>,
	pub parent: Option<u64>,
	pub children: Vec<u64>,
	pub detached: bool,
}

#[derive(Debug, Default)]
pub struct RecordingAdapter {
	next: u64,
	pub nodes: HashMap<u64, Realized>,
	pub ops: Vec<Op>,
}

pub fn raw(handle: Handle) -> u64 {
	handle.into_raw().get()
}

fn handle(raw: u64) -> Handle {
	Handle::from_raw(NonZeroU64::new(raw).unwrap())
}

impl RecordingAdapter {
	pub fn new() -> Self {
		Self::default()
	}

	/// An out-of-band container node to mount into.
	pub fn root(&mut self) -> Handle {
		self.next += 1;
		self.nodes.insert(
			self.next,
			Realized {
				desc: "#root".to_owned(),
				..Realized::default()
			},
		);
		handle(self.next)
	}

	pub fn clear_ops(&mut self) {
		self.ops.clear();
	}

	pub fn creates(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::Create(_))).count()
	}

	pub fn inserts(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::Insert(_))).count()
	}

	pub fn moves(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::Move(_))).count()
	}

	pub fn removes(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::Remove(_))).count()
	}

	pub fn text_updates(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::SetText(_))).count()
	}

	pub fn attribute_updates(&self) -> usize {
		self.ops.iter().filter(|op| matches!(op, Op::UpdateAttribute(_))).count()
	}

	pub fn children_of(&self, parent: Handle) -> Vec<u64> {
		self.nodes[&raw(parent)].children.clone()
	}

	/// Compact structural rendering for assertions: `<ul>[<li>[one],<li>[two]]`.
	pub fn snapshot(&self, node: Handle) -> String {
		self.snapshot_raw(raw(node))
	}

	fn snapshot_raw(&self, id: u64) -> String {
		let node = &self.nodes[&id];
		if node.desc == "#text" {
			return node.text.clone();
		}
		let children: Vec<String> = node.children.iter().map(|&child| self.snapshot_raw(child)).collect();
		format!("{}[{}]", node.desc, children.join(","))
	}

	fn detach(&mut self, id: u64) {
		let parent = self.nodes.get_mut(&id).unwrap().parent.take();
		if let Some(parent) = parent {
			self.nodes.get_mut(&parent).unwrap().children.retain(|&child| child != id);
		}
	}
}

impl Adapter for RecordingAdapter {
	fn create_node(&mut self, node: &Node) -> Handle {
		self.next += 1;
		let text = match node {
			Node::Text(text) => text.text.clone(),
			Node::Comment(comment) => comment.text.clone(),
			_ => String::new(),
		};
		let desc = node.describe();
		self.nodes.insert(
			self.next,
			Realized {
				desc: desc.clone(),
				text,
				..Realized::default()
			},
		);
		self.ops.push(Op::Create(desc));
		handle(self.next)
	}

	fn insert(&mut self, node: Handle, parent: Handle, reference: Option<Handle>) {
		let id = raw(node);
		let parent_id = raw(parent);
		let attached = self.nodes[&id].parent.is_some();
		self.detach(id);
		let position = {
			let children = &self.nodes[&parent_id].children;
			match reference {
				Some(reference) => children.iter().position(|&child| child == raw(reference)).unwrap_or(children.len()),
				None => children.len(),
			}
		};
		self.nodes.get_mut(&parent_id).unwrap().children.insert(position, id);
		self.nodes.get_mut(&id).unwrap().parent = Some(parent_id);
		self.ops.push(if attached { Op::Move(id) } else { Op::Insert(id) });
	}

	fn remove(&mut self, node: Handle) {
		let id = raw(node);
		self.detach(id);
		self.nodes.get_mut(&id).unwrap().detached = true;
		self.ops.push(Op::Remove(id));
	}

	fn update_attribute(&mut self, node: Handle, key: &str, _old: Option<&Value>, new: Option<&Value>) {
		let attributes = &mut self.nodes.get_mut(&raw(node)).unwrap().attributes;
		match new {
			Some(new) => {
				attributes.insert(key.to_owned(), new.clone());
			}
			None => {
				attributes.remove(key);
			}
		}
		self.ops.push(Op::UpdateAttribute(key.to_owned()));
	}

	fn set_text(&mut self, node: Handle, text: &str) {
		self.nodes.get_mut(&raw(node)).unwrap().text = text.to_owned();
		self.ops.push(Op::SetText(text.to_owned()));
	}

	fn next_sibling(&self, node: Handle) -> Option<Handle> {
		let id = raw(node);
		let parent = self.nodes[&id].parent?;
		let children = &self.nodes[&parent].children;
		let position = children.iter().position(|&child| child == id)?;
		children.get(position + 1).map(|&sibling| handle(sibling))
	}
}
