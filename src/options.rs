//! Component definitions and their configuration resolution.
//!
//! A [`Definition`] is an explicit derivation record: a reference to its base definition, the
//! un-merged own configuration it was derived from, and snapshots that let it notice when an
//! ancestor's resolved configuration changed after the fact (hot reload, late mutation).
//! Derivations are memoized by identity inside each [`Source`], so re-deriving the same pair
//! hands back the cached definition instead of re-merging.

use crate::diagnostics::UsageWarning;
use crate::error::DefineError;
use crate::instance::{Builder, Instance};
use crate::node::Value;
use crate::registry;
use core::cell::{Ref, RefCell};
use core::fmt;
use hashbrown::HashMap;
use std::rc::Rc;

/// Lifecycle hook slots. Hook lists concatenate along the derivation chain,
/// ancestor-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
	/// Configuration resolved, nothing built yet.
	Created,
	/// About to run the builder.
	BeforeBuild,
	/// Tree built, not yet realized.
	Built,
	Mounted,
	BeforeUpdate,
	Updated,
	BeforeDestroy,
	Destroyed,
}

pub type Hook = Rc<dyn Fn(&Instance)>;

/// A definition's resolved configuration: the merge of its whole ancestor chain.
#[derive(Clone, Default)]
pub struct Options {
	pub name: Option<String>,
	/// Concatenated on merge, ancestor hooks first.
	pub hooks: HashMap<HookKind, Vec<Hook>>,
	/// Mapped-asset registry of component definitions, merged with descendant-wins.
	pub components: HashMap<String, Definition>,
	/// Known instance fields, vetted by the pre-build access check.
	pub fields: Vec<String>,
	pub builder: Option<Rc<dyn Builder>>,
	/// Remaining configuration; descendant wins on conflicting keys.
	pub props: HashMap<String, Value>,
}
impl Options {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	#[must_use]
	pub fn with_hook(mut self, kind: HookKind, hook: impl Fn(&Instance) + 'static) -> Self {
		self.hooks.entry(kind).or_default().push(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn with_component(mut self, name: impl Into<String>, def: &Definition) -> Self {
		self.components.insert(name.into(), def.clone());
		self
	}

	#[must_use]
	pub fn with_field(mut self, field: impl Into<String>) -> Self {
		self.fields.push(field.into());
		self
	}

	#[must_use]
	pub fn with_builder(mut self, builder: impl Builder + 'static) -> Self {
		self.builder = Some(Rc::new(builder));
		self
	}

	#[must_use]
	pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.props.insert(key.into(), value.into());
		self
	}
}
impl fmt::Debug for Options {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Options")
			.field("name", &self.name)
			.field("hooks", &self.hooks.iter().map(|(k, v)| (*k, v.len())).collect::<Vec<_>>())
			.field("components", &self.components.keys().collect::<Vec<_>>())
			.field("fields", &self.fields)
			.field("builder", &self.builder.is_some())
			.field("props", &self.props)
			.finish()
	}
}

/// Merges an ancestor's resolved configuration with a descendant's own configuration.
/// Descendant wins on conflicting keys; hook lists concatenate; registries merge per name.
#[must_use]
pub fn merge_options(parent: &Options, child: &Options) -> Options {
	let mut merged = Options {
		name: child.name.clone().or_else(|| parent.name.clone()),
		hooks: parent.hooks.clone(),
		components: parent.components.clone(),
		fields: parent.fields.clone(),
		builder: child.builder.clone().or_else(|| parent.builder.clone()),
		props: parent.props.clone(),
	};
	for (kind, hooks) in &child.hooks {
		merged.hooks.entry(*kind).or_default().extend(hooks.iter().cloned());
	}
	for (name, def) in &child.components {
		merged.components.insert(name.clone(), def.clone());
	}
	for field in &child.fields {
		if !merged.fields.contains(field) {
			merged.fields.push(field.clone());
		}
	}
	for (key, value) in &child.props {
		merged.props.insert(key.clone(), value.clone());
	}
	merged
}

#[allow(clippy::vtable_address_comparisons)] // Identity is the point here.
fn hooks_equal(a: &[Hook], b: &[Hook]) -> bool {
	a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
}

fn builders_equal(a: &Option<Rc<dyn Builder>>, b: &Option<Rc<dyn Builder>>) -> bool {
	match (a, b) {
		(None, None) => true,
		#[allow(clippy::vtable_address_comparisons)]
		(Some(a), Some(b)) => Rc::ptr_eq(a, b),
		_ => false,
	}
}

/// The fields of `latest` that differ from the `sealed` snapshot. `None` when nothing
/// changed. This is how late mutations are recovered without a full re-derivation.
fn modified_between(latest: &Options, sealed: &Options) -> Option<Options> {
	let mut delta = Options::default();
	let mut any = false;
	if latest.name.is_some() && latest.name != sealed.name {
		delta.name = latest.name.clone();
		any = true;
	}
	for (kind, hooks) in &latest.hooks {
		let sealed_hooks = sealed.hooks.get(kind).map_or(&[][..], Vec::as_slice);
		if !hooks_equal(hooks, sealed_hooks) {
			delta.hooks.insert(*kind, hooks.clone());
			any = true;
		}
	}
	for (name, def) in &latest.components {
		if sealed.components.get(name).map_or(true, |sealed_def| sealed_def.id() != def.id()) {
			delta.components.insert(name.clone(), def.clone());
			any = true;
		}
	}
	if latest.fields != sealed.fields {
		delta.fields = latest.fields.clone();
		any = true;
	}
	if !builders_equal(&latest.builder, &sealed.builder) {
		delta.builder = latest.builder.clone();
		any = true;
	}
	for (key, value) in &latest.props {
		if sealed.props.get(key) != Some(value) {
			delta.props.insert(key.clone(), value.clone());
			any = true;
		}
	}
	if any {
		Some(delta)
	} else {
		None
	}
}

/// Folds a change delta back into an own-configuration record.
fn apply_modified(own: &mut Options, delta: &Options) {
	if delta.name.is_some() {
		own.name = delta.name.clone();
	}
	for (kind, hooks) in &delta.hooks {
		own.hooks.insert(*kind, hooks.clone());
	}
	for (name, def) in &delta.components {
		own.components.insert(name.clone(), def.clone());
	}
	if !delta.fields.is_empty() {
		own.fields = delta.fields.clone();
	}
	if delta.builder.is_some() {
		own.builder = delta.builder.clone();
	}
	for (key, value) in &delta.props {
		own.props.insert(key.clone(), value.clone());
	}
}

/// Whether name collisions fail the derivation or degrade to a usage warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveMode {
	Strict,
	Lenient,
}

/// Tag names the platform reserves; component names must not shadow them.
const RESERVED_TAGS: &[&str] = &["component", "slot", "template"];

fn validate_name(name: &str, resolved: &Options) -> Result<(), DefineError> {
	let mut chars = name.chars();
	let valid_start = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
	if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
		return Err(DefineError::InvalidName { name: name.to_owned() });
	}
	if RESERVED_TAGS.contains(&name) {
		return Err(DefineError::ReservedName { name: name.to_owned() });
	}
	if resolved.components.contains_key(name) {
		return Err(DefineError::DuplicateName { name: name.to_owned() });
	}
	Ok(())
}

/// A descendant's own configuration plus its derivation cache.
///
/// The cache is keyed by base-definition id and rides on the source object itself, so it is
/// bounded by the number of distinct `(base, source)` pairs ever derived, not by render
/// count. Entries live for the process lifetime.
pub struct Source {
	own: RefCell<Options>,
	derived: RefCell<HashMap<u64, Definition>>,
}
impl Source {
	#[must_use]
	pub fn new(own: Options) -> Rc<Self> {
		Rc::new(Self {
			own: RefCell::new(own),
			derived: RefCell::new(HashMap::new()),
		})
	}

	#[must_use]
	pub fn own(&self) -> Ref<'_, Options> {
		self.own.borrow()
	}
}
impl fmt::Debug for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Source")
			.field("own", &*self.own.borrow())
			.field("derived", &self.derived.borrow().keys().collect::<Vec<_>>())
			.finish()
	}
}

struct DefInner {
	id: u64,
	/// Current resolved configuration. Replaced wholesale (fresh `Rc`) on every change, so
	/// reference identity doubles as the staleness signal for descendants.
	options: RefCell<Rc<Options>>,
	source: Option<Rc<Source>>,
	super_def: Option<Definition>,
	/// The ancestor resolution this definition last merged against.
	super_snapshot: RefCell<Option<Rc<Options>>>,
	/// Snapshot of the merged result at derivation time, used to detect late own-mutations.
	sealed: RefCell<Options>,
}

/// A component definition: the unit configuration is derived from and instances are built
/// from. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct Definition(Rc<DefInner>);

impl Definition {
	/// A root definition with no ancestors.
	#[must_use]
	pub fn base(options: Options) -> Self {
		let def = Self(Rc::new(DefInner {
			id: registry::next_definition_id(),
			options: RefCell::new(Rc::new(options)),
			source: None,
			super_def: None,
			super_snapshot: RefCell::new(None),
			sealed: RefCell::new(Options::default()),
		}));
		def.register_self();
		*def.0.sealed.borrow_mut() = (**def.0.options.borrow()).clone();
		def
	}

	/// Derives a definition from this base and `source`'s own configuration.
	///
	/// Identity-memoized: a repeat call with the same `(self, source)` pair returns the
	/// cached derivation. Name collisions fail in [`DeriveMode::Strict`] and degrade to a
	/// [`UsageWarning::NameConflict`] in [`DeriveMode::Lenient`].
	pub fn derive(&self, source: &Rc<Source>, mode: DeriveMode) -> Result<Definition, DefineError> {
		if let Some(existing) = source.derived.borrow().get(&self.id()) {
			return Ok(existing.clone());
		}

		let super_resolved = self.resolved_options();
		let name = source.own.borrow().name.clone().or_else(|| super_resolved.name.clone());
		if let Some(name) = &name {
			if let Err(error) = validate_name(name, &super_resolved) {
				match mode {
					DeriveMode::Strict => return Err(error),
					DeriveMode::Lenient => registry::report(None, &UsageWarning::NameConflict { name: name.clone() }),
				}
			}
		}

		let merged = merge_options(&super_resolved, &source.own.borrow());
		let def = Self(Rc::new(DefInner {
			id: registry::next_definition_id(),
			options: RefCell::new(Rc::new(merged)),
			source: Some(source.clone()),
			super_def: Some(self.clone()),
			super_snapshot: RefCell::new(Some(super_resolved)),
			sealed: RefCell::new(Options::default()),
		}));
		def.register_self();
		*def.0.sealed.borrow_mut() = (**def.0.options.borrow()).clone();

		source.derived.borrow_mut().insert(self.id(), def.clone());
		Ok(def)
	}

	/// The current effective configuration, re-merged if an ancestor's resolution changed
	/// since this definition last looked.
	///
	/// A stale ancestor is recovered from precisely: only the fields that were mutated since
	/// derivation (found by diffing against the sealed snapshot) are folded back into the
	/// own configuration before the re-merge, so descendant overrides survive.
	#[must_use]
	pub fn resolved_options(&self) -> Rc<Options> {
		let super_def = match &self.0.super_def {
			None => return self.0.options.borrow().clone(),
			Some(super_def) => super_def,
		};
		let super_now = super_def.resolved_options();
		let stale = {
			let snapshot = self.0.super_snapshot.borrow();
			!matches!(&*snapshot, Some(snapshot) if Rc::ptr_eq(snapshot, &super_now))
		};
		if stale {
			tracing::trace!(id = self.0.id, "ancestor configuration changed; re-merging");
			*self.0.super_snapshot.borrow_mut() = Some(super_now.clone());
			let latest = self.0.options.borrow().clone();
			if let Some(source) = &self.0.source {
				if let Some(delta) = modified_between(&latest, &self.0.sealed.borrow()) {
					apply_modified(&mut source.own.borrow_mut(), &delta);
				}
				let merged = merge_options(&super_now, &source.own.borrow());
				*self.0.options.borrow_mut() = Rc::new(merged);
			}
			self.register_self();
		}
		self.0.options.borrow().clone()
	}

	/// The current resolved configuration as-is, without the staleness walk.
	#[must_use]
	pub fn options(&self) -> Rc<Options> {
		self.0.options.borrow().clone()
	}

	#[must_use]
	pub fn id(&self) -> u64 {
		self.0.id
	}

	#[must_use]
	pub fn name(&self) -> Option<String> {
		self.0.options.borrow().name.clone()
	}

	/// Late configuration mutation (hot-reload path). Replaces the resolved configuration
	/// with a fresh one, which flags every cached descendant derivation as stale.
	pub fn set_prop(&self, key: impl Into<String>, value: impl Into<Value>) {
		let mut options = (**self.0.options.borrow()).clone();
		options.props.insert(key.into(), value.into());
		*self.0.options.borrow_mut() = Rc::new(options);
	}

	/// Registers `def` under `name` in this definition's resolved configuration, late.
	pub fn register_component(&self, name: impl Into<String>, def: &Definition) {
		let mut options = (**self.0.options.borrow()).clone();
		options.components.insert(name.into(), def.clone());
		*self.0.options.borrow_mut() = Rc::new(options);
	}

	/// A named definition references itself from its own registry, enabling recursive use.
	fn register_self(&self) {
		let name = match &self.0.options.borrow().name {
			None => return,
			Some(name) => name.clone(),
		};
		let already = self.0.options.borrow().components.get(&name).map_or(false, |d| d.id() == self.id());
		if !already {
			let mut options = (**self.0.options.borrow()).clone();
			options.components.insert(name, self.clone());
			*self.0.options.borrow_mut() = Rc::new(options);
		}
	}
}
impl fmt::Debug for Definition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.name() {
			Some(name) => write!(f, "Definition#{}({})", self.0.id, name),
			None => write!(f, "Definition#{}", self.0.id),
		}
	}
}
