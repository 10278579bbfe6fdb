//! Dev-mode diagnostics: non-fatal usage warnings and the pre-build field-access check.
//!
//! Everything here is advisory. A missing sink, a warning, or a failed field check never
//! changes what gets rendered; the engine falls back to a best-effort node instead.

use crate::registry;
use hashbrown::HashSet;
use thiserror::Error;

/// Receives non-fatal warning events, keyed by instance id where one is known.
///
/// Installed process-wide via [`registry::install_diagnostics`](crate::registry::install_diagnostics).
pub trait Diagnostics {
	fn usage_warning(&self, instance: Option<u64>, warning: &UsageWarning);
}

/// Non-fatal misuse conditions. Rendering proceeds with a fallback in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum UsageWarning {
	/// A config object already observed by the reactivity layer was attached to a fresh
	/// node. Always create fresh config objects per build; the node is rendered as an empty
	/// placeholder instead.
	#[error("observed config object reused on <{tag}>; build a fresh config per render")]
	ObservedConfigReuse { tag: String },

	/// A `key` entry held a non-primitive value. The key is ignored.
	#[error("non-primitive key on <{tag}>; use a string or number")]
	NonPrimitiveKey { tag: String },

	/// A builder declared a field reference that is not a known instance field.
	#[error("field {name:?} is referenced during build but not declared on the instance")]
	UnknownField { name: String },

	/// A builder referenced an internal-prefix field directly.
	#[error("field {name:?} must be accessed through its declared name; `$`/`_` prefixes are internal")]
	ReservedFieldPrefix { name: String },

	/// A derived definition's name collided with a reserved tag or registered component
	/// (lenient mode).
	#[error("component name {name:?} conflicts with an existing registration")]
	NameConflict { name: String },

	/// A builder produced more than one root node; only the first is used.
	#[error("build produced {count} roots; using the first")]
	MultipleRoots { count: usize },
}

/// Ambient names a builder may reference without declaring them as instance fields.
const ALLOWED_AMBIENT: &[&str] = &["index", "item", "key", "len", "min", "max", "abs", "format", "join", "concat"];

/// Capability-checked lookup table of known instance fields.
///
/// Replaces transparent property interception: the builder declares the fields it reads, and
/// this table vets them before `build` runs. Unknown or internal-prefix names are reported,
/// never rejected.
#[derive(Debug, Clone, Default)]
pub struct FieldGuard {
	known: HashSet<String>,
}
impl FieldGuard {
	#[must_use]
	pub fn new(known: impl IntoIterator<Item = String>) -> Self {
		Self { known: known.into_iter().collect() }
	}

	/// Whether `name` is a declared instance field.
	#[must_use]
	pub fn knows(&self, name: &str) -> bool {
		self.known.contains(name)
	}

	/// Vets one referenced name, reporting against `instance` when it is questionable.
	/// Returns whether the name resolved to a declared field or allowed ambient name.
	pub fn check(&self, instance: Option<u64>, name: &str) -> bool {
		if self.known.contains(name) {
			return true;
		}
		if ALLOWED_AMBIENT.contains(&name) {
			return true;
		}
		if cfg!(debug_assertions) {
			let stripped = name.trim_start_matches(|c| c == '$' || c == '_');
			if stripped != name && self.known.contains(stripped) {
				registry::report(instance, &UsageWarning::ReservedFieldPrefix { name: name.to_owned() });
			} else {
				registry::report(instance, &UsageWarning::UnknownField { name: name.to_owned() });
			}
		}
		false
	}
}
