//! Failure taxonomy of the reconciliation core.
//!
//! Non-fatal conditions (misused config objects, questionable keys and the like) are not
//! errors: they are [`UsageWarning`](crate::diagnostics::UsageWarning)s reported through the
//! installed diagnostics sink, and rendering proceeds with a best-effort fallback.

use thiserror::Error;

/// A builder invocation failed.
///
/// Fatal to the current render cycle only: the instance keeps its previous tree and stays in
/// its last stable phase, so the surface is never left with a partially-committed tree.
#[derive(Debug, Error)]
#[error("tree build failed: {message}")]
pub struct BuildError {
	message: String,
}
impl BuildError {
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// A structural invariant did not hold while patching.
///
/// These should not occur from well-formed input. The engine aborts the affected subtree,
/// reports, and continues with sibling subtrees.
#[derive(Debug, Error)]
pub enum PatchError {
	/// A node scheduled for in-place patching carries no realized handle.
	#[error("missing realized handle while patching {described} in place")]
	MissingHandle {
		/// Debug description of the affected node.
		described: String,
	},

	/// A replacement or first realization had no surface parent to insert into.
	#[error("no mount target available to realize the tree")]
	MissingMountTarget,
}

/// Deriving a component definition failed (strict mode only; lenient mode downgrades all of
/// these to usage warnings).
#[derive(Debug, Error)]
pub enum DefineError {
	#[error("invalid component name {name:?}")]
	InvalidName { name: String },

	#[error("component name {name:?} conflicts with a reserved tag")]
	ReservedName { name: String },

	#[error("component name {name:?} is already registered in this chain")]
	DuplicateName { name: String },
}

/// Any failure of a single render cycle.
#[derive(Debug, Error)]
pub enum CycleError {
	#[error(transparent)]
	Build(#[from] BuildError),

	#[error(transparent)]
	Patch(#[from] PatchError),
}

/// One or more coalesced re-renders failed during a scheduler flush.
///
/// Failures are instance-granular: every other queued instance still flushed.
#[derive(Debug, Error)]
#[error("{} instance update(s) failed during flush", .failures.len())]
pub struct FlushError {
	/// `(instance id, failure)` for each failed cycle.
	pub failures: Vec<(u64, CycleError)>,
}
