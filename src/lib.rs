#![doc(html_root_url = "https://docs.rs/phloem/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A platform-agnostic virtual-tree reconciliation core.
//!
//! Declarative [`Node`] trees go in; a minimal sequence of mutations against a DOM-like
//! surface comes out, through whatever [`Adapter`] the platform injects. Component
//! definitions merge their configuration along an open-ended derivation chain with
//! identity-keyed caching, and running [`Instance`]s coalesce re-renders through a
//! [`Scheduler`] so each state change costs at most one patch cycle.
//!
//! What this crate deliberately does *not* contain: dependency tracking (call
//! [`Instance::invalidate`] from your reactivity layer), a template compiler (implement
//! [`Builder`]), or surface operations (implement [`Adapter`]).

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod adapter;
pub mod diagnostics;
pub mod error;
pub mod instance;
pub mod node;
pub mod normalize;
pub mod options;
pub mod patch;
pub mod registry;

pub use adapter::{Adapter, Handle};
pub use diagnostics::{Diagnostics, FieldGuard, UsageWarning};
pub use error::{BuildError, CycleError, DefineError, FlushError, PatchError};
pub use instance::{Builder, Instance, Phase, Scheduler};
pub use node::{apply_namespace, build_element, Config, Handler, Key, Node, Value};
pub use normalize::{normalize, normalize_root, NormalizeMode, Raw, RawList};
pub use options::{merge_options, Definition, DeriveMode, Hook, HookKind, Options, Source};
pub use patch::{same_node, Patcher};
pub use registry::{clear_diagnostics, install_diagnostics};
