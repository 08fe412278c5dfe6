//! # almanac-script
//!
//! Embedded scripting bridge for almanac plugins.
//!
//! This crate provides:
//! - A canonical native value model and its coercion to and from Lua
//! - Capability sets: host constants and overloaded functions exposed to scripts
//! - Script processes: asynchronous, cancellable script executions
//! - A language registry that picks the interpreter by file extension
//!
//! ## Execution Model
//!
//! Every execution gets a fresh interpreter state on its own worker thread.
//! Environment variables and registered capability sets are injected before
//! the script runs; nothing is shared between two executions.
//!
//! ## Capability Binding
//!
//! Capability sets are declared explicitly with [`CapabilitySet::builder`].
//! Calls are resolved against same-named bindings by argument count and by
//! whether every argument coerces to the declared [`ParamType`]s.

pub mod apis;
pub mod binder;
pub mod bridge;
pub mod capability;
pub mod error;
pub mod language;
pub mod process;
pub mod registry;
pub mod value;

pub use capability::{CapabilitySet, CapabilitySetBuilder, FunctionBinding, ParamType};
pub use error::{RuntimeError, RuntimeResult};
pub use language::{LuaLanguage, PluginLanguage, API_SPEC_VERSION};
pub use process::{CancellationFlag, ProcessContext, ProcessState, ScriptProcess};
pub use registry::LanguageRegistry;
pub use value::{NativeMap, NativeValue};
