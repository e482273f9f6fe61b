//! Straight-line CIL evaluation with hooked external calls.
//!
//! The patch engine never runs the target program. This module exists to dry-run synthesized
//! instruction blocks: an [`Evaluator`] steps through instructions against local slots and an
//! evaluation stack, and every external call is answered by a [`Hook`] from a
//! [`HookRegistry`]. The [`runtime`] module provides hooks for the members the texture
//! resolution patch calls.
//!
//! # Key Components
//!
//! - [`EmValue`] - Values on the evaluation stack and in local slots
//! - [`Evaluator`] - Executes straight-line instruction sequences
//! - [`Hook`] / [`HookRegistry`] - Native behavior for external methods
//! - [`runtime`] - Stock hooks for `System.Math` and the engine types

mod evaluator;
mod hook;
pub mod runtime;
mod value;

pub use evaluator::Evaluator;
pub use hook::{Hook, HookContext, HookFn, HookRegistry};
pub use value::EmValue;
