// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # cilpatch
//!
//! Post-compilation patching of CIL method bodies.
//!
//! `cilpatch` takes an in-memory model of a compiled .NET module, locates a method by name and
//! shape, and splices new instruction sequences into its body at anchor instructions found by
//! structural patterns. Existing instructions, branch targets and exception regions keep their
//! identity, and the evaluation stack stays balanced. Loading modules from disk and writing them
//! back is left to the caller.
//!
//! The crate ships one concrete patch, [`patch::TextureResolutionPatch`], which makes
//! `TBody.MulTexProc` scale texture-space transforms by the size of the active render target.
//!
//! ## Features
//!
//! - **Stable instruction handles** - Method bodies are arenas; inserting never invalidates a handle
//! - **Declarative anchors** - Instruction positions are described as data, not scanning code
//! - **Stack verification** - Bodies are re-checked for stack balance after every patch
//! - **Patch-once guarantee** - Module marker tags make re-running a patch a reported skip
//! - **Dry runs** - A straight-line evaluator executes synthesized blocks against hooked calls
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilpatch::prelude::*;
//! # fn load(name: &str) -> Module { unimplemented!() }
//!
//! let mut game = load("Assembly-CSharp.dll");
//! let engine = load("UnityEngine.dll");
//!
//! let patch = TextureResolutionPatch::new(PatchConfig::default())?;
//! match patch.apply(&mut game, &engine)? {
//!     PatchOutcome::Applied(report) => {
//!         // persist `game`, then record the marker
//!         patch.guard().mark_patched(&mut game);
//!         println!("patched, max_stack now {}", report.max_stack);
//!     }
//!     PatchOutcome::Skipped(reason) => println!("{}: {reason}", patch.name()),
//! }
//! # Ok::<(), cilpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`metadata`] - Module, types, signatures, method bodies and tokens
//! - [`assembly`] - Instructions, the assembler, stack analysis and anchor matching
//! - [`emulation`] - Straight-line evaluation with hooked external calls
//! - [`patch`] - The patch engine
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Standards Compliance
//!
//! Opcode encodings, stack behavior and exception clause semantics follow the **ECMA-335
//! specification** (6th edition), Partition III.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). A module that is not the patch
//! target, or was already patched, yields [`Error::ModuleNotEligible`]; [`Error::is_skip`]
//! separates it from real failures.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilpatch::prelude::*;
///
/// let config = PatchConfig::default();
/// let patch = TextureResolutionPatch::new(config)?;
/// assert!(!patch.can_patch(&Module::new("UnityEngine")));
/// # Ok::<(), cilpatch::Error>(())
/// ```
pub mod prelude;

/// CIL instructions, assembly, stack analysis and anchor matching
///
/// # Key Types
///
/// - [`assembly::Instruction`] - Opcode plus operand
/// - [`assembly::InstructionAssembler`] - Fluent instruction builder with labels
/// - [`assembly::StackAnalyzer`] - Evaluation stack verification over a method body
/// - [`assembly::AnchorPattern`] - Declarative anchor description
pub mod assembly;

/// Straight-line evaluation of instruction blocks
pub mod emulation;

/// The in-memory CIL module model
///
/// # Key Components
///
/// - [`metadata::Module`] - Types, references and patch markers
/// - [`metadata::method::MethodBody`] - Instruction arena with stable handles
/// - [`metadata::token::Token`] - Metadata tokens
pub mod metadata;

/// The texture resolution patch engine
pub mod patch;

/// `cilpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilpatch` Error type
///
/// The single error type of the crate. Skips ([`Error::ModuleNotEligible`]) and failures share
/// it and are told apart with [`Error::is_skip`].
pub use error::{Error, IneligibleReason};
