//! The texture resolution patch engine.
//!
//! A patch pass takes the loaded game module and the read-only engine module, finds
//! `TBody.MulTexProc`, and injects code that scales the method's texture-space transforms by the
//! size of the active render target relative to a reference size.
//!
//! # Components
//!
//! - [`PatchConfig`] - Target names and the reference size
//! - [`IdempotencyGuard`] - Module identity and patch marker checks
//! - [`MemberRegistry`] - Declared external members, resolved against the dependency module
//! - [`allocate_local`] - Adds typed locals to a compiled body
//! - [`synthesizer`] - Builds the ratio and scale instruction blocks
//! - [`Splicer`] - Inserts blocks before anchor instructions
//! - [`TextureResolutionPatch`] / [`PatchPass`] - Runs the pass as a state machine
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilpatch::patch::{PatchConfig, TextureResolutionPatch};
//! # fn modules() -> (cilpatch::metadata::Module, cilpatch::metadata::Module) { unimplemented!() }
//!
//! let (mut game, engine) = modules();
//! let patch = TextureResolutionPatch::new(PatchConfig::default())?;
//! if patch.can_patch(&game) {
//!     let report = patch.patch(&mut game, &engine)?;
//!     println!("{} instructions added", report.ratio_splice.inserted.len());
//! }
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod allocator;
mod config;
mod guard;
mod orchestrator;
mod registry;
mod splicer;
pub mod synthesizer;

pub use allocator::allocate_local;
pub use config::{PatchConfig, PATCH_NAME};
pub use guard::IdempotencyGuard;
pub use orchestrator::{PatchOutcome, PatchPass, PatchReport, PatchState, TextureResolutionPatch};
pub use registry::{ExternalMember, MemberKey, MemberRegistry, MemberSource, ResolvedMembers};
pub use splicer::{SpliceRecord, Splicer};
