//! # cilpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the cilpatch
//! library. Import it to get quick access to the types needed to run and inspect a patch pass.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilpatch operations
pub use crate::Error;

/// Why a module was skipped
pub use crate::IneligibleReason;

/// The result type used throughout cilpatch
pub use crate::Result;

// ================================================================================================
// Metadata Model
// ================================================================================================

/// Metadata token type for referencing definitions and references
pub use crate::metadata::token::Token;

/// Module, types and signatures
pub use crate::metadata::{
    MemberResolver, Module, SignatureMethod, TypeDef, TypeFlavor, TypeName, TypeSignature,
};

/// Methods, bodies, locals and exception handlers
pub use crate::metadata::method::{
    ExceptionHandler, ExceptionHandlerFlags, InstrId, LocalId, MethodBody, MethodDef, MethodFlags,
};

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and builders
pub use crate::assembly::{
    AnchorPattern, Instruction, InstructionAssembler, InstructionPredicate, OpCode, Operand,
    StackAnalyzer,
};

// ================================================================================================
// Patch Engine
// ================================================================================================

/// Patch configuration, pass and results
pub use crate::patch::{
    IdempotencyGuard, PatchConfig, PatchOutcome, PatchPass, PatchReport, PatchState,
    TextureResolutionPatch,
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Evaluator and hooks for dry runs
pub use crate::emulation::{EmValue, Evaluator, HookRegistry};
