//! In-memory model of a compiled CIL module.
//!
//! This module holds the mutable representation a patch pass operates on: the module with its
//! types and cross-module references, type names and signatures, method definitions and their
//! bodies. The model mirrors the ECMA-335 concepts the patch engine reasons about without
//! carrying the on-disk table layout; reading and writing PE files is left to the loading and
//! persistence services around the engine.
//!
//! # Key Components
//!
//! - [`Module`] - Types, `TypeRef`/`MemberRef` tables, patch marker tags
//! - [`token::Token`] - Metadata tokens identifying definitions and references
//! - [`TypeName`], [`TypeSignature`], [`SignatureMethod`] - Type identity and signatures
//! - [`method::MethodBody`] - Instruction arena with stable handles, locals, exception regions
//! - [`MemberResolver`] - Token to member name/signature resolution

pub mod method;
pub mod token;

mod module;
mod typesystem;

pub use module::{MemberInfo, MemberReference, MemberResolver, Module, TypeReference};
pub use typesystem::{SignatureMethod, TypeDef, TypeFlavor, TypeName, TypeSignature};
