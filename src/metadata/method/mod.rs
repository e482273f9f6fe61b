//! Method definitions, bodies, locals and exception handlers.
//!
//! # Key Types
//! - [`MethodDef`] - A method defined by a module type
//! - [`MethodBody`] - Instruction arena with stable [`InstrId`] handles
//! - [`LocalVariable`] / [`LocalId`] - Typed local slots with stable handles
//! - [`ExceptionHandler`] - Protected regions bounded by instruction handles

mod body;
mod exceptions;
mod types;

pub use body::{InstrId, MethodBody};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::{LocalId, LocalVariable, MethodFlags};

use crate::metadata::{token::Token, typesystem::SignatureMethod};

/// A method defined by a type of the module.
pub struct MethodDef {
    /// Token of this method in the owning module's `MethodDef` table
    pub token: Token,
    /// Method name (e.g. `MulTexProc`, `.ctor`, `get_width`)
    pub name: String,
    /// Method attributes
    pub flags: MethodFlags,
    /// Calling convention, return type and parameters
    pub signature: SignatureMethod,
    /// The IL body, `None` for abstract, runtime or extern methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Creates a method without a body. The token is assigned when the owning type is added to
    /// a [`crate::metadata::Module`].
    #[must_use]
    pub fn new(name: impl Into<String>, flags: MethodFlags, signature: SignatureMethod) -> Self {
        MethodDef {
            token: Token::new(0),
            name: name.into(),
            flags,
            signature,
            body: None,
        }
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` if the method declares at least one parameter.
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.signature.params.is_empty()
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }
}
