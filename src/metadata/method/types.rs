//! Method attribute flags and local variable slots.
//!
//! # Key Types
//! - [`MethodFlags`]: The subset of ECMA-335 method attributes the model tracks
//! - [`LocalId`], [`LocalVariable`]: Stable local slot handles and their typed slots

use std::fmt;

use bitflags::bitflags;

use crate::metadata::typesystem::TypeSignature;

bitflags! {
    /// Method attribute flags (ECMA-335 II.23.1.10, `MethodAttributes`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u16 {
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method is special (accessors, constructors)
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RT_SPECIAL_NAME = 0x1000;
    }
}

/// Stable handle of a local variable slot.
///
/// The handle is the slot's index in the method's variable table. Slots are only ever
/// appended, so a handle stays valid for the lifetime of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u16);

impl LocalId {
    /// Returns the slot index.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V_{}", self.0)
    }
}

/// A typed local variable slot, private to one method activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Handle of this slot
    pub id: LocalId,
    /// Type of the slot
    pub signature: TypeSignature,
}
