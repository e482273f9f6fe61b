//! Exception handler representation for CIL method bodies.
//!
//! Region boundaries are instruction handles rather than byte offsets, so inserting code into a
//! body never moves a region: a boundary keeps pointing at the same instruction no matter how
//! many instructions are spliced in front of it.

use bitflags::bitflags;

use crate::metadata::{method::InstrId, token::Token};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining a protected region and its handler.
///
/// # Layout
///
/// ```text
/// try {
///     // try_start .. try_end (exclusive)
/// }
/// catch (catch_type) {
///     // handler_start .. handler_end (exclusive)
/// }
/// ```
///
/// An end boundary of `None` means the region extends to the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected region.
    pub try_start: InstrId,
    /// First instruction after the protected region.
    pub try_end: Option<InstrId>,
    /// First instruction of the handler.
    pub handler_start: InstrId,
    /// First instruction after the handler.
    pub handler_end: Option<InstrId>,
    /// First instruction of the filter block, for filter clauses.
    pub filter_start: Option<InstrId>,
    /// Exception type caught by a typed clause.
    pub catch_type: Option<Token>,
}

impl ExceptionHandler {
    /// Returns `true` if the runtime pushes the exception object when entering the handler.
    #[must_use]
    pub fn pushes_exception(&self) -> bool {
        !self
            .flags
            .intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT)
    }

    /// Iterates over every instruction handle this clause references.
    pub fn boundaries(&self) -> impl Iterator<Item = InstrId> + '_ {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
            self.filter_start,
        ]
        .into_iter()
        .flatten()
    }
}
