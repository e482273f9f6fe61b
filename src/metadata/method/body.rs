//! Mutable representation of a CIL method body.
//!
//! Instructions live in an arena and are addressed through [`InstrId`] handles. The body order
//! is a separate vector of handles, so inserting instructions only shifts entries of that vector:
//! every handle held elsewhere (branch operands, exception region boundaries, anchors found by a
//! matcher) keeps naming the same instruction after the insertion.
//!
//! Each body is stamped with a process-unique id which is embedded into the handles it hands out.
//! A handle taken from one body is therefore recognised as foreign by every other body.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, OpCode};
//! use cilpatch::metadata::{method::MethodBody, TypeSignature};
//!
//! let mut body = MethodBody::new();
//! let first = body.push(Instruction::simple(OpCode::Nop));
//! let ret = body.push(Instruction::simple(OpCode::Ret));
//!
//! let inserted = body.insert_before(ret, vec![Instruction::simple(OpCode::Nop)])?;
//! assert_eq!(body.position_of(inserted[0]), Some(1));
//! assert_eq!(body.position_of(ret), Some(2));
//! assert_eq!(body.next_of(first), Some(inserted[0]));
//!
//! let slot = body.add_local(TypeSignature::R4)?;
//! assert_eq!(slot.index(), 0);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    assembly::{Instruction, Operand},
    metadata::{
        method::{ExceptionHandler, LocalId, LocalVariable},
        typesystem::TypeSignature,
    },
    Error, Result,
};

static NEXT_BODY_ID: AtomicU32 = AtomicU32::new(1);

/// Stable handle of an instruction inside one [`MethodBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId {
    body: u32,
    index: u32,
}

impl InstrId {
    /// Id of the body that issued this handle.
    #[must_use]
    pub fn body(&self) -> u32 {
        self.body
    }

    /// Arena slot of the instruction. This is not its position in body order.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@body{}", self.index, self.body)
    }
}

/// Describes one method that has been compiled to CIL bytecode.
///
/// Holds the ordered instruction stream, the local variable table and the exception handling
/// regions of a method.
pub struct MethodBody {
    id: u32,
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
    locals: Vec<LocalVariable>,
    exception_handlers: Vec<ExceptionHandler>,
    /// Maximum number of items on the operand stack
    pub max_stack: u16,
    /// Flag, indicating to call default constructor on all local variables
    pub init_locals: bool,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBody {
    /// Creates an empty body with a fresh body id.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            id: NEXT_BODY_ID.fetch_add(1, Ordering::Relaxed),
            arena: Vec::new(),
            order: Vec::new(),
            locals: Vec::new(),
            exception_handlers: Vec::new(),
            max_stack: 8,
            init_locals: true,
        }
    }

    /// Process-unique id of this body.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of instructions in the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends an instruction and returns its handle.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.allocate(instruction);
        self.order.push(id);
        id
    }

    fn allocate(&mut self, instruction: Instruction) -> InstrId {
        // Arena slots never exceed u32 for any body a module can describe
        #[allow(clippy::cast_possible_truncation)]
        let id = InstrId {
            body: self.id,
            index: self.arena.len() as u32,
        };
        self.arena.push(instruction);
        id
    }

    /// Returns `true` if the handle was issued by this body.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        id.body == self.id && id.slot() < self.arena.len()
    }

    /// Returns the instruction behind a handle.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        if self.contains(id) {
            self.arena.get(id.slot())
        } else {
            None
        }
    }

    pub(crate) fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        if self.contains(id) {
            self.arena.get_mut(id.slot())
        } else {
            None
        }
    }

    /// Handles in body order.
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// Iterates over the instructions in body order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order.iter().map(|id| (*id, &self.arena[id.slot()]))
    }

    /// Handle of the instruction at the given position in body order.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<InstrId> {
        self.order.get(position).copied()
    }

    /// Position of an instruction in body order.
    #[must_use]
    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Handle of the instruction immediately following `id`.
    #[must_use]
    pub fn next_of(&self, id: InstrId) -> Option<InstrId> {
        self.position_of(id).and_then(|pos| self.at(pos + 1))
    }

    /// Inserts `instructions` immediately before `anchor`, preserving their order.
    ///
    /// No existing handle changes meaning: branch operands and exception region boundaries that
    /// named `anchor` still name `anchor`, so control that jumped to the anchor keeps skipping
    /// the inserted code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAnchor`] if `anchor` was not issued by this body.
    pub fn insert_before<I>(&mut self, anchor: InstrId, instructions: I) -> Result<Vec<InstrId>>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let position = self
            .position_of(anchor)
            .ok_or(Error::InvalidAnchor(anchor))?;

        let inserted: Vec<InstrId> = instructions
            .into_iter()
            .map(|instruction| self.allocate(instruction))
            .collect();
        self.order
            .splice(position..position, inserted.iter().copied());

        Ok(inserted)
    }

    /// Appends a new local variable slot of the given type.
    ///
    /// Existing slots keep their handles. The type is not resolved here; see
    /// [`crate::patch::allocate_local`] for the resolving variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the variable table is full.
    pub fn add_local(&mut self, signature: TypeSignature) -> Result<LocalId> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Local variable table is full"))?;
        let id = LocalId(index);
        self.locals.push(LocalVariable { id, signature });
        Ok(id)
    }

    /// The local variable table.
    #[must_use]
    pub fn locals(&self) -> &[LocalVariable] {
        &self.locals
    }

    /// Returns the local slot behind a handle.
    #[must_use]
    pub fn local(&self, id: LocalId) -> Option<&LocalVariable> {
        self.locals.get(id.index())
    }

    /// The exception handling clauses of this body.
    #[must_use]
    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    /// Adds an exception handling clause.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAnchor`] if a region boundary was not issued by this body.
    pub fn add_exception_handler(&mut self, handler: ExceptionHandler) -> Result<()> {
        if let Some(foreign) = handler.boundaries().find(|id| !self.contains(*id)) {
            return Err(Error::InvalidAnchor(foreign));
        }
        self.exception_handlers.push(handler);
        Ok(())
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |id: &InstrId| match self.position_of(*id) {
            Some(pos) => format!("IL_{pos:04}"),
            None => format!("{id}"),
        };

        for (pos, (_, instruction)) in self.iter().enumerate() {
            write!(f, "IL_{pos:04}: {:<10}", instruction.opcode.mnemonic())?;
            match &instruction.operand {
                Operand::Target(target) => write!(f, " {}", label(target))?,
                Operand::Switch(targets) => {
                    let names: Vec<String> = targets.iter().map(label).collect();
                    write!(f, " ({})", names.join(", "))?;
                }
                Operand::None => {}
                other => write!(f, " {other}")?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
