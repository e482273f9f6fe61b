//! Declarative anchor patterns over method bodies.
//!
//! An [`AnchorPattern`] is data: a name and an ordered list of [`AnchorStep`]s. Locating a pattern
//! walks a cursor through the body in order. [`AnchorStep::Find`] moves the cursor to the first
//! instruction at or after it that satisfies an [`InstructionPredicate`]; [`AnchorStep::Next`]
//! moves it to the immediately following instruction. The instruction under the cursor after the
//! last step is the anchor.
//!
//! When several instructions satisfy a predicate, the first in body order wins. Patterns must be
//! specific enough for that to be the intended one.
//!
//! Matching never mutates the body.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{AnchorPattern, InstructionAssembler, InstructionPredicate};
//! use cilpatch::metadata::{method::MethodBody, Module, SignatureMethod, TypeName, TypeSignature};
//!
//! let mut module = Module::new("Assembly-CSharp");
//! let push = module.import_method(
//!     &TypeName::parse("UnityEngine.GL"),
//!     "PushMatrix",
//!     &SignatureMethod::static_method(TypeSignature::Void, vec![]),
//! );
//!
//! let mut asm = InstructionAssembler::new();
//! asm.nop()?.call(push)?.nop()?.ret()?;
//! let mut body = MethodBody::new();
//! let ids = asm.append_to(&mut body)?;
//!
//! let at_push = AnchorPattern::new("push").find(InstructionPredicate::call_to("PushMatrix"));
//! assert_eq!(at_push.locate(&body, &module)?, ids[1]);
//!
//! let after_push = at_push.clone().next();
//! assert_eq!(after_push.locate(&body, &module)?, ids[2]);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::fmt;

use crate::{
    assembly::{instruction::Instruction, opcodes::OpCode},
    metadata::{
        method::{InstrId, MethodBody},
        MemberResolver,
    },
    Error, Result,
};

/// Opcode constraint of an [`InstructionPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// Any opcode
    Any,
    /// `call` or `callvirt`
    CallLike,
    /// Exactly this opcode
    Exact(OpCode),
}

/// Structural predicate over a single instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPredicate {
    class: OpcodeClass,
    member: Option<String>,
}

impl InstructionPredicate {
    /// Matches every instruction.
    #[must_use]
    pub fn any() -> Self {
        InstructionPredicate {
            class: OpcodeClass::Any,
            member: None,
        }
    }

    /// Matches instructions with exactly this opcode.
    #[must_use]
    pub fn opcode(opcode: OpCode) -> Self {
        InstructionPredicate {
            class: OpcodeClass::Exact(opcode),
            member: None,
        }
    }

    /// Matches `call` / `callvirt` instructions whose callee is named `member`.
    #[must_use]
    pub fn call_to(member: impl Into<String>) -> Self {
        InstructionPredicate {
            class: OpcodeClass::CallLike,
            member: Some(member.into()),
        }
    }

    /// Additionally requires the method operand to resolve to a member named `member`.
    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// The opcode constraint.
    #[must_use]
    pub fn class(&self) -> OpcodeClass {
        self.class
    }

    /// The required member name, if any.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    /// Tests one instruction. Member names are resolved through `resolver`; an operand that
    /// does not resolve never matches a member constraint.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction, resolver: &dyn MemberResolver) -> bool {
        let class_matches = match self.class {
            OpcodeClass::Any => true,
            OpcodeClass::CallLike => instruction.opcode.is_call_like(),
            OpcodeClass::Exact(opcode) => instruction.opcode == opcode,
        };
        if !class_matches {
            return false;
        }

        match &self.member {
            None => true,
            Some(name) => instruction
                .method_token()
                .and_then(|token| resolver.resolve_member(token))
                .is_some_and(|member| member.name == name.as_str()),
        }
    }
}

impl fmt::Display for InstructionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            OpcodeClass::Any => write!(f, "any")?,
            OpcodeClass::CallLike => write!(f, "call")?,
            OpcodeClass::Exact(opcode) => write!(f, "{opcode}")?,
        }
        if let Some(member) = &self.member {
            write!(f, " {member}")?;
        }
        Ok(())
    }
}

/// One step of an [`AnchorPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorStep {
    /// Move to the first instruction at or after the cursor satisfying the predicate
    Find(InstructionPredicate),
    /// Move to the instruction immediately following the cursor
    Next,
}

/// A named, declarative description of an anchor instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorPattern {
    name: String,
    steps: Vec<AnchorStep>,
}

impl AnchorPattern {
    /// Creates an empty pattern. Add steps with [`AnchorPattern::find`] and
    /// [`AnchorPattern::next`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        AnchorPattern {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a [`AnchorStep::Find`] step.
    #[must_use]
    pub fn find(mut self, predicate: InstructionPredicate) -> Self {
        self.steps.push(AnchorStep::Find(predicate));
        self
    }

    /// Appends a [`AnchorStep::Next`] step.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn next(mut self) -> Self {
        self.steps.push(AnchorStep::Next);
        self
    }

    /// Name reported in [`Error::AnchorNotFound`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[AnchorStep] {
        &self.steps
    }

    /// Locates the anchor in `body`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AnchorNotFound`] with the pattern name if a step finds nothing, a
    /// [`AnchorStep::Next`] runs past the end of the body, or the pattern has no steps.
    pub fn locate(&self, body: &MethodBody, resolver: &dyn MemberResolver) -> Result<InstrId> {
        let not_found = || Error::AnchorNotFound(self.to_string());

        let mut cursor: Option<usize> = None;
        for step in &self.steps {
            let position = match step {
                AnchorStep::Find(predicate) => {
                    let start = cursor.unwrap_or(0);
                    body.iter()
                        .enumerate()
                        .skip(start)
                        .find(|(_, (_, instruction))| predicate.matches(instruction, resolver))
                        .map(|(position, _)| position)
                        .ok_or_else(not_found)?
                }
                AnchorStep::Next => {
                    let next = cursor.map_or(0, |position| position + 1);
                    if next >= body.len() {
                        return Err(not_found());
                    }
                    next
                }
            };
            cursor = Some(position);
        }

        cursor.and_then(|position| body.at(position)).ok_or_else(not_found)
    }
}

impl fmt::Display for AnchorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                write!(f, " -> ")?;
            }
            match step {
                AnchorStep::Find(predicate) => write!(f, "{predicate}")?,
                AnchorStep::Next => write!(f, "next")?,
            }
        }
        write!(f, "]")
    }
}

/// Returns the first instruction satisfying `predicate`, in body order.
#[must_use]
pub fn find_first(
    body: &MethodBody,
    resolver: &dyn MemberResolver,
    predicate: &InstructionPredicate,
) -> Option<InstrId> {
    body.iter()
        .find(|(_, instruction)| predicate.matches(instruction, resolver))
        .map(|(id, _)| id)
}
