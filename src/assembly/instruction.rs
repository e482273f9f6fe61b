//! CIL instruction representation, operands and stack/flow metadata.
//!
//! An [`Instruction`] pairs an [`OpCode`] with a typed [`Operand`]. Operands refer to other
//! parts of the method through stable handles rather than byte offsets: branch targets are
//! [`InstrId`]s, locals are [`LocalId`]s and callees are metadata [`Token`]s. This keeps an
//! instruction valid while code is inserted around it.
//!
//! # Key Components
//!
//! - [`Instruction`] - Opcode plus operand
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate constant values
//! - [`FlowType`] - Control flow behavior classification
//! - [`StackBehavior`] - Fixed stack effect of an opcode
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{Immediate, Instruction, OpCode, Operand};
//! use cilpatch::metadata::method::LocalId;
//!
//! let load = Instruction::new(OpCode::LdlocaS, Operand::Local(LocalId(3)));
//! assert_eq!(load.local(), Some(LocalId(3)));
//! assert_eq!(load.to_string(), "ldloca.s V_3");
//!
//! let constant = Instruction::new(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(1024.0)));
//! assert_eq!(constant.f32_operand(), Some(1024.0));
//! assert!(constant.validate().is_ok());
//! ```

use std::fmt::{self, UpperHex};

use crate::{
    assembly::opcodes::{OpCode, OperandKind},
    metadata::{
        method::{InstrId, LocalId},
        token::Token,
    },
    Result,
};

/// Immediate constant embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    fn kind(&self) -> OperandKind {
        match self {
            Immediate::Int8(_) => OperandKind::Int8,
            Immediate::Int32(_) => OperandKind::Int32,
            Immediate::Int64(_) => OperandKind::Int64,
            Immediate::Float32(_) => OperandKind::Float32,
            Immediate::Float64(_) => OperandKind::Float64,
        }
    }
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value:?}"),
            Immediate::Float64(value) => write!(f, "{value:?}"),
        }
    }
}

/// Operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Local variable slot
    Local(LocalId),
    /// Argument index
    Argument(u16),
    /// Method token (`MethodDef` or `MemberRef`)
    Method(Token),
    /// Branch target
    Target(InstrId),
    /// Switch table targets
    Switch(Vec<InstrId>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Local(local) => write!(f, "{local}"),
            Operand::Argument(arg) => write!(f, "A_{arg}"),
            Operand::Method(token) => write!(f, "{token}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Switch(targets) => {
                let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
                write!(f, "({})", names.join(", "))
            }
        }
    }
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
///
/// ```rust
/// use cilpatch::assembly::StackBehavior;
///
/// // An instruction that pops 2 values and pushes 1 (like 'div')
/// let div = StackBehavior { pops: 2, pushes: 1, net_effect: -1 };
/// assert_eq!(div.net_effect, div.pushes as i8 - div.pops as i8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching [`OpCode::operand_kind`]
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction with an operand.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Creates an instruction without an operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Checks that the operand matches the kind the opcode requires.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on a mismatch, or if a short-form local or argument
    /// index does not fit in one byte.
    pub fn validate(&self) -> Result<()> {
        let kind = self.opcode.operand_kind();
        let valid = match (&self.operand, kind) {
            (Operand::None, OperandKind::None) => true,
            (Operand::Immediate(imm), _) => imm.kind() == kind,
            (Operand::Local(local), OperandKind::LocalShort) => local.0 <= u16::from(u8::MAX),
            (Operand::Local(_), OperandKind::Local) => true,
            (Operand::Argument(arg), OperandKind::ArgumentShort) => *arg <= u16::from(u8::MAX),
            (Operand::Method(token), OperandKind::Method) => token.is_method(),
            (Operand::Target(_), OperandKind::Target | OperandKind::TargetShort) => true,
            (Operand::Switch(_), OperandKind::Switch) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(malformed_error!(
                "Operand '{}' is not valid for '{}' (expects {:?})",
                self.operand,
                self.opcode,
                kind
            ))
        }
    }

    /// Control flow behavior of this instruction.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Returns `true` for `call`, `callvirt` and `newobj`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.flow_type() == FlowType::Call
    }

    /// Returns `true` if this instruction can transfer control to a target instruction.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// All branch targets of this instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// The callee token of a call-like instruction.
    #[must_use]
    pub fn method_token(&self) -> Option<Token> {
        match self.operand {
            Operand::Method(token) => Some(token),
            _ => None,
        }
    }

    /// The local slot this instruction touches, including the `ldloc.N` / `stloc.N` forms.
    #[must_use]
    pub fn local(&self) -> Option<LocalId> {
        match self.operand {
            Operand::Local(local) => Some(local),
            _ => self.opcode.implicit_local().map(LocalId),
        }
    }

    /// The 32-bit float immediate, if any.
    #[must_use]
    pub fn f32_operand(&self) -> Option<f32> {
        match self.operand {
            Operand::Immediate(Immediate::Float32(value)) => Some(value),
            _ => None,
        }
    }

    /// Encoded size of the instruction in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match (&self.operand, self.opcode.operand_kind().size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 0,
        };
        self.opcode.opcode_size() + operand
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::method::MethodBody, Error};

    #[test]
    fn test_validate_operands() {
        assert!(Instruction::simple(OpCode::Dup).validate().is_ok());
        assert!(Instruction::new(OpCode::Call, Operand::Method(Token(0x0A000001)))
            .validate()
            .is_ok());
        assert!(Instruction::new(OpCode::StlocS, Operand::Local(LocalId(255)))
            .validate()
            .is_ok());

        // Wrong operand kinds
        assert!(matches!(
            Instruction::simple(OpCode::Call).validate(),
            Err(Error::Malformed { .. })
        ));
        assert!(Instruction::new(OpCode::Call, Operand::Method(Token(0x02000001)))
            .validate()
            .is_err());
        assert!(Instruction::new(
            OpCode::LdcR4,
            Operand::Immediate(Immediate::Float64(1.0))
        )
        .validate()
        .is_err());
        assert!(Instruction::new(OpCode::StlocS, Operand::Local(LocalId(256)))
            .validate()
            .is_err());
        assert!(Instruction::new(OpCode::Stloc, Operand::Local(LocalId(256)))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_flow_queries() {
        let mut body = MethodBody::new();
        let target = body.push(Instruction::simple(OpCode::Ret));

        let branch = Instruction::new(OpCode::Brtrue, Operand::Target(target));
        assert!(branch.is_branch());
        assert!(!branch.is_terminal());
        assert_eq!(branch.targets(), vec![target]);

        let jump = Instruction::new(OpCode::Br, Operand::Target(target));
        assert!(jump.is_terminal());

        let switch = Instruction::new(OpCode::Switch, Operand::Switch(vec![target, target]));
        assert_eq!(switch.targets().len(), 2);
        assert_eq!(switch.size(), 1 + 4 + 8);

        let call = Instruction::new(OpCode::Callvirt, Operand::Method(Token(0x0A000002)));
        assert!(call.is_call());
        assert!(!call.is_branch());
        assert_eq!(call.method_token(), Some(Token(0x0A000002)));
        assert_eq!(call.size(), 5);
    }

    #[test]
    fn test_implicit_local() {
        assert_eq!(Instruction::simple(OpCode::Ldloc1).local(), Some(LocalId(1)));
        assert_eq!(Instruction::simple(OpCode::Dup).local(), None);
    }

    #[test]
    fn test_immediate_formatting() {
        assert_eq!(format!("{:X}", Immediate::Int32(42)), "0000002A");
        assert_eq!(format!("{:X}", Immediate::Float32(1.0)), "3F800000");
        assert_eq!(Immediate::Float32(1024.0).to_string(), "1024.0");
        assert_eq!(
            Instruction::new(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(-3))).to_string(),
            "ldc.i4.s -3"
        );
    }
}
