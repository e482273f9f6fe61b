//! CIL opcodes known to the patch engine (ECMA-335, Partition III).
//!
//! [`OpCode`] is a closed enum over the instructions a patch pass reads, matches or emits. Each
//! variant knows its mnemonic, its byte encoding (two-byte opcodes use the `0xFE` prefix), the
//! kind of operand it takes, how it affects control flow, and its stack effect where that effect
//! does not depend on a method signature.

use strum::{EnumIter, IntoStaticStr};

use crate::assembly::instruction::{FlowType, StackBehavior};

/// Shared first byte of all two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

/// Kind of operand an opcode takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit immediate
    Int8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit floating point immediate
    Float32,
    /// 64-bit floating point immediate
    Float64,
    /// Method token (`MethodDef` or `MemberRef`)
    Method,
    /// Local variable index, short (1 byte) form
    LocalShort,
    /// Local variable index, long (2 byte) form
    Local,
    /// Argument index, short (1 byte) form
    ArgumentShort,
    /// Branch target, short (1 byte offset) form
    TargetShort,
    /// Branch target, long (4 byte offset) form
    Target,
    /// Switch table
    Switch,
}

impl OperandKind {
    /// Returns the encoded size of this operand in bytes.
    ///
    /// Returns `None` for [`OperandKind::Switch`], whose size depends on the number of targets.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Int8
            | OperandKind::LocalShort
            | OperandKind::ArgumentShort
            | OperandKind::TargetShort => Some(1),
            OperandKind::Local => Some(2),
            OperandKind::Int32 | OperandKind::Float32 | OperandKind::Method | OperandKind::Target => {
                Some(4)
            }
            OperandKind::Int64 | OperandKind::Float64 => Some(8),
            OperandKind::Switch => None,
        }
    }
}

/// A CIL opcode.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{FlowType, OpCode};
///
/// assert_eq!(OpCode::LdlocaS.mnemonic(), "ldloca.s");
/// assert_eq!(OpCode::LdlocaS.encoding(), (0, 0x12));
/// assert_eq!(OpCode::Ceq.encoding(), (0xFE, 0x01));
/// assert_eq!(OpCode::Brtrue.flow_type(), FlowType::ConditionalBranch);
///
/// // Call-like opcodes depend on the callee signature
/// assert!(OpCode::Call.stack_behavior().is_none());
/// assert_eq!(OpCode::Dup.stack_behavior().unwrap().net_effect, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
pub enum OpCode {
    /// `nop`
    #[strum(serialize = "nop")]
    Nop,
    /// `ldarg.0`
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    /// `ldarg.1`
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    /// `ldarg.2`
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    /// `ldarg.3`
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    /// `ldarg.s`
    #[strum(serialize = "ldarg.s")]
    LdargS,
    /// `ldloc.0`
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    /// `ldloc.1`
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    /// `ldloc.2`
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    /// `ldloc.3`
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    /// `stloc.0`
    #[strum(serialize = "stloc.0")]
    Stloc0,
    /// `stloc.1`
    #[strum(serialize = "stloc.1")]
    Stloc1,
    /// `stloc.2`
    #[strum(serialize = "stloc.2")]
    Stloc2,
    /// `stloc.3`
    #[strum(serialize = "stloc.3")]
    Stloc3,
    /// `ldloc.s`
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    /// `ldloca.s`
    #[strum(serialize = "ldloca.s")]
    LdlocaS,
    /// `stloc.s`
    #[strum(serialize = "stloc.s")]
    StlocS,
    /// `ldnull`
    #[strum(serialize = "ldnull")]
    Ldnull,
    /// `ldc.i4.m1`
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    /// `ldc.i4.0`
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    /// `ldc.i4.1`
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    /// `ldc.i4.s`
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    /// `ldc.i4`
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    /// `ldc.i8`
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    /// `ldc.r4`
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    /// `ldc.r8`
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    /// `dup`
    #[strum(serialize = "dup")]
    Dup,
    /// `pop`
    #[strum(serialize = "pop")]
    Pop,
    /// `call`
    #[strum(serialize = "call")]
    Call,
    /// `ret`
    #[strum(serialize = "ret")]
    Ret,
    /// `br.s`
    #[strum(serialize = "br.s")]
    BrS,
    /// `brfalse.s`
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    /// `brtrue.s`
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    /// `br`
    #[strum(serialize = "br")]
    Br,
    /// `brfalse`
    #[strum(serialize = "brfalse")]
    Brfalse,
    /// `brtrue`
    #[strum(serialize = "brtrue")]
    Brtrue,
    /// `beq`
    #[strum(serialize = "beq")]
    Beq,
    /// `blt`
    #[strum(serialize = "blt")]
    Blt,
    /// `switch`
    #[strum(serialize = "switch")]
    Switch,
    /// `add`
    #[strum(serialize = "add")]
    Add,
    /// `sub`
    #[strum(serialize = "sub")]
    Sub,
    /// `mul`
    #[strum(serialize = "mul")]
    Mul,
    /// `div`
    #[strum(serialize = "div")]
    Div,
    /// `rem`
    #[strum(serialize = "rem")]
    Rem,
    /// `neg`
    #[strum(serialize = "neg")]
    Neg,
    /// `conv.i4`
    #[strum(serialize = "conv.i4")]
    ConvI4,
    /// `conv.r4`
    #[strum(serialize = "conv.r4")]
    ConvR4,
    /// `conv.r8`
    #[strum(serialize = "conv.r8")]
    ConvR8,
    /// `callvirt`
    #[strum(serialize = "callvirt")]
    Callvirt,
    /// `newobj`
    #[strum(serialize = "newobj")]
    Newobj,
    /// `throw`
    #[strum(serialize = "throw")]
    Throw,
    /// `endfinally`
    #[strum(serialize = "endfinally")]
    Endfinally,
    /// `leave`
    #[strum(serialize = "leave")]
    Leave,
    /// `leave.s`
    #[strum(serialize = "leave.s")]
    LeaveS,
    /// `ceq`
    #[strum(serialize = "ceq")]
    Ceq,
    /// `cgt`
    #[strum(serialize = "cgt")]
    Cgt,
    /// `clt`
    #[strum(serialize = "clt")]
    Clt,
    /// `ldloc`
    #[strum(serialize = "ldloc")]
    Ldloc,
    /// `ldloca`
    #[strum(serialize = "ldloca")]
    Ldloca,
    /// `stloc`
    #[strum(serialize = "stloc")]
    Stloc,
}

const fn stack(pops: u8, pushes: u8) -> Option<StackBehavior> {
    // Both counts are at most 2, the difference always fits
    #[allow(clippy::cast_possible_wrap)]
    Some(StackBehavior {
        pops,
        pushes,
        net_effect: pushes as i8 - pops as i8,
    })
}

impl OpCode {
    /// Human-readable mnemonic (e.g. `"ldloca.s"`).
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Byte encoding as `(prefix, opcode)`; the prefix is `0` for single-byte opcodes.
    #[must_use]
    pub const fn encoding(self) -> (u8, u8) {
        match self {
            OpCode::Nop => (0, 0x00),
            OpCode::Ldarg0 => (0, 0x02),
            OpCode::Ldarg1 => (0, 0x03),
            OpCode::Ldarg2 => (0, 0x04),
            OpCode::Ldarg3 => (0, 0x05),
            OpCode::Ldloc0 => (0, 0x06),
            OpCode::Ldloc1 => (0, 0x07),
            OpCode::Ldloc2 => (0, 0x08),
            OpCode::Ldloc3 => (0, 0x09),
            OpCode::Stloc0 => (0, 0x0A),
            OpCode::Stloc1 => (0, 0x0B),
            OpCode::Stloc2 => (0, 0x0C),
            OpCode::Stloc3 => (0, 0x0D),
            OpCode::LdargS => (0, 0x0E),
            OpCode::LdlocS => (0, 0x11),
            OpCode::LdlocaS => (0, 0x12),
            OpCode::StlocS => (0, 0x13),
            OpCode::Ldnull => (0, 0x14),
            OpCode::LdcI4M1 => (0, 0x15),
            OpCode::LdcI40 => (0, 0x16),
            OpCode::LdcI41 => (0, 0x17),
            OpCode::LdcI4S => (0, 0x1F),
            OpCode::LdcI4 => (0, 0x20),
            OpCode::LdcI8 => (0, 0x21),
            OpCode::LdcR4 => (0, 0x22),
            OpCode::LdcR8 => (0, 0x23),
            OpCode::Dup => (0, 0x25),
            OpCode::Pop => (0, 0x26),
            OpCode::Call => (0, 0x28),
            OpCode::Ret => (0, 0x2A),
            OpCode::BrS => (0, 0x2B),
            OpCode::BrfalseS => (0, 0x2C),
            OpCode::BrtrueS => (0, 0x2D),
            OpCode::Br => (0, 0x38),
            OpCode::Brfalse => (0, 0x39),
            OpCode::Brtrue => (0, 0x3A),
            OpCode::Beq => (0, 0x3B),
            OpCode::Blt => (0, 0x3F),
            OpCode::Switch => (0, 0x45),
            OpCode::Add => (0, 0x58),
            OpCode::Sub => (0, 0x59),
            OpCode::Mul => (0, 0x5A),
            OpCode::Div => (0, 0x5B),
            OpCode::Rem => (0, 0x5D),
            OpCode::Neg => (0, 0x65),
            OpCode::ConvI4 => (0, 0x69),
            OpCode::ConvR4 => (0, 0x6B),
            OpCode::ConvR8 => (0, 0x6C),
            OpCode::Callvirt => (0, 0x6F),
            OpCode::Newobj => (0, 0x73),
            OpCode::Throw => (0, 0x7A),
            OpCode::Endfinally => (0, 0xDC),
            OpCode::Leave => (0, 0xDD),
            OpCode::LeaveS => (0, 0xDE),
            OpCode::Ceq => (FE_PREFIX, 0x01),
            OpCode::Cgt => (FE_PREFIX, 0x02),
            OpCode::Clt => (FE_PREFIX, 0x04),
            OpCode::Ldloc => (FE_PREFIX, 0x0C),
            OpCode::Ldloca => (FE_PREFIX, 0x0D),
            OpCode::Stloc => (FE_PREFIX, 0x0E),
        }
    }

    /// Kind of operand this opcode takes.
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::LdargS => OperandKind::ArgumentShort,
            OpCode::LdlocS | OpCode::LdlocaS | OpCode::StlocS => OperandKind::LocalShort,
            OpCode::Ldloc | OpCode::Ldloca | OpCode::Stloc => OperandKind::Local,
            OpCode::LdcI4S => OperandKind::Int8,
            OpCode::LdcI4 => OperandKind::Int32,
            OpCode::LdcI8 => OperandKind::Int64,
            OpCode::LdcR4 => OperandKind::Float32,
            OpCode::LdcR8 => OperandKind::Float64,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => OperandKind::Method,
            OpCode::BrS | OpCode::BrfalseS | OpCode::BrtrueS | OpCode::LeaveS => {
                OperandKind::TargetShort
            }
            OpCode::Br
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::Blt
            | OpCode::Leave => OperandKind::Target,
            OpCode::Switch => OperandKind::Switch,
            _ => OperandKind::None,
        }
    }

    /// How this opcode affects control flow.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Br | OpCode::BrS => FlowType::UnconditionalBranch,
            OpCode::Brfalse
            | OpCode::BrfalseS
            | OpCode::Brtrue
            | OpCode::BrtrueS
            | OpCode::Beq
            | OpCode::Blt => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Throw => FlowType::Throw,
            OpCode::Endfinally => FlowType::EndFinally,
            OpCode::Leave | OpCode::LeaveS => FlowType::Leave,
            _ => FlowType::Sequential,
        }
    }

    /// Fixed stack effect of this opcode.
    ///
    /// Returns `None` for `call`, `callvirt`, `newobj` and `ret`, whose effect depends on a
    /// method signature.
    #[must_use]
    pub const fn stack_behavior(self) -> Option<StackBehavior> {
        match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ret => None,
            OpCode::Nop
            | OpCode::Br
            | OpCode::BrS
            | OpCode::Leave
            | OpCode::LeaveS
            | OpCode::Endfinally => stack(0, 0),
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc
            | OpCode::LdlocaS
            | OpCode::Ldloca
            | OpCode::Ldnull
            | OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI4S
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8 => stack(0, 1),
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc
            | OpCode::Pop
            | OpCode::Brfalse
            | OpCode::BrfalseS
            | OpCode::Brtrue
            | OpCode::BrtrueS
            | OpCode::Switch
            | OpCode::Throw => stack(1, 0),
            OpCode::Dup => stack(1, 2),
            OpCode::Beq | OpCode::Blt => stack(2, 0),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt => stack(2, 1),
            OpCode::Neg | OpCode::ConvI4 | OpCode::ConvR4 | OpCode::ConvR8 => stack(1, 1),
        }
    }

    /// Returns `true` for `call` and `callvirt`.
    #[must_use]
    pub const fn is_call_like(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt)
    }

    /// Local slot implied by the shorthand `ldloc.N` / `stloc.N` forms.
    #[must_use]
    pub const fn implicit_local(self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Number of bytes the opcode itself occupies.
    #[must_use]
    pub const fn opcode_size(self) -> usize {
        if self.encoding().0 == FE_PREFIX {
            2
        } else {
            1
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
