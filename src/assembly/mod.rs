//! CIL instructions, assembly, stack analysis and anchor matching.
//!
//! # Key Components
//!
//! - [`OpCode`] / [`Instruction`] / [`Operand`] - The instruction model
//! - [`InstructionAssembler`] - Fluent builder with label resolution
//! - [`StackAnalyzer`] / [`net_stack_effect`] / [`block_peak_depth`] - Evaluation stack verification
//! - [`AnchorPattern`] / [`InstructionPredicate`] - Declarative instruction matching

mod assembler;
mod instruction;
mod matcher;
mod opcodes;
mod stack;

pub use assembler::InstructionAssembler;
pub use instruction::{FlowType, Immediate, Instruction, Operand, StackBehavior};
pub use matcher::{find_first, AnchorPattern, AnchorStep, InstructionPredicate, OpcodeClass};
pub use opcodes::{OpCode, OperandKind, FE_PREFIX};
pub use stack::{block_peak_depth, net_stack_effect, StackAnalyzer, StackReport};
