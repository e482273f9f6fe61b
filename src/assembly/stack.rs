//! Evaluation stack analysis for method bodies.
//!
//! The CLI verifier requires that every instruction is reached with one well-defined stack depth,
//! that no instruction pops more than the stack holds, and that `ret` leaves exactly the return
//! value (if any) behind. [`StackAnalyzer`] checks these rules over a [`MethodBody`] by walking
//! the flow graph: fall-through edges, branch and switch targets, `leave` targets (entered with an
//! empty stack) and exception handler entries (entered with the exception object for catch and
//! filter clauses). Unreachable instructions are not checked.
//!
//! Call-like instructions take their stack effect from the callee signature, looked up through a
//! [`MemberResolver`].
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{net_stack_effect, InstructionAssembler, StackAnalyzer};
//! use cilpatch::metadata::{method::{LocalId, MethodBody}, Module, SignatureMethod, TypeSignature};
//!
//! let module = Module::new("Assembly-CSharp");
//! let mut asm = InstructionAssembler::new();
//! asm.ldc_i4(2)?.ldc_i4(3)?.add()?.stloc(LocalId(0))?.ret()?;
//!
//! let mut body = MethodBody::new();
//! asm.append_to(&mut body)?;
//!
//! let signature = SignatureMethod::static_method(TypeSignature::Void, vec![]);
//! let report = StackAnalyzer::new(&module, &signature).analyze(&body)?;
//! assert_eq!(report.max_depth(), 2);
//!
//! let block: Vec<_> = body.iter().map(|(_, i)| i.clone()).collect();
//! assert_eq!(net_stack_effect(&module, &block[..3])?, 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{FlowType, Instruction, StackBehavior},
        opcodes::OpCode,
    },
    metadata::{
        method::{InstrId, MethodBody},
        MemberResolver, SignatureMethod,
    },
    Error, Result,
};

/// Result of a successful stack analysis.
#[derive(Debug, Clone)]
pub struct StackReport {
    depths: Vec<Option<usize>>,
    max_depth: usize,
}

impl StackReport {
    /// Highest stack depth reached on any path.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Stack depth on entry to the instruction at `position`, `None` if it is unreachable.
    #[must_use]
    pub fn depth_at(&self, position: usize) -> Option<usize> {
        self.depths.get(position).copied().flatten()
    }

    /// `max_stack` value for the method header.
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        u16::try_from(self.max_depth).unwrap_or(u16::MAX)
    }
}

/// Verifies stack balance of method bodies.
pub struct StackAnalyzer<'a> {
    resolver: &'a dyn MemberResolver,
    returns_value: bool,
}

impl<'a> StackAnalyzer<'a> {
    /// Creates an analyzer for a method with the given signature.
    #[must_use]
    pub fn new(resolver: &'a dyn MemberResolver, signature: &SignatureMethod) -> Self {
        StackAnalyzer {
            resolver,
            returns_value: signature.returns_value(),
        }
    }

    /// Stack effect of a single instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a call-like instruction has no method operand, its token
    /// does not resolve, or the callee pops more slots than a stack behavior can describe.
    pub fn behavior(&self, instruction: &Instruction) -> Result<StackBehavior> {
        if let Some(fixed) = instruction.opcode.stack_behavior() {
            return Ok(fixed);
        }

        let (pops, pushes) = match instruction.opcode {
            OpCode::Ret => (usize::from(self.returns_value), 0),
            opcode => {
                let token = instruction.method_token().ok_or_else(|| {
                    malformed_error!("'{}' without a method operand", opcode)
                })?;
                let member = self.resolver.resolve_member(token).ok_or_else(|| {
                    malformed_error!("Call target {} does not resolve", token)
                })?;
                let signature = member.signature;
                if opcode == OpCode::Newobj {
                    (signature.params.len(), 1)
                } else {
                    (
                        signature.params.len() + usize::from(signature.has_this),
                        usize::from(signature.returns_value()),
                    )
                }
            }
        };

        let pops = u8::try_from(pops)
            .map_err(|_| malformed_error!("'{}' pops {} stack slots", instruction, pops))?;
        let pushes = u8::try_from(pushes)
            .map_err(|_| malformed_error!("'{}' pushes {} stack slots", instruction, pushes))?;

        // Both values are below 256 here
        #[allow(clippy::cast_possible_wrap)]
        let net_effect = (i16::from(pushes) - i16::from(pops)) as i8;
        Ok(StackBehavior {
            pops,
            pushes,
            net_effect,
        })
    }

    /// Walks every reachable path of `body` and checks stack balance.
    ///
    /// # Errors
    ///
    /// - [`Error::StackUnderflow`] if an instruction pops more than the stack holds
    /// - [`Error::StackMismatch`] if two paths reach an instruction with different depths, or
    ///   `ret` is reached with a depth other than the return arity
    /// - [`Error::Malformed`] for unresolvable calls, branches out of the body, or code falling
    ///   through the end of the body
    pub fn analyze(&self, body: &MethodBody) -> Result<StackReport> {
        let positions: HashMap<InstrId, usize> = body
            .ids()
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        let position_of = |id: InstrId| -> Result<usize> {
            positions
                .get(&id)
                .copied()
                .ok_or_else(|| malformed_error!("Branch to {} leaves the method body", id))
        };

        let mut depths: Vec<Option<usize>> = vec![None; body.len()];
        let mut worklist: Vec<(usize, usize)> = Vec::new();

        if !body.is_empty() {
            worklist.push((0, 0));
        }
        for handler in body.exception_handlers() {
            let entry = usize::from(handler.pushes_exception());
            worklist.push((position_of(handler.handler_start)?, entry));
            if let Some(filter) = handler.filter_start {
                worklist.push((position_of(filter)?, 1));
            }
        }

        let mut max_depth = 0;
        while let Some((position, depth)) = worklist.pop() {
            match depths[position] {
                Some(recorded) if recorded == depth => continue,
                Some(recorded) => {
                    return Err(Error::StackMismatch {
                        position,
                        expected: recorded,
                        found: depth,
                    })
                }
                None => depths[position] = Some(depth),
            }
            max_depth = max_depth.max(depth);

            let Some(id) = body.at(position) else {
                continue;
            };
            let Some(instruction) = body.get(id) else {
                continue;
            };

            let behavior = self.behavior(instruction)?;
            let pops = usize::from(behavior.pops);
            if depth < pops {
                return Err(Error::StackUnderflow {
                    position,
                    needed: pops,
                    available: depth,
                });
            }
            if instruction.opcode == OpCode::Ret && depth != pops {
                return Err(Error::StackMismatch {
                    position,
                    expected: pops,
                    found: depth,
                });
            }

            let after = depth - pops + usize::from(behavior.pushes);
            max_depth = max_depth.max(after);

            let target_depth = if instruction.flow_type() == FlowType::Leave {
                0
            } else {
                after
            };
            for target in instruction.targets() {
                worklist.push((position_of(target)?, target_depth));
            }

            if !instruction.is_terminal() {
                if position + 1 >= body.len() {
                    return Err(malformed_error!(
                        "Instruction #{} ('{}') falls through the end of the body",
                        position,
                        instruction
                    ));
                }
                worklist.push((position + 1, after));
            }
        }

        Ok(StackReport { depths, max_depth })
    }
}

/// Straight-line stack delta of an instruction block.
///
/// Branches are treated as falling through, `ret` as popping nothing. A block that leaves the
/// stack as it found it has a net effect of zero.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if a call-like instruction does not resolve.
pub fn net_stack_effect(resolver: &dyn MemberResolver, block: &[Instruction]) -> Result<i32> {
    let void = SignatureMethod::static_method(crate::metadata::TypeSignature::Void, vec![]);
    let analyzer = StackAnalyzer::new(resolver, &void);
    block.iter().try_fold(0i32, |total, instruction| {
        Ok(total + i32::from(analyzer.behavior(instruction)?.net_effect))
    })
}

/// Highest stack depth a straight-line block reaches when entered at depth `entry`.
///
/// # Errors
///
/// Returns [`Error::StackUnderflow`] (positions counted from the start of the block) if an
/// instruction pops more than the stack holds, and [`Error::Malformed`] if a call-like
/// instruction does not resolve.
pub fn block_peak_depth(
    resolver: &dyn MemberResolver,
    block: &[Instruction],
    entry: usize,
) -> Result<usize> {
    let void = SignatureMethod::static_method(crate::metadata::TypeSignature::Void, vec![]);
    let analyzer = StackAnalyzer::new(resolver, &void);

    let mut depth = entry;
    let mut peak = entry;
    for (position, instruction) in block.iter().enumerate() {
        let behavior = analyzer.behavior(instruction)?;
        let pops = usize::from(behavior.pops);
        if depth < pops {
            return Err(Error::StackUnderflow {
                position,
                needed: pops,
                available: depth,
            });
        }
        depth = depth - pops + usize::from(behavior.pushes);
        peak = peak.max(depth);
    }
    Ok(peak)
}
