//! Straight-line evaluation of instruction sequences.
//!
//! [`Evaluator`] executes instructions in order against a set of local slots, an optional argument
//! list and an evaluation stack. External calls are dispatched to a [`HookRegistry`]. Control flow
//! other than falling through and `ret` is outside its reach: branches, switches, `leave`,
//! `throw` and `endfinally` fail with [`Error::NotSupported`].
//!
//! Constructors invoked with `call` on a local address (`ldloca; ...; call .ctor`) store the
//! value produced by the hook into that local, mirroring how value types are initialised in place.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::InstructionAssembler;
//! use cilpatch::emulation::{EmValue, Evaluator, HookRegistry};
//! use cilpatch::metadata::{method::LocalId, Module};
//!
//! let module = Module::new("Assembly-CSharp");
//! let hooks = HookRegistry::new();
//!
//! let mut asm = InstructionAssembler::new();
//! asm.ldc_i4(1536)?.conv_r4()?.ldc_r4(1024.0)?.div()?.stloc(LocalId(0))?;
//!
//! let mut evaluator = Evaluator::new(&module, &hooks, 1);
//! evaluator.run_block(&asm.into_instructions()?)?;
//! assert_eq!(evaluator.local(LocalId(0)), Some(&EmValue::F32(1.5)));
//! # Ok::<(), cilpatch::Error>(())
//! ```

use log::trace;

use crate::{
    assembly::{Immediate, Instruction, OpCode, Operand},
    emulation::{EmValue, HookContext, HookRegistry},
    metadata::{
        method::{LocalId, MethodBody},
        MemberResolver,
    },
    Error, Result,
};

/// Executes straight-line instruction sequences.
pub struct Evaluator<'a> {
    resolver: &'a dyn MemberResolver,
    hooks: &'a HookRegistry,
    locals: Vec<EmValue>,
    args: Vec<EmValue>,
    stack: Vec<EmValue>,
    returned: Option<Option<EmValue>>,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator with `local_count` slots, all [`EmValue::Void`].
    #[must_use]
    pub fn new(resolver: &'a dyn MemberResolver, hooks: &'a HookRegistry, local_count: usize) -> Self {
        Evaluator {
            resolver,
            hooks,
            locals: vec![EmValue::Void; local_count],
            args: Vec::new(),
            stack: Vec::new(),
            returned: None,
        }
    }

    /// Creates an evaluator with one slot per local of `body`.
    #[must_use]
    pub fn for_body(
        resolver: &'a dyn MemberResolver,
        hooks: &'a HookRegistry,
        body: &MethodBody,
    ) -> Self {
        Self::new(resolver, hooks, body.locals().len())
    }

    /// Sets the argument list seen by `ldarg`.
    #[must_use]
    pub fn with_args(mut self, args: Vec<EmValue>) -> Self {
        self.args = args;
        self
    }

    /// Value of a local slot.
    #[must_use]
    pub fn local(&self, local: LocalId) -> Option<&EmValue> {
        self.locals.get(local.index())
    }

    /// Overwrites a local slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalNotFound`] if the slot does not exist.
    pub fn set_local(&mut self, local: LocalId, value: EmValue) -> Result<()> {
        let slot = self
            .locals
            .get_mut(local.index())
            .ok_or_else(|| Error::LocalNotFound(local.to_string()))?;
        *slot = value;
        Ok(())
    }

    /// The evaluation stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[EmValue] {
        &self.stack
    }

    /// The value returned by `ret`: `None` while running, `Some(None)` for a void return.
    #[must_use]
    pub fn returned(&self) -> Option<&Option<EmValue>> {
        self.returned.as_ref()
    }

    /// Runs `body` from its first instruction until `ret` or the end of the body.
    ///
    /// # Errors
    ///
    /// See [`Evaluator::step`].
    pub fn run(&mut self, body: &MethodBody) -> Result<()> {
        for (position, (_, instruction)) in body.iter().enumerate() {
            self.step(position, instruction)?;
            if self.returned.is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Runs a detached instruction sequence until `ret` or its end.
    ///
    /// # Errors
    ///
    /// See [`Evaluator::step`].
    pub fn run_block(&mut self, block: &[Instruction]) -> Result<()> {
        for (position, instruction) in block.iter().enumerate() {
            self.step(position, instruction)?;
            if self.returned.is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Executes one instruction. `position` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// - [`Error::StackUnderflow`] if the stack holds too few values
    /// - [`Error::LocalNotFound`] for a local or argument slot that does not exist
    /// - [`Error::NotSupported`] for control flow, missing hooks or unsupported operand types
    /// - [`Error::Malformed`] for call tokens that do not resolve
    pub fn step(&mut self, position: usize, instruction: &Instruction) -> Result<()> {
        trace!("eval #{position}: {instruction}");
        match instruction.opcode {
            OpCode::Nop => {}
            OpCode::Ldarg0 => self.load_arg(0)?,
            OpCode::Ldarg1 => self.load_arg(1)?,
            OpCode::Ldarg2 => self.load_arg(2)?,
            OpCode::Ldarg3 => self.load_arg(3)?,
            OpCode::LdargS => match instruction.operand {
                Operand::Argument(index) => self.load_arg(usize::from(index))?,
                _ => return Err(malformed_error!("'{}' without argument operand", instruction)),
            },
            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc => {
                let local = self.local_operand(instruction)?;
                let value = self.read_local(local)?.clone();
                self.stack.push(value);
            }
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc => {
                let local = self.local_operand(instruction)?;
                let [value] = self.pop_n::<1>(position)?;
                self.set_local(local, value)?;
            }
            OpCode::LdlocaS | OpCode::Ldloca => {
                let local = self.local_operand(instruction)?;
                self.read_local(local)?;
                self.stack.push(EmValue::ManagedPtr(local));
            }
            OpCode::Ldnull => self.stack.push(EmValue::Null),
            OpCode::LdcI4M1 => self.stack.push(EmValue::I32(-1)),
            OpCode::LdcI40 => self.stack.push(EmValue::I32(0)),
            OpCode::LdcI41 => self.stack.push(EmValue::I32(1)),
            OpCode::LdcI4S | OpCode::LdcI4 | OpCode::LdcR4 | OpCode::LdcR8 => {
                let value = match instruction.operand {
                    Operand::Immediate(Immediate::Int8(value)) => EmValue::I32(i32::from(value)),
                    Operand::Immediate(Immediate::Int32(value)) => EmValue::I32(value),
                    Operand::Immediate(Immediate::Float32(value)) => EmValue::F32(value),
                    Operand::Immediate(Immediate::Float64(value)) => EmValue::F64(value),
                    _ => return Err(unsupported(instruction)),
                };
                self.stack.push(value);
            }
            // No 64-bit integer values
            OpCode::LdcI8 => return Err(unsupported(instruction)),
            OpCode::Dup => {
                let [value] = self.pop_n::<1>(position)?;
                self.stack.push(value.clone());
                self.stack.push(value);
            }
            OpCode::Pop => {
                self.pop_n::<1>(position)?;
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Rem => {
                let [a, b] = self.pop_n::<2>(position)?;
                let result = arithmetic(instruction.opcode, &a, &b)
                    .ok_or_else(|| unsupported_values(instruction, &[a.clone(), b.clone()]))??;
                self.stack.push(result);
            }
            OpCode::Neg => {
                let [value] = self.pop_n::<1>(position)?;
                let result = match value {
                    EmValue::I32(v) => EmValue::I32(v.wrapping_neg()),
                    EmValue::F32(v) => EmValue::F32(-v),
                    EmValue::F64(v) => EmValue::F64(-v),
                    other => return Err(unsupported_values(instruction, &[other])),
                };
                self.stack.push(result);
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::Clt => {
                let [a, b] = self.pop_n::<2>(position)?;
                let ordering = match (&a, &b) {
                    (EmValue::I32(x), EmValue::I32(y)) => x.partial_cmp(y),
                    (EmValue::F32(x), EmValue::F32(y)) => x.partial_cmp(y),
                    (EmValue::F64(x), EmValue::F64(y)) => x.partial_cmp(y),
                    _ => return Err(unsupported_values(instruction, &[a, b])),
                };
                let expected = match instruction.opcode {
                    OpCode::Ceq => std::cmp::Ordering::Equal,
                    OpCode::Cgt => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Less,
                };
                self.stack.push(EmValue::from(ordering == Some(expected)));
            }
            OpCode::ConvI4 | OpCode::ConvR4 | OpCode::ConvR8 => {
                let [value] = self.pop_n::<1>(position)?;
                let result = convert(instruction.opcode, &value)
                    .ok_or_else(|| unsupported_values(instruction, &[value.clone()]))?;
                self.stack.push(result);
            }
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => self.call(position, instruction)?,
            OpCode::Ret => {
                let value = self.stack.pop();
                self.returned = Some(value);
            }
            OpCode::Br
            | OpCode::BrS
            | OpCode::Brfalse
            | OpCode::BrfalseS
            | OpCode::Brtrue
            | OpCode::BrtrueS
            | OpCode::Beq
            | OpCode::Blt
            | OpCode::Switch
            | OpCode::Leave
            | OpCode::LeaveS
            | OpCode::Throw
            | OpCode::Endfinally => return Err(unsupported(instruction)),
        }
        Ok(())
    }

    fn call(&mut self, position: usize, instruction: &Instruction) -> Result<()> {
        let token = instruction
            .method_token()
            .ok_or_else(|| malformed_error!("'{}' without a method operand", instruction))?;
        let (resolver, hooks) = (self.resolver, self.hooks);
        let member = resolver
            .resolve_member(token)
            .ok_or_else(|| malformed_error!("Call target {} does not resolve", token))?;
        let signature = member.signature;
        let hook = hooks
            .find(member.declaring_type, member.name)
            .ok_or_else(|| {
                Error::NotSupported(format!(
                    "No hook for {}.{}",
                    member.declaring_type, member.name
                ))
            })?;

        let arg_count = signature.params.len();
        let takes_this = signature.has_this && instruction.opcode != OpCode::Newobj;
        let needed = arg_count + usize::from(takes_this);
        if self.stack.len() < needed {
            return Err(Error::StackUnderflow {
                position,
                needed,
                available: self.stack.len(),
            });
        }
        let args = self.stack.split_off(self.stack.len() - arg_count);
        let this = if takes_this { self.stack.pop() } else { None };

        let result = hook.invoke(&HookContext {
            declaring_type: member.declaring_type,
            method: member.name,
            signature,
            this: this.as_ref(),
            args: &args,
        })?;

        match (instruction.opcode, &this) {
            (OpCode::Newobj, _) => self.stack.push(result),
            (_, Some(EmValue::ManagedPtr(local))) if member.name == ".ctor" => {
                self.set_local(*local, result)?;
            }
            _ if signature.returns_value() => self.stack.push(result),
            _ => {}
        }
        Ok(())
    }

    fn pop_n<const N: usize>(&mut self, position: usize) -> Result<[EmValue; N]> {
        if self.stack.len() < N {
            return Err(Error::StackUnderflow {
                position,
                needed: N,
                available: self.stack.len(),
            });
        }
        let values = self.stack.split_off(self.stack.len() - N);
        values
            .try_into()
            .map_err(|_| Error::Error("Evaluation stack length mismatch".to_string()))
    }

    fn load_arg(&mut self, index: usize) -> Result<()> {
        let value = self
            .args
            .get(index)
            .cloned()
            .ok_or_else(|| Error::NotSupported(format!("Argument A_{index} is not bound")))?;
        self.stack.push(value);
        Ok(())
    }

    fn local_operand(&self, instruction: &Instruction) -> Result<LocalId> {
        instruction
            .local()
            .ok_or_else(|| malformed_error!("'{}' without local operand", instruction))
    }

    fn read_local(&self, local: LocalId) -> Result<&EmValue> {
        self.locals
            .get(local.index())
            .ok_or_else(|| Error::LocalNotFound(local.to_string()))
    }
}

fn arithmetic(opcode: OpCode, a: &EmValue, b: &EmValue) -> Option<Result<EmValue>> {
    Some(match (a, b) {
        (EmValue::I32(x), EmValue::I32(y)) => {
            let (x, y) = (*x, *y);
            if matches!(opcode, OpCode::Div | OpCode::Rem) && y == 0 {
                return Some(Err(Error::Error("DivideByZeroException".to_string())));
            }
            Ok(EmValue::I32(match opcode {
                OpCode::Add => x.wrapping_add(y),
                OpCode::Sub => x.wrapping_sub(y),
                OpCode::Mul => x.wrapping_mul(y),
                OpCode::Div => x.wrapping_div(y),
                _ => x.wrapping_rem(y),
            }))
        }
        (EmValue::F32(x), EmValue::F32(y)) => Ok(EmValue::F32(match opcode {
            OpCode::Add => x + y,
            OpCode::Sub => x - y,
            OpCode::Mul => x * y,
            OpCode::Div => x / y,
            _ => x % y,
        })),
        (EmValue::F64(x), EmValue::F64(y)) => Ok(EmValue::F64(match opcode {
            OpCode::Add => x + y,
            OpCode::Sub => x - y,
            OpCode::Mul => x * y,
            OpCode::Div => x / y,
            _ => x % y,
        })),
        _ => return None,
    })
}

// Conversions follow the CIL rules for in-range values; out-of-range float to int saturates
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn convert(opcode: OpCode, value: &EmValue) -> Option<EmValue> {
    match (opcode, value) {
        (OpCode::ConvR4, EmValue::I32(v)) => Some(EmValue::F32(*v as f32)),
        (OpCode::ConvR4, EmValue::F32(v)) => Some(EmValue::F32(*v)),
        (OpCode::ConvR4, EmValue::F64(v)) => Some(EmValue::F32(*v as f32)),
        (OpCode::ConvR8, EmValue::I32(v)) => Some(EmValue::F64(f64::from(*v))),
        (OpCode::ConvR8, EmValue::F32(v)) => Some(EmValue::F64(f64::from(*v))),
        (OpCode::ConvR8, EmValue::F64(v)) => Some(EmValue::F64(*v)),
        (OpCode::ConvI4, EmValue::I32(v)) => Some(EmValue::I32(*v)),
        (OpCode::ConvI4, EmValue::F32(v)) => Some(EmValue::I32(*v as i32)),
        (OpCode::ConvI4, EmValue::F64(v)) => Some(EmValue::I32(*v as i32)),
        _ => None,
    }
}

fn unsupported(instruction: &Instruction) -> Error {
    Error::NotSupported(format!("Cannot evaluate '{instruction}'"))
}

fn unsupported_values(instruction: &Instruction, values: &[EmValue]) -> Error {
    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
    Error::NotSupported(format!(
        "Cannot evaluate '{}' on ({})",
        instruction,
        values.join(", ")
    ))
}
