//! Fluent construction of instruction sequences with named labels.
//!
//! [`InstructionAssembler`] records instructions in order and lets branches and exception
//! regions refer to positions by label name. Labels are resolved when the sequence is placed into
//! a [`MethodBody`], either appended ([`InstructionAssembler::append_to`]) or spliced before an
//! existing instruction ([`InstructionAssembler::insert_before`]). In the second case a label
//! defined after the last emitted instruction names the anchor itself.
//!
//! All labels are checked before the body is touched: an undefined or dangling label leaves the
//! body unchanged.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::InstructionAssembler;
//! use cilpatch::metadata::method::{LocalId, MethodBody};
//!
//! let mut asm = InstructionAssembler::new();
//! asm.ldloc(LocalId(0))?
//!     .brfalse("skip")?
//!     .ldc_i4(1)?
//!     .stloc(LocalId(0))?
//!     .label("skip")?
//!     .ret()?;
//!
//! let mut body = MethodBody::new();
//! let ids = asm.append_to(&mut body)?;
//! assert_eq!(body.len(), 5);
//! assert_eq!(body.get(ids[1]).unwrap().targets(), vec![ids[4]]);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{Immediate, Instruction, Operand},
        opcodes::OpCode,
    },
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, InstrId, LocalId, MethodBody},
        token::Token,
    },
    Error, Result,
};

enum Pending {
    Ready(Instruction),
    Branch(OpCode, String),
    Switch(Vec<String>),
}

struct PendingRegion {
    flags: ExceptionHandlerFlags,
    try_start: String,
    try_end: String,
    handler_start: String,
    handler_end: Option<String>,
    catch_type: Option<Token>,
}

/// Where a label lands once the sequence is placed.
#[derive(Clone, Copy)]
enum Resolved {
    Emitted(usize),
    End,
}

/// Builder for instruction sequences.
///
/// One method per opcode the crate emits; each returns `Result<&mut Self>` so calls chain with
/// `?`. Local and constant loads pick the shortest encoding for their operand.
#[derive(Default)]
pub struct InstructionAssembler {
    items: Vec<Pending>,
    labels: HashMap<String, usize>,
    regions: Vec<PendingRegion>,
}

impl InstructionAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing was emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Emits a prepared instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the operand does not match the opcode.
    pub fn emit(&mut self, instruction: Instruction) -> Result<&mut Self> {
        instruction.validate()?;
        self.items.push(Pending::Ready(instruction));
        Ok(self)
    }

    fn op(&mut self, opcode: OpCode) -> Result<&mut Self> {
        self.emit(Instruction::simple(opcode))
    }

    fn with(&mut self, opcode: OpCode, operand: Operand) -> Result<&mut Self> {
        self.emit(Instruction::new(opcode, operand))
    }

    fn branch(&mut self, opcode: OpCode, label: &str) -> Result<&mut Self> {
        self.items.push(Pending::Branch(opcode, label.to_string()));
        Ok(self)
    }

    /// Defines `name` at the position of the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the label is already defined.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(malformed_error!("Label '{}' is defined twice", name));
        }
        self.labels.insert(name.to_string(), self.items.len());
        Ok(self)
    }

    /// Declares an exception handling clause bounded by labels.
    ///
    /// The try block spans `[try_start, try_end)`; the handler starts at `handler_start` and
    /// runs to `handler_end`, or to the end of the body if `None`.
    ///
    /// # Errors
    ///
    /// Never fails on declaration; undefined labels are reported when the sequence is placed.
    pub fn exception_region(
        &mut self,
        flags: ExceptionHandlerFlags,
        try_start: &str,
        try_end: &str,
        handler_start: &str,
        handler_end: Option<&str>,
        catch_type: Option<Token>,
    ) -> Result<&mut Self> {
        self.regions.push(PendingRegion {
            flags,
            try_start: try_start.to_string(),
            try_end: try_end.to_string(),
            handler_start: handler_start.to_string(),
            handler_end: handler_end.map(str::to_string),
            catch_type,
        });
        Ok(self)
    }

    /// `nop`
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Nop)
    }

    /// `ldarg.0`
    pub fn ldarg_0(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldarg0)
    }

    /// `ldarg.1`
    pub fn ldarg_1(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldarg1)
    }

    /// Loads a local: `ldloc.N`, `ldloc.s` or `ldloc`.
    pub fn ldloc(&mut self, local: LocalId) -> Result<&mut Self> {
        match local.0 {
            0 => self.op(OpCode::Ldloc0),
            1 => self.op(OpCode::Ldloc1),
            2 => self.op(OpCode::Ldloc2),
            3 => self.op(OpCode::Ldloc3),
            4..=255 => self.with(OpCode::LdlocS, Operand::Local(local)),
            _ => self.with(OpCode::Ldloc, Operand::Local(local)),
        }
    }

    /// Stores into a local: `stloc.N`, `stloc.s` or `stloc`.
    pub fn stloc(&mut self, local: LocalId) -> Result<&mut Self> {
        match local.0 {
            0 => self.op(OpCode::Stloc0),
            1 => self.op(OpCode::Stloc1),
            2 => self.op(OpCode::Stloc2),
            3 => self.op(OpCode::Stloc3),
            4..=255 => self.with(OpCode::StlocS, Operand::Local(local)),
            _ => self.with(OpCode::Stloc, Operand::Local(local)),
        }
    }

    /// Loads the address of a local: `ldloca.s` or `ldloca`.
    pub fn ldloca(&mut self, local: LocalId) -> Result<&mut Self> {
        if local.0 <= u16::from(u8::MAX) {
            self.with(OpCode::LdlocaS, Operand::Local(local))
        } else {
            self.with(OpCode::Ldloca, Operand::Local(local))
        }
    }

    /// `ldnull`
    pub fn ldnull(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldnull)
    }

    /// Loads a 32-bit integer constant using the shortest form.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1 => self.op(OpCode::LdcI4M1),
            0 => self.op(OpCode::LdcI40),
            1 => self.op(OpCode::LdcI41),
            _ => match i8::try_from(value) {
                Ok(short) => self.with(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(short))),
                Err(_) => self.with(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))),
            },
        }
    }

    /// `ldc.r4`
    pub fn ldc_r4(&mut self, value: f32) -> Result<&mut Self> {
        self.with(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// `dup`
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Dup)
    }

    /// `pop`
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Pop)
    }

    /// `call`
    pub fn call(&mut self, method: Token) -> Result<&mut Self> {
        self.with(OpCode::Call, Operand::Method(method))
    }

    /// `callvirt`
    pub fn callvirt(&mut self, method: Token) -> Result<&mut Self> {
        self.with(OpCode::Callvirt, Operand::Method(method))
    }

    /// `newobj`
    pub fn newobj(&mut self, constructor: Token) -> Result<&mut Self> {
        self.with(OpCode::Newobj, Operand::Method(constructor))
    }

    /// `ret`
    pub fn ret(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ret)
    }

    /// `add`
    pub fn add(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Add)
    }

    /// `sub`
    pub fn sub(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Sub)
    }

    /// `mul`
    pub fn mul(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Mul)
    }

    /// `div`
    pub fn div(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Div)
    }

    /// `conv.r4`
    pub fn conv_r4(&mut self) -> Result<&mut Self> {
        self.op(OpCode::ConvR4)
    }

    /// `ceq`
    pub fn ceq(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ceq)
    }

    /// `clt`
    pub fn clt(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Clt)
    }

    /// `throw`
    pub fn throw(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Throw)
    }

    /// `endfinally`
    pub fn endfinally(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Endfinally)
    }

    /// `br` to a label
    pub fn br(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Br, label)
    }

    /// `brtrue` to a label
    pub fn brtrue(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Brtrue, label)
    }

    /// `brfalse` to a label
    pub fn brfalse(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Brfalse, label)
    }

    /// `blt` to a label
    pub fn blt(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Blt, label)
    }

    /// `leave` to a label
    pub fn leave(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Leave, label)
    }

    /// `switch` over a table of labels
    pub fn switch(&mut self, labels: &[&str]) -> Result<&mut Self> {
        self.items.push(Pending::Switch(
            labels.iter().map(|label| (*label).to_string()).collect(),
        ));
        Ok(self)
    }

    /// Appends the sequence to the end of `body` and returns the new handles in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for undefined labels, or for a branch whose label was defined
    /// after the last instruction (there is nothing to jump to).
    pub fn append_to(self, body: &mut MethodBody) -> Result<Vec<InstrId>> {
        self.place(body, None)
    }

    /// Inserts the sequence immediately before `anchor` and returns the new handles in order.
    ///
    /// Labels defined after the last emitted instruction resolve to `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAnchor`] if `anchor` is not part of `body`, and
    /// [`Error::Malformed`] for undefined labels.
    pub fn insert_before(self, body: &mut MethodBody, anchor: InstrId) -> Result<Vec<InstrId>> {
        if !body.contains(anchor) {
            return Err(Error::InvalidAnchor(anchor));
        }
        self.place(body, Some(anchor))
    }

    /// Turns the assembler into plain instructions, for sequences without labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if any branch or exception region was declared.
    pub fn into_instructions(self) -> Result<Vec<Instruction>> {
        if !self.regions.is_empty() {
            return Err(malformed_error!(
                "Exception regions need a body to be placed into"
            ));
        }
        self.items
            .into_iter()
            .map(|item| match item {
                Pending::Ready(instruction) => Ok(instruction),
                Pending::Branch(opcode, label) => Err(malformed_error!(
                    "'{}' to label '{}' needs a body to be placed into",
                    opcode,
                    label
                )),
                Pending::Switch(_) => {
                    Err(malformed_error!("'switch' needs a body to be placed into"))
                }
            })
            .collect()
    }

    fn resolve(&self, label: &str) -> Result<Resolved> {
        match self.labels.get(label) {
            Some(&index) if index < self.items.len() => Ok(Resolved::Emitted(index)),
            Some(_) => Ok(Resolved::End),
            None => Err(malformed_error!("Label '{}' is not defined", label)),
        }
    }

    fn place(self, body: &mut MethodBody, anchor: Option<InstrId>) -> Result<Vec<InstrId>> {
        // Resolve everything up front so a bad label leaves the body untouched
        let target_of = |resolved: Resolved, label: &str| -> Result<()> {
            match (resolved, anchor) {
                (Resolved::End, None) => Err(malformed_error!(
                    "Label '{}' points past the last instruction",
                    label
                )),
                _ => Ok(()),
            }
        };

        let mut fixups: Vec<(usize, Vec<Resolved>)> = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            match item {
                Pending::Ready(_) => {}
                Pending::Branch(_, label) => {
                    let resolved = self.resolve(label)?;
                    target_of(resolved, label)?;
                    fixups.push((index, vec![resolved]));
                }
                Pending::Switch(labels) => {
                    let mut resolved = Vec::with_capacity(labels.len());
                    for label in labels {
                        let target = self.resolve(label)?;
                        target_of(target, label)?;
                        resolved.push(target);
                    }
                    fixups.push((index, resolved));
                }
            }
        }

        let mut regions = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let try_start = self.resolve(&region.try_start)?;
            let handler_start = self.resolve(&region.handler_start)?;
            target_of(try_start, &region.try_start)?;
            target_of(handler_start, &region.handler_start)?;
            let try_end = self.resolve(&region.try_end)?;
            let handler_end = match &region.handler_end {
                Some(label) => Some(self.resolve(label)?),
                None => None,
            };
            regions.push((region, try_start, try_end, handler_start, handler_end));
        }

        let placeholders: Vec<Instruction> = self
            .items
            .iter()
            .map(|item| match item {
                Pending::Ready(instruction) => instruction.clone(),
                Pending::Branch(opcode, _) => Instruction::simple(*opcode),
                Pending::Switch(_) => Instruction::simple(OpCode::Switch),
            })
            .collect();

        let ids = match anchor {
            Some(anchor) => body.insert_before(anchor, placeholders)?,
            None => placeholders
                .into_iter()
                .map(|instruction| body.push(instruction))
                .collect(),
        };

        // End labels resolve to the anchor, or to "end of body" for region ends when appending
        let handle = |resolved: Resolved| -> Option<InstrId> {
            match resolved {
                Resolved::Emitted(index) => Some(ids[index]),
                Resolved::End => anchor,
            }
        };

        for (index, targets) in fixups {
            let handles: Vec<InstrId> = targets.into_iter().filter_map(handle).collect();
            if let Some(instruction) = body.get_mut(ids[index]) {
                instruction.operand = match instruction.opcode {
                    OpCode::Switch => Operand::Switch(handles),
                    _ => match handles.first() {
                        Some(target) => Operand::Target(*target),
                        None => Operand::None,
                    },
                };
            }
        }

        for (region, try_start, try_end, handler_start, handler_end) in regions {
            let (Some(try_start), Some(handler_start)) = (handle(try_start), handle(handler_start))
            else {
                continue;
            };
            body.add_exception_handler(ExceptionHandler {
                flags: region.flags,
                try_start,
                try_end: handle(try_end),
                handler_start,
                handler_end: handler_end.and_then(handle),
                filter_start: None,
                catch_type: region.catch_type,
            })?;
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_forms() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldloc(LocalId(2))?
            .ldloc(LocalId(7))?
            .ldloc(LocalId(300))?
            .stloc(LocalId(0))?
            .ldloca(LocalId(1))?
            .ldc_i4(1)?
            .ldc_i4(100)?
            .ldc_i4(1000)?;
        let opcodes: Vec<OpCode> = asm
            .into_instructions()?
            .iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::Ldloc2,
                OpCode::LdlocS,
                OpCode::Ldloc,
                OpCode::Stloc0,
                OpCode::LdlocaS,
                OpCode::LdcI41,
                OpCode::LdcI4S,
                OpCode::LdcI4,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_label() {
        let mut asm = InstructionAssembler::new();
        asm.label("a").unwrap();
        assert!(matches!(asm.label("a"), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_undefined_label_leaves_body_untouched() {
        let mut body = MethodBody::new();
        body.push(Instruction::simple(OpCode::Ret));

        let mut asm = InstructionAssembler::new();
        asm.nop().unwrap().br("nowhere").unwrap();
        assert!(matches!(
            asm.append_to(&mut body),
            Err(Error::Malformed { .. })
        ));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_end_label_resolves_to_anchor() {
        let mut body = MethodBody::new();
        let anchor = body.push(Instruction::simple(OpCode::Ret));

        let mut asm = InstructionAssembler::new();
        asm.ldc_i4(0).unwrap().brtrue("after").unwrap().nop().unwrap().label("after").unwrap();
        let ids = asm.insert_before(&mut body, anchor).unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(body.get(ids[1]).unwrap().targets(), vec![anchor]);
        assert_eq!(body.position_of(anchor), Some(3));
    }

    #[test]
    fn test_end_label_rejected_when_appending() {
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new();
        asm.br("end").unwrap().label("end").unwrap();
        assert!(asm.append_to(&mut body).is_err());
        assert!(body.is_empty());
    }

    #[test]
    fn test_switch_and_regions() {
        let mut asm = InstructionAssembler::new();
        asm.label("try")
            .unwrap()
            .ldc_i4(0)
            .unwrap()
            .switch(&["a", "b"])
            .unwrap()
            .label("a")
            .unwrap()
            .leave("exit")
            .unwrap()
            .label("b")
            .unwrap()
            .leave("exit")
            .unwrap()
            .label("finally")
            .unwrap()
            .endfinally()
            .unwrap()
            .label("exit")
            .unwrap()
            .ret()
            .unwrap()
            .exception_region(
                ExceptionHandlerFlags::FINALLY,
                "try",
                "finally",
                "finally",
                Some("exit"),
                None,
            )
            .unwrap();

        let mut body = MethodBody::new();
        let ids = asm.append_to(&mut body).unwrap();
        assert_eq!(body.get(ids[1]).unwrap().targets(), vec![ids[2], ids[3]]);
        assert_eq!(body.get(ids[2]).unwrap().targets(), vec![ids[5]]);

        let clause = &body.exception_handlers()[0];
        assert_eq!(clause.try_start, ids[0]);
        assert_eq!(clause.try_end, Some(ids[4]));
        assert_eq!(clause.handler_start, ids[4]);
        assert_eq!(clause.handler_end, Some(ids[5]));
    }

    #[test]
    fn test_into_instructions_rejects_branches() {
        let mut asm = InstructionAssembler::new();
        asm.label("top").unwrap().br("top").unwrap();
        assert!(asm.into_instructions().is_err());
    }
}
