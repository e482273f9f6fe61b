//! Inserting instruction blocks before anchor instructions.
//!
//! The splicer is the only component of a patch pass that changes instructions. It places a
//! block immediately before an anchor, in block order. Because bodies address instructions by
//! stable handles, branches and exception regions that named the anchor keep naming it, and
//! every other handle keeps its meaning.

use log::debug;

use crate::{
    assembly::Instruction,
    metadata::method::{InstrId, MethodBody},
    Error, Result,
};

/// What a single splice inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceRecord {
    /// The instruction the block was inserted before
    pub anchor: InstrId,
    /// Handles of the inserted instructions, in order
    pub inserted: Vec<InstrId>,
}

/// Splices instruction blocks into one method body.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, OpCode};
/// use cilpatch::metadata::method::MethodBody;
/// use cilpatch::patch::Splicer;
///
/// let mut body = MethodBody::new();
/// let ret = body.push(Instruction::simple(OpCode::Ret));
///
/// let mut splicer = Splicer::new(&mut body);
/// let record = splicer.insert_before(ret, vec![Instruction::simple(OpCode::Nop)])?;
/// assert_eq!(record.inserted.len(), 1);
/// assert_eq!(body.at(1), Some(ret));
/// # Ok::<(), cilpatch::Error>(())
/// ```
pub struct Splicer<'a> {
    body: &'a mut MethodBody,
    records: Vec<SpliceRecord>,
}

impl<'a> Splicer<'a> {
    /// Creates a splicer over `body`.
    pub fn new(body: &'a mut MethodBody) -> Self {
        Splicer {
            body,
            records: Vec::new(),
        }
    }

    /// Inserts `block` immediately before `anchor`.
    ///
    /// The block is checked completely before the body is touched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAnchor`] if `anchor` does not belong to the body
    /// - [`Error::LocalNotFound`] if an instruction refers to a local the body does not have
    /// - [`Error::Malformed`] if an instruction's operand does not fit its opcode
    pub fn insert_before(&mut self, anchor: InstrId, block: Vec<Instruction>) -> Result<SpliceRecord> {
        if !self.body.contains(anchor) {
            return Err(Error::InvalidAnchor(anchor));
        }
        for instruction in &block {
            instruction.validate()?;
            if let Some(local) = instruction.local() {
                if self.body.local(local).is_none() {
                    return Err(Error::LocalNotFound(format!(
                        "{local} referenced by '{instruction}'"
                    )));
                }
            }
            if let Some(target) = instruction.targets().into_iter().find(|t| !self.body.contains(*t)) {
                return Err(Error::InvalidAnchor(target));
            }
        }

        let inserted = self.body.insert_before(anchor, block)?;
        debug!(
            "Spliced {} instructions before {} in body {}",
            inserted.len(),
            anchor,
            self.body.id()
        );

        let record = SpliceRecord { anchor, inserted };
        self.records.push(record.clone());
        Ok(record)
    }

    /// Records of all splices done so far.
    #[must_use]
    pub fn records(&self) -> &[SpliceRecord] {
        &self.records
    }

    /// Number of instructions inserted so far.
    #[must_use]
    pub fn inserted_count(&self) -> usize {
        self.records.iter().map(|record| record.inserted.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{InstructionAssembler, OpCode, Operand},
        metadata::{method::LocalId, TypeSignature},
    };

    fn branchy_body() -> (MethodBody, Vec<InstrId>) {
        let mut body = MethodBody::new();
        body.add_local(TypeSignature::I4).unwrap();
        let mut asm = InstructionAssembler::new();
        asm.ldloc(LocalId(0))
            .unwrap()
            .brtrue("anchor")
            .unwrap()
            .nop()
            .unwrap()
            .label("anchor")
            .unwrap()
            .ldc_i4(3)
            .unwrap()
            .stloc(LocalId(0))
            .unwrap()
            .ret()
            .unwrap();
        let ids = asm.append_to(&mut body).unwrap();
        (body, ids)
    }

    #[test]
    fn test_branch_targets_survive() {
        let (mut body, ids) = branchy_body();
        let anchor = ids[3];

        let mut splicer = Splicer::new(&mut body);
        let record = splicer
            .insert_before(
                anchor,
                vec![
                    Instruction::simple(OpCode::LdcI40),
                    Instruction::simple(OpCode::Stloc0),
                ],
            )
            .unwrap();
        assert_eq!(splicer.inserted_count(), 2);

        assert_eq!(body.len(), 8);
        assert_eq!(body.position_of(record.inserted[0]), Some(3));
        assert_eq!(body.position_of(record.inserted[1]), Some(4));
        assert_eq!(body.position_of(anchor), Some(5));
        assert_eq!(body.get(ids[1]).unwrap().operand, Operand::Target(anchor));
        for id in &ids {
            assert!(body.contains(*id));
        }
    }

    #[test]
    fn test_rejects_foreign_anchor() {
        let (mut body, _) = branchy_body();
        let (_, foreign) = branchy_body();
        let before = body.len();

        let mut splicer = Splicer::new(&mut body);
        let result = splicer.insert_before(foreign[0], vec![Instruction::simple(OpCode::Nop)]);
        assert!(matches!(result, Err(Error::InvalidAnchor(id)) if id == foreign[0]));
        assert!(splicer.records().is_empty());
        assert_eq!(body.len(), before);
    }

    #[test]
    fn test_rejects_missing_local() {
        let (mut body, ids) = branchy_body();
        let mut splicer = Splicer::new(&mut body);
        let result = splicer.insert_before(
            ids[0],
            vec![
                Instruction::simple(OpCode::LdcI40),
                Instruction::new(OpCode::StlocS, Operand::Local(LocalId(9))),
            ],
        );
        assert!(matches!(result, Err(Error::LocalNotFound(_))));
        assert_eq!(body.len(), 6);
    }
}
