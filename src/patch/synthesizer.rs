//! Instruction blocks injected by the texture resolution patch.
//!
//! Both builders are pure: they return instructions and never touch a method body.
//!
//! The ratio block computes `min(width, height) / reference_size` from the active render target
//! and constructs `(ratio, ratio, 1.0)` in place into the ratio local:
//!
//! ```text
//! ldloca.s  V_ratio
//! call      RenderTexture::get_active()
//! callvirt  RenderTexture::get_width()
//! call      RenderTexture::get_active()
//! callvirt  RenderTexture::get_height()
//! call      Math::Min(int32, int32)
//! conv.r4
//! ldc.r4    1024
//! div
//! dup
//! ldc.r4    1
//! call      Vector3::.ctor(float32, float32, float32)
//! ```
//!
//! A scale block multiplies a vector local component-wise by the ratio and stores it back:
//!
//! ```text
//! ldloc     V_target
//! ldloc     V_ratio
//! call      Vector3::Scale(Vector3, Vector3)
//! stloc     V_target
//! ```
//!
//! Both blocks leave the evaluation stack as they found it.

use crate::{
    assembly::{Instruction, InstructionAssembler},
    metadata::method::LocalId,
    patch::ResolvedMembers,
    Result,
};

/// Builds the block computing the ratio vector into `ratio`.
///
/// # Errors
///
/// Returns an error only if the assembler rejects the sequence.
pub fn ratio_block(
    members: &ResolvedMembers,
    ratio: LocalId,
    reference_size: f32,
) -> Result<Vec<Instruction>> {
    let mut asm = InstructionAssembler::new();
    asm.ldloca(ratio)?
        .call(members.get_active)?
        .callvirt(members.get_width)?
        .call(members.get_active)?
        .callvirt(members.get_height)?
        .call(members.math_min)?
        .conv_r4()?
        .ldc_r4(reference_size)?
        .div()?
        .dup()?
        .ldc_r4(1.0)?
        .call(members.vector_ctor)?;
    asm.into_instructions()
}

/// Builds the block storing `target * ratio` (component-wise) back into `target`.
///
/// # Errors
///
/// Returns an error only if the assembler rejects the sequence.
pub fn scale_block(
    members: &ResolvedMembers,
    target: LocalId,
    ratio: LocalId,
) -> Result<Vec<Instruction>> {
    let mut asm = InstructionAssembler::new();
    asm.ldloc(target)?
        .ldloc(ratio)?
        .call(members.vector_scale)?
        .stloc(target)?;
    asm.into_instructions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{net_stack_effect, OpCode},
        patch::{MemberRegistry, PatchConfig},
        test::factories,
    };

    fn resolved() -> (crate::metadata::Module, ResolvedMembers) {
        let engine = factories::engine_module();
        let mut game = factories::game_module();
        let members = MemberRegistry::declare(&PatchConfig::default())
            .resolve(&mut game, &engine)
            .unwrap();
        (game, members)
    }

    #[test]
    fn test_ratio_block_shape() {
        let (game, members) = resolved();
        let block = ratio_block(&members, LocalId(5), 1024.0).unwrap();

        let opcodes: Vec<OpCode> = block.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::LdlocaS,
                OpCode::Call,
                OpCode::Callvirt,
                OpCode::Call,
                OpCode::Callvirt,
                OpCode::Call,
                OpCode::ConvR4,
                OpCode::LdcR4,
                OpCode::Div,
                OpCode::Dup,
                OpCode::LdcR4,
                OpCode::Call,
            ]
        );
        assert_eq!(block[0].local(), Some(LocalId(5)));
        assert_eq!(block[5].method_token(), Some(members.math_min));
        assert_eq!(block[7].f32_operand(), Some(1024.0));
        assert_eq!(block[10].f32_operand(), Some(1.0));
        assert_eq!(net_stack_effect(&game, &block).unwrap(), 0);
    }

    #[test]
    fn test_scale_block_shape() {
        let (game, members) = resolved();
        let block = scale_block(&members, LocalId(1), LocalId(4)).unwrap();

        assert_eq!(block.len(), 4);
        assert_eq!(block[0].local(), Some(LocalId(1)));
        assert_eq!(block[1].local(), Some(LocalId(4)));
        assert_eq!(block[2].method_token(), Some(members.vector_scale));
        assert_eq!(block[3].opcode, OpCode::Stloc1);
        assert_eq!(net_stack_effect(&game, &block).unwrap(), 0);
    }
}
