//! Integration tests for the texture resolution patch pass.
//!
//! These tests run complete passes over generated game modules and check the patched bodies:
//! anchor placement, stack balance, the patch-once guarantee and the failure modes.

mod common;

use cilpatch::{
    assembly::net_stack_effect,
    patch::{allocate_local, Splicer},
    prelude::*,
};
use common::Shape;

fn patch() -> Result<TextureResolutionPatch> {
    TextureResolutionPatch::new(PatchConfig::default())
}

#[test]
fn patch_mul_tex_proc() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape::default())?;
    let before = common::target_body(&game).len();

    let report = patch()?.patch(&mut game, &engine)?;
    let body = common::target_body(&game);

    assert_eq!(report.method, common::target(&game));
    assert_eq!(report.position_local, LocalId(1));
    assert_eq!(report.scale_local, LocalId(3));
    assert_eq!(report.ratio_local, LocalId(4));
    assert_eq!(body.locals().len(), 5);
    assert_eq!(
        body.local(report.ratio_local).map(|l| &l.signature),
        Some(&TypeSignature::ValueType(common::vector()))
    );
    assert_eq!(body.len(), before + 12 + 8);
    assert_eq!(body.max_stack, report.max_stack);
    Ok(())
}

#[test]
fn anchor_order_invariance() -> Result<()> {
    let engine = common::engine(true);
    let patch = patch()?;

    for before in 0..3 {
        for between in 0..3 {
            for after in 0..3 {
                let shape = Shape {
                    before,
                    between,
                    after,
                    push: true,
                };
                let mut game = common::game(shape)?;
                let (activation, push) = {
                    let body = common::target_body(&game);
                    (
                        patch.activation_anchor().locate(body, &game)?,
                        patch.push_anchor().locate(body, &game)?,
                    )
                };

                let report = patch.patch(&mut game, &engine)?;
                let body = common::target_body(&game);

                assert_eq!(report.ratio_splice.anchor, activation);
                assert_eq!(report.scale_splice.anchor, push);

                let anchor_at = body.position_of(activation).unwrap();
                let ratio_start = anchor_at - report.ratio_splice.inserted.len();
                assert_eq!(&body.ids()[ratio_start..anchor_at], &report.ratio_splice.inserted[..]);

                let push_at = body.position_of(push).unwrap();
                let scale_start = push_at - report.scale_splice.inserted.len();
                assert_eq!(&body.ids()[scale_start..push_at], &report.scale_splice.inserted[..]);

                // the instruction before the ratio block is still the activation call
                let activation_call = body.at(ratio_start - 1).and_then(|id| body.get(id)).unwrap();
                let callee = activation_call
                    .method_token()
                    .and_then(|token| game.resolve_member(token))
                    .unwrap();
                assert_eq!(callee.name, "set_active");
            }
        }
    }
    Ok(())
}

#[test]
fn stack_balance_preserved() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape {
        before: 2,
        between: 2,
        after: 2,
        push: true,
    })?;

    let report = patch()?.patch(&mut game, &engine)?;
    let method = game.method(report.method).unwrap();
    let body = method.body.as_ref().unwrap();

    let stack = StackAnalyzer::new(&game, &method.signature).analyze(body)?;
    for splice in [&report.ratio_splice, &report.scale_splice] {
        let block: Vec<Instruction> = splice
            .inserted
            .iter()
            .filter_map(|id| body.get(*id).cloned())
            .collect();
        assert_eq!(net_stack_effect(&game, &block)?, 0);

        let start = body.position_of(splice.inserted[0]).unwrap();
        let anchor = body.position_of(splice.anchor).unwrap();
        assert_eq!(stack.depth_at(start), stack.depth_at(anchor));
    }
    assert_eq!(stack.max_depth(), 4);
    Ok(())
}

#[test]
fn control_flow_untouched() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape::default())?;

    let (handlers, targets) = {
        let body = common::target_body(&game);
        let targets: Vec<_> = body
            .iter()
            .map(|(id, instruction)| (id, instruction.targets()))
            .filter(|(_, targets)| !targets.is_empty())
            .collect();
        (body.exception_handlers().to_vec(), targets)
    };

    patch()?.patch(&mut game, &engine)?;
    let body = common::target_body(&game);

    assert_eq!(body.exception_handlers(), &handlers[..]);
    for (id, expected) in targets {
        assert_eq!(body.get(id).map(Instruction::targets), Some(expected));
    }
    Ok(())
}

#[test]
fn idempotency() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape::default())?;
    let patch = patch()?;

    assert!(patch.can_patch(&game));
    patch.patch(&mut game, &engine)?;
    // the persistence step writes the marker
    assert!(patch.guard().mark_patched(&mut game));
    assert!(!patch.can_patch(&game));

    let listing = common::target_body(&game).to_string();
    let locals = common::target_body(&game).locals().len();

    let err = patch.patch(&mut game, &engine).unwrap_err();
    assert!(err.is_skip());
    assert!(matches!(
        err,
        Error::ModuleNotEligible {
            reason: IneligibleReason::AlreadyPatched { .. },
            ..
        }
    ));
    assert_eq!(common::target_body(&game).to_string(), listing);
    assert_eq!(common::target_body(&game).locals().len(), locals);

    assert_eq!(
        patch.apply(&mut game, &engine)?,
        PatchOutcome::Skipped(IneligibleReason::AlreadyPatched {
            marker: "CM3D2_TEXTURERESOLUTION".to_string()
        })
    );
    Ok(())
}

#[test]
fn skip_is_not_failure() -> Result<()> {
    let engine = common::engine(true);
    let patch = patch()?;

    let mut other = Module::new("Assembly-CSharp-firstpass");
    let outcome = patch.apply(&mut other, &engine)?;
    assert!(matches!(
        outcome,
        PatchOutcome::Skipped(IneligibleReason::WrongModule { .. })
    ));

    let mut broken = common::game(Shape {
        push: false,
        ..Shape::default()
    })?;
    let err = patch.apply(&mut broken, &engine).unwrap_err();
    assert!(!err.is_skip());
    assert!(err.is_shape_mismatch());
    Ok(())
}

#[test]
fn missing_anchor_leaves_body_unmodified() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape {
        push: false,
        ..Shape::default()
    })?;
    let listing = common::target_body(&game).to_string();
    let locals = common::target_body(&game).locals().len();

    let patch = patch()?;
    let mut pass = PatchPass::new();
    let err = patch.run(&mut pass, &mut game, &engine).unwrap_err();

    match err {
        Error::AnchorNotFound(anchor) => assert_eq!(anchor, "push [call PushMatrix]"),
        other => panic!("expected AnchorNotFound, got {other}"),
    }
    assert!(matches!(pass.state(), PatchState::Failed(_)));
    assert!(pass.reached(&PatchState::MethodResolved));
    assert!(!pass.reached(&PatchState::LocalAllocated));

    // anchors are located before the local is allocated, so nothing was added
    assert_eq!(common::target_body(&game).to_string(), listing);
    assert_eq!(common::target_body(&game).locals().len(), locals);
    Ok(())
}

#[test]
fn unanalyzable_body_is_rejected_before_allocation() -> Result<()> {
    let engine = common::engine(true);
    let mut game = common::game(Shape::default())?;
    let method = common::target(&game);

    // a generic instantiation call the module model cannot resolve
    {
        let body = game.method_mut(method).and_then(|m| m.body.as_mut()).unwrap();
        let ret = body.at(body.len() - 1).unwrap();
        body.insert_before(
            ret,
            vec![Instruction::new(OpCode::Call, Operand::Method(Token(0x2B00_0001)))],
        )?;
    }
    let listing = common::target_body(&game).to_string();
    let len = common::target_body(&game).len();
    let locals = common::target_body(&game).locals().len();

    let mut pass = PatchPass::new();
    let err = patch()?.run(&mut pass, &mut game, &engine).unwrap_err();

    assert!(matches!(err, Error::Malformed { .. }));
    assert!(matches!(pass.state(), PatchState::Failed(_)));
    assert!(pass.reached(&PatchState::AnchorsLocated));
    assert!(!pass.reached(&PatchState::LocalAllocated));
    assert!(!pass.reached(&PatchState::Spliced));

    let body = common::target_body(&game);
    assert_eq!(body.len(), len);
    assert_eq!(body.locals().len(), locals);
    assert_eq!(body.to_string(), listing);
    Ok(())
}

#[test]
fn unresolved_vector_type() -> Result<()> {
    let engine = common::engine(false);
    let mut game = common::game(Shape::default())?;
    let listing = common::target_body(&game).to_string();
    let member_refs = game.member_refs().len();

    let err = patch()?.patch(&mut game, &engine).unwrap_err();
    assert!(matches!(err, Error::UnresolvedType(ref name) if name.contains("Vector3")));
    assert_eq!(common::target_body(&game).to_string(), listing);
    assert_eq!(game.member_refs().len(), member_refs);
    Ok(())
}

#[test]
fn failed_splice_keeps_allocated_local() -> Result<()> {
    // A failure between allocation and splicing leaves the new local behind. It is never read,
    // so the method still behaves as before; nothing rolls it back.
    let mut game = common::game(Shape::default())?;
    let foreign = common::game(Shape::default())?;
    let foreign_anchor = common::target_body(&foreign).at(0).unwrap();
    game.import_type(&common::vector());
    let method = common::target(&game);

    let result = game
        .with_body_mut(method, |module, body| -> Result<()> {
            let before = body.len();
            let local = allocate_local(
                module,
                body,
                TypeSignature::ValueType(common::vector()),
            )?;
            let err = Splicer::new(body)
                .insert_before(foreign_anchor, vec![Instruction::simple(OpCode::Nop)])
                .unwrap_err();
            assert!(matches!(err, Error::InvalidAnchor(id) if id == foreign_anchor));
            assert_eq!(body.len(), before);
            assert!(body.local(local).is_some());
            Ok(())
        })
        .unwrap();
    result?;

    assert_eq!(common::target_body(&game).locals().len(), 5);
    Ok(())
}

#[test]
fn invalid_config_rejected() {
    let config = PatchConfig {
        reference_size: -1024.0,
        ..PatchConfig::default()
    };
    assert!(matches!(
        TextureResolutionPatch::new(config),
        Err(Error::InvalidConfig(_))
    ));
}
