//! The patch pass: eligibility, resolution, anchoring, allocation and splicing.
//!
//! A pass moves through these states, recorded by [`PatchPass`]:
//!
//! ```text
//! Unchecked -> Eligible -> MethodResolved -> AnchorsLocated -> LocalAllocated -> Spliced -> Done
//!     \
//!      -> Rejected                     (any later state) -> Failed(reason)
//! ```
//!
//! Nothing is rolled back. A failure after `LocalAllocated` leaves the new local in the method's
//! variable table. The local is never read, so the method behaves as before.

use std::fmt;

use log::{debug, info, warn};

use crate::{
    assembly::{
        block_peak_depth, net_stack_effect, AnchorPattern, InstructionPredicate, OpCode,
        StackAnalyzer, StackReport,
    },
    metadata::{
        method::{InstrId, LocalId, MethodBody},
        token::Token,
        Module, SignatureMethod, TypeSignature,
    },
    patch::{
        allocate_local, synthesizer, IdempotencyGuard, MemberRegistry, PatchConfig,
        ResolvedMembers, SpliceRecord, Splicer, PATCH_NAME,
    },
    Error, IneligibleReason, Result,
};

/// State of a patch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchState {
    /// Nothing inspected yet
    Unchecked,
    /// Module identity and marker checked
    Eligible,
    /// Target method and external members resolved
    MethodResolved,
    /// Both anchors and the existing vector locals found
    AnchorsLocated,
    /// Ratio local added to the method
    LocalAllocated,
    /// Both blocks inserted
    Spliced,
    /// Pass completed
    Done,
    /// Module turned away at the eligibility gate
    Rejected,
    /// Pass failed, with the reason
    Failed(String),
}

impl PatchState {
    /// Returns `true` for `Done`, `Rejected` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PatchState::Done | PatchState::Rejected | PatchState::Failed(_)
        )
    }
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchState::Unchecked => write!(f, "Unchecked"),
            PatchState::Eligible => write!(f, "Eligible"),
            PatchState::MethodResolved => write!(f, "MethodResolved"),
            PatchState::AnchorsLocated => write!(f, "AnchorsLocated"),
            PatchState::LocalAllocated => write!(f, "LocalAllocated"),
            PatchState::Spliced => write!(f, "Spliced"),
            PatchState::Done => write!(f, "Done"),
            PatchState::Rejected => write!(f, "Rejected"),
            PatchState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

/// State history of one patch pass.
#[derive(Debug, Clone)]
pub struct PatchPass {
    history: Vec<PatchState>,
}

impl Default for PatchPass {
    fn default() -> Self {
        PatchPass {
            history: vec![PatchState::Unchecked],
        }
    }
}

impl PatchPass {
    /// Creates a pass in [`PatchState::Unchecked`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &PatchState {
        // history starts with Unchecked and only grows
        &self.history[self.history.len() - 1]
    }

    /// Every state the pass went through, in order.
    #[must_use]
    pub fn history(&self) -> &[PatchState] {
        &self.history
    }

    /// Returns `true` if the pass went through `state`.
    #[must_use]
    pub fn reached(&self, state: &PatchState) -> bool {
        self.history.contains(state)
    }

    fn advance(&mut self, next: PatchState) {
        debug!("Patch pass: {} -> {}", self.state(), next);
        self.history.push(next);
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The patched method
    pub method: Token,
    /// The new local holding the ratio vector
    pub ratio_local: LocalId,
    /// The existing position vector local
    pub position_local: LocalId,
    /// The existing scale vector local
    pub scale_local: LocalId,
    /// The ratio block inserted after the render target activation
    pub ratio_splice: SpliceRecord,
    /// The two scale blocks inserted before the transform push
    pub scale_splice: SpliceRecord,
    /// `max_stack` of the method after patching
    pub max_stack: u16,
}

/// Result of [`TextureResolutionPatch::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The module was patched
    Applied(PatchReport),
    /// The module was not eligible; nothing was changed
    Skipped(IneligibleReason),
}

/// Scales texture-space transforms in `TBody.MulTexProc` by the active render target size.
///
/// The patch computes `min(width, height) / reference_size` right after the render target is
/// activated, and scales the position and scale vectors by it right before the transform stack
/// is pushed.
///
/// # Examples
///
/// ```rust,no_run
/// use cilpatch::patch::{PatchConfig, PatchOutcome, TextureResolutionPatch};
/// # fn modules() -> (cilpatch::metadata::Module, cilpatch::metadata::Module) { unimplemented!() }
///
/// let (mut game, engine) = modules();
/// let patch = TextureResolutionPatch::new(PatchConfig::default())?;
/// match patch.apply(&mut game, &engine)? {
///     PatchOutcome::Applied(report) => {
///         patch.guard().mark_patched(&mut game);
///         println!("ratio stored in {}", report.ratio_local);
///     }
///     PatchOutcome::Skipped(reason) => println!("{}: {reason}", patch.name()),
/// }
/// # Ok::<(), cilpatch::Error>(())
/// ```
pub struct TextureResolutionPatch {
    config: PatchConfig,
    guard: IdempotencyGuard,
    registry: MemberRegistry,
    activation_anchor: AnchorPattern,
    push_anchor: AnchorPattern,
}

impl TextureResolutionPatch {
    /// Creates the patch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(config: PatchConfig) -> Result<Self> {
        config.validate()?;

        let guard = IdempotencyGuard::new(config.module_name.clone(), config.marker.clone());
        let registry = MemberRegistry::declare(&config);
        let activation_anchor = AnchorPattern::new("activation")
            .find(InstructionPredicate::opcode(OpCode::Call).with_member(&config.activation_member))
            .next();
        let push_anchor = AnchorPattern::new("push")
            .find(InstructionPredicate::opcode(OpCode::Call).with_member(&config.push_member));

        Ok(TextureResolutionPatch {
            config,
            guard,
            registry,
            activation_anchor,
            push_anchor,
        })
    }

    /// Display name of the patch.
    #[must_use]
    pub fn name(&self) -> &'static str {
        PATCH_NAME
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// The idempotency guard, also used to write the marker after persisting.
    #[must_use]
    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// The external members the injected code calls.
    #[must_use]
    pub fn registry(&self) -> &MemberRegistry {
        &self.registry
    }

    /// The anchor the ratio block is inserted before.
    #[must_use]
    pub fn activation_anchor(&self) -> &AnchorPattern {
        &self.activation_anchor
    }

    /// The anchor the scale blocks are inserted before.
    #[must_use]
    pub fn push_anchor(&self) -> &AnchorPattern {
        &self.push_anchor
    }

    /// Returns `true` if `module` is the target and not yet patched.
    #[must_use]
    pub fn can_patch(&self, module: &Module) -> bool {
        self.guard.ineligibility(module).is_none()
    }

    /// Patches `module`, resolving external members against `dependency`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotEligible`] if the module is not the target or is already patched
    /// - [`Error::MethodNotFound`] if the target method or an external method is missing
    /// - [`Error::UnresolvedType`] if an external type is missing from `dependency`
    /// - [`Error::AnchorNotFound`] if the target method no longer has the expected shape
    /// - [`Error::LocalNotFound`] if the target method lacks the position and scale locals
    pub fn patch(&self, module: &mut Module, dependency: &Module) -> Result<PatchReport> {
        let mut pass = PatchPass::new();
        self.run(&mut pass, module, dependency)
    }

    /// Like [`TextureResolutionPatch::patch`], reporting a skip as [`PatchOutcome::Skipped`].
    ///
    /// # Errors
    ///
    /// Every error of [`TextureResolutionPatch::patch`] except [`Error::ModuleNotEligible`].
    pub fn apply(&self, module: &mut Module, dependency: &Module) -> Result<PatchOutcome> {
        match self.patch(module, dependency) {
            Ok(report) => Ok(PatchOutcome::Applied(report)),
            Err(Error::ModuleNotEligible { reason, .. }) => Ok(PatchOutcome::Skipped(reason)),
            Err(e) => Err(e),
        }
    }

    /// Runs a pass, recording its states in `pass`.
    ///
    /// Nothing is rolled back on failure. A pass that fails after
    /// [`PatchState::LocalAllocated`] leaves the new local in the body, unused; member
    /// references imported during resolution also stay in the module. Neither changes what
    /// the method does.
    ///
    /// # Errors
    ///
    /// See [`TextureResolutionPatch::patch`].
    pub fn run(
        &self,
        pass: &mut PatchPass,
        module: &mut Module,
        dependency: &Module,
    ) -> Result<PatchReport> {
        let result = self.execute(pass, module, dependency);
        match &result {
            Ok(report) => {
                pass.advance(PatchState::Done);
                info!(
                    "{}: patched {}.{} in '{}' (ratio local {}, {} instructions added)",
                    PATCH_NAME,
                    self.config.target_type,
                    self.config.target_method,
                    module.name(),
                    report.ratio_local,
                    report.ratio_splice.inserted.len() + report.scale_splice.inserted.len()
                );
            }
            Err(Error::ModuleNotEligible { module: name, reason }) => {
                pass.advance(PatchState::Rejected);
                info!("{PATCH_NAME}: skipped '{name}', {reason}");
            }
            Err(e) => {
                if pass.reached(&PatchState::LocalAllocated) {
                    warn!(
                        "{}: failed after allocating the ratio local, {}.{} keeps an unused local",
                        PATCH_NAME, self.config.target_type, self.config.target_method
                    );
                }
                pass.advance(PatchState::Failed(e.to_string()));
            }
        }
        result
    }

    fn execute(
        &self,
        pass: &mut PatchPass,
        module: &mut Module,
        dependency: &Module,
    ) -> Result<PatchReport> {
        self.guard.check_eligibility(module)?;
        pass.advance(PatchState::Eligible);

        let (method, signature) = self.resolve_method(module)?;
        let members = self.registry.resolve(module, dependency)?;
        pass.advance(PatchState::MethodResolved);

        match module.with_body_mut(method, |module, body| {
            self.rewrite(pass, module, body, &members, method, &signature)
        }) {
            Some(result) => result,
            None => Err(self.method_not_found()),
        }
    }

    fn resolve_method(&self, module: &Module) -> Result<(Token, SignatureMethod)> {
        let typedef = module
            .find_type(&self.config.target_type)
            .ok_or_else(|| self.method_not_found())?;
        typedef
            .methods_named(&self.config.target_method)
            .find(|method| method.has_parameters() && method.body.is_some())
            .map(|method| (method.token, method.signature.clone()))
            .ok_or_else(|| self.method_not_found())
    }

    fn method_not_found(&self) -> Error {
        Error::MethodNotFound {
            type_name: self.config.target_type.clone(),
            method: self.config.target_method.clone(),
        }
    }

    fn rewrite(
        &self,
        pass: &mut PatchPass,
        module: &Module,
        body: &mut MethodBody,
        members: &ResolvedMembers,
        method: Token,
        signature: &SignatureMethod,
    ) -> Result<PatchReport> {
        let ratio_anchor = self.activation_anchor.locate(body, module)?;
        let push_anchor = self.push_anchor.locate(body, module)?;
        let (position_local, scale_local) = vector_locals(body, &members.vector)?;
        pass.advance(PatchState::AnchorsLocated);

        // Verified on the untouched body, so a rejection here leaves nothing behind
        let stack = StackAnalyzer::new(module, signature).analyze(body)?;
        let ratio_depth = anchor_depth(body, &stack, ratio_anchor);
        let push_depth = anchor_depth(body, &stack, push_anchor);

        let ratio_local = allocate_local(module, body, members.vector.clone())?;
        pass.advance(PatchState::LocalAllocated);

        let ratio_block =
            synthesizer::ratio_block(members, ratio_local, self.config.reference_size)?;
        let mut scale_block = synthesizer::scale_block(members, position_local, ratio_local)?;
        scale_block.extend(synthesizer::scale_block(members, scale_local, ratio_local)?);
        for block in [&ratio_block, &scale_block] {
            let effect = net_stack_effect(module, block)?;
            if effect != 0 {
                return Err(malformed_error!(
                    "Synthesized block leaves {} values on the stack",
                    effect
                ));
            }
        }

        // The blocks are stack neutral, so only their own instructions can raise the maximum
        let peak = stack
            .max_depth()
            .max(block_peak_depth(module, &ratio_block, ratio_depth)?)
            .max(block_peak_depth(module, &scale_block, push_depth)?);

        let mut splicer = Splicer::new(body);
        let ratio_splice = splicer.insert_before(ratio_anchor, ratio_block)?;
        let scale_splice = splicer.insert_before(push_anchor, scale_block)?;
        pass.advance(PatchState::Spliced);

        body.max_stack = body
            .max_stack
            .max(u16::try_from(peak).unwrap_or(u16::MAX));

        Ok(PatchReport {
            method,
            ratio_local,
            position_local,
            scale_local,
            ratio_splice,
            scale_splice,
            max_stack: body.max_stack,
        })
    }
}

/// Stack depth on entry to `anchor`; an unreachable anchor contributes nothing.
fn anchor_depth(body: &MethodBody, stack: &StackReport, anchor: InstrId) -> usize {
    body.position_of(anchor)
        .and_then(|position| stack.depth_at(position))
        .unwrap_or(0)
}

/// First and last local of the vector type: the position and scale vectors.
fn vector_locals(body: &MethodBody, vector: &TypeSignature) -> Result<(LocalId, LocalId)> {
    let mut matching = body
        .locals()
        .iter()
        .filter(|local| local.signature.type_name() == vector.type_name());
    let first = matching.next();
    let last = matching.last();
    match (first, last) {
        (Some(position), Some(scale)) => Ok((position.id, scale.id)),
        _ => Err(Error::LocalNotFound(format!(
            "two locals of type {} (found {})",
            vector,
            usize::from(first.is_some())
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories;

    #[test]
    fn test_state_history_on_success() {
        let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
        let engine = factories::engine_module();
        let mut game = factories::game_module();

        let mut pass = PatchPass::new();
        let report = patch.run(&mut pass, &mut game, &engine).unwrap();
        assert_eq!(
            pass.history(),
            &[
                PatchState::Unchecked,
                PatchState::Eligible,
                PatchState::MethodResolved,
                PatchState::AnchorsLocated,
                PatchState::LocalAllocated,
                PatchState::Spliced,
                PatchState::Done,
            ]
        );
        assert!(pass.state().is_terminal());
        assert_eq!(report.ratio_splice.inserted.len(), 12);
        assert_eq!(report.scale_splice.inserted.len(), 8);
        assert!(report.max_stack >= 4);
    }

    #[test]
    fn test_rejected_at_gate() {
        let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
        let engine = factories::engine_module();
        let mut other = Module::new("UnityEngine");

        let mut pass = PatchPass::new();
        let err = patch.run(&mut pass, &mut other, &engine).unwrap_err();
        assert!(err.is_skip());
        assert_eq!(pass.state(), &PatchState::Rejected);
        assert!(!patch.can_patch(&other));
    }

    #[test]
    fn test_selects_overload_with_parameters() {
        let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
        let game = factories::game_module();
        let (token, signature) = patch.resolve_method(&game).unwrap();
        assert!(!signature.params.is_empty());
        assert!(game.method(token).unwrap().has_parameters());
    }

    #[test]
    fn test_skips_parameterized_overload_without_body() {
        use crate::metadata::{
            method::{MethodDef, MethodFlags},
            TypeDef, TypeFlavor, TypeName,
        };

        let declared = MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::I4]),
        );
        let implemented = MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
        )
        .with_body(MethodBody::new());

        let mut tbody = TypeDef::new(TypeName::new("", "TBody"), TypeFlavor::Class);
        tbody.methods = vec![declared, implemented];
        let mut game = Module::new("Assembly-CSharp");
        game.add_type(tbody);

        let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
        let (token, signature) = patch.resolve_method(&game).unwrap();
        assert_eq!(token, Token::from_parts(Token::METHOD_DEF, 2));
        assert_eq!(signature.params, vec![TypeSignature::String]);
    }

    #[test]
    fn test_missing_target_type() {
        let config = PatchConfig {
            target_type: "Maid".to_string(),
            ..PatchConfig::default()
        };
        let patch = TextureResolutionPatch::new(config).unwrap();
        let engine = factories::engine_module();
        let mut game = factories::game_module();

        let mut pass = PatchPass::new();
        let err = patch.run(&mut pass, &mut game, &engine).unwrap_err();
        assert!(matches!(err, Error::MethodNotFound { .. }));
        assert!(matches!(pass.state(), PatchState::Failed(_)));
        assert!(!pass.reached(&PatchState::MethodResolved));
    }

    #[test]
    fn test_vector_locals_need_two() {
        let vector = TypeSignature::ValueType(crate::metadata::TypeName::parse("UnityEngine.Vector3"));
        let mut body = MethodBody::new();
        body.add_local(TypeSignature::I4).unwrap();
        body.add_local(vector.clone()).unwrap();
        assert!(matches!(
            vector_locals(&body, &vector),
            Err(Error::LocalNotFound(_))
        ));

        body.add_local(TypeSignature::R4).unwrap();
        body.add_local(vector.clone()).unwrap();
        body.add_local(vector.clone()).unwrap();
        assert_eq!(
            vector_locals(&body, &vector).unwrap(),
            (LocalId(1), LocalId(4))
        );
    }
}
